//! Eligibility predicates for assets counted by system albums.

use super::model::{AssetSnapshot, MediaType, BURST_COVER_LEVEL};

/// Whether the asset is a regular visible (or, with `hidden`, hidden) photo
/// or video that system albums count.
pub fn is_common_system_asset(info: &AssetSnapshot, hidden: bool) -> bool {
    is_media_mime(&info.mime_type)
        && matches!(info.media_type, MediaType::Image | MediaType::Video)
        && info.date_trashed == 0
        && info.is_hidden == hidden
        && !info.is_temp
        && info.time_pending == 0
        && info.burst_cover_level == BURST_COVER_LEVEL
}

pub fn is_video_asset(info: &AssetSnapshot) -> bool {
    info.media_type == MediaType::Video
}

pub fn is_image_asset(info: &AssetSnapshot) -> bool {
    info.media_type == MediaType::Image
}

fn is_media_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type.starts_with("video/")
}

pub fn is_favorite_asset(info: &AssetSnapshot) -> bool {
    info.is_favorite && is_common_system_asset(info, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(file_id: i32) -> AssetSnapshot {
        AssetSnapshot {
            file_id,
            mime_type: "image/jpeg".to_string(),
            media_type: MediaType::Image,
            ..Default::default()
        }
    }

    #[test]
    fn test_common_system_asset() {
        let mut info = image(1);
        assert!(is_common_system_asset(&info, false));
        assert!(!is_common_system_asset(&info, true));

        info.date_trashed = 1_700_000_000;
        assert!(!is_common_system_asset(&info, false));

        let mut pending = image(2);
        pending.time_pending = 5;
        assert!(!is_common_system_asset(&pending, false));

        let mut audio = image(3);
        audio.mime_type = "audio/mpeg".to_string();
        assert!(!is_common_system_asset(&audio, false));

        let mut burst_member = image(4);
        burst_member.burst_cover_level = 2;
        assert!(!is_common_system_asset(&burst_member, false));
    }

    #[test]
    fn test_favorite_predicate() {
        let mut info = image(1);
        assert!(!is_favorite_asset(&info));

        info.is_favorite = true;
        assert!(is_favorite_asset(&info));

        info.is_hidden = true;
        assert!(!is_favorite_asset(&info));
    }
}
