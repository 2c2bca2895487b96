//! Per-pass album, group and notify contexts.

use super::analyzer::{AlbumAnalyzer, AnalyzeResult};
use super::model::{AnalysisAlbumRefreshInfo, UpdateAlbumData};

impl AnalysisAlbumRefreshInfo {
    /// Folds one analyzer result into the accumulated state.
    pub fn accumulate(&mut self, result: &AnalyzeResult) {
        if result.is_noop() {
            return;
        }
        self.delta_count += result.delta_count;
        match &result.cover_candidate {
            Some((uri, key)) => self.offer_cover(uri.clone(), *key),
            None if result.need_refresh_cover => self.need_refresh_cover = true,
            None => {}
        }
    }
}

/// One album touched by the pass.
#[derive(Debug, Clone)]
pub struct AlbumContext {
    pub base_info: UpdateAlbumData,
    pub analyzer: AlbumAnalyzer,
    pub refresh_info: AnalysisAlbumRefreshInfo,
}

impl AlbumContext {
    pub fn new(base_info: UpdateAlbumData, analyzer: AlbumAnalyzer) -> Self {
        Self {
            base_info,
            analyzer,
            refresh_info: AnalysisAlbumRefreshInfo::default(),
        }
    }

    pub fn album_id(&self) -> i32 {
        self.base_info.album_id
    }
}

/// Albums refreshed under one shared cover/count decision.
///
/// `base_info` and `analyzer` come from the representative album, the first
/// one registered for the tag.
#[derive(Debug, Clone)]
pub struct GroupContext {
    pub group_tag: String,
    pub album_ids: Vec<i32>,
    pub base_info: UpdateAlbumData,
    pub analyzer: AlbumAnalyzer,
    pub refresh_info: AnalysisAlbumRefreshInfo,
}

impl GroupContext {
    pub fn new(representative: &AlbumContext) -> Self {
        Self {
            group_tag: representative.base_info.group_tag.clone(),
            album_ids: vec![representative.album_id()],
            base_info: representative.base_info.clone(),
            analyzer: representative.analyzer,
            refresh_info: AnalysisAlbumRefreshInfo::default(),
        }
    }

    pub fn add_member(&mut self, album_id: i32) {
        if !self.album_ids.contains(&album_id) {
            self.album_ids.push(album_id);
        }
    }
}

/// At-most-once notification gate for one album.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyContext {
    pub need_notify: bool,
    pub has_notified: bool,
}

impl NotifyContext {
    pub fn new(need_notify: bool) -> Self {
        Self { need_notify, has_notified: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::model::AlbumSubtype;

    fn portrait(album_id: i32) -> AlbumContext {
        AlbumContext::new(
            UpdateAlbumData {
                album_id,
                album_subtype: AlbumSubtype::Portrait,
                album_count: 10,
                album_cover_uri: String::new(),
                album_name: String::new(),
                cover_date_taken: 0,
                group_tag: "group_tag_ut_1".to_string(),
            },
            AlbumAnalyzer::Portrait,
        )
    }

    #[test]
    fn test_accumulate() {
        let mut info = AnalysisAlbumRefreshInfo::default();
        info.accumulate(&AnalyzeResult { delta_count: 2, ..Default::default() });
        info.accumulate(&AnalyzeResult {
            delta_count: -1,
            need_refresh_cover: true,
            cover_candidate: None,
        });
        assert_eq!(info.delta_count, 1);
        assert!(info.need_refresh_cover);
        assert!(info.refresh_cover.is_empty());

        info.accumulate(&AnalyzeResult {
            delta_count: 0,
            need_refresh_cover: true,
            cover_candidate: Some(("file://new".to_string(), 10)),
        });
        assert_eq!(info.refresh_cover, "file://new");
    }

    #[test]
    fn test_group_members_are_unique() {
        let mut group = GroupContext::new(&portrait(1101));
        group.add_member(1102);
        group.add_member(1101);
        assert_eq!(group.album_ids, vec![1101, 1102]);
        assert_eq!(group.base_info.album_id, 1101);
        assert_eq!(group.group_tag, "group_tag_ut_1");
    }

    #[test]
    fn test_notify_context_starts_unnotified() {
        let ctx = NotifyContext::new(true);
        assert!(ctx.need_notify);
        assert!(!ctx.has_notified);
    }
}
