//! Data model shared by the refresh core: asset snapshots, album state,
//! accumulated refresh info and the notification records it produces.

use serde::{Deserialize, Serialize};

use crate::error::RefreshError;

/// Marker for an asset id that does not refer to a real row.
pub const INVALID_FILE_ID: i32 = -1;

/// Burst cover level of the asset shown for a burst group.
pub const BURST_COVER_LEVEL: i32 = 1;

/// Asset ids are positive row ids; anything else is a placeholder.
pub fn is_valid_file_id(file_id: i32) -> bool {
    file_id > 0
}

/// Album subtype with its persisted integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumSubtype {
    UserGeneric,
    Favorite,
    Video,
    Hidden,
    Trash,
    Screenshot,
    Camera,
    Image,
    SourceGeneric,
    Classify,
    GeographyLocation,
    GeographyCity,
    ShootingMode,
    Portrait,
    Highlight,
    HighlightSuggestions,
}

impl AlbumSubtype {
    /// Subtypes whose membership derives from asset attributes alone.
    pub const SYSTEM: [AlbumSubtype; 5] = [
        AlbumSubtype::Favorite,
        AlbumSubtype::Video,
        AlbumSubtype::Hidden,
        AlbumSubtype::Trash,
        AlbumSubtype::Image,
    ];

    pub fn code(self) -> i32 {
        match self {
            AlbumSubtype::UserGeneric => 1,
            AlbumSubtype::Favorite => 1025,
            AlbumSubtype::Video => 1026,
            AlbumSubtype::Hidden => 1027,
            AlbumSubtype::Trash => 1028,
            AlbumSubtype::Screenshot => 1029,
            AlbumSubtype::Camera => 1030,
            AlbumSubtype::Image => 1031,
            AlbumSubtype::SourceGeneric => 2049,
            AlbumSubtype::Classify => 4097,
            AlbumSubtype::GeographyLocation => 4099,
            AlbumSubtype::GeographyCity => 4100,
            AlbumSubtype::ShootingMode => 4101,
            AlbumSubtype::Portrait => 4102,
            AlbumSubtype::Highlight => 4104,
            AlbumSubtype::HighlightSuggestions => 4105,
        }
    }

    pub fn is_system(self) -> bool {
        Self::SYSTEM.contains(&self)
    }
}

impl TryFrom<i32> for AlbumSubtype {
    type Error = RefreshError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let subtype = match code {
            1 => AlbumSubtype::UserGeneric,
            1025 => AlbumSubtype::Favorite,
            1026 => AlbumSubtype::Video,
            1027 => AlbumSubtype::Hidden,
            1028 => AlbumSubtype::Trash,
            1029 => AlbumSubtype::Screenshot,
            1030 => AlbumSubtype::Camera,
            1031 => AlbumSubtype::Image,
            2049 => AlbumSubtype::SourceGeneric,
            4097 => AlbumSubtype::Classify,
            4099 => AlbumSubtype::GeographyLocation,
            4100 => AlbumSubtype::GeographyCity,
            4101 => AlbumSubtype::ShootingMode,
            4102 => AlbumSubtype::Portrait,
            4104 => AlbumSubtype::Highlight,
            4105 => AlbumSubtype::HighlightSuggestions,
            other => return Err(RefreshError::InvalidSubtype(other)),
        };
        Ok(subtype)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    File,
    Image,
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoSubtype {
    #[default]
    Default,
    Screenshot,
    Camera,
    MovingPhoto,
}

/// Row-level operation that produced an asset change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RdbOperation {
    Insert,
    Update,
    Delete,
}

/// Attribute snapshot of one asset row on one side of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSnapshot {
    pub file_id: i32,
    pub display_name: String,
    pub mime_type: String,
    pub media_type: MediaType,
    pub photo_subtype: PhotoSubtype,
    pub is_favorite: bool,
    pub is_hidden: bool,
    pub is_temp: bool,
    pub date_taken: i64,
    pub date_trashed: i64,
    pub hidden_time: i64,
    pub time_pending: i64,
    pub burst_cover_level: i32,
    pub burst_key: String,
    pub front_camera: bool,
    pub shooting_mode: String,
    /// Albums that reference this asset through the album map tables.
    pub album_ids: Vec<i32>,
}

impl Default for AssetSnapshot {
    fn default() -> Self {
        Self {
            file_id: INVALID_FILE_ID,
            display_name: String::new(),
            mime_type: String::new(),
            media_type: MediaType::default(),
            photo_subtype: PhotoSubtype::default(),
            is_favorite: false,
            is_hidden: false,
            is_temp: false,
            date_taken: 0,
            date_trashed: 0,
            hidden_time: 0,
            time_pending: 0,
            burst_cover_level: BURST_COVER_LEVEL,
            burst_key: String::new(),
            front_camera: false,
            shooting_mode: String::new(),
            album_ids: Vec::new(),
        }
    }
}

impl AssetSnapshot {
    pub fn uri(&self) -> String {
        format!("file://media/Photo/{}/{}", self.file_id, self.display_name)
    }

    pub fn is_in_album(&self, album_id: i32) -> bool {
        self.album_ids.contains(&album_id)
    }
}

/// One row-level asset mutation from a transaction batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetChangeData {
    pub file_id: i32,
    pub operation: RdbOperation,
    #[serde(default)]
    pub before: Option<AssetSnapshot>,
    #[serde(default)]
    pub after: Option<AssetSnapshot>,
}

impl AssetChangeData {
    pub fn new(
        file_id: i32,
        operation: RdbOperation,
        before: Option<AssetSnapshot>,
        after: Option<AssetSnapshot>,
    ) -> Self {
        Self { file_id, operation, before, after }
    }

    /// Whether the change altered anything at all.
    pub fn is_changed(&self) -> bool {
        self.before != self.after
    }

    /// Both snapshots, skipping absent sides.
    pub fn snapshots(&self) -> impl Iterator<Item = &AssetSnapshot> {
        self.before.iter().chain(self.after.iter())
    }
}

/// Persisted album state loaded at the start of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAlbumData {
    pub album_id: i32,
    pub album_subtype: AlbumSubtype,
    pub album_count: i32,
    pub album_cover_uri: String,
    pub album_name: String,
    /// Ordering key of the current cover asset.
    #[serde(default)]
    pub cover_date_taken: i64,
    /// Non-empty only for albums refreshed together with their group.
    #[serde(default)]
    pub group_tag: String,
}

impl UpdateAlbumData {
    pub fn has_group(&self) -> bool {
        !self.group_tag.is_empty()
    }
}

/// Accumulated, not yet applied refresh state of an album or group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisAlbumRefreshInfo {
    pub delta_count: i32,
    pub need_refresh_cover: bool,
    /// Empty means unknown; the conclusion falls back to the previous cover.
    pub refresh_cover: String,
    pub(crate) refresh_cover_key: i64,
}

impl AnalysisAlbumRefreshInfo {
    pub fn has_valid_refresh_info(&self) -> bool {
        self.delta_count != 0 || self.need_refresh_cover
    }

    /// Keeps the newest candidate when several arrive in one pass.
    pub fn offer_cover(&mut self, uri: String, order_key: i64) {
        self.need_refresh_cover = true;
        if self.refresh_cover.is_empty() || order_key > self.refresh_cover_key {
            self.refresh_cover = uri;
            self.refresh_cover_key = order_key;
        }
    }

    /// Replaces the cover outright, used when a group decision is propagated.
    pub fn set_cover(&mut self, uri: String, order_key: i64) {
        self.need_refresh_cover = true;
        self.refresh_cover = uri;
        self.refresh_cover_key = order_key;
    }
}

/// Album-side view carried inside a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumChangeInfo {
    pub album_id: i32,
    pub count: i32,
    pub cover_uri: String,
    pub is_cover_change: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumRefreshOperation {
    Add,
    Remove,
    Update,
}

/// Final album notification record produced at the end of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumChangeData {
    pub album_id: i32,
    pub operation: AlbumRefreshOperation,
    pub before: AlbumChangeInfo,
    pub after: AlbumChangeInfo,
}
