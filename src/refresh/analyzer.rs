//! Per-subtype album analyzers.
//!
//! An analyzer decides whether an asset snapshot belongs to an album and,
//! from the before/after snapshots of one change, how the album's count and
//! cover are affected. Analyzers are pure: the same inputs always give the
//! same result, so re-running a pass is idempotent.

use std::collections::HashMap;

use super::asset_helper::{is_common_system_asset, is_favorite_asset, is_image_asset, is_video_asset};
use super::model::{AlbumSubtype, AssetChangeData, AssetSnapshot, UpdateAlbumData, BURST_COVER_LEVEL};
use super::shooting_mode::{related_types, ShootingModeAlbumType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlbumAnalyzer {
    Favorite,
    Video,
    Image,
    Hidden,
    Trash,
    ShootingMode,
    Portrait,
    Generic,
}

/// Effect of one asset change on one album (or group).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeResult {
    pub delta_count: i32,
    pub need_refresh_cover: bool,
    /// Candidate cover URI with its ordering key.
    pub cover_candidate: Option<(String, i64)>,
}

impl AnalyzeResult {
    pub fn is_noop(&self) -> bool {
        self.delta_count == 0 && !self.need_refresh_cover
    }
}

impl AlbumAnalyzer {
    /// Whether `info` is counted by the album described by `base`.
    ///
    /// `scope` lists the album ids whose map-table membership counts; for a
    /// group it holds every album of the group.
    pub fn is_member(self, base: &UpdateAlbumData, scope: &[i32], info: &AssetSnapshot) -> bool {
        match self {
            AlbumAnalyzer::Favorite => is_favorite_asset(info),
            AlbumAnalyzer::Video => is_common_system_asset(info, false) && is_video_asset(info),
            AlbumAnalyzer::Image => is_common_system_asset(info, false) && is_image_asset(info),
            AlbumAnalyzer::Hidden => is_common_system_asset(info, true),
            AlbumAnalyzer::Trash => {
                info.date_trashed > 0 && !info.is_temp && info.burst_cover_level == BURST_COVER_LEVEL
            }
            AlbumAnalyzer::ShootingMode => {
                is_common_system_asset(info, false)
                    && ShootingModeAlbumType::parse(&base.album_name)
                        .is_some_and(|t| related_types(info).contains(&t))
            }
            AlbumAnalyzer::Portrait | AlbumAnalyzer::Generic => {
                is_common_system_asset(info, false) && scope.iter().any(|id| info.is_in_album(*id))
            }
        }
    }

    /// Key that orders assets for cover selection, newest first.
    pub fn order_key(self, info: &AssetSnapshot) -> i64 {
        match self {
            AlbumAnalyzer::Hidden => info.hidden_time,
            AlbumAnalyzer::Trash => info.date_trashed,
            _ => info.date_taken,
        }
    }

    pub fn analyze(self, base: &UpdateAlbumData, scope: &[i32], change: &AssetChangeData) -> AnalyzeResult {
        let before = change
            .before
            .as_ref()
            .filter(|info| self.is_member(base, scope, info));
        let after = change
            .after
            .as_ref()
            .filter(|info| self.is_member(base, scope, info));

        let mut result = AnalyzeResult {
            delta_count: i32::from(after.is_some()) - i32::from(before.is_some()),
            ..Default::default()
        };

        match (before, after) {
            (before, Some(info)) => {
                let key = self.order_key(info);
                let uri = info.uri();
                // A renamed cover asset keeps its place under the new URI.
                let cover_moved =
                    before.is_some_and(|b| b.uri() == base.album_cover_uri) && uri != base.album_cover_uri;
                if base.album_cover_uri.is_empty() || key > base.cover_date_taken || cover_moved {
                    result.need_refresh_cover = true;
                    result.cover_candidate = Some((uri, key));
                } else if uri == base.album_cover_uri && key < base.cover_date_taken {
                    // The cover got older; another member may now be newer.
                    result.need_refresh_cover = true;
                }
            }
            (Some(info), None) => {
                if info.uri() == base.album_cover_uri {
                    result.need_refresh_cover = true;
                }
            }
            (None, None) => {}
        }

        result
    }
}

/// Immutable mapping from album subtype to its analyzer, built once.
#[derive(Debug, Clone)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<AlbumSubtype, AlbumAnalyzer>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        let analyzers = HashMap::from([
            (AlbumSubtype::Favorite, AlbumAnalyzer::Favorite),
            (AlbumSubtype::Video, AlbumAnalyzer::Video),
            (AlbumSubtype::Image, AlbumAnalyzer::Image),
            (AlbumSubtype::Hidden, AlbumAnalyzer::Hidden),
            (AlbumSubtype::Trash, AlbumAnalyzer::Trash),
            (AlbumSubtype::ShootingMode, AlbumAnalyzer::ShootingMode),
            (AlbumSubtype::Portrait, AlbumAnalyzer::Portrait),
            (AlbumSubtype::UserGeneric, AlbumAnalyzer::Generic),
            (AlbumSubtype::SourceGeneric, AlbumAnalyzer::Generic),
            (AlbumSubtype::Classify, AlbumAnalyzer::Generic),
            (AlbumSubtype::GeographyLocation, AlbumAnalyzer::Generic),
            (AlbumSubtype::GeographyCity, AlbumAnalyzer::Generic),
            (AlbumSubtype::Highlight, AlbumAnalyzer::Generic),
            (AlbumSubtype::HighlightSuggestions, AlbumAnalyzer::Generic),
        ]);
        Self { analyzers }
    }

    pub fn get(&self, subtype: AlbumSubtype) -> Option<AlbumAnalyzer> {
        self.analyzers.get(&subtype).copied()
    }

    pub fn is_registered(&self, subtype: AlbumSubtype) -> bool {
        self.analyzers.contains_key(&subtype)
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
