//! Single-pass album refresh orchestrator.
//!
//! One `AnalysisAlbumRefreshExecution` accumulates the effect of one batch of
//! asset changes on the albums registered for the pass:
//!
//! 1. The caller seeds album contexts, asset-to-album associations and
//!    notify contexts from persisted state.
//! 2. [`calculate_album_changes`](AnalysisAlbumRefreshExecution::calculate_album_changes)
//!    folds every change into per-album and per-group refresh info.
//! 3. [`process_cover_changes`](AnalysisAlbumRefreshExecution::process_cover_changes)
//!    settles covers, groups first.
//! 4. [`prepare_album_change_for_notify`](AnalysisAlbumRefreshExecution::prepare_album_change_for_notify)
//!    emits at most one record per album.
//! 5. [`reset_execution_status`](AnalysisAlbumRefreshExecution::reset_execution_status)
//!    clears everything for the next pass.
//!
//! The execution is a single-threaded accumulator: it is neither `Sync` nor
//! meant to be shared between concurrent passes. Nothing here fails; missing
//! contexts are skipped and negative counts are clamped to zero.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::analyzer::AnalyzerRegistry;
use super::asset_helper::is_common_system_asset;
use super::context::{AlbumContext, GroupContext, NotifyContext};
use super::model::{
    is_valid_file_id, AlbumChangeData, AlbumChangeInfo, AlbumRefreshOperation,
    AnalysisAlbumRefreshInfo, AssetChangeData, AssetSnapshot, UpdateAlbumData,
};
use super::notify::PhotoChangeNotification;
use super::refresh_map::RefreshMap;
use super::shooting_mode::{related_types, ShootingModeAlbumLookup, ShootingModeAlbumType};

/// Concluded count and cover of one album, ready to be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcludedAlbumState {
    pub album_id: i32,
    pub count: i32,
    pub cover_uri: String,
    pub cover_date_taken: i64,
}

pub struct AnalysisAlbumRefreshExecution {
    registry: Arc<AnalyzerRegistry>,
    asset_album_map: HashMap<i32, BTreeSet<i32>>,
    asset_album_refresh_map: RefreshMap,
    album_ctx_map: BTreeMap<i32, AlbumContext>,
    group_ctx_map: BTreeMap<String, GroupContext>,
    album_notify_ctx_map: BTreeMap<i32, NotifyContext>,
    shooting_mode_album_id_map: HashMap<ShootingModeAlbumType, i32>,
    /// Albums whose concluded count had to be clamped to zero.
    clamped_albums: RefCell<BTreeSet<i32>>,
}

impl AnalysisAlbumRefreshExecution {
    pub fn new(registry: Arc<AnalyzerRegistry>) -> Self {
        Self {
            registry,
            asset_album_map: HashMap::new(),
            asset_album_refresh_map: RefreshMap::new(),
            album_ctx_map: BTreeMap::new(),
            group_ctx_map: BTreeMap::new(),
            album_notify_ctx_map: BTreeMap::new(),
            shooting_mode_album_id_map: HashMap::new(),
            clamped_albums: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn reset_execution_status(&mut self) {
        self.asset_album_map.clear();
        self.asset_album_refresh_map.clear();
        self.album_ctx_map.clear();
        self.group_ctx_map.clear();
        self.album_notify_ctx_map.clear();
        self.shooting_mode_album_id_map.clear();
        self.clamped_albums.borrow_mut().clear();
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Registers an album for this pass with its subtype's analyzer.
    ///
    /// Returns false when the subtype has no analyzer or the album is
    /// already registered. Albums with a group tag join the tag's group; the
    /// first album registered for a tag becomes the group's representative.
    pub fn register_album(&mut self, base_info: UpdateAlbumData) -> bool {
        let Some(analyzer) = self.registry.get(base_info.album_subtype) else {
            debug!(album_id = base_info.album_id, subtype = ?base_info.album_subtype, "No analyzer for album subtype");
            return false;
        };
        if self.album_ctx_map.contains_key(&base_info.album_id) {
            return false;
        }

        let ctx = AlbumContext::new(base_info, analyzer);
        if ctx.base_info.has_group() {
            self.group_ctx_map
                .entry(ctx.base_info.group_tag.clone())
                .and_modify(|group| group.add_member(ctx.album_id()))
                .or_insert_with(|| GroupContext::new(&ctx));
        }
        self.album_ctx_map.insert(ctx.album_id(), ctx);
        true
    }

    /// Records the albums an asset is associated with in persisted state.
    pub fn insert_asset_albums<I>(&mut self, file_id: i32, album_ids: I)
    where
        I: IntoIterator<Item = i32>,
    {
        self.asset_album_map.entry(file_id).or_default().extend(album_ids);
    }

    pub fn init_notify_context(&mut self, album_id: i32, need_notify: bool) {
        self.album_notify_ctx_map.insert(album_id, NotifyContext::new(need_notify));
    }

    pub fn album_context(&self, album_id: i32) -> Option<&AlbumContext> {
        self.album_ctx_map.get(&album_id)
    }

    pub fn group_context(&self, group_tag: &str) -> Option<&GroupContext> {
        self.group_ctx_map.get(group_tag)
    }

    pub fn notify_context(&self, album_id: i32) -> Option<&NotifyContext> {
        self.album_notify_ctx_map.get(&album_id)
    }

    pub fn refresh_map(&self) -> &RefreshMap {
        &self.asset_album_refresh_map
    }

    pub fn album_ids(&self) -> Vec<i32> {
        self.album_ctx_map.keys().copied().collect()
    }

    /// Number of albums whose concluded count was clamped to zero this pass.
    pub fn clamp_events(&self) -> usize {
        self.clamped_albums.borrow().len()
    }

    // ========================================================================
    // Computing
    // ========================================================================

    pub fn insert_refresh_map_by_delta<I>(&mut self, file_id: i32, album_ids: I, delta: i32)
    where
        I: IntoIterator<Item = i32>,
    {
        self.asset_album_refresh_map.insert_by_delta(file_id, album_ids, delta);
    }

    pub fn calculate_album_changes(&mut self, changes: &[AssetChangeData]) {
        for change in changes {
            let Some(album_ids) = self.asset_album_map.get(&change.file_id) else {
                debug!(file_id = change.file_id, "No associated albums for asset");
                continue;
            };
            let album_ids: Vec<i32> = album_ids.iter().copied().collect();

            let mut visited_groups = HashSet::new();
            for album_id in album_ids {
                let Some(ctx) = self.album_ctx_map.get_mut(&album_id) else {
                    debug!(album_id, file_id = change.file_id, "No recorded album");
                    continue;
                };
                let result = ctx.analyzer.analyze(&ctx.base_info, &[album_id], change);
                ctx.refresh_info.accumulate(&result);
                let group_tag = ctx.base_info.group_tag.clone();

                self.asset_album_refresh_map
                    .insert_by_delta(change.file_id, [album_id], result.delta_count);

                if group_tag.is_empty() || !visited_groups.insert(group_tag.clone()) {
                    continue;
                }
                if let Some(group) = self.group_ctx_map.get_mut(&group_tag) {
                    let result = group.analyzer.analyze(&group.base_info, &group.album_ids, change);
                    group.refresh_info.accumulate(&result);
                }
            }
        }
    }

    // ========================================================================
    // Concluding
    // ========================================================================

    /// New count and cover from the base state and accumulated info.
    ///
    /// Count is `max(0, base + delta)`. Cover is the refreshed candidate when
    /// one is known, otherwise the previous cover; an empty album has no cover.
    pub fn conclude_album_refresh_values(
        &self,
        base: &UpdateAlbumData,
        info: &AnalysisAlbumRefreshInfo,
    ) -> (String, i32) {
        let raw_count = base.album_count.saturating_add(info.delta_count);
        let new_count = if raw_count < 0 {
            if self.clamped_albums.borrow_mut().insert(base.album_id) {
                warn!(
                    album_id = base.album_id,
                    base_count = base.album_count,
                    delta = info.delta_count,
                    "Album count would go negative, clamping to zero"
                );
            }
            0
        } else {
            raw_count
        };

        let new_cover = if new_count == 0 {
            String::new()
        } else if info.need_refresh_cover && !info.refresh_cover.is_empty() {
            info.refresh_cover.clone()
        } else {
            base.album_cover_uri.clone()
        };

        (new_cover, new_count)
    }

    pub fn process_cover_changes(&mut self) {
        let decisions: Vec<(Vec<i32>, String, i64)> = self
            .group_ctx_map
            .values()
            .filter(|group| group.refresh_info.has_valid_refresh_info())
            .map(|group| {
                let (cover, count) =
                    self.conclude_album_refresh_values(&group.base_info, &group.refresh_info);
                debug!(group_tag = %group.group_tag, count, cover = %cover, "Group refresh concluded");
                let key = cover_key(&group.base_info, &group.refresh_info, &cover);
                (group.album_ids.clone(), cover, key)
            })
            .collect();

        let mut resolved = HashSet::new();
        for (album_ids, cover, key) in decisions {
            for album_id in album_ids {
                if let Some(ctx) = self.album_ctx_map.get_mut(&album_id) {
                    ctx.refresh_info.set_cover(cover.clone(), key);
                    resolved.insert(album_id);
                }
            }
        }

        let standalone: Vec<(i32, String, i64)> = self
            .album_ctx_map
            .values()
            .filter(|ctx| !resolved.contains(&ctx.album_id()))
            .filter(|ctx| ctx.refresh_info.has_valid_refresh_info() && ctx.refresh_info.need_refresh_cover)
            .map(|ctx| {
                let (cover, _) = self.conclude_album_refresh_values(&ctx.base_info, &ctx.refresh_info);
                let key = cover_key(&ctx.base_info, &ctx.refresh_info, &cover);
                (ctx.album_id(), cover, key)
            })
            .collect();

        for (album_id, cover, key) in standalone {
            if let Some(ctx) = self.album_ctx_map.get_mut(&album_id) {
                ctx.refresh_info.set_cover(cover, key);
            }
        }
    }

    /// Final state of every album with something to apply.
    pub fn concluded_album_states(&self) -> Vec<ConcludedAlbumState> {
        self.album_ctx_map
            .values()
            .filter(|ctx| ctx.refresh_info.has_valid_refresh_info())
            .map(|ctx| {
                let (cover_uri, count) =
                    self.conclude_album_refresh_values(&ctx.base_info, &ctx.refresh_info);
                let cover_date_taken = cover_key(&ctx.base_info, &ctx.refresh_info, &cover_uri);
                ConcludedAlbumState {
                    album_id: ctx.album_id(),
                    count,
                    cover_uri,
                    cover_date_taken,
                }
            })
            .collect()
    }

    // ========================================================================
    // Notifying
    // ========================================================================

    /// Overwrites the album's notify flag; the last write wins.
    pub fn update_notify_context(&mut self, album_id: i32, need_notify: bool) {
        self.album_notify_ctx_map.entry(album_id).or_default().need_notify = need_notify;
    }

    pub fn check_album_notify_status(&self, album_id: i32) -> bool {
        if !self.album_ctx_map.contains_key(&album_id) {
            return false;
        }
        self.album_notify_ctx_map
            .get(&album_id)
            .is_some_and(|ctx| ctx.need_notify)
    }

    pub fn generate_album_change_info_before_change(&self, album_id: i32) -> Option<AlbumChangeInfo> {
        let ctx = self.album_ctx_map.get(&album_id)?;
        Some(AlbumChangeInfo {
            album_id,
            count: ctx.base_info.album_count.max(0),
            cover_uri: ctx.base_info.album_cover_uri.clone(),
            is_cover_change: false,
        })
    }

    pub fn generate_album_change_info_after_change(&self, album_id: i32) -> Option<AlbumChangeInfo> {
        let ctx = self.album_ctx_map.get(&album_id)?;
        let (cover_uri, count) = self.conclude_album_refresh_values(&ctx.base_info, &ctx.refresh_info);
        Some(AlbumChangeInfo {
            album_id,
            count,
            is_cover_change: cover_uri != ctx.base_info.album_cover_uri,
            cover_uri,
        })
    }

    /// Emits the album's change record into `out`, at most once per pass.
    pub fn process_album_for_notify(&mut self, album_id: i32, out: &mut Vec<AlbumChangeData>) {
        let Some(notify_ctx) = self.album_notify_ctx_map.get_mut(&album_id) else {
            return;
        };
        if notify_ctx.has_notified {
            return;
        }
        notify_ctx.has_notified = true;
        if !notify_ctx.need_notify {
            return;
        }

        let Some(ctx) = self.album_ctx_map.get(&album_id) else {
            return;
        };
        let no_count_change = ctx.refresh_info.delta_count == 0;
        let no_cover_change = !ctx.refresh_info.need_refresh_cover;
        if no_count_change && no_cover_change {
            return;
        }

        let before = self.generate_album_change_info_before_change(album_id);
        let after = self.generate_album_change_info_after_change(album_id);
        if let (Some(before), Some(after)) = (before, after) {
            out.push(AlbumChangeData {
                album_id,
                operation: AlbumRefreshOperation::Update,
                before,
                after,
            });
        }
    }

    /// Change records for `album_ids`, or for every tracked album.
    pub fn prepare_album_change_for_notify(&mut self, album_ids: Option<&[i32]>) -> Vec<AlbumChangeData> {
        let ids = match album_ids {
            Some(ids) => ids.to_vec(),
            None => self.album_ids(),
        };

        let mut out = Vec::new();
        for album_id in ids {
            self.process_album_for_notify(album_id, &mut out);
        }
        out
    }

    /// Before- or after-change infos for the notifiable albums among `album_ids`.
    pub fn prepare_album_change_infos(&self, album_ids: &HashSet<i32>, is_after: bool) -> Vec<AlbumChangeInfo> {
        let ordered: BTreeSet<i32> = album_ids.iter().copied().collect();
        ordered
            .into_iter()
            .filter(|id| self.check_album_notify_status(*id))
            .filter_map(|id| {
                if is_after {
                    self.generate_album_change_info_after_change(id)
                } else {
                    self.generate_album_change_info_before_change(id)
                }
            })
            .collect()
    }

    /// Asset-level notifications for changes that touched a notifiable album.
    pub fn prepare_photo_change_for_notify(&self, changes: &[AssetChangeData]) -> Vec<PhotoChangeNotification> {
        let mut prepared = Vec::new();
        for change in changes {
            let Some(entry) = self.asset_album_refresh_map.get(change.file_id) else {
                continue;
            };
            if entry.is_empty() {
                continue;
            }
            if !change.snapshots().any(|info| is_common_system_asset(info, false)) {
                continue;
            }

            let before_albums = self.prepare_album_change_infos(&entry.before, false);
            let after_albums = self.prepare_album_change_infos(&entry.after, true);
            if before_albums.is_empty() && after_albums.is_empty() {
                continue;
            }

            prepared.push(PhotoChangeNotification {
                change: change.clone(),
                before_albums,
                after_albums,
            });
        }
        prepared
    }

    // ========================================================================
    // Shooting-mode albums
    // ========================================================================

    /// Adds the shooting-mode albums related to `info` to `affected`.
    ///
    /// Resolved album ids are cached for the rest of the pass; lookup
    /// failures count as a miss.
    pub fn handle_info_related_shooting_mode_types<L>(
        &mut self,
        info: &AssetSnapshot,
        lookup: &L,
        affected: &mut BTreeSet<i32>,
    ) where
        L: ShootingModeAlbumLookup + ?Sized,
    {
        if !is_valid_file_id(info.file_id) {
            return;
        }

        for album_type in related_types(info) {
            if let Some(album_id) = self.shooting_mode_album_id_map.get(&album_type) {
                affected.insert(*album_id);
                continue;
            }
            match lookup.shooting_mode_album_id(album_type) {
                Ok(Some(album_id)) => {
                    self.shooting_mode_album_id_map.insert(album_type, album_id);
                    affected.insert(album_id);
                }
                Ok(None) => {
                    debug!(?album_type, "No shooting mode album");
                }
                Err(e) => {
                    warn!(?album_type, error = %e, "Failed to look up shooting mode album");
                }
            }
        }
    }
}

/// Ordering key to persist alongside a concluded cover.
fn cover_key(base: &UpdateAlbumData, info: &AnalysisAlbumRefreshInfo, cover: &str) -> i64 {
    if cover.is_empty() {
        0
    } else if cover == info.refresh_cover {
        info.refresh_cover_key
    } else if cover == base.album_cover_uri {
        base.cover_date_taken
    } else {
        0
    }
}
