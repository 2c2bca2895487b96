//! Store-backed refresh pass: seeds an execution from persisted album state,
//! runs it over one change batch, writes the result back and dispatches the
//! notifications.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::analyzer::AnalyzerRegistry;
use super::execution::AnalysisAlbumRefreshExecution;
use super::model::{AlbumSubtype, AssetChangeData, UpdateAlbumData};
use super::notify::{
    AlbumChangeNotifyExecution, AssetChangeNotifyExecution, NotificationTransport, NotifyEvent, NotifyPayload,
    NotifyTable,
};
use crate::config::RefreshConfig;
use crate::db::AlbumStore;
use crate::error::{RefreshError, Result};

pub struct AssetAccurateRefresh<S: AlbumStore> {
    store: S,
    config: RefreshConfig,
    execution: AnalysisAlbumRefreshExecution,
    changes: Vec<AssetChangeData>,
    recheck: bool,
}

impl<S: AlbumStore> AssetAccurateRefresh<S> {
    pub fn new(store: S, registry: Arc<AnalyzerRegistry>, config: RefreshConfig) -> Self {
        Self {
            store,
            config,
            execution: AnalysisAlbumRefreshExecution::new(registry),
            changes: Vec::new(),
            recheck: false,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn execution(&self) -> &AnalysisAlbumRefreshExecution {
        &self.execution
    }

    /// Whether the pending pass was replaced by a recheck request.
    pub fn needs_recheck(&self) -> bool {
        self.recheck
    }

    /// Runs the accurate pass for one change batch and persists the result.
    ///
    /// A previous pass that was never notified is discarded.
    pub fn refresh_album(&mut self, changes: Vec<AssetChangeData>) -> Result<()> {
        if changes.is_empty() {
            warn!("Rejected empty asset change batch");
            return Err(RefreshError::EmptyChangeData);
        }
        if !self.changes.is_empty() || self.recheck {
            warn!(pending = self.changes.len(), "Discarding pass that was never notified");
            self.reset();
        }

        let total = changes.len();
        let changes: Vec<AssetChangeData> = changes.into_iter().filter(|c| c.is_changed()).collect();
        if changes.is_empty() {
            debug!(total, "No asset in the batch changed");
            return Ok(());
        }

        if changes.len() > self.config.accurate_refresh_limit {
            warn!(
                changes = changes.len(),
                limit = self.config.accurate_refresh_limit,
                "Change batch too large for accurate refresh, requesting recheck"
            );
            self.recheck = true;
            return Ok(());
        }

        if let Err(e) = self.run_pass(&changes) {
            warn!(error = %e, "Album refresh pass failed, discarding its state");
            self.reset();
            return Err(e);
        }
        self.changes = changes;
        Ok(())
    }

    fn run_pass(&mut self, changes: &[AssetChangeData]) -> Result<()> {
        self.seed_execution(changes)?;
        self.execution.calculate_album_changes(changes);
        self.execution.process_cover_changes();

        let states = self.execution.concluded_album_states();
        for state in &states {
            self.store.update_album_state(state)?;
        }

        info!(
            changes = changes.len(),
            albums_updated = states.len(),
            clamp_events = self.execution.clamp_events(),
            "Album refresh pass complete"
        );
        Ok(())
    }

    /// Dispatches the pending pass and resets for the next one.
    ///
    /// Returns the number of change records delivered; a recheck request
    /// carries no records.
    pub fn notify<T>(&mut self, transport: &T) -> Result<usize>
    where
        T: NotificationTransport + ?Sized,
    {
        let result = self.dispatch(transport);
        self.reset();
        result
    }

    fn dispatch<T>(&mut self, transport: &T) -> Result<usize>
    where
        T: NotificationTransport + ?Sized,
    {
        if self.recheck {
            for table in [NotifyTable::Albums, NotifyTable::Photos] {
                transport.deliver(NotifyEvent::new(NotifyPayload::Recheck { table }))?;
            }
            return Ok(0);
        }

        let album_changes = self.execution.prepare_album_change_for_notify(None);
        let photo_changes = self.execution.prepare_photo_change_for_notify(&self.changes);

        let mut delivered = AlbumChangeNotifyExecution::new().notify(album_changes, transport)?;
        delivered += AssetChangeNotifyExecution::new().notify(photo_changes, transport)?;
        Ok(delivered)
    }

    fn reset(&mut self) {
        self.execution.reset_execution_status();
        self.changes.clear();
        self.recheck = false;
    }

    fn seed_execution(&mut self, changes: &[AssetChangeData]) -> Result<()> {
        let mut albums: BTreeMap<i32, UpdateAlbumData> = BTreeMap::new();
        merge_albums(&mut albums, self.store.load_albums_by_subtype(&AlbumSubtype::SYSTEM)?);

        let listed: Vec<i32> = changes
            .iter()
            .flat_map(|c| c.snapshots())
            .flat_map(|info| info.album_ids.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        merge_albums(&mut albums, self.store.load_albums(&listed)?);

        let mut shooting_mode_albums = Vec::with_capacity(changes.len());
        for change in changes {
            let mut affected = BTreeSet::new();
            for info in change.snapshots() {
                self.execution
                    .handle_info_related_shooting_mode_types(info, &self.store, &mut affected);
            }
            shooting_mode_albums.push(affected);
        }
        let shooting_ids: Vec<i32> = shooting_mode_albums.iter().flatten().copied().collect();
        merge_albums(&mut albums, self.store.load_albums(&shooting_ids)?);

        let group_tags: BTreeSet<String> = albums
            .values()
            .filter(|album| album.has_group())
            .map(|album| album.group_tag.clone())
            .collect();
        for tag in &group_tags {
            merge_albums(&mut albums, self.store.load_group_albums(tag)?);
        }

        let system_ids: Vec<i32> = albums
            .values()
            .filter(|album| album.album_subtype.is_system())
            .map(|album| album.album_id)
            .collect();
        let hidden_ids: Vec<i32> = albums
            .values()
            .filter(|album| album.album_subtype == AlbumSubtype::Hidden)
            .map(|album| album.album_id)
            .collect();

        // Ascending id order decides each group's representative.
        for album in albums.into_values() {
            self.execution.register_album(album);
        }

        for (change, affected) in changes.iter().zip(shooting_mode_albums) {
            let listed = change.snapshots().flat_map(|info| info.album_ids.iter().copied());
            self.execution.insert_asset_albums(
                change.file_id,
                listed.chain(system_ids.iter().copied()).chain(affected),
            );
        }

        for album_id in self.execution.album_ids() {
            self.execution.init_notify_context(album_id, true);
        }
        if !self.config.notify_hidden_albums {
            for album_id in hidden_ids {
                self.execution.update_notify_context(album_id, false);
            }
        }

        debug!(
            albums = self.execution.album_ids().len(),
            groups = group_tags.len(),
            "Seeded refresh pass"
        );
        Ok(())
    }
}

fn merge_albums(albums: &mut BTreeMap<i32, UpdateAlbumData>, loaded: Vec<UpdateAlbumData>) {
    for album in loaded {
        albums.entry(album.album_id).or_insert(album);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;
    use crate::refresh::model::{AlbumRefreshOperation, AssetSnapshot, MediaType, RdbOperation};
    use crate::refresh::execution::ConcludedAlbumState;
    use crate::refresh::notify::{AssetRefreshOperation, ChannelTransport};
    use crate::refresh::shooting_mode::{ShootingModeAlbumLookup, ShootingModeAlbumType};
    use std::cell::Cell;

    const FAVORITE: i32 = 1201;
    const IMAGE: i32 = 1202;
    const VIDEO: i32 = 1203;
    const HIDDEN: i32 = 1204;
    const TRASH: i32 = 1205;
    const PORTRAIT_1: i32 = 1101;
    const PORTRAIT_2: i32 = 1102;
    const NIGHT_SHOT: i32 = 1301;

    fn album(album_id: i32, subtype: AlbumSubtype, count: i32, name: &str, group_tag: &str) -> UpdateAlbumData {
        UpdateAlbumData {
            album_id,
            album_subtype: subtype,
            album_count: count,
            album_cover_uri: format!("file://cover_{}.jpg", album_id),
            album_name: name.to_string(),
            cover_date_taken: 100,
            group_tag: group_tag.to_string(),
        }
    }

    fn store() -> SqliteDb {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize().unwrap();
        for album in [
            album(FAVORITE, AlbumSubtype::Favorite, 5, "favorites", ""),
            album(IMAGE, AlbumSubtype::Image, 50, "images", ""),
            album(VIDEO, AlbumSubtype::Video, 7, "videos", ""),
            album(HIDDEN, AlbumSubtype::Hidden, 2, "hidden", ""),
            album(TRASH, AlbumSubtype::Trash, 1, "trash", ""),
            album(PORTRAIT_1, AlbumSubtype::Portrait, 10, "p1", "group_tag_ut_1"),
            album(PORTRAIT_2, AlbumSubtype::Portrait, 20, "p2", "group_tag_ut_1"),
            album(NIGHT_SHOT, AlbumSubtype::ShootingMode, 3, "3", ""),
        ] {
            db.insert_album(&album).unwrap();
        }
        db
    }

    fn refresh(config: RefreshConfig) -> AssetAccurateRefresh<SqliteDb> {
        AssetAccurateRefresh::new(store(), Arc::new(AnalyzerRegistry::new()), config)
    }

    /// Store whose writes for one album fail a set number of times.
    struct FailingStore {
        inner: SqliteDb,
        fail_album: i32,
        write_failures: Cell<u32>,
        fail_loads: bool,
    }

    impl FailingStore {
        fn failing_write(fail_album: i32, times: u32) -> Self {
            Self {
                inner: store(),
                fail_album,
                write_failures: Cell::new(times),
                fail_loads: false,
            }
        }

        fn failing_load() -> Self {
            Self {
                inner: store(),
                fail_album: 0,
                write_failures: Cell::new(0),
                fail_loads: true,
            }
        }
    }

    impl ShootingModeAlbumLookup for FailingStore {
        fn shooting_mode_album_id(&self, album_type: ShootingModeAlbumType) -> Result<Option<i32>> {
            self.inner.shooting_mode_album_id(album_type)
        }
    }

    impl AlbumStore for FailingStore {
        fn load_albums(&self, album_ids: &[i32]) -> Result<Vec<UpdateAlbumData>> {
            self.inner.load_albums(album_ids)
        }

        fn load_albums_by_subtype(&self, subtypes: &[AlbumSubtype]) -> Result<Vec<UpdateAlbumData>> {
            if self.fail_loads {
                return Err(RefreshError::Database(rusqlite::Error::InvalidQuery));
            }
            self.inner.load_albums_by_subtype(subtypes)
        }

        fn load_group_albums(&self, group_tag: &str) -> Result<Vec<UpdateAlbumData>> {
            self.inner.load_group_albums(group_tag)
        }

        fn update_album_state(&self, state: &ConcludedAlbumState) -> Result<()> {
            if state.album_id == self.fail_album && self.write_failures.get() > 0 {
                self.write_failures.set(self.write_failures.get() - 1);
                return Err(RefreshError::Database(rusqlite::Error::InvalidQuery));
            }
            self.inner.update_album_state(state)
        }
    }

    fn photo(file_id: i32, date_taken: i64) -> AssetSnapshot {
        AssetSnapshot {
            file_id,
            display_name: format!("IMG_{}.jpg", file_id),
            mime_type: "image/jpeg".to_string(),
            media_type: MediaType::Image,
            date_taken,
            ..Default::default()
        }
    }

    fn album_events(events: &[NotifyEvent]) -> Vec<(AlbumRefreshOperation, Vec<i32>)> {
        events
            .iter()
            .filter_map(|e| match &e.payload {
                NotifyPayload::AlbumChanges { operation, changes } => {
                    Some((*operation, changes.iter().map(|c| c.album_id).collect()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let mut service = refresh(RefreshConfig::default());
        assert!(matches!(service.refresh_album(Vec::new()), Err(RefreshError::EmptyChangeData)));
    }

    #[test]
    fn test_unchanged_batch_notifies_nothing() {
        let mut service = refresh(RefreshConfig::default());
        let info = photo(20001, 1_000);
        service
            .refresh_album(vec![AssetChangeData::new(20001, RdbOperation::Update, Some(info.clone()), Some(info))])
            .unwrap();

        let (transport, rx) = ChannelTransport::new();
        assert_eq!(service.notify(&transport).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_oversized_batch_requests_recheck() {
        let mut service = refresh(RefreshConfig { accurate_refresh_limit: 1, ..Default::default() });
        let changes = vec![
            AssetChangeData::new(1, RdbOperation::Insert, None, Some(photo(1, 1))),
            AssetChangeData::new(2, RdbOperation::Insert, None, Some(photo(2, 1))),
        ];
        service.refresh_album(changes).unwrap();
        assert!(service.needs_recheck());
        // Nothing was written back.
        assert_eq!(service.store().get_album(IMAGE).unwrap().unwrap().album_count, 50);

        let (transport, rx) = ChannelTransport::new();
        assert_eq!(service.notify(&transport).unwrap(), 0);
        let events: Vec<NotifyEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e.payload, NotifyPayload::Recheck { .. })));
        assert!(!service.needs_recheck());
    }

    #[test]
    fn test_new_favorite_photo() {
        let mut service = refresh(RefreshConfig::default());
        let mut info = photo(20001, 5_000);
        info.is_favorite = true;
        service
            .refresh_album(vec![AssetChangeData::new(20001, RdbOperation::Insert, None, Some(info.clone()))])
            .unwrap();

        let favorite = service.store().get_album(FAVORITE).unwrap().unwrap();
        assert_eq!(favorite.album_count, 6);
        assert_eq!(favorite.album_cover_uri, info.uri());
        assert_eq!(favorite.cover_date_taken, 5_000);
        assert_eq!(service.store().get_album(IMAGE).unwrap().unwrap().album_count, 51);
        assert_eq!(service.store().get_album(VIDEO).unwrap().unwrap().album_count, 7);

        let (transport, rx) = ChannelTransport::new();
        let delivered = service.notify(&transport).unwrap();
        let events: Vec<NotifyEvent> = rx.try_iter().collect();

        assert_eq!(album_events(&events), vec![(AlbumRefreshOperation::Update, vec![FAVORITE, IMAGE])]);
        match &events[1].payload {
            NotifyPayload::AssetChanges { operation, changes } => {
                assert_eq!(*operation, AssetRefreshOperation::Add);
                let after: Vec<i32> = changes[0].after_albums.iter().map(|a| a.album_id).collect();
                // The hidden album is not notified by default.
                assert_eq!(after, vec![FAVORITE, IMAGE, VIDEO, TRASH]);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(delivered, 3);
    }

    #[test]
    fn test_hidden_album_notification_follows_config() {
        let before = photo(20001, 1_000);
        let mut after = before.clone();
        after.is_hidden = true;
        after.hidden_time = 6_000;
        let change = AssetChangeData::new(20001, RdbOperation::Update, Some(before), Some(after));

        let mut service = refresh(RefreshConfig::default());
        service.refresh_album(vec![change.clone()]).unwrap();
        assert_eq!(service.store().get_album(HIDDEN).unwrap().unwrap().album_count, 3);
        let (transport, rx) = ChannelTransport::new();
        service.notify(&transport).unwrap();
        let events: Vec<NotifyEvent> = rx.try_iter().collect();
        assert_eq!(album_events(&events), vec![(AlbumRefreshOperation::Update, vec![IMAGE])]);
        assert!(events.iter().any(|e| matches!(
            e.payload,
            NotifyPayload::AssetChanges { operation: AssetRefreshOperation::Hide, .. }
        )));

        let mut service = refresh(RefreshConfig { notify_hidden_albums: true, ..Default::default() });
        service.refresh_album(vec![change]).unwrap();
        let (transport, rx) = ChannelTransport::new();
        service.notify(&transport).unwrap();
        let events: Vec<NotifyEvent> = rx.try_iter().collect();
        assert_eq!(album_events(&events), vec![(AlbumRefreshOperation::Update, vec![IMAGE, HIDDEN])]);
    }

    #[test]
    fn test_face_group_join_updates_every_member() {
        let mut service = refresh(RefreshConfig::default());
        let mut info = photo(20002, 9_000);
        info.album_ids = vec![PORTRAIT_2];
        service
            .refresh_album(vec![AssetChangeData::new(20002, RdbOperation::Insert, None, Some(info.clone()))])
            .unwrap();

        // P1 was pulled in as the group's representative.
        let p1 = service.store().get_album(PORTRAIT_1).unwrap().unwrap();
        assert_eq!(p1.album_count, 10);
        assert_eq!(p1.album_cover_uri, info.uri());
        let p2 = service.store().get_album(PORTRAIT_2).unwrap().unwrap();
        assert_eq!(p2.album_count, 21);
        assert_eq!(p2.album_cover_uri, info.uri());
    }

    #[test]
    fn test_shooting_mode_album_is_refreshed() {
        let mut service = refresh(RefreshConfig::default());
        let mut info = photo(20003, 2_000);
        info.shooting_mode = "3".to_string();
        service
            .refresh_album(vec![AssetChangeData::new(20003, RdbOperation::Insert, None, Some(info))])
            .unwrap();
        assert_eq!(service.store().get_album(NIGHT_SHOT).unwrap().unwrap().album_count, 4);
    }

    #[test]
    fn test_notify_resets_pass() {
        let mut service = refresh(RefreshConfig::default());
        service
            .refresh_album(vec![AssetChangeData::new(20001, RdbOperation::Insert, None, Some(photo(20001, 1)))])
            .unwrap();

        let (transport, rx) = ChannelTransport::new();
        assert!(service.notify(&transport).unwrap() > 0);
        assert!(service.execution().album_ids().is_empty());

        assert_eq!(service.notify(&transport).unwrap(), 0);
        drop(transport);
        assert_eq!(rx.iter().count(), 2);
    }

    #[test]
    fn test_deleting_cover_keeps_previous_cover() {
        let mut service = refresh(RefreshConfig::default());
        // Not the cover asset, so the cover stays.
        service
            .refresh_album(vec![AssetChangeData::new(20004, RdbOperation::Delete, Some(photo(20004, 100)), None)])
            .unwrap();
        let image = service.store().get_album(IMAGE).unwrap().unwrap();
        assert_eq!(image.album_count, 49);
        assert_eq!(image.album_cover_uri, "file://cover_1202.jpg");
    }

    #[test]
    fn test_failed_write_discards_pass() {
        let store = FailingStore::failing_write(IMAGE, 1);
        let mut service = AssetAccurateRefresh::new(store, Arc::new(AnalyzerRegistry::new()), RefreshConfig::default());

        let mut favorite = photo(20001, 5_000);
        favorite.is_favorite = true;
        let result =
            service.refresh_album(vec![AssetChangeData::new(20001, RdbOperation::Insert, None, Some(favorite))]);
        assert!(matches!(result, Err(RefreshError::Database(_))));
        assert!(service.execution().album_ids().is_empty());

        service
            .refresh_album(vec![AssetChangeData::new(20002, RdbOperation::Insert, None, Some(photo(20002, 1)))])
            .unwrap();
        // Only the second insert lands on the image album.
        assert_eq!(service.store().inner.get_album(IMAGE).unwrap().unwrap().album_count, 51);

        let (transport, rx) = ChannelTransport::new();
        service.notify(&transport).unwrap();
        let events: Vec<NotifyEvent> = rx.try_iter().collect();
        assert_eq!(album_events(&events), vec![(AlbumRefreshOperation::Update, vec![IMAGE])]);
    }

    #[test]
    fn test_failed_load_leaves_store_untouched() {
        let store = FailingStore::failing_load();
        let mut service = AssetAccurateRefresh::new(store, Arc::new(AnalyzerRegistry::new()), RefreshConfig::default());
        let result =
            service.refresh_album(vec![AssetChangeData::new(20001, RdbOperation::Insert, None, Some(photo(20001, 1)))]);
        assert!(matches!(result, Err(RefreshError::Database(_))));
        assert!(service.execution().album_ids().is_empty());
        assert_eq!(service.store().inner.get_album(IMAGE).unwrap().unwrap().album_count, 50);

        let (transport, rx) = ChannelTransport::new();
        assert_eq!(service.notify(&transport).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }
}
