//! Notification dispatch: grouping finished change records by operation and
//! handing each group to a transport.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{mpsc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::{
    AlbumChangeData, AlbumChangeInfo, AlbumRefreshOperation, AssetChangeData, AssetSnapshot, RdbOperation,
};
use crate::error::Result;

/// Asset-level change record with the albums it left and joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoChangeNotification {
    pub change: AssetChangeData,
    pub before_albums: Vec<AlbumChangeInfo>,
    pub after_albums: Vec<AlbumChangeInfo>,
}

impl PhotoChangeNotification {
    pub fn operation(&self) -> AssetRefreshOperation {
        AssetRefreshOperation::from_change(&self.change)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRefreshOperation {
    Add,
    Remove,
    Update,
    Trash,
    Untrash,
    Hide,
    Unhide,
}

impl AssetRefreshOperation {
    /// Observer-facing operation for a row change.
    ///
    /// Trash and hide transitions are reported as such; any other update is
    /// a plain `Update`.
    pub fn from_change(change: &AssetChangeData) -> Self {
        match change.operation {
            RdbOperation::Insert => AssetRefreshOperation::Add,
            RdbOperation::Delete => AssetRefreshOperation::Remove,
            RdbOperation::Update => match (&change.before, &change.after) {
                (Some(before), Some(after)) => Self::from_update(before, after),
                _ => AssetRefreshOperation::Update,
            },
        }
    }

    fn from_update(before: &AssetSnapshot, after: &AssetSnapshot) -> Self {
        let was_trashed = before.date_trashed > 0;
        let is_trashed = after.date_trashed > 0;
        if !was_trashed && is_trashed {
            return AssetRefreshOperation::Trash;
        }
        if was_trashed && !is_trashed {
            return AssetRefreshOperation::Untrash;
        }
        match (before.is_hidden, after.is_hidden) {
            (false, true) => AssetRefreshOperation::Hide,
            (true, false) => AssetRefreshOperation::Unhide,
            _ => AssetRefreshOperation::Update,
        }
    }
}

/// Table an observer should re-read in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyTable {
    Photos,
    Albums,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifyPayload {
    AlbumChanges {
        operation: AlbumRefreshOperation,
        changes: Vec<AlbumChangeData>,
    },
    AssetChanges {
        operation: AssetRefreshOperation,
        changes: Vec<PhotoChangeNotification>,
    },
    Recheck {
        table: NotifyTable,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub issued_at: DateTime<Utc>,
    pub payload: NotifyPayload,
}

impl NotifyEvent {
    pub fn new(payload: NotifyPayload) -> Self {
        Self {
            issued_at: Utc::now(),
            payload,
        }
    }

    pub fn record_count(&self) -> usize {
        match &self.payload {
            NotifyPayload::AlbumChanges { changes, .. } => changes.len(),
            NotifyPayload::AssetChanges { changes, .. } => changes.len(),
            NotifyPayload::Recheck { .. } => 0,
        }
    }
}

/// Delivers notification events to observers.
pub trait NotificationTransport {
    fn deliver(&self, event: NotifyEvent) -> Result<()>;
}

/// Writes a summary of each event to the tracing log.
#[derive(Debug, Default)]
pub struct LogTransport;

impl NotificationTransport for LogTransport {
    fn deliver(&self, event: NotifyEvent) -> Result<()> {
        match &event.payload {
            NotifyPayload::AlbumChanges { operation, changes } => {
                info!(?operation, records = changes.len(), "Album change notification");
                for change in changes {
                    debug!(
                        album_id = change.album_id,
                        count = change.after.count,
                        cover_changed = change.after.is_cover_change,
                        "Album changed"
                    );
                }
            }
            NotifyPayload::AssetChanges { operation, changes } => {
                info!(?operation, records = changes.len(), "Asset change notification");
            }
            NotifyPayload::Recheck { table } => {
                info!(?table, "Recheck notification");
            }
        }
        Ok(())
    }
}

/// Serializes each event as one JSON line.
pub struct JsonLinesTransport<W: Write> {
    writer: Mutex<W>,
}

impl<W: Write> JsonLinesTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write> NotificationTransport for JsonLinesTransport<W> {
    fn deliver(&self, event: NotifyEvent) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_writer(&mut *writer, &event)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards events to an in-process receiver.
pub struct ChannelTransport {
    sender: mpsc::Sender<NotifyEvent>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::Receiver<NotifyEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { sender: tx }, rx)
    }
}

impl NotificationTransport for ChannelTransport {
    fn deliver(&self, event: NotifyEvent) -> Result<()> {
        if self.sender.send(event).is_err() {
            warn!("Notification receiver dropped, event discarded");
        }
        Ok(())
    }
}

/// Groups album change records by operation and dispatches one event per group.
#[derive(Debug, Default)]
pub struct AlbumChangeNotifyExecution {
    notify_infos: BTreeMap<AlbumRefreshOperation, Vec<AlbumChangeData>>,
}

impl AlbumChangeNotifyExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_notify_info(&mut self, change: AlbumChangeData) {
        self.notify_infos.entry(change.operation).or_default().push(change);
    }

    /// Returns the number of records delivered.
    pub fn notify<T>(&mut self, changes: Vec<AlbumChangeData>, transport: &T) -> Result<usize>
    where
        T: NotificationTransport + ?Sized,
    {
        for change in changes {
            self.insert_notify_info(change);
        }

        let mut delivered = 0;
        for (operation, changes) in std::mem::take(&mut self.notify_infos) {
            if changes.is_empty() {
                continue;
            }
            delivered += changes.len();
            transport.deliver(NotifyEvent::new(NotifyPayload::AlbumChanges { operation, changes }))?;
        }
        Ok(delivered)
    }
}

/// Asset-level counterpart of [`AlbumChangeNotifyExecution`].
#[derive(Debug, Default)]
pub struct AssetChangeNotifyExecution {
    notify_infos: BTreeMap<AssetRefreshOperation, Vec<PhotoChangeNotification>>,
}

impl AssetChangeNotifyExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_notify_info(&mut self, notification: PhotoChangeNotification) {
        self.notify_infos
            .entry(notification.operation())
            .or_default()
            .push(notification);
    }

    pub fn notify<T>(&mut self, notifications: Vec<PhotoChangeNotification>, transport: &T) -> Result<usize>
    where
        T: NotificationTransport + ?Sized,
    {
        for notification in notifications {
            self.insert_notify_info(notification);
        }

        let mut delivered = 0;
        for (operation, changes) in std::mem::take(&mut self.notify_infos) {
            if changes.is_empty() {
                continue;
            }
            delivered += changes.len();
            transport.deliver(NotifyEvent::new(NotifyPayload::AssetChanges { operation, changes }))?;
        }
        Ok(delivered)
    }
}
