//! Accurate album refresh: turns a batch of asset row changes into exact
//! album count/cover updates and deduplicated change notifications.

pub mod analyzer;
pub mod asset_helper;
pub mod context;
pub mod execution;
pub mod model;
pub mod notify;
pub mod refresh_map;
pub mod service;
pub mod shooting_mode;

pub use analyzer::{AlbumAnalyzer, AnalyzerRegistry};
pub use execution::{AnalysisAlbumRefreshExecution, ConcludedAlbumState};
pub use model::{AlbumChangeData, AlbumChangeInfo, AssetChangeData, AssetSnapshot, UpdateAlbumData};
pub use notify::{
    AlbumChangeNotifyExecution, AssetChangeNotifyExecution, ChannelTransport, JsonLinesTransport, LogTransport,
    NotificationTransport, NotifyEvent, NotifyPayload,
};
pub use service::AssetAccurateRefresh;
