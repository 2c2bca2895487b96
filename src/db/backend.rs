//! Store abstraction for persisted album state.
//!
//! A pass reads album rows before it starts and writes the concluded counts
//! and covers back when it finishes. Anything that can do those row
//! operations can back a pass; `SqliteDb` is the bundled implementation.

use crate::error::Result;
use crate::refresh::execution::ConcludedAlbumState;
use crate::refresh::model::{AlbumSubtype, UpdateAlbumData};
use crate::refresh::shooting_mode::ShootingModeAlbumLookup;

pub trait AlbumStore: ShootingModeAlbumLookup {
    /// Albums with the given ids; unknown ids are skipped.
    fn load_albums(&self, album_ids: &[i32]) -> Result<Vec<UpdateAlbumData>>;

    /// Every album of the given subtypes.
    fn load_albums_by_subtype(&self, subtypes: &[AlbumSubtype]) -> Result<Vec<UpdateAlbumData>>;

    /// Every album sharing `group_tag`, ordered by album id.
    fn load_group_albums(&self, group_tag: &str) -> Result<Vec<UpdateAlbumData>>;

    /// Persist the concluded count and cover of one album.
    fn update_album_state(&self, state: &ConcludedAlbumState) -> Result<()>;
}
