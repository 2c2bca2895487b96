//! SQLite album store.

use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tracing::{debug, warn};

use super::backend::AlbumStore;
use super::schema::{MIGRATIONS, SCHEMA};
use crate::error::Result;
use crate::refresh::execution::ConcludedAlbumState;
use crate::refresh::model::{AlbumSubtype, UpdateAlbumData};
use crate::refresh::shooting_mode::{ShootingModeAlbumLookup, ShootingModeAlbumType};

const ALBUM_COLUMNS: &str =
    "album_id, album_subtype, album_name, count, cover_uri, cover_date_taken, group_tag";

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        for migration in MIGRATIONS {
            let _ = self.conn.execute(migration, []);
        }
        Ok(())
    }

    // ========================================================================
    // Album rows
    // ========================================================================

    pub fn insert_album(&self, album: &UpdateAlbumData) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO albums
                (album_id, album_subtype, album_name, count, cover_uri, cover_date_taken, group_tag, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
            rusqlite::params![
                album.album_id,
                album.album_subtype.code(),
                album.album_name,
                album.album_count,
                album.album_cover_uri,
                album.cover_date_taken,
                album.group_tag,
            ],
        )?;
        Ok(())
    }

    pub fn get_album(&self, album_id: i32) -> Result<Option<UpdateAlbumData>> {
        Ok(self.load_albums(&[album_id])?.into_iter().next())
    }

    fn query_albums<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<UpdateAlbumData>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, read_album_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let albums = rows
            .into_iter()
            .filter_map(|row| {
                let album_id = row.album_id;
                match row.into_album() {
                    Ok(album) => Some(album),
                    Err(e) => {
                        warn!(album_id, error = %e, "Skipping album with unknown subtype");
                        None
                    }
                }
            })
            .collect();
        Ok(albums)
    }
}

struct AlbumRow {
    album_id: i32,
    subtype_code: i32,
    album_name: String,
    count: i32,
    cover_uri: String,
    cover_date_taken: i64,
    group_tag: String,
}

impl AlbumRow {
    fn into_album(self) -> Result<UpdateAlbumData> {
        Ok(UpdateAlbumData {
            album_id: self.album_id,
            album_subtype: AlbumSubtype::try_from(self.subtype_code)?,
            album_count: self.count,
            album_cover_uri: self.cover_uri,
            album_name: self.album_name,
            cover_date_taken: self.cover_date_taken,
            group_tag: self.group_tag,
        })
    }
}

fn read_album_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlbumRow> {
    Ok(AlbumRow {
        album_id: row.get(0)?,
        subtype_code: row.get(1)?,
        album_name: row.get(2)?,
        count: row.get(3)?,
        cover_uri: row.get(4)?,
        cover_date_taken: row.get(5)?,
        group_tag: row.get(6)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl AlbumStore for SqliteDb {
    fn load_albums(&self, album_ids: &[i32]) -> Result<Vec<UpdateAlbumData>> {
        if album_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM albums WHERE album_id IN ({}) ORDER BY album_id",
            ALBUM_COLUMNS,
            placeholders(album_ids.len())
        );
        self.query_albums(&sql, params_from_iter(album_ids.iter()))
    }

    fn load_albums_by_subtype(&self, subtypes: &[AlbumSubtype]) -> Result<Vec<UpdateAlbumData>> {
        if subtypes.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM albums WHERE album_subtype IN ({}) ORDER BY album_id",
            ALBUM_COLUMNS,
            placeholders(subtypes.len())
        );
        self.query_albums(&sql, params_from_iter(subtypes.iter().map(|s| s.code())))
    }

    fn load_group_albums(&self, group_tag: &str) -> Result<Vec<UpdateAlbumData>> {
        if group_tag.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM albums WHERE group_tag = ? ORDER BY album_id",
            ALBUM_COLUMNS
        );
        self.query_albums(&sql, [group_tag])
    }

    fn update_album_state(&self, state: &ConcludedAlbumState) -> Result<()> {
        let updated = self.conn.execute(
            r#"
            UPDATE albums
            SET count = ?, cover_uri = ?, cover_date_taken = ?, updated_at = CURRENT_TIMESTAMP
            WHERE album_id = ?
            "#,
            rusqlite::params![state.count, state.cover_uri, state.cover_date_taken, state.album_id],
        )?;
        if updated == 0 {
            debug!(album_id = state.album_id, "Album removed before its state was written");
        }
        Ok(())
    }
}

impl ShootingModeAlbumLookup for SqliteDb {
    fn shooting_mode_album_id(&self, album_type: ShootingModeAlbumType) -> Result<Option<i32>> {
        let result = self.conn.query_row(
            "SELECT album_id FROM albums WHERE album_subtype = ? AND album_name = ? ORDER BY album_id LIMIT 1",
            rusqlite::params![AlbumSubtype::ShootingMode.code(), album_type.tag().to_string()],
            |row| row.get::<_, i32>(0),
        );
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
