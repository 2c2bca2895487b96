pub const SCHEMA: &str = r#"
-- Persisted album state read at the start of a pass and written back at the end
CREATE TABLE IF NOT EXISTS albums (
    album_id INTEGER PRIMARY KEY,
    album_subtype INTEGER NOT NULL,
    album_name TEXT NOT NULL DEFAULT '',
    count INTEGER NOT NULL DEFAULT 0,
    cover_uri TEXT NOT NULL DEFAULT '',
    cover_date_taken INTEGER NOT NULL DEFAULT 0,
    group_tag TEXT NOT NULL DEFAULT '',   -- shared by albums refreshed together
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_albums_subtype ON albums(album_subtype);
CREATE INDEX IF NOT EXISTS idx_albums_group_tag ON albums(group_tag);
"#;

/// Applied after `SCHEMA`; failures mean the change is already present.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE albums ADD COLUMN cover_date_taken INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE albums ADD COLUMN group_tag TEXT NOT NULL DEFAULT ''",
];
