mod schema;
pub mod backend;
pub mod sqlite;

pub use backend::AlbumStore;
pub use schema::{MIGRATIONS, SCHEMA};
pub use sqlite::SqliteDb;
