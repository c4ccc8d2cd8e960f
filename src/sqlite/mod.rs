// SQLite plumbing - everything that touches rusqlite directly
//
// - manager: bb8 connection manager and URL handling
// - params: SqlValue -> rusqlite Value conversion
// - query: row extraction and result-set building
// - executor: blocking execution on a shared connection via spawn_blocking

pub mod executor;
pub mod manager;
pub mod params;
pub mod query;

pub use manager::{SharedSqliteConnection, SqliteManager};
