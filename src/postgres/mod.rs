// PostgreSQL plumbing - everything that touches tokio-postgres directly
//
// - manager: bb8 connection manager
// - params: SqlValue -> ToSql conversion
// - query: row extraction and result-set building
// - executor: statement execution against a pooled client

pub mod executor;
pub mod manager;
pub mod params;
pub mod query;

pub use manager::PgManager;
