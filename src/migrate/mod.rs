// Migration engine - numbered up-files applied forward-only under a tracking table
//
// - source: loads `<version>_<title>.up.sql` files from a directory
// - driver: the dialect adapter that stores the version and runs SQL
// - migrator: applies pending files, marking the version dirty while each one runs

mod driver;
mod migrator;
mod source;

pub use driver::{MIGRATIONS_TABLE, MigrationDriver, MigrationVersion, TableMigrationDriver};
pub use migrator::{MigrateOutcome, Migrator};
pub use source::{Migration, MigrationSource};
