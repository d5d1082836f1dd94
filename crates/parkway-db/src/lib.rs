pub mod executor;
pub mod migrations;
pub mod user_store;

pub use executor::{Row, SqliteExecutor, StatementExecutor, Value};
pub use migrations::{
    DirectorySource, EmbeddedSource, LedgerEntry, MigrationLedger, MigrationReport,
    MigrationRunner, MigrationSource, MigrationUnit, StaticSource,
};
pub use user_store::{User, UserStore};
