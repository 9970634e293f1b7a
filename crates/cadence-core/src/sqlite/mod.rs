pub mod migrations;
pub mod session;
pub mod store;

pub use migrations::{SqliteMigration, current_schema_version, migration, migrations};
pub use session::{Session, scoped_session};
pub use store::SqliteStore;
