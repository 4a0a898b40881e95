//! Test-data factories that persist ORM-style models to SQLite.
//!
//! A [`SqlFactory`] resolves declared attributes, then either builds an
//! instance or creates it through a [`Session`], optionally reusing an
//! existing row matched by get-or-create key fields.

pub mod db;
pub mod factory;
pub mod logging;
pub mod model;
pub mod session;

pub use db::{apply_schema, open_db, open_db_in_memory, DbError, DbResult, SchemaStep};
pub use factory::{
    ConfigError, Declaration, FactoryError, FactoryMeta, FactoryOptions, FactoryOptionsBuilder,
    FactoryResult, InsertOutcome, SessionPersistence, SqlFactory, Strategy,
};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::record::{Model, ModelError, ModelResult};
pub use model::value::{Args, FieldValue, Params};
pub use session::{
    session_handle, Session, SessionError, SessionHandle, SessionResult, SessionStats,
    SqliteSession,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
