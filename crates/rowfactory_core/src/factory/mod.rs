//! Object factories that persist what they build.
//!
//! # Responsibility
//! - Resolve declared attributes into constructor arguments.
//! - Create rows through a session, reusing existing rows by lookup key.
//!
//! # Invariants
//! - Configuration errors surface when options are declared or before any
//!   database call, never halfway through a write.
//! - Constraint violations that get-or-create cannot explain reach the
//!   caller unchanged.

use crate::model::record::ModelError;
use crate::session::SessionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod declaration;
pub mod options;
pub mod sql_factory;

pub use declaration::Declaration;
pub use options::{FactoryMeta, FactoryOptions, FactoryOptionsBuilder, SessionPersistence};
pub use sql_factory::{InsertOutcome, SqlFactory, Strategy};

pub type FactoryResult<T> = Result<T, FactoryError>;

/// Invalid factory declaration, detected when options are built.
#[derive(Debug)]
pub enum ConfigError {
    EmptyName,
    InvalidSessionPersistence { factory: String, value: String },
    InvalidFieldName { factory: String, field: String },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "factory name cannot be empty"),
            Self::InvalidSessionPersistence { factory, value } => write!(
                f,
                "{factory}.session_persistence must be one of {}, got `{value}`",
                SessionPersistence::NAMES.join("|")
            ),
            Self::InvalidFieldName { factory, field } => {
                write!(f, "{factory}: `{field}` is not a valid column name")
            }
            Self::Parse(err) => write!(f, "invalid factory meta: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug)]
pub enum FactoryError {
    Config(ConfigError),
    MissingSession { factory: String },
    /// The session handle is already borrowed by an enclosing create.
    SessionBusy { factory: String },
    MissingKeyField { field: String, factory: String },
    Model(ModelError),
    Session(SessionError),
}

impl FactoryError {
    /// Whether this wraps a constraint violation from the session.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Session(err) if err.is_integrity())
    }
}

impl Display for FactoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::MissingSession { factory } => {
                write!(f, "no session provided for factory {factory}")
            }
            Self::SessionBusy { factory } => {
                write!(f, "session of factory {factory} is already in use")
            }
            Self::MissingKeyField { field, factory } => write!(
                f,
                "get_or_create - unable to find initialization value for '{field}' in factory {factory}"
            ),
            Self::Model(err) => write!(f, "{err}"),
            Self::Session(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FactoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Model(err) => Some(err),
            Self::Session(err) => Some(err),
            Self::MissingSession { .. }
            | Self::SessionBusy { .. }
            | Self::MissingKeyField { .. } => None,
        }
    }
}

impl From<ConfigError> for FactoryError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ModelError> for FactoryError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<SessionError> for FactoryError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}
