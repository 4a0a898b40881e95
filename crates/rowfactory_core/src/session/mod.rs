//! Persistence session contract used by SQL factories.
//!
//! # Responsibility
//! - Define the query/add/flush/commit/rollback surface factories drive.
//! - Separate constraint conflicts from every other storage failure.
//!
//! # Invariants
//! - Sessions are externally owned; factories only issue operations.
//! - `SessionError::Integrity` is reserved for constraint violations.

use crate::db::DbError;
use crate::model::record::{Model, ModelError};
use crate::model::value::Params;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub mod sqlite_session;

pub use sqlite_session::SqliteSession;

/// Shared, single-threaded handle to a session.
///
/// `Rc<RefCell<_>>` is neither `Send` nor `Sync`, so one session can never be
/// driven from two threads through factory options.
pub type SessionHandle<S> = Rc<RefCell<S>>;

/// Wraps a session into a [`SessionHandle`].
pub fn session_handle<S>(session: S) -> SessionHandle<S> {
    Rc::new(RefCell::new(session))
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    /// Insert rejected by a uniqueness or other constraint.
    Integrity(rusqlite::Error),
    /// Exactly-one query found nothing.
    NoResult { table: &'static str },
    /// Zero-or-one query found several rows.
    MultipleResults { table: &'static str },
    InvalidIdentifier(String),
    Model(ModelError),
    Db(DbError),
}

impl SessionError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integrity(err) => write!(f, "integrity error: {err}"),
            Self::NoResult { table } => write!(f, "no row found in `{table}`"),
            Self::MultipleResults { table } => {
                write!(f, "multiple rows found in `{table}` where one was expected")
            }
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
            Self::Model(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Integrity(err) => Some(err),
            Self::Model(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NoResult { .. } | Self::MultipleResults { .. } | Self::InvalidIdentifier(_) => {
                None
            }
        }
    }
}

impl From<ModelError> for SessionError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<DbError> for SessionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        if is_constraint_violation(&value) {
            Self::Integrity(value)
        } else {
            Self::Db(DbError::Sqlite(value))
        }
    }
}

/// Returns whether `err` is SQLite's constraint-violation failure.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Counters for operations a session has executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub queries: u64,
    pub inserts: u64,
    pub flushes: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

/// Unit-of-work surface a SQL factory drives.
pub trait Session {
    /// Returns the single row of `M` matching `filter`, if any.
    ///
    /// More than one match is `SessionError::MultipleResults`.
    fn query_one_or_none<M: Model>(&mut self, filter: &Params) -> SessionResult<Option<M>>;

    /// Returns exactly one row of `M` matching `filter`.
    ///
    /// No match is `SessionError::NoResult`.
    fn query_one<M: Model>(&mut self, filter: &Params) -> SessionResult<M> {
        self.query_one_or_none(filter)?
            .ok_or(SessionError::NoResult { table: M::table() })
    }

    /// Registers a newly built `instance` with the session.
    ///
    /// Every call is a fresh insert; callers never pass an instance the
    /// session returned from a query.
    fn add<M: Model>(&mut self, instance: &mut M) -> SessionResult<()>;

    fn flush(&mut self) -> SessionResult<()>;

    fn commit(&mut self) -> SessionResult<()>;

    fn rollback(&mut self) -> SessionResult<()>;
}
