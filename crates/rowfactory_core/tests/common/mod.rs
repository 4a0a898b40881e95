#![allow(dead_code)]

use rowfactory_core::model::record::{
    merge_arguments, optional_integer_field, optional_text_field, text_field,
};
use rowfactory_core::{
    apply_schema, open_db, open_db_in_memory, FieldValue, Model, ModelResult, Params, SchemaStep,
    Session, SessionResult,
};
use rusqlite::Connection;
use std::path::Path;

pub const SCHEMA: &[SchemaStep] = &[
    SchemaStep::new(
        1,
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT,
            tenant INTEGER
        );",
    ),
    SchemaStep::new(
        2,
        "CREATE TABLE badges (
            id INTEGER PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            label TEXT
        );",
    ),
    SchemaStep::new(3, "CREATE TABLE notes (body TEXT);"),
];

pub fn memory_db() -> Connection {
    let mut conn = open_db_in_memory().unwrap();
    apply_schema(&mut conn, SCHEMA).unwrap();
    conn
}

pub fn file_db(path: &Path) -> Connection {
    let mut conn = open_db(path).unwrap();
    apply_schema(&mut conn, SCHEMA).unwrap();
    conn
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub email: String,
    pub name: Option<String>,
    pub tenant: Option<i64>,
}

impl Model for User {
    fn table() -> &'static str {
        "users"
    }

    fn construct(_args: &[FieldValue], kwargs: &Params) -> ModelResult<Self> {
        Ok(Self {
            id: optional_integer_field("users", kwargs, "id")?,
            email: text_field("users", kwargs, "email")?,
            name: optional_text_field("users", kwargs, "name")?,
            tenant: optional_integer_field("users", kwargs, "tenant")?,
        })
    }

    fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(id) = self.id {
            params.insert("id", id);
        }
        params.insert("email", self.email.as_str());
        params.insert("name", self.name.clone());
        params.insert("tenant", self.tenant);
        params
    }

    fn assign_row_id(&mut self, row_id: i64) {
        self.id = Some(row_id);
    }
}

/// Badge takes its `code` positionally.
#[derive(Debug, Clone, PartialEq)]
pub struct Badge {
    pub id: Option<i64>,
    pub code: String,
    pub label: Option<String>,
}

impl Model for Badge {
    fn table() -> &'static str {
        "badges"
    }

    fn positional_fields() -> &'static [&'static str] {
        &["code"]
    }

    fn construct(args: &[FieldValue], kwargs: &Params) -> ModelResult<Self> {
        let params = merge_arguments::<Self>(args, kwargs)?;
        Ok(Self {
            id: optional_integer_field("badges", &params, "id")?,
            code: text_field("badges", &params, "code")?,
            label: optional_text_field("badges", &params, "label")?,
        })
    }

    fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(id) = self.id {
            params.insert("id", id);
        }
        params.insert("code", self.code.as_str());
        params.insert("label", self.label.clone());
        params
    }

    fn assign_row_id(&mut self, row_id: i64) {
        self.id = Some(row_id);
    }
}

/// Note has no key column and keeps the default no-op `assign_row_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub body: Option<String>,
}

impl Model for Note {
    fn table() -> &'static str {
        "notes"
    }

    fn construct(_args: &[FieldValue], kwargs: &Params) -> ModelResult<Self> {
        Ok(Self {
            body: optional_text_field("notes", kwargs, "body")?,
        })
    }

    fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("body", self.body.clone());
        params
    }
}

/// Session double that records every operation before delegating.
///
/// `miss_lookups(n)` makes the next `n` zero-or-one lookups report no row,
/// which reproduces a writer that inserts between lookup and insert.
pub struct RecordingSession<S> {
    pub inner: S,
    pub calls: Vec<&'static str>,
    missed_lookups: usize,
}

impl<S: Session> RecordingSession<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Vec::new(),
            missed_lookups: 0,
        }
    }

    pub fn miss_lookups(mut self, count: usize) -> Self {
        self.missed_lookups = count;
        self
    }
}

impl<S: Session> Session for RecordingSession<S> {
    fn query_one_or_none<M: Model>(&mut self, filter: &Params) -> SessionResult<Option<M>> {
        self.calls.push("query");
        if self.missed_lookups > 0 {
            self.missed_lookups -= 1;
            return Ok(None);
        }
        self.inner.query_one_or_none(filter)
    }

    fn query_one<M: Model>(&mut self, filter: &Params) -> SessionResult<M> {
        self.calls.push("query_one");
        self.inner.query_one(filter)
    }

    fn add<M: Model>(&mut self, instance: &mut M) -> SessionResult<()> {
        self.calls.push("add");
        self.inner.add(instance)
    }

    fn flush(&mut self) -> SessionResult<()> {
        self.calls.push("flush");
        self.inner.flush()
    }

    fn commit(&mut self) -> SessionResult<()> {
        self.calls.push("commit");
        self.inner.commit()
    }

    fn rollback(&mut self) -> SessionResult<()> {
        self.calls.push("rollback");
        self.inner.rollback()
    }
}
