//! SQLite-backed session over a borrowed connection.
//!
//! # Responsibility
//! - Execute factory lookups and inserts against one `rusqlite::Connection`.
//! - Count inserts the current unit of work has not flushed yet.
//!
//! # Invariants
//! - The connection is never opened or closed here.
//! - Inserts run inside a session transaction opened lazily by `add`.
//! - Every `add` issues its own INSERT; rows are never matched by value.
//! - `rollback` resets the pending count.
//! - Dropping a session rolls back a transaction it opened and did not finish.

use crate::model::record::{is_valid_identifier, Model};
use crate::model::value::{FieldValue, Params};
use crate::session::{Session, SessionError, SessionResult, SessionStats};
use log::{debug, warn};
use rusqlite::{params_from_iter, Connection};

/// Session that writes through to SQLite on `add`.
pub struct SqliteSession<'conn> {
    conn: &'conn Connection,
    pending: usize,
    owns_transaction: bool,
    stats: SessionStats,
}

impl<'conn> SqliteSession<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            pending: 0,
            owns_transaction: false,
            stats: SessionStats::default(),
        }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Whether the connection currently has an open transaction.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Number of inserts since the last flush, commit or rollback.
    ///
    /// Diagnostics only: inserts already ran by the time they are counted.
    pub fn pending_count(&self) -> usize {
        self.pending
    }

    fn begin_if_needed(&mut self) -> SessionResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN;")?;
            self.owns_transaction = true;
        }
        Ok(())
    }
}

impl Session for SqliteSession<'_> {
    fn query_one_or_none<M: Model>(&mut self, filter: &Params) -> SessionResult<Option<M>> {
        let table = M::table();
        let (sql, binds) = select_sql(table, filter)?;
        self.stats.queries += 1;
        debug!("event=session_query module=session table={table} filters={}", filter.len());

        let conn = self.conn;
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;

        let mut found: Vec<Params> = Vec::new();
        while let Some(row) = rows.next()? {
            let mut loaded = Params::new();
            for (index, name) in columns.iter().enumerate() {
                loaded.insert(name.as_str(), FieldValue::from(row.get_ref(index)?));
            }
            found.push(loaded);
        }

        if found.len() > 1 {
            return Err(SessionError::MultipleResults { table });
        }

        match found.pop() {
            Some(loaded) => Ok(Some(M::from_params(&loaded)?)),
            None => Ok(None),
        }
    }

    fn add<M: Model>(&mut self, instance: &mut M) -> SessionResult<()> {
        let table = M::table();
        let values = instance.to_params();
        let sql = insert_sql(table, &values)?;

        self.begin_if_needed()?;
        if let Err(err) = self
            .conn
            .execute(&sql, params_from_iter(values.iter().map(|(_, value)| value)))
        {
            let err = SessionError::from(err);
            warn!("event=session_add module=session status=error table={table} error={err}");
            return Err(err);
        }
        self.stats.inserts += 1;
        self.pending += 1;

        instance.assign_row_id(self.conn.last_insert_rowid());
        debug!("event=session_add module=session status=ok table={table}");
        Ok(())
    }

    /// Inserts already ran in `add`; flushing only clears the pending count.
    fn flush(&mut self) -> SessionResult<()> {
        self.pending = 0;
        self.stats.flushes += 1;
        Ok(())
    }

    fn commit(&mut self) -> SessionResult<()> {
        self.flush()?;
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT;")?;
        }
        self.owns_transaction = false;
        self.stats.commits += 1;
        debug!("event=session_commit module=session status=ok");
        Ok(())
    }

    fn rollback(&mut self) -> SessionResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK;")?;
        }
        self.owns_transaction = false;
        self.pending = 0;
        self.stats.rollbacks += 1;
        debug!("event=session_rollback module=session status=ok");
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if self.owns_transaction && !self.conn.is_autocommit() {
            if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
                warn!("event=session_drop module=session status=error error={err}");
            }
        }
    }
}

fn checked_identifier(name: &str) -> SessionResult<&str> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(SessionError::InvalidIdentifier(name.to_string()))
    }
}

/// `SELECT *` with one equality (or `IS NULL`) term per filter entry.
fn select_sql<'p>(table: &str, filter: &'p Params) -> SessionResult<(String, Vec<&'p FieldValue>)> {
    let mut sql = format!("SELECT * FROM {}", checked_identifier(table)?);
    let mut binds = Vec::new();

    for (position, (name, value)) in filter.iter().enumerate() {
        sql.push_str(if position == 0 { " WHERE " } else { " AND " });
        let column = checked_identifier(name)?;
        if value.is_null() {
            sql.push_str(&format!("{column} IS NULL"));
        } else {
            binds.push(value);
            sql.push_str(&format!("{column} = ?{}", binds.len()));
        }
    }

    // Two rows are enough to tell "one" from "several".
    sql.push_str(" LIMIT 2;");
    Ok((sql, binds))
}

fn insert_sql(table: &str, values: &Params) -> SessionResult<String> {
    let table = checked_identifier(table)?;
    if values.is_empty() {
        return Ok(format!("INSERT INTO {table} DEFAULT VALUES;"));
    }

    let columns = values
        .names()
        .map(checked_identifier)
        .collect::<SessionResult<Vec<_>>>()?;
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>();

    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({});",
        columns.join(", "),
        placeholders.join(", ")
    ))
}
