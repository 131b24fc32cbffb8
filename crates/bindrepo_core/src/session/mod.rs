//! Transactional sessions over one or more binds.
//!
//! # Responsibility
//! - Route each table to the engine of the bind that owns it.
//! - Check out at most one pooled connection per engine and run every
//!   statement inside a transaction on it.
//! - Commit, roll back and release those connections on request.
//!
//! # Invariants
//! - A transaction is opened lazily, on the first statement for an engine.
//! - A closed session runs no statements; closing is idempotent.
//! - Dropping a session closes it, rolling back anything uncommitted.

use crate::db::{DbError, DbResult, Engine, PooledConnection};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Row};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub mod scope;

pub use scope::managed_session;

enum Routing {
    Bound { bind: String, engine: Arc<Engine> },
    Tables(HashMap<String, Arc<Engine>>),
}

struct Checkout {
    engine: Arc<Engine>,
    conn: PooledConnection,
    in_transaction: bool,
}

/// Unit-of-work handle created by `Manager::create_session`.
pub struct Session {
    id: Uuid,
    routing: Routing,
    checkouts: Vec<Checkout>,
    closed: bool,
}

impl Session {
    pub(crate) fn bound(bind: impl Into<String>, engine: Arc<Engine>) -> Self {
        Self::with_routing(Routing::Bound {
            bind: bind.into(),
            engine,
        })
    }

    pub(crate) fn routed(tables: HashMap<String, Arc<Engine>>) -> Self {
        Self::with_routing(Routing::Tables(tables))
    }

    fn with_routing(routing: Routing) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            routing,
            checkouts: Vec::new(),
            closed: false,
        };
        debug!(
            "event=session_open module=session status=ok session_id={} bound={}",
            session.id,
            session.bind_name().unwrap_or("-")
        );
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the bind this session is restricted to, if any.
    pub fn bind_name(&self) -> Option<&str> {
        match &self.routing {
            Routing::Bound { bind, .. } => Some(bind.as_str()),
            Routing::Tables(_) => None,
        }
    }

    /// Engine this session is restricted to; `None` for routing sessions.
    pub fn bound_engine(&self) -> Option<&Arc<Engine>> {
        match &self.routing {
            Routing::Bound { engine, .. } => Some(engine),
            Routing::Tables(_) => None,
        }
    }

    /// Resolves the engine that serves `table`.
    ///
    /// # Errors
    /// - `UnmappedTable` when a routing session knows no bind for `table`.
    pub fn get_bind(&self, table: &str) -> DbResult<Arc<Engine>> {
        match &self.routing {
            Routing::Bound { engine, .. } => Ok(Arc::clone(engine)),
            Routing::Tables(tables) => tables
                .get(table)
                .cloned()
                .ok_or_else(|| DbError::UnmappedTable(table.to_string())),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Returns whether any checked-out connection has uncommitted work.
    pub fn in_transaction(&self) -> bool {
        self.checkouts.iter().any(|checkout| checkout.in_transaction)
    }

    /// Runs one statement against the bind that owns `table`.
    pub fn execute(&mut self, table: &str, sql: &str, params: &[Value]) -> DbResult<usize> {
        let session_id = self.id;
        let checkout = self.checkout(table)?;
        if checkout.engine.echo() {
            info!("event=sql_echo module=session session_id={session_id} sql={sql}");
        }
        let changed = checkout.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed)
    }

    /// Runs one query against the bind that owns `table`, mapping every row.
    pub fn query<T, F>(
        &mut self,
        table: &str,
        sql: &str,
        params: &[Value],
        map: F,
    ) -> DbResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let session_id = self.id;
        let checkout = self.checkout(table)?;
        if checkout.engine.echo() {
            info!("event=sql_echo module=session session_id={session_id} sql={sql}");
        }
        let mut stmt = checkout.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), map)?;
        let items = rows.collect::<Result<Vec<T>, _>>()?;
        Ok(items)
    }

    /// Row id of the last insert on the connection serving `table`.
    pub fn last_insert_rowid(&mut self, table: &str) -> DbResult<i64> {
        Ok(self.checkout(table)?.conn.last_insert_rowid())
    }

    /// Commits every open transaction. Connections stay checked out.
    pub fn commit(&mut self) -> DbResult<()> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }

        for checkout in self.checkouts.iter_mut().filter(|c| c.in_transaction) {
            checkout.conn.execute_batch("COMMIT;")?;
            checkout.in_transaction = false;
        }
        debug!(
            "event=session_commit module=session status=ok session_id={}",
            self.id
        );
        Ok(())
    }

    /// Rolls back every open transaction.
    ///
    /// Every connection is attempted; the first failure is returned.
    pub fn rollback(&mut self) -> DbResult<()> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }

        let mut first_error = None;
        for checkout in self.checkouts.iter_mut().filter(|c| c.in_transaction) {
            checkout.in_transaction = false;
            // SQLite may already have rolled back on its own after some errors.
            if checkout.conn.is_autocommit() {
                continue;
            }
            if let Err(err) = checkout.conn.execute_batch("ROLLBACK;") {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        debug!(
            "event=session_rollback module=session status={} session_id={}",
            if first_error.is_none() { "ok" } else { "error" },
            self.id
        );

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Rolls back uncommitted work and returns connections to their pools.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        if self.in_transaction() {
            if let Err(err) = self.rollback() {
                warn!(
                    "event=session_close module=session status=error session_id={} error_code=rollback_failed error={}",
                    self.id, err
                );
            }
        }
        self.checkouts.clear();
        self.closed = true;
        debug!(
            "event=session_close module=session status=ok session_id={}",
            self.id
        );
    }

    fn checkout(&mut self, table: &str) -> DbResult<&mut Checkout> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }

        let engine = self.get_bind(table)?;
        let index = match self
            .checkouts
            .iter()
            .position(|checkout| Arc::ptr_eq(&checkout.engine, &engine))
        {
            Some(index) => index,
            None => {
                let conn = engine.connect()?;
                self.checkouts.push(Checkout {
                    engine,
                    conn,
                    in_transaction: false,
                });
                self.checkouts.len() - 1
            }
        };

        let checkout = &mut self.checkouts[index];
        if !checkout.in_transaction {
            checkout.conn.execute_batch("BEGIN;")?;
            checkout.in_transaction = true;
        }
        Ok(checkout)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("bind", &self.bind_name())
            .field("checkouts", &self.checkouts.len())
            .field("in_transaction", &self.in_transaction())
            .field("closed", &self.closed)
            .finish()
    }
}
