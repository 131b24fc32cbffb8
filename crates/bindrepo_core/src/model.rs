//! Model contract shared by every persisted entity.
//!
//! # Responsibility
//! - Describe a model's table, primary key and columns statically.
//! - Map models to bound values and rows back to models explicitly.
//!
//! # Invariants
//! - Every model table carries `created_at`, `updated_at` and `deleted_at`
//!   (epoch milliseconds, nullable).
//! - `deleted_at` set means the row is soft-deleted.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle columns appended to every model table.
pub const TIMESTAMP_COLUMNS: [&str; 3] = ["created_at", "updated_at", "deleted_at"];

/// One table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
        }
    }

    pub(crate) fn ddl(&self) -> String {
        if self.nullable {
            format!("{} {}", self.name, self.sql_type)
        } else {
            format!("{} {} NOT NULL", self.name, self.sql_type)
        }
    }
}

/// Lifecycle timestamps in unix epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl Timestamps {
    /// Reads the lifecycle columns from a full model row.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            deleted_at: row.get("deleted_at")?,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Persisted domain entity.
///
/// Implementors enumerate their columns once; repositories build every
/// statement from these declarations, so filters on undeclared columns are
/// rejected instead of reaching SQL.
pub trait Model: Sized {
    const TABLE: &'static str;
    /// An `INTEGER` key is generated by the engine when `primary_key()`
    /// returns `None` at insert time.
    const PRIMARY_KEY: Column;
    /// Non-key columns, excluding lifecycle timestamps.
    const COLUMNS: &'static [Column];

    type Key: Into<Value> + Clone + Debug;

    fn primary_key(&self) -> Option<Self::Key>;

    /// Receives the engine-generated key after an insert without one.
    fn set_generated_key(&mut self, _rowid: i64) {}

    /// Values for `COLUMNS`, by column name.
    fn values(&self) -> Vec<(&'static str, Value)>;

    /// Builds a model from a row selecting every column of the table.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn timestamps(&self) -> &Timestamps;

    fn timestamps_mut(&mut self) -> &mut Timestamps;
}

/// Returns whether `name` is a filterable column of `M`.
pub fn has_column<M: Model>(name: &str) -> bool {
    name == M::PRIMARY_KEY.name
        || M::COLUMNS.iter().any(|column| column.name == name)
        || TIMESTAMP_COLUMNS.contains(&name)
}

/// Current wall-clock time in unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
