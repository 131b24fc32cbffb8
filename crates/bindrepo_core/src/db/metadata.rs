//! Per-bind schema namespace.
//!
//! # Responsibility
//! - Record which model tables live on a bind.
//! - Create those tables on demand.
//!
//! # Invariants
//! - Table names are unique within one namespace; re-adding replaces the
//!   previous definition.

use super::engine::Engine;
use super::DbResult;
use crate::model::{Model, TIMESTAMP_COLUMNS};
use log::info;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Table name plus the DDL that creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub create_sql: String,
}

impl TableDef {
    /// Derives the table definition of `M`, lifecycle timestamp columns
    /// included.
    pub fn of<M: Model>() -> Self {
        let mut columns = vec![format!(
            "{} {} PRIMARY KEY",
            M::PRIMARY_KEY.name,
            M::PRIMARY_KEY.sql_type
        )];
        columns.extend(M::COLUMNS.iter().map(|column| column.ddl()));
        columns.extend(
            TIMESTAMP_COLUMNS
                .iter()
                .map(|name| format!("{name} INTEGER")),
        );

        Self {
            name: M::TABLE.to_string(),
            create_sql: format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
                M::TABLE,
                columns.join(",\n    ")
            ),
        }
    }
}

/// Tables registered on one bind.
#[derive(Debug, Default)]
pub struct Metadata {
    tables: RwLock<BTreeMap<String, TableDef>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, table: TableDef) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.name.clone(), table);
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(table)
    }

    /// Returns registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn tables(&self) -> Vec<TableDef> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Creates every registered table that does not exist yet on `engine`.
    pub fn create_all(&self, engine: &Engine) -> DbResult<()> {
        let tables = self.tables();
        if tables.is_empty() {
            return Ok(());
        }

        let conn = engine.connect()?;
        for table in &tables {
            conn.execute_batch(&table.create_sql)?;
        }
        info!(
            "event=create_all module=db status=ok target={} tables={}",
            engine.redacted_url(),
            tables.len()
        );
        Ok(())
    }
}
