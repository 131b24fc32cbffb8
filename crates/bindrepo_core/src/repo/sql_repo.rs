//! SQL-backed repository for any `Model`.
//!
//! # Responsibility
//! - Build every statement from the model's column declarations.
//! - Run each operation inside a managed session on the model's bind.
//!
//! # Invariants
//! - Filter columns are checked against the model before reaching SQL.
//! - Reads order by primary key; `limit`/`offset` never go below zero.
//! - Updates touch live rows only; soft-deleted rows need `restore_*` first.

use super::{FindQuery, RepoError, RepoResult, Repository};
use crate::app::Application;
use crate::manager::Manager;
use crate::model::{has_column, now_epoch_ms, Model, TIMESTAMP_COLUMNS};
use crate::session::{managed_session, Session};
use rusqlite::types::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Repository over the table of `M`.
///
/// Sessions route `M::TABLE` through the manager, or through one bind when
/// built with `on_bind`.
pub struct SqlRepository<M> {
    manager: Arc<Manager>,
    bind: Option<String>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> SqlRepository<M> {
    /// Builds a repository on the manager installed on `app`.
    ///
    /// # Errors
    /// - `NotInitialized` when the repository extension was never installed.
    pub fn from_app(app: &Application) -> RepoResult<Self> {
        Ok(Self::new(app.manager()?))
    }

    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            manager,
            bind: None,
            _model: PhantomData,
        }
    }

    /// Restricts every session of this repository to `bind`.
    pub fn on_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = Some(bind.into());
        self
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    fn scoped<T, F>(&self, session: Option<&mut Session>, work: F) -> RepoResult<T>
    where
        F: FnOnce(&mut Session) -> RepoResult<T>,
    {
        managed_session(
            &self.manager,
            self.bind.as_deref(),
            session,
            M::TABLE,
            work,
        )
    }
}

impl<M: Model> Repository<M> for SqlRepository<M> {
    fn find_one(
        &self,
        key: M::Key,
        include_soft_deleted: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<M> {
        self.scoped(session, |session| {
            fetch::<M>(session, &key, include_soft_deleted)?.ok_or_else(|| not_found::<M>(&key))
        })
    }

    fn find_many(&self, query: &FindQuery, session: Option<&mut Session>) -> RepoResult<Vec<M>> {
        let (sql, params) = find_many_sql::<M>(query)?;
        self.scoped(session, |session| {
            Ok(session.query(M::TABLE, &sql, &params, M::from_row)?)
        })
    }

    fn insert_one(&self, mut model: M, session: Option<&mut Session>) -> RepoResult<M> {
        self.scoped(session, |session| {
            insert_row(session, &mut model)?;
            Ok(model)
        })
    }

    fn insert_many(&self, mut models: Vec<M>, session: Option<&mut Session>) -> RepoResult<Vec<M>> {
        self.scoped(session, |session| {
            for model in &mut models {
                insert_row(session, model)?;
            }
            Ok(models)
        })
    }

    fn update_one(&self, model: M, upsert: bool, session: Option<&mut Session>) -> RepoResult<M> {
        self.scoped(session, |session| update_row(session, model, upsert))
    }

    fn update_many(
        &self,
        models: Vec<M>,
        upsert: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<Vec<M>> {
        self.scoped(session, |session| {
            models
                .into_iter()
                .map(|model| update_row(session, model, upsert))
                .collect()
        })
    }

    fn delete_one(
        &self,
        key: M::Key,
        soft_delete: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<()> {
        self.scoped(session, |session| {
            delete_row::<M>(session, &key, soft_delete)
        })
    }

    fn delete_many(
        &self,
        keys: &[M::Key],
        soft_delete: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<usize> {
        let keys = distinct_keys::<M>(keys);
        self.scoped(session, |session| {
            for key in &keys {
                delete_row::<M>(session, key, soft_delete)?;
            }
            Ok(keys.len())
        })
    }

    fn restore_one(&self, key: M::Key, session: Option<&mut Session>) -> RepoResult<M> {
        self.scoped(session, |session| restore_row::<M>(session, &key))
    }

    fn restore_many(&self, keys: &[M::Key], session: Option<&mut Session>) -> RepoResult<Vec<M>> {
        self.scoped(session, |session| {
            keys.iter()
                .map(|key| restore_row::<M>(session, key))
                .collect()
        })
    }
}

fn select_sql<M: Model>() -> String {
    let mut columns = vec![M::PRIMARY_KEY.name];
    columns.extend(M::COLUMNS.iter().map(|column| column.name));
    columns.extend(TIMESTAMP_COLUMNS);
    format!("SELECT {} FROM {}", columns.join(", "), M::TABLE)
}

fn find_many_sql<M: Model>(query: &FindQuery) -> RepoResult<(String, Vec<Value>)> {
    let mut sql = format!("{} WHERE 1 = 1", select_sql::<M>());
    let mut params = Vec::with_capacity(query.filter.len() + 2);

    for (column, value) in &query.filter {
        if !has_column::<M>(column) {
            return Err(RepoError::UnknownColumn(column.clone()));
        }
        if *value == Value::Null {
            sql.push_str(&format!(" AND {column} IS NULL"));
        } else {
            sql.push_str(&format!(" AND {column} = ?"));
            params.push(value.clone());
        }
    }
    if !query.include_soft_deleted {
        sql.push_str(" AND deleted_at IS NULL");
    }

    sql.push_str(&format!(
        " ORDER BY {} ASC LIMIT ? OFFSET ?;",
        M::PRIMARY_KEY.name
    ));
    params.push(Value::Integer(query.limit.max(0)));
    params.push(Value::Integer(query.offset.max(0)));
    Ok((sql, params))
}

fn fetch<M: Model>(
    session: &mut Session,
    key: &M::Key,
    include_soft_deleted: bool,
) -> RepoResult<Option<M>> {
    let sql = format!(
        "{} WHERE {} = ?1{};",
        select_sql::<M>(),
        M::PRIMARY_KEY.name,
        if include_soft_deleted {
            ""
        } else {
            " AND deleted_at IS NULL"
        }
    );
    let mut rows = session.query(M::TABLE, &sql, &[key.clone().into()], M::from_row)?;
    Ok(rows.pop())
}

fn insert_row<M: Model>(session: &mut Session, model: &mut M) -> RepoResult<()> {
    let now = now_epoch_ms();
    let timestamps = model.timestamps_mut();
    timestamps.created_at.get_or_insert(now);
    timestamps.updated_at.get_or_insert(now);
    let timestamps = *model.timestamps();

    let mut columns = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    let key = model.primary_key();
    if let Some(key) = &key {
        columns.push(M::PRIMARY_KEY.name);
        params.push(key.clone().into());
    }
    for (column, value) in model.values() {
        columns.push(column);
        params.push(value);
    }
    columns.extend(TIMESTAMP_COLUMNS);
    params.extend([
        Value::from(timestamps.created_at),
        Value::from(timestamps.updated_at),
        Value::from(timestamps.deleted_at),
    ]);

    let placeholders = (1..=params.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders});",
        M::TABLE,
        columns.join(", ")
    );
    session.execute(M::TABLE, &sql, &params)?;

    if key.is_none() {
        let rowid = session.last_insert_rowid(M::TABLE)?;
        model.set_generated_key(rowid);
    }
    Ok(())
}

fn update_row<M: Model>(session: &mut Session, mut model: M, upsert: bool) -> RepoResult<M> {
    let Some(key) = model.primary_key() else {
        if upsert {
            insert_row(session, &mut model)?;
            return Ok(model);
        }
        return Err(RepoError::MissingPrimaryKey(M::TABLE));
    };

    let values = model.values();
    let mut assignments = Vec::with_capacity(values.len() + 1);
    let mut params = Vec::with_capacity(values.len() + 2);
    for (column, value) in values {
        params.push(value);
        assignments.push(format!("{column} = ?{}", params.len()));
    }
    params.push(Value::Integer(now_epoch_ms()));
    assignments.push(format!("updated_at = ?{}", params.len()));
    params.push(key.clone().into());

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{} AND deleted_at IS NULL;",
        M::TABLE,
        assignments.join(", "),
        M::PRIMARY_KEY.name,
        params.len()
    );
    if session.execute(M::TABLE, &sql, &params)? == 0 {
        // A soft-deleted row still owns the key, so upsert cannot insert.
        if !upsert || fetch::<M>(session, &key, true)?.is_some() {
            return Err(not_found::<M>(&key));
        }
        insert_row(session, &mut model)?;
        return Ok(model);
    }

    fetch::<M>(session, &key, false)?.ok_or_else(|| not_found::<M>(&key))
}

fn delete_row<M: Model>(session: &mut Session, key: &M::Key, soft_delete: bool) -> RepoResult<()> {
    let changed = if soft_delete {
        session.execute(
            M::TABLE,
            &format!(
                "UPDATE {} SET deleted_at = ?1, updated_at = ?1 WHERE {} = ?2 AND deleted_at IS NULL;",
                M::TABLE,
                M::PRIMARY_KEY.name
            ),
            &[Value::Integer(now_epoch_ms()), key.clone().into()],
        )?
    } else {
        session.execute(
            M::TABLE,
            &format!("DELETE FROM {} WHERE {} = ?1;", M::TABLE, M::PRIMARY_KEY.name),
            &[key.clone().into()],
        )?
    };

    if changed == 0 {
        return Err(not_found::<M>(key));
    }
    Ok(())
}

fn restore_row<M: Model>(session: &mut Session, key: &M::Key) -> RepoResult<M> {
    session.execute(
        M::TABLE,
        &format!(
            "UPDATE {} SET deleted_at = NULL, updated_at = ?1 WHERE {} = ?2 AND deleted_at IS NOT NULL;",
            M::TABLE,
            M::PRIMARY_KEY.name
        ),
        &[Value::Integer(now_epoch_ms()), key.clone().into()],
    )?;
    fetch::<M>(session, key, true)?.ok_or_else(|| not_found::<M>(key))
}

fn distinct_keys<M: Model>(keys: &[M::Key]) -> Vec<M::Key> {
    let mut seen: Vec<Value> = Vec::with_capacity(keys.len());
    let mut distinct = Vec::with_capacity(keys.len());
    for key in keys {
        let value: Value = key.clone().into();
        if !seen.contains(&value) {
            seen.push(value);
            distinct.push(key.clone());
        }
    }
    distinct
}

fn not_found<M: Model>(key: &M::Key) -> RepoError {
    RepoError::NotFound {
        table: M::TABLE,
        key: format!("{key:?}"),
    }
}
