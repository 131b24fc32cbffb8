//! Repository layer: a uniform CRUD contract over `Model` types.
//!
//! # Responsibility
//! - Define the ten-operation contract application code programs against.
//! - Keep SQL and session handling inside the persistence boundary.
//!
//! # Invariants
//! - A missing row is reported as `NotFound`, never as an empty success.
//! - Soft-deleted rows are invisible unless a read explicitly includes them.
//! - Every operation runs in one managed session; batch operations fail or
//!   succeed as a whole.

use crate::app::NotInitializedError;
use crate::db::DbError;
use crate::model::Model;
use crate::session::Session;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sql_repo;

pub use sql_repo::SqlRepository;

/// Default page size of `find_many`.
pub const DEFAULT_FIND_LIMIT: i64 = 50;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    NotFound { table: &'static str, key: String },
    /// A filter named a column the model does not declare.
    UnknownColumn(String),
    /// The model has no key and the operation needs one.
    MissingPrimaryKey(&'static str),
    NotInitialized,
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { table, key } => write!(f, "{table} not found: {key}"),
            Self::UnknownColumn(column) => write!(f, "unknown column `{column}`"),
            Self::MissingPrimaryKey(table) => {
                write!(f, "{table} model has no primary key value")
            }
            Self::NotInitialized => write!(f, "repository extension is not initialised"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. }
            | Self::UnknownColumn(_)
            | Self::MissingPrimaryKey(_)
            | Self::NotInitialized => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<NotInitializedError> for RepoError {
    fn from(_: NotInitializedError) -> Self {
        Self::NotInitialized
    }
}

/// Query options for `find_many`.
///
/// Negative `limit` and `offset` values are clamped to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub filter: Vec<(String, Value)>,
    pub limit: i64,
    pub offset: i64,
    pub include_soft_deleted: bool,
}

impl Default for FindQuery {
    fn default() -> Self {
        Self {
            filter: Vec::new(),
            limit: DEFAULT_FIND_LIMIT,
            offset: 0,
            include_soft_deleted: false,
        }
    }
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition; `Value::Null` matches `IS NULL`.
    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.push((column.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn include_soft_deleted(mut self, include: bool) -> Self {
        self.include_soft_deleted = include;
        self
    }
}

/// CRUD contract for one model type.
///
/// Every operation takes an optional caller-owned session. When given, the
/// operation joins it and leaves commit, rollback and close to the caller;
/// otherwise the operation owns its own transaction.
pub trait Repository<M: Model> {
    /// # Errors
    /// - `NotFound` when no row has `key`, or the row is soft-deleted and
    ///   `include_soft_deleted` is false.
    fn find_one(
        &self,
        key: M::Key,
        include_soft_deleted: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<M>;

    /// Rows matching every filter, ordered by primary key. A caller session
    /// also sees its own uncommitted writes.
    fn find_many(&self, query: &FindQuery, session: Option<&mut Session>) -> RepoResult<Vec<M>>;

    /// Inserts `model`, filling timestamps and any generated key.
    fn insert_one(&self, model: M, session: Option<&mut Session>) -> RepoResult<M>;

    fn insert_many(&self, models: Vec<M>, session: Option<&mut Session>) -> RepoResult<Vec<M>>;

    /// Updates the live row with the model's key.
    ///
    /// # Errors
    /// - `NotFound` when no live row has the key and `upsert` is false.
    /// - `MissingPrimaryKey` when the model has no key and `upsert` is false.
    fn update_one(&self, model: M, upsert: bool, session: Option<&mut Session>) -> RepoResult<M>;

    fn update_many(
        &self,
        models: Vec<M>,
        upsert: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<Vec<M>>;

    /// Soft delete marks a live row deleted; hard delete removes the row.
    fn delete_one(
        &self,
        key: M::Key,
        soft_delete: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<()>;

    /// Returns the number of distinct keys deleted; repeated keys count once.
    fn delete_many(
        &self,
        keys: &[M::Key],
        soft_delete: bool,
        session: Option<&mut Session>,
    ) -> RepoResult<usize>;

    /// Clears the soft-delete marker. Restoring a live row is a no-op.
    fn restore_one(&self, key: M::Key, session: Option<&mut Session>) -> RepoResult<M>;

    fn restore_many(&self, keys: &[M::Key], session: Option<&mut Session>) -> RepoResult<Vec<M>>;
}
