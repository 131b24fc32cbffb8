//! Connection resources and per-bind schema namespaces.
//!
//! # Responsibility
//! - Build pooled connection resources (`Engine`) from bind records.
//! - Track which tables belong to which bind (`Metadata`).
//! - Keep the bind registry that the manager owns.
//!
//! # Invariants
//! - Engines never connect while being built; pools are created on first
//!   checkout.
//! - A bind name is registered at most once.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod engine;
pub mod metadata;
pub mod registry;

pub use engine::{build_engine, Engine, EngineKind, PoolPolicy, PooledConnection};
pub use metadata::{Metadata, TableDef};
pub use registry::{Bind, BindRegistry, BindRegistryError};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    /// No driver is linked for this engine kind.
    UnsupportedEngine(String),
    /// The only connection of an in-memory engine is already checked out.
    EngineBusy(String),
    UnknownBind(String),
    /// The session cannot route this table to any bind.
    UnmappedTable(String),
    SessionClosed,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool error: {err}"),
            Self::UnsupportedEngine(kind) => {
                write!(f, "no driver available for engine `{kind}`")
            }
            Self::EngineBusy(target) => write!(
                f,
                "connection to `{target}` is already in use by another session"
            ),
            Self::UnknownBind(name) => write!(f, "bind `{name}` is not initialised"),
            Self::UnmappedTable(table) => {
                write!(f, "table `{table}` is not mapped to any bind")
            }
            Self::SessionClosed => write!(f, "session is closed"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::UnsupportedEngine(_)
            | Self::EngineBusy(_)
            | Self::UnknownBind(_)
            | Self::UnmappedTable(_)
            | Self::SessionClosed => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<r2d2::Error> for DbError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}
