//! Multi-bind repository and unit-of-work layer over SQL engines.
//! Models declare their tables once; repositories run every CRUD operation
//! inside a managed session on the bind that owns the model's table.

pub mod app;
pub mod config;
pub mod db;
pub mod logging;
pub mod manager;
pub mod model;
pub mod repo;
pub mod session;

pub use app::{Application, NotInitializedError, RepositoryExtension};
pub use config::{BindConfig, ConfigError, DEFAULT_ENV_PREFIX};
pub use db::{DbError, DbResult, Engine, EngineKind, PoolPolicy};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use manager::{Manager, ManagerError, ManagerSettings};
pub use model::{Column, Model, Timestamps};
pub use repo::{FindQuery, RepoError, RepoResult, Repository, SqlRepository};
pub use session::{managed_session, Session};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
