//! Connection factory: bind records to pooled connection resources.
//!
//! # Responsibility
//! - Derive the connection target and pooling policy of a bind.
//! - Create the `r2d2` pool on first checkout and hand out connections.
//!
//! # Invariants
//! - `build_engine` performs no I/O and touches no global state.
//! - Every checkout from an in-memory SQLite engine sees the same database.
//! - Networked engine kinds never open connections: no driver is linked.

use super::{DbError, DbResult};
use crate::config::BindConfig;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use r2d2::ManageConnection;
use rusqlite::Connection;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const SQLITE_MEMORY_HOST: &str = ":memory:";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

pub type SqlitePool = r2d2::Pool<SqliteConnector>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnector>;

/// Database engine family named by `db_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    /// Embedded, file-based engine.
    Sqlite,
    /// Any server engine (`postgres`, `mysql`, ...), kept verbatim.
    Networked(String),
}

impl EngineKind {
    pub fn parse(db_type: &str) -> Self {
        if db_type == "sqlite" {
            Self::Sqlite
        } else {
            Self::Networked(db_type.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Networked(kind) => kind.as_str(),
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Sqlite)
    }
}

/// Pool tuning applied to networked engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    /// Connections kept open in steady state.
    pub pool_size: u32,
    /// Extra connections allowed above `pool_size` under load.
    pub max_overflow: u32,
    /// Maximum connection age before it is replaced.
    pub recycle: Duration,
}

impl PoolPolicy {
    pub const NETWORKED: Self = Self {
        pool_size: 10,
        max_overflow: 5,
        recycle: Duration::from_secs(120),
    };

    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteTarget {
    Memory,
    File(PathBuf),
}

/// Opens and validates raw SQLite connections for the pool.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    target: SqliteTarget,
}

impl ManageConnection for SqliteConnector {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = match &self.target {
            SqliteTarget::Memory => Connection::open_in_memory()?,
            SqliteTarget::File(path) => Connection::open(path)?,
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch("SELECT 1;")
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

/// Connection resource of one bind.
pub struct Engine {
    kind: EngineKind,
    host: String,
    url: String,
    redacted_url: String,
    pool_policy: Option<PoolPolicy>,
    echo: bool,
    pool: OnceCell<SqlitePool>,
}

/// Builds the connection resource for `config`.
///
/// `echo` comes from the hosting application's debug flag; when set, pool
/// checkouts and executed statements are logged.
pub fn build_engine(config: &BindConfig, echo: bool) -> Engine {
    let kind = EngineKind::parse(&config.db_type);
    let (url, redacted_url, pool_policy) = match &kind {
        EngineKind::Sqlite => {
            let separator = if config.db_host.is_empty() { "" } else { "/" };
            let url = format!("{}://{separator}{}", config.db_type, config.db_host);
            (url.clone(), url, None)
        }
        EngineKind::Networked(_) => {
            let render = |password: &str| {
                format!(
                    "{}://{}:{}@{}:{}/{}",
                    config.db_type,
                    config.db_user.as_deref().unwrap_or_default(),
                    password,
                    config.db_host,
                    config.db_port.map(|port| port.to_string()).unwrap_or_default(),
                    config.db_name.as_deref().unwrap_or_default(),
                )
            };
            let url = render(config.db_password.as_deref().unwrap_or_default());
            let redacted_url = match config.db_password {
                Some(_) => render("***"),
                None => url.clone(),
            };
            (url, redacted_url, Some(PoolPolicy::NETWORKED))
        }
    };

    Engine {
        kind,
        host: config.db_host.clone(),
        url,
        redacted_url,
        pool_policy,
        echo,
        pool: OnceCell::new(),
    }
}

impl Engine {
    pub fn kind(&self) -> &EngineKind {
        &self.kind
    }

    /// Full connection target, credentials included.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connection target safe for logs and display.
    pub fn redacted_url(&self) -> &str {
        &self.redacted_url
    }

    /// Pool tuning; `None` for the embedded engine.
    pub fn pool_policy(&self) -> Option<PoolPolicy> {
        self.pool_policy
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Returns whether the pool has been created yet.
    pub fn is_connected(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Checks out one connection, creating the pool on first use.
    ///
    /// # Errors
    /// - `UnsupportedEngine` for networked engine kinds.
    /// - `EngineBusy` at once when the single connection of an in-memory
    ///   engine is already checked out.
    /// - `Pool` when the pool cannot be built or no connection frees up
    ///   before the checkout timeout.
    pub fn connect(&self) -> DbResult<PooledConnection> {
        let pool = self.pool.get_or_try_init(|| self.open_pool())?;
        let conn = if self.is_memory() {
            pool.try_get().ok_or_else(|| {
                warn!(
                    "event=pool_checkout module=db status=error target={} error_code=engine_busy",
                    self.redacted_url
                );
                DbError::EngineBusy(self.redacted_url.clone())
            })?
        } else {
            pool.get()?
        };
        if self.echo {
            let state = pool.state();
            debug!(
                "event=pool_checkout module=db status=ok target={} connections={} idle={}",
                self.redacted_url, state.connections, state.idle_connections
            );
        }
        Ok(conn)
    }

    fn is_memory(&self) -> bool {
        self.kind.is_embedded() && (self.host.is_empty() || self.host == SQLITE_MEMORY_HOST)
    }

    fn open_pool(&self) -> DbResult<SqlitePool> {
        if let EngineKind::Networked(kind) = &self.kind {
            error!(
                "event=pool_open module=db status=error target={} error_code=unsupported_engine",
                self.redacted_url
            );
            return Err(DbError::UnsupportedEngine(kind.clone()));
        }

        let started_at = Instant::now();
        let target = if self.is_memory() {
            SqliteTarget::Memory
        } else {
            SqliteTarget::File(PathBuf::from(&self.host))
        };

        // In-memory databases live inside a single connection, so the pool
        // must keep exactly one and never recycle it.
        let builder = match target {
            SqliteTarget::Memory => r2d2::Pool::builder()
                .max_size(1)
                .min_idle(Some(1))
                .max_lifetime(None)
                .idle_timeout(None),
            SqliteTarget::File(_) => r2d2::Pool::builder(),
        };

        match builder
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(SqliteConnector { target })
        {
            Ok(pool) => {
                info!(
                    "event=pool_open module=db status=ok target={} duration_ms={}",
                    self.redacted_url,
                    started_at.elapsed().as_millis()
                );
                Ok(pool)
            }
            Err(err) => {
                error!(
                    "event=pool_open module=db status=error target={} duration_ms={} error_code=pool_build_failed error={}",
                    self.redacted_url,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &self.kind)
            .field("url", &self.redacted_url)
            .field("pool_policy", &self.pool_policy)
            .field("echo", &self.echo)
            .field("connected", &self.is_connected())
            .finish()
    }
}
