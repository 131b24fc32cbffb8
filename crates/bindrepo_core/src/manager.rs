//! Bind manager: bootstrap, model mapping and session creation.
//!
//! # Responsibility
//! - Register binds from an explicit list or from the environment.
//! - Map model tables onto binds and create them.
//! - Create sessions bound to one bind or routing across all of them.
//!
//! # Invariants
//! - Registration follows input order; the first failure aborts the rest.
//! - Each manager owns its registry; nothing is shared between managers.

use crate::config::{
    env_bind_groups, scan_bind_groups, BindConfig, ConfigError, EnvBindGroup, DEFAULT_ENV_PREFIX,
};
use crate::db::{Bind, BindRegistry, BindRegistryError, DbError, DbResult, Engine, Metadata, TableDef};
use crate::model::Model;
use crate::session::Session;
use log::{error, info};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub enum ManagerError {
    DuplicateBind(String),
    UnknownBind(String),
    /// An environment group could not be turned into a bind record.
    Config { index: u64, source: ConfigError },
    Db(DbError),
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateBind(name) => write!(f, "bind `{name}` is already defined"),
            Self::UnknownBind(name) => write!(f, "bind `{name}` is not initialised"),
            Self::Config { index, source } => {
                write!(f, "invalid bind config at index {index}: {source}")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::DuplicateBind(_) | Self::UnknownBind(_) => None,
        }
    }
}

impl From<BindRegistryError> for ManagerError {
    fn from(value: BindRegistryError) -> Self {
        match value {
            BindRegistryError::DuplicateBind(name) => Self::DuplicateBind(name),
        }
    }
}

impl From<DbError> for ManagerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Bootstrap input taken from the hosting application.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Explicit bind list. `None` or an empty list selects environment
    /// bootstrap.
    pub binds: Option<Vec<BindConfig>>,
    pub env_prefix: String,
    /// Enables statement and pool echo on every engine.
    pub debug: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            binds: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            debug: false,
        }
    }
}

/// Owner of every bind of one application.
#[derive(Debug)]
pub struct Manager {
    registry: BindRegistry,
    debug: bool,
}

impl Manager {
    /// Creates a manager with no binds.
    pub fn new(debug: bool) -> Self {
        Self {
            registry: BindRegistry::new(),
            debug,
        }
    }

    /// Bootstraps from the explicit list when it is non-empty, otherwise from
    /// `PREFIX_<N>_<FIELD>` environment variables.
    pub fn bootstrap(settings: &ManagerSettings) -> Result<Self, ManagerError> {
        match &settings.binds {
            Some(binds) if !binds.is_empty() => {
                Self::from_bind_configs(binds.iter().cloned(), settings.debug)
            }
            _ => Self::from_env_groups(env_bind_groups(&settings.env_prefix), settings.debug),
        }
    }

    pub fn from_bind_configs<I>(configs: I, debug: bool) -> Result<Self, ManagerError>
    where
        I: IntoIterator<Item = BindConfig>,
    {
        let mut manager = Self::new(debug);
        for config in configs {
            manager.register_bind(config)?;
        }
        info!(
            "event=manager_bootstrap module=manager status=ok source=explicit binds={}",
            manager.registry.len()
        );
        Ok(manager)
    }

    /// Environment bootstrap over explicit `(name, value)` pairs instead of
    /// the process environment. References resolve against `vars` only.
    pub fn from_env_vars<I, K, V>(prefix: &str, vars: I, debug: bool) -> Result<Self, ManagerError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        let groups = scan_bind_groups(prefix, &vars, |name| vars.get(name).cloned());
        Self::from_env_groups(groups, debug)
    }

    /// Registers one bind per group, in ascending index order.
    pub fn from_env_groups<I>(groups: I, debug: bool) -> Result<Self, ManagerError>
    where
        I: IntoIterator<Item = EnvBindGroup>,
    {
        let mut manager = Self::new(debug);
        for group in groups {
            let config = BindConfig::from_fields(&group.fields).map_err(|source| {
                error!(
                    "event=manager_bootstrap module=manager status=error source=env index={} error={}",
                    group.index, source
                );
                ManagerError::Config {
                    index: group.index,
                    source,
                }
            })?;
            manager.register_bind(config)?;
        }
        info!(
            "event=manager_bootstrap module=manager status=ok source=env binds={}",
            manager.registry.len()
        );
        Ok(manager)
    }

    /// Registers one bind.
    ///
    /// # Errors
    /// - `DuplicateBind` when the name exists; the registry is unchanged.
    pub fn register_bind(&mut self, config: BindConfig) -> Result<Arc<Bind>, ManagerError> {
        let name = config.bind_name.clone();
        match self.registry.register(config, self.debug) {
            Ok(bind) => {
                info!(
                    "event=bind_register module=manager status=ok bind={} target={}",
                    name,
                    bind.engine().redacted_url()
                );
                Ok(bind)
            }
            Err(err) => {
                error!(
                    "event=bind_register module=manager status=error bind={name} error_code=duplicate_bind"
                );
                Err(err.into())
            }
        }
    }

    /// Places the table of `M` in the namespace of `bind_name`.
    pub fn register_model<M: Model>(&self, bind_name: &str) -> Result<(), ManagerError> {
        let bind = self
            .registry
            .get(bind_name)
            .ok_or_else(|| ManagerError::UnknownBind(bind_name.to_string()))?;
        bind.metadata().add_table(TableDef::of::<M>());
        Ok(())
    }

    /// Creates every registered table on its bind.
    pub fn create_all(&self) -> DbResult<()> {
        for bind in self.registry.all() {
            bind.metadata().create_all(bind.engine())?;
        }
        Ok(())
    }

    /// Creates a session.
    ///
    /// With a bind name, every table is served by that bind. Without one, each
    /// table is routed to the bind whose namespace holds it; when two binds
    /// hold the same table name the later registration wins.
    ///
    /// # Errors
    /// - `UnknownBind` when `bind_name` is not registered.
    pub fn create_session(&self, bind_name: Option<&str>) -> DbResult<Session> {
        match bind_name {
            Some(name) => {
                let bind = self
                    .registry
                    .get(name)
                    .ok_or_else(|| DbError::UnknownBind(name.to_string()))?;
                Ok(Session::bound(name, Arc::clone(bind.engine())))
            }
            None => Ok(Session::routed(self.table_routes())),
        }
    }

    fn table_routes(&self) -> HashMap<String, Arc<Engine>> {
        let mut routes = HashMap::new();
        for bind in self.registry.all() {
            for table in bind.metadata().table_names() {
                routes.insert(table, Arc::clone(bind.engine()));
            }
        }
        routes
    }

    pub fn bind(&self, name: &str) -> Option<&Arc<Bind>> {
        self.registry.get(name)
    }

    /// Bind names in registration order.
    pub fn bind_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn binds(&self) -> BTreeMap<String, Arc<Engine>> {
        self.registry
            .all()
            .iter()
            .map(|bind| (bind.name().to_string(), Arc::clone(bind.engine())))
            .collect()
    }

    pub fn metadata(&self) -> BTreeMap<String, Arc<Metadata>> {
        self.registry
            .all()
            .iter()
            .map(|bind| (bind.name().to_string(), Arc::clone(bind.metadata())))
            .collect()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}
