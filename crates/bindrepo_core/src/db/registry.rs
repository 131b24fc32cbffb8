//! Bind registry: bind name to connection resource and schema namespace.

use super::engine::{build_engine, Engine};
use super::metadata::Metadata;
use crate::config::BindConfig;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindRegistryError {
    DuplicateBind(String),
}

impl Display for BindRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateBind(name) => write!(f, "bind `{name}` is already defined"),
        }
    }
}

impl Error for BindRegistryError {}

/// One named physical database plus its table namespace.
#[derive(Debug)]
pub struct Bind {
    config: BindConfig,
    engine: Arc<Engine>,
    metadata: Arc<Metadata>,
}

impl Bind {
    pub fn name(&self) -> &str {
        &self.config.bind_name
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }
}

/// Insertion-ordered set of binds keyed by unique name.
#[derive(Debug, Default)]
pub struct BindRegistry {
    binds: Vec<Arc<Bind>>,
}

impl BindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one bind, building its engine and a fresh namespace.
    ///
    /// The registry is left untouched when the name is already taken.
    pub fn register(
        &mut self,
        config: BindConfig,
        echo: bool,
    ) -> Result<Arc<Bind>, BindRegistryError> {
        if self.get(&config.bind_name).is_some() {
            return Err(BindRegistryError::DuplicateBind(config.bind_name));
        }

        let bind = Arc::new(Bind {
            engine: Arc::new(build_engine(&config, echo)),
            metadata: Arc::new(Metadata::new()),
            config,
        });
        self.binds.push(Arc::clone(&bind));
        Ok(bind)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Bind>> {
        self.binds.iter().find(|bind| bind.name() == name)
    }

    /// All binds in registration order.
    pub fn all(&self) -> &[Arc<Bind>] {
        &self.binds
    }

    pub fn names(&self) -> Vec<String> {
        self.binds.iter().map(|bind| bind.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }
}
