//! Application handle and repository extension installation.
//!
//! # Responsibility
//! - Carry bootstrap settings for one hosting application.
//! - Own at most one `Manager`, installed by `RepositoryExtension::init_app`.
//!
//! # Invariants
//! - Lookup of a manager that was never installed fails with
//!   `NotInitializedError`; it never installs one implicitly.
//! - `teardown` detaches the manager; pools close once the last handle to
//!   their engine drops.

use crate::config::BindConfig;
use crate::manager::{Manager, ManagerError, ManagerSettings};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// The application has no repository manager installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotInitializedError {
    pub app: String,
}

impl Display for NotInitializedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "repository extension is not initialised on application `{}`",
            self.app
        )
    }
}

impl Error for NotInitializedError {}

/// Hosting application state.
#[derive(Debug)]
pub struct Application {
    name: String,
    settings: ManagerSettings,
    manager: Option<Arc<Manager>>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: ManagerSettings::default(),
            manager: None,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.settings.debug = debug;
        self
    }

    pub fn with_binds(mut self, binds: Vec<BindConfig>) -> Self {
        self.settings.binds = Some(binds);
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.env_prefix = prefix.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self) -> bool {
        self.settings.debug
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Returns the installed manager.
    pub fn manager(&self) -> Result<Arc<Manager>, NotInitializedError> {
        self.manager.clone().ok_or_else(|| NotInitializedError {
            app: self.name.clone(),
        })
    }

    /// Detaches the installed manager, if any.
    pub fn teardown(&mut self) -> Option<Arc<Manager>> {
        let manager = self.manager.take();
        if manager.is_some() {
            info!(
                "event=app_teardown module=app status=ok app={}",
                self.name
            );
        }
        manager
    }
}

/// Installs the repository manager on an application.
pub struct RepositoryExtension;

impl RepositoryExtension {
    /// Bootstraps a manager from the application's settings and stores it.
    ///
    /// A previously installed manager is replaced.
    ///
    /// # Errors
    /// - Any bootstrap failure; the application keeps its previous state.
    pub fn init_app(app: &mut Application) -> Result<Arc<Manager>, ManagerError> {
        let manager = Arc::new(Manager::bootstrap(&app.settings)?);
        if app.manager.is_some() {
            warn!(
                "event=extension_init module=app status=replaced app={}",
                app.name
            );
        }
        app.manager = Some(Arc::clone(&manager));
        info!(
            "event=extension_init module=app status=ok app={} binds={}",
            app.name,
            manager.bind_names().join(",")
        );
        Ok(manager)
    }
}
