//! Bind inspection entry point.
//!
//! # Responsibility
//! - Bootstrap an application from `<PREFIX>_<N>_<FIELD>` variables.
//! - Print each resolved bind with its redacted connection target.
//!
//! Usage: `bindrepo_cli [prefix]` (prefix defaults to `DB_BINDS`).

use bindrepo_core::{Application, RepositoryExtension, DEFAULT_ENV_PREFIX};
use std::process::ExitCode;

fn main() -> ExitCode {
    let level = std::env::var("BINDREPO_LOG").unwrap_or_else(|_| "warn".to_string());
    if let Err(err) = bindrepo_core::init_stderr_logging(&level) {
        eprintln!("logging disabled: {err}");
    }

    let prefix = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ENV_PREFIX.to_string());
    let mut app = Application::new("bindrepo_cli").with_env_prefix(prefix.as_str());

    let manager = match RepositoryExtension::init_app(&mut app) {
        Ok(manager) => manager,
        Err(err) => {
            log::error!("event=cli_bootstrap module=cli status=error prefix={prefix} error={err}");
            eprintln!("failed to load binds for prefix `{prefix}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("bindrepo_core version={}", bindrepo_core::core_version());
    for name in manager.bind_names() {
        if let Some(bind) = manager.bind(&name) {
            println!("{name} {}", bind.engine().redacted_url());
        }
    }
    ExitCode::SUCCESS
}
