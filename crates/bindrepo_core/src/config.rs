//! Bind configuration records and environment-derived bootstrap input.
//!
//! # Responsibility
//! - Describe one bind with explicit, typed fields.
//! - Collect `PREFIX_<N>_<FIELD>` environment variables into field groups.
//!
//! # Invariants
//! - Environment groups are yielded in ascending `<N>` order.
//! - Field names are lower-cased and values are `$VAR`-expanded.
//! - The scanner never checks completeness; `BindConfig::from_fields` does.

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Debug, Display, Formatter};

/// Prefix used when the application does not configure one.
pub const DEFAULT_ENV_PREFIX: &str = "DB_BINDS";
pub const DEFAULT_DB_TYPE: &str = "sqlite";
pub const DEFAULT_DB_HOST: &str = ":memory:";

static ENV_GROUP_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)_(\w+)$").expect("valid env group key regex"));
static ENV_REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(?:\{(\w+)\}|(\w+))").expect("valid env reference regex"));

const KNOWN_FIELDS: &[&str] = &[
    "bind_name",
    "db_type",
    "db_host",
    "db_port",
    "db_name",
    "db_user",
    "db_password",
];

/// Invalid or incomplete bind configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingField(&'static str),
    UnknownField(String),
    InvalidValue { field: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "bind config is missing `{field}`"),
            Self::UnknownField(field) => write!(f, "bind config has unknown field `{field}`"),
            Self::InvalidValue { field, value } => {
                write!(f, "bind config field `{field}` has invalid value `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// One bind record, in the shape accepted by explicit bootstrap.
///
/// Missing `db_type`/`db_host` default to an in-memory SQLite database.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BindConfig {
    pub bind_name: String,
    #[serde(default = "default_db_type")]
    pub db_type: String,
    #[serde(default = "default_db_host")]
    pub db_host: String,
    #[serde(default)]
    pub db_port: Option<u16>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
}

impl BindConfig {
    /// Creates an in-memory SQLite bind record.
    pub fn new(bind_name: impl Into<String>) -> Self {
        Self {
            bind_name: bind_name.into(),
            db_type: default_db_type(),
            db_host: default_db_host(),
            db_port: None,
            db_name: None,
            db_user: None,
            db_password: None,
        }
    }

    /// Creates a networked bind record.
    pub fn networked(
        bind_name: impl Into<String>,
        db_type: impl Into<String>,
        db_host: impl Into<String>,
        db_port: u16,
        db_name: impl Into<String>,
    ) -> Self {
        Self {
            db_type: db_type.into(),
            db_host: db_host.into(),
            db_port: Some(db_port),
            db_name: Some(db_name.into()),
            ..Self::new(bind_name)
        }
    }

    pub fn with_host(mut self, db_host: impl Into<String>) -> Self {
        self.db_host = db_host.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.db_user = Some(user.into());
        self.db_password = Some(password.into());
        self
    }

    /// Builds a record from lower-cased field/value pairs.
    ///
    /// # Errors
    /// - `MissingField("bind_name")` when the group has no bind name.
    /// - `UnknownField` for any key outside the record shape.
    /// - `InvalidValue` when `db_port` is not a valid port number.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(unknown) = fields
            .keys()
            .find(|key| !KNOWN_FIELDS.contains(&key.as_str()))
        {
            return Err(ConfigError::UnknownField(unknown.clone()));
        }

        let bind_name = fields
            .get("bind_name")
            .cloned()
            .ok_or(ConfigError::MissingField("bind_name"))?;

        let db_port = match fields.get("db_port") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|_| {
                ConfigError::InvalidValue {
                    field: "db_port",
                    value: raw.clone(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            bind_name,
            db_type: fields
                .get("db_type")
                .cloned()
                .unwrap_or_else(default_db_type),
            db_host: fields
                .get("db_host")
                .cloned()
                .unwrap_or_else(default_db_host),
            db_port,
            db_name: fields.get("db_name").cloned(),
            db_user: fields.get("db_user").cloned(),
            db_password: fields.get("db_password").cloned(),
        })
    }
}

impl Debug for BindConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindConfig")
            .field("bind_name", &self.bind_name)
            .field("db_type", &self.db_type)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &self.db_password.as_ref().map(|_| "***"))
            .finish()
    }
}

fn default_db_type() -> String {
    DEFAULT_DB_TYPE.to_string()
}

fn default_db_host() -> String {
    DEFAULT_DB_HOST.to_string()
}

/// Raw fields collected for one `<N>` index, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBindGroup {
    pub index: u64,
    pub fields: BTreeMap<String, String>,
}

/// Groups `PREFIX_<N>_<FIELD>` variables from the process environment.
///
/// Variables whose name or value is not valid UTF-8 are skipped.
pub fn env_bind_groups(prefix: &str) -> Vec<EnvBindGroup> {
    scan_bind_groups(prefix, utf8_env_vars(std::env::vars_os()), |name| {
        std::env::var(name).ok()
    })
}

fn utf8_env_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (Ok(key), Err(_)) => {
                warn!(
                    "event=env_scan module=config status=skipped reason=non_utf8_value key={key}"
                );
                None
            }
            (Err(key), _) => {
                warn!(
                    "event=env_scan module=config status=skipped reason=non_utf8_key key={}",
                    key.to_string_lossy()
                );
                None
            }
        })
        .collect()
}

/// Groups `PREFIX_<N>_<FIELD>` pairs from `vars`.
///
/// `lookup` resolves `$VAR`/`${VAR}` references inside values; references it
/// cannot resolve stay verbatim.
pub fn scan_bind_groups<I, K, V, F>(prefix: &str, vars: I, lookup: F) -> Vec<EnvBindGroup>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
    F: Fn(&str) -> Option<String>,
{
    let mut groups: BTreeMap<u64, BTreeMap<String, String>> = BTreeMap::new();

    for (key, value) in vars {
        let Some(rest) = key
            .as_ref()
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            continue;
        };
        let Some(captures) = ENV_GROUP_KEY_RE.captures(rest) else {
            continue;
        };
        let Ok(index) = captures[1].parse::<u64>() else {
            warn!(
                "event=env_scan module=config status=skipped reason=index_out_of_range key={}",
                key.as_ref()
            );
            continue;
        };

        groups
            .entry(index)
            .or_default()
            .insert(captures[2].to_ascii_lowercase(), expand_env_refs(value.as_ref(), &lookup));
    }

    groups
        .into_iter()
        .map(|(index, fields)| EnvBindGroup { index, fields })
        .collect()
}

/// Expands `$NAME` and `${NAME}` references using `lookup`.
pub fn expand_env_refs<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_REFERENCE_RE
        .replace_all(value, |captures: &Captures<'_>| {
            let name = captures
                .get(1)
                .or_else(|| captures.get(2))
                .map_or("", |m| m.as_str());
            lookup(name).unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}
