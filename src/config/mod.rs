//! Configuration Management
//!
//! This module handles loading and saving named database connections and the
//! discovery prompt settings.
//!
//! # Configuration Locations
//! - Local: `.alveolo/config.json` (team-shareable, per-project)
//! - Global: `<config_dir>/alveolo/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit command-line parameters (highest priority)
//! 2. Local config file
//! 3. Global config file
//!
//! Local entries replace global ones with the same connection name. The local
//! `default` pointer and `discovery` block, when present, replace the global ones.
//!
//! # File Format
//! ```json
//! {
//!   "connections": {
//!     "clinica": { "engine": "postgres", "host": "db", "port": 5432,
//!                  "user": "lectura", "database": "clinica",
//!                  "password_env": "CLINICA_PASSWORD", "readonly": true }
//!   },
//!   "default": "clinica",
//!   "discovery": { "assistant_name": "Alveolo", "preview_limit": 15 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::ConnectionConfig;
use crate::error::{AlveoloError, Result};
use crate::inference::PromptSettings;

const CONFIG_DIR: &str = "alveolo";
const LOCAL_CONFIG_DIR: &str = ".alveolo";
const CONFIG_FILE: &str = "config.json";

/// Contents of one configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlveoloConfig {
    /// Named connections
    #[serde(default)]
    pub connections: BTreeMap<String, StoredConnection>,

    /// Name of the default connection (must exist in `connections`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// System prompt settings used by `discover`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<PromptSettings>,
}

impl AlveoloConfig {
    /// Overlay `local` on top of `self`
    #[must_use]
    pub fn merged_with(mut self, local: Self) -> Self {
        self.connections.extend(local.connections);
        if local.default.is_some() {
            self.default = local.default;
        }
        if local.discovery.is_some() {
            self.discovery = local.discovery;
        }
        self
    }

    /// Prompt settings, falling back to the built-in defaults
    #[must_use]
    pub fn discovery_settings(&self) -> PromptSettings {
        self.discovery.clone().unwrap_or_default()
    }

    /// Look up a connection by name, or the default one
    ///
    /// Returns the resolved config and the `readonly` flag.
    pub fn resolve(&self, name: Option<&str>) -> Result<(ConnectionConfig, bool)> {
        let conn_name = match name {
            Some(n) => n,
            None => self.default.as_deref().ok_or_else(|| {
                AlveoloError::config_error(format!(
                    "No default connection set. Available connections: {:?}. \
                     Specify one with --name or set a default in the config.",
                    self.connections.keys().collect::<Vec<_>>()
                ))
            })?,
        };

        let stored = self.connections.get(conn_name).ok_or_else(|| {
            AlveoloError::config_error(format!(
                "Connection '{conn_name}' not found. Available connections: {:?}",
                self.connections.keys().collect::<Vec<_>>()
            ))
        })?;

        stored.resolve()
    }
}

/// Stored connection configuration
///
/// Similar to `ConnectionConfig` but supports environment variable references
/// for sensitive fields like passwords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConnection {
    /// Connection configuration
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Whether queries on this connection are always read-only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub readonly: bool,
}

impl StoredConnection {
    /// Resolve environment variables and return a `ConnectionConfig` and readonly flag
    pub fn resolve(&self) -> Result<(ConnectionConfig, bool)> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            let password = std::env::var(env_var).map_err(|_| {
                AlveoloError::config_error(format!(
                    "Environment variable {env_var} not found for password"
                ))
            })?;
            config.password = Some(password);
        }

        Ok((config, self.readonly))
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.alveolo/config.json` (team-shareable)
    Local,
    /// Global config: `<config_dir>/alveolo/config.json` (per-user)
    Global,
}

impl ConfigLocation {
    /// Path of the config file for this location
    pub fn path(self) -> Result<PathBuf> {
        match self {
            Self::Local => local_config_path(),
            Self::Global => global_config_path(),
        }
    }
}

/// Get path to local config file (`.alveolo/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        AlveoloError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE))
}

/// Get path to global config file (`<config_dir>/alveolo/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AlveoloError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load a config file (a missing file is an empty config)
pub fn load_config(path: &Path) -> Result<AlveoloConfig> {
    if !path.exists() {
        return Ok(AlveoloConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| AlveoloError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        AlveoloError::config_error(format!(
            "Invalid config file format in {}: {e}",
            path.display()
        ))
    })
}

/// Save a config file, creating its directory if needed
pub fn save_config(path: &Path, config: &AlveoloConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AlveoloError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| AlveoloError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| AlveoloError::config_error(format!("Could not write config file: {e}")))
}

/// Load the merged view of the global and local config files
pub fn load_with_precedence() -> Result<AlveoloConfig> {
    let global = load_config(&global_config_path()?)?;
    let local = load_config(&local_config_path()?)?;
    Ok(global.merged_with(local))
}

/// Resolve a named connection (or the default one) from the merged view
///
/// Returns a tuple of (`ConnectionConfig`, `is_readonly`).
pub fn resolve_connection(name: Option<&str>) -> Result<(ConnectionConfig, bool)> {
    load_with_precedence()?.resolve(name)
}

/// Save a connection to a config file
///
/// The first connection saved to a file becomes its default.
pub fn save_connection(
    name: &str,
    stored: StoredConnection,
    location: ConfigLocation,
) -> Result<PathBuf> {
    let path = location.path()?;
    let mut config = load_config(&path)?;

    add_connection(&mut config, name, stored);
    save_config(&path, &config)?;

    tracing::info!(connection = name, path = %path.display(), "saved connection");
    Ok(path)
}

fn add_connection(config: &mut AlveoloConfig, name: &str, stored: StoredConnection) {
    if config.connections.is_empty() {
        config.default = Some(name.to_string());
    }
    config.connections.insert(name.to_string(), stored);
}

/// List all connections from the merged view, sorted by name
///
/// Connections whose password variable is missing are skipped.
pub fn list_connections() -> Result<Vec<(String, ConnectionConfig)>> {
    let config = load_with_precedence()?;

    let mut connections = Vec::new();
    for (name, stored) in &config.connections {
        match stored.resolve() {
            Ok((resolved, _readonly)) => connections.push((name.clone(), resolved)),
            // Error details not logged to prevent credential leakage
            Err(_) => tracing::warn!(connection = %name, "could not resolve connection"),
        }
    }

    Ok(connections)
}
