//! Credential configuration.
//!
//! Defines the format for the `credentials.toml` file referenced from the
//! `[login]` section of the main config.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::env::{EnvConfig, EnvCredentialStore};
use super::pass::{PassConfig, PassCredentialStore};
use super::CredentialStore;

/// Configuration for a credential store.
///
/// # Example
///
/// ```toml
/// backend = "pass"
/// path = "office/wps-docs"
///
/// [fields]
/// username = "login"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Password-store (pass) backend.
    Pass {
        #[serde(flatten)]
        config: PassConfig,
    },
    /// Environment variables.
    Env {
        #[serde(flatten)]
        config: EnvConfig,
    },
}

impl CredentialConfig {
    /// Load credential configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials config: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse credentials config: {}", path.display()))
    }

    /// Build a credential store from this configuration.
    pub fn build(&self) -> Box<dyn CredentialStore> {
        match self {
            CredentialConfig::Pass { config } => {
                Box::new(PassCredentialStore::new(config.clone()))
            }
            CredentialConfig::Env { config } => Box::new(EnvCredentialStore::new(config.clone())),
        }
    }
}
