//! Environment-variable credential backend.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::CredentialStore;

/// Configuration for an environment credential store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Mapping from logical key names to variable names. Unmapped keys are
    /// read from `STOCKSYNC_<KEY>`.
    #[serde(default)]
    pub vars: HashMap<String, String>,
}

pub struct EnvCredentialStore {
    config: EnvConfig,
}

impl EnvCredentialStore {
    pub fn new(config: EnvConfig) -> Self {
        Self { config }
    }

    fn var_name(&self, key: &str) -> String {
        self.config
            .vars
            .get(key)
            .cloned()
            .unwrap_or_else(|| format!("STOCKSYNC_{}", key.to_uppercase()))
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        match std::env::var(self.var_name(key)) {
            Ok(value) if !value.is_empty() => Ok(Some(SecretString::from(value))),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(err @ std::env::VarError::NotUnicode(_)) => {
                anyhow::bail!("{} is not valid UTF-8: {err}", self.var_name(key))
            }
        }
    }
}
