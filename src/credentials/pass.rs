//! Password-store (pass) credential backend.
//!
//! Each entry can hold several fields as `field-name: value` lines. The first
//! line is the password.

use std::collections::HashMap;
use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::CredentialStore;

/// Configuration for a pass credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// The pass entry path (e.g., "office/wps-docs").
    pub path: String,

    /// Mapping from logical key names to field names in the pass entry.
    /// If not specified, the logical key name is used as-is.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// Credential store backed by password-store (pass).
pub struct PassCredentialStore {
    config: PassConfig,
}

impl PassCredentialStore {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }

    fn field_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.config
            .fields
            .get(key)
            .map(|s| s.as_str())
            .unwrap_or(key)
    }

    fn read_entry(&self) -> Result<PassEntry> {
        let output = Command::new("pass")
            .arg("show")
            .arg(&self.config.path)
            .output()
            .context("Failed to run pass command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pass command failed: {}", stderr.trim());
        }

        let content = String::from_utf8(output.stdout).context("Invalid UTF-8 in pass output")?;

        Ok(PassEntry::parse(&content))
    }
}

#[async_trait]
impl CredentialStore for PassCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let field = self.field_name(key).to_string();
        let path = self.config.path.clone();
        let store = PassCredentialStore::new(self.config.clone());

        // `pass` may block on a gpg-agent pinentry.
        let entry = tokio::task::spawn_blocking(move || store.read_entry())
            .await
            .with_context(|| format!("pass lookup for {path} panicked"))??;

        Ok(entry.fields.get(&field).map(|v| SecretString::from(v.clone())))
    }
}

/// Parsed pass entry.
#[derive(Debug, Default)]
struct PassEntry {
    fields: HashMap<String, String>,
}

impl PassEntry {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let mut fields = HashMap::new();

        if let Some(password) = lines.next() {
            fields.insert("password".to_string(), password.to_string());
        }

        for line in lines {
            if let Some((key, value)) = line.split_once(": ") {
                fields.insert(key.trim().to_string(), value.to_string());
            }
        }

        Self { fields }
    }
}
