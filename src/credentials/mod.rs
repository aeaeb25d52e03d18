//! Login credentials for the document service.
//!
//! The pipeline never stores credentials itself. A `credentials.toml` file
//! names a backend, and the backend maps the logical keys `username` and
//! `password` to wherever the secrets actually live:
//!
//! ```toml
//! backend = "pass"
//! path = "office/wps-docs"
//!
//! [fields]
//! username = "login"
//! ```

mod config;
mod env;
mod pass;

pub use config::CredentialConfig;
pub use env::{EnvConfig, EnvCredentialStore};
pub use pass::{PassConfig, PassCredentialStore};

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;

/// Logical key for the account name.
pub const USERNAME_KEY: &str = "username";

/// Logical key for the account password.
pub const PASSWORD_KEY: &str = "password";

/// A read-only key-value source of secrets.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by logical key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;
}

/// Username and password submitted on the login form.
#[derive(Debug)]
pub struct LoginCredentials {
    pub username: SecretString,
    pub password: SecretString,
}

impl LoginCredentials {
    /// Fetch both login keys from `store`. Either one missing is an error.
    pub async fn fetch(store: &dyn CredentialStore) -> Result<Self> {
        let username = store
            .get(USERNAME_KEY)
            .await?
            .with_context(|| format!("Credential store has no {USERNAME_KEY:?} entry"))?;
        let password = store
            .get(PASSWORD_KEY)
            .await?
            .with_context(|| format!("Credential store has no {PASSWORD_KEY:?} entry"))?;

        Ok(Self { username, password })
    }
}
