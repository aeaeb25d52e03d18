//! Browser session against the document service.
//!
//! The pipeline only talks to the [`DocumentSession`] trait. The Chrome
//! DevTools implementation lives in [`chromium`] behind the `browser` feature.

#[cfg(feature = "browser")]
pub mod chromium;

#[cfg(feature = "browser")]
pub use chromium::ChromiumSession;

use std::time::Duration;

use crate::config::LoginConfig;
use crate::credentials::{CredentialConfig, LoginCredentials};
use crate::error::{PipelineError, Result};

/// One authenticated browser session.
///
/// Every wait is bounded by the caller. [`terminate`](Self::terminate) must be
/// called exactly once; the pipeline guarantees this on every exit path.
#[async_trait::async_trait]
pub trait DocumentSession: Send {
    /// Handle to an element found on the current page.
    type Element: Send + Sync;

    /// Sign in and block until the login success marker shows up.
    async fn login(&mut self) -> Result<()>;

    async fn navigate_to(&mut self, url: &str) -> Result<()>;

    /// Poll for `selector` until it is present or `max_wait` elapses.
    async fn wait_for_element(
        &mut self,
        selector: &str,
        max_wait: Duration,
    ) -> Result<Self::Element>;

    async fn click(&mut self, element: &Self::Element) -> Result<()>;

    /// Close the browser and release its process.
    async fn terminate(&mut self) -> Result<()>;
}

/// Load the login credentials named by `[login] credentials`, if any.
///
/// A configured credentials file without form selectors is rejected up front
/// so the failure doesn't surface halfway through a login.
pub async fn load_login_credentials(login: &LoginConfig) -> Result<Option<LoginCredentials>> {
    let Some(path) = &login.credentials else {
        return Ok(None);
    };

    if login.username_selector.is_none() || login.password_selector.is_none() {
        return Err(PipelineError::InvalidConfig(
            "[login] credentials requires username_selector and password_selector".to_string(),
        ));
    }

    let store = CredentialConfig::load(path)
        .map_err(|e| PipelineError::InvalidConfig(format!("{e:#}")))?
        .build();
    let credentials = LoginCredentials::fetch(store.as_ref())
        .await
        .map_err(|e| PipelineError::InvalidConfig(format!("{e:#}")))?;

    Ok(Some(credentials))
}
