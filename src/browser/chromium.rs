//! [`DocumentSession`] over the Chrome DevTools Protocol.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use secrecy::ExposeSecret;
use tokio::task::JoinHandle;

use super::{load_login_credentials, DocumentSession};
use crate::config::{BrowserSettings, LoginConfig};
use crate::credentials::LoginCredentials;
use crate::error::{PipelineError, Result};

/// A Chrome/Chromium process with a single page, downloading into a fixed directory.
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Option<Page>,
    settings: BrowserSettings,
    login: LoginConfig,
    credentials: Option<LoginCredentials>,
    terminated: bool,
}

impl ChromiumSession {
    /// Launch the browser and point its downloads at `download_dir`.
    ///
    /// Credentials are resolved before the browser starts. If page setup
    /// fails after launch, the browser is closed before returning.
    pub async fn launch(
        settings: &BrowserSettings,
        login: &LoginConfig,
        download_dir: &Path,
    ) -> Result<Self> {
        let credentials = load_login_credentials(login).await?;

        std::fs::create_dir_all(download_dir).map_err(|e| {
            PipelineError::io(
                format!("Failed to create download dir: {}", download_dir.display()),
                e,
            )
        })?;

        let (browser, mut handler) = launch_browser(settings).await?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let mut session = Self {
            browser,
            handler_task,
            page: None,
            settings: settings.clone(),
            login: login.clone(),
            credentials,
            terminated: false,
        };

        if let Err(err) = session.open_page(download_dir).await {
            if let Err(close_err) = session.terminate().await {
                tracing::warn!(error = %close_err, "Failed to close browser after setup error");
            }
            return Err(err);
        }

        Ok(session)
    }

    async fn open_page(&mut self, download_dir: &Path) -> Result<()> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(cdp("Failed to open page"))?;

        let download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.display().to_string())
            .build()
            .map_err(|e| PipelineError::Browser(format!("Failed to build download params: {e}")))?;
        page.execute(download_params)
            .await
            .map_err(cdp("Failed to set download directory"))?;

        tracing::debug!(dir = %download_dir.display(), "Browser downloads redirected");
        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| PipelineError::Browser("browser session has no open page".to_string()))
    }

    async fn submit_credentials(&mut self, credentials: &LoginCredentials) -> Result<()> {
        let timeout = self.settings.element_timeout;
        let (Some(user_sel), Some(pass_sel)) = (
            self.login.username_selector.clone(),
            self.login.password_selector.clone(),
        ) else {
            return Err(PipelineError::InvalidConfig(
                "[login] credentials requires username_selector and password_selector".to_string(),
            ));
        };

        let username = self.wait_for_element(&user_sel, timeout).await?;
        username.click().await.map_err(cdp("Failed to focus username field"))?;
        username
            .type_str(credentials.username.expose_secret())
            .await
            .map_err(cdp("Failed to type username"))?;

        let password = self.wait_for_element(&pass_sel, timeout).await?;
        password.click().await.map_err(cdp("Failed to focus password field"))?;
        password
            .type_str(credentials.password.expose_secret())
            .await
            .map_err(cdp("Failed to type password"))?;

        match self.login.submit_selector.clone() {
            Some(submit_sel) => {
                let submit = self.wait_for_element(&submit_sel, timeout).await?;
                self.click(&submit).await?;
            }
            None => {
                password
                    .press_key("Enter")
                    .await
                    .map_err(cdp("Failed to submit login form"))?;
            }
        }

        tracing::info!("Submitted login credentials");
        Ok(())
    }

    /// Poll until `selector` exists and its text contains `text`.
    async fn wait_for_text(&self, selector: &str, text: &str, max_wait: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            if let Ok(element) = self.page()?.find_element(selector).await {
                if let Ok(Some(inner)) = element.inner_text().await {
                    if inner.contains(text) {
                        return Ok(true);
                    }
                }
            }

            if start.elapsed() >= max_wait {
                return Ok(false);
            }
            tokio::time::sleep(self.settings.element_poll_interval).await;
        }
    }
}

#[async_trait]
impl DocumentSession for ChromiumSession {
    type Element = Element;

    async fn login(&mut self) -> Result<()> {
        let login_url = self.settings.login_url.clone();
        self.navigate_to(&login_url).await?;

        if let Some(credentials) = self.credentials.take() {
            let submitted = self.submit_credentials(&credentials).await;
            self.credentials = Some(credentials);
            submitted?;
        } else {
            tracing::info!(
                timeout_secs = self.settings.login_timeout.as_secs(),
                "Sign in to the document service in the browser window"
            );
        }

        let selector = self.settings.login_marker_selector.clone();
        let marker = self.settings.login_marker_text.clone();
        let timeout = self.settings.login_timeout;
        if !self.wait_for_text(&selector, &marker, timeout).await? {
            return Err(PipelineError::LoginTimeout {
                selector,
                marker,
                timeout,
            });
        }

        tracing::info!(marker = %marker, "Login confirmed");
        Ok(())
    }

    async fn navigate_to(&mut self, url: &str) -> Result<()> {
        tracing::debug!(url, "Navigating");
        self.page()?
            .goto(url)
            .await
            .map_err(cdp(&format!("Failed to navigate to {url}")))?;
        Ok(())
    }

    async fn wait_for_element(&mut self, selector: &str, max_wait: Duration) -> Result<Element> {
        let start = Instant::now();
        loop {
            match self.page()?.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(err) => tracing::trace!(selector, error = %err, "Element not present yet"),
            }

            if start.elapsed() >= max_wait {
                return Err(PipelineError::ElementNotFound {
                    selector: selector.to_string(),
                    timeout: max_wait,
                });
            }
            tokio::time::sleep(self.settings.element_poll_interval).await;
        }
    }

    async fn click(&mut self, element: &Element) -> Result<()> {
        element.click().await.map_err(cdp("Click failed"))?;
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        self.page = None;

        let closed = self.browser.close().await;
        if closed.is_ok() {
            if let Err(err) = self.browser.wait().await {
                tracing::debug!(error = %err, "Browser process did not report exit status");
            }
        }
        self.handler_task.abort();

        closed.map_err(cdp("Failed to close browser"))?;
        tracing::info!("Browser session terminated");
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if !self.terminated {
            tracing::warn!("Browser session dropped without terminate");
            self.handler_task.abort();
        }
    }
}

fn cdp(context: &str) -> impl Fn(CdpError) -> PipelineError + '_ {
    move |err| PipelineError::Browser(format!("{context}: {err}"))
}

async fn launch_browser(
    settings: &BrowserSettings,
) -> Result<(Browser, chromiumoxide::handler::Handler)> {
    let chrome_path = match &settings.executable {
        Some(path) => path.clone(),
        None => find_chrome().ok_or_else(|| {
            PipelineError::Browser(
                "Chrome/Chromium not found. Install it or set [browser] executable.".to_string(),
            )
        })?,
    };

    let mut builder = BrowserConfig::builder()
        .chrome_executable(&chrome_path)
        .viewport(None)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check");
    if !settings.headless {
        builder = builder.with_head();
    }
    if let Some(profile_dir) = &settings.profile_dir {
        std::fs::create_dir_all(profile_dir).map_err(|e| {
            PipelineError::io(
                format!("Failed to create profile dir: {}", profile_dir.display()),
                e,
            )
        })?;
        builder = builder.user_data_dir(profile_dir);
    }

    let config = builder
        .build()
        .map_err(|e| PipelineError::Browser(format!("Failed to configure browser: {e}")))?;

    tracing::info!(executable = %chrome_path.display(), headless = settings.headless, "Launching browser");
    Browser::launch(config)
        .await
        .map_err(cdp("Failed to launch browser"))
}

/// Find a Chrome/Chromium executable on `PATH` or in the usual install locations.
fn find_chrome() -> Option<PathBuf> {
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        let Ok(output) = std::process::Command::new("which").arg(name).output() else {
            continue;
        };
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }

    [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|candidate| candidate.exists())
}
