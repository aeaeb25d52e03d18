use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::human;

/// Download detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Case-insensitive substring the downloaded file name must contain.
    pub keyword: String,

    /// Glob (`*`, `?`) the downloaded file name must match.
    pub pattern: String,

    /// How long to wait for the download to land.
    #[serde(with = "human")]
    pub timeout: Duration,

    /// How often the download directory is listed.
    #[serde(with = "human")]
    pub poll_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            keyword: "stock".to_string(),
            pattern: "*.xlsx".to_string(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Browser launch and login settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Chrome/Chromium executable. Searched for when unset.
    pub executable: Option<PathBuf>,

    /// Run without a visible window. Manual login needs a visible window.
    pub headless: bool,

    /// Persistent profile directory so the service remembers the login.
    /// If relative, resolved from the config file location.
    pub profile_dir: Option<PathBuf>,

    pub login_url: String,

    /// Element whose text confirms a successful login.
    pub login_marker_selector: String,

    /// Text the marker element must contain.
    pub login_marker_text: String,

    #[serde(with = "human")]
    pub login_timeout: Duration,

    /// Bound for element waits that don't set their own.
    #[serde(with = "human")]
    pub element_timeout: Duration,

    /// Interval between DOM checks while waiting for an element.
    #[serde(with = "human")]
    pub element_poll_interval: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: false,
            profile_dir: None,
            login_url: "https://account.wps.com/".to_string(),
            login_marker_selector: "div.header-title".to_string(),
            login_marker_text: "User Center".to_string(),
            login_timeout: Duration::from_secs(120),
            element_timeout: Duration::from_secs(10),
            element_poll_interval: Duration::from_millis(250),
        }
    }
}

/// How the pipeline decides a freshly loaded page is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Readiness {
    /// Sleep unconditionally. Used when the page exposes no usable marker.
    FixedDelay {
        #[serde(with = "human")]
        delay: Duration,
    },
    /// Wait for an element to be present.
    Element {
        selector: String,
        #[serde(with = "human")]
        timeout: Duration,
    },
}

/// The spreadsheet document page and its download menu.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub url: String,

    pub readiness: Readiness,

    /// Button opening the file operations menu.
    pub file_menu_selector: String,

    /// "Download" entry of the file operations menu.
    pub download_entry_selector: String,

    /// The menu controls render slowly, so they get a longer bound.
    #[serde(with = "human")]
    pub menu_timeout: Duration,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            url: "https://sg.docs.wps.com/p/89316816846831".to_string(),
            readiness: Readiness::FixedDelay {
                delay: Duration::from_secs(10),
            },
            file_menu_selector: "button.kd-button.kd-button-icon".to_string(),
            download_entry_selector: r#"div[data-key="Download"]"#.to_string(),
            menu_timeout: Duration::from_secs(30),
        }
    }
}

/// How the native file dialog gets filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogMode {
    /// Type the path automatically where the platform supports it.
    #[default]
    Auto,
    /// Always leave the dialog to a human.
    Manual,
}

/// Upload page and file dialog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// When false the run stops after reconciliation.
    pub enabled: bool,

    pub url: String,

    pub upload_button_selector: String,

    pub file_button_selector: String,

    #[serde(with = "human")]
    pub button_timeout: Duration,

    pub dialog: DialogMode,

    /// Pause after every synthesized keystroke.
    #[serde(with = "human")]
    pub keystroke_delay: Duration,

    /// Pause between the two confirming Return presses.
    #[serde(with = "human")]
    pub confirm_settle: Duration,

    /// How long a human gets to pick the file when typing is unavailable.
    #[serde(with = "human")]
    pub manual_wait: Duration,

    /// Pause after confirming the dialog so the upload can leave the browser.
    #[serde(with = "human")]
    pub post_upload_settle: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://docs.wps.com/".to_string(),
            upload_button_selector: "label.upload-btn-warp".to_string(),
            file_button_selector: "label.upload-file".to_string(),
            button_timeout: Duration::from_secs(10),
            dialog: DialogMode::Auto,
            keystroke_delay: Duration::from_millis(100),
            confirm_settle: Duration::from_secs(1),
            manual_wait: Duration::from_secs(5),
            post_upload_settle: Duration::from_secs(5),
        }
    }
}

/// Optional automatic credential entry on the login page.
///
/// Without a credentials file the operator signs in by hand while the
/// pipeline waits for the login marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// `credentials.toml` describing where the username and password live.
    /// If relative, resolved from the config file location.
    pub credentials: Option<PathBuf>,

    pub username_selector: Option<String>,

    pub password_selector: Option<String>,

    pub submit_selector: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the browser downloads into. If relative, resolved from the
    /// config file location. Defaults to the user's download directory.
    pub download_dir: Option<PathBuf>,

    /// Local sales log. Relative paths live in the download directory.
    pub sales_file: Option<PathBuf>,

    /// Reconciled output. Relative paths live in the download directory.
    pub output_file: Option<PathBuf>,

    /// Name the downloaded stock sheet is renamed to.
    pub stock_file_name: Option<String>,

    pub download: DownloadConfig,

    pub browser: BrowserSettings,

    pub document: DocumentConfig,

    pub upload: UploadConfig,

    pub login: LoginConfig,
}

const DEFAULT_SALES_FILE: &str = "sales.xlsx";
const DEFAULT_OUTPUT_FILE: &str = "stock_updated.xlsx";
const DEFAULT_STOCK_FILE: &str = "stock.xlsx";

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the download directory.
    ///
    /// A relative `download_dir` is resolved against `config_dir`. When unset,
    /// the platform download directory is used, falling back to `config_dir`.
    pub fn resolve_download_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.download_dir {
            Some(dir) => resolve_against(config_dir, dir),
            None => dirs::download_dir().unwrap_or_else(|| config_dir.to_path_buf()),
        }
    }

    fn resolve(self, config_dir: &Path) -> Result<ResolvedConfig> {
        let download_dir = self.resolve_download_dir(config_dir);

        let stock_file_name = self
            .stock_file_name
            .unwrap_or_else(|| DEFAULT_STOCK_FILE.to_string());
        if stock_file_name.is_empty() || stock_file_name.contains(['/', '\\']) {
            anyhow::bail!("stock_file_name must be a plain file name, got {stock_file_name:?}");
        }

        let sales_file = resolve_against(
            &download_dir,
            self.sales_file
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_SALES_FILE)),
        );
        let output_file = resolve_against(
            &download_dir,
            self.output_file
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_OUTPUT_FILE)),
        );
        let stock_file = download_dir.join(&stock_file_name);

        if output_file == stock_file || output_file == sales_file {
            anyhow::bail!(
                "output_file must differ from the reconciliation inputs: {}",
                output_file.display()
            );
        }

        let mut browser = self.browser;
        browser.profile_dir = browser
            .profile_dir
            .map(|dir| resolve_against(config_dir, &dir));

        let mut login = self.login;
        login.credentials = login
            .credentials
            .map(|path| resolve_against(config_dir, &path));

        Ok(ResolvedConfig {
            paths: PipelinePaths {
                download_dir,
                sales_file,
                output_file,
                stock_file,
            },
            download: self.download,
            browser,
            document: self.document,
            upload: self.upload,
            login,
        })
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// The filesystem locations one run works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePaths {
    pub download_dir: PathBuf,
    pub sales_file: PathBuf,
    pub output_file: PathBuf,
    /// Canonical location of the downloaded stock sheet.
    pub stock_file: PathBuf,
}

impl PipelinePaths {
    /// All files inside `download_dir` under their default names.
    pub fn in_dir(download_dir: impl Into<PathBuf>) -> Self {
        let download_dir = download_dir.into();
        Self {
            sales_file: download_dir.join(DEFAULT_SALES_FILE),
            output_file: download_dir.join(DEFAULT_OUTPUT_FILE),
            stock_file: download_dir.join(DEFAULT_STOCK_FILE),
            download_dir,
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub paths: PipelinePaths,
    pub download: DownloadConfig,
    pub browser: BrowserSettings,
    pub document: DocumentConfig,
    pub upload: UploadConfig,
    pub login: LoginConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./stocksync.toml` if it exists in current directory
/// 2. `~/.config/stocksync/stocksync.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("stocksync.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("stocksync").join("stocksync.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// Relative paths are resolved from the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        Config::load(&config_path)?.resolve(config_dir)
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Config::default().resolve(config_dir)
    }

    /// Defaults rooted at `download_dir`, with the browser steps untouched.
    pub fn for_download_dir(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: PipelinePaths::in_dir(download_dir),
            download: DownloadConfig::default(),
            browser: BrowserSettings::default(),
            document: DocumentConfig::default(),
            upload: UploadConfig::default(),
            login: LoginConfig::default(),
        }
    }
}
