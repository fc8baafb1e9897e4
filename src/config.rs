//! TOML configuration for the `kbd` client.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//! timeout_secs = 30
//! ask_timeout_secs = 600
//!
//! [session]
//! path = "/home/me/.config/kbdesk/session.toml"
//!
//! [history]
//! limit = 20
//!
//! [display]
//! color = "auto"
//! ```
//!
//! Every section is optional. When the config file does not exist the client
//! runs with [`Config::minimal`]; `KBD_API_URL` overrides `api.base_url`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Generation can take minutes; ask and rerun get their own timeout.
    #[serde(default = "default_ask_timeout_secs")]
    pub ask_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            ask_timeout_secs: default_ask_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ask_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// Where the access token is kept between runs.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kbdesk")
                .join("session.toml")
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DisplayConfig {
    #[serde(default)]
    pub color: ColorMode,
}

impl DisplayConfig {
    pub fn use_color(&self) -> bool {
        match self.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => atty::is(atty::Stream::Stdout),
        }
    }
}

impl Config {
    /// Defaults for every section, used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            history: HistoryConfig::default(),
            display: DisplayConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        let url = self.api.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("api.base_url must start with http:// or https://, got '{}'", url);
        }
        if self.api.timeout_secs == 0 || self.api.ask_timeout_secs == 0 {
            bail!("api.timeout_secs and api.ask_timeout_secs must be > 0");
        }
        if !(1..=100).contains(&self.history.limit) {
            bail!("history.limit must be in 1..=100");
        }
        Ok(())
    }
}

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "KBD_API_URL";

/// Load and validate the config at `path`, honouring `KBD_API_URL`.
///
/// A missing file yields [`Config::minimal`]; an unreadable or invalid file
/// is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, std::env::var(API_URL_ENV).ok())
}

/// Like [`load_config`] with the server override passed in.
pub fn load_config_with(path: &Path, api_url: Option<String>) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::minimal()
    };

    if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
        config.api.base_url = url;
    }
    config.api.base_url = config.api.base_url.trim_end_matches('/').to_string();

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(tmp: &TempDir, content: &str) -> PathBuf {
        let path = tmp.path().join("kbd.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_minimal() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config_with(&tmp.path().join("absent.toml"), None).unwrap();
        assert_eq!(cfg.history.limit, 20);
        assert_eq!(cfg.api.ask_timeout_secs, 600);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[api]\nbase_url = \"https://kb.example.org/api/\"\n");
        let cfg = load_config_with(&path, None).unwrap();
        assert_eq!(cfg.api.base_url, "https://kb.example.org/api");
        assert_eq!(cfg.api.timeout_secs, 30);
        assert_eq!(cfg.display.color, ColorMode::Auto);
    }

    #[test]
    fn test_api_url_override() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[api]\nbase_url = \"https://kb.example.org/api\"\n");
        let cfg = load_config_with(&path, Some("http://localhost:9000/".into())).unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:9000");

        let cfg = load_config_with(&path, Some("  ".into())).unwrap();
        assert_eq!(cfg.api.base_url, "https://kb.example.org/api");
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[api]\nbase_url = \"ftp://kb\"\n");
        assert!(load_config_with(&path, None).is_err());
    }

    #[test]
    fn test_rejects_history_limit() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[history]\nlimit = 0\n");
        assert!(load_config_with(&path, None).is_err());
    }

    #[test]
    fn test_color_mode_parse() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[display]\ncolor = \"never\"\n");
        let cfg = load_config_with(&path, None).unwrap();
        assert!(!cfg.display.use_color());
    }
}
