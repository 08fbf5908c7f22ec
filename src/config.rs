use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional settings file for proto-sync
///
/// Every value here is a fallback: command-line flags and environment
/// variables take precedence.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Fallback paths used when neither a flag nor an env var is given
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Module download settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DefaultsConfig {
    /// Where proto files live inside a downloaded module
    #[serde(default = "default_source_path")]
    pub source_path: String,

    #[serde(default = "default_buf_yaml")]
    pub buf_yaml: String,

    #[serde(default = "default_go_mod")]
    pub go_mod: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetcherConfig {
    /// Go toolchain binary
    #[serde(default = "default_go_binary")]
    pub go_binary: String,

    /// Module proxy used when `go list` is unavailable
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Module cache location; `go env GOMODCACHE` when unset
    #[serde(default)]
    pub mod_cache: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_source_path() -> String {
    "schemas/api/v1".to_string()
}
fn default_buf_yaml() -> String {
    "buf.yaml".to_string()
}
fn default_go_mod() -> String {
    "../go.mod".to_string()
}
fn default_go_binary() -> String {
    "go".to_string()
}
fn default_proxy_url() -> String {
    "https://proxy.golang.org".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            buf_yaml: default_buf_yaml(),
            go_mod: default_go_mod(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            go_binary: default_go_binary(),
            proxy_url: default_proxy_url(),
            timeout: default_timeout(),
            mod_cache: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load the settings file at the default location, or built-in defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No settings file at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        settings.expand_paths()?;

        Ok(settings)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("proto-sync").join("config.yml"))
    }

    pub fn expand_paths(&mut self) -> Result<()> {
        self.defaults.buf_yaml = shellexpand::full(&self.defaults.buf_yaml)
            .context("Failed to expand buf_yaml path")?
            .into_owned();

        self.defaults.go_mod = shellexpand::full(&self.defaults.go_mod)
            .context("Failed to expand go_mod path")?
            .into_owned();

        self.fetcher.go_binary = shellexpand::full(&self.fetcher.go_binary)
            .context("Failed to expand go_binary path")?
            .into_owned();

        if let Some(mod_cache) = &self.fetcher.mod_cache {
            self.fetcher.mod_cache = Some(
                shellexpand::full(mod_cache)
                    .context("Failed to expand mod_cache path")?
                    .into_owned(),
            );
        }

        Ok(())
    }
}
