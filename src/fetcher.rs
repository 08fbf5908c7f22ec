//! Module download and version lookup
//!
//! [`GoModuleFetcher`] drives the `go` toolchain for downloads and falls back to
//! the module proxy HTTP protocol for version queries when `go list` is not
//! usable.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::config::FetcherConfig;
use crate::error::FetchError;

/// Downloads versioned modules and answers version queries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Make `identifier@version` available in the local module cache
    async fn download(&self, identifier: &str, version: &str) -> Result<(), FetchError>;

    /// On-disk location of an already downloaded module
    async fn module_path(&self, identifier: &str, version: &str) -> Result<PathBuf, FetchError>;

    /// Every published version, in the order the backend reports them
    async fn list_versions(&self, identifier: &str) -> Result<Vec<String>, FetchError>;

    async fn latest_version(&self, identifier: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Deserialize)]
struct ProxyInfo {
    #[serde(rename = "Version", default)]
    version: String,
}

/// [`ModuleFetcher`] backed by the Go toolchain and module proxy
pub struct GoModuleFetcher {
    go_binary: String,
    proxy_url: String,
    mod_cache: Option<PathBuf>,
    http: reqwest::Client,
}

impl GoModuleFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(concat!("proto-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| FetchError::Http {
                url: config.proxy_url.clone(),
                source,
            })?;

        Ok(Self {
            go_binary: config.go_binary.clone(),
            proxy_url: config.proxy_url.trim_end_matches('/').to_string(),
            mod_cache: config.mod_cache.as_ref().map(PathBuf::from),
            http,
        })
    }

    /// Run the go binary and return its stdout
    async fn run_go(&self, args: &[&str]) -> Result<String, FetchError> {
        let command = format!("{} {}", self.go_binary, args.join(" "));
        debug!("Running: {}", command);

        let output = AsyncCommand::new(&self.go_binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(FetchError::CommandFailed {
                command,
                output: combined.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn mod_cache(&self) -> Result<PathBuf, FetchError> {
        if let Some(mod_cache) = &self.mod_cache {
            return Ok(mod_cache.clone());
        }

        let output = self.run_go(&["env", "GOMODCACHE"]).await?;
        let mod_cache = output.trim();
        if mod_cache.is_empty() {
            return Err(FetchError::EmptyModCache);
        }
        Ok(PathBuf::from(mod_cache))
    }

    /// `go list -m -versions` output: the module path followed by its versions
    async fn go_list_versions(&self, identifier: &str) -> Option<Vec<String>> {
        match self.run_go(&["list", "-m", "-versions", identifier]).await {
            Ok(output) => {
                let tokens: Vec<String> = output.split_whitespace().map(str::to_string).collect();
                if tokens.len() > 1 {
                    Some(tokens[1..].to_vec())
                } else {
                    None
                }
            }
            Err(e) => {
                debug!("go list failed for {}, falling back to proxy: {}", identifier, e);
                None
            }
        }
    }

    async fn proxy_get(&self, identifier: &str, endpoint: &str) -> Result<(String, String), FetchError> {
        let url = format!(
            "{}/{}/{}",
            self.proxy_url,
            escape_module_path(identifier),
            endpoint
        );
        debug!("Querying module proxy: {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;
        Ok((url, body))
    }
}

#[async_trait]
impl ModuleFetcher for GoModuleFetcher {
    async fn download(&self, identifier: &str, version: &str) -> Result<(), FetchError> {
        let module = format!("{}@{}", identifier, version);
        info!("Downloading {}...", module);
        self.run_go(&["mod", "download", &module]).await?;
        Ok(())
    }

    async fn module_path(&self, identifier: &str, version: &str) -> Result<PathBuf, FetchError> {
        let mod_cache = self.mod_cache().await?;
        Ok(mod_cache.join(format!("{}@{}", escape_module_path(identifier), version)))
    }

    async fn list_versions(&self, identifier: &str) -> Result<Vec<String>, FetchError> {
        info!("Listing available versions for {}...", identifier);

        if let Some(versions) = self.go_list_versions(identifier).await {
            return Ok(versions);
        }

        let (_, body) = self.proxy_get(identifier, "@v/list").await?;
        Ok(body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn latest_version(&self, identifier: &str) -> Result<String, FetchError> {
        info!("Checking latest version for {}...", identifier);

        if let Some(latest) = self
            .go_list_versions(identifier)
            .await
            .and_then(|versions| versions.last().cloned())
        {
            return Ok(latest);
        }

        let (url, body) = self.proxy_get(identifier, "@latest").await?;
        let info: ProxyInfo =
            serde_json::from_str(&body).map_err(|e| FetchError::InvalidResponse {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if info.version.is_empty() {
            return Err(FetchError::InvalidResponse {
                url,
                message: format!("empty version returned for {}", identifier),
            });
        }
        Ok(info.version)
    }
}

/// Case-encode a module path the way the module cache and proxy expect
///
/// Upper-case letters become `!` followed by the lower-case letter, so
/// `github.com/Acme/API` is stored as `github.com/!acme/!a!p!i`.
pub fn escape_module_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config(mod_cache: Option<&str>) -> FetcherConfig {
        FetcherConfig {
            go_binary: "/nonexistent/bin/go".to_string(),
            proxy_url: "http://127.0.0.1:9/".to_string(),
            timeout: 2,
            mod_cache: mod_cache.map(str::to_string),
        }
    }

    #[test]
    fn test_escape_module_path() {
        assert_eq!(escape_module_path("github.com/acme/x"), "github.com/acme/x");
        assert_eq!(escape_module_path("github.com/Acme/API"), "github.com/!acme/!a!p!i");
    }

    #[test]
    fn test_proxy_url_is_normalized() {
        let fetcher = GoModuleFetcher::new(&offline_config(None)).unwrap();
        assert_eq!(fetcher.proxy_url, "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_module_path_uses_configured_cache() {
        let fetcher = GoModuleFetcher::new(&offline_config(Some("/var/cache/gomod"))).unwrap();
        let path = fetcher
            .module_path("github.com/Acme/schemas", "v1.2.3")
            .await
            .unwrap();

        assert_eq!(path, PathBuf::from("/var/cache/gomod/github.com/!acme/schemas@v1.2.3"));
    }

    #[tokio::test]
    async fn test_missing_go_binary_is_a_spawn_error() {
        let fetcher = GoModuleFetcher::new(&offline_config(None)).unwrap();

        let err = fetcher.download("github.com/acme/x", "v1.0.0").await.unwrap_err();
        assert!(matches!(err, FetchError::Spawn { .. }));
        assert!(err.to_string().contains("mod download github.com/acme/x@v1.0.0"));

        let err = fetcher.module_path("github.com/acme/x", "v1.0.0").await.unwrap_err();
        assert!(matches!(err, FetchError::Spawn { .. }));
    }
}
