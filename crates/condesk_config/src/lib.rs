//! Configuration for the package manager front-end.
//!
//! A single TOML file (`config.toml` in the platform config directory)
//! controls the channel list, the target platform subdirectory, cache
//! placement, the registry domain and proxy routing. Everything has a
//! default; a missing file is not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use condesk_consts::consts;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const CONDA_CHANNEL_HOST: &str = "https://conda.anaconda.org";

// Proxy environment fallbacks, checked in order, like curl does.
const ENV_HTTP_PROXY: &[&str] = &["http_proxy", "all_proxy", "ALL_PROXY"];
const ENV_HTTPS_PROXY: &[&str] = &["https_proxy", "HTTPS_PROXY", "all_proxy", "ALL_PROXY"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Channel names or full channel URLs, highest priority first.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,

    /// Platform subdirectory override (`linux-64`, `osx-arm64`, ...). The
    /// running platform is detected when unset.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Where downloaded repodata and metadata are cached.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// The package registry API domain.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_domain: Option<Url>,

    /// Https/Http proxy configuration.
    #[serde(default)]
    #[serde(skip_serializing_if = "ProxyConfig::is_default")]
    pub proxy_config: ProxyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProxyConfig {
    /// https proxy.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<Url>,
    /// http proxy.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<Url>,
    /// Host patterns that bypass the proxy.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub non_proxy_hosts: Vec<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid proxy url")]
    Proxy(#[source] Arc<reqwest::Error>),
}

impl Config {
    /// Load the user-level configuration, falling back to defaults when no
    /// file exists.
    pub fn load_global() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file path.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        toml_edit::de::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The configured channels, or the stock defaults when none are set.
    pub fn channels(&self) -> Vec<String> {
        if self.channels.is_empty() {
            consts::DEFAULT_CHANNELS
                .iter()
                .map(|channel| channel.to_string())
                .collect()
        } else {
            self.channels.clone()
        }
    }

    /// Resolve the channel list to base URLs. Bare names are anchored on the
    /// public conda channel host; URLs pass through with any trailing slash
    /// trimmed.
    pub fn channel_base_urls(&self) -> Vec<Url> {
        self.channels()
            .iter()
            .filter_map(|channel| {
                let spec = if channel.starts_with("http://") || channel.starts_with("https://") {
                    channel.trim_end_matches('/').to_string()
                } else {
                    format!("{CONDA_CHANNEL_HOST}/{channel}")
                };
                match Url::parse(&spec) {
                    Ok(url) => Some(url),
                    Err(error) => {
                        tracing::warn!("ignoring invalid channel `{channel}`: {error}");
                        None
                    }
                }
            })
            .collect()
    }

    /// The platform subdirectory used in repodata URLs.
    pub fn platform(&self) -> String {
        self.platform
            .clone()
            .unwrap_or_else(|| detect_platform().to_string())
    }

    /// The directory repodata and metadata are cached under.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(consts::APP_NAME)
                .join(consts::CACHE_DIR)
        })
    }

    /// The registry API domain.
    pub fn registry_domain(&self) -> Url {
        self.registry_domain
            .clone()
            .unwrap_or_else(|| consts::DEFAULT_REGISTRY_DOMAIN.clone())
    }

    /// Proxies to install on the HTTP client, honoring the configuration
    /// first and the conventional environment variables second.
    pub fn reqwest_proxies(&self) -> Result<Vec<reqwest::Proxy>, ConfigError> {
        let https = self
            .proxy_config
            .https
            .as_ref()
            .map(|url| url.to_string())
            .or_else(|| first_env(ENV_HTTPS_PROXY));
        let http = self
            .proxy_config
            .http
            .as_ref()
            .map(|url| url.to_string())
            .or_else(|| first_env(ENV_HTTP_PROXY));
        let no_proxy = (!self.proxy_config.non_proxy_hosts.is_empty())
            .then(|| self.proxy_config.non_proxy_hosts.iter().join(","))
            .and_then(|hosts| reqwest::NoProxy::from_string(&hosts));

        let mut proxies = Vec::new();
        if let Some(https) = https {
            let proxy = reqwest::Proxy::https(&https)
                .map_err(|error| ConfigError::Proxy(Arc::new(error)))?;
            proxies.push(proxy.no_proxy(no_proxy.clone()));
        }
        if let Some(http) = http {
            let proxy = reqwest::Proxy::http(&http)
                .map_err(|error| ConfigError::Proxy(Arc::new(error)))?;
            proxies.push(proxy.no_proxy(no_proxy));
        }
        Ok(proxies)
    }
}

impl ProxyConfig {
    pub fn is_default(&self) -> bool {
        self.https.is_none() && self.http.is_none() && self.non_proxy_hosts.is_empty()
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(consts::APP_NAME).join(consts::CONFIG_FILE))
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
}

fn detect_platform() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => "linux-64",
        ("linux", "aarch64") => "linux-aarch64",
        ("macos", "x86_64") => "osx-64",
        ("macos", "aarch64") => "osx-arm64",
        ("windows", "x86_64") => "win-64",
        ("windows", "aarch64") => "win-arm64",
        _ => "noarch",
    }
}
