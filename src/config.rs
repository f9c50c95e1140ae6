//! Configuration management for car-profile-proxy
//!
//! Settings come from an optional TOML file, then command-line flags on top.
//! Once resolved into [`ProxySettings`] nothing changes for the life of the
//! process.

use crate::error::{ConfigError, ProxyError, ProxyResult};
use crate::profile::{Profile, ProfileSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub profiles: ProfilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Teslamate API base URL, e.g. `http://teslamate-api:4000`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_url: Option<String>,
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Timeout for upstream requests (ms)
    pub upstream_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// JSON file with the car profiles
    pub file: PathBuf,
    /// Profile to apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_url: None,
            host: "127.0.0.1".to_string(),
            port: 4001,
            upstream_timeout_ms: 30_000,
        }
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("cars.json"),
            selected: None,
        }
    }
}

/// Values given on the command line; `Some` wins over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub upstream_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub upstream_timeout_ms: Option<u64>,
    pub cars_file: Option<PathBuf>,
    pub car: Option<String>,
}

impl Config {
    /// Load from `path`, or defaults when no file was given
    pub fn load(path: Option<&Path>) -> ProxyResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific TOML file
    pub fn load_from(path: &Path) -> ProxyResult<Self> {
        let expanded = expand_path(path);
        if !expanded.exists() {
            let what = format!("config file {}", expanded.display());
            return Err(ConfigError::NotFound(what).into());
        }

        debug!("Loading config from {:?}", expanded);
        let content = std::fs::read_to_string(&expanded)?;
        Self::from_toml(&expanded, &content)
    }

    pub fn from_toml(path: &Path, content: &str) -> ProxyResult<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Apply command-line values on top of the file
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.upstream_url {
            self.proxy.upstream_url = Some(url);
        }
        if let Some(host) = overrides.host {
            self.proxy.host = host;
        }
        if let Some(port) = overrides.port {
            self.proxy.port = port;
        }
        if let Some(timeout) = overrides.upstream_timeout_ms {
            self.proxy.upstream_timeout_ms = timeout;
        }
        if let Some(file) = overrides.cars_file {
            self.profiles.file = file;
        }
        if let Some(car) = overrides.car {
            self.profiles.selected = Some(car);
        }
    }

    /// Expand paths (resolve ~ and environment variables)
    pub fn expand_paths(&mut self) {
        self.profiles.file = expand_path(&self.profiles.file);
    }

    /// Validate configuration
    pub fn validate(&self) -> ProxyResult<()> {
        if self.proxy.port == 0 {
            return Err(ProxyError::InvalidConfig {
                field: "proxy.port".into(),
                value: "0".into(),
                reason: "Port must be > 0".into(),
            });
        }

        if self.proxy.upstream_timeout_ms == 0 {
            return Err(ProxyError::InvalidConfig {
                field: "proxy.upstream_timeout_ms".into(),
                value: "0".into(),
                reason: "Timeout must be > 0".into(),
            });
        }

        let upstream = self
            .proxy
            .upstream_url
            .as_deref()
            .ok_or(ConfigError::Missing("upstream_url"))?;

        if !(upstream.starts_with("http://") || upstream.starts_with("https://")) {
            return Err(ProxyError::InvalidConfig {
                field: "proxy.upstream_url".into(),
                value: upstream.into(),
                reason: "Must be an http:// or https:// URL".into(),
            });
        }

        Ok(())
    }

    /// Load the profile file named by the config
    pub fn load_profiles(&self) -> ProxyResult<ProfileSet> {
        Ok(ProfileSet::load(&self.profiles.file)?)
    }

    /// Validate, load profiles and freeze everything needed to serve
    pub fn resolve(mut self) -> ProxyResult<ProxySettings> {
        self.expand_paths();
        self.validate()?;

        let selected = self
            .profiles
            .selected
            .clone()
            .ok_or(ConfigError::Missing("profile"))?;
        let profile = self.load_profiles()?.select(&selected)?;

        // validate() already checked it is present
        let upstream = self.proxy.upstream_url.unwrap_or_default();

        Ok(ProxySettings {
            upstream_url: upstream.trim_end_matches('/').to_string(),
            host: self.proxy.host,
            port: self.proxy.port,
            upstream_timeout: Duration::from_millis(self.proxy.upstream_timeout_ms),
            profile,
        })
    }
}

/// Resolved, immutable settings shared by every request handler
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Upstream base URL without trailing slash
    pub upstream_url: String,
    pub host: String,
    pub port: u16,
    pub upstream_timeout: Duration,
    pub profile: Profile,
}

impl ProxySettings {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Expand path with ~ and environment variables
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    match shellexpand::full(&path_str) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(&path_str).as_ref()),
    }
}
