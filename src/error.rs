//! Error types for car-profile-proxy

use thiserror::Error;

/// Errors raised while resolving configuration or profiles at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Car profile '{name}' not found in {path}")]
    UnknownProfile {
        name: String,
        path: String,
        available: Vec<String>,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid config {field} = '{value}': {reason}")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to bind {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// Connection-level failures that only affect a single client
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProxyError::Http(_) | ProxyError::Upstream(_))
    }

    /// Message suitable for the terminal, with hints where we have them
    pub fn display_for_user(&self) -> String {
        match self {
            ProxyError::Config(ConfigError::UnknownProfile { available, .. }) => {
                let names = if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                };
                format!("{}\nAvailable profiles: {}", self, names)
            }
            ProxyError::Config(ConfigError::Missing(setting)) => {
                format!(
                    "{}\nPass it on the command line or set it in the config file",
                    setting_hint(setting)
                )
            }
            ProxyError::BindFailed { .. } => {
                format!("{}\nIs another process already listening there? Try --port", self)
            }
            _ => self.to_string(),
        }
    }
}

fn setting_hint(setting: &str) -> String {
    match setting {
        "upstream_url" => "No upstream URL configured (--upstream)".to_string(),
        "profile" => "No car profile selected (--car)".to_string(),
        other => format!("Missing required setting: {}", other),
    }
}
