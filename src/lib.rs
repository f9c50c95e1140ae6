//! Car Profile Proxy Library
//!
//! Reverse proxy for the Teslamate API that overlays a car profile (model,
//! trim badging, paint, wheels, ...) onto vehicle responses, so a client can
//! be exercised against cars you don't own.
//!
//! # Usage
//!
//! ```rust,ignore
//! use car_profile_proxy::{Config, ConfigOverrides, ProxyServer};
//! use std::sync::Arc;
//!
//! let mut config = Config::load(None)?;
//! config.apply(ConfigOverrides {
//!     upstream_url: Some("http://teslamate-api:4000".into()),
//!     car: Some("modely_juniper_grey_19".into()),
//!     ..Default::default()
//! });
//!
//! let server = Arc::new(ProxyServer::new(config.resolve()?)?);
//! server.start().await?;
//! ```
//!
//! The injection engine can also be used on its own:
//!
//! ```rust,ignore
//! use car_profile_proxy::inject;
//!
//! let patched = inject(response_json, &profile.overrides);
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod gate;
pub mod injection;
pub mod merge;
pub mod profile;
pub mod proxy;
pub mod upstream;

// Re-exports for convenience
pub use config::{Config, ConfigOverrides, ProxySettings};
pub use envelope::Envelope;
pub use error::{ConfigError, ProxyError, ProxyResult};
pub use gate::is_eligible;
pub use injection::{inject, InjectionEngine};
pub use merge::merge;
pub use profile::{Profile, ProfileSet};
pub use proxy::{DecodedBody, Outcome, ProxyServer};
pub use upstream::{UpstreamClient, UpstreamResponse};
