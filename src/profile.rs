//! Car profiles
//!
//! A profile file is a JSON object mapping a profile name to the overrides
//! for that car, e.g.
//!
//! ```json
//! {
//!   "modely_juniper_grey_19": {
//!     "car_details": { "model": "Y", "trim_badging": "74D" },
//!     "car_exterior": { "exterior_color": "StealthGrey", "wheel_type": "Apollo19" }
//!   }
//! }
//! ```

use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One named override document
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub overrides: Map<String, Value>,
}

impl Profile {
    pub fn new(name: impl Into<String>, overrides: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            overrides,
        }
    }

    /// A profile that overrides nothing
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Map::new())
    }

    /// One-line description: `Model Y (74D) - StealthGrey, Apollo19`
    pub fn summary(&self) -> String {
        let field = |group: &str, key: &str| -> String {
            match self.overrides.get(group).and_then(|g| g.get(key)) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "?".to_string(),
                Some(other) => other.to_string(),
            }
        };

        format!(
            "Model {} ({}) - {}, {}",
            field("car_details", "model"),
            field("car_details", "trim_badging"),
            field("car_exterior", "exterior_color"),
            field("car_exterior", "wheel_type"),
        )
    }
}

/// All profiles from a profile file, in file order
#[derive(Debug, Clone)]
pub struct ProfileSet {
    path: PathBuf,
    profiles: Vec<Profile>,
}

impl ProfileSet {
    /// Read and parse a profile file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(format!("cars profile file {}", path.display())));
        }

        debug!("Loading car profiles from {:?}", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;

        Self::from_json(path, &content)
    }

    /// Parse profile JSON; `path` is only used for error messages
    pub fn from_json(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let parse_error = |reason: String| ConfigError::Parse {
            path: path.display().to_string(),
            reason,
        };

        let root: Map<String, Value> = serde_json::from_str(content)
            .map_err(|e| parse_error(e.to_string()))?;

        let profiles = root
            .into_iter()
            .map(|(name, value)| match value {
                Value::Object(overrides) => Ok(Profile::new(name, overrides)),
                other => Err(parse_error(format!(
                    "profile '{}' must be a JSON object, found {}",
                    name,
                    json_type(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            profiles,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Pick a profile by name. Unknown names are an error that carries the
    /// list of names that do exist.
    pub fn select(&self, name: &str) -> Result<Profile, ConfigError> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: name.to_string(),
                path: self.path.display().to_string(),
                available: self.names(),
            })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
