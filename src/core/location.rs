//! Location resolution: which participant environment is this process?
//!
//! Detection is a pure, total function over an explicit ordered rule table
//! loaded from `config.toml`. Adding a fourth location is a data change,
//! not a code change.

use crate::core::error::BatonError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// Default deployment config written by `baton init`. Three locations,
/// matching the observed pilot deployment. Edit patterns to taste.
pub const DEFAULT_CONFIG: &str = r#"# Baton location rule table.
# First matching pattern wins; order matters.
# The signal is the hostname unless overridden with --signal.

[[location]]
id = "hpc"
role = "batch cluster (ERA5 extraction jobs)"
pattern = "^(login|host|sci)[0-9]*\\..*jasmin\\.ac\\.uk$"

[[location]]
id = "campus"
role = "office workstation (analysis, plotting)"
pattern = "^campus-.*"

[[location]]
id = "laptop"
role = "portable (writing, light analysis)"
pattern = ".*\\.(local|lan|home)$"
"#;

/// One fixed participant environment in the coordination scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub id: String,
    pub role: String,
}

#[derive(Debug)]
struct LocationRule {
    pattern: Regex,
    location: Location,
}

/// Ordered rule table; first match wins.
#[derive(Debug)]
pub struct LocationTable {
    rules: Vec<LocationRule>,
}

/// Resolution outcome. `Unknown` is a legitimate state for read-only
/// operations; writes require attribution and refuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Known(Location),
    Unknown,
}

impl Resolved {
    pub fn id(&self) -> Option<&str> {
        match self {
            Resolved::Known(loc) => Some(&loc.id),
            Resolved::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "location")]
    locations: Vec<ConfigLocation>,
}

#[derive(Debug, Deserialize)]
struct ConfigLocation {
    id: String,
    #[serde(default)]
    role: String,
    pattern: String,
}

impl LocationTable {
    pub fn from_toml(text: &str) -> Result<LocationTable, BatonError> {
        let parsed: ConfigFile = toml::from_str(text)?;
        if parsed.locations.is_empty() {
            return Err(BatonError::ValidationError(
                "config defines no locations".into(),
            ));
        }
        let mut rules = Vec::with_capacity(parsed.locations.len());
        for loc in parsed.locations {
            if loc.id.trim().is_empty() {
                return Err(BatonError::ValidationError(
                    "location id must be non-empty".into(),
                ));
            }
            if rules
                .iter()
                .any(|r: &LocationRule| r.location.id == loc.id)
            {
                return Err(BatonError::ValidationError(format!(
                    "duplicate location id '{}'",
                    loc.id
                )));
            }
            let pattern = Regex::new(&loc.pattern).map_err(|e| {
                BatonError::ValidationError(format!(
                    "invalid pattern for location '{}': {}",
                    loc.id, e
                ))
            })?;
            rules.push(LocationRule {
                pattern,
                location: Location {
                    id: loc.id,
                    role: loc.role,
                },
            });
        }
        Ok(LocationTable { rules })
    }

    pub fn load(path: &Path) -> Result<LocationTable, BatonError> {
        let text = std::fs::read_to_string(path)?;
        LocationTable::from_toml(&text)
    }

    /// Match `signal` against the ordered rules; first match wins.
    /// Deterministic and total: no rule matching is `Unknown`, never an error.
    pub fn resolve(&self, signal: &str) -> Resolved {
        for rule in &self.rules {
            if rule.pattern.is_match(signal) {
                return Resolved::Known(rule.location.clone());
            }
        }
        Resolved::Unknown
    }

    /// Look a location up by id (used when validating merge input).
    pub fn get(&self, id: &str) -> Option<&Location> {
        self.rules
            .iter()
            .map(|r| &r.location)
            .find(|l| l.id == id)
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.rules.iter().map(|r| &r.location)
    }
}

/// The environment signal consumed by the resolver. The hostname is the
/// observed deployment's signal; callers may substitute any string.
pub fn default_signal() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
}
