use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatonError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unknown location for signal '{0}': refusing unattributed writes")]
    UnknownLocation(String),
    #[error("Append conflict for {location}/{date} after {attempts} attempts")]
    AppendConflict {
        location: String,
        date: String,
        attempts: u32,
    },
    #[error("Stale write for catalogue key '{key}': stored entry is newer ({stored_location} at {stored_at})")]
    StaleWrite {
        key: String,
        stored_location: String,
        stored_at: u64,
    },
}
