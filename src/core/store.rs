//! Store abstraction for Baton's state files.
//!
//! A store is a `.baton/` directory at the root of the shared repository.
//! Everything in it is plain, line-oriented text so the external
//! version-control transport can merge it textually.

use crate::core::error::BatonError;
use std::fs;
use std::path::{Path, PathBuf};

pub const STORE_DIR: &str = ".baton";
pub const CONFIG_FILE: &str = "config.toml";
pub const HANDOFF_LOG_FILE: &str = "handoff.events.jsonl";
pub const CATALOGUE_FILE: &str = "catalogue.jsonl";

/// Handle to a Baton state directory.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the `.baton/` directory.
    pub root: PathBuf,
}

impl Store {
    pub fn at(root: PathBuf) -> Self {
        Store { root }
    }

    /// Walk up from `dir` looking for an existing `.baton/` directory.
    pub fn discover(dir: &Path) -> Result<Store, BatonError> {
        let mut cur = Some(dir);
        while let Some(d) = cur {
            let candidate = d.join(STORE_DIR);
            if candidate.is_dir() {
                return Ok(Store { root: candidate });
            }
            cur = d.parent();
        }
        Err(BatonError::NotFound(format!(
            "no {} directory found above {} (run `baton init` first)",
            STORE_DIR,
            dir.display()
        )))
    }

    /// Create a `.baton/` directory under `dir` with the default config.
    /// Existing files are left untouched.
    pub fn init(dir: &Path) -> Result<Store, BatonError> {
        let root = dir.join(STORE_DIR);
        fs::create_dir_all(&root)?;
        let config = root.join(CONFIG_FILE);
        if !config.exists() {
            fs::write(&config, crate::core::location::DEFAULT_CONFIG)?;
        }
        Ok(Store { root })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn handoff_log_path(&self) -> PathBuf {
        self.root.join(HANDOFF_LOG_FILE)
    }

    pub fn catalogue_path(&self) -> PathBuf {
        self.root.join(CATALOGUE_FILE)
    }
}
