//! The Catalogue Store: a shared key-indexed registry of external-dataset
//! references, one JSON object per line, rewritten sorted by key.
//!
//! Unlike the handoff log, catalogue keys are updated in place, so two
//! locations can write the same key divergently between pulls. Resolution is
//! last-writer-wins over the total order `(modified_at, modified_by)`; the
//! location tie-break makes the order total, which is what makes merge
//! commutative and associative regardless of pull order.
//!
//! A full-order tie with divergent content can only come from one location
//! writing twice within the same second. The author's own upsert takes the
//! newer content; replica merge breaks the tie on content so every replica
//! picks the same winner.

use crate::core::error::BatonError;
use crate::core::store::Store;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// One external dataset reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    /// Unique key within the store, e.g. "era5-an-sfc".
    pub key: String,
    pub source_path: String,
    /// How the data is reached: "posix-netcdf", "cds-api", "rsync", ...
    #[serde(default)]
    pub access_method: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub notes: String,
    /// Location id of the last writer. Defaults empty in draft files; the
    /// session coordinator stamps it at commit time.
    #[serde(default)]
    pub modified_by: String,
    /// Epoch seconds of the last write.
    #[serde(default)]
    pub modified_at: u64,
}

impl CatalogueEntry {
    /// Total order for last-writer-wins. Location id breaks timestamp ties
    /// deterministically.
    fn write_order(&self) -> (u64, &str) {
        (self.modified_at, &self.modified_by)
    }

    /// The payload, ordered. Distinguishes an idempotent replay from a
    /// divergent write when two entries share a `write_order`.
    fn content_order(&self) -> (&str, &str, &[String], &str) {
        (
            &self.source_path,
            &self.access_method,
            self.variables.as_slice(),
            &self.notes,
        )
    }
}

/// What a successful upsert did to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    /// The incoming write won; the losing location is surfaced so it can
    /// reconcile on its next cycle.
    Overwritten {
        previous_location: String,
        previous_at: u64,
    },
    /// Identical `(modified_at, modified_by)`: the same write replayed.
    Unchanged,
}

/// Per-key tally of a replica merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Remote entries that won (inserted or overwrote local).
    pub adopted: usize,
    /// Remote entries that lost to a newer local write.
    pub kept_local: usize,
    /// Remote entries identical to local.
    pub unchanged: usize,
}

enum Applied {
    Won(UpsertOutcome),
    /// The stored entry is strictly newer; incoming write lost.
    Lost { stored_location: String, stored_at: u64 },
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct CatalogueStore {
    path: PathBuf,
}

impl CatalogueStore {
    pub fn open(store: &Store) -> Self {
        CatalogueStore {
            path: store.catalogue_path(),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        CatalogueStore { path }
    }

    pub fn load(&self) -> Result<FxHashMap<String, CatalogueEntry>, BatonError> {
        let mut map = FxHashMap::default();
        if !self.path.exists() {
            return Ok(map);
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: CatalogueEntry = serde_json::from_str(&line).map_err(|e| {
                BatonError::ValidationError(format!(
                    "malformed catalogue entry at {}:{}: {}",
                    self.path.display(),
                    lineno + 1,
                    e
                ))
            })?;
            map.insert(entry.key.clone(), entry);
        }
        Ok(map)
    }

    fn save(&self, map: &FxHashMap<String, CatalogueEntry>) -> Result<(), BatonError> {
        let mut entries: Vec<&CatalogueEntry> = map.values().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for entry in entries {
                writeln!(file, "{}", serde_json::to_string(entry)?)?;
            }
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// `authored` marks a local write (the caller IS `incoming.modified_by`)
    /// as opposed to replica sync. It only matters on a full `write_order`
    /// tie with divergent content: the author's write is the later of the two
    /// by construction, while a syncing replica cannot know which came later
    /// and breaks the tie on content.
    fn apply_lww(
        map: &mut FxHashMap<String, CatalogueEntry>,
        incoming: CatalogueEntry,
        authored: bool,
    ) -> Applied {
        match map.get(&incoming.key) {
            None => {
                map.insert(incoming.key.clone(), incoming);
                Applied::Won(UpsertOutcome::Inserted)
            }
            Some(stored) => {
                use std::cmp::Ordering::*;
                let won = match incoming.write_order().cmp(&stored.write_order()) {
                    Greater => true,
                    Less => false,
                    Equal => {
                        if incoming.content_order() == stored.content_order() {
                            return Applied::Unchanged;
                        }
                        authored || incoming.content_order() > stored.content_order()
                    }
                };
                if won {
                    let outcome = UpsertOutcome::Overwritten {
                        previous_location: stored.modified_by.clone(),
                        previous_at: stored.modified_at,
                    };
                    map.insert(incoming.key.clone(), incoming);
                    Applied::Won(outcome)
                } else {
                    Applied::Lost {
                        stored_location: stored.modified_by.clone(),
                        stored_at: stored.modified_at,
                    }
                }
            }
        }
    }

    /// Insert or last-writer-wins update. A strictly earlier write is a
    /// `StaleWrite` error so the caller can refresh and retry; it is never
    /// silently dropped.
    pub fn upsert(&self, entry: CatalogueEntry) -> Result<UpsertOutcome, BatonError> {
        if entry.key.trim().is_empty() {
            return Err(BatonError::ValidationError(
                "catalogue key must be non-empty".into(),
            ));
        }
        let key = entry.key.clone();
        let mut map = self.load()?;
        match Self::apply_lww(&mut map, entry, true) {
            Applied::Won(outcome) => {
                self.save(&map)?;
                Ok(outcome)
            }
            Applied::Unchanged => Ok(UpsertOutcome::Unchanged),
            Applied::Lost {
                stored_location,
                stored_at,
            } => Err(BatonError::StaleWrite {
                key,
                stored_location,
                stored_at,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<CatalogueEntry>, BatonError> {
        Ok(self.load()?.remove(key))
    }

    /// All entries, sorted by key.
    pub fn list(&self) -> Result<Vec<CatalogueEntry>, BatonError> {
        let mut entries: Vec<CatalogueEntry> = self.load()?.into_values().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Per-key last-writer-wins union with a remote replica. A stale remote
    /// entry keeps the local value and is counted, not errored: merging is
    /// reconciliation, not authorship, and must commute across pull orders.
    pub fn merge(&self, remote: &[CatalogueEntry]) -> Result<MergeReport, BatonError> {
        let mut map = self.load()?;
        let mut report = MergeReport::default();
        for entry in remote {
            match Self::apply_lww(&mut map, entry.clone(), false) {
                Applied::Won(_) => report.adopted += 1,
                Applied::Lost { .. } => report.kept_local += 1,
                Applied::Unchanged => report.unchanged += 1,
            }
        }
        if report.adopted > 0 {
            self.save(&map)?;
        }
        Ok(report)
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "catalogue",
        "version": "0.1.0",
        "description": "Shared dataset-reference registry with last-writer-wins merge",
        "commands": [
            { "name": "upsert", "parameters": ["key", "source", "method", "variables", "notes"] },
            { "name": "get", "parameters": ["key"] },
            { "name": "list", "parameters": ["format"] },
            { "name": "merge", "parameters": ["file"] }
        ],
        "storage": ["catalogue.jsonl"],
        "notes": "Conflicts resolve on (modified_at, modified_by); identical replays are idempotent, divergent same-second ties resolve on content"
    })
}
