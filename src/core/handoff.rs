//! The Handoff Log: an append-only, per-location sequence of dated session
//! records stored as one JSON object per line.
//!
//! Records are immutable once written and identified by
//! `(location, date, seq)`. Because identities are never reused and records
//! never change, merging two replicas of the log is plain set union; the
//! log needs no conflict resolution, unlike the catalogue.

use crate::core::error::BatonError;
use crate::core::store::Store;
use crate::core::time;
use chrono::NaiveDate;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Same-instant, same-location append races are absorbed by recomputing the
/// sequence number this many times before giving up.
pub const MAX_APPEND_RETRIES: u32 = 3;

/// Identity of a committed handoff record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub location: String,
    pub date: NaiveDate,
    pub seq: u32,
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.location, self.date, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgressItem {
    pub text: String,
    /// Free-text state-at-pause ("loop written, untested", "waiting on quota").
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeRef {
    pub path: String,
    #[serde(default)]
    pub description: String,
}

/// One session's reported state. Never mutated after creation, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub event_id: String,
    pub location: String,
    pub date: NaiveDate,
    pub seq: u32,
    /// Epoch seconds at commit time; the reconciler's catalogue cutoff.
    pub recorded_at: u64,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub in_progress: Vec<InProgressItem>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub file_changes: Vec<FileChangeRef>,
    /// Opaque correlation keys (issue IDs); never resolved or validated.
    #[serde(default)]
    pub issue_refs: Vec<String>,
}

impl HandoffRecord {
    pub fn id(&self) -> RecordId {
        RecordId {
            location: self.location.clone(),
            date: self.date,
            seq: self.seq,
        }
    }

    fn order_key(&self) -> (NaiveDate, &str, u32) {
        (self.date, &self.location, self.seq)
    }
}

/// A record awaiting its sequence number; `append` turns it into a
/// committed `HandoffRecord`.
#[derive(Debug, Clone)]
pub struct HandoffDraft {
    pub location: String,
    pub date: NaiveDate,
    /// Epoch seconds, stamped at construction so one commit's log record and
    /// catalogue writes can share a single timestamp.
    pub recorded_at: u64,
    pub completed: Vec<String>,
    pub in_progress: Vec<InProgressItem>,
    pub next_steps: Vec<String>,
    pub file_changes: Vec<FileChangeRef>,
    pub issue_refs: Vec<String>,
}

impl HandoffDraft {
    pub fn new(location: &str, date: NaiveDate) -> Self {
        HandoffDraft {
            location: location.to_string(),
            date,
            recorded_at: time::now_epoch(),
            completed: Vec::new(),
            in_progress: Vec::new(),
            next_steps: Vec::new(),
            file_changes: Vec::new(),
            issue_refs: Vec::new(),
        }
    }

    fn into_record(self, seq: u32) -> HandoffRecord {
        HandoffRecord {
            event_id: time::new_event_id(),
            location: self.location,
            date: self.date,
            seq,
            recorded_at: self.recorded_at,
            completed: self.completed,
            in_progress: self.in_progress,
            next_steps: self.next_steps,
            file_changes: self.file_changes,
            issue_refs: self.issue_refs,
        }
    }
}

/// Optional filters for `HandoffLog::list`.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub location: Option<String>,
    pub since_date: Option<NaiveDate>,
    /// Used by the reconciler to surface only *other* locations' notes.
    pub exclude_location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HandoffLog {
    path: PathBuf,
}

impl HandoffLog {
    pub fn open(store: &Store) -> Self {
        HandoffLog {
            path: store.handoff_log_path(),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        HandoffLog { path }
    }

    /// Parse the full log. A malformed line is an error, not a skip: the log
    /// is an audit trail and silently dropping records would hide it.
    pub fn load(&self) -> Result<Vec<HandoffRecord>, BatonError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: HandoffRecord = serde_json::from_str(&line).map_err(|e| {
                BatonError::ValidationError(format!(
                    "malformed handoff record at {}:{}: {}",
                    self.path.display(),
                    lineno + 1,
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn next_seq(records: &[HandoffRecord], location: &str, date: NaiveDate) -> u32 {
        records
            .iter()
            .filter(|r| r.location == location && r.date == date)
            .map(|r| r.seq)
            .max()
            .map_or(1, |s| s + 1)
    }

    /// Append one record, assigning the next sequence number for
    /// `(location, date)`. Optimistic concurrency: the sequence is computed
    /// from a snapshot and re-checked against a fresh read immediately before
    /// the write; a claimed sequence triggers recomputation, bounded by
    /// `MAX_APPEND_RETRIES`.
    pub fn append(&self, draft: HandoffDraft) -> Result<RecordId, BatonError> {
        self.append_with(draft, |_| Ok(()))
    }

    /// `on_claim` runs between choosing the sequence and the conflict
    /// re-check; tests interleave a competing append there.
    fn append_with(
        &self,
        draft: HandoffDraft,
        mut on_claim: impl FnMut(&RecordId) -> Result<(), BatonError>,
    ) -> Result<RecordId, BatonError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let snapshot = self.load()?;
            let seq = Self::next_seq(&snapshot, &draft.location, draft.date);
            let id = RecordId {
                location: draft.location.clone(),
                date: draft.date,
                seq,
            };
            on_claim(&id)?;
            let fresh = self.load()?;
            if fresh.iter().any(|r| r.id() == id) {
                if attempts >= MAX_APPEND_RETRIES {
                    return Err(BatonError::AppendConflict {
                        location: id.location,
                        date: id.date.to_string(),
                        attempts,
                    });
                }
                continue;
            }
            let record = draft.into_record(seq);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
            return Ok(id);
        }
    }

    /// List records ordered by `(date, location, seq)` ascending. The order
    /// depends only on record identities, never on append or merge order.
    pub fn list(&self, filter: &LogFilter) -> Result<Vec<HandoffRecord>, BatonError> {
        let mut records = self.load()?;
        records.retain(|r| {
            if let Some(loc) = &filter.location {
                if &r.location != loc {
                    return false;
                }
            }
            if let Some(excl) = &filter.exclude_location {
                if &r.location == excl {
                    return false;
                }
            }
            if let Some(since) = filter.since_date {
                if r.date < since {
                    return false;
                }
            }
            true
        });
        records.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(records)
    }

    /// Union a remote replica into the local log. Records are immutable and
    /// identity-keyed, so union is the whole story. Returns the number of
    /// newly adopted records. The file is rewritten in identity order so
    /// replicas converge byte-for-byte.
    pub fn merge(&self, remote: &[HandoffRecord]) -> Result<usize, BatonError> {
        let mut records = self.load()?;
        let mut seen: FxHashSet<RecordId> = records.iter().map(|r| r.id()).collect();
        let mut adopted = 0;
        for record in remote {
            if seen.insert(record.id()) {
                records.push(record.clone());
                adopted += 1;
            }
        }
        // Rewrite even when nothing was adopted: the local file may still be
        // in append order, and the transport needs both sides byte-identical.
        records.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        self.rewrite(&records)?;
        Ok(adopted)
    }

    fn rewrite(&self, records: &[HandoffRecord]) -> Result<(), BatonError> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for record in records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "log",
        "version": "0.1.0",
        "description": "Append-only per-location handoff record log",
        "commands": [
            { "name": "list", "parameters": ["location", "since", "exclude", "format"] },
            { "name": "merge", "parameters": ["file"] }
        ],
        "storage": ["handoff.events.jsonl"],
        "notes": "Records are immutable; merge is set union by (location, date, seq)"
    })
}
