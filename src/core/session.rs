//! Session coordination: the thin façade the research scripts and the
//! version-control transport actually talk to.
//!
//! `begin` is resolve + reconcile over an already-pulled store. `end` is one
//! logical commit from the caller's point of view, but the log append and the
//! catalogue upserts fail independently: a session record with a rejected
//! catalogue entry is reported as a partial failure, never rolled back. The
//! audit trail wins over atomicity.

use crate::core::catalogue::{CatalogueEntry, CatalogueStore, MergeReport, UpsertOutcome};
use crate::core::error::BatonError;
use crate::core::handoff::{
    FileChangeRef, HandoffDraft, HandoffLog, HandoffRecord, InProgressItem, RecordId,
};
use crate::core::location::{LocationTable, Resolved};
use crate::core::reconcile::{reconcile, PendingView};
use crate::core::store::Store;
use crate::core::time;
use serde::Serialize;

/// Session payload without attribution; the coordinator stamps location,
/// date, and sequence at commit time.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub completed: Vec<String>,
    pub in_progress: Vec<InProgressItem>,
    pub next_steps: Vec<String>,
    pub file_changes: Vec<FileChangeRef>,
    pub issue_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpsertStatus {
    Applied { outcome: UpsertOutcome },
    /// Rejected by last-writer-wins; refresh (pull) and retry if the write
    /// still matters.
    Stale {
        stored_location: String,
        stored_at: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    Committed,
    /// The handoff record landed but at least one catalogue upsert was
    /// rejected as stale.
    PartialFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub record_id: RecordId,
    pub upserts: Vec<(String, UpsertStatus)>,
    pub status: CommitStatus,
}

/// What a post-pull merge adopted from the remote replica.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub new_records: usize,
    pub catalogue: MergeReport,
}

pub struct SessionCoordinator {
    table: LocationTable,
    log: HandoffLog,
    catalogue: CatalogueStore,
}

impl SessionCoordinator {
    pub fn open(store: &Store) -> Result<Self, BatonError> {
        Ok(SessionCoordinator {
            table: LocationTable::load(&store.config_path())?,
            log: HandoffLog::open(store),
            catalogue: CatalogueStore::open(store),
        })
    }

    pub fn table(&self) -> &LocationTable {
        &self.table
    }

    pub fn resolve(&self, signal: &str) -> Resolved {
        self.table.resolve(signal)
    }

    /// Resolve the caller and build its pending-work view. The caller is
    /// expected to have pulled already; the view is exactly as fresh as the
    /// last merge.
    pub fn begin(&self, signal: &str) -> Result<(Resolved, PendingView), BatonError> {
        let resolved = self.table.resolve(signal);
        let view = reconcile(&self.log, &self.catalogue, resolved.id())?;
        Ok((resolved, view))
    }

    /// Commit a session: append the handoff record, then apply catalogue
    /// updates. Refuses `Unknown` before writing anything; the audit trail
    /// requires attribution. Stale catalogue writes are collected into the
    /// result, not propagated; any other failure aborts.
    pub fn end(
        &self,
        signal: &str,
        report: SessionReport,
        catalogue_updates: Vec<CatalogueEntry>,
    ) -> Result<CommitResult, BatonError> {
        let location = match self.table.resolve(signal) {
            Resolved::Known(loc) => loc,
            Resolved::Unknown => return Err(BatonError::UnknownLocation(signal.to_string())),
        };

        let mut draft = HandoffDraft::new(&location.id, time::today_utc());
        draft.completed = report.completed;
        draft.in_progress = report.in_progress;
        draft.next_steps = report.next_steps;
        draft.file_changes = report.file_changes;
        draft.issue_refs = report.issue_refs;
        // The record and its catalogue writes share one timestamp; a later
        // stamp could exceed recorded_at and resurface this location's own
        // changes in its next pickup.
        let now = draft.recorded_at;
        let record_id = self.log.append(draft)?;

        let mut upserts = Vec::with_capacity(catalogue_updates.len());
        let mut stale = 0;
        for mut entry in catalogue_updates {
            entry.modified_by = location.id.clone();
            entry.modified_at = now;
            let key = entry.key.clone();
            match self.catalogue.upsert(entry) {
                Ok(outcome) => upserts.push((key, UpsertStatus::Applied { outcome })),
                Err(BatonError::StaleWrite {
                    stored_location,
                    stored_at,
                    ..
                }) => {
                    stale += 1;
                    upserts.push((
                        key,
                        UpsertStatus::Stale {
                            stored_location,
                            stored_at,
                        },
                    ));
                }
                Err(other) => return Err(other),
            }
        }

        Ok(CommitResult {
            record_id,
            upserts,
            status: if stale > 0 {
                CommitStatus::PartialFailure
            } else {
                CommitStatus::Committed
            },
        })
    }

    /// The post-`pull` hook: union remote handoff records and last-writer-wins
    /// merge remote catalogue entries. Safe to call with the same payload any
    /// number of times.
    pub fn merge_remote(
        &self,
        records: &[HandoffRecord],
        entries: &[CatalogueEntry],
    ) -> Result<SyncReport, BatonError> {
        Ok(SyncReport {
            new_records: self.log.merge(records)?,
            catalogue: self.catalogue.merge(entries)?,
        })
    }

    pub fn log(&self) -> &HandoffLog {
        &self.log
    }

    pub fn catalogue(&self) -> &CatalogueStore {
        &self.catalogue
    }
}
