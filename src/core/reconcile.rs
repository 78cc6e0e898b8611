//! Pickup reconciliation: the read-only aggregation of other locations'
//! pending work for a resuming session.
//!
//! Reconciliation never mutates the log or the catalogue; its view is
//! advisory and exactly as fresh as the last pull.

use crate::core::catalogue::{CatalogueEntry, CatalogueStore};
use crate::core::error::BatonError;
use crate::core::handoff::{HandoffLog, HandoffRecord, InProgressItem, LogFilter};
use crate::core::output::normalize_text;
use chrono::NaiveDate;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;

/// The latest in-progress state reported by one location. Later records
/// supersede earlier ones for the same location, so only the newest record's
/// items are surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationProgress {
    pub location: String,
    pub date: NaiveDate,
    pub seq: u32,
    pub items: Vec<InProgressItem>,
}

/// Merged pending-work view handed to a resuming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingView {
    /// The resuming location, or `None` when the caller is unattributed.
    pub location: Option<String>,
    /// Outstanding next steps across all other locations, de-duplicated on
    /// normalized text, newest-first within each location group.
    pub next_steps: Vec<String>,
    pub in_progress: Vec<LocationProgress>,
    /// Catalogue entries written since this location's last handoff record.
    pub catalogue_changes: Vec<CatalogueEntry>,
}

impl PendingView {
    pub fn is_empty(&self) -> bool {
        self.next_steps.is_empty()
            && self.in_progress.is_empty()
            && self.catalogue_changes.is_empty()
    }
}

/// Build the pending-work view for `current`. `None` excludes nothing (an
/// unattributed caller still gets to read everyone's notes; only writes
/// require a known location).
pub fn reconcile(
    log: &HandoffLog,
    catalogue: &CatalogueStore,
    current: Option<&str>,
) -> Result<PendingView, BatonError> {
    let others = log.list(&LogFilter {
        exclude_location: current.map(String::from),
        ..LogFilter::default()
    })?;

    // Group by location; BTreeMap keeps group order deterministic.
    let mut groups: BTreeMap<&str, Vec<&HandoffRecord>> = BTreeMap::new();
    for record in &others {
        groups.entry(&record.location).or_default().push(record);
    }
    for records in groups.values_mut() {
        records.sort_by(|a, b| (b.date, b.seq).cmp(&(a.date, a.seq)));
    }

    let mut next_steps = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for records in groups.values() {
        for record in records {
            for step in &record.next_steps {
                if seen.insert(normalize_text(step)) {
                    next_steps.push(step.clone());
                }
            }
        }
    }

    let mut in_progress = Vec::new();
    for (location, records) in &groups {
        if let Some(latest) = records.first() {
            if !latest.in_progress.is_empty() {
                in_progress.push(LocationProgress {
                    location: location.to_string(),
                    date: latest.date,
                    seq: latest.seq,
                    items: latest.in_progress.clone(),
                });
            }
        }
    }

    let cutoff = match current {
        Some(loc) => log
            .list(&LogFilter {
                location: Some(loc.to_string()),
                ..LogFilter::default()
            })?
            .iter()
            .map(|r| r.recorded_at)
            .max()
            .unwrap_or(0),
        None => 0,
    };
    let mut catalogue_changes: Vec<CatalogueEntry> = catalogue
        .list()?
        .into_iter()
        .filter(|e| e.modified_at > cutoff)
        .collect();
    catalogue_changes.sort_by(|a, b| {
        (a.modified_at, &a.key).cmp(&(b.modified_at, &b.key))
    });

    Ok(PendingView {
        location: current.map(String::from),
        next_steps,
        in_progress,
        catalogue_changes,
    })
}
