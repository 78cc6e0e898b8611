//! Baton: a session-handoff coordinator for split research environments.
//!
//! **Baton is a daemonless, local-first coordinator for research work spread
//! across a small fixed set of execution environments ("locations") whose
//! only channel is a shared version-controlled repository.**
//!
//! There is no server and no live synchronization. Each location works
//! alone, pulls before it starts, and pushes when it stops. Baton gives that
//! discipline structure:
//!
//! - **Location resolver**: which participant is this process? A pure,
//!   first-match-wins rule table over a single environment signal
//!   (hostname), configured in `.baton/config.toml`. Adding a location is a
//!   data change.
//! - **Handoff log** (`handoff.events.jsonl`): an append-only sequence of
//!   immutable, identity-keyed session records. Replica merge is set union;
//!   no conflict is possible here.
//! - **Catalogue** (`catalogue.jsonl`): a shared registry of dataset
//!   references with in-place key updates, the one place concurrent
//!   divergent writes can happen. Resolution is last-writer-wins over
//!   `(modified_at, modified_by)`, commutative and associative so pull order
//!   never matters.
//! - **Pickup reconciler**: the read-only merged view of everyone else's
//!   pending work, produced at session start.
//! - **Session coordinator**: `begin` and `end`, the two operations the
//!   outside world calls.
//!
//! # Consistency model
//!
//! Eventually consistent with explicit conflict surfacing. A location's view
//! is exactly the state as of its last successful pull merge; nothing blocks
//! on another location. Stale catalogue writes are rejected loudly
//! (`StaleWrite`), lost races are surfaced to the loser (`Overwritten`), and
//! the handoff log never conflicts at all.
//!
//! # Examples
//!
//! ```bash
//! # once per repository
//! baton init
//!
//! # session start (after git pull)
//! baton begin
//!
//! # session end (before git push)
//! baton end \
//!   --completed "extracted ERA5 2010-2015 for 882 cities" \
//!   --in-progress "2016-2023 extraction=job resubmitted, check quota" \
//!   --next "QC the 2016 files" \
//!   --issue HW-ER/12.3
//! ```

pub mod core;

mod cli;

use crate::cli::{
    BeginCli, CatalogueCli, CatalogueCommand, Cli, Command, EndCli, LogCli, LogCommand,
    OutputFormat, SignalCli,
};
use crate::core::catalogue::{CatalogueEntry, CatalogueStore, UpsertOutcome};
use crate::core::error::BatonError;
use crate::core::handoff::{FileChangeRef, HandoffLog, HandoffRecord, InProgressItem, LogFilter};
use crate::core::location::{default_signal, LocationTable, Resolved};
use crate::core::reconcile::PendingView;
use crate::core::session::{
    CommitResult, CommitStatus, SessionCoordinator, SessionReport, UpsertStatus,
};
use crate::core::store::Store;
use crate::core::time;

use chrono::NaiveDate;
use clap::Parser;
use colored::Colorize;
use std::path::Path;

/// Process-level outcome of a successful dispatch. Classified errors travel
/// separately as `BatonError`; `main` maps both onto exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// The handoff record landed but some catalogue upserts were rejected.
    PartialFailure,
}

pub fn run() -> Result<ExitStatus, BatonError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { dir } => {
            let dir = match dir {
                Some(d) => d,
                None => std::env::current_dir()?,
            };
            let store = Store::init(&dir)?;
            println!("{} Initialized baton store at {}", "✓".green(), store.root.display());
            Ok(ExitStatus::Success)
        }
        Command::Whoami(args) => run_whoami(args),
        Command::Begin(args) => run_begin(args),
        Command::End(args) => run_end(args),
        Command::Log(args) => run_log(args),
        Command::Catalogue(args) => run_catalogue(args),
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&schema())?);
            Ok(ExitStatus::Success)
        }
    }
}

fn open_store() -> Result<Store, BatonError> {
    Store::discover(&std::env::current_dir()?)
}

fn signal_or_default(signal: Option<String>) -> String {
    signal.unwrap_or_else(default_signal)
}

fn run_whoami(args: SignalCli) -> Result<ExitStatus, BatonError> {
    let store = open_store()?;
    let table = LocationTable::load(&store.config_path())?;
    let signal = signal_or_default(args.signal);
    let resolved = table.resolve(&signal);
    match args.format {
        OutputFormat::Json => {
            let body = match &resolved {
                Resolved::Known(loc) => serde_json::json!({
                    "signal": signal, "location": loc.id, "role": loc.role
                }),
                Resolved::Unknown => serde_json::json!({
                    "signal": signal, "location": serde_json::Value::Null
                }),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&time::command_envelope("whoami", "ok", body))?
            );
        }
        OutputFormat::Text => match &resolved {
            Resolved::Known(loc) => {
                println!("{} ({})", loc.id.bold(), loc.role);
            }
            Resolved::Unknown => {
                println!("{} (signal: {})", "unknown".yellow(), signal);
            }
        },
    }
    Ok(ExitStatus::Success)
}

fn run_begin(args: BeginCli) -> Result<ExitStatus, BatonError> {
    let store = open_store()?;
    let coordinator = SessionCoordinator::open(&store)?;
    let signal = signal_or_default(args.signal);
    let (resolved, view) = coordinator.begin(&signal)?;
    match args.format {
        OutputFormat::Json => {
            let body = serde_json::json!({ "view": serde_json::to_value(&view)? });
            println!(
                "{}",
                serde_json::to_string_pretty(&time::command_envelope("begin", "ok", body))?
            );
        }
        OutputFormat::Text => render_pending_view(&resolved, &view),
    }
    Ok(ExitStatus::Success)
}

fn render_pending_view(resolved: &Resolved, view: &PendingView) {
    match resolved {
        Resolved::Known(loc) => {
            println!("{}", format!("== Pickup for {} ({}) ==", loc.id, loc.role).bold());
        }
        Resolved::Unknown => {
            println!("{}", "== Pickup (unattributed session) ==".bold());
            println!(
                "{}",
                "note: unknown location; reading is fine, `baton end` will refuse".yellow()
            );
        }
    }
    if view.is_empty() {
        println!("Nothing pending from other locations.");
        return;
    }
    if !view.in_progress.is_empty() {
        println!();
        println!("{}", "In progress elsewhere:".bold());
        for progress in &view.in_progress {
            println!(
                "  {} (as of {}/{}):",
                progress.location.cyan(),
                progress.date,
                progress.seq
            );
            for item in &progress.items {
                if item.state.is_empty() {
                    println!("    - {}", item.text);
                } else {
                    println!("    - {} [{}]", item.text, item.state.dimmed());
                }
            }
        }
    }
    if !view.next_steps.is_empty() {
        println!();
        println!("{}", "Next steps:".bold());
        for (i, step) in view.next_steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    }
    if !view.catalogue_changes.is_empty() {
        println!();
        println!("{}", "Catalogue changes since your last handoff:".bold());
        for entry in &view.catalogue_changes {
            println!(
                "  {} <- {} ({} @ {}Z)",
                entry.key.cyan(),
                entry.source_path,
                entry.modified_by,
                entry.modified_at
            );
        }
    }
}

/// Split "text=state" / "path=description" CLI items; everything after the
/// first '=' is the second field, absent '=' means an empty second field.
fn split_pair(raw: &str) -> (String, String) {
    match raw.split_once('=') {
        Some((a, b)) => (a.trim().to_string(), b.trim().to_string()),
        None => (raw.trim().to_string(), String::new()),
    }
}

fn load_catalogue_updates(path: &Path) -> Result<Vec<CatalogueEntry>, BatonError> {
    let text = std::fs::read_to_string(path)?;
    let entries: Vec<CatalogueEntry> = serde_json::from_str(&text).map_err(|e| {
        BatonError::ValidationError(format!(
            "malformed catalogue update file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(entries)
}

fn run_end(args: EndCli) -> Result<ExitStatus, BatonError> {
    let store = open_store()?;
    let coordinator = SessionCoordinator::open(&store)?;
    let signal = signal_or_default(args.signal);

    let report = SessionReport {
        completed: args.completed,
        in_progress: args
            .in_progress
            .iter()
            .map(|raw| {
                let (text, state) = split_pair(raw);
                InProgressItem { text, state }
            })
            .collect(),
        next_steps: args.next_steps,
        file_changes: args
            .file_changes
            .iter()
            .map(|raw| {
                let (path, description) = split_pair(raw);
                FileChangeRef { path, description }
            })
            .collect(),
        issue_refs: args.issue_refs,
    };
    let updates = match &args.catalogue_update {
        Some(path) => load_catalogue_updates(path)?,
        None => Vec::new(),
    };

    let result = coordinator.end(&signal, report, updates)?;
    match args.format {
        OutputFormat::Json => {
            let status = match result.status {
                CommitStatus::Committed => "ok",
                CommitStatus::PartialFailure => "partial_failure",
            };
            let body = serde_json::json!({ "result": serde_json::to_value(&result)? });
            println!(
                "{}",
                serde_json::to_string_pretty(&time::command_envelope("end", status, body))?
            );
        }
        OutputFormat::Text => render_commit_result(&result),
    }
    Ok(match result.status {
        CommitStatus::Committed => ExitStatus::Success,
        CommitStatus::PartialFailure => ExitStatus::PartialFailure,
    })
}

fn render_commit_result(result: &CommitResult) {
    println!("{} Handoff recorded: {}", "✓".green(), result.record_id);
    for (key, status) in &result.upserts {
        match status {
            UpsertStatus::Applied { outcome } => match outcome {
                UpsertOutcome::Inserted => {
                    println!("{} catalogue {}: inserted", "✓".green(), key.cyan());
                }
                UpsertOutcome::Overwritten {
                    previous_location,
                    previous_at,
                } => {
                    println!(
                        "{} catalogue {}: overwrote {} @ {}Z",
                        "✓".green(),
                        key.cyan(),
                        previous_location,
                        previous_at
                    );
                }
                UpsertOutcome::Unchanged => {
                    println!("{} catalogue {}: unchanged", "✓".green(), key.cyan());
                }
            },
            UpsertStatus::Stale {
                stored_location,
                stored_at,
            } => {
                println!(
                    "{} catalogue {}: stale (stored {} @ {}Z is newer), pull and retry",
                    "✗".red(),
                    key.cyan(),
                    stored_location,
                    stored_at
                );
            }
        }
    }
    if matches!(result.status, CommitStatus::PartialFailure) {
        println!(
            "{}",
            "Session record committed; some catalogue updates were rejected.".yellow()
        );
    }
}

fn parse_since(raw: Option<String>) -> Result<Option<NaiveDate>, BatonError> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(|_| BatonError::ValidationError(format!("invalid --since date '{}'", s))),
    }
}

fn run_log(args: LogCli) -> Result<ExitStatus, BatonError> {
    let store = open_store()?;
    let log = HandoffLog::open(&store);
    match args.command {
        LogCommand::List {
            location,
            since,
            exclude,
            format,
        } => {
            let records = log.list(&LogFilter {
                location,
                since_date: parse_since(since)?,
                exclude_location: exclude,
            })?;
            match format {
                OutputFormat::Json => {
                    let body = serde_json::json!({
                        "count": records.len(),
                        "records": serde_json::to_value(&records)?
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&time::command_envelope(
                            "log.list", "ok", body
                        ))?
                    );
                }
                OutputFormat::Text => render_log_list(&records),
            }
        }
        LogCommand::Merge { file } => {
            // A missing local store reads as empty, but a missing snapshot
            // path is a typo, not an empty replica.
            if !file.exists() {
                return Err(BatonError::NotFound(format!(
                    "remote log file {}",
                    file.display()
                )));
            }
            let remote = HandoffLog::at(file).load()?;
            let adopted = log.merge(&remote)?;
            println!(
                "{} Merged {} remote record(s), {} new",
                "✓".green(),
                remote.len(),
                adopted
            );
        }
    }
    Ok(ExitStatus::Success)
}

fn render_log_list(records: &[HandoffRecord]) {
    if records.is_empty() {
        println!("No handoff records.");
        return;
    }
    println!(
        "{:<12} {:<10} {:>3}  {:<9} {:<9} {:<9}",
        "DATE", "LOCATION", "SEQ", "DONE", "DOING", "NEXT"
    );
    for r in records {
        println!(
            "{:<12} {:<10} {:>3}  {:<9} {:<9} {:<9}",
            r.date.to_string(),
            r.location,
            r.seq,
            r.completed.len(),
            r.in_progress.len(),
            r.next_steps.len()
        );
    }
}

fn run_catalogue(args: CatalogueCli) -> Result<ExitStatus, BatonError> {
    let store = open_store()?;
    let catalogue = CatalogueStore::open(&store);
    match args.command {
        CatalogueCommand::Upsert {
            key,
            source,
            method,
            variables,
            notes,
            signal,
            format,
        } => {
            // Catalogue writes carry attribution just like handoff records.
            let table = LocationTable::load(&store.config_path())?;
            let signal = signal_or_default(signal);
            let location = match table.resolve(&signal) {
                Resolved::Known(loc) => loc,
                Resolved::Unknown => return Err(BatonError::UnknownLocation(signal)),
            };
            let entry = CatalogueEntry {
                key: key.clone(),
                source_path: source,
                access_method: method,
                variables,
                notes,
                modified_by: location.id,
                modified_at: time::now_epoch(),
            };
            let outcome = catalogue.upsert(entry)?;
            match format {
                OutputFormat::Json => {
                    let body = serde_json::json!({
                        "key": key,
                        "result": serde_json::to_value(&outcome)?
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&time::command_envelope(
                            "catalogue.upsert",
                            "ok",
                            body
                        ))?
                    );
                }
                OutputFormat::Text => match outcome {
                    UpsertOutcome::Inserted => {
                        println!("{} {}: inserted", "✓".green(), key.cyan());
                    }
                    UpsertOutcome::Overwritten {
                        previous_location,
                        previous_at,
                    } => {
                        println!(
                            "{} {}: overwrote {} @ {}Z",
                            "✓".green(),
                            key.cyan(),
                            previous_location,
                            previous_at
                        );
                    }
                    UpsertOutcome::Unchanged => {
                        println!("{} {}: unchanged", "✓".green(), key.cyan());
                    }
                },
            }
        }
        CatalogueCommand::Get { key, format } => {
            let entry = catalogue
                .get(&key)?
                .ok_or_else(|| BatonError::NotFound(format!("catalogue key '{}'", key)))?;
            match format {
                OutputFormat::Json => {
                    let body = serde_json::json!({ "entry": serde_json::to_value(&entry)? });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&time::command_envelope(
                            "catalogue.get",
                            "ok",
                            body
                        ))?
                    );
                }
                OutputFormat::Text => render_entry(&entry),
            }
        }
        CatalogueCommand::List { format } => {
            let entries = catalogue.list()?;
            match format {
                OutputFormat::Json => {
                    let body = serde_json::json!({
                        "count": entries.len(),
                        "entries": serde_json::to_value(&entries)?
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&time::command_envelope(
                            "catalogue.list",
                            "ok",
                            body
                        ))?
                    );
                }
                OutputFormat::Text => {
                    if entries.is_empty() {
                        println!("Catalogue is empty.");
                    }
                    for entry in &entries {
                        render_entry(entry);
                    }
                }
            }
        }
        CatalogueCommand::Merge { file } => {
            if !file.exists() {
                return Err(BatonError::NotFound(format!(
                    "remote catalogue file {}",
                    file.display()
                )));
            }
            let remote = CatalogueStore::at(file).list()?;
            let report = catalogue.merge(&remote)?;
            println!(
                "{} Merged {} remote entr{}: {} adopted, {} kept local, {} unchanged",
                "✓".green(),
                remote.len(),
                if remote.len() == 1 { "y" } else { "ies" },
                report.adopted,
                report.kept_local,
                report.unchanged
            );
        }
    }
    Ok(ExitStatus::Success)
}

fn render_entry(entry: &CatalogueEntry) {
    println!("{}", entry.key.bold());
    println!("  source:    {}", entry.source_path);
    if !entry.access_method.is_empty() {
        println!("  access:    {}", entry.access_method);
    }
    if !entry.variables.is_empty() {
        println!("  variables: {}", entry.variables.join(", "));
    }
    if !entry.notes.is_empty() {
        println!("  notes:     {}", crate::core::output::compact_line(&entry.notes, 120));
    }
    println!("  modified:  {} @ {}Z", entry.modified_by, entry.modified_at);
}

fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "baton",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Session-handoff coordinator over a shared version-controlled store",
        "commands": [
            { "name": "init", "parameters": ["dir"] },
            { "name": "whoami", "parameters": ["signal", "format"] },
            { "name": "begin", "parameters": ["signal", "format"] },
            { "name": "end", "parameters": ["signal", "completed", "in-progress", "next", "file-change", "issue", "catalogue-update", "format"] }
        ],
        "subsystems": [crate::core::handoff::schema(), crate::core::catalogue::schema()],
        "exit_codes": { "success": 0, "error": 1, "partial_failure": 2, "unknown_location": 3 }
    })
}
