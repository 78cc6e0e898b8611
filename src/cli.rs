//! CLI struct definitions for the Baton command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "baton",
    version = env!("CARGO_PKG_VERSION"),
    about = "Baton is the daemonless, local-first session-handoff coordinator for research work split across multiple execution environments that share a version-controlled repository as their only channel."
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the .baton/ state directory with a default location table.
    Init {
        /// Directory to initialize (defaults to current working directory).
        #[clap(short, long)]
        dir: Option<PathBuf>,
    },
    /// Print the location the current environment resolves to.
    Whoami(SignalCli),
    /// Begin a session: resolve the caller and print the pending-work view.
    ///
    /// Pull/merge first; the view is exactly as fresh as the last merge.
    Begin(BeginCli),
    /// End a session: append a handoff record and apply catalogue updates.
    End(EndCli),
    /// Inspect and merge the handoff log.
    Log(LogCli),
    /// Manage the shared dataset catalogue.
    Catalogue(CatalogueCli),
    /// Print the JSON schema of the command surface.
    Schema,
}

#[derive(clap::Args, Debug)]
pub(crate) struct SignalCli {
    /// Environment signal to resolve (defaults to the hostname).
    #[clap(long)]
    pub signal: Option<String>,
    /// Output format: 'text' or 'json'.
    #[clap(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct BeginCli {
    /// Environment signal to resolve (defaults to the hostname).
    #[clap(long)]
    pub signal: Option<String>,
    #[clap(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct EndCli {
    /// Environment signal to resolve (defaults to the hostname).
    #[clap(long)]
    pub signal: Option<String>,
    /// Completed item (repeatable).
    #[clap(long = "completed")]
    pub completed: Vec<String>,
    /// In-progress item as "text=state-at-pause" (repeatable).
    #[clap(long = "in-progress")]
    pub in_progress: Vec<String>,
    /// Next step for whoever picks up (repeatable).
    #[clap(long = "next")]
    pub next_steps: Vec<String>,
    /// Changed file as "path=description" (repeatable).
    #[clap(long = "file-change")]
    pub file_changes: Vec<String>,
    /// Opaque issue reference (repeatable).
    #[clap(long = "issue")]
    pub issue_refs: Vec<String>,
    /// JSON file with an array of catalogue entries to upsert; attribution
    /// is stamped by the coordinator.
    #[clap(long = "catalogue-update")]
    pub catalogue_update: Option<PathBuf>,
    #[clap(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct LogCli {
    #[clap(subcommand)]
    pub command: LogCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum LogCommand {
    /// List handoff records ordered by (date, sequence).
    List {
        /// Only records from this location.
        #[clap(long)]
        location: Option<String>,
        /// Only records dated on or after this ISO date.
        #[clap(long)]
        since: Option<String>,
        /// Exclude records from this location.
        #[clap(long)]
        exclude: Option<String>,
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Union a remote replica of the log (JSONL file) into the local one.
    Merge {
        #[clap(long)]
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct CatalogueCli {
    #[clap(subcommand)]
    pub command: CatalogueCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CatalogueCommand {
    /// Insert or update a dataset reference (last-writer-wins).
    Upsert {
        /// Dataset key, e.g. "era5-an-sfc".
        #[clap(long)]
        key: String,
        /// Source path or URL of the dataset.
        #[clap(long)]
        source: String,
        /// Access method: posix-netcdf, cds-api, rsync, ...
        #[clap(long, default_value = "")]
        method: String,
        /// Comma-separated variable names.
        #[clap(long, value_delimiter = ',')]
        variables: Vec<String>,
        #[clap(long, default_value = "")]
        notes: String,
        /// Environment signal to resolve (defaults to the hostname).
        #[clap(long)]
        signal: Option<String>,
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print one entry by key.
    Get {
        #[clap(long)]
        key: String,
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List all entries sorted by key.
    List {
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Last-writer-wins merge of a remote replica (JSONL file).
    Merge {
        #[clap(long)]
        file: PathBuf,
    },
}
