//! bulkfs - bulk file operations with recoverable per-item errors.
//!
//! Usage:
//!   bfs copy <SOURCES>... --to <DEST>      Copy files and folders
//!   bfs move <SOURCES>... --to <DEST>      Move files and folders
//!   bfs delete <PATHS>... [--permanent]    Recycle (or delete) paths
//!   bfs clear-trash                        Empty the trash
//!   bfs extract <ARCHIVE> --to <DEST>      Extract a zip archive
//!   bfs --help                             Show help

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing_subscriber::EnvFilter;

use bulkfs_core::{Action, PathFilter, PathItem, ProcessErrorItem, ProcessOptions};
use bulkfs_ops::{OperationKind, OperationProgress, Process, ProcessRequest, ProgressContract};

#[derive(Parser)]
#[command(
    name = "bulkfs",
    version,
    about = "Bulk file operations with recoverable per-item errors",
    long_about = "bulkfs copies, moves, deletes and extracts whole trees of files.\n\n\
                  Every item is processed in a fixed order; an item that fails is \
                  recorded and skipped while the rest of the run continues."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Do not print progress
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy files and folders into a destination folder
    Copy {
        /// Files or folders to copy
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination folder
        #[arg(short, long)]
        to: PathBuf,

        #[command(flatten)]
        options: TransferArgs,
    },

    /// Move files and folders into a destination folder
    Move {
        /// Files or folders to move
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination folder
        #[arg(short, long)]
        to: PathBuf,

        #[command(flatten)]
        options: TransferArgs,

        /// Compare BLAKE3 hashes before removing a source copied across volumes
        #[arg(long)]
        verify: bool,
    },

    /// Send paths to the trash, or delete them permanently
    Delete {
        /// Files or folders to remove
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Delete permanently instead of recycling
        #[arg(long)]
        permanent: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Permanently empty the trash
    ClearTrash,

    /// Extract a zip archive into a new folder
    Extract {
        /// Archive to extract
        archive: PathBuf,

        /// Destination folder (must not exist)
        #[arg(short, long)]
        to: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args)]
struct TransferArgs {
    /// Rename conflicting files to "name (2).ext" instead of failing them
    #[arg(long)]
    auto_rename: bool,

    /// Replace existing destination files
    #[arg(long, conflicts_with = "auto_rename")]
    overwrite: bool,

    /// Skip items where a file and a folder share a name instead of failing them
    #[arg(long)]
    ignore_conflicts: bool,

    /// Do not keep modification times of copied files
    #[arg(long)]
    no_preserve_timestamps: bool,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args)]
struct FilterArgs {
    /// Skip paths matching a glob (matched against names and paths below each source)
    #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let Cli {
        verbose,
        json,
        quiet,
        command,
    } = Cli::parse();
    init_tracing(verbose);

    let mut options = ProcessOptions::default();
    let (kind, sources, destination) = match command {
        Command::Copy {
            sources,
            to,
            options: args,
        } => {
            apply_transfer_args(&mut options, &args)?;
            (OperationKind::Copy, sources, Some(to))
        }
        Command::Move {
            sources,
            to,
            options: args,
            verify,
        } => {
            apply_transfer_args(&mut options, &args)?;
            options.verify_after_move = verify;
            (OperationKind::Move, sources, Some(to))
        }
        Command::Delete {
            paths,
            permanent,
            filter,
        } => {
            options.filter = exclusion_filter(&filter)?;
            let kind = if permanent {
                OperationKind::Delete
            } else {
                OperationKind::Recycle
            };
            (kind, paths, None)
        }
        Command::ClearTrash => (OperationKind::ClearTrash, Vec::new(), None),
        Command::Extract {
            archive,
            to,
            filter,
        } => {
            options.filter = exclusion_filter(&filter)?;
            (OperationKind::Extract, vec![archive], Some(to))
        }
    };

    let output = Output { json, quiet };
    run(kind, &sources, destination.as_deref(), options, output)
}

/// Install the log subscriber; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_transfer_args(options: &mut ProcessOptions, args: &TransferArgs) -> Result<()> {
    options.auto_rename_files = args.auto_rename;
    options.overwrite_existing = args.overwrite;
    options.ignore_folder_file_name_conflicts = args.ignore_conflicts;
    options.preserve_timestamps = !args.no_preserve_timestamps;
    options.filter = exclusion_filter(&args.filter)?;
    Ok(())
}

/// Build a filter predicate rejecting every path that matches an exclusion.
fn exclusion_filter(args: &FilterArgs) -> Result<Option<PathFilter>> {
    if args.excludes.is_empty() {
        return Ok(None);
    }

    let excluded = build_globset(&args.excludes)?;
    Ok(Some(PathFilter::new(move |item: &PathItem| {
        !excluded.is_match(item.relative_path()) && !excluded.is_match(item.relative_to_root())
    })))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).wrap_err_with(|| format!("Invalid glob: {pattern}"))?;
        builder.add(glob);
    }
    builder.build().wrap_err("Failed to compile exclusion globs")
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
    quiet: bool,
}

fn run(
    kind: OperationKind,
    sources: &[PathBuf],
    destination: Option<&Path>,
    options: ProcessOptions,
    output: Output,
) -> Result<()> {
    let sources = sources
        .iter()
        .map(|path| absolute(path))
        .collect::<Result<Vec<_>>>()?;
    let destination = destination.map(absolute).transpose()?;

    let request = ProcessRequest::new(kind, sources, destination);
    let mut process = request
        .into_process(options)
        .wrap_err_with(|| format!("Cannot {}", kind.to_string().to_lowercase()))?;

    let mut progress = ConsoleProgress::new(!output.quiet && !output.json);
    let result = process.start(&mut progress);
    progress.finish();

    let summary = process.summary();
    let errors = process.errors();

    if output.json {
        let report = serde_json::json!({
            "summary": summary,
            "errors": errors.iter().map(error_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for error in errors {
            eprintln!("  {} {}", action_marker(error.action), error);
        }
        let elapsed = summary
            .elapsed()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default();
        println!(
            "{} ({} in {:.2}s)",
            summary.summary(),
            format_size(summary.bytes_processed),
            elapsed
        );
    }

    result.wrap_err_with(|| format!("{kind} did not complete"))?;
    if summary.failed > 0 {
        bail!("{} item(s) failed", summary.failed);
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<String> {
    let path = std::path::absolute(path)
        .wrap_err_with(|| format!("Invalid path: {}", path.display()))?;
    Ok(path.to_string_lossy().into_owned())
}

fn error_json(error: &ProcessErrorItem) -> serde_json::Value {
    serde_json::json!({
        "path": error.item.path(),
        "kind": error.error.kind,
        "message": error.error.message,
        "os_code": error.error.os_code,
        "action": error.action,
    })
}

fn action_marker(action: Action) -> &'static str {
    match action {
        Action::Ignore => "skipped:",
        Action::Retry => "retried:",
        Action::Abort => "aborted:",
    }
}

/// Single-line progress on stderr.
struct ConsoleProgress {
    enabled: bool,
    drawn: bool,
}

impl ConsoleProgress {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            drawn: false,
        }
    }

    fn finish(&mut self) {
        if self.drawn {
            eprintln!();
            self.drawn = false;
        }
    }
}

impl ProgressContract for ConsoleProgress {
    fn on_overall_progress(&mut self, percent: f64, extra: &OperationProgress) {
        if !self.enabled {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\r{percent:5.1}%  {}/{} items  {}",
            extra.items_completed,
            extra.items_total,
            format_size(extra.bytes_processed)
        );
        let _ = stderr.flush();
        self.drawn = true;
    }

    fn on_error(&mut self, error: &ProcessErrorItem) -> Action {
        self.finish();
        tracing::debug!(error = %error, "Item failed, continuing");
        Action::Ignore
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
