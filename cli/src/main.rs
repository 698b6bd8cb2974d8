use std::fmt::Display;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dbpatcher_core::{Direction, ErrorKind};
use dbpatcher_db::{MissingTargetPolicy, PatchRepository, PatcherConfig, PersistMode, StoreError};
use dbpatcher_sqlite::{Patcher, PatcherError, TraversalReport};
use rusqlite::Connection;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const SHELL_PROMPT: &str = "dbpatcher> ";

/// CLI-specific persistence mode with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPersistMode {
    PerPatch,
    EndOfTraversal,
}

impl From<CliPersistMode> for PersistMode {
    fn from(mode: CliPersistMode) -> Self {
        match mode {
            CliPersistMode::PerPatch => Self::PerPatch,
            CliPersistMode::EndOfTraversal => Self::EndOfTraversal,
        }
    }
}

/// CLI-specific missing-target policy with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliMissingTarget {
    Fail,
    ApplyAll,
}

impl From<CliMissingTarget> for MissingTargetPolicy {
    fn from(policy: CliMissingTarget) -> Self {
        match policy {
            CliMissingTarget::Fail => Self::Fail,
            CliMissingTarget::ApplyAll => Self::ApplyAll,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "dbpatcher", version)]
#[command(about = "Apply and revert versioned database patches")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// YAML configuration file. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory holding patchNNNN.sql files.
    #[arg(long, global = true)]
    patch_dir: Option<PathBuf>,
    /// Applied-state record (default: <patch-dir>/patcher_state.txt).
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,
    /// When to write the applied-state record.
    #[arg(long, global = true)]
    persist: Option<CliPersistMode>,
    /// What to do when a target version has no patch.
    #[arg(long, global = true)]
    missing_target: Option<CliMissingTarget>,
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(flatten)]
    Op(Operation),
    /// Read commands from stdin until exit, quit, or end of input.
    Shell,
}

/// Commands available both from the command line and inside the shell.
#[derive(Debug, Subcommand)]
enum Operation {
    /// List every known patch and whether it is applied.
    List,
    /// Show the current version and the patches left to install.
    Status(StatusArgs),
    /// Apply pending patches up to VERSION (inclusive), or all of them.
    Up(TraversalArgs),
    /// Revert applied patches down to VERSION (exclusive), or all of them.
    Down(TraversalArgs),
    /// Create the next patchNNNN.sql with empty sections.
    New,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Print the status as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct TraversalArgs {
    /// Target version.
    version: Option<u32>,
}

/// One line typed into the shell.
#[derive(Debug, Parser)]
#[command(name = "dbpatcher", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Debug, Subcommand)]
enum ShellCommand {
    #[command(flatten)]
    Op(Operation),
    /// Leave the shell.
    #[command(alias = "quit")]
    Exit,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the defaults.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,dbpatcher=debug"
    } else {
        "warn,dbpatcher=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<(), String> {
    let config = resolve_config(&cli.global)?;

    match cli.command {
        // Scaffolding a patch never touches the database.
        Command::Op(Operation::New) => run_new(&PatchRepository::new(&config.patch_dir)),
        Command::Op(operation) => execute(&mut open_patcher(&config)?, operation),
        Command::Shell => run_shell(open_patcher(&config)?),
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn resolve_config(args: &GlobalArgs) -> Result<PatcherConfig, String> {
    let mut config = match &args.config {
        Some(path) => PatcherConfig::load(path).map_err(|err| {
            format!(
                "Failed to load config '{}': {}",
                path.display(),
                describe_store(&err)
            )
        })?,
        None => {
            let database = args
                .db
                .clone()
                .ok_or("--db is required when --config is not given")?;
            let patch_dir = args
                .patch_dir
                .clone()
                .ok_or("--patch-dir is required when --config is not given")?;
            PatcherConfig::new(database, patch_dir)
        }
    };

    if let Some(db) = &args.db {
        config.database = db.clone();
    }
    if let Some(patch_dir) = &args.patch_dir {
        config.patch_dir = patch_dir.clone();
    }
    if let Some(state_file) = &args.state_file {
        config.state_file = Some(state_file.clone());
    }
    if let Some(persist) = args.persist {
        config.persist = persist.into();
    }
    if let Some(policy) = args.missing_target {
        config.missing_target = policy.into();
    }

    config.validate().map_err(|err| describe_store(&err))?;
    debug!(
        database = %config.database.display(),
        patch_dir = %config.patch_dir.display(),
        state_file = %config.state_path().display(),
        persist = ?config.persist,
        missing_target = ?config.missing_target,
        "configuration resolved"
    );
    Ok(config)
}

fn open_patcher(config: &PatcherConfig) -> Result<Patcher, String> {
    let conn = Connection::open(&config.database).map_err(|err| {
        format!(
            "Failed to open database '{}': {err}",
            config.database.display()
        )
    })?;
    let repository = PatchRepository::new(&config.patch_dir);
    Patcher::from_config(conn, repository, config).map_err(|err| describe(&err))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

fn execute(patcher: &mut Patcher, operation: Operation) -> Result<(), String> {
    match operation {
        Operation::List => run_list(patcher),
        Operation::Status(args) => run_status(patcher, args),
        Operation::Up(args) => {
            let report = patcher.upgrade(args.version).map_err(|err| describe(&err))?;
            print_report(&report);
            Ok(())
        }
        Operation::Down(args) => {
            let report = patcher
                .downgrade(args.version)
                .map_err(|err| describe(&err))?;
            print_report(&report);
            Ok(())
        }
        Operation::New => run_new(patcher.repository()),
    }
}

fn run_list(patcher: &Patcher) -> Result<(), String> {
    let patches = patcher.list().map_err(|err| describe(&err))?;
    if patches.is_empty() {
        println!("No patches in '{}'.", patcher.repository().dir().display());
        return Ok(());
    }
    for id in patches {
        let mark = if patcher.state().is_applied(id) {
            "x"
        } else {
            " "
        };
        println!("[{mark}] {id}");
    }
    Ok(())
}

fn run_status(patcher: &Patcher, args: StatusArgs) -> Result<(), String> {
    let status = patcher.status().map_err(|err| describe(&err))?;

    if args.json {
        let json = serde_json::to_string_pretty(&status)
            .map_err(|err| format!("Failed to serialize status: {err}"))?;
        println!("{json}");
        return Ok(());
    }

    println!("Current version: {}", status.version);
    if status.is_up_to_date() {
        println!("Up to date.");
    } else {
        println!("Patches to install: {}", status.to_install.len());
        for id in &status.to_install {
            println!("  {id}");
        }
    }
    Ok(())
}

fn run_new(repository: &PatchRepository) -> Result<(), String> {
    let id = repository.next_id().map_err(|err| describe_store(&err))?;
    let path = repository
        .create_patch_file(id)
        .map_err(|err| describe_store(&err))?;
    println!("Created {}", path.display());
    Ok(())
}

fn print_report(report: &TraversalReport) {
    if report.patches.is_empty() {
        println!("Nothing to {}. Version: {}", report.direction, report.version);
        return;
    }
    let names: Vec<String> = report.patches.iter().map(ToString::to_string).collect();
    let verb = match report.direction {
        Direction::Upgrade => "Applied",
        Direction::Downgrade => "Reverted",
    };
    println!(
        "{verb} {} patch(es): {}. Version: {}",
        names.len(),
        names.join(", "),
        report.version
    );
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

fn run_shell(mut patcher: Patcher) -> Result<(), String> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut lines = stdin.lock().lines();

    loop {
        if interactive {
            write_prompt(&mut std::io::stdout().lock())
                .map_err(|err| format!("Failed to write prompt: {err}"))?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|err| format!("Failed to read stdin: {err}"))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(args) = shlex::split(line) else {
            println!("Error: mismatched quotes");
            continue;
        };

        match ShellLine::try_parse_from(args) {
            Ok(parsed) => match parsed.command {
                ShellCommand::Exit => break,
                ShellCommand::Op(operation) => {
                    if let Err(err) = execute(&mut patcher, operation) {
                        println!("{err}");
                    }
                }
            },
            // Covers `help` and `--help` too.
            Err(err) => print!("{err}"),
        }
    }
    Ok(())
}

fn write_prompt(out: &mut impl Write) -> std::io::Result<()> {
    out.write_all(SHELL_PROMPT.as_bytes())?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn describe(err: &PatcherError) -> String {
    with_kind(err.kind(), err)
}

fn describe_store(err: &StoreError) -> String {
    with_kind(err.kind(), err)
}

/// Prefixes a message with its error kind, e.g. `[NotFoundError] ...`.
fn with_kind(kind: ErrorKind, err: &dyn Display) -> String {
    format!("[{kind}] {err}")
}
