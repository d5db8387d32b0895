//! Kindle CLI: inspects and manages the incremental build state of a project.
//!
//! Provides `kindle status` for a dry-run of the cache version checks and
//! dirty-source detection, `kindle lookup` and `kindle inspect` for reading
//! the persisted lookup index and incremental caches, and `kindle clean`
//! for dropping the data directory.

#![warn(missing_docs)]

mod clean;
mod inspect;
mod status;
mod workspace;

use std::io::IsTerminal;
use std::process;
use std::sync::Once;

use clap::{Parser, Subcommand, ValueEnum};

/// Kindle: incremental recompilation for JVM-style projects.
#[derive(Parser, Debug)]
#[command(name = "kindle", version, about = "Kindle incremental build engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `kindle.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report pending version actions and dirty sources per target.
    Status(StatusArgs),
    /// Print the files recorded as referencing a symbol.
    Lookup {
        /// Simple name of the symbol.
        name: String,
        /// Fully qualified scope declaring it.
        scope: String,
    },
    /// List the classes cached for a target.
    Inspect {
        /// Target name from `kindle.toml`.
        target: String,
    },
    /// Remove the data directory.
    Clean,
}

/// Arguments for the `kindle status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format for the report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

static TRACING_INIT: Once = Once::new();

/// Installs the log subscriber once.
///
/// Logging is on when `RUST_LOG` is set; `--verbose` without `RUST_LOG`
/// enables debug output for the kindle crates.
fn init_tracing(verbose: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = match std::env::var("RUST_LOG") {
            Ok(_) => EnvFilter::from_default_env(),
            Err(_) if verbose => EnvFilter::new(
                "kindle_cli=debug,kindle_cache=debug,kindle_incremental=debug",
            ),
            Err(_) => return,
        };
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    });
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        color,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Status(ref args) => status::run(args, &global),
        Command::Lookup {
            ref name,
            ref scope,
        } => inspect::run_lookup(name, scope, &global),
        Command::Inspect { ref target } => inspect::run_inspect(target, &global),
        Command::Clean => clean::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
