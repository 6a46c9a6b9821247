mod logging;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process;

use ward_core::analysis::{self, AnalysisReport, Severity};
use ward_core::{load_config, OwnershipPolicy, RuntimeConfig};

/// Ward: access-control checker for contract sources
///
/// Check that privileged operations are guarded by the ownership predicate,
/// hash contract sources, and scaffold runtime configuration.
#[derive(Parser)]
#[command(name = "ward", version, about, long_about = None)]
struct Cli {
    /// Suppress non-essential output, including diagnostic tracing
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a contract source against the ownership policy
    Check {
        /// Path to the contract source
        file: PathBuf,
        /// Runtime configuration (TOML); defaults apply when absent
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute the SHA-256 hash of a contract source
    Hash {
        /// Path to the contract source
        file: PathBuf,
    },

    /// Write a ward.toml configuration scaffold in the current directory
    Init {
        /// Owner identity to record in the policy
        #[arg(long)]
        owner: Option<String>,
        /// Overwrite an existing ward.toml
        #[arg(long)]
        force: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.quiet);

    let exit_code = match cli.command {
        Commands::Check { file, config, json } => cmd_check(&file, config.as_deref(), json, cli.quiet),
        Commands::Hash { file } => cmd_hash(&file),
        Commands::Init { owner, force } => cmd_init(owner, force, cli.quiet),
        Commands::Version => {
            println!(
                "ward {} (ward-core {})",
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_VERSION")
            );
            0
        }
    };

    process::exit(exit_code);
}

// ── Helpers ───────────────────────────────────────────────

fn read_source(path: &Path) -> Result<String, i32> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("{} cannot read '{}': {}", "error:".red().bold(), path.display(), e);
        2
    })
}

fn load_runtime_config(path: Option<&Path>) -> Result<RuntimeConfig, i32> {
    let loaded = match path {
        Some(path) => load_config(path),
        None => Ok(RuntimeConfig::default()),
    };
    loaded.map_err(|e| {
        eprintln!("{} {}", "error:".red().bold(), e);
        2
    })
}

// ── Commands ──────────────────────────────────────────────

fn cmd_check(file: &Path, config: Option<&Path>, json: bool, quiet: bool) -> i32 {
    let source = match read_source(file) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let config = match load_runtime_config(config) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let report = match analysis::analyze(&source, &config.policy, &config.analysis) {
        Ok(r) => r,
        Err(e) => {
            if json {
                let out = serde_json::json!({
                    "deployable": false,
                    "error": e.to_string(),
                });
                println!("{}", out);
            }
            eprintln!("{} {}", "error:".red().bold(), e);
            return 1;
        }
    };

    if json {
        let out = serde_json::json!({
            "deployable": report.is_deployable(),
            "receipt_id": report.receipt_id(),
            "source_hash": report.source_hash,
            "critical": report.critical_count(),
            "violations": report.violation_count(),
            "handlers": report.handlers,
            "diagnostics": report.diagnostics,
        });
        println!("{}", out);
    } else if !quiet {
        print_report(file, &report);
    }

    if report.is_deployable() {
        0
    } else {
        if quiet && !json {
            eprintln!(
                "{} {} critical finding(s)",
                "error:".red().bold(),
                report.critical_count()
            );
        }
        1
    }
}

fn print_report(file: &Path, report: &AnalysisReport) {
    println!("{}", file.display().to_string().bold());
    for handler in &report.handlers {
        if handler.violations.is_empty() {
            println!("  {} {}", "✓".green(), handler.handler_name);
            continue;
        }
        println!("  {} {}", "✗".red(), handler.handler_name);
        for v in &handler.violations {
            let tag = match v.severity {
                Severity::Critical => v.severity.to_string().red().bold(),
                Severity::Warning => v.severity.to_string().yellow().bold(),
            };
            println!(
                "      {} [{}] {}: {}",
                tag, v.class, v.call_site, v.message
            );
        }
    }
    for d in &report.diagnostics {
        let tag = match d.severity {
            Severity::Critical => d.severity.to_string().red().bold(),
            Severity::Warning => d.severity.to_string().yellow().bold(),
        };
        match &d.span {
            Some(span) => println!("  {} [{}] at {}: {}", tag, d.kind, span, d.message),
            None => println!("  {} [{}]: {}", tag, d.kind, d.message),
        }
    }

    let verdict = if report.is_deployable() {
        "deployable".green().bold()
    } else {
        "blocked".red().bold()
    };
    println!("{}: {}", verdict, report.summary());
    println!("receipt {}", report.receipt_id());
}

fn cmd_hash(file: &Path) -> i32 {
    match read_source(file) {
        Ok(source) => {
            println!("{}", analysis::source_hash(&source));
            0
        }
        Err(code) => code,
    }
}

fn cmd_init(owner: Option<String>, force: bool, quiet: bool) -> i32 {
    let path = PathBuf::from("ward.toml");
    if path.exists() && !force {
        eprintln!(
            "{} '{}' already exists (use --force to overwrite)",
            "error:".red().bold(),
            path.display()
        );
        return 2;
    }

    let config = RuntimeConfig {
        policy: OwnershipPolicy::owned_by(owner.unwrap_or_default()),
        ..RuntimeConfig::default()
    };
    let text = match config.to_toml() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return 2;
        }
    };
    if let Err(e) = std::fs::write(&path, text) {
        eprintln!("{} cannot write '{}': {}", "error:".red().bold(), path.display(), e);
        return 2;
    }
    if !quiet {
        println!("{} {}", "created".green().bold(), path.display());
    }
    0
}
