use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use narrative_patcher::config::{load_from_path, PatcherConfig};
use narrative_patcher::output::render_lines;
use narrative_patcher::rebuild::{
    Freshness, RebuildCoordinator, RebuildOutcome, RebuildReport, StaleReason,
};
use narrative_patcher::{telemetry, DirectoryRegistry, ErrorLog, PackageRegistry, PatchError};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the current directory when none is given.
const DEFAULT_CONFIG: &str = "patcher.toml";

#[derive(Parser)]
#[command(name = "narrative-patcher")]
#[command(about = "Merge content-package patches into event-structured scripts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate the output directory if it is stale
    Rebuild {
        /// Path to patcher.toml
        #[arg(short, long, env = "NARRATIVE_PATCHER_CONFIG")]
        config: Option<PathBuf>,

        /// Regenerate even if the output is fresh
        #[arg(short, long)]
        force: bool,

        /// Show unified diff of each regenerated file against its source
        #[arg(short, long)]
        diff: bool,
    },

    /// Report whether the output is fresh, without writing anything
    Status {
        /// Path to patcher.toml
        #[arg(short, long, env = "NARRATIVE_PATCHER_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Run every patch in memory and list all problems
    Check {
        /// Path to patcher.toml
        #[arg(short, long, env = "NARRATIVE_PATCHER_CONFIG")]
        config: Option<PathBuf>,
    },

    /// List content packages and their enablement
    List {
        /// Path to patcher.toml
        #[arg(short, long, env = "NARRATIVE_PATCHER_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Rebuild {
            config,
            force,
            diff,
        } => cmd_rebuild(config, force, diff),

        Commands::Status { config } => cmd_status(config),

        Commands::Check { config } => cmd_check(config),

        Commands::List { config } => cmd_list(config),
    }
}

/// Resolve and load the config.
///
/// Priority order:
/// 1. Explicit --config flag
/// 2. NARRATIVE_PATCHER_CONFIG environment variable (via clap)
/// 3. ./patcher.toml
fn load_config(cli_config: Option<PathBuf>) -> Result<PatcherConfig> {
    let path = match cli_config {
        Some(path) => path,
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG);
            if !fallback.is_file() {
                anyhow::bail!(
                    "{}\n{}\n  {}\n  {}\n  {}",
                    "Could not find patcher.toml.".red(),
                    "Try one of:".bold(),
                    "1. cd into your project directory: cd /path/to/game && narrative-patcher rebuild",
                    "2. Specify explicitly: narrative-patcher rebuild --config /path/to/patcher.toml",
                    "3. Set environment variable: export NARRATIVE_PATCHER_CONFIG=/path/to/patcher.toml"
                );
            }
            fallback
        }
    };

    let config = load_from_path(&path)?;
    println!("{}", format!("Config: {}", path.display()).dimmed());
    Ok(config)
}

fn scan_packages(config: &PatcherConfig) -> Result<DirectoryRegistry> {
    let registry = DirectoryRegistry::scan(&config.paths.packages_dir, &config.packages)
        .with_context(|| {
            format!(
                "failed to scan packages in {}",
                config.paths.packages_dir.display()
            )
        })?;
    for problem in registry.problems() {
        eprintln!("{}", format!("Warning: {problem}").yellow());
    }
    Ok(registry)
}

/// Helper: Show unified diff between a source script and its regenerated output
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (source)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_problems(log: &ErrorLog) {
    for problem in log.errors() {
        print_problem(problem);
    }
}

fn print_problem(problem: &PatchError) {
    if problem.is_warning() {
        println!("{} {}", "⊙".yellow(), problem);
    } else {
        println!("{} {}", "✗".red(), problem);
    }
}

fn print_summary(report: &RebuildReport, log: &ErrorLog) {
    println!("{}", "Summary:".bold());
    println!("  {} files", format!("{}", report.files.len()).cyan());
    println!("  {} applied", format!("{}", report.stats.applied).green());
    println!("  {} cancelled", format!("{}", report.cancelled).cyan());
    println!("  {} unapplied", format!("{}", report.stats.unapplied).yellow());
    println!("  {} orphaned", format!("{}", report.orphaned).yellow());
    println!("  {} failed", format!("{}", report.stats.failed).red());
    println!(
        "  {} problems ({} warnings)",
        format!("{}", log.len()).red(),
        log.warning_count()
    );
}

fn cmd_rebuild(config: Option<PathBuf>, force: bool, show_diff: bool) -> Result<()> {
    let config = load_config(config)?;
    let registry = scan_packages(&config)?;
    let mut coordinator = RebuildCoordinator::new(&config, &registry);
    let mut log = ErrorLog::new();

    let (reason, report) = if force {
        (StaleReason::Forced, coordinator.regenerate(&mut log)?)
    } else {
        match coordinator.rebuild(&mut log)? {
            RebuildOutcome::Fresh => {
                println!(
                    "{} Output is up to date: {}",
                    "✓".green(),
                    config.paths.output_dir.display()
                );
                return Ok(());
            }
            RebuildOutcome::Rebuilt { reason, report } => (reason, report),
        }
    };

    println!("{}", format!("Rebuilding ({reason})").cyan());
    for file in &report.files {
        let source = match &file.origin {
            Some(package) => format!("{} [{package}]", file.source.display()),
            None => file.source.display().to_string(),
        };
        println!("{} {} → {}", "✓".green(), source, file.name);

        if show_diff {
            if let Ok(before) = fs::read_to_string(&file.source) {
                let after = render_lines(&file.lines);
                if before != after {
                    display_diff(&config.paths.output_dir.join(&file.name), &before, &after);
                }
            }
        }
    }

    println!();
    print_summary(&report, &log);

    if !log.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let registry = scan_packages(&config)?;
    let coordinator = RebuildCoordinator::new(&config, &registry);

    println!("{}", "Rebuild Status Report".bold());
    println!("Output: {}", config.paths.output_dir.display());

    match coordinator.check() {
        Freshness::Fresh => println!("{} {}", "✓".green(), "FRESH".green().bold()),
        Freshness::Stale(reason) => println!(
            "{} {} ({})",
            "⊙".yellow(),
            "STALE".yellow().bold(),
            reason.to_string().dimmed()
        ),
    }

    Ok(())
}

fn cmd_check(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let registry = scan_packages(&config)?;
    let mut coordinator = RebuildCoordinator::new(&config, &registry);
    let mut log = ErrorLog::new();

    println!("{}", "Checking patches...".bold());
    let report = coordinator.dry_run(&mut log)?;

    print_problems(&log);
    println!();
    print_summary(&report, &log);

    if !log.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let registry = scan_packages(&config)?;

    let packages = registry.list_packages();
    if packages.is_empty() {
        println!(
            "{}",
            format!("No packages found in {}", config.paths.packages_dir.display()).yellow()
        );
        return Ok(());
    }

    for package in packages {
        let marker = if registry.is_enabled(&package.id) {
            "✓".green()
        } else {
            "⊘".cyan()
        };
        println!(
            "{} {} ({} v{})",
            marker,
            package.id.bold(),
            package.name,
            package.version
        );
        for credit in &package.intro_credits {
            println!("    {}", credit.dimmed());
        }
    }

    Ok(())
}
