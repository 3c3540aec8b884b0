use anyhow::{Context, Result};
use assets_patcher::config::{load, save_to_dir, save_to_path, PatchCollection};
use assets_patcher::engine::{ApplyObserver, EngineOptions, PatchEngine, RunReport};
use assets_patcher::validate::validate_definition_for_apply;
use assets_patcher::{lint_replacements, validate_for_apply, BackupManager, TextCodec};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTAINER_ENV: &str = "ASSETS_PATCHER_CONTAINER";
const PATCHES_ENV: &str = "ASSETS_PATCHER_PATCHES";

#[derive(Parser)]
#[command(name = "assets-patcher")]
#[command(about = "Regex patching of text assets inside game asset containers", long_about = None)]
#[command(version)]
struct Cli {
    /// Print per-object detail and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ContainerArg {
    /// Path to the container file (or set ASSETS_PATCHER_CONTAINER)
    #[arg(short, long)]
    container: Option<PathBuf>,
}

#[derive(Args)]
struct PatchesArg {
    /// Patch file or directory of patch files (default: ./patches)
    #[arg(short, long)]
    patches: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the container, then apply patches to it
    Apply {
        #[command(flatten)]
        container: ContainerArg,

        #[command(flatten)]
        patches: PatchesArg,

        /// Only apply definitions with this exact name (repeatable)
        #[arg(long)]
        only: Vec<String>,

        /// Skip creating <container>.backup first
        #[arg(long)]
        no_backup: bool,

        /// How payloads are turned into text: escaped or utf8
        #[arg(long, default_value_t = TextCodec::Escaped)]
        codec: TextCodec,

        /// Fail on the first object that cannot be decoded or re-encoded
        #[arg(long)]
        strict: bool,
    },

    /// Show which patches would match, without writing anything
    Check {
        #[command(flatten)]
        container: ContainerArg,

        #[command(flatten)]
        patches: PatchesArg,

        /// Only check definitions with this exact name (repeatable)
        #[arg(long)]
        only: Vec<String>,

        #[arg(long, default_value_t = TextCodec::Escaped)]
        codec: TextCodec,

        /// Show unified diff of every object that would change
        #[arg(short, long)]
        diff: bool,
    },

    /// Copy the container to <container>.backup
    Backup {
        #[command(flatten)]
        container: ContainerArg,
    },

    /// Restore the container from <container>.backup
    Restore {
        #[command(flatten)]
        container: ContainerArg,
    },

    /// Show size and object counts of a container
    Info {
        #[command(flatten)]
        container: ContainerArg,
    },

    /// Validate patch files
    Validate {
        #[command(flatten)]
        patches: PatchesArg,
    },

    /// List patch definitions
    List {
        #[command(flatten)]
        patches: PatchesArg,

        /// Case-insensitive name filter
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Write patch definitions to a single file or one file per definition
    Export {
        #[command(flatten)]
        patches: PatchesArg,

        /// Write all selected definitions to this file
        #[arg(short, long, conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Write each selected definition to its own file in this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Zero-based index of a definition to export (repeatable; default all)
        #[arg(short, long)]
        index: Vec<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let verbose = cli.verbose;

    match cli.command {
        Commands::Apply {
            container,
            patches,
            only,
            no_backup,
            codec,
            strict,
        } => cmd_apply(
            container.container,
            patches.patches,
            &only,
            no_backup,
            EngineOptions {
                codec,
                strict,
                verbose,
            },
        ),

        Commands::Check {
            container,
            patches,
            only,
            codec,
            diff,
        } => cmd_check(
            container.container,
            patches.patches,
            &only,
            EngineOptions {
                codec,
                strict: false,
                verbose,
            },
            diff,
        ),

        Commands::Backup { container } => cmd_backup(container.container),

        Commands::Restore { container } => cmd_restore(container.container),

        Commands::Info { container } => cmd_info(container.container),

        Commands::Validate { patches } => cmd_validate(patches.patches),

        Commands::List { patches, search } => cmd_list(patches.patches, search.as_deref()),

        Commands::Export {
            patches,
            output,
            output_dir,
            index,
        } => cmd_export(patches.patches, output, output_dir, &index),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Prints engine log lines as they arrive.
struct ConsoleObserver;

impl ApplyObserver for ConsoleObserver {
    fn on_log(&mut self, message: &str) {
        if message.starts_with("Skipping object") {
            println!("  {}", message.yellow());
        } else if message.starts_with("Error") {
            eprintln!("  {}", message.red());
        } else {
            println!("  {}", message.dimmed());
        }
    }
}

/// Resolve the container path.
///
/// Priority order:
/// 1. Explicit --container flag
/// 2. ASSETS_PATCHER_CONTAINER environment variable
fn resolve_container(cli_container: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_container {
        return Ok(path);
    }

    if let Ok(env_path) = env::var(CONTAINER_ENV) {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}",
        "No container file given.".red(),
        "Try one of:".bold(),
        "1. Specify explicitly: assets-patcher apply --container Game_Data/resources.assets",
        "2. Set environment variable: export ASSETS_PATCHER_CONTAINER=Game_Data/resources.assets"
    )
}

/// Resolve the patch source (file or directory).
///
/// Priority order:
/// 1. Explicit --patches flag
/// 2. ASSETS_PATCHER_PATCHES environment variable
/// 3. `./patches` relative to the current working directory
fn resolve_patches(cli_patches: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_patches {
        return Ok(path);
    }

    if let Ok(env_path) = env::var(PATCHES_ENV) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: {} is set but path doesn't exist: {}",
                PATCHES_ENV, env_path
            )
            .yellow()
        );
    }

    let cwd_patches = env::current_dir()?.join("patches");
    if cwd_patches.is_dir() {
        return Ok(cwd_patches);
    }

    anyhow::bail!(
        "No patches found. Pass --patches <file|dir>, set {}, or create ./patches",
        PATCHES_ENV
    )
}

fn load_patches(cli_patches: Option<PathBuf>) -> Result<(PathBuf, PatchCollection)> {
    let source = resolve_patches(cli_patches)?;
    let patches = load(&source)?;
    Ok((source, patches))
}

/// Narrow a collection to the definitions named in `only`, failing on
/// names that match nothing.
fn select_patches(patches: PatchCollection, only: &[String]) -> Result<PatchCollection> {
    if only.is_empty() {
        return Ok(patches);
    }

    let missing: Vec<&String> = only
        .iter()
        .filter(|name| !patches.iter().any(|p| p.name() == name.as_str()))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "No patch definition named: {}",
            missing
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(patches.filter_by_names(only))
}

fn print_lints(patches: &PatchCollection) {
    for lint in lint_replacements(patches) {
        eprintln!("{} {}", "warning:".yellow().bold(), lint);
    }
}

/// Helper: Show unified diff between original and patched payload
fn display_diff(object: &str, original: &[u8], modified: &[u8]) {
    let original = String::from_utf8_lossy(original);
    let modified = String::from_utf8_lossy(modified);

    println!("\n{}", format!("--- {} (original)", object).dimmed());
    println!("{}", format!("+++ {} (patched)", object).dimmed());

    let diff = TextDiff::from_lines(original.as_ref(), modified.as_ref());

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
        if change.missing_newline() {
            println!();
        }
    }
}

fn print_outcomes(report: &RunReport, verb: &str) {
    for outcome in &report.definitions {
        if outcome.matched() {
            println!(
                "{} {}: {} {}",
                "✓".green(),
                outcome.name,
                verb,
                outcome.matched_objects.join(", ")
            );
        } else {
            println!("{} {}: No matching object", "⊘".cyan(), outcome.name);
        }
    }
    for skipped in &report.skipped {
        println!("{} {}: Skipped ({})", "⊙".yellow(), skipped.name, skipped.reason);
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} of {} patches matched",
        format!("{}", report.definitions_matched()).green(),
        report.total_patches()
    );
    println!(
        "  {} objects changed",
        format!("{}", report.patched_objects.len()).green()
    );
    println!(
        "  {} text assets scanned ({} objects)",
        report.text_assets, report.objects_scanned
    );
    println!(
        "  {} objects skipped",
        format!("{}", report.skipped.len()).yellow()
    );
}

fn cmd_apply(
    container: Option<PathBuf>,
    patches: Option<PathBuf>,
    only: &[String],
    no_backup: bool,
    options: EngineOptions,
) -> Result<()> {
    // 1. Resolve inputs
    let container = resolve_container(container)?;
    let (source, patches) = load_patches(patches)?;
    let patches = select_patches(patches, only)?;

    println!("Container: {}", container.display());
    println!("Patches: {} ({} definitions)", source.display(), patches.len());
    println!();

    // 2. Validate before touching anything
    print_lints(&patches);
    validate_for_apply(&patches)?;

    // 3. Back up
    if no_backup {
        println!("{}", "Skipping backup (--no-backup)".yellow());
    } else {
        let backup = BackupManager::new().create_backup(&container)?;
        println!("Backup: {}", backup.display());
    }

    // 4. Apply
    let engine = PatchEngine::new(options);
    let report = engine
        .apply(&container, &patches, &mut ConsoleObserver)
        .with_context(|| format!("Patching {} failed", container.display()))?;

    println!();
    print_outcomes(&report, "Applied to");
    print_summary(&report);

    Ok(())
}

fn cmd_check(
    container: Option<PathBuf>,
    patches: Option<PathBuf>,
    only: &[String],
    options: EngineOptions,
    show_diff: bool,
) -> Result<()> {
    let container = resolve_container(container)?;
    let (source, patches) = load_patches(patches)?;
    let patches = select_patches(patches, only)?;

    println!("{}", "Checking patches...".bold());
    println!("Container: {}", container.display());
    println!("Patches: {}", source.display());
    println!();

    print_lints(&patches);

    let engine = PatchEngine::new(options);
    let report = engine.scan(&container, &patches, &mut ConsoleObserver)?;

    println!();
    print_outcomes(&report, "Would apply to");

    if show_diff {
        for change in &report.changes {
            display_diff(&change.name, &change.before, &change.after);
        }
    }

    print_summary(&report);
    Ok(())
}

fn cmd_backup(container: Option<PathBuf>) -> Result<()> {
    let container = resolve_container(container)?;
    let backup = BackupManager::new().create_backup(&container)?;
    println!(
        "{} Backup created: {}",
        "✓".green(),
        backup.display()
    );
    Ok(())
}

fn cmd_restore(container: Option<PathBuf>) -> Result<()> {
    let container = resolve_container(container)?;
    BackupManager::new().restore_backup(&container)?;
    println!(
        "{} Restored {} from backup",
        "✓".green(),
        container.display()
    );
    Ok(())
}

fn cmd_info(container: Option<PathBuf>) -> Result<()> {
    let container = resolve_container(container)?;
    let info = PatchEngine::default().info(&container)?;
    println!("{}", "Container Info".bold());
    println!("{}", info);
    Ok(())
}

fn cmd_validate(patches: Option<PathBuf>) -> Result<()> {
    let source = resolve_patches(patches)?;
    println!("{}", "Validating patches...".bold());
    println!("Source: {}", source.display());
    println!();

    // load() already runs the creation-time checks
    let patches = load(&source)?;
    print_lints(&patches);

    let mut failed = 0;
    for (index, patch) in patches.iter().enumerate() {
        match validate_definition_for_apply(index, patch) {
            Ok(()) => println!(
                "{} {}: {} rule(s)",
                "✓".green(),
                patch.name(),
                patch.rules().len()
            ),
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), patch.name(), e);
                failed += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} valid", format!("{}", patches.len() - failed).green());
    println!("  {} invalid", format!("{}", failed).red());

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(patches: Option<PathBuf>, search: Option<&str>) -> Result<()> {
    let (source, patches) = load_patches(patches)?;
    let summary = patches.summary();

    println!("{}", "Patch Definitions".bold());
    println!("Source: {}", source.display());
    println!(
        "{} definitions, {} rules",
        summary.total_patches, summary.total_rules
    );
    println!();

    let shown = match search {
        Some(query) => patches.search(query),
        None => patches.iter().enumerate().collect(),
    };
    for (index, patch) in shown {
        println!(
            "  [{}] {} {}",
            index,
            patch.name(),
            format!("({} rules)", patch.rules().len()).dimmed()
        );
        println!("      {}", format!("locator: {}", patch.locator()).dimmed());
    }

    Ok(())
}

fn cmd_export(
    patches: Option<PathBuf>,
    output: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    indices: &[usize],
) -> Result<()> {
    let (_, patches) = load_patches(patches)?;
    let selected = if indices.is_empty() {
        patches
    } else {
        patches.select(indices)?
    };

    match (output, output_dir) {
        (Some(file), _) => {
            save_to_path(&file, &selected)?;
            println!(
                "{} Exported {} definitions to {}",
                "✓".green(),
                selected.len(),
                file.display()
            );
        }
        (None, Some(dir)) => {
            let written = save_to_dir(&dir, &selected)?;
            for path in &written {
                println!("  {}", display_name(path));
            }
            println!(
                "{} Exported {} files to {}",
                "✓".green(),
                written.len(),
                dir.display()
            );
        }
        (None, None) => anyhow::bail!("Specify --output <file> or --output-dir <dir>"),
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
