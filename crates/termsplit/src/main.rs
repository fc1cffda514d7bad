use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use termsplit_core::config::load_config;
use termsplit_core::manifest_order::ManifestUpdateReport;
use termsplit_core::report::{MessageLevel, MessageLog};
use termsplit_core::runtime::{PathOverrides, ResolutionContext, ResolvedPaths, resolve_paths};
use termsplit_core::{
    ExtractReport, MigrateError, MigrateOptions, RewriteReport, RunReport, StatusReport,
    inspect_project, rewrite_to_iref, run_both, scan_and_extract,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "termsplit",
    version,
    about = "Move inline definition blocks of a markdown specification into per-term files"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(long, global = true, help = "Print the report as JSON")]
    json: bool,
    #[arg(short, long, global = true, help = "Log progress to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
            json: cli.json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Write one term file per definition block")]
    Extract(PhaseArgs),
    #[command(about = "Replace definition blocks with inline references")]
    Rewrite(PhaseArgs),
    #[command(about = "Extract, then rewrite, then optionally split a glossary document")]
    Run(RunArgs),
    #[command(about = "Show the manifest, its documents and the terms directory state")]
    Status,
}

#[derive(Debug, Args)]
struct PhaseArgs {
    #[arg(long, help = "Report what would change without writing")]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, help = "Report what would change without writing")]
    dry_run: bool,
    #[arg(
        long,
        value_name = "DOCUMENT",
        help = "Manifest entry to dissolve into term files and companion fragments"
    )]
    split: Option<String>,
    #[arg(long, value_name = "NAME", help = "Manifest entry companions are placed around")]
    anchor: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    let result = match cli.command {
        Some(Commands::Extract(args)) => run_extract(&runtime, args),
        Some(Commands::Rewrite(args)) => run_rewrite(&runtime, args),
        Some(Commands::Run(args)) => run_all(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        None => {
            let mut command = Cli::command();
            command
                .print_help()
                .map(|()| println!())
                .map_err(anyhow::Error::from)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            match error.downcast_ref::<MigrateError>() {
                Some(migrate) if migrate.left_tree_untouched() => {
                    eprintln!("no files were changed");
                    ExitCode::from(2)
                }
                Some(_) => ExitCode::from(3),
                None => ExitCode::FAILURE,
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_extract(runtime: &RuntimeOptions, args: PhaseArgs) -> Result<()> {
    let (paths, mut options) = load_runtime(runtime)?;
    options.dry_run = args.dry_run;
    let report = scan_and_extract(&paths, &options)?;
    if runtime.json {
        return print_json(&report);
    }
    println!("term extraction");
    print_extract(&report);
    print_messages(&report.messages);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_rewrite(runtime: &RuntimeOptions, args: PhaseArgs) -> Result<()> {
    let (paths, mut options) = load_runtime(runtime)?;
    options.dry_run = args.dry_run;
    let report = rewrite_to_iref(&paths, &options)?;
    if runtime.json {
        return print_json(&report);
    }
    println!("inline reference rewrite");
    print_rewrite(&report);
    print_messages(&report.messages);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_all(runtime: &RuntimeOptions, args: RunArgs) -> Result<()> {
    let (paths, mut options) = load_runtime(runtime)?;
    options.dry_run = args.dry_run;
    options.split_source = args.split;
    if let Some(anchor) = args.anchor {
        options.anchor_entry = anchor;
    }
    let report: RunReport = run_both(&paths, &options)?;
    if runtime.json {
        return print_json(&report);
    }
    println!("term migration");
    print_extract(&report.extract);
    print_rewrite(&report.rewrite);
    match &report.split {
        Some(split) => {
            println!("split.source: {}", split.source);
            println!(
                "split.intro: {}",
                split.companions.intro.as_deref().unwrap_or("<none>")
            );
            println!(
                "split.trailing: {}",
                split.companions.trailing.as_deref().unwrap_or("<none>")
            );
            print_manifest_update(&split.manifest);
        }
        None => println!("split: {}", options.split_source.as_deref().unwrap_or("<none>")),
    }
    print_messages(&report.messages);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, options) = load_runtime(runtime)?;
    let report: StatusReport = inspect_project(&paths, &options)?;
    if runtime.json {
        return print_json(&report);
    }
    println!("project status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("manifest: {}", report.manifest_path);
    println!("spec_directory: {}", report.spec_directory);
    println!("terms_directory: {}", report.terms_directory);
    println!("terms_state: {}", report.guard.as_str());
    println!("verdict: {}", report.verdict.as_str());
    println!(
        "anchor: {} (listed: {})",
        report.anchor_entry,
        format_flag(report.anchor_listed)
    );
    println!("documents: {}", report.documents.len());
    for document in &report.documents {
        if document.exists {
            println!(
                "  - {}: {} definition block(s), {} inline reference(s)",
                document.document, document.definition_blocks, document.inline_references
            );
        } else {
            println!("  - {}: missing", document.document);
        }
    }
    print_messages(&report.messages);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn print_extract(report: &ExtractReport) {
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("terms_directory: {}", report.terms_directory);
    println!("terms_state: {}", report.guard.as_str());
    println!("verdict: {}", report.verdict.as_str());
    println!("definitions_found: {}", report.definitions_found);
    println!("skipped_blocks: {}", report.skipped_blocks);
    println!("files_created: {}", report.files_created.len());
    println!("kept_existing: {}", report.kept_existing.len());
    println!("duplicates: {}", report.duplicates.len());
}

fn print_rewrite(report: &RewriteReport) {
    println!("files_processed: {}", report.files_processed);
    println!("conversions: {}", report.conversions);
}

fn print_manifest_update(report: &ManifestUpdateReport) {
    println!("manifest.changed: {}", format_flag(report.changed));
    println!("manifest.written: {}", format_flag(report.written));
    if !report.diff.is_empty() {
        println!();
        print!("{}", report.diff);
    }
}

fn print_messages(messages: &MessageLog) {
    if messages.is_empty() {
        return;
    }
    println!("messages:");
    for message in messages.entries() {
        let marker = match message.level {
            MessageLevel::Info => "-",
            MessageLevel::Warning => "!",
        };
        println!("  {marker} {}", message.text);
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, MigrateOptions)> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    Ok((paths, MigrateOptions::from_config(&config)))
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
