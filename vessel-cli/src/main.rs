//! vessel - load and watch extensions from the command line
//!
//! # Usage
//!
//! ```bash
//! # Load an extension directory once and print what it published
//! vessel load ./my-extension
//!
//! # Machine-readable output
//! vessel load ./my-extension --json
//!
//! # Keep the extension loaded and apply file changes as they happen
//! vessel watch ./my-extension --global
//! ```

mod tracing_support;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use tracing_support::{TracingConfig, TracingFormat};
use vessel_host::{
    Activation, Contribution, ContributionRegistry, ExtensionId, ExtensionRuntime,
    ExtensionWatcher, HostServices, MemoryStyleSink, NativeFs, RecordingErrorSink, ReloadSummary,
    VesselConfig,
};

#[derive(Parser)]
#[command(name = "vessel", version)]
#[command(about = "Load sandboxed script and component extensions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: the user config directory)
    #[arg(long, global = true, env = "VESSEL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = TracingFormat::Pretty)]
    log_format: TracingFormat,

    /// Log level; overrides RUST_LOG
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<tracing::Level>,
}

#[derive(Subcommand)]
enum Command {
    /// Load an extension once and report the result
    Load(ExtensionArgs),

    /// Load an extension and reload it whenever its files change
    Watch(ExtensionArgs),
}

#[derive(Args)]
struct ExtensionArgs {
    /// Extension root directory
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Extension id (default: the directory name)
    #[arg(long)]
    id: Option<String>,

    /// Load with access to global contributions
    #[arg(long)]
    global: bool,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_support::init_subscriber(TracingConfig {
        level: cli.log_level,
        format: cli.log_format,
        ..Default::default()
    });

    // Extension state is single-threaded; everything runs on this thread
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = VesselConfig::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Command::Load(args) => load(config, args).await,
        Command::Watch(args) => watch(config, args).await,
    }
}

/// Host services whose output the CLI prints
struct Host {
    errors: RecordingErrorSink,
    styles: MemoryStyleSink,
    registry: ContributionRegistry,
    runtime: ExtensionRuntime,
}

impl Host {
    fn new(config: VesselConfig) -> Self {
        let errors = RecordingErrorSink::new();
        let styles = MemoryStyleSink::new();
        let registry = ContributionRegistry::new();
        let services = HostServices::new(
            Rc::new(errors.clone()),
            Rc::new(styles.clone()),
            registry.clone(),
        );
        Self {
            runtime: ExtensionRuntime::with_services(config, services),
            errors,
            styles,
            registry,
        }
    }

    async fn activate(&self, args: &ExtensionArgs) -> anyhow::Result<Activation> {
        let id = extension_id(args)?;
        let fs = NativeFs::new(&args.dir);
        self.runtime
            .activate(id, Rc::new(fs), args.global)
            .await
            .with_context(|| format!("Failed to activate {}", args.dir.display()))
    }
}

fn extension_id(args: &ExtensionArgs) -> anyhow::Result<ExtensionId> {
    if let Some(id) = &args.id {
        return Ok(ExtensionId::new(id.as_str()));
    }
    let dir = std::fs::canonicalize(&args.dir)
        .with_context(|| format!("Extension directory not found: {}", args.dir.display()))?;
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .context("Cannot derive an extension id from the directory; pass --id")?;
    Ok(ExtensionId::new(name))
}

#[derive(Debug, Serialize)]
struct ExtensionReport {
    extension: String,
    components: Vec<ComponentReport>,
    scripts: ScriptsReport,
    contributions: Vec<Contribution>,
    styles: usize,
    errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ComponentReport {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    bindings: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct ScriptsReport {
    executed: Vec<String>,
    failed: Vec<String>,
}

async fn report(host: &Host, activation: &Activation) -> ExtensionReport {
    let mut components = Vec::new();
    for key in activation.ui_store().keys() {
        let Some(result) = activation.ui_store().resolve(&key).await else {
            continue;
        };
        components.push(match result {
            Ok(definition) => ComponentReport {
                key: key.to_string(),
                path: Some(definition.path.clone()),
                error: None,
                bindings: definition
                    .render
                    .interpolations()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
            Err(err) => ComponentReport {
                key: key.to_string(),
                path: err.path().map(str::to_string),
                error: Some(err.to_string()),
                bindings: Vec::new(),
            },
        });
    }

    ExtensionReport {
        extension: activation.extension_id().to_string(),
        components,
        scripts: ScriptsReport {
            executed: activation.scripts().executed.clone(),
            failed: activation
                .scripts()
                .failures
                .iter()
                .map(|(path, _)| path.clone())
                .collect(),
        },
        contributions: host.registry.snapshot(),
        styles: host.styles.len(),
        errors: host.errors.messages(),
    }
}

fn print_report(report: &ExtensionReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Extension: {}", report.extension);
    println!();
    println!("Components ({}):", report.components.len());
    for component in &report.components {
        match &component.error {
            Some(error) => println!("  {:<24} FAILED  {}", component.key, error),
            None => {
                let path = component.path.as_deref().unwrap_or("-");
                println!("  {:<24} {}", component.key, path);
                if !component.bindings.is_empty() {
                    println!("      bindings: {}", component.bindings.join(", "));
                }
            }
        }
    }
    println!();
    println!(
        "Scripts: {} executed, {} failed",
        report.scripts.executed.len(),
        report.scripts.failed.len()
    );
    for path in &report.scripts.executed {
        println!("  {path}");
    }
    for path in &report.scripts.failed {
        println!("  {path} (failed)");
    }
    if !report.contributions.is_empty() {
        println!();
        println!("Contributions:");
        for contribution in &report.contributions {
            println!(
                "  [{}] {} {} = {}",
                contribution.scope, contribution.kind, contribution.name, contribution.value
            );
        }
    }
    println!();
    println!("Stylesheets: {}", report.styles);
    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  {error}");
        }
    }
    Ok(())
}

async fn load(config: VesselConfig, args: ExtensionArgs) -> anyhow::Result<ExitCode> {
    let host = Host::new(config);
    let activation = host.activate(&args).await?;
    let report = report(&host, &activation).await;
    print_report(&report, args.json)?;

    let failed = !report.errors.is_empty();
    activation.deactivate();
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn watch(config: VesselConfig, args: ExtensionArgs) -> anyhow::Result<ExitCode> {
    let mut watcher = ExtensionWatcher::new(&args.dir, &config.watch)?;
    let host = Host::new(config);
    let activation = host.activate(&args).await?;
    print_report(&report(&host, &activation).await, args.json)?;
    println!();
    println!("Watching {} (Ctrl-C to stop)", watcher.root().display());

    loop {
        tokio::select! {
            batch = watcher.next_batch() => {
                let Some(paths) = batch else { break };
                host.errors.clear();
                match activation.reload(&paths).await {
                    Ok(summary) => print_reload(&summary, &host.errors.messages()),
                    Err(e) => eprintln!("Error: Reload failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    watcher.shutdown().await;
    let disposed = activation.deactivate();
    println!("Stopped; released {disposed} resources");
    Ok(ExitCode::SUCCESS)
}

fn print_reload(summary: &ReloadSummary, errors: &[String]) {
    if summary.is_empty() && errors.is_empty() {
        return;
    }
    for path in &summary.components {
        println!("reloaded  {path}");
    }
    for key in &summary.removed {
        println!("removed   {key}");
    }
    for path in &summary.scripts.executed {
        println!("ran       {path}");
    }
    for (path, _) in &summary.scripts.failures {
        println!("failed    {path}");
    }
    for error in errors {
        eprintln!("error     {error}");
    }
}
