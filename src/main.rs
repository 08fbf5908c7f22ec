use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use proto_sync::{
    BufYamlReader, CancelFlag, FileSystem, GoModuleFetcher, LocalFileSystem, Settings, Source,
    SyncConfig, SyncEngine, SyncSummary, TracingNotifier,
};

#[derive(Parser)]
#[command(name = "proto-sync")]
#[command(about = "Download proto files from Go modules and copy them into a buf module")]
#[command(
    long_about = "Proto Sync detects protobuf libraries from the '// Protobuf libraries' section \
of go.mod (or takes a repository from --repo), downloads the requested versions and copies \
their proto files into the first module declared in buf.yaml."
)]
#[command(disable_version_flag = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    args: SyncArgs,

    /// Settings file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug, Default)]
struct SyncArgs {
    /// Version to download for every repository (default: from go.mod)
    #[arg(short = 'v', long = "version", value_name = "VERSION")]
    override_version: Option<String>,

    /// Repository name (default: auto-detect from go.mod)
    #[arg(short, long, env = "REPO_NAME", global = true)]
    repo: Option<String>,

    /// Source path in repository [default: schemas/api/v1]
    #[arg(short, long, env = "SOURCE_PATH_IN_REPO", value_name = "PATH", global = true)]
    source: Option<String>,

    /// Path to buf.yaml file [default: buf.yaml]
    #[arg(short, long, env = "BUF_YAML_PATH", value_name = "PATH", global = true)]
    buf_yaml: Option<String>,

    /// Path to go.mod file [default: ../go.mod]
    #[arg(short, long, env = "GO_MOD_PATH", value_name = "PATH", global = true)]
    go_mod: Option<String>,

    /// Download only this proto file
    #[arg(short = 'f', long, env = "PROTO_FILE_NAME", value_name = "FILE")]
    proto_file: Option<String>,

    /// Show what would be done without executing
    #[arg(short, long)]
    dry_run: bool,

    /// Process only the first repository found
    #[arg(long)]
    single_repo: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available versions for all repositories
    ListVersions {
        /// Print the versions as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref())?;
    init_logging(cli.verbose, &settings.logging.level)?;
    debug!("Starting proto-sync v{}", env!("CARGO_PKG_VERSION"));

    let engine = build_engine(&settings)?;
    let config = sync_config(&cli.args, &settings);

    match cli.command {
        None => cmd_sync(&engine, config).await,
        Some(Commands::ListVersions { json }) => cmd_list_versions(&engine, config, json).await,
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load settings from the specified path or the default location
fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    match config_path {
        Some(path) => Settings::load(path),
        None => Settings::load_or_default(),
    }
}

fn build_engine(settings: &Settings) -> Result<SyncEngine> {
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
    let fetcher =
        GoModuleFetcher::new(&settings.fetcher).context("Failed to create module fetcher")?;

    Ok(SyncEngine::new(
        fs.clone(),
        Arc::new(fetcher),
        Arc::new(BufYamlReader::new(fs)),
        Arc::new(TracingNotifier),
    ))
}

/// Merge flags and env vars over the settings file defaults
fn sync_config(args: &SyncArgs, settings: &Settings) -> SyncConfig {
    let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

    SyncConfig {
        sources: non_empty(&args.repo)
            .map(|repo| vec![Source::new(repo, "")])
            .unwrap_or_default(),
        source_path: PathBuf::from(
            non_empty(&args.source).unwrap_or_else(|| settings.defaults.source_path.clone()),
        ),
        target_path: PathBuf::new(),
        manifest_path: PathBuf::from(
            non_empty(&args.go_mod).unwrap_or_else(|| settings.defaults.go_mod.clone()),
        ),
        buf_yaml_path: PathBuf::from(
            non_empty(&args.buf_yaml).unwrap_or_else(|| settings.defaults.buf_yaml.clone()),
        ),
        specific_file: non_empty(&args.proto_file),
        dry_run: args.dry_run,
        single_source: args.single_repo,
        override_version: non_empty(&args.override_version),
    }
}

/// Raise `cancel` on Ctrl+C or SIGTERM
fn spawn_shutdown_listener(cancel: CancelFlag) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        warn!("Shutdown signal received, stopping after the current repository...");
        cancel.cancel();
    });
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => debug!("Ctrl+C received"),
                    _ = terminate.recv() => debug!("SIGTERM received"),
                }
            }
            Err(e) => {
                debug!("Failed to listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        debug!("Ctrl+C received");
    }
}

/// Sync proto files according to the merged configuration
async fn cmd_sync(engine: &SyncEngine, mut config: SyncConfig) -> Result<()> {
    let cancel = CancelFlag::new();
    spawn_shutdown_listener(cancel.clone());

    let outcomes = match engine.sync(&mut config, &cancel).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            let phase = e.phase();
            return Err(anyhow::Error::new(e).context(format!("Sync failed while {}", phase)));
        }
    };

    if config.dry_run {
        for outcome in &outcomes {
            if let Some(preview) = &outcome.preview {
                println!("\n📦 {}", outcome.source);
                print!("{}", preview);
            }
        }

        let failing = outcomes
            .iter()
            .filter_map(|o| o.preview.as_ref())
            .filter(|p| p.would_fail())
            .count();
        if failing > 0 {
            println!(
                "\n⚠️  {} repository(ies) would fail in a real run",
                failing
            );
        }
        return Ok(());
    }

    let summary = SyncSummary::from_outcomes(&outcomes);
    println!(
        "Sync completed: {}/{} repositories processed successfully",
        summary.succeeded, summary.total
    );

    if summary.failed > 0 {
        println!("\n🔍 Failed repositories:");
        for outcome in outcomes.iter().filter(|o| !o.success) {
            if let Some(failure) = &outcome.failure {
                println!("   ❌ {}: {}", outcome.source, failure);
            }
        }
        bail!("{} repository(ies) failed to sync", summary.failed);
    }

    if cancel.is_cancelled() {
        bail!("Sync cancelled");
    }

    Ok(())
}

/// List available versions for the configured or detected repositories
async fn cmd_list_versions(engine: &SyncEngine, config: SyncConfig, json: bool) -> Result<()> {
    let sources = if config.sources.is_empty() {
        engine
            .validate_config(&config)
            .context("Invalid configuration")?;
        engine.discover_sources(&config.manifest_path)?
    } else {
        config.sources.clone()
    };

    if sources.is_empty() {
        info!("No repositories to list");
        return Ok(());
    }

    let versions = engine.list_versions(&sources).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    for (identifier, list) in &versions {
        println!("--- Versions for {} ---", identifier);
        for version in list {
            println!("{}", version);
        }
        println!();
    }

    if versions.is_empty() {
        bail!("Failed to list versions for every repository");
    }

    Ok(())
}
