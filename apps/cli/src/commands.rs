//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use neurograph_core::Orchestrator;
use neurograph_shared::{
    AppConfig, AuxiliaryMode, BuildRequest, GraphType, InputFile, JobId, MiningConfig,
    OrchestratorConfig, init_config, load_config,
};
use tracing::info;

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// NeuroGraph: tabular data → knowledge graph → mined patterns.
#[derive(Parser)]
#[command(
    name = "neurograph",
    version,
    about = "Build knowledge graphs, mine their patterns, and serve the results.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Flags that take precedence over the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct Overrides {
    /// AtomSpace Builder base URL.
    #[arg(long, env = "NEUROGRAPH_ATOMSPACE_URL", global = true)]
    pub atomspace_url: Option<String>,

    /// Neural Miner base URL.
    #[arg(long, env = "NEUROGRAPH_MINER_URL", global = true)]
    pub miner_url: Option<String>,

    /// Shared output volume written by the remote services.
    #[arg(long, env = "NEUROGRAPH_SHARED_ROOT", global = true)]
    pub shared_root: Option<String>,

    /// Local output directory for materialized results.
    #[arg(long, env = "NEUROGRAPH_LOCAL_ROOT", global = true)]
    pub local_root: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "NEUROGRAPH_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Auxiliary build handling: background, await, or disabled.
    #[arg(long, env = "NEUROGRAPH_AUXILIARY_MODE", global = true)]
    pub auxiliary_mode: Option<AuxiliaryMode>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve the pipeline HTTP API.
    Serve {
        /// Bind address (defaults to [server] host).
        #[arg(long)]
        host: Option<String>,

        /// Port (defaults to [server] port).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Build a graph from input tables; the auxiliary output is merged before exit.
    Build {
        /// Input file (repeatable).
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Builder configuration document (JSON file).
        #[arg(long)]
        config: PathBuf,

        /// Schema document (JSON file).
        #[arg(long)]
        schema: PathBuf,

        /// directed or undirected.
        #[arg(long, default_value = "directed")]
        graph_type: GraphType,

        /// Tenant id (defaults to [defaults] tenant_id).
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Mine patterns for a built job.
    Mine {
        /// Job id returned by `build`.
        #[arg(long)]
        job: JobId,

        /// Mining parameters as a JSON object; unknown keys are passed through.
        #[arg(long)]
        params: Option<String>,

        /// Override the orientation recorded in the job metadata.
        #[arg(long)]
        graph_type: Option<GraphType>,

        /// representative or instance.
        #[arg(long)]
        output_format: Option<String>,
    },

    /// Print the orientation recorded for a job.
    GraphType {
        #[arg(long)]
        job: JobId,
    },

    /// Print the local path of a result file.
    Fetch {
        #[arg(long)]
        job: JobId,

        /// Path relative to the job's local output directory.
        #[arg(long)]
        file: String,
    },

    /// Zip a job's local results.
    Archive {
        #[arg(long)]
        job: JobId,
    },

    /// Record a motif choice for a job.
    SelectMotif {
        #[arg(long)]
        job: JobId,

        #[arg(long)]
        index: u32,

        #[arg(long)]
        tenant: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "neurograph=info,neurograph_core=info,tower_http=info",
        1 => "neurograph=debug,neurograph_core=debug,neurograph_atomspace=debug,neurograph_miner=debug,tower_http=debug",
        _ => "neurograph=trace,neurograph_core=trace,neurograph_atomspace=trace,neurograph_miner=trace,neurograph_storage=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Flags > config file > defaults.
fn resolve_config(app: &AppConfig, overrides: &Overrides) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::from(app);
    if let Some(url) = &overrides.atomspace_url {
        config.atomspace_url = url.clone();
    }
    if let Some(url) = &overrides.miner_url {
        config.miner_url = url.clone();
    }
    if let Some(root) = &overrides.shared_root {
        config.shared_root = PathBuf::from(root);
    }
    if let Some(root) = &overrides.local_root {
        config.local_root = PathBuf::from(root);
    }
    if let Some(secs) = overrides.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(mode) = overrides.auxiliary_mode {
        config.auxiliary_mode = mode;
    }
    config
}

fn build_orchestrator(app: &AppConfig, overrides: &Overrides) -> Result<Orchestrator> {
    let config = resolve_config(app, overrides);
    Ok(Orchestrator::from_config(config)?)
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli {
        overrides, command, ..
    } = cli;

    match command {
        Command::Serve { host, port } => cmd_serve(&overrides, host, port).await,
        Command::Build {
            files,
            config,
            schema,
            graph_type,
            tenant,
        } => cmd_build(&overrides, &files, &config, &schema, graph_type, tenant).await,
        Command::Mine {
            job,
            params,
            graph_type,
            output_format,
        } => cmd_mine(&overrides, &job, params.as_deref(), graph_type, output_format).await,
        Command::GraphType { job } => cmd_graph_type(&overrides, &job),
        Command::Fetch { job, file } => cmd_fetch(&overrides, &job, &file),
        Command::Archive { job } => cmd_archive(&overrides, &job).await,
        Command::SelectMotif { job, index, tenant } => {
            cmd_select_motif(&overrides, &job, index, tenant)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&overrides).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(overrides: &Overrides, host: Option<String>, port: Option<u16>) -> Result<()> {
    let app = load_config()?;
    let orchestrator = Arc::new(build_orchestrator(&app, overrides)?);

    let host = host.unwrap_or_else(|| app.server.host.clone());
    let port = port.unwrap_or(app.server.port);
    let addr = format!("{host}:{port}");

    info!(
        addr = %addr,
        atomspace = %orchestrator.config().atomspace_url,
        miner = %orchestrator.config().miner_url,
        "starting pipeline API"
    );
    println!("NeuroGraph API listening on http://{addr}");

    server::serve(orchestrator, &addr).await
}

async fn cmd_build(
    overrides: &Overrides,
    files: &[PathBuf],
    config: &Path,
    schema: &Path,
    graph_type: GraphType,
    tenant: Option<String>,
) -> Result<()> {
    let app = load_config()?;
    let orchestrator = build_orchestrator(&app, overrides)?;

    let inputs = files
        .iter()
        .map(|path| InputFile::from_path(path))
        .collect::<neurograph_shared::Result<Vec<_>>>()?;
    let config_doc = std::fs::read_to_string(config)
        .map_err(|e| eyre!("cannot read config '{}': {e}", config.display()))?;
    let schema_doc = std::fs::read_to_string(schema)
        .map_err(|e| eyre!("cannot read schema '{}': {e}", schema.display()))?;

    let request = BuildRequest {
        files: inputs,
        config: config_doc,
        schema_json: schema_doc,
        graph_type,
        tenant_id: tenant.unwrap_or_else(|| orchestrator.config().default_tenant.clone()),
    };

    let spinner = spinner();
    spinner.set_message(format!("Building graph from {} file(s)", request.files.len()));
    let outcome = match orchestrator.generate_graph(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.finish_and_clear();
            orchestrator.runner().wait_idle().await;
            return Err(e.into());
        }
    };

    spinner.set_message("Merging auxiliary output");
    orchestrator.runner().wait_idle().await;
    spinner.finish_and_clear();

    println!();
    println!("  Graph built successfully!");
    println!("  Job:       {}", outcome.job_id);
    println!("  Artifact:  {}", outcome.networkx_file);
    println!("  Auxiliary: {}", serde_json::to_string(&outcome.auxiliary)?);
    println!();

    Ok(())
}

async fn cmd_mine(
    overrides: &Overrides,
    job: &JobId,
    params: Option<&str>,
    graph_type: Option<GraphType>,
    output_format: Option<String>,
) -> Result<()> {
    let app = load_config()?;
    let orchestrator = build_orchestrator(&app, overrides)?;

    let mut config: MiningConfig = match params {
        Some(raw) => serde_json::from_str(raw).map_err(|e| eyre!("invalid --params JSON: {e}"))?,
        None => MiningConfig::default(),
    };
    if graph_type.is_some() {
        config.graph_type = graph_type;
    }
    if let Some(format) = output_format {
        config.graph_output_format = format;
    }

    let spinner = spinner();
    spinner.set_message(format!("Mining patterns for {job}"));
    let outcome = orchestrator.mine_patterns(job, config).await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.is_success() {
        return Err(eyre!(
            "mining failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn cmd_graph_type(overrides: &Overrides, job: &JobId) -> Result<()> {
    let app = load_config()?;
    let graph_type = build_orchestrator(&app, overrides)?.resolve_graph_type(job)?;
    println!("{graph_type}");
    Ok(())
}

fn cmd_fetch(overrides: &Overrides, job: &JobId, file: &str) -> Result<()> {
    let app = load_config()?;
    let path = build_orchestrator(&app, overrides)?.resolve_file_path(job, file)?;
    println!("{}", path.display());
    Ok(())
}

async fn cmd_archive(overrides: &Overrides, job: &JobId) -> Result<()> {
    let app = load_config()?;
    let path = build_orchestrator(&app, overrides)?.archive(job).await?;
    println!("Archive written to: {}", path.display());
    Ok(())
}

fn cmd_select_motif(overrides: &Overrides, job: &JobId, index: u32, tenant: Option<String>) -> Result<()> {
    let app = load_config()?;
    let ack = build_orchestrator(&app, overrides)?.select_motif(job, index, tenant);
    println!("{}", serde_json::to_string_pretty(&ack)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(overrides: &Overrides) -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");

    let resolved = resolve_config(&config, overrides);
    println!("# effective");
    println!("# atomspace_url = {:?}", resolved.atomspace_url);
    println!("# miner_url = {:?}", resolved.miner_url);
    println!("# shared_root = {:?}", resolved.shared_root.display().to_string());
    println!("# local_root = {:?}", resolved.local_root.display().to_string());
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
