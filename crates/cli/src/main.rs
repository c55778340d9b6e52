use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use kubepattern_analysis::{
    build_snapshot, AnalysisConfig, AnalysisRunner, DefinitionSource, DirectoryDefinitionSource,
    FileMatchSink, GitHubRegistrySource, RunLock, RunQueue, RunRequest, RunTarget, SnapshotSource,
};
use kubepattern_engine::lint_result;
use kubepattern_graph::{RelationshipDiscovery, DEFAULT_CLUSTER_NAME};
use kubepattern_protocol::pattern_document_schema;
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod http_api;

#[derive(Parser)]
#[command(name = "kubepattern")]
#[command(about = "Detect architectural patterns in Kubernetes clusters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pattern definition file
    Lint(LintArgs),

    /// Analyze a cluster snapshot and write match records
    Analyze(AnalyzeArgs),

    /// Print the discovered resource graph of a snapshot
    Graph(GraphArgs),

    /// Print the JSON schema of pattern definitions
    Schema,

    /// Serve the analysis API over HTTP
    #[command(name = "serve-http")]
    ServeHttp(ServeArgs),
}

#[derive(Args)]
struct LintArgs {
    /// Pattern definition file, `-` reads stdin
    file: PathBuf,
}

#[derive(Args, Clone)]
struct ClusterArgs {
    /// Cluster snapshot: a `kubectl get -o json` List or a JSON array of objects
    #[arg(long)]
    snapshot: PathBuf,

    /// TOML configuration file (defaults to $KUBEPATTERN_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name reported for the analyzed cluster
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    cluster_name: String,
}

#[derive(Args, Clone)]
#[group(required = true, multiple = false)]
struct DefinitionArgs {
    /// Directory of pattern definition files
    #[arg(long)]
    patterns: Option<PathBuf>,

    /// Fetch definitions from the configured GitHub registry
    #[arg(long)]
    registry: bool,
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(flatten)]
    definitions: DefinitionArgs,

    /// Analyze a single namespace instead of the whole cluster
    #[arg(long)]
    namespace: Option<String>,

    /// Evaluate only this pattern definition
    #[arg(long)]
    pattern: Option<String>,

    /// Directory receiving match records (overrides $KUBEPATTERN_OUTPUT_DIR)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct GraphArgs {
    #[command(flatten)]
    cluster: ClusterArgs,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(flatten)]
    definitions: DefinitionArgs,

    /// Directory receiving match records (overrides $KUBEPATTERN_OUTPUT_DIR)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries JSON for everything but the server
    let json_output = !matches!(cli.command, Commands::ServeHttp(_));

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet || (json_output && !cli.verbose) {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Lint(args) => run_lint(args)?,
        Commands::Analyze(args) => run_analyze(args).await?,
        Commands::Graph(args) => run_graph(args).await?,
        Commands::Schema => print_json(&pattern_document_schema()?)?,
        Commands::ServeHttp(args) => serve_http(args).await?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read definition from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn run_lint(args: LintArgs) -> Result<()> {
    let text = read_input(&args.file)?;
    let result = lint_result(&text);
    print_json(&result)?;
    if !result.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(path: Option<&Path>, output: Option<&Path>) -> Result<AnalysisConfig> {
    let mut config = AnalysisConfig::load(path).context("Failed to load configuration")?;
    if let Some(output) = output {
        config.report.output_dir = output.to_path_buf();
    }
    Ok(config)
}

fn load_snapshot(path: &Path) -> Result<SnapshotSource> {
    SnapshotSource::from_path(path)
        .with_context(|| format!("Failed to load snapshot {}", path.display()))
}

fn definition_source(
    args: &DefinitionArgs,
    config: &AnalysisConfig,
) -> Result<Arc<dyn DefinitionSource>> {
    if let Some(dir) = &args.patterns {
        return Ok(Arc::new(DirectoryDefinitionSource::new(dir)));
    }
    if args.registry {
        let registry = GitHubRegistrySource::new(config.registry.clone(), config.fetch_timeout())
            .context("Failed to create registry client")?;
        return Ok(Arc::new(registry));
    }
    bail!("either --patterns <dir> or --registry is required")
}

fn build_runner(
    cluster: &ClusterArgs,
    definitions: &DefinitionArgs,
    config: AnalysisConfig,
) -> Result<AnalysisRunner> {
    let resources = Arc::new(load_snapshot(&cluster.snapshot)?);
    let definitions = definition_source(definitions, &config)?;
    let sink = Arc::new(FileMatchSink::new(config.report.output_dir.clone()));
    Ok(AnalysisRunner::new(config, resources, definitions, sink)
        .with_cluster_name(cluster.cluster_name.clone()))
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = load_config(args.cluster.config.as_deref(), args.output.as_deref())?;
    let lock = RunLock::with_output_dir(&config.report.output_dir);
    let runner = build_runner(&args.cluster, &args.definitions, config)?;

    let request = RunRequest {
        target: match args.namespace {
            Some(ns) => RunTarget::Namespace(ns),
            None => RunTarget::Cluster,
        },
        pattern: args.pattern,
    };

    let _guard = lock.acquire(&request.target).await?;
    let report = runner.run(&request).await?;
    print_json(&report)
}

async fn run_graph(args: GraphArgs) -> Result<()> {
    let config = load_config(args.cluster.config.as_deref(), None)?;
    let source = load_snapshot(&args.cluster.snapshot)?;
    let snapshot = build_snapshot(
        &config,
        &source,
        &RelationshipDiscovery::default(),
        &args.cluster.cluster_name,
        &RunTarget::Cluster,
    )
    .await?;
    print_json(&snapshot.graph.export())
}

async fn serve_http(args: ServeArgs) -> Result<()> {
    let config = load_config(args.cluster.config.as_deref(), args.output.as_deref())?;
    let lock = RunLock::with_output_dir(&config.report.output_dir);
    let runner = Arc::new(build_runner(&args.cluster, &args.definitions, config)?);
    let queue = RunQueue::start(runner.clone(), lock);

    let app = http_api::router(http_api::AppState { queue, runner });
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    println!("Serving KubePattern API on http://{}", args.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
