//! jobarch - Command-line interface for querying an HPC job archive

use anyhow::Result;
use clap::{Parser, Subcommand};
use jobarch_core::{Aggregate, ArchiveConfig, Identity, LogFormat, ObservabilityConfig, Role};
use jobarch_query::RequestContext;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod archive;
mod commands;
mod config;
mod output;

use commands::analysis::{CountArgs, HeatmapArgs};
use commands::generate::GenerateArgs;
use commands::jobs::ListJobsArgs;
use commands::{FilterArgs, Session};
use config::CliConfig;
use output::{OutputFormat, OutputFormatter};

/// Command-line interface for querying an HPC job archive
#[derive(Debug, Parser)]
#[command(name = "jobarch")]
#[command(about = "Query and analyse an HPC job archive")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Archive directory containing jobs.json, clusters.json and metrics.json
    /// (overrides the archive section of the configuration)
    #[arg(short, long, value_name = "DIR")]
    archive: Option<PathBuf>,

    /// Output format (defaults to output.format from the configuration)
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON output (overrides --output)
    #[arg(long)]
    json: bool,

    /// Username to query as
    #[arg(short, long, env = "JOBARCH_USER")]
    user: Option<String>,

    /// Roles of the user (comma-separated: admin, support, manager, user, api)
    #[arg(short, long, value_delimiter = ',')]
    role: Vec<Role>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List jobs matching a filter
    Jobs(ListJobsArgs),

    /// Show job details
    Job {
        /// Database id of the job
        id: i64,
    },

    /// Show metric values of a job
    Metrics {
        /// Database id of the job
        id: i64,

        /// Metric names (comma-separated; all metrics of the cluster if omitted)
        #[arg(short, long, value_delimiter = ',')]
        metrics: Vec<String>,
    },

    /// Aggregate job statistics
    Stats {
        #[command(flatten)]
        filter: FilterArgs,

        /// One record per user, project or cluster
        #[arg(long)]
        group_by: Option<Aggregate>,
    },

    /// Count jobs per user, project or cluster
    Count(CountArgs),

    /// Per-job metric footprints with node-hours
    Footprints {
        #[command(flatten)]
        filter: FilterArgs,

        /// Metric names (comma-separated; requires a single --cluster if omitted)
        #[arg(short, long, value_delimiter = ',')]
        metrics: Vec<String>,
    },

    /// Roofline heatmap of the filtered jobs
    Heatmap(HeatmapArgs),

    /// Hosts used by running jobs, per subcluster
    #[command(name = "allocated-nodes")]
    AllocatedNodes {
        /// Cluster name
        cluster: String,
    },

    /// List clusters
    Clusters,

    /// List tags
    Tags,

    /// List partitions of a cluster
    Partitions {
        /// Cluster name
        cluster: String,
    },

    /// Number of nodes of a subcluster
    Nodes {
        /// Cluster name
        cluster: String,

        /// Subcluster name
        sub_cluster: String,
    },

    /// Write a synthetic archive
    Generate(GenerateArgs),

    /// Show the effective configuration
    Config,
}

impl Cli {
    fn identity(&self) -> Identity {
        match &self.user {
            Some(user) => self
                .role
                .iter()
                .fold(Identity::user(user.clone()), |identity, role| identity.with_role(*role)),
            None => Identity::anonymous(),
        }
    }

    fn output_format(&self, config: &CliConfig) -> Result<OutputFormat> {
        if self.json {
            return Ok(OutputFormat::Json);
        }
        match self.output {
            Some(format) => Ok(format),
            None => config.output_format(),
        }
    }
}

fn archive_in_dir(dir: &Path) -> ArchiveConfig {
    let metrics = dir.join("metrics.json");
    ArchiveConfig {
        jobs_file: dir.join("jobs.json"),
        clusters_file: dir.join("clusters.json"),
        metrics_file: metrics.exists().then_some(metrics),
    }
}

fn init_logging(observability: &ObservabilityConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        observability.log_level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "jobarch={level},jobarch_cli={level},jobarch_query={level},jobarch_core={level}",
            level = level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match observability.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    init_logging(&config.observability, cli.verbose);
    debug!("Starting jobarch CLI with config: {:?}", cli);
    info!("Loaded configuration from {:?}", config.source());

    if let Some(dir) = &cli.archive {
        config.archive = archive_in_dir(dir);
    }
    let formatter = OutputFormatter::new(cli.output_format(&config)?);

    // Commands that do not read the archive
    match &cli.command {
        Commands::Generate(args) => {
            return commands::generate::generate_archive(args.clone(), &formatter);
        }
        Commands::Config => return formatter.print_value(&config),
        _ => {}
    }

    let engine = archive::open_engine(&config.archive, config.engine.clone())?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling query");
            on_interrupt.cancel();
        }
    });

    let identity = cli.identity();
    debug!(user = ?identity.username, roles = ?identity.roles, "Resolved identity");
    let session = Session {
        engine,
        ctx: RequestContext::new(identity).with_cancellation(cancel),
        formatter,
    };

    match cli.command {
        Commands::Jobs(args) => {
            commands::jobs::list_jobs(&session, args, config.output.items_per_page).await?;
        }

        Commands::Job { id } => {
            commands::jobs::describe_job(&session, id).await?;
        }

        Commands::Metrics { id, metrics } => {
            commands::jobs::job_metrics(&session, id, metrics).await?;
        }

        Commands::Stats { filter, group_by } => {
            commands::analysis::show_stats(&session, filter, group_by).await?;
        }

        Commands::Count(args) => {
            commands::analysis::count_jobs(&session, args).await?;
        }

        Commands::Footprints { filter, metrics } => {
            commands::analysis::show_footprints(&session, filter, metrics).await?;
        }

        Commands::Heatmap(args) => {
            commands::analysis::show_heatmap(&session, args).await?;
        }

        Commands::AllocatedNodes { cluster } => {
            commands::metadata::allocated_nodes(&session, cluster).await?;
        }

        Commands::Clusters => commands::metadata::list_clusters(&session).await?,

        Commands::Tags => commands::metadata::list_tags(&session).await?,

        Commands::Partitions { cluster } => {
            commands::metadata::list_partitions(&session, cluster).await?;
        }

        Commands::Nodes {
            cluster,
            sub_cluster,
        } => {
            commands::metadata::number_of_nodes(&session, cluster, sub_cluster).await?;
        }

        Commands::Generate(_) | Commands::Config => {}
    }

    Ok(())
}
