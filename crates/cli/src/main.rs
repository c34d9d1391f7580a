//! Edge node operator CLI
//!
//! Triggers cleaning missions, inspects node health and runs the fleet
//! analytics and scaling logic locally.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{fleet, mission, node};
use edge_lib::models::MissionReason;

/// Edge node operator CLI
#[derive(Parser)]
#[command(name = "edgectl")]
#[command(author, version, about = "CLI for the Edge Soiling Orchestrator", long_about = None)]
pub struct Cli {
    /// Edge node API URL (falls back to ~/.config/edgectl/config.json)
    #[arg(long, env = "EDGECTL_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the mission trigger
    #[arg(long, env = "EDGECTL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cleaning mission commands
    #[command(subcommand)]
    Mission(MissionCommands),

    /// Show node health and readiness
    Health,

    /// Recommend a replica count for a composite metric
    Scale {
        /// Composite metric (sum of per-device average soiling)
        #[arg(long)]
        metric: f64,

        /// Scaling threshold in the same units as the metric
        #[arg(long, default_value_t = edge_lib::scaling::DEFAULT_SCALING_THRESHOLD)]
        threshold: f64,
    },

    /// Run fleet analytics locally over simulated device batches
    Analyze {
        /// Number of simulated devices
        #[arg(long, default_value_t = 4)]
        devices: usize,

        /// Readings per device
        #[arg(long, default_value_t = 12)]
        batch_size: usize,

        /// Concurrent analysis workers
        #[arg(long, default_value_t = edge_lib::analytics::DEFAULT_WORKERS)]
        workers: usize,

        /// Dust risk in [0, 1] to analyze against (no forecast if omitted)
        #[arg(long)]
        risk: Option<f64>,

        /// Scaling threshold for the recommendation
        #[arg(long, default_value_t = edge_lib::scaling::DEFAULT_SCALING_THRESHOLD)]
        threshold: f64,
    },
}

#[derive(Subcommand)]
pub enum MissionCommands {
    /// Run one cleaning mission now
    Start {
        /// Reason recorded with the mission
        #[arg(long, value_enum, default_value = "manual")]
        reason: ReasonArg,
    },

    /// Show the current mission state
    State,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReasonArg {
    Manual,
    Soiling,
    Predictive,
}

impl From<ReasonArg> for MissionReason {
    fn from(reason: ReasonArg) -> Self {
        match reason {
            ReasonArg::Manual => MissionReason::Manual,
            ReasonArg::Soiling => MissionReason::Soiling,
            ReasonArg::Predictive => MissionReason::Predictive,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.format;

    match cli.command {
        Commands::Scale { metric, threshold } => fleet::scale(metric, threshold, format),
        Commands::Analyze {
            devices,
            batch_size,
            workers,
            risk,
            threshold,
        } => {
            if let Some(risk) = risk {
                if !(0.0..=1.0).contains(&risk) {
                    anyhow::bail!("Risk must be within [0, 1]");
                }
            }
            let options = fleet::AnalyzeOptions {
                devices,
                batch_size,
                workers: workers.max(1),
                risk,
                scaling_threshold: threshold,
            };
            fleet::analyze(options, format).await
        }
        Commands::Mission(command) => {
            let client = connect(cli.api_url, cli.token)?;
            match command {
                MissionCommands::Start { reason } => {
                    mission::start(&client, reason.into(), format).await
                }
                MissionCommands::State => mission::state(&client, format).await,
            }
        }
        Commands::Health => {
            let client = connect(cli.api_url, cli.token)?;
            node::health(&client, format).await
        }
    }
}

fn connect(api_url: Option<String>, token: Option<String>) -> Result<client::ApiClient> {
    let config = config::Config::load()?;
    client::ApiClient::new(
        &config.resolve_api_url(api_url),
        config.resolve_token(token),
    )
}
