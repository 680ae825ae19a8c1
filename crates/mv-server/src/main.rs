//! `migration-validator` binary: HTTP service and one-shot CLI runs

use anyhow::Context;
use clap::{Parser, Subcommand};
use mv_core::{calculate_score, StageKind};
use mv_server::{logging, routes, AppState, ValidatorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "migration-validator", version, about = "Stage-gated V1 -> V2 migration validation")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, env = "MV_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Reports directory
    #[arg(long, env = "MV_REPORTS_DIR", global = true)]
    reports_dir: Option<PathBuf>,

    /// Bearer token for the V2 API
    #[arg(long, env = "MV_TARGET_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Listen address
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run one stage, or `all`, in the foreground and print the outcome
    Run {
        /// Stage kind or `all`
        #[arg(default_value = "all")]
        stage: String,
    },
    /// Print the migration score from stored reports
    Score,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ValidatorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ValidatorConfig::default(),
    };
    if let Some(dir) = cli.reports_dir {
        config = config.with_reports_dir(dir);
    }
    config = config.with_token(cli.token);

    logging::init(&config.logging)?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config = config.with_bind(bind);
            }
            serve(config).await
        }
        Command::Run { stage } => run(&config, &stage).await,
        Command::Score => score(&config).await,
    }
}

async fn serve(config: ValidatorConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config).await?;
    let (addr, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(config.server.bind, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .with_context(|| format!("binding {}", config.server.bind))?;

    tracing::info!(%addr, "migration validator listening");
    server.await;
    tracing::info!("shut down");
    Ok(())
}

async fn run(config: &ValidatorConfig, stage: &str) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let runner = state.runner();

    let success = if stage == "all" {
        let outcome = runner.execute_pipeline().await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        outcome.stages.iter().all(|s| s.record.is_satisfied())
    } else {
        let kind: StageKind = stage.parse()?;
        let id = runner
            .registry()
            .stage_for_kind(kind)
            .with_context(|| format!("no stage registered for {kind}"))?
            .id
            .clone();
        let outcome = runner.execute_stage(id.as_str()).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        outcome.record.is_satisfied()
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn score(config: &ValidatorConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let latest = state.store().load_all_latest().await?;
    let inputs = state.score_inputs(&latest);
    let score = calculate_score(&inputs);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "score": score, "inputs": inputs }))?
    );
    Ok(())
}
