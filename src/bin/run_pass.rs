use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tracing::{info, warn};

use release_watchbot::config;
use release_watchbot::db::SqliteStore;
use release_watchbot::github::GitHubClient;
use release_watchbot::reconcile::Reconciler;
use release_watchbot::transport::TelegramTransport;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one release reconciliation pass over every watched repo and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the pass report as JSON instead of a summary line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let store = SqliteStore::connect(&cfg.database_url())
        .await
        .context("failed to open watch-list database")?;
    let api_url = reqwest::Url::parse(&cfg.github.api_url).context("invalid github.api_url")?;
    let lookup = GitHubClient::with_endpoint(cfg.github.token.clone(), api_url)?;
    let transport = TelegramTransport::new(Bot::new(cfg.telegram.bot_token.clone()));

    let reconciler = Reconciler::new(
        Arc::new(store),
        Arc::new(lookup),
        Arc::new(transport),
        cfg.app.pass_concurrency,
    );

    info!("starting reconciliation pass");
    let Some(report) = reconciler.try_run_pass().await else {
        bail!("a pass is already running");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "checked={} updated={} notified={} pruned={} failed={}",
            report.checked,
            report.updated,
            report.notified,
            report.pruned,
            report.failures.len()
        );
        for failure in &report.failures {
            warn!(
                chat_id = failure.chat_id.as_deref().unwrap_or("-"),
                repo = failure.repo.as_deref().unwrap_or("-"),
                error = %failure.error,
                "entry failed"
            );
        }
    }

    if report.aborted {
        bail!("pass aborted: watch-list could not be loaded");
    }
    Ok(())
}
