use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::{HandlerExt, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use release_watchbot::config;
use release_watchbot::db::{SqliteStore, WatchStore};
use release_watchbot::github::{GitHubClient, ReleaseLookup};
use release_watchbot::handlers::Controller;
use release_watchbot::reconcile::{pass_interval, Reconciler};
use release_watchbot::server::{self, AppState};
use release_watchbot::transport::{ChatTransport, TelegramTransport};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "show the main menu")]
    Start,
    #[command(description = "what this bot does")]
    About,
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

    let store: Arc<dyn WatchStore> = Arc::new(
        SqliteStore::connect(&cfg.database_url())
            .await
            .context("failed to open watch-list database")?,
    );
    let api_url = reqwest::Url::parse(&cfg.github.api_url).context("invalid github.api_url")?;
    let lookup: Arc<dyn ReleaseLookup> =
        Arc::new(GitHubClient::with_endpoint(cfg.github.token.clone(), api_url)?);

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(bot.clone()));

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        lookup.clone(),
        transport.clone(),
        cfg.app.pass_concurrency,
    ));
    let controller = Arc::new(Controller::new(
        store.clone(),
        lookup,
        transport,
        cfg.app.page_size,
    ));

    // Trigger endpoint
    let state = AppState::new(reconciler.clone(), store, &cfg.server.trigger_token);
    let bind = cfg.server.bind.clone();
    tokio::spawn(async move {
        if let Err(err) = server::serve(&bind, state).await {
            error!(?err, "trigger endpoint stopped");
        }
    });

    if cfg.app.check_interval_secs > 0 {
        let period = Duration::from_secs(cfg.app.check_interval_secs);
        let timer_reconciler = reconciler.clone();
        tokio::spawn(async move {
            let mut ticker = pass_interval(period);
            loop {
                ticker.tick().await;
                if timer_reconciler.try_run_pass().await.is_none() {
                    warn!("timer tick skipped; previous pass still running");
                }
            }
        });
    }

    let for_callbacks = controller.clone();
    let for_commands = controller.clone();
    let for_text = controller;

    let handler = dptree::entry()
        .branch(
            Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                let controller = Arc::clone(&for_callbacks);
                async move { on_callback(bot, q, controller).await }
            }),
        )
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(move |msg: Message, cmd: Command| {
                    let controller = Arc::clone(&for_commands);
                    async move { on_command(msg, cmd, controller).await }
                }),
        )
        .branch(Update::filter_message().endpoint(move |msg: Message| {
            let controller = Arc::clone(&for_text);
            async move { on_text(msg, controller).await }
        }));

    info!("starting telegram bot");
    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn on_command(msg: Message, cmd: Command, controller: Arc<Controller>) -> Result<()> {
    let chat_id = msg.chat.id.to_string();
    let res = match cmd {
        Command::Start => controller.handle_start(&chat_id).await,
        Command::About => controller.handle_about(&chat_id).await,
    };
    if let Err(err) = res {
        error!(?err, chat_id = %chat_id, "failed to handle command");
    }
    Ok(())
}

async fn on_text(msg: Message, controller: Arc<Controller>) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id.to_string();
    if let Err(err) = controller.handle_text(&chat_id, text).await {
        error!(?err, chat_id = %chat_id, "failed to handle message");
    }
    Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, controller: Arc<Controller>) -> Result<()> {
    if let Err(err) = bot.answer_callback_query(q.id.clone()).await {
        warn!(?err, "failed to answer callback query");
    }
    let (Some(message), Some(data)) = (q.message.as_ref(), q.data.as_deref()) else {
        return Ok(());
    };
    let chat_id = message.chat.id.to_string();
    if let Err(err) = controller
        .handle_callback(&chat_id, message.id.0, data)
        .await
    {
        error!(?err, chat_id = %chat_id, "failed to handle callback");
    }
    Ok(())
}
