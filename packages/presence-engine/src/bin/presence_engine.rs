// Demo runner: plays the engine into one room against in-memory collaborators

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use presence_engine::common::RoomId;
use presence_engine::kernel::{
    EngineDeps, FastRandomizer, InMemoryPresenceStore, LoggingMessageSink, StaticBotDirectory,
};
use presence_engine::{
    ConversationCatalog, EngineConfig, JoinEventSimulator, JoinNotification,
    RoomEngineCoordinator,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BUNDLED_CATALOG: &str = include_str!("../../data/catalog.json");

#[derive(Parser, Debug)]
#[command(name = "presence-engine")]
#[command(about = "Play scripted bot conversations into a chat room")]
struct Args {
    /// Room to animate
    #[arg(long, default_value = "lobby")]
    room: String,

    /// Conversation catalog (JSON). Defaults to the bundled catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_for_secs: Option<u64>,

    /// Override the auto-deactivation threshold
    #[arg(long)]
    threshold: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,presence_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::from_env().context("Failed to load configuration")?;
    if let Some(threshold) = args.threshold {
        config.auto_deactivate_threshold = threshold;
    }

    let catalog = match &args.catalog {
        Some(path) => ConversationCatalog::from_path(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => ConversationCatalog::from_json_str(BUNDLED_CATALOG)
            .context("Bundled catalog is invalid")?,
    };
    tracing::info!(conversations = catalog.len(), "Catalog loaded");

    let bot_directory = StaticBotDirectory::from_usernames(catalog.participants());
    let randomizer = Arc::new(FastRandomizer);
    let deps = EngineDeps::new(
        Arc::new(catalog),
        Arc::new(bot_directory),
        Arc::new(LoggingMessageSink),
        Arc::new(InMemoryPresenceStore::new()),
        randomizer.clone(),
    );

    let coordinator = RoomEngineCoordinator::new(deps, config.clone());
    let joins = JoinEventSimulator::new(randomizer, &config);
    let room = RoomId::new(args.room);

    coordinator
        .start(&room)
        .await
        .context("Failed to start room engine")?;
    joins.start(
        &room,
        Arc::new(|notification: JoinNotification| {
            tracing::info!(
                username = %notification.username,
                role = %notification.role,
                "{} just joined",
                notification.username
            );
        }),
    );

    match args.run_for_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
        }
    }

    // Sessions are dropped on stop, so read the summary first
    if let Some(snapshot) = coordinator.snapshot(&room).await {
        tracing::info!(
            conversations_played = snapshot.conversations_played,
            active_runs = snapshot.active_runs.len(),
            "Room engine summary"
        );
    }

    tracing::info!("Shutting down");
    joins.shutdown();
    coordinator.shutdown().await;
    Ok(())
}
