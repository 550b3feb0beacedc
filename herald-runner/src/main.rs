use anyhow::Result;
use herald_api::ApiState;
use herald_core::{Config, HeraldContext};
use herald_delivery::{DeliveryAdapter, PlatformRouter};
use herald_notify::{Dispatcher, PreferenceGate};
use herald_reminders::ReminderScheduler;
use std::env;
use std::sync::Arc;
use tokio;
use tokio_util::sync::CancellationToken;
use tracing;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("HERALD_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    init_tracing();

    tracing::info!("Starting Herald notification engine");

    // Load configuration
    let config = Config::from_env();
    let ctx = HeraldContext::new(config).await?;
    let wall_clock = ctx.config.notify.wall_clock_offset();

    tracing::info!("Herald context initialized");

    let channel = Arc::new(PlatformRouter::from_config(&ctx.config.delivery)?);
    let dispatcher = Arc::new(Dispatcher::new(
        PreferenceGate::new(ctx.store.clone(), ctx.clock.clone(), wall_clock),
        DeliveryAdapter::new(ctx.store.clone(), channel),
        ctx.store.clone(),
        ctx.clock.clone(),
    ));

    let scheduler = ReminderScheduler::new(
        ctx.store.clone(),
        dispatcher.clone(),
        ctx.clock.clone(),
        ctx.config.scheduler.clone(),
        wall_clock,
    );

    let cancel = CancellationToken::new();

    let scheduler_cancel = cancel.clone();
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    // API server runs in main task
    let api_result = herald_api::run(ApiState::new(ctx, dispatcher), cancel.clone()).await;
    cancel.cancel();

    if let Err(e) = scheduler_task.await {
        tracing::error!("Reminder scheduler task failed: {}", e);
    }

    api_result
}
