use anyhow::{Context, Result};
use status_monitor::bin_common::{
    init_tracing, load_config_from_env, ConfigType, EventsConfig, ShutdownManager,
};
use status_monitor::stompsockets::{ClientEvent, InboundMessage, StatusEvent, Topic};
use std::time::Duration;
use tracing::{error, info, warn};

const METRICS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(ConfigType::Events);
    let config = EventsConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let client = config.build_client().await?;

    let mut subscriptions = Vec::with_capacity(config.subscribe.len() + 1);
    for topic in &config.subscribe {
        subscriptions.push(client.subscribe(topic, log_event)?);
    }
    if !config.subscribe.iter().any(|topic| topic == Topic::ERROR) {
        subscriptions.push(client.subscribe(Topic::ERROR, log_event)?);
    }

    print_banner(&config.ws_url);

    let mut last_metrics = std::time::Instant::now();
    while shutdown.is_running() {
        while let Some(event) = client.try_recv_event() {
            log_client_event(&event);
        }

        if last_metrics.elapsed() >= METRICS_INTERVAL {
            let metrics = client.metrics();
            info!(
                "Heartbeat: {:?}, {} received, {} sent, {} reconnects, {} parse failures",
                metrics.connection_state,
                metrics.messages_received,
                metrics.messages_sent,
                metrics.reconnect_count,
                metrics.parse_failures
            );
            last_metrics = std::time::Instant::now();
        }

        shutdown.interruptible_sleep(Duration::from_millis(250)).await;
    }

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    client.close().await;

    print_shutdown("Status event client");
    Ok(())
}

fn log_event(message: &InboundMessage) -> status_monitor::stompsockets::Result<()> {
    match &message.event {
        StatusEvent::ServerStatus(updates) => {
            for update in updates {
                info!(
                    "[server] {} ({}) {:?} latency={}",
                    update.server_id,
                    update.server_name.as_deref().unwrap_or("-"),
                    update.server_status,
                    update.latency.as_deref().unwrap_or("-")
                );
            }
        }
        StatusEvent::SchedulerStatus(status) => {
            info!(
                "[scheduler] {:?} {}",
                status.kind,
                if status.status.is_running() { "running" } else { "stopped" }
            );
        }
        StatusEvent::ConnectionLost(lost) => {
            error!("{} after {} attempts", lost.message, lost.attempts);
        }
        StatusEvent::Other(value) => {
            info!("[{}] {}", message.topic, value);
        }
    }
    Ok(())
}

fn log_client_event(event: &ClientEvent) {
    match event {
        ClientEvent::Connected { mode } => info!("Connected ({:?})", mode),
        ClientEvent::Disconnected => warn!("Disconnected"),
        ClientEvent::Reconnecting(failed) => info!("Reconnecting ({} failed attempts)", failed),
        ClientEvent::FellBackToRaw => warn!("Peer did not complete STOMP, using raw JSON"),
        ClientEvent::Failed { attempts } => {
            error!("Gave up after {} attempts, waiting for manual reconnect", attempts)
        }
        ClientEvent::Error(reason) => warn!("Connection error: {}", reason),
    }
}

fn print_banner(url: &str) {
    info!("");
    info!("========================================");
    info!("Starting status event client");
    info!("Endpoint: {}", url);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown(name: &str) {
    info!("");
    info!("========================================");
    info!("{} stopped gracefully", name);
    info!("========================================");
}
