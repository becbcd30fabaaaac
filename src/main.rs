use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use keepalive_health::bot::{IdentityProvider, TelegramIdentity};
use keepalive_health::config::{default_interval, default_timeout};
use keepalive_health::{utils, AppConfig, HealthServer, MonitorConfig, UptimeMonitor};

#[derive(Parser, Debug)]
#[command(name = "keepalive-health", version, about)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    PORT                 Health server port (default: 8080)
    SERVICE_NAME         Name reported by /health
    BOT_TOKEN            Telegram bot token; enables /status identity lookups
    TELEGRAM_API_URL     Bot API base URL (default: https://api.telegram.org)
    KEEP_ALIVE_ENABLED   Run the self-ping monitor (default: true)
    KEEP_ALIVE_URL       Probe target (default: http://localhost:$PORT/health)
    KEEP_ALIVE_INTERVAL  Seconds between probes (default: 300)
    KEEP_ALIVE_TIMEOUT   Per-probe timeout in seconds (default: 10)
    HEALTH_CONFIG        JSON config file used instead of the variables above
"#)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Health server plus keep-alive monitor (default)
    Serve,
    /// Only ping URL every INTERVAL seconds
    KeepAlive {
        url: String,
        #[arg(default_value_t = default_interval())]
        interval: u64,
        #[arg(long, default_value_t = default_timeout())]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::setup_console();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(AppConfig::load()?).await,
        Command::KeepAlive { url, interval, timeout } => {
            keep_alive(MonitorConfig { url, interval, timeout }).await
        }
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let identity: Option<Arc<dyn IdentityProvider>> = match &config.bot_token {
        Some(token) => Some(Arc::new(
            TelegramIdentity::new(&config.telegram_api_url, token)
                .context("Failed to create bot API client")?,
        )),
        None => {
            info!("BOT_TOKEN not set, /status will report not_initialized");
            None
        }
    };

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = HealthServer::new(config.service_name.clone(), identity);
    let running = server
        .start(config.port, async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        })
        .await
        .context("Health check server failed to start")?;

    let monitor = config
        .monitor()
        .map(UptimeMonitor::new)
        .transpose()?
        .map(Arc::new);
    let monitor_task = monitor.clone().map(|monitor| {
        tokio::spawn(async move { monitor.start_monitoring().await })
    });

    shutdown_signal().await;
    info!("Shutdown signal received");

    if let Some(monitor) = &monitor {
        monitor.stop_monitoring();
    }
    if let Some(task) = monitor_task {
        if let Err(e) = task.await {
            error!("Uptime monitor task failed: {}", e);
        }
    }
    let _ = stop_tx.send(true);
    match running.task.await {
        Ok(Err(e)) => error!("Health check server error: {}", e),
        Err(e) => error!("Health check server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    info!("Shutdown complete");
    Ok(())
}

async fn keep_alive(config: MonitorConfig) -> Result<()> {
    info!(url = %config.url, interval_secs = config.interval, "Keep-alive only mode");
    let monitor = Arc::new(UptimeMonitor::new(config)?);
    let task = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.start_monitoring().await })
    };

    shutdown_signal().await;
    monitor.stop_monitoring();
    if let Err(e) = task.await {
        error!("Uptime monitor task failed: {}", e);
    }

    let stats = monitor.stats();
    info!(
        "Final stats: {} pings, {} failed, {}% success, uptime: {}",
        stats.total_pings, stats.failed_pings, stats.success_rate, stats.uptime_formatted
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
