use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use wave_core::MonitorUpdate;
use wave_monitor::serial::port::available_ports;
use wave_monitor::{
    Config, ConnectionError, Connector, LinkConfig, MockConnector, MonitorState,
    SerialPortConnector, Session, connect, http,
};

#[derive(Parser)]
#[command(name = "wave-monitor")]
#[command(about = "WAVE gateway telemetry monitor")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "wave-monitor.toml")]
    config: PathBuf,

    /// Serial port, overrides the configuration file
    #[arg(short, long)]
    port: Option<String>,

    /// Print the serial ports found on this machine and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,wave_monitor=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        for port in available_ports()? {
            println!("{port}");
        }
        return Ok(());
    }

    let mut config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if let Some(port) = cli.port {
        config.serial.port = port;
    }

    info!(
        http_addr = %config.server.http_addr,
        journal_capacity = config.monitor.journal_capacity,
        "Starting wave-monitor"
    );

    let state = MonitorState::new(config.monitor.tracker());

    match &config.link {
        LinkConfig::Serial => {
            info!(
                port = %config.serial.port,
                baud_rate = config.serial.baud_rate,
                "Using serial link"
            );
            let connector = SerialPortConnector::new(
                config.serial.port.clone(),
                config.serial.baud_rate,
                config.serial.read_timeout(),
            )
            .with_boot_delay(config.serial.boot_delay());
            run_monitor(&connector, state, &config).await?;
        }
        LinkConfig::Mock {
            script,
            line_interval_ms,
            hold_open,
        } => {
            info!(script = ?script, line_interval_ms, hold_open, "Using mock link");
            let connector = MockConnector::from_transcript(script)?
                .with_line_interval(Duration::from_millis(*line_interval_ms))
                .hold_open(*hold_open);
            run_monitor(&connector, state, &config).await?;
        }
    }

    Ok(())
}

async fn run_monitor<C: Connector>(
    connector: &C,
    state: MonitorState,
    config: &Config,
) -> color_eyre::Result<()> {
    // subscribe before connecting so the first lines are logged too
    let log_task = tokio::spawn(log_updates(state.subscribe()));

    let session = match connect(connector, state).await {
        Ok(session) => session,
        Err(e) => {
            log_connection_error(&e);
            log_task.abort();
            return Err(e.into());
        }
    };
    let handle = session.handle();

    // HTTP server
    let http_addr = config.server.http_addr;
    let app = http::router(handle.clone());
    let listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let handle_for_http = handle.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                handle_for_http.cancelled().await;
            })
            .await;
        if let Err(e) = result {
            error!(error = ?e, "HTTP server error");
        }
        info!("HTTP server shut down");
    });

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    shutdown(session, server).await;
    log_task.abort();

    info!("wave-monitor shut down complete");
    Ok(())
}

async fn shutdown(session: Session, server: tokio::task::JoinHandle<()>) {
    session.close().await;
    if let Err(e) = server.await {
        error!(error = %e, "HTTP server task failed");
    }
}

fn log_connection_error(e: &ConnectionError) {
    match e.remediation() {
        Some(hint) => error!(error = %e, hint, "Could not connect"),
        None => error!(error = %e, "Could not connect"),
    }
}

/// Log the updates an operator cares about.
async fn log_updates(mut updates: broadcast::Receiver<MonitorUpdate>) {
    loop {
        match updates.recv().await {
            Ok(MonitorUpdate::AlertRecorded(entry)) => {
                warn!(id = %entry.id, text = %entry.text, "ALERT");
            }
            Ok(MonitorUpdate::Phase(change)) => {
                info!(phase = ?change.phase, label = %change.label, "Device phase");
            }
            Ok(MonitorUpdate::Sound { enabled }) => {
                info!(enabled, "Device sound");
            }
            Ok(MonitorUpdate::Link(status)) => {
                info!(?status, "Link status");
            }
            Ok(MonitorUpdate::JournalCleared { removed }) => {
                info!(removed, "Alert journal cleared");
            }
            Ok(MonitorUpdate::Notice(Some(notice))) => {
                info!(kind = ?notice.kind, text = %notice.text, "Notice");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Update log fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
