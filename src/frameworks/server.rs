// Framework bootstrap for the session server runtime.

use crate::frameworks::config;
use crate::interface_adapters::clients::stats::StatsClient;
use crate::interface_adapters::net::ws_handler;
use crate::interface_adapters::state::AppState;
use crate::use_cases::{Coordinator, CoordinatorSettings, SessionEvent, coordinator_task};

use axum::{Router, routing::get};
use std::io::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Everything needed to assemble the runtime state.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub settings: CoordinatorSettings,
    pub stats_url: Option<String>,
    pub stats_timeout: Duration,
    pub events_capacity: usize,
    pub outbound_capacity: usize,
}

impl ServerOptions {
    pub fn from_env() -> Self {
        Self {
            settings: CoordinatorSettings {
                battle_royale_capacity: config::battle_royale_capacity(),
                cooperative_capacity: config::cooperative_capacity(),
                countdown: config::MATCH_COUNTDOWN,
                tick_interval: config::TICK_INTERVAL,
                cleanup_grace: config::FINISHED_ROOM_GRACE,
                grid_width: config::GRID_WIDTH,
                grid_height: config::GRID_HEIGHT,
            },
            stats_url: config::stats_service_url(),
            stats_timeout: config::stats_report_timeout(),
            events_capacity: config::EVENT_CHANNEL_CAPACITY,
            outbound_capacity: config::OUTBOUND_CHANNEL_CAPACITY,
        }
    }
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    run_with_options(listener, ServerOptions::from_env()).await
}

pub async fn run_with_options(
    listener: tokio::net::TcpListener,
    options: ServerOptions,
) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state(options)?;

    let app = Router::new().route("/ws", get(ws_handler)).with_state(state);

    tracing::info!(%address, "listening");

    // Serve and report errors rather than panicking.
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state(options: ServerOptions) -> Result<Arc<AppState>> {
    let stats = match options.stats_url {
        Some(base_url) => {
            tracing::debug!(
                stats_base_url = %base_url,
                stats_timeout_ms = options.stats_timeout.as_millis(),
                "stats client configured"
            );
            let client = StatsClient::new(base_url, options.stats_timeout).map_err(|e| {
                std::io::Error::other(format!("failed to initialize stats client: {e}"))
            })?;
            Some(Arc::new(client))
        }
        None => {
            tracing::debug!("stats reporting disabled");
            None
        }
    };

    // All room and session mutation happens on the coordinator task; sockets
    // and timers reach it through this channel.
    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(options.events_capacity);
    let coordinator = Coordinator::new(options.settings, events_tx.clone(), stats);
    tokio::spawn(coordinator_task(coordinator, events_rx));

    Ok(Arc::new(AppState {
        events_tx,
        outbound_capacity: options.outbound_capacity,
    }))
}
