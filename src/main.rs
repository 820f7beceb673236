use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use feed_relay::file_io::open_file_for_append;
use feed_relay::init_metrics;
use feed_relay::init_sled_db;
use feed_relay::start_server;
use feed_relay::AdminState;
use feed_relay::Error;
use feed_relay::HttpRenderingAgent;
use feed_relay::Manager;
use feed_relay::Result;
use feed_relay::Settings;
use feed_relay::SledConfigSource;
use feed_relay::SledWatermarkStore;
use feed_relay::WatcherContext;
use feed_relay::WebhookAlerts;
use feed_relay::WebhookTransport;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let settings = match Settings::load(None) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initializing Logs
    let _guard = match init_observability(&settings.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("could not initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(settings).await {
        Ok(()) => {
            info!("Exiting program.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("relay stops: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    init_metrics();
    let settings = Arc::new(settings);

    let db = init_sled_db(&settings.storage.db_root_dir)?;
    let records = Arc::new(SledConfigSource::new(&db)?);
    let store = Arc::new(SledWatermarkStore::new(&db)?);

    let agent = Arc::new(HttpRenderingAgent::new(&settings.rendering)?);
    let transport = Arc::new(WebhookTransport::new(&settings.sink)?);
    let alerts = Arc::new(WebhookAlerts::new(
        &settings.alert,
        settings.sink.default_avatar_ref.clone(),
        transport.clone(),
    )?);

    let ctx = WatcherContext {
        agent,
        store,
        transport,
        alerts,
        settings: settings.clone(),
    };
    let manager = Manager::new(records.clone(), ctx);

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if settings.monitoring.server_enabled {
        let state = AdminState {
            records,
            registry: manager.registry().clone(),
        };
        let port = settings.monitoring.server_port;
        let shutdown = graceful_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state, shutdown).await {
                error!("admin server stops: {:?}", e);
            }
        });
    }

    info!("Application started. Waiting for CTRL+C signal...");
    let result = manager.run(graceful_rx).await;

    if let Err(e) = db.flush_async().await {
        error!("final store flush failed: {:?}", e);
    }
    result
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(log_dir.join("relay.log"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
