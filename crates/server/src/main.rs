use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgpipe_core::{
    load_config, spawn_recovery_loop, validate_config, BrokerBackend, Config, ImageService,
    InMemoryBroker, LocalFileArea, SqliteTaskStore, TaskConsumer, TaskPublisher, TaskStore,
    WorkerPool,
};
use imgpipe_server::api::create_router;
use imgpipe_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("IMGPIPE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!(version = VERSION, "Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Broker backend: {:?}", config.broker.backend);

    // Task store
    let store: Arc<dyn TaskStore> = Arc::new(
        SqliteTaskStore::new(&config.database.path).context("Failed to open task store")?,
    );

    // File areas
    let files = Arc::new(LocalFileArea::new(
        config.storage.input_dir.clone(),
        config.storage.output_dir.clone(),
    ));
    files
        .ensure_dirs()
        .await
        .context("Failed to create storage directories")?;

    // Broker
    let (publisher, consumer) = create_broker(&config).await?;

    let service = Arc::new(
        ImageService::new(
            Arc::clone(&store),
            publisher,
            files.clone(),
            config.formats.to_set(),
            config.retry.clone(),
        )
        .with_max_resize_side(config.server.max_resize_side),
    );

    // Backlog recovery: one sweep now, then on the configured interval
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let recovery = spawn_recovery_loop(
        Arc::clone(&service),
        config.recovery.interval(),
        shutdown_rx,
    );

    // Workers
    let pool = WorkerPool::start(
        config.workers.clone(),
        consumer,
        Arc::clone(&store),
        files,
        config.retry.clone(),
    );
    info!(workers = pool.size(), "Worker pool started");

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), service, store));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Intake is closed; drain the workers, then stop recovery
    info!("Server shutting down...");
    pool.shutdown().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = recovery.await {
        error!(error = %e, "Recovery loop panicked");
    }
    info!("Shutdown complete");

    Ok(())
}

async fn create_broker(
    config: &Config,
) -> Result<(Arc<dyn TaskPublisher>, Arc<dyn TaskConsumer>)> {
    match config.broker.backend {
        BrokerBackend::Memory => {
            info!(topic = %config.broker.topic, "Using in-memory broker");
            let broker = InMemoryBroker::new(config.broker.topic.clone());
            let consumer: Arc<dyn TaskConsumer> = Arc::new(broker.consumer().await);
            let publisher: Arc<dyn TaskPublisher> = Arc::new(broker);
            Ok((publisher, consumer))
        }
        #[cfg(feature = "kafka")]
        BrokerBackend::Kafka => {
            use imgpipe_core::{KafkaConsumer, KafkaPublisher};

            let kafka = config
                .broker
                .kafka
                .as_ref()
                .context("kafka backend selected but no [broker.kafka] section provided")?;
            info!(brokers = %kafka.brokers, topic = %config.broker.topic, "Using Kafka broker");
            let publisher: Arc<dyn TaskPublisher> = Arc::new(
                KafkaPublisher::new(kafka, &config.broker.topic)
                    .context("Failed to create Kafka producer")?,
            );
            let consumer: Arc<dyn TaskConsumer> = Arc::new(
                KafkaConsumer::new(kafka, &config.broker.topic)
                    .context("Failed to create Kafka consumer")?,
            );
            Ok((publisher, consumer))
        }
        #[cfg(not(feature = "kafka"))]
        BrokerBackend::Kafka => {
            anyhow::bail!(
                "kafka backend selected but the server was built without the `kafka` feature"
            )
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
