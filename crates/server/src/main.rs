use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timelapse_core::{
    load_config, validate_config, Dependencies, Generator, HttpTransport, Persistence,
    PngRenderer, Renderer, SqlitePersistence, Transport,
};
use timelapse_server::{api::create_router, state::AppState};

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

    info!("timelapse {}", VERSION);

    // Determine config path
    let config_path = std::env::var("TIMELAPSE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite persistence
    let persistence: Arc<dyn Persistence> = Arc::new(
        SqlitePersistence::new(&config.database.path)
            .context("Failed to open generation database")?,
    );
    info!("Persistence initialized");

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(config.pipeline.fetch_timeout()));
    let renderer: Arc<dyn Renderer> = Arc::new(PngRenderer::new());

    // Spawn the generator main loop
    let (generator, generator_task) = Generator::spawn(
        config.pipeline.clone(),
        Dependencies::new(persistence, transport, renderer),
    );
    info!(
        download = config.pipeline.download_workers,
        render = config.pipeline.render_workers,
        save = config.pipeline.save_workers,
        "Generator ready"
    );

    match &config.generation {
        Some(section) if section.autostart => {
            info!(repo = %section.run.repo_url, "Autostarting generation");
            if let Err(e) = generator.start_generation(section.run.clone()) {
                warn!("Autostart failed: {}", e);
            }
        }
        Some(_) => info!("Generation configured, waiting for a start request"),
        None => info!("No generation configured"),
    }

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), generator.clone()));

    // Create router
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

    // Stop any running generation and wait for the main loop to end
    info!("Server shutting down...");
    generator
        .shutdown()
        .context("Failed to signal generator shutdown")?;
    generator_task.await.context("Generator task panicked")?;
    info!("Generator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
