use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use preview_server::{Config, PreviewServer, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Initialize logging from `RUST_LOG`, falling back to the configured level.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Configuration errors are reported before logging is configured
    let config = Config::from_env().map_err(|e| {
        eprintln!("Configuration error: {e}");
        exitcode::CONFIG
    })?;

    init_tracing(&config.log_level, config.log_json);
    info!(
        "Starting Preview Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        root = %config.root_path.display(),
        port = config.port,
        session_ttl_secs = config.session_ttl.as_secs(),
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    let server = PreviewServer::new(config.instance_config());
    let port = server.start(config.port).await.map_err(|e| {
        error!("Failed to start preview server: {e}");
        exitcode::UNAVAILABLE
    })?;

    let url = server.url("/index.html").ok_or_else(|| {
        error!("Preview server stopped unexpectedly");
        exitcode::SOFTWARE
    })?;
    info!(project_id = %server.project_id(), port, "Serving on http://localhost:{port}");
    // The bootstrap URL carries the secret; print it for the operator only.
    println!("{url}");

    utils::shutdown_signal().await;

    server.stop().await;
    info!("Server shutdown complete");
    Ok(())
}
