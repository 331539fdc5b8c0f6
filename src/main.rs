use cdn_fileserver::config::{Config, LogFormat};
use cdn_fileserver::server::{self, AppState};
use cdn_fileserver::service::FileService;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    config.validate()?;

    let files = FileService::new(config.storage_settings()).await?;

    let addr = format!("{}:{}", config.address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("cdn-fileserver v{} listening on {}", env!("CDN_FILESERVER_VERSION"), addr);
    tracing::info!("Data dir:   {}", config.data_dir);
    tracing::info!("Base URL:   {}", config.base_url());
    tracing::info!("Max size:   {} bytes", config.max_file_size);
    tracing::info!("Extensions: {}", config.allowed_extensions().join(","));
    for token in &config.tokens {
        let perms: Vec<&str> = token.permissions.iter().map(|p| p.as_str()).collect();
        tracing::info!("Token:      {} ({})", token.name, perms.join("+"));
    }

    let state = AppState::new(files, config);
    let app = server::build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
