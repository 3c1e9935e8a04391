use anyhow::{Context, Result};
use claims_engine::{ClaimsEngine, EngineConfig, EngineStores, SystemClock};
use claims_server::{ServerConfig, create_app, seed::load_reference_data, telemetry::init_tracing};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    let server_config = ServerConfig::from_env()?;
    init_tracing(server_config.log_format);

    let engine_config = EngineConfig::from_env().context("invalid engine configuration")?;
    info!(
        default_threshold = %engine_config.default_threshold,
        threshold_cache_ttl_secs = engine_config.threshold_cache_ttl.as_secs(),
        code_max_attempts = engine_config.code_max_attempts,
        "Engine configuration loaded"
    );

    let reference = Arc::new(load_reference_data(server_config.seed_file.as_deref()).await?);
    let engine = ClaimsEngine::new(
        &engine_config,
        EngineStores::in_memory(reference),
        Arc::new(SystemClock),
    );

    let app = create_app(engine);
    let listener = TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_addr))?;

    info!("Claims authorization service listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
