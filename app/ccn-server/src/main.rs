use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

use ccn_rag::{CcnEngine, EngineConfig};

mod http_server;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path = std::env::var("CCN_CONFIG").ok().map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref()).context("Failed to load engine config")?;
    tracing::info!(
        config = ?config_path,
        provider = config.llm.provider.name(),
        model = %config.llm.model,
        "Configuration loaded"
    );

    let engine = Arc::new(CcnEngine::from_config(config).context("Failed to build engine")?);

    let addr = std::env::var("CCN_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    http_server::start_server(engine, &addr).await
}
