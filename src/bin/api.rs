use std::sync::Arc;
use stocksage_orchestrator::{
    agent::Orchestrator,
    api::{start_server, ApiState, APP_VERSION},
    config::{AgentConfig, ServerConfig},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables (.env is optional)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server_config = ServerConfig::from_env()?;

    info!("StockSage Orchestrator - API Server v{}", APP_VERSION);

    // A broken agent config still serves /health, reporting degraded
    let state = match AgentConfig::from_env().and_then(|config| Orchestrator::from_config(&config)) {
        Ok(orchestrator) => {
            info!(max_iterations = orchestrator.max_iterations(), "Orchestrator initialized");
            ApiState::ready(Arc::new(orchestrator))
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize agent pipeline");
            ApiState::degraded(&e)
        }
    };

    info!(agent_status = %state.agent_status, "Starting API server on {}", server_config.bind_addr());

    start_server(state, &server_config).await?;

    Ok(())
}
