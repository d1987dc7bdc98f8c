use stocksage_orchestrator::{
    agent::Orchestrator,
    config::AgentConfig,
    state::{InMemorySessionStore, SessionStore},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// One-shot query from the command line, printing the pipeline trace
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        eprintln!("usage: orchestrator <question>");
        eprintln!("example: orchestrator What is the current price of AAPL?");
        std::process::exit(2);
    }

    let config = AgentConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let sessions = InMemorySessionStore::new();

    let mut session = sessions.create_session("cli-user").await?;
    let query = session.query(text.trim());

    info!(session_id = %session.session_id, "Running orchestrator");

    let result = orchestrator.run(&query, &mut session).await;
    sessions.release(&session.session_id).await?;

    match result {
        Ok(outcome) => {
            println!("\n=== ANSWER ({}) ===", outcome.route.label());
            println!("{}", outcome.text);
            if let Some(detail) = &outcome.detail {
                println!("\nData issue: {}", detail);
            }
            println!("\nIterations: {}  Grounded: {}", outcome.iterations, outcome.grounded);
            println!("\nPipeline Trace:");
            for (i, step) in outcome.trace.iter().enumerate() {
                println!("  {}: {}", i + 1, step);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Orchestration failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
