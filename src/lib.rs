//! StockSage Orchestrator
//!
//! Routes a natural-language question to grounded specialists and merges
//! their answers:
//! - a financial specialist backed by Alpha Vantage market data
//! - a web specialist backed by Google Custom Search (plus optional scraping)
//!
//! PIPELINE:
//! ROUTE → DISPATCH → LOOP? → SYNTHESIZE | DIRECT → DONE

pub mod agent;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gemini;
pub mod memory;
pub mod models;
pub mod specialists;
pub mod state;
pub mod synthesizer;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use classifier::RouteClassifier;
