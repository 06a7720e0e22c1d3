//! Company Query Orchestrator
//!
//! Answers natural-language questions about companies with cited,
//! cross-verified one-to-two sentence answers:
//! - Disambiguates under-specified queries (one clarification round-trip)
//! - Extracts structured intent and compiles intent-tagged search queries
//! - Routes to financial, encyclopedic, or generic web retrieval
//! - Evaluates answer sufficiency and cross-checks against two
//!   independent web searches
//! - Tracks citation provenance end to end
//!
//! PIPELINE:
//! INPUT → DISAMBIGUATE → RETRIEVE → EVALUATE → VERIFY → RETRY? → ANSWER

pub mod config;
pub mod disambiguator;
pub mod error;
pub mod evaluator;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod sources;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use pipeline::Orchestrator;
