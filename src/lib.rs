//! # DeFi Analyzer
//!
//! Cross-protocol, cross-chain MEV analysis: versioned per-chain state
//! snapshots with an ordered update pipeline, bytecode-driven protocol
//! interaction graphs, opportunity detection (arbitrage, sandwich,
//! liquidation) over those snapshots, and category-based error recovery for
//! chain-level failures.

pub mod analyzer;
pub mod bytecode;
pub mod chain;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod recovery;
pub mod risk;
pub mod state;
pub mod types;

pub use analyzer::{AnalysisReport, CrossProtocolAnalyzer, GovernanceExposure, RiskSummary};
pub use bytecode::{BytecodeAnalyzer, CachedBytecodeAnalyzer, ClassifiedContract};
pub use chain::{BlockInfo, ChainAdapter, TransactionOutcome};
pub use config::Config;
pub use engine::{CompetitionTracker, OpportunityEngine};
pub use errors::{AnalyzerError, ChainError, ErrorCategory, StateError};
pub use graph::{ProtocolGraph, ProtocolGraphBuilder};
pub use recovery::{ErrorRecoveryCoordinator, FailureContext};
pub use state::{StateCache, UpdatePipeline};
pub use types::{
    ChainState, InteractionVector, MEVOpportunity, OpportunityKind, ProtocolType, StateUpdate,
    UpdateSource,
};

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
