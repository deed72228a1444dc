//! # Centralized Error Handling
//!
//! This module defines a hierarchical error enum for the entire analyzer.
//! Every failure that crosses a module boundary is typed here, and errors
//! originating at the chain boundary carry a structured [`ErrorCategory`]
//! so the recovery coordinator never has to pattern-match on strings.

use ethers::types::H256;
use std::time::Duration;
use thiserror::Error;

/// The top-level error type, encapsulating all possible failures within the analyzer.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("State cache error: {0}")]
    State(#[from] StateError),
    #[error("Chain adapter error: {0}")]
    Chain(#[from] ChainError),
    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Opportunity engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Other error: {0}")]
    Other(String),
}

/// Recovery taxonomy. Attached at the failure site, never inferred from
/// error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Nonce-too-low / underpriced; retryable via gas or nonce adjustment.
    TransactionFailure,
    /// Cache stale or invalid; recoverable via resync or bounded rollback.
    StateInconsistency,
    /// Revert / invalid opcode; recoverable via parameter retry.
    ProtocolError,
    /// Non-recoverable; reported back to the caller immediately.
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::TransactionFailure => "transaction_failure",
            ErrorCategory::StateInconsistency => "state_inconsistency",
            ErrorCategory::ProtocolError => "protocol_error",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Errors surfaced by a [`crate::chain::ChainAdapter`] implementation.
///
/// `Clone` is derived because classified bytecode results are memoized and a
/// cached failure may be observed by more than one caller.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("Nonce too low for transaction {0:?}")]
    NonceTooLow(Option<H256>),
    #[error("Transaction underpriced: {0}")]
    Underpriced(String),
    #[error("Inactive connection: {0}")]
    InactiveConnection(String),
    #[error("Invalid chain state: {0}")]
    InvalidState(String),
    #[error("Execution reverted: {0}")]
    Revert(String),
    #[error("Invalid opcode at {0}")]
    InvalidOpcode(String),
    #[error("RPC timeout after {0:?}")]
    Timeout(Duration),
    #[error("Unsupported chain {0}")]
    UnsupportedChain(u64),
    #[error("RPC error: {0}")]
    Rpc(String),
}

impl ChainError {
    /// Maps the failure onto the recovery taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChainError::NonceTooLow(_) | ChainError::Underpriced(_) => {
                ErrorCategory::TransactionFailure
            }
            ChainError::InactiveConnection(_) | ChainError::InvalidState(_) => {
                ErrorCategory::StateInconsistency
            }
            ChainError::Revert(_) | ChainError::InvalidOpcode(_) => ErrorCategory::ProtocolError,
            ChainError::Timeout(_) | ChainError::UnsupportedChain(_) | ChainError::Rpc(_) => {
                ErrorCategory::Unknown
            }
        }
    }
}

/// Errors related to the `StateCache` and `UpdatePipeline`.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Chain {0} is not configured")]
    UnsupportedChain(u64),
    #[error("Refresh failed: {0}")]
    Chain(#[from] ChainError),
    #[error("State serialization failed: {0}")]
    Serialization(String),
    #[error("Update channel closed")]
    ChannelClosed,
}

/// Errors related to the `ErrorRecoveryCoordinator`.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("No applicable strategy for category {0}")]
    NoApplicableStrategy(ErrorCategory),
    #[error("Strategy step failed: {0}")]
    Chain(#[from] ChainError),
    #[error("Strategy timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors related to the `ProtocolGraphBuilder`.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Bytecode analysis failed for {address}: {source}")]
    Bytecode {
        address: String,
        #[source]
        source: ChainError,
    },
    #[error("Start address is not present in the graph")]
    MissingStart,
}

/// Errors related to the `OpportunityEngine` and its detectors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("State cache error: {0}")]
    State(#[from] StateError),
    #[error("Detector {detector} failed: {reason}")]
    Detector {
        detector: &'static str,
        reason: String,
    },
}
