//! # Core Data Model
//!
//! Shared types for the state cache, the protocol graph and the opportunity
//! engine. Protocol and interaction kinds are explicit tagged enums chosen at
//! construction time; nothing here is inferred from attribute maps at read
//! time.

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

//================================================================================================//
//                                        PROTOCOL ENUMS                                          //
//================================================================================================//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    Dex,
    Lending,
    FlashLoan,
    Governance,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    FlashLoan,
    PriceImpact,
    Governance,
    Other,
}

/// How an interaction vector has to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorType {
    /// Executable within a single transaction.
    Atomic,
    /// Requires multiple transactions (e.g. a governance delay in the path).
    MultiTx,
}

//================================================================================================//
//                                         CHAIN STATE                                            //
//================================================================================================//

/// Per-address protocol state: free-form field map as reported by the chain
/// adapter. Well-known fields (`pools`, `accounts`, `last_update`) are parsed
/// on demand by the consumers that need them.
pub type ProtocolFields = HashMap<String, Value>;

/// One snapshot of a chain, owned exclusively by the `StateCache` and mutated
/// only while holding that chain's lock.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub chain_id: u64,
    pub block_number: u64,
    /// Timestamp of the latest observed block, in seconds.
    pub timestamp: u64,
    pub gas_price: U256,
    pub protocol_states: HashMap<Address, ProtocolFields>,
    pub pending_transactions: Vec<PendingTransaction>,
    /// Local wall-clock of the last successful refresh or merge; `None`
    /// until the first one, so a just-registered snapshot reads as stale.
    pub last_update: Option<Instant>,
    /// Deterministic digest of `protocol_states`, independent of insertion order.
    pub state_hash: H256,
}

impl ChainState {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            block_number: 0,
            timestamp: 0,
            gas_price: U256::zero(),
            protocol_states: HashMap::new(),
            pending_transactions: Vec::new(),
            last_update: None,
            state_hash: H256::zero(),
        }
    }
}

/// Where a proposed state delta came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    Refresh,
    Replicator,
    Recovery,
}

/// A proposed state delta. Immutable after creation, consumed exactly once by
/// the update pipeline.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub chain_id: u64,
    pub updates: HashMap<Address, ProtocolFields>,
    pub block_number: u64,
    pub timestamp: u64,
    pub source: UpdateSource,
    pub priority: u8,
}

//================================================================================================//
//                                      PENDING TRANSACTIONS                                      //
//================================================================================================//

/// Decoded swap intent attached to a pending transaction, when the mempool
/// decoder could recognize one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapIntent {
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
    /// Input amount in pool-native units (already decimal-adjusted).
    pub amount_in: f64,
    /// Victim's maximum tolerated slippage, in basis points.
    pub max_slippage_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub gas_price: U256,
    pub value: U256,
    pub swap: Option<SwapIntent>,
}

//================================================================================================//
//                                      PROTOCOL STATE SCHEMA                                     //
//================================================================================================//

/// Pool entry under a DEX protocol's `pools` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolState {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    /// Reserves in decimal-adjusted units.
    pub reserve0: f64,
    pub reserve1: f64,
}

/// Account entry under a lending protocol's `accounts` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingAccount {
    pub address: Address,
    pub collateral_value: f64,
    pub debt_value: f64,
    /// Liquidator bonus as a fraction of repaid debt (e.g. 0.08).
    pub liquidation_bonus: f64,
}

//================================================================================================//
//                                     ANALYSIS RESULT TYPES                                      //
//================================================================================================//

/// A scored cross-protocol interaction path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionVector {
    pub source_protocol: Address,
    pub target_protocol: Address,
    pub interaction_type: InteractionType,
    pub vector_type: VectorType,
    pub entry_points: Vec<Address>,
    pub required_assets: HashMap<Address, f64>,
    pub estimated_profit: f64,
    /// 1-10 scale.
    pub complexity: u8,
    pub success_probability: f64,
    pub risk_factors: Vec<String>,
    pub detection_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Sandwich,
    Arbitrage,
    Liquidation,
    Frontrun,
}

/// A detected MEV opportunity. `risk_score` is annotated by the engine's
/// aggregation step, not by individual detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MEVOpportunity {
    pub kind: OpportunityKind,
    pub entry_points: Vec<String>,
    pub tokens: Vec<Address>,
    pub estimated_profit: f64,
    pub required_capital: f64,
    pub gas_cost: f64,
    /// 1-10 scale.
    pub complexity: u8,
    pub success_probability: f64,
    /// 0-1 scale.
    pub competition_level: f64,
    /// Execution horizon in blocks.
    pub execution_time: u64,
    pub risk_factors: Vec<String>,
    pub risk_score: f64,
}

//================================================================================================//
//                                       GRAPH EXPORT FORMAT                                      //
//================================================================================================//

/// Serialized protocol-graph snapshot for downstream reporting and
/// visualization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<GraphNodeExport>,
    pub edges: Vec<GraphEdgeExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodeExport {
    pub id: Address,
    pub protocol_type: ProtocolType,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdgeExport {
    pub source: Address,
    pub target: Address,
    pub interaction_type: InteractionType,
}

//================================================================================================//
//                                       RECOVERY RESULTS                                         //
//================================================================================================//

/// Outcome of one recovery run, appended to the per-recovery-id history.
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub success: bool,
    pub strategy_used: String,
    pub attempts_made: u32,
    pub error_details: Option<String>,
    pub state_changes: HashMap<String, Value>,
    pub elapsed: std::time::Duration,
    pub completed_at: DateTime<Utc>,
}
