//! # Configuration System
//!
//! Settings are loaded from a single JSON file via serde; every stanza also
//! carries a `Default` so tests and embedders can construct a working config
//! without touching the filesystem. The `Config` struct is the single source
//! of truth for all tunables.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

//================================================================================================//
//                                       Top-Level Config                                         //
//================================================================================================//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chain id -> per-chain settings. A chain absent from this map is
    /// unsupported and every state read for it fails fast.
    #[serde(default)]
    pub chains: HashMap<u64, ChainSettings>,
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub recovery: RecoverySettings,
    #[serde(default)]
    pub risk_weights: RiskWeights,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .wrap_err_with(|| format!("reading config file {:?}", path.as_ref()))?;
        serde_json::from_str(&raw).wrap_err("parsing analyzer config")
    }
}

//================================================================================================//
//                                        Chain Settings                                          //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    pub name: String,
    /// A cached snapshot older than this is refreshed before being returned.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Timeout applied to every read/send RPC.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Timeout applied to receipt waits.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

impl ChainSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            refresh_interval_secs: default_refresh_interval_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

fn default_refresh_interval_secs() -> u64 {
    12
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_receipt_timeout_secs() -> u64 {
    60
}

//================================================================================================//
//                                        Graph Settings                                          //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Hard BFS depth bound.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum number of edges in an enumerated interaction path. Path
    /// enumeration is exponential in branching factor; keep this small.
    #[serde(default = "default_vector_cutoff")]
    pub vector_cutoff: usize,
    #[serde(default = "default_bytecode_cache_size")]
    pub bytecode_cache_size: u64,
    #[serde(default = "default_bytecode_cache_ttl_secs")]
    pub bytecode_cache_ttl_secs: u64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            vector_cutoff: default_vector_cutoff(),
            bytecode_cache_size: default_bytecode_cache_size(),
            bytecode_cache_ttl_secs: default_bytecode_cache_ttl_secs(),
        }
    }
}

fn default_max_depth() -> usize {
    3
}
fn default_vector_cutoff() -> usize {
    3
}
fn default_bytecode_cache_size() -> u64 {
    10_000
}
fn default_bytecode_cache_ttl_secs() -> u64 {
    300
}

//================================================================================================//
//                                        Engine Settings                                         //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum arbitrage cycle length, in hops.
    #[serde(default = "default_max_routes")]
    pub max_routes: usize,
    /// Capital probed through each candidate cycle, in decimal-adjusted units
    /// of the cycle's entry token.
    #[serde(default = "default_probe_capital")]
    pub arbitrage_probe_capital: f64,
    /// Swap fee charged by pools, in basis points.
    #[serde(default = "default_dex_fee_bps")]
    pub dex_fee_bps: u32,
    /// Flat per-hop gas cost estimate, in the same units as profit.
    #[serde(default = "default_gas_cost_per_hop")]
    pub gas_cost_per_hop: f64,
    /// Minimum victim price impact for a pending swap to be sandwichable.
    #[serde(default = "default_sandwich_min_price_impact")]
    pub sandwich_min_price_impact: f64,
    /// Minimum victim slippage tolerance (bps) leaving room for a front-run.
    #[serde(default = "default_sandwich_min_victim_slippage_bps")]
    pub sandwich_min_victim_slippage_bps: u32,
    /// Fraction of sandwich profit conceded to competing searchers.
    #[serde(default = "default_sandwich_competition_discount")]
    pub sandwich_competition_discount: f64,
    /// Minimum victim price impact for a pending swap to be worth running
    /// ahead of without a back-run.
    #[serde(default = "default_frontrun_min_price_impact")]
    pub frontrun_min_price_impact: f64,
    /// Collateral/debt ratio below which an account is liquidatable.
    #[serde(default = "default_liquidation_margin")]
    pub liquidation_margin: f64,
    /// Fraction of debt repayable in one liquidation.
    #[serde(default = "default_liquidation_close_factor")]
    pub liquidation_close_factor: f64,
    /// Flat gas cost estimate for a liquidation call.
    #[serde(default = "default_liquidation_gas_cost")]
    pub liquidation_gas_cost: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_routes: default_max_routes(),
            arbitrage_probe_capital: default_probe_capital(),
            dex_fee_bps: default_dex_fee_bps(),
            gas_cost_per_hop: default_gas_cost_per_hop(),
            sandwich_min_price_impact: default_sandwich_min_price_impact(),
            sandwich_min_victim_slippage_bps: default_sandwich_min_victim_slippage_bps(),
            sandwich_competition_discount: default_sandwich_competition_discount(),
            frontrun_min_price_impact: default_frontrun_min_price_impact(),
            liquidation_margin: default_liquidation_margin(),
            liquidation_close_factor: default_liquidation_close_factor(),
            liquidation_gas_cost: default_liquidation_gas_cost(),
        }
    }
}

fn default_max_routes() -> usize {
    3
}
fn default_probe_capital() -> f64 {
    1_000.0
}
fn default_dex_fee_bps() -> u32 {
    30
}
fn default_gas_cost_per_hop() -> f64 {
    5.0
}
fn default_sandwich_min_price_impact() -> f64 {
    0.005
}
fn default_sandwich_min_victim_slippage_bps() -> u32 {
    50
}
fn default_sandwich_competition_discount() -> f64 {
    0.2
}
fn default_frontrun_min_price_impact() -> f64 {
    0.01
}
fn default_liquidation_margin() -> f64 {
    1.1
}
fn default_liquidation_close_factor() -> f64 {
    0.5
}
fn default_liquidation_gas_cost() -> f64 {
    15.0
}

//================================================================================================//
//                                       Recovery Settings                                        //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    /// Fixed delay between failed step attempts.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Upper bound applied when a strategy bumps gas, in percent of the
    /// original gas price.
    #[serde(default = "default_max_gas_multiplier_pct")]
    pub max_gas_multiplier_pct: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            max_gas_multiplier_pct: default_max_gas_multiplier_pct(),
        }
    }
}

impl RecoverySettings {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

fn default_step_delay_ms() -> u64 {
    1_000
}
fn default_max_gas_multiplier_pct() -> u64 {
    150
}

//================================================================================================//
//                                         Risk Weights                                           //
//================================================================================================//

/// Weights of the composite risk score. They are normalized at use, so they
/// need not sum to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    #[serde(default = "default_complexity_weight")]
    pub complexity: f64,
    #[serde(default = "default_competition_weight")]
    pub competition: f64,
    #[serde(default = "default_failure_weight")]
    pub failure: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            complexity: default_complexity_weight(),
            competition: default_competition_weight(),
            failure: default_failure_weight(),
        }
    }
}

fn default_complexity_weight() -> f64 {
    0.3
}
fn default_competition_weight() -> f64 {
    0.3
}
fn default_failure_weight() -> f64 {
    0.4
}
