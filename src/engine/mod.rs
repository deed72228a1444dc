//! # Opportunity Engine
//!
//! Consumes the state cache and builds two request-local auxiliary graphs (a
//! token graph of liquidity-pool edges and a dex graph of venues), then fans
//! the three MEV detectors out concurrently and joins their results. The
//! aggregation layer, not the detectors, decides that a sub-failure is
//! non-fatal: one failing detector degrades to an empty slice and the others
//! are unaffected.

mod arbitrage;
mod competition;
mod frontrun;
mod liquidation;
mod sandwich;

pub use competition::{CompetitionTracker, SearcherStats};

use crate::config::{EngineSettings, RiskWeights};
use crate::errors::EngineError;
use crate::risk;
use crate::state::StateCache;
use crate::types::{ChainState, MEVOpportunity, PoolState, ProtocolType};
use ethers::types::Address;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

//================================================================================================//
//                                        MARKET GRAPHS                                           //
//================================================================================================//

/// One directed exchange-rate edge, contributed by a pool. A pool's reverse
/// direction is a separate pool entry in protocol state, mirroring how the
/// adapter reports oriented markets.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateEdge {
    pub pool: Address,
    pub dex: Address,
    pub rate: f64,
    pub reserve_in: f64,
    pub reserve_out: f64,
}

/// Request-local market view. Built per analysis call from a state snapshot
/// and discarded with it; never shared across concurrent requests.
pub(crate) struct MarketGraphs {
    pub token_graph: DiGraph<Address, RateEdge>,
    pub token_index: HashMap<Address, NodeIndex>,
    /// Venue graph: DEX contracts and their pools as nodes, one edge from a
    /// dex to each pool it hosts.
    pub dex_graph: DiGraph<Address, ()>,
    pub dex_index: HashMap<Address, NodeIndex>,
    /// Pool address -> (hosting dex, pool state).
    pub pools: HashMap<Address, (Address, PoolState)>,
}

impl MarketGraphs {
    pub fn from_state(state: &ChainState, settings: &EngineSettings) -> Self {
        let fee = settings.dex_fee_bps as f64 / 10_000.0;
        let mut token_graph = DiGraph::new();
        let mut token_index: HashMap<Address, NodeIndex> = HashMap::new();
        let mut dex_graph = DiGraph::new();
        let mut dex_index: HashMap<Address, NodeIndex> = HashMap::new();
        let mut pools = HashMap::new();

        // Sorted for deterministic node ordering across identical snapshots.
        let mut dexes: Vec<(&Address, &crate::types::ProtocolFields)> = state
            .protocol_states
            .iter()
            .filter(|(_, fields)| protocol_type_of(fields) == Some(ProtocolType::Dex))
            .collect();
        dexes.sort_by_key(|(address, _)| **address);

        for (dex, fields) in dexes {
            let Some(raw_pools) = fields.get("pools") else {
                continue;
            };
            let parsed: Vec<PoolState> = match serde_json::from_value(raw_pools.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!(target: "opportunity_engine", ?dex, error = %e, "skipping dex with malformed pools field");
                    continue;
                }
            };
            let dex_ix = *dex_index
                .entry(*dex)
                .or_insert_with(|| dex_graph.add_node(*dex));
            for pool in parsed {
                if pool.reserve0 <= 0.0 || pool.reserve1 <= 0.0 {
                    continue;
                }
                let from_ix = *token_index
                    .entry(pool.token0)
                    .or_insert_with(|| token_graph.add_node(pool.token0));
                let to_ix = *token_index
                    .entry(pool.token1)
                    .or_insert_with(|| token_graph.add_node(pool.token1));
                token_graph.add_edge(
                    from_ix,
                    to_ix,
                    RateEdge {
                        pool: pool.address,
                        dex: *dex,
                        rate: pool.reserve1 / pool.reserve0 * (1.0 - fee),
                        reserve_in: pool.reserve0,
                        reserve_out: pool.reserve1,
                    },
                );
                let pool_ix = *dex_index
                    .entry(pool.address)
                    .or_insert_with(|| dex_graph.add_node(pool.address));
                dex_graph.add_edge(dex_ix, pool_ix, ());
                pools.insert(pool.address, (*dex, pool));
            }
        }

        debug!(
            target: "opportunity_engine",
            chain_id = state.chain_id,
            tokens = token_graph.node_count(),
            markets = token_graph.edge_count(),
            venues = dex_graph.node_count(),
            "built market graphs"
        );
        Self {
            token_graph,
            token_index,
            dex_graph,
            dex_index,
            pools,
        }
    }

    /// Number of distinct venues hosting at least one pool.
    pub fn venue_count(&self) -> usize {
        use petgraph::Direction;
        self.dex_graph
            .node_indices()
            .filter(|ix| {
                self.dex_graph
                    .neighbors_directed(*ix, Direction::Outgoing)
                    .next()
                    .is_some()
            })
            .count()
    }
}

fn protocol_type_of(fields: &crate::types::ProtocolFields) -> Option<ProtocolType> {
    fields
        .get("protocol_type")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

//================================================================================================//
//                                      OPPORTUNITY ENGINE                                        //
//================================================================================================//

pub struct OpportunityEngine {
    cache: Arc<StateCache>,
    competition: Arc<CompetitionTracker>,
    settings: EngineSettings,
    weights: RiskWeights,
}

impl OpportunityEngine {
    pub fn new(
        cache: Arc<StateCache>,
        competition: Arc<CompetitionTracker>,
        settings: EngineSettings,
        weights: RiskWeights,
    ) -> Self {
        Self {
            cache,
            competition,
            settings,
            weights,
        }
    }

    pub fn competition(&self) -> &CompetitionTracker {
        &self.competition
    }

    /// Fetches the chain's (possibly refreshed) state and runs all detectors
    /// over it.
    pub async fn detect(&self, chain_id: u64) -> Result<Vec<MEVOpportunity>, EngineError> {
        let state = self.cache.get_state(chain_id).await?;
        Ok(self.detect_on(&state).await)
    }

    /// Runs the four detectors concurrently over a state snapshot, isolates
    /// per-detector failures, annotates risk, and returns the merged list
    /// sorted by estimated profit (descending) with ties broken by ascending
    /// complexity.
    pub async fn detect_on(&self, state: &ChainState) -> Vec<MEVOpportunity> {
        let market = MarketGraphs::from_state(state, &self.settings);

        let (arb, sand, liq, front) = tokio::join!(
            run_detector("arbitrage", arbitrage::find_arbitrage(&market, &self.settings)),
            run_detector(
                "sandwich",
                sandwich::find_sandwiches(&market, state, &self.settings),
            ),
            run_detector(
                "liquidation",
                liquidation::find_liquidations(state, &self.settings),
            ),
            run_detector(
                "frontrun",
                frontrun::find_frontruns(&market, state, &self.settings),
            ),
        );

        let mut merged = Vec::new();
        merged.extend(arb);
        merged.extend(sand);
        merged.extend(liq);
        merged.extend(front);

        self.competition.annotate(&mut merged, market.venue_count());
        for opportunity in &mut merged {
            opportunity.risk_score = risk::composite_risk(opportunity, &self.weights);
        }
        merged.sort_by(|a, b| {
            b.estimated_profit
                .total_cmp(&a.estimated_profit)
                .then(a.complexity.cmp(&b.complexity))
        });
        merged
    }

}

/// Isolation boundary: a detector failure degrades to an empty slice and is
/// logged; sibling detectors are unaffected.
async fn run_detector(
    name: &'static str,
    fut: impl std::future::Future<Output = Result<Vec<MEVOpportunity>, EngineError>>,
) -> Vec<MEVOpportunity> {
    match fut.await {
        Ok(found) => {
            debug!(target: "opportunity_engine", detector = name, found = found.len(), "detector finished");
            found
        }
        Err(e) => {
            warn!(target: "opportunity_engine", detector = name, error = %e, "detector failed, degrading to empty result");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityKind;

    fn stub_opportunity() -> MEVOpportunity {
        MEVOpportunity {
            kind: OpportunityKind::Arbitrage,
            entry_points: Vec::new(),
            tokens: Vec::new(),
            estimated_profit: 1.0,
            required_capital: 1.0,
            gas_cost: 0.0,
            complexity: 1,
            success_probability: 1.0,
            competition_level: 0.0,
            execution_time: 1,
            risk_factors: Vec::new(),
            risk_score: 0.0,
        }
    }

    #[tokio::test]
    async fn detector_failure_degrades_to_empty_result() {
        let ok = run_detector("healthy", async { Ok(vec![stub_opportunity()]) }).await;
        assert_eq!(ok.len(), 1);

        let failed = run_detector("poisoned", async {
            Err(EngineError::Detector {
                detector: "poisoned",
                reason: "corrupt reserves".to_string(),
            })
        })
        .await;
        assert!(failed.is_empty());
    }
}
