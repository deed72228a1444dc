//! Arbitrage detector: profitable exchange-rate cycles in the token graph.
//!
//! A cycle is profitable when the sum of `-ln(rate)` over its edges is
//! negative, i.e. the compounded rate product exceeds 1. Enumeration is a
//! depth-first walk bounded by `max_routes` hops; cycles are canonicalized by
//! only starting the walk at the cycle's smallest token address.

use crate::config::EngineSettings;
use crate::engine::MarketGraphs;
use crate::errors::EngineError;
use crate::types::{MEVOpportunity, OpportunityKind};
use ethers::types::Address;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

pub(crate) async fn find_arbitrage(
    market: &MarketGraphs,
    settings: &EngineSettings,
) -> Result<Vec<MEVOpportunity>, EngineError> {
    let mut opportunities = Vec::new();
    let graph = &market.token_graph;

    // Deterministic start order.
    let mut starts: Vec<NodeIndex> = graph.node_indices().collect();
    starts.sort_by_key(|ix| graph[*ix]);

    for start in starts {
        let mut path: Vec<NodeIndex> = vec![start];
        let mut rates: Vec<f64> = Vec::new();
        search_cycles(
            market,
            settings,
            start,
            start,
            settings.max_routes,
            &mut path,
            &mut rates,
            &mut opportunities,
        );
    }

    debug!(
        target: "opportunity_engine",
        cycles = opportunities.len(),
        "arbitrage cycle search finished"
    );
    Ok(opportunities)
}

#[allow(clippy::too_many_arguments)]
fn search_cycles(
    market: &MarketGraphs,
    settings: &EngineSettings,
    start: NodeIndex,
    current: NodeIndex,
    remaining: usize,
    path: &mut Vec<NodeIndex>,
    rates: &mut Vec<f64>,
    out: &mut Vec<MEVOpportunity>,
) {
    if remaining == 0 {
        return;
    }
    let graph = &market.token_graph;
    for edge in graph.edges_directed(current, Direction::Outgoing) {
        let next = edge.target();
        let rate = edge.weight().rate;
        if rate <= 0.0 {
            continue;
        }
        if next == start {
            if path.len() >= 2 {
                rates.push(rate);
                if let Some(opportunity) = score_cycle(market, settings, path, rates) {
                    out.push(opportunity);
                }
                rates.pop();
            }
            continue;
        }
        // Canonical form: the start node is the smallest address in the
        // cycle, so each cycle is reported exactly once.
        if graph[next] < graph[start] || path.contains(&next) {
            continue;
        }
        path.push(next);
        rates.push(rate);
        search_cycles(market, settings, start, next, remaining - 1, path, rates, out);
        rates.pop();
        path.pop();
    }
}

fn score_cycle(
    market: &MarketGraphs,
    settings: &EngineSettings,
    path: &[NodeIndex],
    rates: &[f64],
) -> Option<MEVOpportunity> {
    let log_weight: f64 = rates.iter().map(|r| -r.ln()).sum();
    if log_weight >= 0.0 {
        return None;
    }

    let product: f64 = rates.iter().product();
    let capital = settings.arbitrage_probe_capital;
    let hops = rates.len();
    let gas_cost = settings.gas_cost_per_hop * hops as f64;
    let gross = capital * (product - 1.0);
    let net = gross - gas_cost;
    if net <= 0.0 {
        return None;
    }

    let graph = &market.token_graph;
    let mut tokens: Vec<Address> = path.iter().map(|ix| graph[*ix]).collect();
    tokens.push(graph[path[0]]);

    let mut risk_factors = Vec::new();
    if hops > 2 {
        risk_factors.push("multi_hop_route".to_string());
    }
    if market.venue_count() > 1 {
        risk_factors.push("fragmented_liquidity".to_string());
    }

    Some(MEVOpportunity {
        kind: OpportunityKind::Arbitrage,
        entry_points: tokens.iter().map(|t| format!("{t:?}")).collect(),
        tokens,
        estimated_profit: net,
        required_capital: capital,
        gas_cost,
        complexity: (hops as u8).clamp(1, 10),
        success_probability: 0.95_f64.powi(hops as i32),
        competition_level: 0.5,
        execution_time: 1,
        risk_factors,
        risk_score: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainState, PoolState, ProtocolFields};
    use serde_json::json;
    use std::collections::HashMap;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn dex_state(pools: Vec<PoolState>) -> ChainState {
        let mut fields = ProtocolFields::new();
        fields.insert("protocol_type".into(), json!("dex"));
        fields.insert("pools".into(), serde_json::to_value(&pools).unwrap());
        fields.insert("last_update".into(), json!(1_700_000_000));
        let mut state = ChainState::new(1);
        state.protocol_states = HashMap::from([(addr(100), fields)]);
        state
    }

    fn pool(id: u64, t0: Address, t1: Address, r0: f64, r1: f64) -> PoolState {
        PoolState {
            address: addr(id),
            token0: t0,
            token1: t1,
            reserve0: r0,
            reserve1: r1,
        }
    }

    fn zero_fee_settings() -> EngineSettings {
        EngineSettings {
            dex_fee_bps: 0,
            ..EngineSettings::default()
        }
    }

    #[tokio::test]
    async fn detects_profitable_three_hop_cycle() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        // Rates: A->B 2.0, B->C 2.0, C->A 0.3; product 1.2.
        let state = dex_state(vec![
            pool(10, a, b, 100.0, 200.0),
            pool(11, b, c, 100.0, 200.0),
            pool(12, c, a, 1_000.0, 300.0),
        ]);
        let settings = zero_fee_settings();
        let market = MarketGraphs::from_state(&state, &settings);
        let found = find_arbitrage(&market, &settings).await.unwrap();

        assert_eq!(found.len(), 1);
        let opportunity = &found[0];
        assert_eq!(opportunity.tokens, vec![a, b, c, a]);
        assert!(opportunity.estimated_profit > 0.0);
        assert_eq!(opportunity.complexity, 3);
    }

    #[tokio::test]
    async fn ignores_unprofitable_cycle() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        // Same shape but C->A 0.2; product 0.8.
        let state = dex_state(vec![
            pool(10, a, b, 100.0, 200.0),
            pool(11, b, c, 100.0, 200.0),
            pool(12, c, a, 1_000.0, 200.0),
        ]);
        let settings = zero_fee_settings();
        let market = MarketGraphs::from_state(&state, &settings);
        let found = find_arbitrage(&market, &settings).await.unwrap();

        assert!(found.is_empty());
    }
}
