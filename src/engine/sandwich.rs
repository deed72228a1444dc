//! Sandwich detector: pending swaps with enough price impact to profitably
//! front- and back-run.
//!
//! Sizing uses a constant-product simulation: candidate front-run amounts are
//! swept, the victim's execution is checked against their slippage tolerance
//! (a front-run that reverts the victim earns nothing), and the best net
//! profit after gas and competition discount is kept.

use crate::config::EngineSettings;
use crate::engine::MarketGraphs;
use crate::errors::EngineError;
use crate::types::{ChainState, MEVOpportunity, OpportunityKind, SwapIntent};
use tracing::debug;

/// Candidate front-run sizes swept between zero and the reserve cap.
const FRONTRUN_STEPS: usize = 20;

/// Front-run input never exceeds this fraction of the pool's input reserve.
const MAX_FRONTRUN_RESERVE_FRACTION: f64 = 0.1;

pub(crate) async fn find_sandwiches(
    market: &MarketGraphs,
    state: &ChainState,
    settings: &EngineSettings,
) -> Result<Vec<MEVOpportunity>, EngineError> {
    let fee = settings.dex_fee_bps as f64 / 10_000.0;
    let mut opportunities = Vec::new();

    for pending in &state.pending_transactions {
        let Some(swap) = &pending.swap else {
            continue;
        };
        // The mempool is chain-wide while only the analyzed protocols are
        // tracked; swaps against pools we do not know are the normal case.
        let Some((_, pool)) = market.pools.get(&swap.pool) else {
            continue;
        };

        let (reserve_in, reserve_out) = if swap.token_in == pool.token0 {
            (pool.reserve0, pool.reserve1)
        } else if swap.token_in == pool.token1 {
            (pool.reserve1, pool.reserve0)
        } else {
            debug!(
                target: "opportunity_engine",
                pool = ?swap.pool,
                token_in = ?swap.token_in,
                "skipping pending swap with token not in referenced pool"
            );
            continue;
        };

        let impact = swap.amount_in / (reserve_in + swap.amount_in);
        if impact < settings.sandwich_min_price_impact
            || swap.max_slippage_bps < settings.sandwich_min_victim_slippage_bps
        {
            continue;
        }

        if let Some((frontrun, profit)) =
            optimal_frontrun(swap, reserve_in, reserve_out, fee, settings)
        {
            let gas_cost = 2.0 * settings.gas_cost_per_hop;
            let mut risk_factors = vec!["competitive_mempool".to_string()];
            if frontrun >= reserve_in * MAX_FRONTRUN_RESERVE_FRACTION * 0.95 {
                risk_factors.push("victim_revert_margin".to_string());
            }
            opportunities.push(MEVOpportunity {
                kind: OpportunityKind::Sandwich,
                entry_points: vec![format!("{:?}", pending.hash)],
                tokens: vec![swap.token_in, swap.token_out],
                estimated_profit: profit,
                required_capital: frontrun,
                gas_cost,
                complexity: 4,
                success_probability: 0.8,
                competition_level: 0.6,
                execution_time: 1,
                risk_factors,
                risk_score: 0.0,
            });
        }
    }

    debug!(
        target: "opportunity_engine",
        pending = state.pending_transactions.len(),
        sandwiches = opportunities.len(),
        "sandwich scan finished"
    );
    Ok(opportunities)
}

fn amm_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee: f64) -> f64 {
    let effective = amount_in * (1.0 - fee);
    effective * reserve_out / (reserve_in + effective)
}

/// Sweeps front-run sizes and returns `(amount_in, net_profit)` for the most
/// profitable one that still lets the victim execute, if any is positive.
fn optimal_frontrun(
    swap: &SwapIntent,
    reserve_in: f64,
    reserve_out: f64,
    fee: f64,
    settings: &EngineSettings,
) -> Option<(f64, f64)> {
    let tolerance = swap.max_slippage_bps as f64 / 10_000.0;
    let baseline_out = amm_out(swap.amount_in, reserve_in, reserve_out, fee);
    let max_frontrun = reserve_in * MAX_FRONTRUN_RESERVE_FRACTION;
    let gas_cost = 2.0 * settings.gas_cost_per_hop;

    let mut best: Option<(f64, f64)> = None;
    for step in 1..=FRONTRUN_STEPS {
        let frontrun = max_frontrun * step as f64 / FRONTRUN_STEPS as f64;

        // Attacker buys first.
        let bought = amm_out(frontrun, reserve_in, reserve_out, fee);
        let r_in = reserve_in + frontrun;
        let r_out = reserve_out - bought;

        // Victim executes only within their slippage tolerance.
        let victim_out = amm_out(swap.amount_in, r_in, r_out, fee);
        if victim_out < baseline_out * (1.0 - tolerance) {
            break;
        }
        let r_in_after = r_in + swap.amount_in;
        let r_out_after = r_out - victim_out;

        // Attacker sells back into the moved pool.
        let back_out = amm_out(bought, r_out_after, r_in_after, fee);
        let net = (back_out - frontrun) * (1.0 - settings.sandwich_competition_discount) - gas_cost;

        if net > best.map(|(_, p)| p).unwrap_or(0.0) {
            best = Some((frontrun, net));
        }
    }
    best
}
