//! Frontrun detector: large pending swaps worth buying ahead of without a
//! back-run.
//!
//! Unlike a sandwich, the position is held through the victim's execution and
//! marked to the post-victim pool price, so profit is unrealized until the
//! attacker exits on their own schedule. Only swaps priced to be minable in
//! the next block qualify; running ahead of an underpriced transaction is a
//! bet on its eventual inclusion, not a gas-position play.

use crate::config::EngineSettings;
use crate::engine::MarketGraphs;
use crate::errors::EngineError;
use crate::types::{ChainState, MEVOpportunity, OpportunityKind, SwapIntent};
use tracing::debug;

/// Candidate buy sizes swept between zero and the reserve cap.
const FRONTRUN_STEPS: usize = 20;

/// Buy size never exceeds this fraction of the pool's input reserve.
const MAX_RESERVE_FRACTION: f64 = 0.1;

pub(crate) async fn find_frontruns(
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
        let Some((_, pool)) = market.pools.get(&swap.pool) else {
            continue;
        };
        // Gas position: the victim has to be minable for a front position
        // ahead of them to mean anything.
        if pending.gas_price < state.gas_price {
            continue;
        }

        let (reserve_in, reserve_out) = if swap.token_in == pool.token0 {
            (pool.reserve0, pool.reserve1)
        } else if swap.token_in == pool.token1 {
            (pool.reserve1, pool.reserve0)
        } else {
            continue;
        };

        let impact = swap.amount_in / (reserve_in + swap.amount_in);
        if impact < settings.frontrun_min_price_impact {
            continue;
        }

        if let Some((buy, profit)) = best_front_position(swap, reserve_in, reserve_out, fee, settings)
        {
            opportunities.push(MEVOpportunity {
                kind: OpportunityKind::Frontrun,
                entry_points: vec![format!("{:?}", pending.hash)],
                tokens: vec![swap.token_in, swap.token_out],
                estimated_profit: profit,
                required_capital: buy,
                gas_cost: settings.gas_cost_per_hop,
                complexity: 2,
                success_probability: 0.75,
                competition_level: 0.6,
                execution_time: 1,
                risk_factors: vec![
                    "priority_gas_race".to_string(),
                    "unrealized_exit".to_string(),
                ],
                risk_score: 0.0,
            });
        }
    }

    debug!(
        target: "opportunity_engine",
        pending = state.pending_transactions.len(),
        frontruns = opportunities.len(),
        "frontrun scan finished"
    );
    Ok(opportunities)
}

fn amm_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee: f64) -> f64 {
    let effective = amount_in * (1.0 - fee);
    effective * reserve_out / (reserve_in + effective)
}

/// Sweeps buy sizes and returns `(amount_in, unrealized_profit)` for the best
/// one that still lets the victim execute, if any is positive. The acquired
/// tokens are valued at the post-victim marginal pool price.
fn best_front_position(
    swap: &SwapIntent,
    reserve_in: f64,
    reserve_out: f64,
    fee: f64,
    settings: &EngineSettings,
) -> Option<(f64, f64)> {
    let tolerance = swap.max_slippage_bps as f64 / 10_000.0;
    let baseline_out = amm_out(swap.amount_in, reserve_in, reserve_out, fee);
    let max_buy = reserve_in * MAX_RESERVE_FRACTION;

    let mut best: Option<(f64, f64)> = None;
    for step in 1..=FRONTRUN_STEPS {
        let buy = max_buy * step as f64 / FRONTRUN_STEPS as f64;

        let bought = amm_out(buy, reserve_in, reserve_out, fee);
        let r_in = reserve_in + buy;
        let r_out = reserve_out - bought;

        let victim_out = amm_out(swap.amount_in, r_in, r_out, fee);
        if victim_out < baseline_out * (1.0 - tolerance) {
            break;
        }
        let r_in_after = r_in + swap.amount_in;
        let r_out_after = r_out - victim_out;

        // Mark to the moved pool's marginal price; no exit swap is executed.
        let marked = bought * r_in_after / r_out_after;
        let net = marked - buy - settings.gas_cost_per_hop;

        if net > best.map(|(_, p)| p).unwrap_or(0.0) {
            best = Some((buy, net));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn intent(amount_in: f64, max_slippage_bps: u32) -> SwapIntent {
        SwapIntent {
            pool: Address::from_low_u64_be(10),
            token_in: Address::from_low_u64_be(1),
            token_out: Address::from_low_u64_be(2),
            amount_in,
            max_slippage_bps,
        }
    }

    #[test]
    fn large_tolerant_victim_yields_a_position() {
        let settings = EngineSettings::default();
        let (buy, profit) =
            best_front_position(&intent(200.0, 3_000), 1_000.0, 1_000.0, 0.003, &settings)
                .expect("position");
        assert!(buy > 0.0);
        assert!(profit > 0.0);
    }

    #[test]
    fn tight_victim_slippage_leaves_no_position() {
        let settings = EngineSettings::default();
        assert!(
            best_front_position(&intent(200.0, 10), 1_000.0, 1_000.0, 0.003, &settings).is_none()
        );
    }
}
