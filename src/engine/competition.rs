//! Competition analysis: per-searcher success-rate and gas-bidding
//! statistics observed in the mempool, folded into opportunity risk factors.

use crate::types::MEVOpportunity;
use dashmap::DashMap;
use ethers::types::Address;

/// Competition level above which opportunities get flagged.
const INTENSE_COMPETITION: f64 = 0.7;

/// Average gas bid (gwei) above which the market counts as a gas auction.
const GAS_AUCTION_GWEI: f64 = 100.0;

#[derive(Debug, Clone, Default)]
pub struct SearcherStats {
    pub observed: u64,
    pub successes: u64,
    pub gas_bid_sum_gwei: f64,
}

impl SearcherStats {
    pub fn success_rate(&self) -> f64 {
        if self.observed == 0 {
            0.0
        } else {
            self.successes as f64 / self.observed as f64
        }
    }

    pub fn avg_gas_bid_gwei(&self) -> f64 {
        if self.observed == 0 {
            0.0
        } else {
            self.gas_bid_sum_gwei / self.observed as f64
        }
    }
}

/// Long-lived, concurrently updated registry of observed searchers.
#[derive(Default)]
pub struct CompetitionTracker {
    searchers: DashMap<Address, SearcherStats>,
}

impl CompetitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observed searcher bundle outcome.
    pub fn record(&self, searcher: Address, success: bool, gas_bid_gwei: f64) {
        let mut stats = self.searchers.entry(searcher).or_default();
        stats.observed += 1;
        if success {
            stats.successes += 1;
        }
        stats.gas_bid_sum_gwei += gas_bid_gwei;
    }

    pub fn searcher_count(&self) -> usize {
        self.searchers.len()
    }

    pub fn stats_for(&self, searcher: Address) -> Option<SearcherStats> {
        self.searchers.get(&searcher).map(|s| s.clone())
    }

    /// Aggregate competition level on a 0-1 scale: scaled count of active
    /// searchers weighted by their historical success.
    pub fn level(&self) -> f64 {
        if self.searchers.is_empty() {
            return 0.0;
        }
        let avg_success: f64 = self
            .searchers
            .iter()
            .map(|s| s.success_rate())
            .sum::<f64>()
            / self.searchers.len() as f64;
        ((self.searchers.len() as f64 / 5.0) * avg_success).min(1.0)
    }

    fn avg_gas_bid_gwei(&self) -> f64 {
        if self.searchers.is_empty() {
            return 0.0;
        }
        self.searchers
            .iter()
            .map(|s| s.avg_gas_bid_gwei())
            .sum::<f64>()
            / self.searchers.len() as f64
    }

    /// Raises each opportunity's competition level to the observed aggregate
    /// and appends competition-derived risk factors.
    pub fn annotate(&self, opportunities: &mut [MEVOpportunity], venue_count: usize) {
        let level = self.level();
        let gas_auction = self.avg_gas_bid_gwei() > GAS_AUCTION_GWEI;
        for opportunity in opportunities {
            opportunity.competition_level = opportunity.competition_level.max(level);
            if opportunity.competition_level > INTENSE_COMPETITION {
                opportunity.risk_factors.push("intense_competition".to_string());
            }
            if gas_auction {
                opportunity.risk_factors.push("gas_auction_pressure".to_string());
            }
            if venue_count > 1 && !opportunity.risk_factors.iter().any(|f| f == "fragmented_liquidity")
            {
                opportunity.risk_factors.push("fragmented_liquidity".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn success_rate_tracks_observations() {
        let tracker = CompetitionTracker::new();
        tracker.record(addr(1), true, 50.0);
        tracker.record(addr(1), false, 150.0);
        let stats = tracker.stats_for(addr(1)).unwrap();
        assert_eq!(stats.observed, 2);
        assert!((stats.success_rate() - 0.5).abs() < 1e-9);
        assert!((stats.avg_gas_bid_gwei() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn level_is_zero_without_observations() {
        let tracker = CompetitionTracker::new();
        assert_eq!(tracker.level(), 0.0);
    }
}
