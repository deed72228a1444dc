//! # Risk Scoring
//!
//! Composite risk score for detected opportunities: a normalized weighted
//! combination of complexity, competition level, and inverse success
//! probability. Non-recoverable analysis failures fall back to the maximum
//! score as a conservative signal.

use crate::config::RiskWeights;
use crate::types::MEVOpportunity;

pub const MAX_RISK_SCORE: f64 = 1.0;

/// Normalized 0.0 (low risk) to 1.0 (high risk).
pub fn composite_risk(opportunity: &MEVOpportunity, weights: &RiskWeights) -> f64 {
    let total = weights.complexity + weights.competition + weights.failure;
    if total <= 0.0 {
        return MAX_RISK_SCORE;
    }
    let complexity = (opportunity.complexity as f64 / 10.0).clamp(0.0, 1.0);
    let competition = opportunity.competition_level.clamp(0.0, 1.0);
    let failure = (1.0 - opportunity.success_probability).clamp(0.0, 1.0);
    ((weights.complexity * complexity + weights.competition * competition + weights.failure * failure)
        / total)
        .clamp(0.0, MAX_RISK_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityKind;

    fn opportunity(complexity: u8, competition: f64, success: f64) -> MEVOpportunity {
        MEVOpportunity {
            kind: OpportunityKind::Arbitrage,
            entry_points: Vec::new(),
            tokens: Vec::new(),
            estimated_profit: 1.0,
            required_capital: 1.0,
            gas_cost: 0.0,
            complexity,
            success_probability: success,
            competition_level: competition,
            execution_time: 1,
            risk_factors: Vec::new(),
            risk_score: 0.0,
        }
    }

    #[test]
    fn score_is_bounded() {
        let weights = RiskWeights::default();
        let low = composite_risk(&opportunity(1, 0.0, 1.0), &weights);
        let high = composite_risk(&opportunity(10, 1.0, 0.0), &weights);
        assert!(low >= 0.0 && low < 0.1);
        assert!(high > 0.9 && high <= MAX_RISK_SCORE);
    }

    #[test]
    fn degenerate_weights_default_to_maximum() {
        let weights = RiskWeights {
            complexity: 0.0,
            competition: 0.0,
            failure: 0.0,
        };
        assert_eq!(
            composite_risk(&opportunity(1, 0.0, 1.0), &weights),
            MAX_RISK_SCORE
        );
    }
}
