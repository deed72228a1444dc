//! Liquidation detector: lending accounts whose collateral ratio has fallen
//! below the liquidation margin. Profit is the liquidator bonus on the
//! repayable tranche, minus gas.

use crate::config::EngineSettings;
use crate::errors::EngineError;
use crate::types::{ChainState, LendingAccount, MEVOpportunity, OpportunityKind, ProtocolType};
use tracing::{debug, warn};

pub(crate) async fn find_liquidations(
    state: &ChainState,
    settings: &EngineSettings,
) -> Result<Vec<MEVOpportunity>, EngineError> {
    let mut opportunities = Vec::new();

    for (protocol, fields) in &state.protocol_states {
        let is_lending = fields
            .get("protocol_type")
            .and_then(|v| serde_json::from_value::<ProtocolType>(v.clone()).ok())
            == Some(ProtocolType::Lending);
        if !is_lending {
            continue;
        }
        let Some(raw_accounts) = fields.get("accounts") else {
            continue;
        };
        let accounts: Vec<LendingAccount> = match serde_json::from_value(raw_accounts.clone()) {
            Ok(a) => a,
            Err(e) => {
                warn!(target: "opportunity_engine", ?protocol, error = %e, "skipping lending protocol with malformed accounts");
                continue;
            }
        };

        for account in accounts {
            if account.debt_value <= 0.0 {
                continue;
            }
            let ratio = account.collateral_value / account.debt_value;
            if ratio >= settings.liquidation_margin {
                continue;
            }
            let repay = account.debt_value * settings.liquidation_close_factor;
            let seized = (repay * (1.0 + account.liquidation_bonus)).min(account.collateral_value);
            let profit = seized - repay - settings.liquidation_gas_cost;
            if profit <= 0.0 {
                continue;
            }
            opportunities.push(MEVOpportunity {
                kind: OpportunityKind::Liquidation,
                entry_points: vec![format!("{:?}", account.address)],
                tokens: Vec::new(),
                estimated_profit: profit,
                required_capital: repay,
                gas_cost: settings.liquidation_gas_cost,
                complexity: 3,
                success_probability: 0.85,
                competition_level: 0.7,
                execution_time: 1,
                risk_factors: vec!["oracle_lag".to_string()],
                risk_score: 0.0,
            });
        }
    }

    debug!(
        target: "opportunity_engine",
        liquidations = opportunities.len(),
        "liquidation scan finished"
    );
    Ok(opportunities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProtocolFields;
    use ethers::types::Address;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn healthy_accounts_are_not_liquidatable() {
        let account = LendingAccount {
            address: Address::from_low_u64_be(9),
            collateral_value: 1_500.0,
            debt_value: 1_000.0,
            liquidation_bonus: 0.08,
        };
        let mut fields = ProtocolFields::new();
        fields.insert("protocol_type".into(), json!("lending"));
        fields.insert("accounts".into(), serde_json::to_value(vec![account]).unwrap());
        let mut state = ChainState::new(1);
        state.protocol_states = HashMap::from([(Address::from_low_u64_be(50), fields)]);

        let found = find_liquidations(&state, &EngineSettings::default())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn undercollateralized_account_yields_bonus_minus_gas() {
        let account = LendingAccount {
            address: Address::from_low_u64_be(9),
            collateral_value: 1_000.0,
            debt_value: 1_000.0,
            liquidation_bonus: 0.08,
        };
        let mut fields = ProtocolFields::new();
        fields.insert("protocol_type".into(), json!("lending"));
        fields.insert("accounts".into(), serde_json::to_value(vec![account]).unwrap());
        let mut state = ChainState::new(1);
        state.protocol_states = HashMap::from([(Address::from_low_u64_be(50), fields)]);

        let settings = EngineSettings::default();
        let found = find_liquidations(&state, &settings).await.unwrap();
        assert_eq!(found.len(), 1);
        // repay 500, seized 540, minus 15 gas.
        assert!((found[0].estimated_profit - 25.0).abs() < 1e-9);
        assert!((found[0].required_capital - 500.0).abs() < 1e-9);
    }
}
