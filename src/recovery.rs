//! # Error Recovery Coordinator
//!
//! Maps categorized chain failures onto priority-ordered remediation
//! strategies. A strategy only runs if its applicability predicate holds for
//! the failure context; each step is attempted up to `max_attempts` times
//! with a fixed inter-attempt delay, and an exhausted strategy hands off to
//! its configured fallback exactly once before the operation is reported as
//! failed. Results are appended to a bounded per-recovery-id history.

use crate::chain::ChainAdapter;
use crate::config::RecoverySettings;
use crate::errors::{ChainError, ErrorCategory, RecoveryError};
use crate::state::StateCache;
use crate::types::RecoveryResult;
use chrono::Utc;
use dashmap::DashMap;
use ethers::types::{TransactionRequest, U256};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Most recent results kept per recovery id.
const HISTORY_LIMIT: usize = 10;

/// Default whole-strategy deadline.
const STRATEGY_TIMEOUT: Duration = Duration::from_secs(60);

/// Fallback send-and-inclusion deadline when the chain has no configured
/// settings.
const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

//================================================================================================//
//                                      STRATEGY DEFINITIONS                                      //
//================================================================================================//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepAction {
    /// Resend the failed transaction unchanged.
    RetrySend,
    /// Bump gas price (bounded by the configured multiplier) and resend.
    AdjustGas,
    /// Increment the nonce and resend.
    Resubmit,
    /// Force a cache refresh for the chain.
    Resync,
    /// Bounded rollback: drop cached protocol fields, then refetch.
    Rollback,
}

#[derive(Debug, Clone)]
struct RecoveryStep {
    action: StepAction,
    max_attempts: u32,
}

#[derive(Debug, Clone)]
struct RecoveryStrategy {
    name: &'static str,
    steps: Vec<RecoveryStep>,
    timeout: Duration,
    fallback: Option<&'static str>,
}

impl RecoveryStrategy {
    /// A strategy is skipped when the failure context cannot satisfy its
    /// steps (e.g. gas adjustment without a priced transaction).
    fn applicable(&self, context: &FailureContext) -> bool {
        self.steps.iter().all(|step| match step.action {
            StepAction::RetrySend => context.transaction.is_some(),
            StepAction::AdjustGas => context
                .transaction
                .as_ref()
                .map(|tx| tx.gas_price.is_some())
                .unwrap_or(false),
            StepAction::Resubmit => context
                .transaction
                .as_ref()
                .map(|tx| tx.nonce.is_some())
                .unwrap_or(false),
            StepAction::Resync | StepAction::Rollback => true,
        })
    }
}

/// Context the caller captured at the failure site.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    pub description: String,
    pub transaction: Option<TransactionRequest>,
}

impl FailureContext {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            transaction: None,
        }
    }

    pub fn with_transaction(mut self, tx: TransactionRequest) -> Self {
        self.transaction = Some(tx);
        self
    }
}

/// Stable identifier for a (failure, context) pair; history is keyed by it.
pub fn recovery_id(error: &ChainError, context: &FailureContext) -> u64 {
    let mut hasher = DefaultHasher::new();
    error.to_string().hash(&mut hasher);
    context.description.hash(&mut hasher);
    hasher.finish()
}

//================================================================================================//
//                                        COORDINATOR                                             //
//================================================================================================//

pub struct ErrorRecoveryCoordinator {
    adapter: Arc<dyn ChainAdapter>,
    cache: Arc<StateCache>,
    settings: RecoverySettings,
    strategies: HashMap<ErrorCategory, Vec<RecoveryStrategy>>,
    history: DashMap<u64, VecDeque<RecoveryResult>>,
}

impl ErrorRecoveryCoordinator {
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        cache: Arc<StateCache>,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            adapter,
            cache,
            settings,
            strategies: default_strategies(),
            history: DashMap::new(),
        }
    }

    /// Runs the first applicable strategy for the error's category to
    /// completion or exhaustion, then records and returns the result.
    pub async fn handle_error(
        &self,
        error: &ChainError,
        context: &FailureContext,
        chain_id: u64,
    ) -> RecoveryResult {
        let started = Instant::now();
        let category = error.category();
        let id = recovery_id(error, context);

        let result = match category {
            ErrorCategory::Unknown => RecoveryResult {
                success: false,
                strategy_used: "none".to_string(),
                attempts_made: 0,
                error_details: Some(format!("non-recoverable: {error}")),
                state_changes: HashMap::new(),
                elapsed: started.elapsed(),
                completed_at: Utc::now(),
            },
            _ => self.run_category(category, context, chain_id, started).await,
        };

        if result.success {
            info!(
                target: "recovery",
                chain_id,
                %category,
                strategy = %result.strategy_used,
                attempts = result.attempts_made,
                "recovery succeeded"
            );
        } else {
            warn!(
                target: "recovery",
                chain_id,
                %category,
                strategy = %result.strategy_used,
                attempts = result.attempts_made,
                error = ?result.error_details,
                "recovery failed"
            );
        }

        let mut entry = self.history.entry(id).or_default();
        entry.push_back(result.clone());
        while entry.len() > HISTORY_LIMIT {
            entry.pop_front();
        }
        result
    }

    /// History for a (failure, context) pair, oldest first.
    pub fn history_for(&self, error: &ChainError, context: &FailureContext) -> Vec<RecoveryResult> {
        self.history
            .get(&recovery_id(error, context))
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn run_category(
        &self,
        category: ErrorCategory,
        context: &FailureContext,
        chain_id: u64,
        started: Instant,
    ) -> RecoveryResult {
        let strategies = match self.strategies.get(&category) {
            Some(s) => s,
            None => {
                return failure_result(
                    "none",
                    0,
                    RecoveryError::NoApplicableStrategy(category).to_string(),
                    started,
                )
            }
        };
        let selected = match strategies.iter().find(|s| s.applicable(context)) {
            Some(s) => s,
            None => {
                return failure_result(
                    "none",
                    0,
                    RecoveryError::NoApplicableStrategy(category).to_string(),
                    started,
                )
            }
        };

        let mut run = StrategyRun::new(context);
        let primary_ok = self.run_strategy(selected, chain_id, &mut run).await;

        let mut strategy_used = selected.name.to_string();
        let mut succeeded = primary_ok;
        if !primary_ok {
            if let Some(fallback_name) = selected.fallback {
                if let Some(fallback) = strategies.iter().find(|s| s.name == fallback_name) {
                    if fallback.applicable(context) {
                        debug!(
                            target: "recovery",
                            chain_id,
                            primary = selected.name,
                            fallback = fallback_name,
                            "primary strategy exhausted, running fallback once"
                        );
                        succeeded = self.run_strategy(fallback, chain_id, &mut run).await;
                        strategy_used = format!("{}->{}", selected.name, fallback_name);
                    }
                }
            }
        }

        let state_changes = if succeeded {
            run.transaction
                .as_ref()
                .map(|tx| self.cache.expected_delta(tx))
                .unwrap_or_default()
        } else {
            HashMap::new()
        };

        RecoveryResult {
            success: succeeded,
            strategy_used,
            attempts_made: run.attempts,
            error_details: if succeeded { None } else { run.last_error },
            state_changes,
            elapsed: started.elapsed(),
            completed_at: Utc::now(),
        }
    }

    /// Executes every step of a strategy in order; returns false as soon as a
    /// step exhausts its attempts. Runs under the strategy's deadline.
    async fn run_strategy(
        &self,
        strategy: &RecoveryStrategy,
        chain_id: u64,
        run: &mut StrategyRun,
    ) -> bool {
        let deadline = tokio::time::timeout(
            strategy.timeout,
            self.run_strategy_steps(strategy, chain_id, run),
        )
        .await;
        match deadline {
            Ok(ok) => ok,
            Err(_) => {
                run.last_error = Some(RecoveryError::Timeout(strategy.timeout).to_string());
                false
            }
        }
    }

    async fn run_strategy_steps(
        &self,
        strategy: &RecoveryStrategy,
        chain_id: u64,
        run: &mut StrategyRun,
    ) -> bool {
        for step in &strategy.steps {
            let mut step_ok = false;
            for attempt in 1..=step.max_attempts {
                run.attempts += 1;
                match self.execute_step(step.action, chain_id, run).await {
                    Ok(()) => {
                        step_ok = true;
                        break;
                    }
                    Err(e) => {
                        debug!(
                            target: "recovery",
                            chain_id,
                            strategy = strategy.name,
                            action = ?step.action,
                            attempt,
                            error = %e,
                            "step attempt failed"
                        );
                        run.last_error = Some(e.to_string());
                        if attempt < step.max_attempts {
                            tokio::time::sleep(self.settings.step_delay()).await;
                        }
                    }
                }
            }
            if !step_ok {
                return false;
            }
        }
        true
    }

    async fn execute_step(
        &self,
        action: StepAction,
        chain_id: u64,
        run: &mut StrategyRun,
    ) -> Result<(), RecoveryError> {
        match action {
            StepAction::RetrySend => self.send(chain_id, run).await,
            StepAction::AdjustGas => {
                let tx = run
                    .transaction
                    .as_mut()
                    .ok_or(RecoveryError::NoApplicableStrategy(ErrorCategory::TransactionFailure))?;
                let current = tx.gas_price.unwrap_or_else(U256::zero);
                let original = *run.original_gas_price.get_or_insert(current);
                let cap = original * U256::from(self.settings.max_gas_multiplier_pct) / 100u64;
                let bumped = (current + current / 4u64).min(cap);
                tx.gas_price = Some(bumped);
                self.send(chain_id, run).await
            }
            StepAction::Resubmit => {
                let tx = run
                    .transaction
                    .as_mut()
                    .ok_or(RecoveryError::NoApplicableStrategy(ErrorCategory::TransactionFailure))?;
                let nonce = tx.nonce.unwrap_or_else(U256::zero);
                tx.nonce = Some(nonce + U256::one());
                self.send(chain_id, run).await
            }
            StepAction::Resync => {
                self.cache
                    .force_resync(chain_id)
                    .await
                    .map_err(|e| RecoveryError::Chain(ChainError::InvalidState(e.to_string())))
            }
            StepAction::Rollback => {
                self.cache
                    .rollback(chain_id)
                    .await
                    .map_err(|e| RecoveryError::Chain(ChainError::InvalidState(e.to_string())))
            }
        }
    }

    async fn send(&self, chain_id: u64, run: &mut StrategyRun) -> Result<(), RecoveryError> {
        let tx = run
            .transaction
            .clone()
            .ok_or(RecoveryError::NoApplicableStrategy(ErrorCategory::TransactionFailure))?;
        // Adapters report the inclusion outcome, so the deadline is the
        // receipt wait, not the plain RPC call timeout.
        let limit = self
            .cache
            .chain_settings(chain_id)
            .map(|s| s.receipt_timeout())
            .unwrap_or(DEFAULT_RECEIPT_TIMEOUT);
        let outcome = tokio::time::timeout(limit, self.adapter.send_transaction(chain_id, tx))
            .await
            .map_err(|_| RecoveryError::Chain(ChainError::Timeout(limit)))??;
        if outcome.success {
            Ok(())
        } else {
            Err(RecoveryError::Chain(ChainError::Revert(format!(
                "transaction {:?} included but failed",
                outcome.tx_hash
            ))))
        }
    }
}

/// Mutable per-run scratch: the evolving transaction and attempt bookkeeping.
struct StrategyRun {
    transaction: Option<TransactionRequest>,
    original_gas_price: Option<U256>,
    attempts: u32,
    last_error: Option<String>,
}

impl StrategyRun {
    fn new(context: &FailureContext) -> Self {
        Self {
            transaction: context.transaction.clone(),
            original_gas_price: None,
            attempts: 0,
            last_error: None,
        }
    }
}

fn failure_result(
    strategy: &str,
    attempts: u32,
    error: String,
    started: Instant,
) -> RecoveryResult {
    RecoveryResult {
        success: false,
        strategy_used: strategy.to_string(),
        attempts_made: attempts,
        error_details: Some(error),
        state_changes: HashMap::new(),
        elapsed: started.elapsed(),
        completed_at: Utc::now(),
    }
}

fn default_strategies() -> HashMap<ErrorCategory, Vec<RecoveryStrategy>> {
    let mut table = HashMap::new();
    table.insert(
        ErrorCategory::TransactionFailure,
        vec![
            RecoveryStrategy {
                name: "retry",
                steps: vec![RecoveryStep {
                    action: StepAction::RetrySend,
                    max_attempts: 3,
                }],
                timeout: STRATEGY_TIMEOUT,
                fallback: Some("adjust_gas"),
            },
            RecoveryStrategy {
                name: "adjust_gas",
                steps: vec![RecoveryStep {
                    action: StepAction::AdjustGas,
                    max_attempts: 2,
                }],
                timeout: STRATEGY_TIMEOUT,
                fallback: Some("resubmit"),
            },
            RecoveryStrategy {
                name: "resubmit",
                steps: vec![RecoveryStep {
                    action: StepAction::Resubmit,
                    max_attempts: 2,
                }],
                timeout: STRATEGY_TIMEOUT,
                fallback: None,
            },
        ],
    );
    table.insert(
        ErrorCategory::StateInconsistency,
        vec![
            RecoveryStrategy {
                name: "resync",
                steps: vec![RecoveryStep {
                    action: StepAction::Resync,
                    max_attempts: 3,
                }],
                timeout: STRATEGY_TIMEOUT,
                fallback: Some("rollback"),
            },
            RecoveryStrategy {
                name: "rollback",
                steps: vec![RecoveryStep {
                    action: StepAction::Rollback,
                    max_attempts: 1,
                }],
                timeout: STRATEGY_TIMEOUT,
                fallback: None,
            },
        ],
    );
    table.insert(
        ErrorCategory::ProtocolError,
        vec![
            RecoveryStrategy {
                name: "parameter_retry",
                steps: vec![
                    RecoveryStep {
                        action: StepAction::Resync,
                        max_attempts: 1,
                    },
                    RecoveryStep {
                        action: StepAction::RetrySend,
                        max_attempts: 2,
                    },
                ],
                timeout: STRATEGY_TIMEOUT,
                fallback: None,
            },
            RecoveryStrategy {
                name: "state_refresh",
                steps: vec![RecoveryStep {
                    action: StepAction::Resync,
                    max_attempts: 2,
                }],
                timeout: STRATEGY_TIMEOUT,
                fallback: None,
            },
        ],
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_with(gas: Option<u64>, nonce: Option<u64>) -> FailureContext {
        let mut tx = TransactionRequest::new();
        if let Some(g) = gas {
            tx = tx.gas_price(g);
        }
        if let Some(n) = nonce {
            tx = tx.nonce(n);
        }
        FailureContext::new("test failure").with_transaction(tx)
    }

    #[test]
    fn adjust_gas_requires_priced_transaction() {
        let table = default_strategies();
        let strategies = &table[&ErrorCategory::TransactionFailure];
        let adjust = strategies.iter().find(|s| s.name == "adjust_gas").unwrap();

        assert!(adjust.applicable(&tx_with(Some(100), None)));
        assert!(!adjust.applicable(&tx_with(None, None)));
        assert!(!adjust.applicable(&FailureContext::new("no tx")));
    }

    #[test]
    fn resubmit_requires_nonce() {
        let table = default_strategies();
        let strategies = &table[&ErrorCategory::TransactionFailure];
        let resubmit = strategies.iter().find(|s| s.name == "resubmit").unwrap();

        assert!(resubmit.applicable(&tx_with(None, Some(7))));
        assert!(!resubmit.applicable(&tx_with(Some(100), None)));
    }

    #[test]
    fn recovery_id_is_stable_per_pair() {
        let error = ChainError::NonceTooLow(None);
        let ctx = FailureContext::new("send path");
        assert_eq!(recovery_id(&error, &ctx), recovery_id(&error, &ctx));
        assert_ne!(
            recovery_id(&error, &ctx),
            recovery_id(&error, &FailureContext::new("other path"))
        );
    }
}
