//! Distribution Jobs
//!
//! Operator-triggered batch pass that tops every registered address up to a
//! target balance. Each address goes through the same reconciler as
//! onboarding, so addresses already at target are left alone and a rerun
//! after a partial pass only sends what is still missing.
//!
//! By default a faucet that cannot cover everyone funds recipients in
//! directory order until it runs out. [`SplitPolicy::Even`] instead caps each
//! send at an equal share of what the faucet can give.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::directory::{DirectoryEntry, DirectoryError, UserDirectory};
use crate::domain::{Address, BaseUnits, OutcomeStatus, StepResult, Unit};
use crate::gateway::{GatewayError, LedgerGateway};
use crate::onboarding::outcome_from_error;
use crate::reconciler::{amount_to_send, BalanceReconciler, TransferPlan};

/// Reason recorded for addresses after the pass stopped early
const NOT_ATTEMPTED: &str = "not attempted: distribution stopped early";

/// How a pass shares a faucet that cannot cover every shortfall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Top up in directory order until the faucet runs out
    #[default]
    FirstCome,
    /// Cap every send at an equal share of the distributable balance
    Even,
}

// =========================================================================
// Reports
// =========================================================================

/// One address in a distribution pass
#[derive(Debug, Clone, Serialize)]
pub struct DistributionEntry {
    pub username: String,
    pub address: Address,
    pub result: StepResult,
}

/// Report from running a distribution pass
#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    pub unit: Unit,
    pub target: Decimal,
    pub split: SplitPolicy,
    /// Per-recipient cap when the faucet was split evenly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<Decimal>,
    pub funded: usize,
    pub already_funded: usize,
    pub failed: usize,
    /// Display units actually confirmed
    pub total_sent: Decimal,
    pub faucet_before: Decimal,
    pub faucet_after: Decimal,
    pub entries: Vec<DistributionEntry>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl DistributionReport {
    pub fn not_attempted(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_skipped()).count()
    }
}

/// A transfer the pass would make
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTransfer {
    pub username: String,
    pub address: Address,
    pub current: Decimal,
    pub amount: Decimal,
    pub partial: bool,
}

/// Dry-run result: what a pass would send, without submitting anything
#[derive(Debug, Clone, Serialize)]
pub struct DistributionPlan {
    pub unit: Unit,
    pub target: Decimal,
    pub split: SplitPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<Decimal>,
    pub faucet_balance: Decimal,
    pub transfers: Vec<PlannedTransfer>,
    pub already_funded: usize,
    pub total: Decimal,
    /// Index of the first address the faucet could not cover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exhausted_at: Option<usize>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Ledger error: {0}")]
    Gateway(#[from] GatewayError),
}

// =========================================================================
// Distribution pass
// =========================================================================

/// Tops up every directory address, one at a time.
pub struct DistributionJob {
    reconciler: BalanceReconciler,
    directory: Arc<dyn UserDirectory>,
    split: SplitPolicy,
}

impl DistributionJob {
    pub fn new(reconciler: BalanceReconciler, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            reconciler,
            directory,
            split: SplitPolicy::default(),
        }
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        self.reconciler.gateway()
    }

    fn display(&self, amount: BaseUnits, unit: Unit) -> Decimal {
        amount.to_display(self.gateway().decimals(unit))
    }

    /// Directory entries minus the faucet itself
    async fn recipients(&self) -> Result<Vec<DirectoryEntry>, JobError> {
        let faucet = self.gateway().faucet_address().clone();
        let entries = self.directory.list_all_addresses().await?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                let is_faucet = entry.address == faucet;
                if is_faucet {
                    tracing::debug!(username = %entry.username, "Skipping faucet account");
                }
                !is_faucet
            })
            .collect())
    }

    /// Per-recipient cap for this pass, if the faucet has to be shared.
    async fn share(
        &self,
        unit: Unit,
        target: BaseUnits,
        recipients: &[DirectoryEntry],
    ) -> Result<Option<BaseUnits>, JobError> {
        if self.split == SplitPolicy::FirstCome {
            return Ok(None);
        }

        let gateway = self.gateway();
        let mut short: u128 = 0;
        let mut needed = BaseUnits::ZERO;
        for entry in recipients {
            let current = gateway.read_balance(&entry.address, unit).await?;
            let missing = amount_to_send(current, target);
            if !missing.is_zero() {
                short += 1;
                needed = needed.saturating_add(missing);
            }
        }
        if short == 0 {
            return Ok(None);
        }

        let funds = self.reconciler.faucet_funds(unit).await?;
        let config = self.reconciler.config();
        let distributable = match unit {
            Unit::Currency => {
                let fees = BaseUnits(funds.fee.value().saturating_mul(short));
                funds
                    .balance
                    .saturating_sub(config.reserve_currency.saturating_add(fees))
            }
            Unit::Token => funds.balance.saturating_sub(config.reserve_token),
        };
        if distributable >= needed {
            return Ok(None);
        }

        let share = BaseUnits(distributable.value() / short);
        tracing::info!(%unit, recipients = short, %needed, %distributable, %share, "Splitting faucet evenly");
        Ok(Some(share))
    }

    /// Run the pass, stopping at the first exhausted or unreachable ledger.
    pub async fn run(&self, unit: Unit, target: BaseUnits) -> Result<DistributionReport, JobError> {
        let gateway = self.gateway();
        let faucet = gateway.faucet_address();
        let recipients = self.recipients().await?;
        let faucet_before = gateway.read_balance(faucet, unit).await?;
        let share = self.share(unit, target, &recipients).await?;

        tracing::info!(
            %unit, %target, recipients = recipients.len(), faucet = %faucet_before,
            split = ?self.split,
            "Distribution pass started"
        );

        let mut report = DistributionReport {
            unit,
            target: self.display(target, unit),
            split: self.split,
            share: share.map(|cap| self.display(cap, unit)),
            funded: 0,
            already_funded: 0,
            failed: 0,
            total_sent: Decimal::ZERO,
            faucet_before: self.display(faucet_before, unit),
            faucet_after: self.display(faucet_before, unit),
            entries: Vec::with_capacity(recipients.len()),
            errors: Vec::new(),
            completed_at: Utc::now(),
        };

        let mut stopped = false;
        for DirectoryEntry { username, address } in recipients {
            if stopped {
                report.entries.push(DistributionEntry {
                    username,
                    address,
                    result: StepResult::Skipped {
                        reason: NOT_ATTEMPTED.to_string(),
                    },
                });
                continue;
            }

            let outcome = match self
                .reconciler
                .reconcile_capped(&address, target, unit, share)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => outcome_from_error(unit, &err),
            };

            match outcome.status {
                OutcomeStatus::Confirmed => {
                    report.funded += 1;
                    report.total_sent += outcome.amount;
                }
                OutcomeStatus::AlreadyFunded => report.already_funded += 1,
                status => {
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("{} ({}): {}", username, address, outcome.message));
                    if matches!(
                        status,
                        OutcomeStatus::FaucetExhausted | OutcomeStatus::GatewayUnavailable
                    ) {
                        tracing::warn!(%username, %address, %status, "Stopping distribution pass");
                        stopped = true;
                    }
                }
            }

            report.entries.push(DistributionEntry {
                username,
                address,
                result: StepResult::Attempted(outcome),
            });
        }

        match gateway.read_balance(faucet, unit).await {
            Ok(balance) => report.faucet_after = self.display(balance, unit),
            Err(e) => report.errors.push(format!("Faucet balance after pass: {}", e)),
        }
        report.completed_at = Utc::now();

        tracing::info!(
            %unit,
            funded = report.funded,
            already_funded = report.already_funded,
            failed = report.failed,
            not_attempted = report.not_attempted(),
            total_sent = %report.total_sent,
            "Distribution pass finished"
        );
        Ok(report)
    }

    /// Plan the pass against current balances without submitting.
    ///
    /// The faucet balance and its gas are drawn down locally as each
    /// transfer is planned.
    pub async fn plan(&self, unit: Unit, target: BaseUnits) -> Result<DistributionPlan, JobError> {
        let gateway = self.gateway();
        let config = self.reconciler.config();
        let recipients = self.recipients().await?;
        let mut funds = self.reconciler.faucet_funds(unit).await?;
        let share = self.share(unit, target, &recipients).await?;

        let mut plan = DistributionPlan {
            unit,
            target: self.display(target, unit),
            split: self.split,
            share: share.map(|cap| self.display(cap, unit)),
            faucet_balance: self.display(funds.balance, unit),
            transfers: Vec::new(),
            already_funded: 0,
            total: Decimal::ZERO,
            exhausted_at: None,
        };

        for (index, DirectoryEntry { username, address }) in recipients.into_iter().enumerate() {
            let current = gateway.read_balance(&address, unit).await?;
            match config.plan(unit, current, target, funds).capped(share) {
                TransferPlan::AlreadyFunded => plan.already_funded += 1,
                TransferPlan::Send { amount, partial } => {
                    funds = funds.after_send(unit, amount);
                    plan.total += self.display(amount, unit);
                    plan.transfers.push(PlannedTransfer {
                        username,
                        address,
                        current: self.display(current, unit),
                        amount: self.display(amount, unit),
                        partial,
                    });
                }
                TransferPlan::Exhausted { .. } | TransferPlan::FeeUnaffordable { .. } => {
                    plan.exhausted_at = Some(index);
                    break;
                }
            }
        }

        Ok(plan)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::directory::InMemoryDirectory;
    use crate::gateway::InMemoryLedger;
    use crate::reconciler::ReconcilerConfig;
    use rust_decimal_macros::dec;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    async fn setup(faucet_tokens: u128, reserve: u128, users: u8) -> (Arc<InMemoryLedger>, DistributionJob) {
        let ledger = Arc::new(InMemoryLedger::new(addr(0xfa), 0));
        ledger.set_balance(&addr(0xfa), Unit::Token, BaseUnits(faucet_tokens)).await;
        ledger.set_balance(&addr(0xfa), Unit::Currency, BaseUnits(1_000)).await;

        let directory = Arc::new(InMemoryDirectory::new());
        for n in 1..=users {
            directory.insert(&format!("user{}", n), addr(n)).await;
        }
        directory.insert("faucet", addr(0xfa)).await;

        let reconciler = BalanceReconciler::new(
            ledger.clone(),
            ReconcilerConfig {
                reserve_currency: BaseUnits::ZERO,
                reserve_token: BaseUnits(reserve),
                confirmation_timeout: Duration::from_secs(1),
            },
        );
        (ledger, DistributionJob::new(reconciler, directory))
    }

    #[tokio::test]
    async fn test_run_tops_up_and_skips_funded() {
        let (ledger, job) = setup(100, 0, 3).await;
        ledger.set_balance(&addr(2), Unit::Token, BaseUnits(12)).await;
        ledger.set_balance(&addr(3), Unit::Token, BaseUnits(4)).await;

        let report = job.run(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(report.funded, 2);
        assert_eq!(report.already_funded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total_sent, dec!(16));
        assert_eq!(report.faucet_before - report.faucet_after, dec!(16));
        // Faucet account itself is never a recipient.
        assert_eq!(report.entries.len(), 3);
        assert_eq!(ledger.balance_of(&addr(2), Unit::Token).await, BaseUnits(12));
    }

    #[tokio::test]
    async fn test_run_stops_when_faucet_exhausted() {
        // 15 in the faucet, reserve 5, three users wanting 10 each.
        let (ledger, job) = setup(15, 5, 3).await;

        let report = job.run(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(report.funded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.not_attempted(), 1);
        assert_eq!(ledger.balance_of(&addr(0xfa), Unit::Token).await, BaseUnits(5));
        assert_eq!(ledger.balance_of(&addr(2), Unit::Token).await, BaseUnits::ZERO);
        assert!(report.errors[0].starts_with("user2"));
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let (ledger, job) = setup(100, 0, 2).await;

        job.run(Unit::Token, BaseUnits(10)).await.unwrap();
        let second = job.run(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(second.funded, 0);
        assert_eq!(second.already_funded, 2);
        assert_eq!(ledger.submission_count().await, 2);
    }

    #[tokio::test]
    async fn test_plan_submits_nothing() {
        let (ledger, job) = setup(23, 0, 3).await;
        ledger.set_balance(&addr(1), Unit::Token, BaseUnits(10)).await;

        let plan = job.plan(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(plan.already_funded, 1);
        assert_eq!(plan.transfers.len(), 2);
        assert_eq!(plan.total, dec!(20));
        assert_eq!(plan.exhausted_at, None);
        assert_eq!(ledger.submission_count().await, 0);
    }

    #[tokio::test]
    async fn test_even_split_shares_short_faucet() {
        // 12 in the faucet, three users wanting 10 each: 4 apiece.
        let (ledger, job) = setup(12, 0, 3).await;
        let job = job.with_split(SplitPolicy::Even);

        let report = job.run(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(report.share, Some(dec!(4)));
        assert_eq!(report.funded, 3);
        assert_eq!(report.not_attempted(), 0);
        for n in 1..=3 {
            assert_eq!(ledger.balance_of(&addr(n), Unit::Token).await, BaseUnits(4));
        }
        assert_eq!(ledger.balance_of(&addr(0xfa), Unit::Token).await, BaseUnits::ZERO);
    }

    #[tokio::test]
    async fn test_even_split_counts_only_short_recipients() {
        let (ledger, job) = setup(13, 1, 3).await;
        ledger.set_balance(&addr(2), Unit::Token, BaseUnits(10)).await;
        let job = job.with_split(SplitPolicy::Even);

        let plan = job.plan(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(plan.share, Some(dec!(6)));
        assert_eq!(plan.already_funded, 1);
        assert_eq!(plan.transfers.len(), 2);
        assert!(plan.transfers.iter().all(|t| t.amount == dec!(6) && t.partial));
        assert_eq!(plan.exhausted_at, None);
    }

    #[tokio::test]
    async fn test_even_split_not_needed_when_faucet_covers_all() {
        let (_, job) = setup(100, 0, 3).await;
        let job = job.with_split(SplitPolicy::Even);

        let report = job.run(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(report.share, None);
        assert_eq!(report.total_sent, dec!(30));
    }

    #[tokio::test]
    async fn test_plan_counts_fees_against_gas() {
        // 1000 gas, fee 1: each 300 send costs 301.
        let (ledger, job) = setup(0, 0, 4).await;
        ledger.set_fee(BaseUnits(1)).await;

        let plan = job.plan(Unit::Currency, BaseUnits(300)).await.unwrap();

        assert_eq!(plan.transfers.len(), 4);
        assert_eq!(plan.transfers[3].amount, dec!(96));
        assert!(plan.transfers[3].partial);
    }

    #[tokio::test]
    async fn test_plan_marks_exhaustion() {
        let (_, job) = setup(12, 0, 3).await;

        let plan = job.plan(Unit::Token, BaseUnits(10)).await.unwrap();

        assert_eq!(plan.transfers.len(), 2);
        assert!(plan.transfers[1].partial);
        assert_eq!(plan.transfers[1].amount, dec!(2));
        assert_eq!(plan.exhausted_at, Some(2));
    }
}
