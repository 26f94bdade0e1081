use bigdecimal::BigDecimal;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::domain::Principal;
use crate::error::AppError;
use crate::ports::{AggregateSnapshot, LedgerStore};

const RECONCILE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub cause_id: Uuid,
    pub current_amount: BigDecimal,
    pub target_amount: BigDecimal,
}

impl Progress {
    /// Percentage of the target raised, truncated to two decimals. May exceed 100.
    pub fn percent_funded(&self) -> BigDecimal {
        if self.target_amount <= BigDecimal::from(0) {
            return BigDecimal::from(0);
        }
        (&self.current_amount * BigDecimal::from(100) / &self.target_amount).with_scale(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub cause_id: Uuid,
    /// Total stored on the cause row.
    pub stored: BigDecimal,
    /// Sum of completed donations in the ledger.
    pub ledger: BigDecimal,
    /// `stored - ledger`; zero when consistent.
    pub drift: BigDecimal,
}

impl ReconciliationReport {
    fn new(cause_id: Uuid, snapshot: AggregateSnapshot) -> Self {
        let drift = &snapshot.stored - &snapshot.ledger;
        Self {
            cause_id,
            stored: snapshot.stored,
            ledger: snapshot.ledger,
            drift,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.drift == BigDecimal::from(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealOutcome {
    pub before: ReconciliationReport,
    pub after: Progress,
    pub repaired: bool,
}

/// Serves cause progress from the stored aggregate and audits it against the ledger.
#[derive(Clone)]
pub struct AggregateReader {
    store: Arc<dyn LedgerStore>,
}

impl AggregateReader {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn get_progress(&self, cause_id: Uuid) -> Result<Progress, AppError> {
        let cause = self
            .store
            .get_cause(cause_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cause {} not found", cause_id)))?;

        Ok(Progress {
            cause_id,
            current_amount: cause.current_amount,
            target_amount: cause.target_amount,
        })
    }

    /// Compares the stored total with the ledger sum. Drift is reported and
    /// logged but never corrected here.
    pub async fn reconcile(&self, cause_id: Uuid) -> Result<ReconciliationReport, AppError> {
        let snapshot = self
            .store
            .aggregate_snapshot(cause_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cause {} not found", cause_id)))?;

        let report = ReconciliationReport::new(cause_id, snapshot);
        if report.is_consistent() {
            tracing::debug!(cause_id = %cause_id, total = %report.stored, "Cause total matches ledger");
        } else {
            tracing::error!(
                cause_id = %cause_id,
                stored = %report.stored,
                ledger = %report.ledger,
                drift = %report.drift,
                "INVARIANT VIOLATION: cause total does not match completed donations"
            );
        }
        Ok(report)
    }

    /// Reconciles every cause. Causes that fail to load are logged and skipped.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconciliationReport>, AppError> {
        let cause_ids = self.store.list_cause_ids().await?;

        let reports: Vec<ReconciliationReport> = stream::iter(cause_ids)
            .map(|cause_id| async move { (cause_id, self.reconcile(cause_id).await) })
            .buffer_unordered(RECONCILE_CONCURRENCY)
            .filter_map(|(cause_id, outcome)| async move {
                match outcome {
                    Ok(report) => Some(report),
                    Err(AppError::NotFound(_)) => None,
                    Err(e) => {
                        tracing::error!(cause_id = %cause_id, error = %e, "Failed to reconcile cause");
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(reports)
    }

    /// Explicit administrative repair: resets the stored total to the ledger sum.
    pub async fn heal(&self, principal: Principal, cause_id: Uuid) -> Result<HealOutcome, AppError> {
        principal.require_admin("repairing a cause total")?;

        let before = self.reconcile(cause_id).await?;
        if before.is_consistent() {
            let after = self.get_progress(cause_id).await?;
            return Ok(HealOutcome {
                before,
                after,
                repaired: false,
            });
        }

        let cause = self.store.repair_aggregate(cause_id).await?;
        tracing::warn!(
            cause_id = %cause_id,
            previous = %before.stored,
            repaired_to = %cause.current_amount,
            "Cause total repaired from ledger"
        );

        Ok(HealOutcome {
            before,
            after: Progress {
                cause_id,
                current_amount: cause.current_amount,
                target_amount: cause.target_amount,
            },
            repaired: true,
        })
    }
}

/// Periodically audits every cause total. Runs until the task is dropped.
pub async fn run_reconciler(reader: AggregateReader, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Aggregate reconciler started");

    loop {
        match reader.reconcile_all().await {
            Ok(reports) => {
                let drifted = reports.iter().filter(|r| !r.is_consistent()).count();
                tracing::info!(causes = reports.len(), drifted, "Reconciliation sweep finished");
            }
            Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
        }

        sleep(interval).await;
    }
}
