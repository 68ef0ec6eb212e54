//! Tracing setup and workflow outcome counters.
//!
//! A single [`Telemetry`] handle is created at start-up, shared with the engine, and flushed to
//! the log at shutdown.

use crate::{core::deposit::BatchReport, errors::Result};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();
}

/// Routes tracing output through the test harness. Safe to call from every test.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

const OPERATION_COUNT: usize = 12;

/// Engine operations whose outcomes are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Wallet creation on first use
    BootstrapWallet,
    /// New game profile
    RequestGameProfile,
    /// Game id assignment by an admin
    AssignGameId,
    /// Credit request
    RequestCredit,
    /// Credit approval
    ApproveCredit,
    /// Credit rejection with refund
    DisapproveCredit,
    /// Redeem request
    RequestRedeem,
    /// Redeem approval
    ApproveRedeem,
    /// Redeem rejection
    DisapproveRedeem,
    /// Withdrawal request
    InitiateWithdraw,
    /// Withdrawal settlement
    SettleWithdrawal,
    /// Deposit from the watcher, duplicates excluded
    ApplyDeposit,
}

impl Operation {
    /// Every counted operation, in reporting order.
    pub const ALL: [Self; OPERATION_COUNT] = [
        Self::BootstrapWallet,
        Self::RequestGameProfile,
        Self::AssignGameId,
        Self::RequestCredit,
        Self::ApproveCredit,
        Self::DisapproveCredit,
        Self::RequestRedeem,
        Self::ApproveRedeem,
        Self::DisapproveRedeem,
        Self::InitiateWithdraw,
        Self::SettleWithdrawal,
        Self::ApplyDeposit,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BootstrapWallet => "bootstrap_wallet",
            Self::RequestGameProfile => "request_game_profile",
            Self::AssignGameId => "assign_game_id",
            Self::RequestCredit => "request_credit",
            Self::ApproveCredit => "approve_credit",
            Self::DisapproveCredit => "disapprove_credit",
            Self::RequestRedeem => "request_redeem",
            Self::ApproveRedeem => "approve_redeem",
            Self::DisapproveRedeem => "disapprove_redeem",
            Self::InitiateWithdraw => "initiate_withdraw",
            Self::SettleWithdrawal => "settle_withdrawal",
            Self::ApplyDeposit => "apply_deposit",
        };
        f.write_str(name)
    }
}

/// Success/failure counts for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationCounts {
    /// Calls that returned `Ok`
    pub succeeded: u64,
    /// Calls that returned `Err`
    pub failed: u64,
}

/// Process-wide workflow counters.
pub struct Telemetry {
    started: Instant,
    succeeded: [AtomicU64; OPERATION_COUNT],
    failed: [AtomicU64; OPERATION_COUNT],
    duplicate_deposits: AtomicU64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    /// All counters at zero, uptime measured from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            succeeded: std::array::from_fn(|_| AtomicU64::new(0)),
            failed: std::array::from_fn(|_| AtomicU64::new(0)),
            duplicate_deposits: AtomicU64::new(0),
        }
    }

    /// Counts one outcome of `operation`.
    pub fn record<T>(&self, operation: Operation, result: &Result<T>) {
        let counters = if result.is_ok() {
            &self.succeeded
        } else {
            &self.failed
        };
        counters[operation.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Counts every record of a deposit batch.
    pub fn record_batch(&self, report: &BatchReport) {
        let idx = Operation::ApplyDeposit.index();
        self.succeeded[idx].fetch_add(report.processed as u64, Ordering::Relaxed);
        self.failed[idx].fetch_add(report.failures.len() as u64, Ordering::Relaxed);
        self.duplicate_deposits
            .fetch_add(report.duplicates as u64, Ordering::Relaxed);
    }

    /// Counts a deposit that was skipped as already applied.
    pub fn record_duplicate_deposit(&self) {
        self.duplicate_deposits.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counts(&self, operation: Operation) -> OperationCounts {
        OperationCounts {
            succeeded: self.succeeded[operation.index()].load(Ordering::Relaxed),
            failed: self.failed[operation.index()].load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn duplicate_deposits(&self) -> u64 {
        self.duplicate_deposits.load(Ordering::Relaxed)
    }

    /// Logs a summary of every non-zero counter.
    pub fn flush(&self) {
        let mut total = OperationCounts::default();
        for operation in Operation::ALL {
            let counts = self.counts(operation);
            if counts == OperationCounts::default() {
                continue;
            }
            total.succeeded += counts.succeeded;
            total.failed += counts.failed;
            info!(
                operation = %operation,
                succeeded = counts.succeeded,
                failed = counts.failed,
                "Operation summary"
            );
        }
        info!(
            succeeded = total.succeeded,
            failed = total.failed,
            duplicate_deposits = self.duplicate_deposits(),
            uptime_secs = self.started.elapsed().as_secs(),
            "Ledger telemetry flushed"
        );
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("uptime", &self.started.elapsed())
            .field("duplicate_deposits", &self.duplicate_deposits())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::deposit::BatchFailure, errors::Error};

    #[test]
    fn test_operation_index_matches_order() {
        for (position, operation) in Operation::ALL.iter().enumerate() {
            assert_eq!(operation.index(), position);
        }
    }

    #[test]
    fn test_record_outcomes() {
        let telemetry = Telemetry::new();
        telemetry.record(Operation::RequestCredit, &Ok(()));
        telemetry.record(Operation::RequestCredit, &Ok(()));
        telemetry.record::<()>(Operation::RequestCredit, &Err(Error::PendingWithdrawal));

        assert_eq!(
            telemetry.counts(Operation::RequestCredit),
            OperationCounts {
                succeeded: 2,
                failed: 1
            }
        );
        assert_eq!(
            telemetry.counts(Operation::ApproveCredit),
            OperationCounts::default()
        );
        telemetry.flush();
    }

    #[test]
    fn test_record_batch() {
        let telemetry = Telemetry::new();
        telemetry.record_batch(&BatchReport {
            submitted: 4,
            processed: 2,
            duplicates: 1,
            failures: vec![BatchFailure {
                user_id: "ghost".to_string(),
                tx_hash: "0x1".to_string(),
                reason: "Wallet not found".to_string(),
            }],
        });

        let counts = telemetry.counts(Operation::ApplyDeposit);
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(telemetry.duplicate_deposits(), 1);
    }
}
