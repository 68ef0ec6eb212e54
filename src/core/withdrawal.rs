//! Withdrawal workflow - external payouts to a crypto address.
//!
//! The balance is debited when the withdrawal is initiated. The payout processor later reports
//! the outcome through [`settle_withdrawal`]; a rejected payout is refunded.

use crate::{
    core::{
        transaction::{self, NewTransaction},
        unit_of_work, wallet,
    },
    entities::{Asset, Network, TransactionStatus, TransactionType, wallet_transaction},
    errors::{Error, Result},
};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

/// Result reported by the payout processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    /// Funds were sent
    Completed,
    /// Payout failed or was refused, the debit is refunded
    Rejected,
}

impl fmt::Display for WithdrawalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl From<WithdrawalOutcome> for TransactionStatus {
    fn from(outcome: WithdrawalOutcome) -> Self {
        match outcome {
            WithdrawalOutcome::Completed => Self::Completed,
            WithdrawalOutcome::Rejected => Self::Rejected,
        }
    }
}

/// Withdrawal entry and the balance after the step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalReceipt {
    /// The withdrawal ledger entry
    pub transaction: wallet_transaction::Model,
    /// Wallet balance after the step
    pub balance: f64,
}

/// Debits `amount` and records a pending payout to `address`.
///
/// Only one withdrawal may be pending per wallet.
#[instrument(skip(db))]
pub async fn initiate_withdraw<C>(
    db: &C,
    user_id: &str,
    asset: Asset,
    network: Option<Network>,
    address: &str,
    amount: f64,
) -> Result<WithdrawalReceipt>
where
    C: TransactionTrait,
{
    wallet::validate_amount(amount)?;
    let network = wallet::resolve_network(asset, network)?;
    let address = address.trim().to_string();
    if address.is_empty() {
        return Err(Error::Validation {
            message: "Withdrawal address is required".to_string(),
        });
    }
    let user_id = user_id.to_string();

    let receipt = unit_of_work::run(db, move |txn| {
        Box::pin(async move {
            let holder = wallet::require_wallet(txn, &user_id).await?;
            if transaction::has_pending_withdrawal(txn, holder.id).await? {
                return Err(Error::PendingWithdrawal);
            }

            wallet::debit_balance(txn, holder.id, amount).await?;
            let description = format!("Withdrawal of {amount} {asset} ({network}) to {address}");
            let entry = transaction::append_transaction(
                txn,
                holder.id,
                NewTransaction::new(
                    TransactionType::Withdrawal,
                    -amount,
                    TransactionStatus::Pending,
                    description,
                )
                .with_asset(asset, network)
                .with_withdrawal_address(address),
            )
            .await
            .map_err(|err| match err {
                // Lost a race against a concurrent withdrawal
                Error::Conflict { .. } => Error::PendingWithdrawal,
                other => other,
            })?;

            let balance = wallet::require_wallet(txn, &user_id).await?.total_balance_usd;
            Ok(WithdrawalReceipt {
                transaction: entry,
                balance,
            })
        })
    })
    .await?;

    info!(
        "Withdrawal #{} of {} {} initiated (balance now {})",
        receipt.transaction.id, amount, asset, receipt.balance
    );
    Ok(receipt)
}

/// Applies the payout processor's verdict to a pending withdrawal.
#[instrument(skip(db))]
pub async fn settle_withdrawal<C>(
    db: &C,
    user_id: &str,
    transaction_id: i64,
    outcome: WithdrawalOutcome,
) -> Result<WithdrawalReceipt>
where
    C: TransactionTrait,
{
    let user_id = user_id.to_string();

    let receipt = unit_of_work::run(db, move |txn| {
        Box::pin(async move {
            let holder = wallet::require_wallet(txn, &user_id).await?;
            let entry = transaction::get_transaction_by_id(txn, transaction_id)
                .await?
                .filter(|t| t.wallet_id == holder.id && t.tx_type == TransactionType::Withdrawal)
                .ok_or(Error::TransactionNotFound { id: transaction_id })?;

            if entry.status != TransactionStatus::Pending {
                return Err(Error::NoPendingRequest {
                    request: format!("withdrawal #{transaction_id}"),
                });
            }

            let settled = transaction::settle_transaction(txn, &entry, outcome.into()).await?;
            if outcome == WithdrawalOutcome::Rejected {
                wallet::credit_balance(txn, holder.id, entry.amount.abs()).await?;
            }

            let balance = wallet::require_wallet(txn, &user_id).await?.total_balance_usd;
            Ok(WithdrawalReceipt {
                transaction: settled,
                balance,
            })
        })
    })
    .await?;

    if outcome == WithdrawalOutcome::Rejected {
        warn!(
            "Withdrawal #{} rejected, refunded {}",
            transaction_id,
            receipt.transaction.amount.abs()
        );
    } else {
        info!("Withdrawal #{} completed", transaction_id);
    }
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_btc_withdrawal_records_btc_network() -> Result<()> {
        let (db, holder) = setup_with_wallet("user-1").await?;
        fund_wallet(&db, "user-1", 100.0).await?;

        let receipt =
            initiate_withdraw(&db, "user-1", Asset::Btc, None, " bc1-target ", 30.0).await?;

        assert_eq!(receipt.balance, 70.0);
        let entry = receipt.transaction;
        assert_eq!(entry.amount, -30.0);
        assert_eq!(entry.status, TransactionStatus::Pending);
        assert_eq!(entry.asset, Some(Asset::Btc));
        assert_eq!(entry.network, Some(Network::Btc));
        assert_eq!(entry.withdrawal_address.as_deref(), Some("bc1-target"));
        assert_balance_conserved(&db, holder.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_withdrawal_validation() -> Result<()> {
        let (db, _) = setup_with_wallet("user-1").await?;
        fund_wallet(&db, "user-1", 100.0).await?;

        assert!(matches!(
            initiate_withdraw(&db, "user-1", Asset::Usdt, None, "T-addr", 10.0).await,
            Err(Error::Validation { message: _ })
        ));
        assert!(matches!(
            initiate_withdraw(&db, "user-1", Asset::Usdt, Some(Network::Trc20), "  ", 10.0).await,
            Err(Error::Validation { message: _ })
        ));
        assert!(matches!(
            initiate_withdraw(&db, "user-1", Asset::Btc, None, "bc1", 0.0).await,
            Err(Error::InvalidAmount { amount: 0.0 })
        ));
        assert!(matches!(
            initiate_withdraw(&db, "user-1", Asset::Usdt, Some(Network::Bep20), "0xabc", 500.0)
                .await,
            Err(Error::InsufficientFunds {
                current: 100.0,
                required: 500.0
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_single_pending_withdrawal() -> Result<()> {
        let (db, _) = setup_with_wallet("user-1").await?;
        fund_wallet(&db, "user-1", 100.0).await?;
        initiate_withdraw(&db, "user-1", Asset::Usdt, Some(Network::Trc20), "T-1", 10.0).await?;

        let second =
            initiate_withdraw(&db, "user-1", Asset::Usdt, Some(Network::Bep20), "0x1", 10.0).await;
        assert!(matches!(second, Err(Error::PendingWithdrawal)));

        let wallet = wallet::require_wallet(&db, "user-1").await?;
        assert_eq!(wallet.total_balance_usd, 90.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_settle_completed_keeps_debit() -> Result<()> {
        let (db, holder) = setup_with_wallet("user-1").await?;
        fund_wallet(&db, "user-1", 100.0).await?;
        let pending = initiate_withdraw(&db, "user-1", Asset::Btc, None, "bc1", 40.0).await?;

        let settled = settle_withdrawal(
            &db,
            "user-1",
            pending.transaction.id,
            WithdrawalOutcome::Completed,
        )
        .await?;
        assert_eq!(settled.balance, 60.0);
        assert_eq!(settled.transaction.status, TransactionStatus::Completed);
        assert_balance_conserved(&db, holder.id).await?;

        // A new withdrawal is allowed once the previous one settled
        initiate_withdraw(&db, "user-1", Asset::Btc, None, "bc1", 10.0).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_settle_rejected_refunds() -> Result<()> {
        let (db, holder) = setup_with_wallet("user-1").await?;
        fund_wallet(&db, "user-1", 100.0).await?;
        let pending = initiate_withdraw(&db, "user-1", Asset::Btc, None, "bc1", 40.0).await?;

        let settled = settle_withdrawal(
            &db,
            "user-1",
            pending.transaction.id,
            WithdrawalOutcome::Rejected,
        )
        .await?;
        assert_eq!(settled.balance, 100.0);
        assert_eq!(settled.transaction.status, TransactionStatus::Rejected);
        assert_balance_conserved(&db, holder.id).await?;

        let again = settle_withdrawal(
            &db,
            "user-1",
            pending.transaction.id,
            WithdrawalOutcome::Rejected,
        )
        .await;
        assert!(matches!(again, Err(Error::NoPendingRequest { request: _ })));
        let wallet = wallet::require_wallet(&db, "user-1").await?;
        assert_eq!(wallet.total_balance_usd, 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_settle_unknown_or_foreign_transaction() -> Result<()> {
        let (db, _) = setup_with_wallet("user-1").await?;
        bootstrap_test_wallet(&db, "user-2").await?;
        fund_wallet(&db, "user-1", 100.0).await?;
        let pending = initiate_withdraw(&db, "user-1", Asset::Btc, None, "bc1", 40.0).await?;

        assert!(matches!(
            settle_withdrawal(&db, "user-1", 9999, WithdrawalOutcome::Completed).await,
            Err(Error::TransactionNotFound { id: 9999 })
        ));
        assert!(matches!(
            settle_withdrawal(
                &db,
                "user-2",
                pending.transaction.id,
                WithdrawalOutcome::Completed
            )
            .await,
            Err(Error::TransactionNotFound { id: _ })
        ));
        Ok(())
    }
}
