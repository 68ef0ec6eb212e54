//! Credit workflow - moving platform balance into a game account.
//!
//! The wallet is debited when the credit is *requested*, not when it is approved. Approval only
//! settles the pending entry; disapproval refunds it. Each operation runs as one unit of work.

use crate::{
    core::{
        credit_state::CreditState,
        game_profile,
        transaction::{self, NewTransaction},
        unit_of_work, wallet,
    },
    entities::{GameName, TransactionStatus, TransactionType, game_account, wallet_transaction},
    errors::{Error, Result},
};
use sea_orm::TransactionTrait;
use serde::Serialize;
use tracing::{info, instrument};

/// Outcome of a credit or redeem workflow step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameReceipt {
    /// Game account after the step
    pub account: game_account::Model,
    /// Ledger entry created or settled by the step
    pub transaction: wallet_transaction::Model,
    /// Wallet balance after the step
    pub balance: f64,
}

/// Reserves `amount` from the wallet for a credit to `game`.
#[instrument(skip(db))]
pub async fn request_credit<C>(
    db: &C,
    user_id: &str,
    game: GameName,
    amount: f64,
) -> Result<GameReceipt>
where
    C: TransactionTrait,
{
    wallet::validate_amount(amount)?;
    let user_id = user_id.to_string();

    let receipt = unit_of_work::run(db, move |txn| {
        Box::pin(async move {
            let account = game_profile::require_active_account(txn, &user_id, game).await?;
            let next = CreditState::from_account(&account).request_credit(&game.to_string(), amount)?;

            let holder = wallet::require_wallet(txn, &user_id).await?;
            transaction::ensure_game_slot_free(txn, holder.id, game).await?;
            wallet::debit_balance(txn, holder.id, amount).await?;

            let entry = transaction::append_transaction(
                txn,
                holder.id,
                NewTransaction::new(
                    TransactionType::GameCredit,
                    -amount,
                    TransactionStatus::Pending,
                    format!("Credit request for {game}"),
                )
                .with_game(game, account.game_id.clone()),
            )
            .await?;

            let account = game_profile::compare_and_swap_state(txn, &account, next).await?;
            let balance = wallet::require_wallet(txn, &user_id).await?.total_balance_usd;

            Ok(GameReceipt {
                account,
                transaction: entry,
                balance,
            })
        })
    })
    .await?;

    info!(
        "Credit of {} requested for {} (balance now {})",
        amount, game, receipt.balance
    );
    Ok(receipt)
}

/// Marks the pending credit as delivered to the game.
#[instrument(skip(db))]
pub async fn approve_credit<C>(db: &C, user_id: &str, game: GameName) -> Result<GameReceipt>
where
    C: TransactionTrait,
{
    let receipt = settle_credit(db, user_id, game, TransactionStatus::Completed).await?;
    info!("Credit for {} approved for user {}", game, user_id);
    Ok(receipt)
}

/// Rejects the pending credit and refunds the reserved amount.
#[instrument(skip(db))]
pub async fn disapprove_credit<C>(db: &C, user_id: &str, game: GameName) -> Result<GameReceipt>
where
    C: TransactionTrait,
{
    let receipt = settle_credit(db, user_id, game, TransactionStatus::Rejected).await?;
    info!(
        "Credit for {} rejected for user {}, refunded {}",
        game,
        user_id,
        receipt.transaction.amount.abs()
    );
    Ok(receipt)
}

async fn settle_credit<C>(
    db: &C,
    user_id: &str,
    game: GameName,
    outcome: TransactionStatus,
) -> Result<GameReceipt>
where
    C: TransactionTrait,
{
    let user_id = user_id.to_string();

    unit_of_work::run(db, move |txn| {
        Box::pin(async move {
            let holder = wallet::require_wallet(txn, &user_id).await?;
            let account = game_profile::require_game_account(txn, &user_id, game).await?;
            let pending = transaction::find_pending_game_transaction(
                txn,
                holder.id,
                TransactionType::GameCredit,
                game,
            )
            .await?
            .ok_or_else(|| Error::NoPendingRequest {
                request: format!("credit for {game}"),
            })?;

            let state = CreditState::from_account(&account);
            let next = if outcome == TransactionStatus::Completed {
                state.approve_credit(&game.to_string())?
            } else {
                state.disapprove_credit(&game.to_string())?
            };

            let entry = transaction::settle_transaction(txn, &pending, outcome).await?;
            if outcome == TransactionStatus::Rejected {
                wallet::credit_balance(txn, holder.id, pending.amount.abs()).await?;
            }

            let account = game_profile::compare_and_swap_state(txn, &account, next).await?;
            let balance = wallet::require_wallet(txn, &user_id).await?.total_balance_usd;

            Ok(GameReceipt {
                account,
                transaction: entry,
                balance,
            })
        })
    })
    .await
}
