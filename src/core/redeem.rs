//! Redeem workflow - moving game winnings back to the platform balance.
//!
//! Unlike credits, nothing touches the wallet until an admin approves the redeem; the approval
//! credits `amount - tips`.

use crate::{
    core::{
        credit::GameReceipt,
        credit_state::CreditState,
        game_profile,
        transaction::{self, NewTransaction},
        unit_of_work, wallet,
    },
    entities::{GameName, TransactionStatus, TransactionType},
    errors::{Error, Result},
};
use sea_orm::TransactionTrait;
use tracing::{info, instrument};

fn validate_tips(amount: f64, tips: f64) -> Result<()> {
    if !tips.is_finite() || tips < 0.0 {
        return Err(Error::Validation {
            message: format!("Tips must be a non-negative number, got {tips}"),
        });
    }
    if tips > amount {
        return Err(Error::Validation {
            message: format!("Tips ({tips}) cannot exceed the redeemed amount ({amount})"),
        });
    }
    Ok(())
}

/// Records a pending redeem of `amount` from `game`, with `tips` withheld on approval.
#[instrument(skip(db))]
pub async fn request_redeem<C>(
    db: &C,
    user_id: &str,
    game: GameName,
    amount: f64,
    tips: f64,
) -> Result<GameReceipt>
where
    C: TransactionTrait,
{
    wallet::validate_amount(amount)?;
    validate_tips(amount, tips)?;
    let user_id = user_id.to_string();

    let receipt = unit_of_work::run(db, move |txn| {
        Box::pin(async move {
            let account = game_profile::require_active_account(txn, &user_id, game).await?;
            let next = CreditState::from_account(&account).request_redeem(&game.to_string(), amount)?;

            let holder = wallet::require_wallet(txn, &user_id).await?;
            transaction::ensure_game_slot_free(txn, holder.id, game).await?;

            let entry = transaction::append_transaction(
                txn,
                holder.id,
                NewTransaction::new(
                    TransactionType::GameWithdrawal,
                    amount,
                    TransactionStatus::Pending,
                    format!("Redeem request from {game}"),
                )
                .with_game(game, account.game_id.clone())
                .with_tips(tips),
            )
            .await?;

            let account = game_profile::compare_and_swap_state(txn, &account, next).await?;

            Ok(GameReceipt {
                account,
                transaction: entry,
                balance: holder.total_balance_usd,
            })
        })
    })
    .await?;

    info!("Redeem of {} (tips {}) requested from {}", amount, tips, game);
    Ok(receipt)
}

/// Completes the pending redeem and credits the wallet with `amount - tips`.
#[instrument(skip(db))]
pub async fn approve_redeem<C>(db: &C, user_id: &str, game: GameName) -> Result<GameReceipt>
where
    C: TransactionTrait,
{
    let receipt = settle_redeem(db, user_id, game, TransactionStatus::Completed).await?;
    info!(
        "Redeem from {} approved for user {} (balance now {})",
        game, user_id, receipt.balance
    );
    Ok(receipt)
}

/// Rejects the pending redeem. The wallet balance is unchanged.
#[instrument(skip(db))]
pub async fn disapprove_redeem<C>(db: &C, user_id: &str, game: GameName) -> Result<GameReceipt>
where
    C: TransactionTrait,
{
    let receipt = settle_redeem(db, user_id, game, TransactionStatus::Rejected).await?;
    info!("Redeem from {} rejected for user {}", game, user_id);
    Ok(receipt)
}

async fn settle_redeem<C>(
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
                TransactionType::GameWithdrawal,
                game,
            )
            .await?
            .ok_or_else(|| Error::NoPendingRequest {
                request: format!("redeem for {game}"),
            })?;

            let state = CreditState::from_account(&account);
            let next = if outcome == TransactionStatus::Completed {
                state.approve_redeem(&game.to_string())?
            } else {
                state.disapprove_redeem(&game.to_string())?
            };

            let entry = transaction::settle_transaction(txn, &pending, outcome).await?;
            if outcome == TransactionStatus::Completed {
                wallet::credit_balance(txn, holder.id, pending.net_effect()).await?;
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
