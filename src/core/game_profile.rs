//! Game profile business logic.
//!
//! A user requests an account on a game platform, an admin activates it by assigning the
//! external game id, and from then on credits and redeems flow through it. Every write to a
//! game account is a compare-and-swap on its `version` column.

use crate::{
    core::credit_state::CreditState,
    entities::{CreditStatus, GameAccount, GameName, ProfileStatus, game_account},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{info, instrument, warn};

/// Finds the user's account on `game`.
pub async fn get_game_account<C>(
    db: &C,
    user_id: &str,
    game: GameName,
) -> Result<Option<game_account::Model>>
where
    C: ConnectionTrait,
{
    GameAccount::find()
        .filter(game_account::Column::UserId.eq(user_id))
        .filter(game_account::Column::GameName.eq(game))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Like [`get_game_account`], but a missing account is an error.
pub async fn require_game_account<C>(
    db: &C,
    user_id: &str,
    game: GameName,
) -> Result<game_account::Model>
where
    C: ConnectionTrait,
{
    get_game_account(db, user_id, game)
        .await?
        .ok_or_else(|| Error::GameAccountNotFound {
            user_id: user_id.to_string(),
            game: game.to_string(),
        })
}

/// Requires the account to exist and be active.
pub async fn require_active_account<C>(
    db: &C,
    user_id: &str,
    game: GameName,
) -> Result<game_account::Model>
where
    C: ConnectionTrait,
{
    let account = require_game_account(db, user_id, game).await?;
    if !account.is_active() {
        return Err(Error::ProfileNotActive {
            game: game.to_string(),
        });
    }
    Ok(account)
}

/// Creates a `pending` account for the user on `game`.
#[instrument(skip(db))]
pub async fn request_game_profile<C>(
    db: &C,
    user_id: &str,
    game: GameName,
) -> Result<game_account::Model>
where
    C: ConnectionTrait,
{
    if user_id.trim().is_empty() {
        return Err(Error::Validation {
            message: "user id cannot be empty".to_string(),
        });
    }

    if get_game_account(db, user_id, game).await?.is_some() {
        return Err(Error::DuplicateGameProfile {
            game: game.to_string(),
        });
    }

    let now = Utc::now();
    let account = game_account::ActiveModel {
        user_id: Set(user_id.to_string()),
        game_name: Set(game),
        game_id: Set(None),
        profile_status: Set(ProfileStatus::Pending),
        credit_amount: Set(0.0),
        credit_status: Set(CreditStatus::None),
        requested_amount: Set(0.0),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match account.insert(db).await.map_err(Error::from) {
        Ok(created) => {
            info!("User {} requested a {} profile", user_id, game);
            Ok(created)
        }
        Err(Error::Conflict { message }) => {
            warn!("Concurrent {} profile request for {}: {}", game, user_id, message);
            Err(Error::DuplicateGameProfile {
                game: game.to_string(),
            })
        }
        Err(e) => Err(e),
    }
}

/// Activates the account by recording its external game id.
#[instrument(skip(db))]
pub async fn assign_game_id<C>(
    db: &C,
    user_id: &str,
    game: GameName,
    game_id: &str,
) -> Result<game_account::Model>
where
    C: ConnectionTrait,
{
    let game_id = game_id.trim();
    if game_id.is_empty() {
        return Err(Error::Validation {
            message: "game id cannot be empty".to_string(),
        });
    }

    let account = require_game_account(db, user_id, game).await?;
    if account.is_active() {
        return Err(Error::ProfileAlreadyActive {
            game: game.to_string(),
            game_id: account.game_id,
        });
    }

    let result = GameAccount::update_many()
        .col_expr(game_account::Column::GameId, Expr::value(game_id))
        .col_expr(
            game_account::Column::ProfileStatus,
            Expr::value(ProfileStatus::Active),
        )
        .col_expr(
            game_account::Column::Version,
            Expr::col(game_account::Column::Version).add(1),
        )
        .col_expr(game_account::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(game_account::Column::Id.eq(account.id))
        .filter(game_account::Column::Version.eq(account.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::StaleWrite {
            entity: "game account",
        });
    }

    info!("Assigned {} id {} to user {}", game, game_id, user_id);
    reload(db, &account).await
}

/// The user's accounts in the order they were requested.
pub async fn list_game_profiles_for_user<C>(
    db: &C,
    user_id: &str,
) -> Result<Vec<game_account::Model>>
where
    C: ConnectionTrait,
{
    GameAccount::find()
        .filter(game_account::Column::UserId.eq(user_id))
        .order_by_asc(game_account::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Every account of every user, grouped by user.
pub async fn list_all_game_profiles<C>(db: &C) -> Result<Vec<game_account::Model>>
where
    C: ConnectionTrait,
{
    GameAccount::find()
        .order_by_asc(game_account::Column::UserId)
        .order_by_asc(game_account::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Persists `next` as the account's credit state if nobody else wrote it since `account` was read.
///
/// Fails with [`Error::StaleWrite`] when the stored version moved on.
pub async fn compare_and_swap_state<C>(
    db: &C,
    account: &game_account::Model,
    next: CreditState,
) -> Result<game_account::Model>
where
    C: ConnectionTrait,
{
    let mut changes = game_account::ActiveModel {
        ..Default::default()
    };
    next.apply_to(&mut changes);

    let result = GameAccount::update_many()
        .set(changes)
        .col_expr(
            game_account::Column::Version,
            Expr::col(game_account::Column::Version).add(1),
        )
        .filter(game_account::Column::Id.eq(account.id))
        .filter(game_account::Column::Version.eq(account.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::StaleWrite {
            entity: "game account",
        });
    }

    reload(db, account).await
}

async fn reload<C>(db: &C, account: &game_account::Model) -> Result<game_account::Model>
where
    C: ConnectionTrait,
{
    GameAccount::find_by_id(account.id)
        .one(db)
        .await?
        .ok_or_else(|| Error::GameAccountNotFound {
            user_id: account.user_id.clone(),
            game: account.game_name.to_string(),
        })
}
