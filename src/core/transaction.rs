//! Wallet transaction log - append and status transitions.
//!
//! Entries are appended once and never deleted. The only permitted update is moving a `pending`
//! entry to a terminal status, done as a compare-and-swap on the status column so a second
//! approval of the same entry finds nothing to update.

use crate::{
    entities::{
        Asset, GameName, Network, TransactionStatus, TransactionType, WalletTransaction,
        wallet_transaction,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};

/// A ledger entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    tx_type: TransactionType,
    amount: f64,
    status: TransactionStatus,
    description: String,
    asset: Option<Asset>,
    network: Option<Network>,
    game_name: Option<GameName>,
    game_id: Option<String>,
    tx_hash: Option<String>,
    withdrawal_address: Option<String>,
    tips: f64,
}

impl NewTransaction {
    /// Starts an entry with the mandatory fields.
    #[must_use]
    pub fn new(
        tx_type: TransactionType,
        amount: f64,
        status: TransactionStatus,
        description: impl Into<String>,
    ) -> Self {
        Self {
            tx_type,
            amount,
            status,
            description: description.into(),
            asset: None,
            network: None,
            game_name: None,
            game_id: None,
            tx_hash: None,
            withdrawal_address: None,
            tips: 0.0,
        }
    }

    /// Tags the entry with the game it concerns.
    #[must_use]
    pub fn with_game(mut self, game: GameName, game_id: Option<String>) -> Self {
        self.game_name = Some(game);
        self.game_id = game_id;
        self
    }

    /// Tags the entry with an asset and network.
    #[must_use]
    pub const fn with_asset(mut self, asset: Asset, network: Network) -> Self {
        self.asset = Some(asset);
        self.network = Some(network);
        self
    }

    /// Records the external chain hash.
    #[must_use]
    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    /// Records the payout destination.
    #[must_use]
    pub fn with_withdrawal_address(mut self, address: impl Into<String>) -> Self {
        self.withdrawal_address = Some(address.into());
        self
    }

    /// Records the fee withheld from a redeem.
    #[must_use]
    pub const fn with_tips(mut self, tips: f64) -> Self {
        self.tips = tips;
        self
    }
}

/// Appends an entry to the wallet's log.
pub async fn append_transaction<C>(
    db: &C,
    wallet_id: i64,
    entry: NewTransaction,
) -> Result<wallet_transaction::Model>
where
    C: ConnectionTrait,
{
    let model = wallet_transaction::ActiveModel {
        wallet_id: Set(wallet_id),
        tx_type: Set(entry.tx_type),
        amount: Set(entry.amount),
        status: Set(entry.status),
        asset: Set(entry.asset),
        network: Set(entry.network),
        game_name: Set(entry.game_name),
        game_id: Set(entry.game_id),
        tx_hash: Set(entry.tx_hash),
        withdrawal_address: Set(entry.withdrawal_address),
        tips: Set(entry.tips),
        description: Set(entry.description),
        timestamp: Set(Utc::now()),
        ..Default::default()
    };

    model.insert(db).await.map_err(Into::into)
}

/// All entries of a wallet in insertion order.
pub async fn get_transactions_for_wallet<C>(
    db: &C,
    wallet_id: i64,
) -> Result<Vec<wallet_transaction::Model>>
where
    C: ConnectionTrait,
{
    WalletTransaction::find()
        .filter(wallet_transaction::Column::WalletId.eq(wallet_id))
        .order_by_asc(wallet_transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a specific entry by its unique ID.
pub async fn get_transaction_by_id<C>(
    db: &C,
    transaction_id: i64,
) -> Result<Option<wallet_transaction::Model>>
where
    C: ConnectionTrait,
{
    WalletTransaction::find_by_id(transaction_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// The pending entry of `tx_type` for `game` on this wallet, if any.
pub async fn find_pending_game_transaction<C>(
    db: &C,
    wallet_id: i64,
    tx_type: TransactionType,
    game: GameName,
) -> Result<Option<wallet_transaction::Model>>
where
    C: ConnectionTrait,
{
    WalletTransaction::find()
        .filter(wallet_transaction::Column::WalletId.eq(wallet_id))
        .filter(wallet_transaction::Column::TxType.eq(tx_type))
        .filter(wallet_transaction::Column::GameName.eq(game))
        .filter(wallet_transaction::Column::Status.eq(TransactionStatus::Pending))
        .order_by_asc(wallet_transaction::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Fails with [`Error::DuplicateRequest`] if a credit or redeem is already pending for `game`.
pub async fn ensure_game_slot_free<C>(db: &C, wallet_id: i64, game: GameName) -> Result<()>
where
    C: ConnectionTrait,
{
    let outstanding = WalletTransaction::find()
        .filter(wallet_transaction::Column::WalletId.eq(wallet_id))
        .filter(wallet_transaction::Column::GameName.eq(game))
        .filter(wallet_transaction::Column::Status.eq(TransactionStatus::Pending))
        .filter(wallet_transaction::Column::TxType.is_in([
            TransactionType::GameCredit,
            TransactionType::GameWithdrawal,
        ]))
        .one(db)
        .await?;

    match outstanding {
        Some(entry) => Err(Error::DuplicateRequest {
            game: game.to_string(),
            status: format!("{} {}", entry.status, entry.tx_type),
        }),
        None => Ok(()),
    }
}

/// The deposit carrying `tx_hash` on this wallet, if it was already applied.
pub async fn find_deposit_by_hash<C>(
    db: &C,
    wallet_id: i64,
    tx_hash: &str,
) -> Result<Option<wallet_transaction::Model>>
where
    C: ConnectionTrait,
{
    WalletTransaction::find()
        .filter(wallet_transaction::Column::WalletId.eq(wallet_id))
        .filter(wallet_transaction::Column::TxType.eq(TransactionType::Deposit))
        .filter(wallet_transaction::Column::TxHash.eq(tx_hash))
        .one(db)
        .await
        .map_err(Into::into)
}

/// True if the wallet has a withdrawal awaiting payout.
pub async fn has_pending_withdrawal<C>(db: &C, wallet_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let pending = WalletTransaction::find()
        .filter(wallet_transaction::Column::WalletId.eq(wallet_id))
        .filter(wallet_transaction::Column::TxType.eq(TransactionType::Withdrawal))
        .filter(wallet_transaction::Column::Status.eq(TransactionStatus::Pending))
        .count(db)
        .await?;
    Ok(pending > 0)
}

/// Moves a `pending` entry to `to`.
///
/// The update only matches while the stored status is still `pending`; if another writer
/// settled the entry first, this fails with [`Error::NoPendingRequest`].
pub async fn settle_transaction<C>(
    db: &C,
    entry: &wallet_transaction::Model,
    to: TransactionStatus,
) -> Result<wallet_transaction::Model>
where
    C: ConnectionTrait,
{
    let result = WalletTransaction::update_many()
        .col_expr(wallet_transaction::Column::Status, Expr::value(to))
        .filter(wallet_transaction::Column::Id.eq(entry.id))
        .filter(wallet_transaction::Column::Status.eq(TransactionStatus::Pending))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::NoPendingRequest {
            request: format!("{} #{}", entry.tx_type, entry.id),
        });
    }

    Ok(wallet_transaction::Model {
        status: to,
        ..entry.clone()
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_append_preserves_insertion_order() -> Result<()> {
        let (db, wallet) = setup_with_wallet("user-1").await?;

        let first = append_transaction(
            &db,
            wallet.id,
            NewTransaction::new(
                TransactionType::Deposit,
                10.0,
                TransactionStatus::Completed,
                "first",
            )
            .with_asset(Asset::Btc, Network::Btc)
            .with_tx_hash("hash-1"),
        )
        .await?;
        let second = append_transaction(
            &db,
            wallet.id,
            NewTransaction::new(
                TransactionType::GameCredit,
                -4.0,
                TransactionStatus::Pending,
                "second",
            )
            .with_game(GameName::Juwa, Some("J-1".to_string())),
        )
        .await?;

        let log = get_transactions_for_wallet(&db, wallet.id).await?;
        assert_eq!(log, vec![first.clone(), second.clone()]);
        assert_eq!(second.game_name, Some(GameName::Juwa));
        assert_eq!(second.game_id.as_deref(), Some("J-1"));
        assert_eq!(first.tx_hash.as_deref(), Some("hash-1"));
        assert_eq!(first.tips, 0.0);

        let found = get_transaction_by_id(&db, second.id).await?.unwrap();
        assert_eq!(found, second);
        assert!(get_transaction_by_id(&db, 999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_settle_only_once() -> Result<()> {
        let (db, wallet) = setup_with_wallet("user-1").await?;
        let pending = append_transaction(
            &db,
            wallet.id,
            NewTransaction::new(
                TransactionType::GameWithdrawal,
                20.0,
                TransactionStatus::Pending,
                "redeem",
            )
            .with_game(GameName::YoLo, None),
        )
        .await?;

        let settled = settle_transaction(&db, &pending, TransactionStatus::Completed).await?;
        assert_eq!(settled.status, TransactionStatus::Completed);

        let again = settle_transaction(&db, &pending, TransactionStatus::Rejected).await;
        assert!(matches!(again, Err(Error::NoPendingRequest { request: _ })));

        let stored = get_transaction_by_id(&db, pending.id).await?.unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_lookups() -> Result<()> {
        let (db, wallet) = setup_with_wallet("user-1").await?;
        ensure_game_slot_free(&db, wallet.id, GameName::Juwa).await?;
        assert!(!has_pending_withdrawal(&db, wallet.id).await?);

        append_transaction(
            &db,
            wallet.id,
            NewTransaction::new(
                TransactionType::GameCredit,
                -5.0,
                TransactionStatus::Pending,
                "credit",
            )
            .with_game(GameName::Juwa, None),
        )
        .await?;
        append_transaction(
            &db,
            wallet.id,
            NewTransaction::new(
                TransactionType::Withdrawal,
                -1.0,
                TransactionStatus::Pending,
                "payout",
            )
            .with_asset(Asset::Usdt, Network::Trc20)
            .with_withdrawal_address("T-addr"),
        )
        .await?;

        assert!(matches!(
            ensure_game_slot_free(&db, wallet.id, GameName::Juwa).await,
            Err(Error::DuplicateRequest { game: _, status: _ })
        ));
        ensure_game_slot_free(&db, wallet.id, GameName::MilkyWay).await?;
        assert!(has_pending_withdrawal(&db, wallet.id).await?);

        let credit = find_pending_game_transaction(
            &db,
            wallet.id,
            TransactionType::GameCredit,
            GameName::Juwa,
        )
        .await?;
        assert!(credit.is_some());
        let redeem = find_pending_game_transaction(
            &db,
            wallet.id,
            TransactionType::GameWithdrawal,
            GameName::Juwa,
        )
        .await?;
        assert!(redeem.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_slot_index_rejects_second_entry() -> Result<()> {
        let (db, wallet) = setup_with_wallet("user-1").await?;
        let entry = || {
            NewTransaction::new(
                TransactionType::GameCredit,
                -5.0,
                TransactionStatus::Pending,
                "credit",
            )
            .with_game(GameName::OrionStar, None)
        };

        append_transaction(&db, wallet.id, entry()).await?;
        let result = append_transaction(&db, wallet.id, entry()).await;
        assert!(matches!(result, Err(Error::Conflict { message: _ })));
        Ok(())
    }
}
