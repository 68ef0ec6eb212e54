//! Wallet transaction entity - The append-only log attached to a wallet.
//!
//! Rows are only ever inserted; afterwards the `status` column is the single field that changes.
//! The autoincrement `id` gives insertion order, which is also chronological order.
//! Debits (`game_credit`, `withdrawal`) are stored with negative amounts because the balance was
//! already reduced when the row was written.

use super::game_account::GameName;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// External crypto deposit, always created `completed`
    #[sea_orm(string_value = "deposit")]
    Deposit,
    /// Platform balance moved into a game account
    #[sea_orm(string_value = "game_credit")]
    GameCredit,
    /// Game winnings redeemed back to the platform balance
    #[sea_orm(string_value = "game_withdrawal")]
    GameWithdrawal,
    /// External payout to a crypto address
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
}

/// Lifecycle of a ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting an admin decision
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Settled; its balance effect is final
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Payout could not be sent
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Declined by an admin
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Deposit/withdrawal asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// Bitcoin
    #[sea_orm(string_value = "btc")]
    Btc,
    /// Tether USD
    #[sea_orm(string_value = "usdt")]
    Usdt,
}

/// Chain an asset moves on. BTC only ever uses `Btc`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Network {
    /// Bitcoin mainnet
    #[sea_orm(string_value = "btc")]
    Btc,
    /// Tron, TRC-20 token
    #[sea_orm(string_value = "trc20")]
    Trc20,
    /// BNB Smart Chain, BEP-20 token
    #[sea_orm(string_value = "bep20")]
    Bep20,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// Wallet transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallet_transactions")]
pub struct Model {
    /// Unique identifier, also the insertion order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Wallet this entry belongs to
    pub wallet_id: i64,
    /// Kind of entry
    pub tx_type: TransactionType,
    /// Signed amount in USD (negative for debits applied at creation)
    pub amount: f64,
    /// Current status, the only mutable column
    pub status: TransactionStatus,
    /// Asset for deposits and withdrawals
    pub asset: Option<Asset>,
    /// Network for deposits and withdrawals
    pub network: Option<Network>,
    /// Game for credit and redeem entries
    pub game_name: Option<GameName>,
    /// External game account id at the time of the request
    pub game_id: Option<String>,
    /// External chain hash, the deduplication key for deposits
    pub tx_hash: Option<String>,
    /// Destination address for withdrawals
    pub withdrawal_address: Option<String>,
    /// Fee withheld from a redeem payout
    pub tips: f64,
    /// Human-readable summary
    pub description: String,
    /// When the entry was written
    pub timestamp: DateTimeUtc,
}

impl Model {
    /// Amount this entry contributes to the wallet balance once it is `completed`.
    /// Redeems pay out `amount - tips`.
    #[must_use]
    pub fn net_effect(&self) -> f64 {
        self.amount - self.tips
    }

    /// True for a `pending` debit whose amount is already reflected in the balance.
    #[must_use]
    pub fn is_pending_debit(&self) -> bool {
        self.status == TransactionStatus::Pending
            && matches!(
                self.tx_type,
                TransactionType::GameCredit | TransactionType::Withdrawal
            )
    }
}

/// Defines relationships between `WalletTransaction` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one wallet
    #[sea_orm(
        belongs_to = "super::wallet::Entity",
        from = "Column::WalletId",
        to = "super::wallet::Column::Id"
    )]
    Wallet,
}

impl Related<super::wallet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
