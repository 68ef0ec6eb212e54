//! Game account entity - A user's sub-account on one supported game platform.
//!
//! Each user owns at most one account per [`GameName`]. The three `credit_*`/`requested_amount`
//! columns persist the credit sub-state machine; code should read and write them through
//! [`crate::core::credit_state::CreditState`] rather than touching them directly.
//! `version` is bumped on every write and used for compare-and-swap updates.

use crate::errors::Error;
use sea_orm::Iterable;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Catalog of supported game platforms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum GameName {
    /// Fire Kirin
    #[sea_orm(string_value = "Firekirin")]
    Firekirin,
    /// Juwa
    #[sea_orm(string_value = "Juwa")]
    Juwa,
    /// Orion Stars
    #[sea_orm(string_value = "OrionStar")]
    OrionStar,
    /// Cash Machine
    #[sea_orm(string_value = "CashMachine")]
    CashMachine,
    /// Game Vault
    #[sea_orm(string_value = "GameVault")]
    GameVault,
    /// YoLo
    #[sea_orm(string_value = "YoLo")]
    YoLo,
    /// Milky Way
    #[sea_orm(string_value = "MilkyWay")]
    MilkyWay,
    /// Panda Master
    #[sea_orm(string_value = "PandaMaster")]
    PandaMaster,
}

impl fmt::Display for GameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

impl FromStr for GameName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::iter()
            .find(|game| game.to_value() == trimmed)
            .ok_or_else(|| Error::Validation {
                message: format!("Unsupported game '{trimmed}'"),
            })
    }
}

/// Whether an admin has assigned an external game id yet
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    /// Requested, no game id yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Game id assigned
    #[sea_orm(string_value = "active")]
    Active,
}

/// Persisted tag of the credit sub-state
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    /// No credit activity
    #[sea_orm(string_value = "none")]
    None,
    /// Credit request awaiting approval
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Last credit was approved
    #[sea_orm(string_value = "success")]
    Success,
    /// Redeem request awaiting approval
    #[sea_orm(string_value = "pending_redeem")]
    PendingRedeem,
}

impl fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// Game account database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "game_accounts")]
pub struct Model {
    /// Unique identifier for the account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    pub user_id: String,
    /// Platform this account lives on
    pub game_name: GameName,
    /// External account id, `None` until an admin assigns one
    pub game_id: Option<String>,
    /// `pending` until activated, never reverts
    pub profile_status: ProfileStatus,
    /// Credit currently held in the game
    pub credit_amount: f64,
    /// Credit sub-state tag
    pub credit_status: CreditStatus,
    /// Amount of the outstanding credit or redeem request
    pub requested_amount: f64,
    /// Optimistic concurrency counter
    pub version: i64,
    /// When the account was requested
    pub created_at: DateTimeUtc,
    /// When the account was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// True once an admin has assigned a game id.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.profile_status == ProfileStatus::Active
    }
}

/// `GameAccount` is keyed by `user_id`, which is not a foreign key to any ledger table
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
