//! Role-aware facade over the ledger workflows.
//!
//! Callers authenticate elsewhere and hand the engine an [`Actor`]. User operations always act on
//! the actor's own wallet; admin operations name the target user explicitly and fail with
//! [`Error::Forbidden`] for non-admins. Every outcome is counted in the shared [`Telemetry`].

use crate::{
    config::settings::LedgerSettings,
    core::{
        credit::{self, GameReceipt},
        deposit::{self, BatchReport, DepositOutcome, DepositRecord},
        game_profile,
        history::{self, TransactionFilter, TransactionHistory},
        redeem,
        wallet::{self, AddressGenerator, AddressListing, WalletSummary},
        withdrawal::{self, WithdrawalOutcome, WithdrawalReceipt},
    },
    entities::{Asset, GameName, Network, game_account, wallet as wallet_entity},
    errors::{Error, Result},
    telemetry::{Operation, Telemetry},
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tracing::debug;

/// Role supplied by the auth gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Player acting on their own wallet
    User,
    /// Operator who approves requests and assigns game ids
    Admin,
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Authenticated user id
    pub user_id: String,
    /// Role granted by the auth gate
    pub role: Role,
}

impl Actor {
    /// Caller with the user role.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::User,
        }
    }

    /// Caller with the admin role.
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    /// True for the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden {
                action: action.to_string(),
            })
        }
    }
}

/// Entry point for every ledger operation.
pub struct WalletEngine {
    db: DatabaseConnection,
    settings: LedgerSettings,
    telemetry: Arc<Telemetry>,
    addresses: Arc<dyn AddressGenerator>,
}

impl WalletEngine {
    /// Wires the engine to its database, settings, counters, and address source.
    pub fn new(
        db: DatabaseConnection,
        settings: LedgerSettings,
        telemetry: Arc<Telemetry>,
        addresses: Arc<dyn AddressGenerator>,
    ) -> Self {
        Self {
            db,
            settings,
            telemetry,
            addresses,
        }
    }

    /// Underlying connection.
    #[must_use]
    pub const fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Settings the engine was built with.
    #[must_use]
    pub const fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Shared operation counters.
    #[must_use]
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    async fn observe<T, F>(&self, operation: Operation, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = work.await;
        if let Err(e) = &result {
            debug!("{} failed: {}", operation, e);
        }
        self.telemetry.record(operation, &result);
        result
    }

    // --- Wallet ---

    /// Creates the actor's wallet on first use and returns it.
    pub async fn bootstrap_wallet(&self, actor: &Actor) -> Result<wallet_entity::Model> {
        self.observe(
            Operation::BootstrapWallet,
            wallet::bootstrap_wallet(&self.db, &actor.user_id, &*self.addresses),
        )
        .await
    }

    /// Balances and deposit addresses of the actor's wallet.
    pub async fn wallet_summary(&self, actor: &Actor) -> Result<WalletSummary> {
        wallet::get_wallet_summary(&self.db, &actor.user_id).await
    }

    /// Paginated history of the actor's wallet. Page sizes are clamped to the configured maximum.
    pub async fn transaction_history(
        &self,
        actor: &Actor,
        filter: &TransactionFilter,
    ) -> Result<TransactionHistory> {
        history::get_transaction_history(&self.db, &actor.user_id, filter, &self.settings.history)
            .await
    }

    /// Admin: every wallet's deposit addresses.
    pub async fn list_wallet_addresses(&self, actor: &Actor) -> Result<AddressListing> {
        actor.require_admin("list wallet addresses")?;
        wallet::list_wallet_addresses(&self.db).await
    }

    // --- Game profiles ---

    /// Opens a pending profile for the actor on `game`.
    pub async fn request_game_profile(
        &self,
        actor: &Actor,
        game: GameName,
    ) -> Result<game_account::Model> {
        self.observe(
            Operation::RequestGameProfile,
            game_profile::request_game_profile(&self.db, &actor.user_id, game),
        )
        .await
    }

    /// Admin: activates `user_id`'s account on `game`.
    pub async fn assign_game_id(
        &self,
        actor: &Actor,
        user_id: &str,
        game: GameName,
        game_id: &str,
    ) -> Result<game_account::Model> {
        self.observe(Operation::AssignGameId, async {
            actor.require_admin("assign game id")?;
            game_profile::assign_game_id(&self.db, user_id, game, game_id).await
        })
        .await
    }

    /// Admins see every account, users only their own.
    pub async fn list_game_profiles(&self, actor: &Actor) -> Result<Vec<game_account::Model>> {
        if actor.is_admin() {
            game_profile::list_all_game_profiles(&self.db).await
        } else {
            game_profile::list_game_profiles_for_user(&self.db, &actor.user_id).await
        }
    }

    /// One account. Users may only look up their own.
    pub async fn game_profile(
        &self,
        actor: &Actor,
        user_id: &str,
        game: GameName,
    ) -> Result<game_account::Model> {
        if actor.user_id != user_id {
            actor.require_admin("view another user's game profile")?;
        }
        game_profile::require_game_account(&self.db, user_id, game).await
    }

    // --- Credits ---

    /// Moves `amount` from the actor's wallet toward `game`, pending approval.
    pub async fn request_credit(
        &self,
        actor: &Actor,
        game: GameName,
        amount: f64,
    ) -> Result<GameReceipt> {
        self.observe(
            Operation::RequestCredit,
            credit::request_credit(&self.db, &actor.user_id, game, amount),
        )
        .await
    }

    /// Admin: confirms the outstanding credit.
    pub async fn approve_credit(
        &self,
        actor: &Actor,
        user_id: &str,
        game: GameName,
    ) -> Result<GameReceipt> {
        self.observe(Operation::ApproveCredit, async {
            actor.require_admin("approve credit")?;
            credit::approve_credit(&self.db, user_id, game).await
        })
        .await
    }

    /// Admin: rejects the outstanding credit and refunds the wallet.
    pub async fn disapprove_credit(
        &self,
        actor: &Actor,
        user_id: &str,
        game: GameName,
    ) -> Result<GameReceipt> {
        self.observe(Operation::DisapproveCredit, async {
            actor.require_admin("disapprove credit")?;
            credit::disapprove_credit(&self.db, user_id, game).await
        })
        .await
    }

    // --- Redeems ---

    /// Asks to move `amount` of winnings back to the wallet, less `tips`.
    pub async fn request_redeem(
        &self,
        actor: &Actor,
        game: GameName,
        amount: f64,
        tips: f64,
    ) -> Result<GameReceipt> {
        self.observe(
            Operation::RequestRedeem,
            redeem::request_redeem(&self.db, &actor.user_id, game, amount, tips),
        )
        .await
    }

    /// Admin: credits the redeem to the wallet.
    pub async fn approve_redeem(
        &self,
        actor: &Actor,
        user_id: &str,
        game: GameName,
    ) -> Result<GameReceipt> {
        self.observe(Operation::ApproveRedeem, async {
            actor.require_admin("approve redeem")?;
            redeem::approve_redeem(&self.db, user_id, game).await
        })
        .await
    }

    /// Admin: drops the redeem without touching the balance.
    pub async fn disapprove_redeem(
        &self,
        actor: &Actor,
        user_id: &str,
        game: GameName,
    ) -> Result<GameReceipt> {
        self.observe(Operation::DisapproveRedeem, async {
            actor.require_admin("disapprove redeem")?;
            redeem::disapprove_redeem(&self.db, user_id, game).await
        })
        .await
    }

    // --- Withdrawals ---

    /// Debits the wallet and queues a payout to `address`.
    pub async fn initiate_withdraw(
        &self,
        actor: &Actor,
        asset: Asset,
        network: Option<Network>,
        address: &str,
        amount: f64,
    ) -> Result<WithdrawalReceipt> {
        self.observe(
            Operation::InitiateWithdraw,
            withdrawal::initiate_withdraw(
                &self.db,
                &actor.user_id,
                asset,
                network,
                address,
                amount,
            ),
        )
        .await
    }

    /// Admin: records the payout processor's verdict.
    pub async fn settle_withdrawal(
        &self,
        actor: &Actor,
        user_id: &str,
        transaction_id: i64,
        outcome: WithdrawalOutcome,
    ) -> Result<WithdrawalReceipt> {
        self.observe(Operation::SettleWithdrawal, async {
            actor.require_admin("settle withdrawal")?;
            withdrawal::settle_withdrawal(&self.db, user_id, transaction_id, outcome).await
        })
        .await
    }

    // --- Deposit feed ---

    /// Applies one deposit from the watcher.
    pub async fn apply_deposit(&self, record: &DepositRecord) -> Result<DepositOutcome> {
        let result = deposit::apply_deposit(&self.db, record).await;
        match &result {
            Ok(DepositOutcome::AlreadyApplied { .. }) => self.telemetry.record_duplicate_deposit(),
            _ => self.telemetry.record(Operation::ApplyDeposit, &result),
        }
        result
    }

    /// Applies a batch of deposits, bounded by `deposits.max_batch_size`.
    pub async fn apply_deposit_batch(&self, records: &[DepositRecord]) -> Result<BatchReport> {
        let report =
            deposit::apply_deposit_batch(&self.db, records, self.settings.deposits.max_batch_size)
                .await?;
        self.telemetry.record_batch(&report);
        Ok(report)
    }
}
