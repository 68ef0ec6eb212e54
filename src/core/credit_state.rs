//! Credit sub-state machine for a game account.
//!
//! ```text
//! None ──request_credit──▶ Pending ──approve_credit──▶ Success
//!   ▲                         │                          │
//!   └────disapprove_credit────┘                    request_redeem
//!   ▲                                                    ▼
//!   └──────────approve_redeem / disapprove_redeem─── PendingRedeem
//! ```
//!
//! Each transition consumes the current state and returns the next one, or the error the
//! workflow reports when the move is illegal. The persisted form is the
//! `(credit_status, credit_amount, requested_amount)` column triple on the game account.

use crate::{
    entities::{CreditStatus, game_account},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::Set;

/// Credit sub-state of one game account.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CreditState {
    /// Nothing outstanding and nothing credited
    None,
    /// Credit requested, balance already reserved
    Pending {
        /// Amount awaiting approval
        requested: f64,
    },
    /// Credit delivered to the game
    Success {
        /// Amount currently in the game
        amount: f64,
    },
    /// Redeem requested, balance not yet credited
    PendingRedeem {
        /// Amount the user claims back
        requested: f64,
        /// Credit that was in the game when the redeem was requested
        amount: f64,
    },
}

impl CreditState {
    /// Reads the state from its persisted columns.
    #[must_use]
    pub const fn from_account(account: &game_account::Model) -> Self {
        match account.credit_status {
            CreditStatus::None => Self::None,
            CreditStatus::Pending => Self::Pending {
                requested: account.requested_amount,
            },
            CreditStatus::Success => Self::Success {
                amount: account.credit_amount,
            },
            CreditStatus::PendingRedeem => Self::PendingRedeem {
                requested: account.requested_amount,
                amount: account.credit_amount,
            },
        }
    }

    /// Persisted tag for this state.
    #[must_use]
    pub const fn status(&self) -> CreditStatus {
        match self {
            Self::None => CreditStatus::None,
            Self::Pending { .. } => CreditStatus::Pending,
            Self::Success { .. } => CreditStatus::Success,
            Self::PendingRedeem { .. } => CreditStatus::PendingRedeem,
        }
    }

    /// `(credit_amount, requested_amount)` columns for this state.
    #[must_use]
    pub const fn amounts(&self) -> (f64, f64) {
        match *self {
            Self::None => (0.0, 0.0),
            Self::Pending { requested } => (0.0, requested),
            Self::Success { amount } => (amount, 0.0),
            Self::PendingRedeem { requested, amount } => (amount, requested),
        }
    }

    /// Writes this state into an active model, leaving other columns untouched.
    pub fn apply_to(&self, account: &mut game_account::ActiveModel) {
        let (amount, requested) = self.amounts();
        account.credit_status = Set(self.status());
        account.credit_amount = Set(amount);
        account.requested_amount = Set(requested);
        account.updated_at = Set(Utc::now());
    }

    /// `None | Success → Pending`.
    pub fn request_credit(self, game: &str, amount: f64) -> Result<Self> {
        match self {
            Self::None | Self::Success { .. } => Ok(Self::Pending { requested: amount }),
            Self::Pending { .. } | Self::PendingRedeem { .. } => Err(self.outstanding(game)),
        }
    }

    /// `Pending → Success`, crediting the requested amount to the game.
    pub fn approve_credit(self, game: &str) -> Result<Self> {
        match self {
            Self::Pending { requested } => Ok(Self::Success { amount: requested }),
            _ => Err(no_pending("credit", game)),
        }
    }

    /// `Pending → None`.
    pub fn disapprove_credit(self, game: &str) -> Result<Self> {
        match self {
            Self::Pending { .. } => Ok(Self::None),
            _ => Err(no_pending("credit", game)),
        }
    }

    /// `None | Success → PendingRedeem`.
    ///
    /// A redeem cannot start while a credit request is pending, so the wallet never holds two
    /// pending game entries for the same game.
    pub fn request_redeem(self, game: &str, amount: f64) -> Result<Self> {
        match self {
            Self::None => Ok(Self::PendingRedeem {
                requested: amount,
                amount: 0.0,
            }),
            Self::Success { amount: credited } => Ok(Self::PendingRedeem {
                requested: amount,
                amount: credited,
            }),
            Self::Pending { .. } | Self::PendingRedeem { .. } => Err(self.outstanding(game)),
        }
    }

    /// `PendingRedeem → None`.
    pub fn approve_redeem(self, game: &str) -> Result<Self> {
        match self {
            Self::PendingRedeem { .. } => Ok(Self::None),
            _ => Err(no_pending("redeem", game)),
        }
    }

    /// `PendingRedeem → None`.
    pub fn disapprove_redeem(self, game: &str) -> Result<Self> {
        match self {
            Self::PendingRedeem { .. } => Ok(Self::None),
            _ => Err(no_pending("redeem", game)),
        }
    }

    fn outstanding(&self, game: &str) -> Error {
        Error::DuplicateRequest {
            game: game.to_string(),
            status: self.status().to_string(),
        }
    }
}

fn no_pending(request: &str, game: &str) -> Error {
    Error::NoPendingRequest {
        request: format!("{request} for {game}"),
    }
}
