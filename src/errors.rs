//! Unified error type for the ledger.
//!
//! Every failure maps onto one [`ErrorKind`] so callers can tell validation problems apart from
//! missing records, lost races, short balances and storage faults.

use sea_orm::{DbErr, RuntimeErr, SqlErr, sqlx};
use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input. No state was touched.
    Validation,
    /// Wallet, game account, or transaction does not exist.
    NotFound,
    /// Duplicate request, duplicate registration, or a lost concurrent race.
    Conflict,
    /// Wallet balance cannot cover the requested debit.
    InsufficientFunds,
    /// Caller's role does not allow the operation.
    Forbidden,
    /// The database failed or the unit of work was aborted.
    Storage,
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings file or environment is unusable
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// Malformed caller input
    #[error("Invalid input: {message}")]
    Validation {
        /// Which input was rejected and why
        message: String,
    },

    /// Amount is not a positive, finite number
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Caller lacks the admin role
    #[error("Action '{action}' requires the admin role")]
    Forbidden {
        /// Name of the attempted action
        action: String,
    },

    /// User has no wallet yet
    #[error("Wallet not found for user {user_id}")]
    WalletNotFound {
        /// Owner that was looked up
        user_id: String,
    },

    /// User has no profile for the game
    #[error("Game profile {game} not found for user {user_id}")]
    GameAccountNotFound {
        /// Owner that was looked up
        user_id: String,
        /// Game that was looked up
        game: String,
    },

    /// Transaction id is unknown, or belongs to another wallet
    #[error("Transaction {id} not found")]
    TransactionNotFound {
        /// The requested transaction id
        id: i64,
    },

    /// Game profile is still waiting for a game id
    #[error("Game profile {game} must be active")]
    ProfileNotActive {
        /// Game of the inactive profile
        game: String,
    },

    /// Game id was already assigned
    #[error("Game profile {game} is already active")]
    ProfileAlreadyActive {
        /// Game of the active profile
        game: String,
        /// The id assigned earlier
        game_id: Option<String>,
    },

    /// User already requested a profile for the game
    #[error("A {game} profile already exists")]
    DuplicateGameProfile {
        /// Game of the existing profile
        game: String,
    },

    /// A credit or redeem request for the game is still outstanding
    #[error("A {status} request is already outstanding for {game}")]
    DuplicateRequest {
        /// Game with the outstanding request
        game: String,
        /// Credit status of the outstanding request
        status: String,
    },

    /// Wallet already has a withdrawal awaiting settlement
    #[error("A withdrawal request is already pending")]
    PendingWithdrawal,

    /// Nothing is waiting to be approved or disapproved
    #[error("No pending {request} request found")]
    NoPendingRequest {
        /// Kind of request that was expected
        request: String,
    },

    /// Row changed between read and write
    #[error("Concurrent update to {entity} detected, retry the operation")]
    StaleWrite {
        /// Kind of row that changed
        entity: &'static str,
    },

    /// Unique constraint rejected the write
    #[error("Conflict: {message}")]
    Conflict {
        /// Database message naming the constraint
        message: String,
    },

    /// Balance cannot cover the debit
    #[error("Insufficient balance: have {current}, need {required}")]
    InsufficientFunds {
        /// Balance at the time of the request
        current: f64,
        /// Amount the debit needed
        required: f64,
    },

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(DbErr),

    /// BEGIN or COMMIT of a unit of work failed
    #[error("Unit of work aborted: {message}")]
    TransactionAborted {
        /// Underlying database message
        message: String,
    },

    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps the error onto the ledger's error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::Validation { .. } | Self::InvalidAmount { .. } => {
                ErrorKind::Validation
            }
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::WalletNotFound { .. }
            | Self::GameAccountNotFound { .. }
            | Self::TransactionNotFound { .. } => ErrorKind::NotFound,
            Self::ProfileNotActive { .. }
            | Self::ProfileAlreadyActive { .. }
            | Self::DuplicateGameProfile { .. }
            | Self::DuplicateRequest { .. }
            | Self::PendingWithdrawal
            | Self::NoPendingRequest { .. }
            | Self::StaleWrite { .. }
            | Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::Database(_) | Self::TransactionAborted { .. } | Self::Io(_) => ErrorKind::Storage,
        }
    }

    /// True when repeating the same call may succeed: lost optimistic races and storage
    /// contention. Validation, missing records and short balances are never retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StaleWrite { .. } | Self::TransactionAborted { .. } => true,
            Self::Database(err) => is_contention(err),
            _ => false,
        }
    }
}

// SQLite primary result codes; extended codes carry these in the low byte
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Pool exhaustion, or SQLite reporting the database busy or locked.
fn is_contention(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::ConnectionAcquire(_) => return true,
        DbErr::Conn(runtime) | DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime,
        _ => return false,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::PoolTimedOut) => true,
        RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        RuntimeErr::Internal(message) => message.contains("database is locked"),
        _ => false,
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message)) => Self::Conflict { message },
            _ => Self::Database(err),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
