/// Deposit address pool configured by operators
pub mod address_pool;

/// Credit workflow - request, approve, disapprove
pub mod credit;

/// Credit sub-state machine of a game account
pub mod credit_state;

/// Deposit ingestion, single and batched
pub mod deposit;

/// Game profile requests and activation
pub mod game_profile;

/// Filtered, paginated transaction history
pub mod history;

/// Redeem workflow - request, approve, disapprove
pub mod redeem;

/// Append-only wallet transaction log
pub mod transaction;

/// Atomic unit of work over one database transaction
pub mod unit_of_work;

/// Wallet bootstrap, lookups, and balance mutation
pub mod wallet;

/// External payouts and their settlement
pub mod withdrawal;
