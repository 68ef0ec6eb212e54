/// Database configuration and connection management
pub mod database;

/// Ledger settings loading from a TOML file
pub mod settings;
