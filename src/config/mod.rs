/// Database configuration and connection management
pub mod database;

/// Ledger behaviour settings loaded from config.toml
pub mod settings;

/// Catalog seed loading from config.toml
pub mod catalog;
