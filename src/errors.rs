//! Unified error type for the ledger engine.
//!
//! Every engine operation raises one of these synchronously inside its atomic unit;
//! the unit is then rolled back with no partial effect. Messages carry enough context
//! (item name, required vs. available) for a caller to show them to a user.

use sea_orm::DbErr;
use thiserror::Error;

/// Errors raised by ledger operations
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced material/product/customer/distributor/sale/count is missing or inactive
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record looked up
        entity: &'static str,
        /// Key that was not found
        id: String,
    },

    /// Operation would drive a stock quantity below zero
    #[error("Insufficient stock for '{item}': required {required}, available {available}")]
    InsufficientStock {
        /// Item name
        item: String,
        /// Quantity the operation needs
        required: f64,
        /// Quantity on hand
        available: f64,
    },

    /// Manual adjustment that would leave a negative quantity
    #[error("Invalid adjustment of {delta} for '{item}': quantity would become {resulting}")]
    InvalidAdjustment {
        /// Item name
        item: String,
        /// Requested change
        delta: f64,
        /// Quantity the change would leave
        resulting: f64,
    },

    /// Crate move that would leave a distributor holding fewer than zero crates
    #[error("Crate balance for '{distributor}' would go negative: current {current}, change {delta}")]
    NegativeCrateBalance {
        /// Distributor name
        distributor: String,
        /// Crates held now
        current: i64,
        /// Requested change
        delta: i64,
    },

    /// Zero, negative or non-finite value where a positive one is required
    #[error("Invalid {field}: {value}")]
    InvalidQuantity {
        /// Name of the rejected input
        field: &'static str,
        /// Value supplied
        value: f64,
    },

    /// Zero or negative integer count (boxes, crate deltas)
    #[error("Invalid {field}: {value}")]
    InvalidCount {
        /// Name of the rejected input, or of the figure that would overflow
        field: &'static str,
        /// Value supplied
        value: i64,
    },

    /// Production requested for a product without active BOM lines
    #[error("No bill of materials defined for '{product}'")]
    MissingBom {
        /// Product name
        product: String,
    },

    /// Lifecycle violation, e.g. posting a non-draft count
    #[error("{entity} {id} is in an invalid state: {message}")]
    InvalidState {
        /// Kind of record
        entity: &'static str,
        /// Record key
        id: String,
        /// What was wrong with its state
        message: String,
    },

    /// A balance effect is required but the sale has no customer
    #[error("Sale {invoice} needs a customer to carry a balance change of {delta}")]
    NoLinkedCustomer {
        /// Invoice number of the sale
        invoice: String,
        /// Balance change that had nowhere to go
        delta: f64,
    },

    /// Optimistic write lost against a concurrent writer
    #[error("Concurrent modification of {entity} {id}")]
    Conflict {
        /// Kind of record whose version moved
        entity: &'static str,
        /// Record key
        id: String,
    },

    /// Input rejected by a business rule, e.g. a duplicate name
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable reason
        message: String,
    },

    /// Unreadable or invalid config.toml or settings
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable reason
        message: String,
    },

    /// Error from the store
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Filesystem error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors the engine re-runs a unit on: optimistic conflicts and
    /// transient store contention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Database(err) => {
                let message = err.to_string().to_lowercase();
                message.contains("database is locked") || message.contains("busy")
            }
            _ => false,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(entity: &'static str, id: impl ToString) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
