//! Core business logic - framework-agnostic ledger operations.
//!
//! Every public mutating operation runs as one [`engine::AtomicUnit`] through
//! [`engine::Engine::run`]: all reads first, then all writes, committed together or not at all.

pub mod bom;
pub mod catalog;
pub mod count;
pub mod customer;
pub mod distributor;
pub mod engine;
pub mod move_log;
pub mod production;
pub mod report;
pub mod sale;
pub mod stock;

pub use engine::{AtomicUnit, Engine};
