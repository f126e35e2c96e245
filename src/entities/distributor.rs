//! Distributor entity - Reseller holding the bakery's crates and owing for goods.
//!
//! `crates_balance` never goes below zero. `money_balance` is signed and unbounded.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Distributor database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "distributors")]
pub struct Model {
    /// Unique identifier for the distributor
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name, unique among active distributors
    pub name: String,
    /// Contact phone number
    pub phone: String,
    /// Crates currently held by the distributor
    pub crates_balance: i64,
    /// Amount the distributor owes for goods taken, net of returns and cash collected
    pub money_balance: f64,
    /// Optimistic concurrency counter, bumped on every guarded write
    pub version: i64,
    /// Soft delete flag; inactive rows are kept but hidden
    pub active: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Timestamp of the last change
    pub updated_at: String,
    /// Actor that created the row
    pub created_by: String,
    /// Actor behind the last change
    pub updated_by: String,
}

/// Defines relationships between Distributor and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One distributor has many crate moves
    #[sea_orm(has_many = "super::crate_move::Entity")]
    CrateMoves,
}

impl Related<super::crate_move::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CrateMoves.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
