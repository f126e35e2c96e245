//! Customer entity - Account holder with a signed running balance.
//!
//! `balance > 0` means the customer owes the bakery, `balance < 0` means the bakery
//! owes the customer. The balance is a cache of the customer's statement and is only
//! written by sale delivery, collections and returns.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Unique identifier for the customer
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name, unique among active customers
    pub name: String,
    /// Contact phone number
    pub phone: String,
    /// Delivery area or route
    pub area: String,
    /// Debt or credit carried over when the account was opened
    pub opening_balance: f64,
    /// Signed running balance; positive means the customer owes
    pub balance: f64,
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

/// Defines relationships between Customer and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One customer has many sales
    #[sea_orm(has_many = "super::sale::Entity")]
    Sales,
    /// One customer has many collections
    #[sea_orm(has_many = "super::collection::Entity")]
    Collections,
    /// One customer has many returns
    #[sea_orm(has_many = "super::sale_return::Entity")]
    Returns,
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sales.def()
    }
}

impl Related<super::collection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Collections.def()
    }
}

impl Related<super::sale_return::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Returns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
