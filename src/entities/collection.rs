//! Collection entity - Money received from a customer against their balance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Collection database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "collections")]
pub struct Model {
    /// Unique identifier for the collection
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Paying customer
    pub customer_id: i64,
    /// Customer name at the time of collection
    pub customer_name: String,
    /// Amount collected, always > 0
    pub amount: f64,
    /// Free-text note
    pub note: String,
    /// Customer balance before the collection
    pub balance_before: f64,
    /// Customer balance after the collection
    pub balance_after: f64,
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

/// Defines relationships between Collection and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each collection belongs to one customer
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
