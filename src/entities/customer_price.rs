//! Customer price entity - Per-customer override of a product's base price.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer price database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customer_prices")]
pub struct Model {
    /// Unique identifier for the price override
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer the price applies to
    pub customer_id: i64,
    /// Product being repriced
    pub product_id: i64,
    /// Unit price charged to this customer
    pub price: f64,
    /// Cleared overrides stay as inactive rows
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

/// Defines relationships between CustomerPrice and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each override belongs to one customer
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
