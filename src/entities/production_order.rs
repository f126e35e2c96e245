//! Production order entity - Immutable record of one completed production run.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Production order status; orders are only stored once complete
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    /// Materials consumed and product added
    #[sea_orm(string_value = "done")]
    Done,
}

/// Production order database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_orders")]
pub struct Model {
    /// Unique identifier for the production order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Product that was made
    pub product_id: i64,
    /// Product name at the time of production
    pub product_name: String,
    /// Units added to the product's stock
    pub qty_produced: f64,
    /// Production date as `YYYY-MM-DD`
    pub date: String,
    /// Always `done`
    pub status: ProductionStatus,
    /// Free-text note
    pub note: String,
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

/// Defines relationships between ProductionOrder and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each order produces one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
