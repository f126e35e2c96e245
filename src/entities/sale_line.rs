//! Sale line entity - One product line of a sale, priced at preparation time.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sale line database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sale_lines")]
pub struct Model {
    /// Unique identifier for the sale line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Sale this line belongs to
    pub sale_id: i64,
    /// Product sold
    pub product_id: i64,
    /// Product name at preparation
    pub product_name: String,
    /// Quantity sold, always > 0
    pub qty: f64,
    /// Resolved unit price (customer override or base price)
    pub price: f64,
    /// `qty * price`
    pub total: f64,
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

/// Defines relationships between SaleLine and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one sale
    #[sea_orm(
        belongs_to = "super::sale::Entity",
        from = "Column::SaleId",
        to = "super::sale::Column::Id"
    )]
    Sale,
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sale.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
