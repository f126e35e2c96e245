//! Product entity - Finished goods produced from a bill of materials and sold.
//!
//! Like materials, `qty_on_hand` is never negative and every write bumps `version`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Unique identifier for the product
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "Rolls")
    pub name: String,
    /// Unit the product is sold in (e.g., "piece", "tray")
    pub sale_unit: String,
    /// Current stock, never negative
    pub qty_on_hand: f64,
    /// Base price per sale unit, used unless a customer price overrides it
    pub price: f64,
    /// Reorder threshold; zero disables the low-stock alert
    pub min_qty: f64,
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

/// Defines relationships between Product and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One product has many BOM lines
    #[sea_orm(has_many = "super::bom_line::Entity")]
    BomLines,
    /// One product has many production orders
    #[sea_orm(has_many = "super::production_order::Entity")]
    ProductionOrders,
}

impl Related<super::bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomLines.def()
    }
}

impl Related<super::production_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductionOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
