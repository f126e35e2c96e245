//! Inventory count line entity - System snapshot and physical count for one item.

use super::stock_move::ItemType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Inventory count line database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_count_lines")]
pub struct Model {
    /// Unique identifier for the count line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Count this line belongs to
    pub count_id: i64,
    /// Material or product
    pub item_type: ItemType,
    /// Id within the table named by `item_type`
    pub item_id: i64,
    /// Item name at the last load
    pub item_name: String,
    /// Unit of measure at the last load
    pub unit: String,
    /// `qty_on_hand` when the lines were last loaded
    pub system_qty: f64,
    /// `None` until the item has been counted
    pub counted_qty: Option<f64>,
    /// Soft delete flag; inactive rows are kept but hidden
    pub active: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Timestamp of the last change
    pub updated_at: String,
    /// Actor that created the row
    pub created_by: String,
    /// Last actor to reload or count this line
    pub updated_by: String,
}

/// Defines relationships between InventoryCountLine and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one count
    #[sea_orm(
        belongs_to = "super::inventory_count::Entity",
        from = "Column::CountId",
        to = "super::inventory_count::Column::Id"
    )]
    Count,
}

impl Related<super::inventory_count::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Count.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
