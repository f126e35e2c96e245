//! Stock move entity - Append-only audit record of every stock quantity change.
//!
//! Rows are inserted by the move log and never updated or deleted. Summing `qty_delta`
//! over an item's moves reconstructs its `qty_on_hand`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of stock change, persisted as the `type` column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Goods received from a supplier
    #[sea_orm(string_value = "purchase")]
    Purchase,
    /// Goods leaving with a sale or a distributor
    #[sea_orm(string_value = "sale")]
    Sale,
    /// Material used by production
    #[sea_orm(string_value = "production_consume")]
    ProductionConsume,
    /// Product made by production
    #[sea_orm(string_value = "production_produce")]
    ProductionProduce,
    /// Manual correction or opening stock
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    /// Correction posted from an inventory count
    #[sea_orm(string_value = "count")]
    Count,
}

/// Which stock table an item reference points into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Row in `materials`
    #[sea_orm(string_value = "material")]
    Material,
    /// Row in `products`
    #[sea_orm(string_value = "product")]
    Product,
}

impl ItemType {
    /// Entity label used in error messages
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Material => "material",
            Self::Product => "product",
        }
    }
}

/// Stock move database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_moves")]
pub struct Model {
    /// Unique identifier for the move
    #[sea_orm(primary_key)]
    pub id: i64,
    /// What caused the change
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub move_type: MoveType,
    /// Kind of source document (e.g., "manual", "production_order", "sale_prepared")
    pub ref_type: String,
    /// Key of the source document, empty for manual moves
    pub ref_id: String,
    /// Material or product
    pub item_type: ItemType,
    /// Id within the table named by `item_type`
    pub item_id: i64,
    /// Item name at the time of the move
    pub item_name: String,
    /// Signed quantity change
    pub qty_delta: f64,
    /// Quantity on hand right after the move
    pub qty_after: f64,
    /// Unit of measure at the time of the move
    pub unit: String,
    /// Free-text note
    pub note: String,
    /// Timestamp of the move
    pub created_at: String,
    /// Actor that caused the move
    pub created_by: String,
}

/// Moves reference items by `(item_type, item_id)`, not by foreign key
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
