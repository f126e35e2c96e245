//! Inventory count entity - Header of a stocktake, `draft` until posted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which stock tables a count covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CountScope {
    /// Raw materials only
    #[sea_orm(string_value = "materials")]
    Materials,
    /// Finished products only
    #[sea_orm(string_value = "products")]
    Products,
    /// Materials and products
    #[sea_orm(string_value = "both")]
    Both,
}

impl CountScope {
    /// True when materials are counted
    #[must_use]
    pub const fn includes_materials(self) -> bool {
        matches!(self, Self::Materials | Self::Both)
    }

    /// True when products are counted
    #[must_use]
    pub const fn includes_products(self) -> bool {
        matches!(self, Self::Products | Self::Both)
    }
}

/// Lifecycle of a count
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    /// Lines may be loaded and counted
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Stock corrected; the count is read-only
    #[sea_orm(string_value = "posted")]
    Posted,
}

/// Inventory count database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_counts")]
pub struct Model {
    /// Unique identifier for the count
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Items covered by the count
    pub scope: CountScope,
    /// Draft until posted
    pub status: CountStatus,
    /// Free-text note
    pub note: String,
    /// Set when the count is posted
    pub posted_at: Option<String>,
    /// Actor that posted the count
    pub posted_by: Option<String>,
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

/// Defines relationships between InventoryCount and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One count has many lines
    #[sea_orm(has_many = "super::inventory_count_line::Entity")]
    Lines,
}

impl Related<super::inventory_count_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
