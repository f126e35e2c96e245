//! Material entity - Raw ingredients and packaging consumed by production.
//!
//! `qty_on_hand` is never negative. It only changes inside an engine unit that also
//! appends a stock move, and every write bumps `version`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Material database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "materials")]
pub struct Model {
    /// Unique identifier for the material
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "Flour")
    pub name: String,
    /// Unit of measure (e.g., "kg")
    pub unit: String,
    /// Current stock, never negative
    pub qty_on_hand: f64,
    /// Reorder threshold; zero disables the low-stock alert
    pub min_qty: f64,
    /// Unit cost of the most recent purchase
    pub last_cost: f64,
    /// Optimistic concurrency counter
    pub version: i64,
    /// Soft delete tombstone
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

/// Defines relationships between Material and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One material appears in many BOM lines
    #[sea_orm(has_many = "super::bom_line::Entity")]
    BomLines,
}

impl Related<super::bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
