//! BOM line entity - One material requirement of a product's recipe.
//!
//! A product's bill of materials is the ordered set of its active lines; there is at
//! most one active line per (product, material) pair.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// BOM line database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_lines")]
pub struct Model {
    /// Unique identifier for the BOM line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Product this recipe line belongs to
    pub product_id: i64,
    /// Material consumed
    pub material_id: i64,
    /// Material consumed per produced unit, always > 0
    pub qty_per_unit: f64,
    /// Unit of `qty_per_unit`, copied from the material
    pub unit: String,
    /// Free-text note shown with the recipe
    pub note: String,
    /// Ordering within the recipe
    pub position: i32,
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

/// Defines relationships between BOM lines and the stock tables
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    /// Each line consumes one material
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
