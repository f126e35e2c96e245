//! Crate move entity - Append-only record driving a distributor's crate and money balances.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of distributor move, persisted as the `type` column
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CrateMoveType {
    /// Crates leave the bakery
    #[sea_orm(string_value = "out")]
    Out,
    /// Crates come back
    #[sea_orm(string_value = "in")]
    In,
    /// Manual correction
    #[sea_orm(string_value = "adjust")]
    Adjust,
    /// Cash collected from the distributor
    #[sea_orm(string_value = "cash")]
    Cash,
}

/// Crate move database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crate_moves")]
pub struct Model {
    /// Unique identifier for the crate move
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Distributor whose balances the move changed
    pub distributor_id: i64,
    /// Distributor name at the time of the move
    pub distributor_name: String,
    /// Out, in, adjust or cash
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub move_type: CrateMoveType,
    /// Boxes moved by an `out`/`in` move, zero otherwise
    pub boxes_qty: i64,
    /// Signed change applied to `crates_balance`
    pub delta_boxes: i64,
    /// Product carried in the crates, if any
    pub product_id: Option<i64>,
    /// Product name at the time of the move, empty without goods
    pub product_name: String,
    /// Product units packed in each crate
    pub units_per_box: i64,
    /// `boxes_qty * units_per_box`
    pub total_units: i64,
    /// Product list price used to value the goods
    pub unit_price: f64,
    /// Signed change applied to `money_balance`
    pub amount: f64,
    /// Crate balance right after the move
    pub crates_after: i64,
    /// Money balance right after the move
    pub money_after: f64,
    /// Free-text note
    pub note: String,
    /// Timestamp of the move
    pub created_at: String,
    /// Actor that recorded the move
    pub created_by: String,
}

/// Defines relationships between CrateMove and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each move belongs to one distributor
    #[sea_orm(
        belongs_to = "super::distributor::Entity",
        from = "Column::DistributorId",
        to = "super::distributor::Column::Id"
    )]
    Distributor,
}

impl Related<super::distributor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Distributor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
