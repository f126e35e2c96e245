//! Return entity - Goods a customer handed back, settled by credit note or cash refund.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a return is settled with the customer
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Reduces the customer's balance by the return total
    #[sea_orm(string_value = "credit_note")]
    CreditNote,
    /// Refunded in cash, no balance effect
    #[sea_orm(string_value = "cash_refund")]
    CashRefund,
}

/// Return database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "returns")]
pub struct Model {
    /// Unique identifier for the return
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer handing the goods back
    pub customer_id: i64,
    /// Customer name at the time of the return
    pub customer_name: String,
    /// Sale the goods came from, when known
    pub sale_id: Option<i64>,
    /// Value of the returned goods
    pub total: f64,
    /// Credit note or cash refund
    pub settlement: Settlement,
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

/// Defines relationships between Return and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each return belongs to one customer
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
