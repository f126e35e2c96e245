//! Sale entity - An order moving through the prepare → deliver lifecycle.
//!
//! Stock is deducted once when the sale is prepared; the customer balance effect is
//! applied once when it is delivered. Field names are relied on by invoice and
//! statement rendering and must stay as they are.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sale lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Stock deducted, waiting for delivery
    #[sea_orm(string_value = "prepared")]
    Prepared,
    /// Delivered and paid or charged
    #[sea_orm(string_value = "done")]
    Done,
}

/// How a delivered sale was settled
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Paid on delivery
    #[sea_orm(string_value = "cash")]
    Cash,
    /// Charged to the customer's balance
    #[sea_orm(string_value = "credit")]
    Credit,
}

/// Sale database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
    /// Unique identifier for the sale
    #[sea_orm(primary_key)]
    pub id: i64,
    /// `INV-YYYYMMDD-NNNNNN`, assigned at preparation
    pub invoice_no: String,
    /// `None` for walk-in sales
    pub customer_id: Option<i64>,
    /// Customer name at preparation, empty for walk-ins
    pub customer_name: String,
    /// Flat discount taken off the total
    pub discount: f64,
    /// Sum of line totals
    pub total: f64,
    /// `total - discount`
    pub net: f64,
    /// `None` until delivered
    pub payment_type: Option<PaymentType>,
    /// Prepared or done
    pub status: SaleStatus,
    /// Cash received at delivery
    pub amount_paid: f64,
    /// Cash overpayment turned into customer credit
    pub extra_credit: f64,
    /// Cash shortfall added to the customer's debt
    pub unpaid_debt: f64,
    /// True once the delivery's balance change has been written to the customer
    pub balance_applied: bool,
    /// Set once at delivery
    pub delivered_at: Option<String>,
    /// Actor that delivered the sale
    pub delivered_by: Option<String>,
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

/// Defines relationships between Sale and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each sale may belong to one customer
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    /// One sale has many lines
    #[sea_orm(has_many = "super::sale_line::Entity")]
    Lines,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::sale_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
