//! Customer ledger - accounts, special prices, collections, returns and statements.
//!
//! `Customer.balance` is a cached running total. It is only written through
//! [`apply_balance_delta`], by sale delivery, collections and credit-note returns, each
//! in the same unit as the record that explains the change. [`statement`] rebuilds the
//! balance from those records and must always land on the cached value.

use crate::{
    config::settings::OverCollectionPolicy,
    core::{
        engine::{
            AtomicUnit, EPS, Engine, ensure_single_row, require_name, require_non_negative,
            require_positive,
        },
        sale::balance_effect,
        stock,
    },
    entities::{
        Collection, Customer, CustomerPrice, ItemType, PaymentType, Sale, SaleReturn, SaleStatus,
        Settlement, collection, customer, customer_price, sale, sale_return,
    },
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, QueryOrder, Set, prelude::*, sea_query::Expr};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Editable customer attributes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    /// Display name
    pub name: String,
    /// Contact phone number
    #[serde(default)]
    pub phone: String,
    /// Delivery area or route
    #[serde(default)]
    pub area: String,
}

/// Active customer or `NotFound`.
pub(crate) async fn read_customer<C>(conn: &C, customer_id: i64) -> Result<customer::Model>
where
    C: ConnectionTrait,
{
    find_active(conn, customer_id)
        .await?
        .ok_or_else(|| Error::not_found("customer", customer_id))
}

pub(crate) async fn find_active<C>(conn: &C, customer_id: i64) -> Result<Option<customer::Model>>
where
    C: ConnectionTrait,
{
    Customer::find_by_id(customer_id)
        .filter(customer::Column::Active.eq(true))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Current state of an active customer.
pub async fn get_customer(db: &DatabaseConnection, customer_id: i64) -> Result<customer::Model> {
    read_customer(db, customer_id).await
}

/// Adds `delta` to a customer read earlier in the unit; returns the new balance.
pub(crate) async fn apply_balance_delta<C>(
    conn: &C,
    customer: &customer::Model,
    delta: f64,
    at: &str,
    actor: &str,
) -> Result<f64>
where
    C: ConnectionTrait,
{
    let balance = customer.balance + delta;
    let result = Customer::update_many()
        .col_expr(customer::Column::Balance, Expr::value(balance))
        .col_expr(customer::Column::Version, Expr::value(customer.version + 1))
        .col_expr(customer::Column::UpdatedAt, Expr::value(at))
        .col_expr(customer::Column::UpdatedBy, Expr::value(actor))
        .filter(customer::Column::Id.eq(customer.id))
        .filter(customer::Column::Version.eq(customer.version))
        .exec(conn)
        .await?;
    ensure_single_row(&result, "customer", customer.id)?;
    Ok(balance)
}

struct CreateCustomer<'a> {
    details: CustomerDetails,
    opening_balance: f64,
    actor: &'a str,
}

impl AtomicUnit for CreateCustomer<'_> {
    type Output = customer::Model;

    fn label(&self) -> &'static str {
        "create_customer"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<customer::Model> {
        let model = customer::ActiveModel {
            name: Set(self.details.name.clone()),
            phone: Set(self.details.phone.trim().to_string()),
            area: Set(self.details.area.trim().to_string()),
            opening_balance: Set(self.opening_balance),
            balance: Set(self.opening_balance),
            version: Set(0),
            active: Set(true),
            created_at: Set(at.to_string()),
            updated_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            updated_by: Set(self.actor.to_string()),
            ..Default::default()
        };
        Ok(model.insert(txn).await?)
    }
}

/// Opens a customer account; `opening_balance` is the debt (or credit, if negative) carried in.
#[instrument(skip(engine))]
pub async fn create_customer(
    engine: &Engine,
    details: &CustomerDetails,
    opening_balance: f64,
    actor: &str,
) -> Result<customer::Model> {
    let name = require_name("customer name", &details.name)?;
    if !opening_balance.is_finite() {
        return Err(Error::InvalidQuantity {
            field: "opening balance",
            value: opening_balance,
        });
    }

    let customer = engine
        .run(&CreateCustomer {
            details: CustomerDetails {
                name,
                ..details.clone()
            },
            opening_balance,
            actor,
        })
        .await?;
    info!(id = customer.id, name = %customer.name, opening_balance, "customer created");
    Ok(customer)
}

struct EditCustomer<'a> {
    customer_id: i64,
    details: Option<CustomerDetails>,
    actor: &'a str,
}

impl AtomicUnit for EditCustomer<'_> {
    type Output = ();

    fn label(&self) -> &'static str {
        "edit_customer"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<()> {
        let current = read_customer(txn, self.customer_id).await?;
        let mut update = Customer::update_many()
            .col_expr(customer::Column::Version, Expr::value(current.version + 1))
            .col_expr(customer::Column::UpdatedAt, Expr::value(at))
            .col_expr(customer::Column::UpdatedBy, Expr::value(self.actor));
        update = match &self.details {
            Some(details) => update
                .col_expr(customer::Column::Name, Expr::value(details.name.clone()))
                .col_expr(customer::Column::Phone, Expr::value(details.phone.trim()))
                .col_expr(customer::Column::Area, Expr::value(details.area.trim())),
            None => update.col_expr(customer::Column::Active, Expr::value(false)),
        };
        let result = update
            .filter(customer::Column::Id.eq(current.id))
            .filter(customer::Column::Version.eq(current.version))
            .exec(txn)
            .await?;
        ensure_single_row(&result, "customer", current.id)
    }
}

/// Updates name, phone and area. The balance is never edited directly.
#[instrument(skip(engine))]
pub async fn update_customer(
    engine: &Engine,
    customer_id: i64,
    details: &CustomerDetails,
    actor: &str,
) -> Result<customer::Model> {
    let name = require_name("customer name", &details.name)?;
    engine
        .run(&EditCustomer {
            customer_id,
            details: Some(CustomerDetails {
                name,
                ..details.clone()
            }),
            actor,
        })
        .await?;
    get_customer(engine.db(), customer_id).await
}

/// Soft-deletes a customer. Their sales, collections and returns are kept.
#[instrument(skip(engine))]
pub async fn deactivate_customer(engine: &Engine, customer_id: i64, actor: &str) -> Result<()> {
    engine
        .run(&EditCustomer {
            customer_id,
            details: None,
            actor,
        })
        .await?;
    info!(customer_id, "customer deactivated");
    Ok(())
}

/// Active customers, alphabetically.
pub async fn list_customers(db: &DatabaseConnection) -> Result<Vec<customer::Model>> {
    Customer::find()
        .filter(customer::Column::Active.eq(true))
        .order_by_asc(customer::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

// ---- special prices ----

/// Active price overrides of a customer, keyed by product id.
pub async fn price_map<C>(conn: &C, customer_id: i64) -> Result<HashMap<i64, f64>>
where
    C: ConnectionTrait,
{
    let prices = CustomerPrice::find()
        .filter(customer_price::Column::CustomerId.eq(customer_id))
        .filter(customer_price::Column::Active.eq(true))
        .all(conn)
        .await?;
    Ok(prices.into_iter().map(|p| (p.product_id, p.price)).collect())
}

struct SetPrice<'a> {
    customer_id: i64,
    product_id: i64,
    price: Option<f64>,
    actor: &'a str,
}

impl AtomicUnit for SetPrice<'_> {
    type Output = Option<customer_price::Model>;

    fn label(&self) -> &'static str {
        "set_customer_price"
    }

    async fn apply(
        &self,
        txn: &DatabaseTransaction,
        at: &str,
    ) -> Result<Option<customer_price::Model>> {
        read_customer(txn, self.customer_id).await?;
        stock::read_item(txn, ItemType::Product, self.product_id).await?;
        let existing = CustomerPrice::find()
            .filter(customer_price::Column::CustomerId.eq(self.customer_id))
            .filter(customer_price::Column::ProductId.eq(self.product_id))
            .one(txn)
            .await?;

        match (existing, self.price) {
            (Some(row), price) => {
                let mut model: customer_price::ActiveModel = row.into();
                if let Some(price) = price {
                    model.price = Set(price);
                }
                model.active = Set(price.is_some());
                model.updated_at = Set(at.to_string());
                model.updated_by = Set(self.actor.to_string());
                Ok(Some(model.update(txn).await?))
            }
            (None, Some(price)) => {
                let row = customer_price::ActiveModel {
                    customer_id: Set(self.customer_id),
                    product_id: Set(self.product_id),
                    price: Set(price),
                    active: Set(true),
                    created_at: Set(at.to_string()),
                    updated_at: Set(at.to_string()),
                    created_by: Set(self.actor.to_string()),
                    updated_by: Set(self.actor.to_string()),
                    ..Default::default()
                };
                Ok(Some(row.insert(txn).await?))
            }
            (None, None) => Ok(None),
        }
    }
}

/// Sets the price `customer_id` pays for `product_id`, replacing any earlier override.
#[instrument(skip(engine))]
pub async fn set_customer_price(
    engine: &Engine,
    customer_id: i64,
    product_id: i64,
    price: f64,
    actor: &str,
) -> Result<customer_price::Model> {
    require_non_negative("price", price)?;
    engine
        .run(&SetPrice {
            customer_id,
            product_id,
            price: Some(price),
            actor,
        })
        .await?
        .ok_or_else(|| Error::not_found("customer price", format!("{customer_id}/{product_id}")))
}

/// Removes a price override; the customer pays the base product price again.
#[instrument(skip(engine))]
pub async fn clear_customer_price(
    engine: &Engine,
    customer_id: i64,
    product_id: i64,
    actor: &str,
) -> Result<()> {
    engine
        .run(&SetPrice {
            customer_id,
            product_id,
            price: None,
            actor,
        })
        .await?;
    Ok(())
}

// ---- collections ----

struct AddCollection<'a> {
    customer_id: i64,
    amount: f64,
    policy: OverCollectionPolicy,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for AddCollection<'_> {
    type Output = collection::Model;

    fn label(&self) -> &'static str {
        "add_collection"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<collection::Model> {
        let customer = read_customer(txn, self.customer_id).await?;
        let amount = collectible_amount(self.amount, customer.balance, self.policy)?;

        let balance_after = apply_balance_delta(txn, &customer, -amount, at, self.actor).await?;
        let record = collection::ActiveModel {
            customer_id: Set(customer.id),
            customer_name: Set(customer.name.clone()),
            amount: Set(amount),
            note: Set(self.note.to_string()),
            balance_before: Set(customer.balance),
            balance_after: Set(balance_after),
            active: Set(true),
            created_at: Set(at.to_string()),
            updated_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            updated_by: Set(self.actor.to_string()),
            ..Default::default()
        };
        Ok(record.insert(txn).await?)
    }
}

/// Amount a collection may apply against `balance` under `policy`.
pub fn collectible_amount(amount: f64, balance: f64, policy: OverCollectionPolicy) -> Result<f64> {
    match policy {
        OverCollectionPolicy::Allow => Ok(amount),
        OverCollectionPolicy::Reject if amount > balance + EPS => Err(Error::Validation {
            message: format!("collection of {amount} exceeds the balance owed ({balance})"),
        }),
        OverCollectionPolicy::Reject => Ok(amount),
        OverCollectionPolicy::Clamp => {
            let clamped = amount.min(balance.max(0.0));
            if clamped <= EPS {
                return Err(Error::Validation {
                    message: format!("nothing owed to collect (balance {balance})"),
                });
            }
            Ok(clamped)
        }
    }
}

/// Records money received from a customer and reduces their balance by it.
///
/// With the default `allow` policy the balance may go negative, meaning the bakery
/// owes the customer.
#[instrument(skip(engine))]
pub async fn add_collection(
    engine: &Engine,
    customer_id: i64,
    amount: f64,
    note: &str,
    actor: &str,
) -> Result<collection::Model> {
    require_positive("collection amount", amount)?;

    let record = engine
        .run(&AddCollection {
            customer_id,
            amount,
            policy: engine.settings().over_collection,
            note,
            actor,
        })
        .await?;
    if record.balance_after < -EPS {
        warn!(customer_id, balance = record.balance_after, "customer now holds credit");
    }
    info!(customer_id, amount = record.amount, "collection recorded");
    Ok(record)
}

// ---- returns ----

struct RecordReturn<'a> {
    customer_id: i64,
    total: f64,
    settlement: Settlement,
    sale_id: Option<i64>,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for RecordReturn<'_> {
    type Output = sale_return::Model;

    fn label(&self) -> &'static str {
        "record_return"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<sale_return::Model> {
        let customer = read_customer(txn, self.customer_id).await?;
        if let Some(sale_id) = self.sale_id {
            let sale = Sale::find_by_id(sale_id)
                .one(txn)
                .await?
                .ok_or_else(|| Error::not_found("sale", sale_id))?;
            if sale.customer_id != Some(customer.id) {
                return Err(Error::Validation {
                    message: format!("sale {} does not belong to {}", sale.invoice_no, customer.name),
                });
            }
        }

        if self.settlement == Settlement::CreditNote {
            apply_balance_delta(txn, &customer, -self.total, at, self.actor).await?;
        }
        let record = sale_return::ActiveModel {
            customer_id: Set(customer.id),
            customer_name: Set(customer.name.clone()),
            sale_id: Set(self.sale_id),
            total: Set(self.total),
            settlement: Set(self.settlement),
            note: Set(self.note.to_string()),
            active: Set(true),
            created_at: Set(at.to_string()),
            updated_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            updated_by: Set(self.actor.to_string()),
            ..Default::default()
        };
        Ok(record.insert(txn).await?)
    }
}

/// Records returned goods. A credit note reduces the customer's balance by `total`;
/// a cash refund is recorded with no balance effect.
#[instrument(skip(engine))]
pub async fn record_return(
    engine: &Engine,
    customer_id: i64,
    total: f64,
    settlement: Settlement,
    sale_id: Option<i64>,
    note: &str,
    actor: &str,
) -> Result<sale_return::Model> {
    require_positive("return total", total)?;
    let record = engine
        .run(&RecordReturn {
            customer_id,
            total,
            settlement,
            sale_id,
            note,
            actor,
        })
        .await?;
    info!(customer_id, total, settlement = ?settlement, "return recorded");
    Ok(record)
}

// ---- statements ----

/// Statement line kind; also breaks ties between events with the same timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatementEventKind {
    /// Opening balance
    Opening,
    /// Sale charged in full
    CreditSale,
    /// Cash sale that left credit or debt behind
    CashSale,
    /// Money received
    Collection,
    /// Return settled by credit note
    CreditNote,
}

/// One dated line of a customer statement
#[derive(Debug, Clone, PartialEq)]
pub struct StatementEvent {
    /// Event timestamp
    pub at: String,
    /// What the event was
    pub kind: StatementEventKind,
    /// Id of the sale, collection or return; `None` for the opening balance
    pub ref_id: Option<i64>,
    /// Invoice number or note shown next to the line
    pub reference: String,
    /// Signed effect on the balance
    pub effect: f64,
    /// Balance after this event
    pub running: f64,
}

/// Customer balance rebuilt from dated events
#[derive(Debug, Clone)]
pub struct Statement {
    /// Customer the statement covers
    pub customer_id: i64,
    /// Events in chronological order
    pub events: Vec<StatementEvent>,
    /// Balance after the last event
    pub reconstructed_balance: f64,
    /// Balance stored on the customer row
    pub cached_balance: f64,
}

impl Statement {
    /// True when replaying the events lands on the stored balance
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (self.reconstructed_balance - self.cached_balance).abs() < 1e-6
    }
}

/// Orders events by timestamp and computes the running balance.
#[must_use]
pub fn build_running_totals(mut events: Vec<StatementEvent>) -> Vec<StatementEvent> {
    events.sort_by(|a, b| {
        a.at.cmp(&b.at)
            .then(a.kind.cmp(&b.kind))
            .then(a.ref_id.cmp(&b.ref_id))
    });
    let mut running = 0.0;
    for event in &mut events {
        running += event.effect;
        event.running = running;
    }
    events
}

fn sale_event(sale: &sale::Model) -> StatementEvent {
    let kind = match sale.payment_type {
        Some(PaymentType::Credit) => StatementEventKind::CreditSale,
        _ => StatementEventKind::CashSale,
    };
    StatementEvent {
        at: sale
            .delivered_at
            .clone()
            .unwrap_or_else(|| sale.updated_at.clone()),
        kind,
        ref_id: Some(sale.id),
        reference: sale.invoice_no.clone(),
        effect: balance_effect(sale),
        running: 0.0,
    }
}

/// Rebuilds a customer's balance from their opening balance, delivered sales,
/// collections and credit-note returns.
pub async fn statement<C>(conn: &C, customer_id: i64) -> Result<Statement>
where
    C: ConnectionTrait,
{
    let customer = Customer::find_by_id(customer_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("customer", customer_id))?;

    let sales = Sale::find()
        .filter(sale::Column::CustomerId.eq(customer_id))
        .filter(sale::Column::Status.eq(SaleStatus::Done))
        .filter(sale::Column::Active.eq(true))
        .all(conn)
        .await?;
    let collections = Collection::find()
        .filter(collection::Column::CustomerId.eq(customer_id))
        .filter(collection::Column::Active.eq(true))
        .all(conn)
        .await?;
    let credit_notes = SaleReturn::find()
        .filter(sale_return::Column::CustomerId.eq(customer_id))
        .filter(sale_return::Column::Settlement.eq(Settlement::CreditNote))
        .filter(sale_return::Column::Active.eq(true))
        .all(conn)
        .await?;

    let mut events = Vec::with_capacity(1 + sales.len() + collections.len() + credit_notes.len());
    events.push(StatementEvent {
        at: customer.created_at.clone(),
        kind: StatementEventKind::Opening,
        ref_id: None,
        reference: "opening balance".to_string(),
        effect: customer.opening_balance,
        running: 0.0,
    });
    events.extend(sales.iter().map(sale_event));
    events.extend(collections.iter().map(|c| StatementEvent {
        at: c.created_at.clone(),
        kind: StatementEventKind::Collection,
        ref_id: Some(c.id),
        reference: c.note.clone(),
        effect: -c.amount,
        running: 0.0,
    }));
    events.extend(credit_notes.iter().map(|r| StatementEvent {
        at: r.created_at.clone(),
        kind: StatementEventKind::CreditNote,
        ref_id: Some(r.id),
        reference: r.note.clone(),
        effect: -r.total,
        running: 0.0,
    }));

    let events = build_running_totals(events);
    let reconstructed_balance = events.last().map_or(0.0, |e| e.running);
    Ok(Statement {
        customer_id,
        events,
        reconstructed_balance,
        cached_balance: customer.balance,
    })
}

/// Compares a customer's cached balance with its reconstruction.
#[instrument(skip(db))]
pub async fn verify_balance(db: &DatabaseConnection, customer_id: i64) -> Result<Statement> {
    let statement = statement(db, customer_id).await?;
    if !statement.is_consistent() {
        warn!(
            customer_id,
            cached = statement.cached_balance,
            reconstructed = statement.reconstructed_balance,
            "customer balance drift"
        );
    }
    Ok(statement)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::config::settings::LedgerSettings;
    use crate::core::sale::{Payment, deliver_sale};
    use crate::test_utils::*;

    #[test]
    fn test_collectible_amount_policies() {
        assert_eq!(collectible_amount(80.0, 50.0, OverCollectionPolicy::Allow).unwrap(), 80.0);
        assert!(collectible_amount(80.0, 50.0, OverCollectionPolicy::Reject).is_err());
        assert_eq!(collectible_amount(50.0, 50.0, OverCollectionPolicy::Reject).unwrap(), 50.0);
        assert_eq!(collectible_amount(80.0, 50.0, OverCollectionPolicy::Clamp).unwrap(), 50.0);
        assert!(collectible_amount(10.0, -5.0, OverCollectionPolicy::Clamp).is_err());
    }

    #[tokio::test]
    async fn test_create_customer_seeds_balance() -> Result<()> {
        let engine = setup_test_engine().await?;
        let shop = create_test_customer(&engine, "Corner Shop", 120.0).await?;
        assert_eq!(shop.opening_balance, 120.0);
        assert_eq!(shop.balance, 120.0);

        let result = create_customer(&engine, &CustomerDetails::default(), 0.0, "clerk").await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_collection_reduces_balance_and_allows_credit() -> Result<()> {
        let engine = setup_test_engine().await?;
        let shop = create_test_customer(&engine, "Corner Shop", 50.0).await?;

        let record = add_collection(&engine, shop.id, 80.0, "cash at door", "driver").await?;
        assert_eq!(record.amount, 80.0);
        assert_eq!(record.balance_before, 50.0);
        assert_eq!(record.balance_after, -30.0);
        assert_eq!(get_customer(engine.db(), shop.id).await?.balance, -30.0);

        let result = add_collection(&engine, shop.id, 0.0, "", "driver").await;
        assert!(matches!(result, Err(Error::InvalidQuantity { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_collection_clamp_policy() -> Result<()> {
        let settings = LedgerSettings {
            over_collection: OverCollectionPolicy::Clamp,
            ..test_settings()
        };
        let engine = setup_test_engine_with(settings).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 50.0).await?;

        let record = add_collection(&engine, shop.id, 80.0, "", "driver").await?;
        assert_eq!(record.amount, 50.0);
        assert_eq!(get_customer(engine.db(), shop.id).await?.balance, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_returns_by_settlement() -> Result<()> {
        let engine = setup_test_engine().await?;
        let shop = create_test_customer(&engine, "Corner Shop", 100.0).await?;

        record_return(&engine, shop.id, 30.0, Settlement::CreditNote, None, "stale", "clerk").await?;
        record_return(&engine, shop.id, 20.0, Settlement::CashRefund, None, "", "clerk").await?;
        assert_eq!(get_customer(engine.db(), shop.id).await?.balance, 70.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_return_must_match_sale_customer() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 10.0, 1.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 0.0).await?;
        let other = create_test_customer(&engine, "Other", 0.0).await?;
        let sale = prepare_test_sale(&engine, Some(shop.id), buns.id, 2.0).await?;

        let result =
            record_return(&engine, other.id, 2.0, Settlement::CreditNote, Some(sale.id), "", "clerk").await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert_eq!(get_customer(engine.db(), other.id).await?.balance, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_customer_prices() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 10.0, 1.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 0.0).await?;

        set_customer_price(&engine, shop.id, buns.id, 0.8, "manager").await?;
        set_customer_price(&engine, shop.id, buns.id, 0.75, "manager").await?;
        assert_eq!(price_map(engine.db(), shop.id).await?.get(&buns.id), Some(&0.75));

        clear_customer_price(&engine, shop.id, buns.id, "manager").await?;
        assert!(price_map(engine.db(), shop.id).await?.is_empty());

        set_customer_price(&engine, shop.id, buns.id, 0.9, "manager").await?;
        assert_eq!(price_map(engine.db(), shop.id).await?.get(&buns.id), Some(&0.9));
        Ok(())
    }

    #[tokio::test]
    async fn test_statement_matches_cached_balance() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 100.0, 10.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 25.0).await?;

        let credit = prepare_test_sale(&engine, Some(shop.id), buns.id, 5.0).await?;
        deliver_sale(&engine, credit.id, Payment::Credit, "driver").await?;

        let short = prepare_test_sale(&engine, Some(shop.id), buns.id, 3.0).await?;
        let paid_short = Payment::Cash {
            paid: Some(20.0),
            extra_as_credit: None,
        };
        deliver_sale(&engine, short.id, paid_short, "driver").await?;

        let over = prepare_test_sale(&engine, Some(shop.id), buns.id, 1.0).await?;
        let paid_over = Payment::Cash {
            paid: Some(15.0),
            extra_as_credit: Some(true),
        };
        deliver_sale(&engine, over.id, paid_over, "driver").await?;

        add_collection(&engine, shop.id, 40.0, "", "driver").await?;
        record_return(&engine, shop.id, 7.5, Settlement::CreditNote, Some(credit.id), "", "clerk").await?;
        record_return(&engine, shop.id, 3.0, Settlement::CashRefund, None, "", "clerk").await?;

        // still prepared, no effect
        prepare_test_sale(&engine, Some(shop.id), buns.id, 2.0).await?;

        let statement = verify_balance(engine.db(), shop.id).await?;
        // 25 + 50 + 10 - 5 - 40 - 7.5
        assert_eq!(statement.cached_balance, 32.5);
        assert!(statement.is_consistent());
        assert_eq!(statement.events.len(), 6);
        assert_eq!(statement.events[0].kind, StatementEventKind::Opening);
        assert_eq!(statement.events[0].running, 25.0);
        assert_eq!(statement.events[1].kind, StatementEventKind::CreditSale);
        assert_eq!(statement.events[1].running, 75.0);
        assert_eq!(statement.events[5].running, 32.5);
        Ok(())
    }

    #[test]
    fn test_running_totals_sort_by_time() {
        let event = |at: &str, kind, effect| StatementEvent {
            at: at.to_string(),
            kind,
            ref_id: None,
            reference: String::new(),
            effect,
            running: 0.0,
        };
        let events = build_running_totals(vec![
            event("2024-01-03T00:00:00.000000+03:00", StatementEventKind::Collection, -5.0),
            event("2024-01-01T00:00:00.000000+03:00", StatementEventKind::Opening, 10.0),
            event("2024-01-02T00:00:00.000000+03:00", StatementEventKind::CreditSale, 20.0),
        ]);
        let running: Vec<f64> = events.iter().map(|e| e.running).collect();
        assert_eq!(running, vec![10.0, 30.0, 25.0]);
    }

    #[tokio::test]
    async fn test_update_and_deactivate() -> Result<()> {
        let engine = setup_test_engine().await?;
        let shop = create_test_customer(&engine, "Corner Shop", 10.0).await?;

        let details = CustomerDetails {
            name: "Corner Shop Ltd".to_string(),
            phone: " 0790000000 ".to_string(),
            area: "North".to_string(),
        };
        let updated = update_customer(&engine, shop.id, &details, "manager").await?;
        assert_eq!(updated.name, "Corner Shop Ltd");
        assert_eq!(updated.phone, "0790000000");
        assert_eq!(updated.balance, 10.0);

        deactivate_customer(&engine, shop.id, "manager").await?;
        assert!(list_customers(engine.db()).await?.is_empty());
        let result = add_collection(&engine, shop.id, 5.0, "", "driver").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }
}
