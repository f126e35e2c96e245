//! Sale lifecycle - `prepared → done`.
//!
//! Preparing a sale prices its lines, deducts stock for every line in one unit and
//! stores the sale as `prepared`. Delivering it fixes the payment type, computes the
//! single balance change the sale causes and applies it to the customer in the same
//! unit that marks the sale `done`. Delivering a `done` sale is a no-op.

use crate::{
    core::{
        customer,
        engine::{AtomicUnit, EPS, Engine, ensure_single_row, require_non_negative, require_positive},
        move_log::MoveSource,
        stock,
    },
    entities::{ItemType, MoveType, PaymentType, Sale, SaleLine, SaleStatus, sale, sale_line},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, QueryOrder, Set, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Requested quantity of one product
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaleLineInput {
    /// Product ordered
    pub product_id: i64,
    /// Quantity, always > 0
    pub qty: f64,
}

/// Merges repeated products into one line each, keeping first-seen order.
#[must_use]
pub fn merge_lines(lines: &[SaleLineInput]) -> Vec<SaleLineInput> {
    let mut merged: Vec<SaleLineInput> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.qty += line.qty,
            None => merged.push(*line),
        }
    }
    merged
}

/// Stored totals of a sale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaleTotals {
    /// Sum of line totals
    pub total: f64,
    /// `total - discount`
    pub net: f64,
}

impl SaleTotals {
    /// Canonical totals from `(qty, price)` pairs and a discount.
    #[must_use]
    pub fn compute(lines: &[(f64, f64)], discount: f64) -> Self {
        let total: f64 = lines.iter().map(|&(qty, price)| line_total(qty, price)).sum();
        Self {
            total,
            net: total - discount,
        }
    }

    /// Totals recomputed from stored lines
    #[must_use]
    pub fn of_lines(lines: &[sale_line::Model], discount: f64) -> Self {
        let pairs: Vec<(f64, f64)> = lines.iter().map(|l| (l.qty, l.price)).collect();
        Self::compute(&pairs, discount)
    }
}

/// Stored line total
#[must_use]
pub fn line_total(qty: f64, price: f64) -> f64 {
    qty * price
}

/// How the customer pays at delivery
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payment {
    /// `paid` defaults to the sale's net; `extra_as_credit` to the configured default
    Cash {
        /// Cash handed over
        paid: Option<f64>,
        /// Keep an overpayment as customer credit
        extra_as_credit: Option<bool>,
    },
    /// Whole net is added to the customer's balance
    Credit,
}

/// Payment figures fixed at delivery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryTerms {
    /// Cash or credit
    pub payment_type: PaymentType,
    /// Cash received
    pub amount_paid: f64,
    /// Overpayment kept as customer credit
    pub extra_credit: f64,
    /// Shortfall added to the customer's debt
    pub unpaid_debt: f64,
    /// Signed change to the customer's balance
    pub balance_delta: f64,
}

/// Computes the delivery figures for a sale of `net`.
///
/// Credit owes the full net. Cash owes any shortfall and, when `extra_as_credit`
/// holds, turns any overpayment into customer credit; otherwise the overpayment is
/// change handed back and has no balance effect.
#[must_use]
pub fn settle(net: f64, payment_type: PaymentType, paid: f64, extra_as_credit: bool) -> DeliveryTerms {
    match payment_type {
        PaymentType::Credit => DeliveryTerms {
            payment_type,
            amount_paid: 0.0,
            extra_credit: 0.0,
            unpaid_debt: 0.0,
            balance_delta: net,
        },
        PaymentType::Cash => {
            let extra = (paid - net).max(0.0);
            let unpaid = (net - paid).max(0.0);
            let extra_credit = if extra_as_credit { extra } else { 0.0 };
            DeliveryTerms {
                payment_type,
                amount_paid: paid,
                extra_credit,
                unpaid_debt: unpaid,
                balance_delta: unpaid - extra_credit,
            }
        }
    }
}

/// Balance effect of a stored sale; zero until it is delivered.
///
/// This is the same figure [`settle`] produced at delivery and is what statements replay.
#[must_use]
pub fn balance_effect(sale: &sale::Model) -> f64 {
    match (sale.status, sale.payment_type) {
        (SaleStatus::Done, Some(PaymentType::Credit)) => sale.net,
        (SaleStatus::Done, Some(PaymentType::Cash)) => sale.unpaid_debt - sale.extra_credit,
        _ => 0.0,
    }
}

/// A sale with its lines
#[derive(Debug, Clone)]
pub struct SaleWithLines {
    /// The sale row
    pub sale: sale::Model,
    /// Lines in insertion order
    pub lines: Vec<sale_line::Model>,
}

fn invoice_number(at: &str, sale_id: i64) -> String {
    let date: String = at.chars().take(10).filter(char::is_ascii_digit).collect();
    format!("INV-{date}-{sale_id:06}")
}

struct PrepareSale<'a> {
    customer_id: Option<i64>,
    lines: Vec<SaleLineInput>,
    discount: f64,
    actor: &'a str,
}

impl AtomicUnit for PrepareSale<'_> {
    type Output = SaleWithLines;

    fn label(&self) -> &'static str {
        "prepare_sale"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<SaleWithLines> {
        // reads
        let buyer = match self.customer_id {
            Some(id) => Some(customer::read_customer(txn, id).await?),
            None => None,
        };
        let product_ids: Vec<i64> = self.lines.iter().map(|l| l.product_id).collect();
        let products = stock::read_items(txn, ItemType::Product, &product_ids).await?;
        let special_prices = match &buyer {
            Some(c) => customer::price_map(txn, c.id).await?,
            None => Default::default(),
        };

        // validate all lines before writing
        let mut priced = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let product = products
                .get(&line.product_id)
                .ok_or_else(|| Error::not_found("product", line.product_id))?;
            stock::check_delta(product, -line.qty, MoveType::Sale)?;
            let price = special_prices
                .get(&product.id)
                .copied()
                .unwrap_or(product.unit_value);
            priced.push((product, line.qty, price));
        }
        let pairs: Vec<(f64, f64)> = priced.iter().map(|&(_, qty, price)| (qty, price)).collect();
        let totals = SaleTotals::compute(&pairs, self.discount);
        if totals.net < -EPS {
            return Err(Error::InvalidQuantity {
                field: "discount",
                value: self.discount,
            });
        }

        // writes
        let inserted = sale::ActiveModel {
            invoice_no: Set(String::new()),
            customer_id: Set(buyer.as_ref().map(|c| c.id)),
            customer_name: Set(buyer.as_ref().map(|c| c.name.clone()).unwrap_or_default()),
            discount: Set(self.discount),
            total: Set(totals.total),
            net: Set(totals.net),
            payment_type: Set(None),
            status: Set(SaleStatus::Prepared),
            amount_paid: Set(0.0),
            extra_credit: Set(0.0),
            unpaid_debt: Set(0.0),
            balance_applied: Set(false),
            delivered_at: Set(None),
            delivered_by: Set(None),
            version: Set(0),
            active: Set(true),
            created_at: Set(at.to_string()),
            updated_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            updated_by: Set(self.actor.to_string()),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        let invoice_no = invoice_number(at, inserted.id);
        let mut active: sale::ActiveModel = inserted.into();
        active.invoice_no = Set(invoice_no.clone());
        let sale = active.update(txn).await?;

        let mut lines = Vec::with_capacity(priced.len());
        for (product, qty, price) in priced {
            lines.push(
                sale_line::ActiveModel {
                    sale_id: Set(sale.id),
                    product_id: Set(product.id),
                    product_name: Set(product.name.clone()),
                    qty: Set(qty),
                    price: Set(price),
                    total: Set(line_total(qty, price)),
                    active: Set(true),
                    created_at: Set(at.to_string()),
                    updated_at: Set(at.to_string()),
                    created_by: Set(self.actor.to_string()),
                    updated_by: Set(self.actor.to_string()),
                    ..Default::default()
                }
                .insert(txn)
                .await?,
            );
            let source = MoveSource::new(MoveType::Sale, "sale_prepared", &invoice_no, self.actor)
                .with_ref(sale.id);
            stock::apply_delta(txn, product, -qty, &source, at).await?;
        }

        Ok(SaleWithLines { sale, lines })
    }
}

/// Prepares a sale: prices every line, deducts stock for all of them at once and
/// stores the sale as `prepared` with no payment type.
///
/// `customer_id` is `None` for walk-in sales. Lines for the same product are merged.
#[instrument(skip(engine, lines), fields(lines = lines.len()))]
pub async fn prepare_sale(
    engine: &Engine,
    customer_id: Option<i64>,
    lines: &[SaleLineInput],
    discount: f64,
    actor: &str,
) -> Result<SaleWithLines> {
    if lines.is_empty() {
        return Err(Error::Validation {
            message: "a sale needs at least one line".to_string(),
        });
    }
    for line in lines {
        require_positive("line quantity", line.qty)?;
    }
    require_non_negative("discount", discount)?;

    let unit = PrepareSale {
        customer_id,
        lines: merge_lines(lines),
        discount,
        actor,
    };
    match engine.run(&unit).await {
        Ok(prepared) => {
            info!(
                sale_id = prepared.sale.id,
                invoice = %prepared.sale.invoice_no,
                net = prepared.sale.net,
                "sale prepared"
            );
            Ok(prepared)
        }
        Err(err) => {
            warn!(error = %err, "sale preparation rejected");
            Err(err)
        }
    }
}

/// Result of a delivery attempt
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The sale row
    pub sale: sale::Model,
    /// False when the sale had already been delivered and nothing changed
    pub newly_delivered: bool,
    /// Signed change applied to the customer's balance
    pub balance_delta: f64,
    /// Customer balance after the change, when one was applied
    pub customer_balance: Option<f64>,
}

struct DeliverSale<'a> {
    sale_id: i64,
    payment_type: PaymentType,
    paid: Option<f64>,
    extra_as_credit: bool,
    actor: &'a str,
}

impl AtomicUnit for DeliverSale<'_> {
    type Output = Delivery;

    fn label(&self) -> &'static str {
        "deliver_sale"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<Delivery> {
        let sale = read_sale(txn, self.sale_id).await?;
        if sale.status == SaleStatus::Done {
            return Ok(Delivery {
                sale,
                newly_delivered: false,
                balance_delta: 0.0,
                customer_balance: None,
            });
        }

        let paid = self.paid.unwrap_or(sale.net);
        let terms = settle(sale.net, self.payment_type, paid, self.extra_as_credit);
        let applies_balance = terms.balance_delta.abs() > EPS;

        let buyer = if applies_balance {
            let customer = match sale.customer_id {
                Some(id) => customer::find_active(txn, id).await?,
                None => None,
            };
            Some(customer.ok_or_else(|| Error::NoLinkedCustomer {
                invoice: sale.invoice_no.clone(),
                delta: terms.balance_delta,
            })?)
        } else {
            None
        };

        // writes
        let customer_balance = match &buyer {
            Some(c) => Some(customer::apply_balance_delta(txn, c, terms.balance_delta, at, self.actor).await?),
            None => None,
        };

        let result = Sale::update_many()
            .col_expr(sale::Column::Status, Expr::value(SaleStatus::Done))
            .col_expr(sale::Column::PaymentType, Expr::value(terms.payment_type))
            .col_expr(sale::Column::AmountPaid, Expr::value(terms.amount_paid))
            .col_expr(sale::Column::ExtraCredit, Expr::value(terms.extra_credit))
            .col_expr(sale::Column::UnpaidDebt, Expr::value(terms.unpaid_debt))
            .col_expr(sale::Column::BalanceApplied, Expr::value(applies_balance))
            .col_expr(sale::Column::DeliveredAt, Expr::value(at))
            .col_expr(sale::Column::DeliveredBy, Expr::value(self.actor))
            .col_expr(sale::Column::Version, Expr::value(sale.version + 1))
            .col_expr(sale::Column::UpdatedAt, Expr::value(at))
            .col_expr(sale::Column::UpdatedBy, Expr::value(self.actor))
            .filter(sale::Column::Id.eq(sale.id))
            .filter(sale::Column::Version.eq(sale.version))
            .exec(txn)
            .await?;
        ensure_single_row(&result, "sale", sale.id)?;

        Ok(Delivery {
            sale: read_sale(txn, sale.id).await?,
            newly_delivered: true,
            balance_delta: if applies_balance { terms.balance_delta } else { 0.0 },
            customer_balance,
        })
    }
}

/// Delivers a prepared sale and applies its balance effect exactly once.
///
/// Re-delivering a `done` sale returns it unchanged with `newly_delivered == false`.
#[instrument(skip(engine))]
pub async fn deliver_sale(
    engine: &Engine,
    sale_id: i64,
    payment: Payment,
    actor: &str,
) -> Result<Delivery> {
    let unit = match payment {
        Payment::Credit => DeliverSale {
            sale_id,
            payment_type: PaymentType::Credit,
            paid: None,
            extra_as_credit: false,
            actor,
        },
        Payment::Cash {
            paid,
            extra_as_credit,
        } => {
            if let Some(amount) = paid {
                require_non_negative("paid amount", amount)?;
            }
            DeliverSale {
                sale_id,
                payment_type: PaymentType::Cash,
                paid,
                extra_as_credit: extra_as_credit
                    .unwrap_or(engine.settings().extra_as_credit_default),
                actor,
            }
        }
    };

    let delivery = engine.run(&unit).await?;
    if delivery.newly_delivered {
        info!(
            sale_id,
            invoice = %delivery.sale.invoice_no,
            balance_delta = delivery.balance_delta,
            "sale delivered"
        );
    } else {
        info!(sale_id, "sale already delivered, nothing to do");
    }
    Ok(delivery)
}

async fn read_sale<C>(conn: &C, sale_id: i64) -> Result<sale::Model>
where
    C: ConnectionTrait,
{
    Sale::find_by_id(sale_id)
        .filter(sale::Column::Active.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("sale", sale_id))
}

/// A sale and its lines.
pub async fn get_sale_with_lines<C>(conn: &C, sale_id: i64) -> Result<SaleWithLines>
where
    C: ConnectionTrait,
{
    let sale = read_sale(conn, sale_id).await?;
    let lines = SaleLine::find()
        .filter(sale_line::Column::SaleId.eq(sale_id))
        .filter(sale_line::Column::Active.eq(true))
        .order_by_asc(sale_line::Column::Id)
        .all(conn)
        .await?;
    Ok(SaleWithLines { sale, lines })
}

/// Sales waiting for delivery, oldest first.
pub async fn list_prepared(db: &DatabaseConnection) -> Result<Vec<sale::Model>> {
    Sale::find()
        .filter(sale::Column::Active.eq(true))
        .filter(sale::Column::Status.eq(SaleStatus::Prepared))
        .order_by_asc(sale::Column::CreatedAt)
        .order_by_asc(sale::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Delivered sales, most recent delivery first, optionally limited to a date prefix.
pub async fn list_delivered(
    db: &DatabaseConnection,
    date_prefix: Option<&str>,
) -> Result<Vec<sale::Model>> {
    let mut query = Sale::find()
        .filter(sale::Column::Active.eq(true))
        .filter(sale::Column::Status.eq(SaleStatus::Done));
    if let Some(prefix) = date_prefix {
        query = query.filter(sale::Column::DeliveredAt.starts_with(prefix));
    }
    query
        .order_by_desc(sale::Column::DeliveredAt)
        .order_by_desc(sale::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::move_log::moves_for_ref;
    use crate::test_utils::*;

    fn cash(paid: f64, extra_as_credit: bool) -> Payment {
        Payment::Cash {
            paid: Some(paid),
            extra_as_credit: Some(extra_as_credit),
        }
    }

    #[test]
    fn test_settle_cash_and_credit() {
        let terms = settle(50.0, PaymentType::Cash, 60.0, true);
        assert_eq!(terms.extra_credit, 10.0);
        assert_eq!(terms.unpaid_debt, 0.0);
        assert_eq!(terms.balance_delta, -10.0);

        let terms = settle(50.0, PaymentType::Cash, 60.0, false);
        assert_eq!(terms.extra_credit, 0.0);
        assert_eq!(terms.balance_delta, 0.0);

        let terms = settle(50.0, PaymentType::Cash, 35.0, true);
        assert_eq!(terms.unpaid_debt, 15.0);
        assert_eq!(terms.balance_delta, 15.0);

        let terms = settle(50.0, PaymentType::Credit, 0.0, true);
        assert_eq!(terms.balance_delta, 50.0);
        assert_eq!(terms.amount_paid, 0.0);
    }

    #[test]
    fn test_totals_and_merge() {
        let totals = SaleTotals::compute(&[(5.0, 10.0), (2.0, 2.5)], 5.0);
        assert_eq!(totals.total, 55.0);
        assert_eq!(totals.net, 50.0);

        let merged = merge_lines(&[
            SaleLineInput {
                product_id: 1,
                qty: 2.0,
            },
            SaleLineInput {
                product_id: 2,
                qty: 1.0,
            },
            SaleLineInput {
                product_id: 1,
                qty: 3.0,
            },
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].qty, 5.0);
    }

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(
            invoice_number("2024-05-02T07:08:09.000001+03:00", 42),
            "INV-20240502-000042"
        );
    }

    #[tokio::test]
    async fn test_prepare_deducts_stock_once() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 10.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 0.0).await?;

        let prepared = prepare_sale(
            &engine,
            Some(shop.id),
            &[SaleLineInput {
                product_id: buns.id,
                qty: 5.0,
            }],
            0.0,
            "clerk",
        )
        .await?;

        assert_eq!(prepared.sale.status, SaleStatus::Prepared);
        assert_eq!(prepared.sale.payment_type, None);
        assert_eq!(prepared.sale.net, 50.0);
        assert_eq!(prepared.sale.customer_name, "Corner Shop");
        assert!(prepared.sale.invoice_no.starts_with("INV-"));
        assert!(prepared.sale.invoice_no.ends_with(&format!("{:06}", prepared.sale.id)));
        assert_eq!(prepared.lines.len(), 1);
        assert_eq!(prepared.lines[0].total, 50.0);
        assert!(prepared.lines[0].active);
        assert_eq!(prepared.lines[0].created_by, "clerk");
        assert_eq!(prepared.lines[0].updated_by, "clerk");
        assert_eq!(prepared.lines[0].created_at, prepared.sale.created_at);

        assert_eq!(stock::get_product(engine.db(), buns.id).await?.qty_on_hand, 15.0);
        let moves = moves_for_ref(engine.db(), "sale_prepared", &prepared.sale.id.to_string()).await?;
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].move_type, MoveType::Sale);
        assert_eq!(moves[0].qty_delta, -5.0);

        assert_eq!(list_prepared(engine.db()).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_prepare_uses_customer_price() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 10.0).await?;
        let cafe = create_test_customer(&engine, "Cafe", 0.0).await?;
        customer::set_customer_price(&engine, cafe.id, buns.id, 8.0, "manager").await?;

        let prepared = prepare_sale(
            &engine,
            Some(cafe.id),
            &[SaleLineInput {
                product_id: buns.id,
                qty: 2.0,
            }],
            1.0,
            "clerk",
        )
        .await?;
        assert_eq!(prepared.lines[0].price, 8.0);
        assert_eq!(prepared.sale.total, 16.0);
        assert_eq!(prepared.sale.net, 15.0);

        let walk_in = prepare_sale(
            &engine,
            None,
            &[SaleLineInput {
                product_id: buns.id,
                qty: 1.0,
            }],
            0.0,
            "clerk",
        )
        .await?;
        assert_eq!(walk_in.lines[0].price, 10.0);
        assert_eq!(walk_in.sale.customer_id, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_prepare_is_all_or_nothing() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 1.0).await?;
        let cake = create_test_product(&engine, "Cake", 2.0, 15.0).await?;

        let result = prepare_sale(
            &engine,
            None,
            &[
                SaleLineInput {
                    product_id: buns.id,
                    qty: 10.0,
                },
                SaleLineInput {
                    product_id: cake.id,
                    qty: 3.0,
                },
            ],
            0.0,
            "clerk",
        )
        .await;
        assert!(matches!(result, Err(Error::InsufficientStock { item, .. }) if item == "Cake"));

        assert_eq!(stock::get_product(engine.db(), buns.id).await?.qty_on_hand, 20.0);
        assert_eq!(stock::get_product(engine.db(), cake.id).await?.qty_on_hand, 2.0);
        assert!(list_prepared(engine.db()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_prepare_validation() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 1.0).await?;

        assert!(matches!(
            prepare_sale(&engine, None, &[], 0.0, "clerk").await,
            Err(Error::Validation { .. })
        ));

        let line = [SaleLineInput {
            product_id: buns.id,
            qty: 2.0,
        }];
        assert!(matches!(
            prepare_sale(&engine, None, &line, 5.0, "clerk").await,
            Err(Error::InvalidQuantity {
                field: "discount",
                ..
            })
        ));
        assert!(matches!(
            prepare_sale(&engine, Some(404), &line, 0.0, "clerk").await,
            Err(Error::NotFound {
                entity: "customer",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_cash_overpayment_becomes_credit() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 10.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 0.0).await?;
        let sale = prepare_test_sale(&engine, Some(shop.id), buns.id, 5.0).await?;

        let delivery = deliver_sale(&engine, sale.id, cash(60.0, true), "driver").await?;
        assert!(delivery.newly_delivered);
        assert_eq!(delivery.sale.status, SaleStatus::Done);
        assert_eq!(delivery.sale.payment_type, Some(PaymentType::Cash));
        assert_eq!(delivery.sale.amount_paid, 60.0);
        assert_eq!(delivery.sale.extra_credit, 10.0);
        assert_eq!(delivery.sale.unpaid_debt, 0.0);
        assert!(delivery.sale.balance_applied);
        assert_eq!(delivery.sale.delivered_by.as_deref(), Some("driver"));
        assert_eq!(delivery.customer_balance, Some(-10.0));

        assert_eq!(customer::get_customer(engine.db(), shop.id).await?.balance, -10.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_credit_delivery_owes_net() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 10.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 0.0).await?;
        let sale = prepare_test_sale(&engine, Some(shop.id), buns.id, 5.0).await?;

        let delivery = deliver_sale(&engine, sale.id, Payment::Credit, "driver").await?;
        assert_eq!(delivery.balance_delta, 50.0);
        assert_eq!(customer::get_customer(engine.db(), shop.id).await?.balance, 50.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_redelivery_is_a_no_op() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 10.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 0.0).await?;
        let sale = prepare_test_sale(&engine, Some(shop.id), buns.id, 5.0).await?;

        let first = deliver_sale(&engine, sale.id, Payment::Credit, "driver").await?;
        let second = deliver_sale(&engine, sale.id, cash(0.0, true), "driver").await?;

        assert!(!second.newly_delivered);
        assert_eq!(second.sale, first.sale);
        assert_eq!(customer::get_customer(engine.db(), shop.id).await?.balance, 50.0);
        assert_eq!(stock::get_product(engine.db(), buns.id).await?.qty_on_hand, 15.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_walk_in_needs_customer_for_balance_effect() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 20.0, 10.0).await?;
        let sale = prepare_test_sale(&engine, None, buns.id, 2.0).await?;

        let result = deliver_sale(&engine, sale.id, Payment::Credit, "driver").await;
        assert!(matches!(result, Err(Error::NoLinkedCustomer { delta, .. }) if delta == 20.0));
        let untouched = get_sale_with_lines(engine.db(), sale.id).await?.sale;
        assert_eq!(untouched.status, SaleStatus::Prepared);

        // exact cash needs no customer
        let delivery = deliver_sale(
            &engine,
            sale.id,
            Payment::Cash {
                paid: None,
                extra_as_credit: None,
            },
            "driver",
        )
        .await?;
        assert_eq!(delivery.sale.amount_paid, 20.0);
        assert!(!delivery.sale.balance_applied);
        assert_eq!(list_delivered(engine.db(), Some(&engine.today())).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_totals_match_canonical_computation() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 50.0, 1.25).await?;
        let cake = create_test_product(&engine, "Cake", 5.0, 12.0).await?;

        let prepared = prepare_sale(
            &engine,
            None,
            &[
                SaleLineInput {
                    product_id: buns.id,
                    qty: 12.0,
                },
                SaleLineInput {
                    product_id: cake.id,
                    qty: 1.0,
                },
            ],
            2.0,
            "clerk",
        )
        .await?;
        let stored = get_sale_with_lines(engine.db(), prepared.sale.id).await?;
        let totals = SaleTotals::of_lines(&stored.lines, stored.sale.discount);
        assert_eq!(totals.total, stored.sale.total);
        assert_eq!(totals.net, stored.sale.net);
        Ok(())
    }
}
