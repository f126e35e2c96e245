//! Report generation business logic.
//!
//! Read-only views over the ledger: stock alerts and the daily sales summary. All
//! functions return structured data; formatting is left to the caller.

use crate::{
    core::stock::{self, StockItem},
    entities::{
        Collection, ItemType, PaymentType, Sale, SaleReturn, SaleStatus, Settlement, collection, sale,
        sale_return,
    },
    errors::Result,
};
use sea_orm::{DatabaseConnection, prelude::*};

/// Why an item shows up in the stock alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    /// Nothing left on hand
    Out,
    /// At or below the configured minimum
    Low,
}

/// An item that needs restocking or baking
#[derive(Debug, Clone, PartialEq)]
pub struct StockAlert {
    /// How urgent the alert is
    pub level: AlertLevel,
    /// Item the alert is about
    pub item: StockItem,
}

/// Classifies one item.
///
/// # Returns
/// `Out` when `qty_on_hand ≤ 0`, `Low` when a positive `min_qty` is set and
/// `qty_on_hand ≤ min_qty`, otherwise `None`
#[must_use]
pub fn alert_level(item: &StockItem) -> Option<AlertLevel> {
    if item.qty_on_hand <= 0.0 {
        Some(AlertLevel::Out)
    } else if item.min_qty > 0.0 && item.qty_on_hand <= item.min_qty {
        Some(AlertLevel::Low)
    } else {
        None
    }
}

/// Generates the stock alert list over all active materials and products.
///
/// Out-of-stock items come first, then low ones; within a level materials precede
/// products and names sort alphabetically.
pub async fn stock_alerts(db: &DatabaseConnection) -> Result<Vec<StockAlert>> {
    let mut items = stock::read_all(db, ItemType::Material).await?;
    items.extend(stock::read_all(db, ItemType::Product).await?);

    let mut alerts: Vec<StockAlert> = items
        .into_iter()
        .filter_map(|item| alert_level(&item).map(|level| StockAlert { level, item }))
        .collect();
    alerts.sort_by(|a, b| {
        (a.level, a.item.item_type, &a.item.name).cmp(&(b.level, b.item.item_type, &b.item.name))
    });
    Ok(alerts)
}

/// Totals for one local business day
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySummary {
    /// Local date, `YYYY-MM-DD`
    pub date: String,
    /// Sales delivered that day
    pub sales_count: usize,
    /// Sum of net over delivered sales
    pub net_total: f64,
    /// Net of cash sales
    pub cash_net: f64,
    /// Net of credit sales
    pub credit_net: f64,
    /// Cash kept from cash sales, including overpayments turned into credit
    pub cash_in_sales: f64,
    /// Money collected from customers
    pub collections_total: f64,
    /// `cash_in_sales + collections_total`
    pub total_received: f64,
    /// Shortfalls on cash sales added to customer balances
    pub unpaid_total: f64,
    /// Cash paid out for returns
    pub cash_refunds: f64,
}

/// Cash actually kept from one delivered cash sale.
///
/// Overpayment not turned into credit is change handed back.
#[must_use]
pub fn cash_kept(sale: &sale::Model) -> f64 {
    match sale.payment_type {
        Some(PaymentType::Cash) => sale.amount_paid.min(sale.net) + sale.extra_credit,
        _ => 0.0,
    }
}

/// Generates the summary for `date` (a `YYYY-MM-DD` prefix of stored timestamps).
///
/// Sales count on the day they were delivered, not prepared.
pub async fn daily_summary(db: &DatabaseConnection, date: &str) -> Result<DailySummary> {
    let sales = Sale::find()
        .filter(sale::Column::Active.eq(true))
        .filter(sale::Column::Status.eq(SaleStatus::Done))
        .filter(sale::Column::DeliveredAt.starts_with(date))
        .all(db)
        .await?;
    let collections = Collection::find()
        .filter(collection::Column::Active.eq(true))
        .filter(collection::Column::CreatedAt.starts_with(date))
        .all(db)
        .await?;
    let refunds = SaleReturn::find()
        .filter(sale_return::Column::Active.eq(true))
        .filter(sale_return::Column::Settlement.eq(Settlement::CashRefund))
        .filter(sale_return::Column::CreatedAt.starts_with(date))
        .all(db)
        .await?;

    let mut summary = DailySummary {
        date: date.to_string(),
        sales_count: sales.len(),
        ..Default::default()
    };
    for sale in &sales {
        summary.net_total += sale.net;
        match sale.payment_type {
            Some(PaymentType::Cash) => {
                summary.cash_net += sale.net;
                summary.cash_in_sales += cash_kept(sale);
                summary.unpaid_total += sale.unpaid_debt;
            }
            Some(PaymentType::Credit) => summary.credit_net += sale.net,
            None => {}
        }
    }
    summary.collections_total = collections.iter().map(|c| c.amount).sum();
    summary.cash_refunds = refunds.iter().map(|r| r.total).sum();
    summary.total_received = summary.cash_in_sales + summary.collections_total;
    Ok(summary)
}

/// Formats a signed money amount for statements.
///
/// # Returns
/// Formatted string like "+50.00" or "-25.50"
#[must_use]
pub fn format_amount(amount: f64) -> String {
    if amount >= 0.0 {
        format!("+{amount:.2}")
    } else {
        format!("-{:.2}", amount.abs())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::customer::{add_collection, record_return};
    use crate::core::sale::{Payment, deliver_sale};
    use crate::core::stock::adjust_material;
    use crate::test_utils::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(50.0), "+50.00");
        assert_eq!(format_amount(-123.456), "-123.46");
        assert_eq!(format_amount(0.0), "+0.00");
    }

    #[tokio::test]
    async fn test_stock_alerts_out_before_low() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 10.0).await?;
        create_test_material(&engine, "Salt", 50.0).await?;
        create_test_product(&engine, "Loaf", 0.0, 2.0).await?;
        catalog_min(&engine, flour.id, 20.0).await?;

        let alerts = stock_alerts(engine.db()).await?;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Out);
        assert_eq!(alerts[0].item.name, "Loaf");
        assert_eq!(alerts[1].level, AlertLevel::Low);
        assert_eq!(alerts[1].item.name, "Flour");

        adjust_material(&engine, flour.id, 15.0, "delivery", "baker").await?;
        let alerts = stock_alerts(engine.db()).await?;
        assert_eq!(alerts.len(), 1);
        Ok(())
    }

    async fn catalog_min(engine: &crate::core::Engine, material_id: i64, min_qty: f64) -> Result<()> {
        use crate::core::catalog::{MaterialDetails, update_material};
        let current = stock::get_material(engine.db(), material_id).await?;
        let details = MaterialDetails {
            name: current.name,
            unit: current.unit,
            min_qty,
            last_cost: current.last_cost,
        };
        update_material(engine, material_id, &details, "baker").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_summary() -> Result<()> {
        let engine = setup_test_engine().await?;
        let buns = create_test_product(&engine, "Buns", 100.0, 10.0).await?;
        let shop = create_test_customer(&engine, "Corner Shop", 0.0).await?;

        let credit = prepare_test_sale(&engine, Some(shop.id), buns.id, 5.0).await?;
        deliver_sale(&engine, credit.id, Payment::Credit, "driver").await?;

        let short = prepare_test_sale(&engine, Some(shop.id), buns.id, 3.0).await?;
        let paid_short = Payment::Cash {
            paid: Some(20.0),
            extra_as_credit: None,
        };
        deliver_sale(&engine, short.id, paid_short, "driver").await?;

        let change = prepare_test_sale(&engine, None, buns.id, 1.0).await?;
        let paid_over = Payment::Cash {
            paid: Some(15.0),
            extra_as_credit: Some(false),
        };
        deliver_sale(&engine, change.id, paid_over, "driver").await?;

        prepare_test_sale(&engine, None, buns.id, 2.0).await?;
        add_collection(&engine, shop.id, 40.0, "", "cashier").await?;
        record_return(&engine, shop.id, 5.0, Settlement::CashRefund, None, "", "cashier").await?;

        let summary = daily_summary(engine.db(), &engine.today()).await?;
        assert_eq!(summary.sales_count, 3);
        assert_eq!(summary.net_total, 90.0);
        assert_eq!(summary.credit_net, 50.0);
        assert_eq!(summary.cash_net, 40.0);
        assert_eq!(summary.cash_in_sales, 30.0);
        assert_eq!(summary.unpaid_total, 10.0);
        assert_eq!(summary.collections_total, 40.0);
        assert_eq!(summary.total_received, 70.0);
        assert_eq!(summary.cash_refunds, 5.0);

        let empty = daily_summary(engine.db(), "1999-01-01").await?;
        assert_eq!(empty.sales_count, 0);
        assert_eq!(empty.total_received, 0.0);
        Ok(())
    }
}
