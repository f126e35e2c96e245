//! Stock ledger - owns material and product quantities on hand.
//!
//! [`apply_delta`] and [`set_quantity`] are the only writers of `qty_on_hand`. Both
//! perform a versioned write and append the matching stock move, so every higher
//! component (production, sales, distributors, counts) changes stock through them
//! inside its own unit.

use crate::{
    core::{
        engine::{AtomicUnit, EPS, Engine, ensure_single_row, require_non_negative, require_positive},
        move_log::{self, MoveSource},
    },
    entities::{ItemType, Material, MoveType, Product, material, product, stock_move},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, prelude::*, sea_query::Expr};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Uniform view of a material or product row for stock operations
#[derive(Debug, Clone, PartialEq)]
pub struct StockItem {
    /// Which table the row lives in
    pub item_type: ItemType,
    /// Row id within that table
    pub id: i64,
    /// Display name
    pub name: String,
    /// Unit of measure (sale unit for products)
    pub unit: String,
    /// Current stock
    pub qty_on_hand: f64,
    /// Reorder threshold
    pub min_qty: f64,
    /// Price for products, last cost for materials
    pub unit_value: f64,
    /// Version read; writes are guarded on it
    pub version: i64,
}

impl From<material::Model> for StockItem {
    fn from(m: material::Model) -> Self {
        Self {
            item_type: ItemType::Material,
            id: m.id,
            name: m.name,
            unit: m.unit,
            qty_on_hand: m.qty_on_hand,
            min_qty: m.min_qty,
            unit_value: m.last_cost,
            version: m.version,
        }
    }
}

impl From<product::Model> for StockItem {
    fn from(p: product::Model) -> Self {
        Self {
            item_type: ItemType::Product,
            id: p.id,
            name: p.name,
            unit: p.sale_unit,
            qty_on_hand: p.qty_on_hand,
            min_qty: p.min_qty,
            unit_value: p.price,
            version: p.version,
        }
    }
}

/// Reads one active item, failing with `NotFound` if it is missing or tombstoned.
pub(crate) async fn read_item<C>(conn: &C, item_type: ItemType, id: i64) -> Result<StockItem>
where
    C: ConnectionTrait,
{
    let item = match item_type {
        ItemType::Material => Material::find_by_id(id)
            .filter(material::Column::Active.eq(true))
            .one(conn)
            .await?
            .map(StockItem::from),
        ItemType::Product => Product::find_by_id(id)
            .filter(product::Column::Active.eq(true))
            .one(conn)
            .await?
            .map(StockItem::from),
    };
    item.ok_or_else(|| Error::not_found(item_type.label(), id))
}

/// Reads several active items of one kind in a single query, keyed by id.
///
/// Missing ids are simply absent from the map; callers decide whether that is an error.
pub(crate) async fn read_items<C>(
    conn: &C,
    item_type: ItemType,
    ids: &[i64],
) -> Result<HashMap<i64, StockItem>>
where
    C: ConnectionTrait,
{
    let items: Vec<StockItem> = match item_type {
        ItemType::Material => Material::find()
            .filter(material::Column::Id.is_in(ids.iter().copied()))
            .filter(material::Column::Active.eq(true))
            .all(conn)
            .await?
            .into_iter()
            .map(StockItem::from)
            .collect(),
        ItemType::Product => Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .filter(product::Column::Active.eq(true))
            .all(conn)
            .await?
            .into_iter()
            .map(StockItem::from)
            .collect(),
    };
    Ok(items.into_iter().map(|item| (item.id, item)).collect())
}

/// Reads every active item of one kind, ordered by name.
pub(crate) async fn read_all<C>(conn: &C, item_type: ItemType) -> Result<Vec<StockItem>>
where
    C: ConnectionTrait,
{
    use sea_orm::QueryOrder;

    Ok(match item_type {
        ItemType::Material => Material::find()
            .filter(material::Column::Active.eq(true))
            .order_by_asc(material::Column::Name)
            .all(conn)
            .await?
            .into_iter()
            .map(StockItem::from)
            .collect(),
        ItemType::Product => Product::find()
            .filter(product::Column::Active.eq(true))
            .order_by_asc(product::Column::Name)
            .all(conn)
            .await?
            .into_iter()
            .map(StockItem::from)
            .collect(),
    })
}

/// Versioned write of `qty_on_hand`; raises `Conflict` if the item changed since it was read.
async fn write_quantity<C>(conn: &C, item: &StockItem, qty: f64, at: &str, actor: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = match item.item_type {
        ItemType::Material => {
            Material::update_many()
                .col_expr(material::Column::QtyOnHand, Expr::value(qty))
                .col_expr(material::Column::Version, Expr::value(item.version + 1))
                .col_expr(material::Column::UpdatedAt, Expr::value(at))
                .col_expr(material::Column::UpdatedBy, Expr::value(actor))
                .filter(material::Column::Id.eq(item.id))
                .filter(material::Column::Version.eq(item.version))
                .exec(conn)
                .await?
        }
        ItemType::Product => {
            Product::update_many()
                .col_expr(product::Column::QtyOnHand, Expr::value(qty))
                .col_expr(product::Column::Version, Expr::value(item.version + 1))
                .col_expr(product::Column::UpdatedAt, Expr::value(at))
                .col_expr(product::Column::UpdatedBy, Expr::value(actor))
                .filter(product::Column::Id.eq(item.id))
                .filter(product::Column::Version.eq(item.version))
                .exec(conn)
                .await?
        }
    };
    ensure_single_row(&result, item.item_type.label(), item.id)
}

/// Checks that `delta` keeps the item non-negative and returns the resulting quantity.
///
/// Manual adjustments fail with `InvalidAdjustment`, every other kind of move with
/// `InsufficientStock`.
pub fn check_delta(item: &StockItem, delta: f64, move_type: MoveType) -> Result<f64> {
    let resulting = item.qty_on_hand + delta;
    if resulting < -EPS {
        return Err(if move_type == MoveType::Adjustment {
            Error::InvalidAdjustment {
                item: item.name.clone(),
                delta,
                resulting,
            }
        } else {
            Error::InsufficientStock {
                item: item.name.clone(),
                required: -delta,
                available: item.qty_on_hand,
            }
        });
    }
    Ok(resulting.max(0.0))
}

/// Applies a signed change to an item read earlier in the same unit and logs it.
pub(crate) async fn apply_delta<C>(
    conn: &C,
    item: &StockItem,
    delta: f64,
    source: &MoveSource<'_>,
    at: &str,
) -> Result<stock_move::Model>
where
    C: ConnectionTrait,
{
    let resulting = check_delta(item, delta, source.move_type)?;
    write_quantity(conn, item, resulting, at, source.actor).await?;
    move_log::append(conn, item, delta, resulting, source, at).await
}

/// Overwrites an item's quantity with an absolute value and logs `recorded_delta`.
pub(crate) async fn set_quantity<C>(
    conn: &C,
    item: &StockItem,
    qty: f64,
    recorded_delta: f64,
    source: &MoveSource<'_>,
    at: &str,
) -> Result<stock_move::Model>
where
    C: ConnectionTrait,
{
    require_non_negative("counted quantity", qty)?;
    write_quantity(conn, item, qty, at, source.actor).await?;
    move_log::append(conn, item, recorded_delta, qty, source, at).await
}

struct AdjustQuantity<'a> {
    item_type: ItemType,
    id: i64,
    delta: f64,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for AdjustQuantity<'_> {
    type Output = stock_move::Model;

    fn label(&self) -> &'static str {
        "adjust_quantity"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<stock_move::Model> {
        let item = read_item(txn, self.item_type, self.id).await?;
        let source = MoveSource::new(MoveType::Adjustment, "manual", self.note, self.actor);
        apply_delta(txn, &item, self.delta, &source, at).await
    }
}

async fn adjust_quantity(
    engine: &Engine,
    item_type: ItemType,
    id: i64,
    delta: f64,
    note: &str,
    actor: &str,
) -> Result<stock_move::Model> {
    if !delta.is_finite() || delta.abs() < EPS {
        return Err(Error::InvalidQuantity {
            field: "delta",
            value: delta,
        });
    }

    let unit = AdjustQuantity {
        item_type,
        id,
        delta,
        note,
        actor,
    };
    let stock_move = engine.run(&unit).await?;
    info!(
        item = %stock_move.item_name,
        delta,
        qty_after = stock_move.qty_after,
        "stock adjusted"
    );
    Ok(stock_move)
}

/// Manually corrects a material's quantity by a signed `delta`.
#[instrument(skip(engine))]
pub async fn adjust_material(
    engine: &Engine,
    material_id: i64,
    delta: f64,
    note: &str,
    actor: &str,
) -> Result<stock_move::Model> {
    adjust_quantity(engine, ItemType::Material, material_id, delta, note, actor).await
}

/// Manually corrects a product's quantity by a signed `delta`.
#[instrument(skip(engine))]
pub async fn adjust_product(
    engine: &Engine,
    product_id: i64,
    delta: f64,
    note: &str,
    actor: &str,
) -> Result<stock_move::Model> {
    adjust_quantity(engine, ItemType::Product, product_id, delta, note, actor).await
}

struct ReceivePurchase<'a> {
    material_id: i64,
    qty: f64,
    unit_cost: f64,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for ReceivePurchase<'_> {
    type Output = stock_move::Model;

    fn label(&self) -> &'static str {
        "receive_purchase"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<stock_move::Model> {
        let item = read_item(txn, ItemType::Material, self.material_id).await?;
        let source = MoveSource::new(MoveType::Purchase, "purchase", self.note, self.actor);
        let stock_move = apply_delta(txn, &item, self.qty, &source, at).await?;

        // version already bumped by apply_delta
        Material::update_many()
            .col_expr(material::Column::LastCost, Expr::value(self.unit_cost))
            .filter(material::Column::Id.eq(item.id))
            .exec(txn)
            .await?;
        Ok(stock_move)
    }
}

/// Receives purchased material: increments stock, records the unit cost, logs a `purchase` move.
#[instrument(skip(engine))]
pub async fn receive_purchase(
    engine: &Engine,
    material_id: i64,
    qty: f64,
    unit_cost: f64,
    note: &str,
    actor: &str,
) -> Result<stock_move::Model> {
    require_positive("purchase quantity", qty)?;
    require_non_negative("unit cost", unit_cost)?;

    let unit = ReceivePurchase {
        material_id,
        qty,
        unit_cost,
        note,
        actor,
    };
    let stock_move = engine.run(&unit).await?;
    info!(material = %stock_move.item_name, qty, unit_cost, "purchase received");
    Ok(stock_move)
}

/// Current state of an active material.
pub async fn get_material<C>(conn: &C, material_id: i64) -> Result<material::Model>
where
    C: ConnectionTrait,
{
    Material::find_by_id(material_id)
        .filter(material::Column::Active.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("material", material_id))
}

/// Current state of an active product.
pub async fn get_product<C>(conn: &C, product_id: i64) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    Product::find_by_id(product_id)
        .filter(product::Column::Active.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("product", product_id))
}
