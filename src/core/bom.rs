//! Bill of materials maintenance and production projection.
//!
//! A product's recipe is its set of active [`bom_line`] rows, one per material, ordered
//! by `position`.

use crate::{
    core::{
        engine::{AtomicUnit, EPS, Engine, require_positive},
        stock::{self, StockItem},
    },
    entities::{BomLine, ItemType, bom_line},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{info, instrument};

/// Active recipe lines of a product in recipe order.
pub async fn get_bom<C>(conn: &C, product_id: i64) -> Result<Vec<bom_line::Model>>
where
    C: ConnectionTrait,
{
    BomLine::find()
        .filter(bom_line::Column::ProductId.eq(product_id))
        .filter(bom_line::Column::Active.eq(true))
        .order_by_asc(bom_line::Column::Position)
        .order_by_asc(bom_line::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

struct SetBomLine<'a> {
    product_id: i64,
    material_id: i64,
    qty_per_unit: f64,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for SetBomLine<'_> {
    type Output = bom_line::Model;

    fn label(&self) -> &'static str {
        "set_bom_line"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<bom_line::Model> {
        stock::read_item(txn, ItemType::Product, self.product_id).await?;
        let material = stock::read_item(txn, ItemType::Material, self.material_id).await?;
        let lines = get_bom(txn, self.product_id).await?;

        if let Some(existing) = lines.iter().find(|l| l.material_id == self.material_id) {
            BomLine::update_many()
                .col_expr(bom_line::Column::QtyPerUnit, Expr::value(self.qty_per_unit))
                .col_expr(bom_line::Column::Unit, Expr::value(material.unit.clone()))
                .col_expr(bom_line::Column::Note, Expr::value(self.note))
                .col_expr(bom_line::Column::UpdatedAt, Expr::value(at))
                .col_expr(bom_line::Column::UpdatedBy, Expr::value(self.actor))
                .filter(bom_line::Column::Id.eq(existing.id))
                .exec(txn)
                .await?;
            return BomLine::find_by_id(existing.id)
                .one(txn)
                .await?
                .ok_or_else(|| Error::not_found("bom line", existing.id));
        }

        let position = lines.iter().map(|l| l.position).max().unwrap_or(0) + 1;
        let line = bom_line::ActiveModel {
            product_id: Set(self.product_id),
            material_id: Set(self.material_id),
            qty_per_unit: Set(self.qty_per_unit),
            unit: Set(material.unit),
            note: Set(self.note.to_string()),
            position: Set(position),
            active: Set(true),
            created_at: Set(at.to_string()),
            updated_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            updated_by: Set(self.actor.to_string()),
            ..Default::default()
        };
        Ok(line.insert(txn).await?)
    }
}

/// Adds or replaces the recipe line for `material_id` in `product_id`'s bill of materials.
#[instrument(skip(engine))]
pub async fn set_bom_line(
    engine: &Engine,
    product_id: i64,
    material_id: i64,
    qty_per_unit: f64,
    note: &str,
    actor: &str,
) -> Result<bom_line::Model> {
    require_positive("qty_per_unit", qty_per_unit)?;

    let line = engine
        .run(&SetBomLine {
            product_id,
            material_id,
            qty_per_unit,
            note,
            actor,
        })
        .await?;
    info!(product_id, material_id, qty_per_unit, "bom line set");
    Ok(line)
}

struct RemoveBomLine<'a> {
    product_id: i64,
    material_id: i64,
    actor: &'a str,
}

impl AtomicUnit for RemoveBomLine<'_> {
    type Output = ();

    fn label(&self) -> &'static str {
        "remove_bom_line"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<()> {
        let result = BomLine::update_many()
            .col_expr(bom_line::Column::Active, Expr::value(false))
            .col_expr(bom_line::Column::UpdatedAt, Expr::value(at))
            .col_expr(bom_line::Column::UpdatedBy, Expr::value(self.actor))
            .filter(bom_line::Column::ProductId.eq(self.product_id))
            .filter(bom_line::Column::MaterialId.eq(self.material_id))
            .filter(bom_line::Column::Active.eq(true))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(Error::NotFound {
                entity: "bom line",
                id: format!("{}/{}", self.product_id, self.material_id),
            });
        }
        Ok(())
    }
}

/// Removes a material from a product's recipe.
#[instrument(skip(engine))]
pub async fn remove_bom_line(
    engine: &Engine,
    product_id: i64,
    material_id: i64,
    actor: &str,
) -> Result<()> {
    engine
        .run(&RemoveBomLine {
            product_id,
            material_id,
            actor,
        })
        .await
}

/// How one recipe line limits production
#[derive(Debug, Clone, PartialEq)]
pub struct LineProjection {
    /// Material the line consumes
    pub material_id: i64,
    /// Current material name
    pub material_name: String,
    /// Material unit
    pub unit: String,
    /// Material per produced unit
    pub qty_per_unit: f64,
    /// Material on hand
    pub available: f64,
    /// Whole units this material alone allows
    pub max_units: f64,
    /// Material needed for the target, zero without one
    pub required: f64,
    /// `required - available` when positive, else zero
    pub shortage: f64,
}

/// Read-only answer to "how much of this product can we make right now?"
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionProjection {
    /// Product being projected
    pub product_id: i64,
    /// One entry per active recipe line, in recipe order
    pub lines: Vec<LineProjection>,
    /// Smallest `max_units` over all lines
    pub max_producible: f64,
    /// Material with the smallest `max_units`
    pub bottleneck: Option<String>,
    /// Quantity the caller asked about
    pub target: Option<f64>,
    /// True when no line is short for the target
    pub target_reachable: bool,
}

/// Projects production of `product_id` from current material stock.
pub async fn project_production<C>(
    conn: &C,
    product_id: i64,
    target: Option<f64>,
) -> Result<ProductionProjection>
where
    C: ConnectionTrait,
{
    let product = stock::read_item(conn, ItemType::Product, product_id).await?;
    let bom = get_bom(conn, product_id).await?;
    if bom.is_empty() {
        return Err(Error::MissingBom {
            product: product.name,
        });
    }

    let material_ids: Vec<i64> = bom.iter().map(|l| l.material_id).collect();
    let materials = stock::read_items(conn, ItemType::Material, &material_ids).await?;
    let wanted = target.unwrap_or(0.0);

    let lines: Vec<LineProjection> = bom
        .iter()
        .map(|line| {
            let (name, available) = materials.get(&line.material_id).map_or_else(
                || (format!("material {}", line.material_id), 0.0),
                |m: &StockItem| (m.name.clone(), m.qty_on_hand),
            );
            let required = line.qty_per_unit * wanted;
            LineProjection {
                material_id: line.material_id,
                material_name: name,
                unit: line.unit.clone(),
                qty_per_unit: line.qty_per_unit,
                available,
                max_units: ((available + EPS) / line.qty_per_unit).floor(),
                required,
                shortage: (required - available).max(0.0),
            }
        })
        .collect();

    let bottleneck = lines
        .iter()
        .min_by(|a, b| a.max_units.total_cmp(&b.max_units))
        .map(|l| l.material_name.clone());
    let max_producible = lines
        .iter()
        .map(|l| l.max_units)
        .fold(f64::INFINITY, f64::min);

    Ok(ProductionProjection {
        product_id,
        target_reachable: target.is_none_or(|t| lines.iter().all(|l| l.shortage <= EPS) && t > 0.0),
        lines,
        max_producible,
        bottleneck,
        target,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_set_bom_line_upserts_per_material() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 0.0).await?;
        let yeast = create_test_material(&engine, "Yeast", 0.0).await?;
        let loaf = create_test_product(&engine, "Loaf", 0.0, 2.0).await?;

        set_bom_line(&engine, loaf.id, flour.id, 0.5, "", "baker").await?;
        set_bom_line(&engine, loaf.id, yeast.id, 0.01, "", "baker").await?;
        let replaced = set_bom_line(&engine, loaf.id, flour.id, 0.45, "less", "baker").await?;

        let bom = get_bom(engine.db(), loaf.id).await?;
        assert_eq!(bom.len(), 2);
        assert_eq!(bom[0].material_id, flour.id);
        assert_eq!(bom[0].qty_per_unit, 0.45);
        assert_eq!(bom[0].unit, "kg");
        assert_eq!(replaced.position, 1);
        assert_eq!(bom[1].position, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_bom_line_validation() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 0.0).await?;
        let loaf = create_test_product(&engine, "Loaf", 0.0, 2.0).await?;

        let result = set_bom_line(&engine, loaf.id, flour.id, 0.0, "", "baker").await;
        assert!(matches!(result, Err(Error::InvalidQuantity { .. })));

        let result = set_bom_line(&engine, loaf.id, 999, 1.0, "", "baker").await;
        assert!(matches!(result, Err(Error::NotFound { entity: "material", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_bom_line() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 0.0).await?;
        let loaf = create_test_product(&engine, "Loaf", 0.0, 2.0).await?;

        set_bom_line(&engine, loaf.id, flour.id, 0.5, "", "baker").await?;
        remove_bom_line(&engine, loaf.id, flour.id, "baker").await?;
        assert!(get_bom(engine.db(), loaf.id).await?.is_empty());

        let result = remove_bom_line(&engine, loaf.id, flour.id, "baker").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_project_production_finds_bottleneck() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 100.0).await?;
        let sugar = create_test_material(&engine, "Sugar", 6.0).await?;
        let cake = create_test_product(&engine, "Cake", 0.0, 9.0).await?;

        set_bom_line(&engine, cake.id, flour.id, 5.0, "", "baker").await?;
        set_bom_line(&engine, cake.id, sugar.id, 1.0, "", "baker").await?;

        let projection = project_production(engine.db(), cake.id, Some(10.0)).await?;
        assert_eq!(projection.max_producible, 6.0);
        assert_eq!(projection.bottleneck.as_deref(), Some("Sugar"));
        assert!(!projection.target_reachable);
        assert_eq!(projection.lines[1].required, 10.0);
        assert_eq!(projection.lines[1].shortage, 4.0);
        assert_eq!(projection.lines[0].shortage, 0.0);

        let projection = project_production(engine.db(), cake.id, Some(6.0)).await?;
        assert!(projection.target_reachable);
        Ok(())
    }

    #[tokio::test]
    async fn test_project_without_bom() -> Result<()> {
        let engine = setup_test_engine().await?;
        let loaf = create_test_product(&engine, "Loaf", 0.0, 2.0).await?;
        let result = project_production(engine.db(), loaf.id, None).await;
        assert!(matches!(result, Err(Error::MissingBom { .. })));
        Ok(())
    }
}
