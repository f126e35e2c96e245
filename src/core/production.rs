//! BOM production - turns a recipe and an output quantity into one atomic stock change.
//!
//! Every material requirement is checked against a single batch read before anything
//! is written: if any material is short, no material and no product quantity changes.

use crate::{
    core::{
        bom,
        engine::{AtomicUnit, EPS, Engine, require_positive},
        move_log::MoveSource,
        stock,
    },
    entities::{ItemType, MoveType, ProductionOrder, ProductionStatus, production_order, stock_move},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{DatabaseTransaction, QueryOrder, QuerySelect, Set, prelude::*};
use tracing::{info, instrument, warn};

/// A completed production run and the moves it wrote
#[derive(Debug, Clone)]
pub struct ProductionResult {
    /// The stored order
    pub order: production_order::Model,
    /// One `production_consume` move per material, in recipe order
    pub consumed: Vec<stock_move::Model>,
    /// The `production_produce` move
    pub produced: stock_move::Model,
}

/// Material requirement after merging duplicate recipe lines
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// Material to consume
    pub material_id: i64,
    /// Total quantity needed for the order
    pub required: f64,
}

/// Aggregates `qty_per_unit × qty` per material, keeping first-seen recipe order.
#[must_use]
pub fn requirements(bom: &[crate::entities::bom_line::Model], qty: f64) -> Vec<Requirement> {
    let mut merged: Vec<Requirement> = Vec::with_capacity(bom.len());
    for line in bom {
        let required = line.qty_per_unit * qty;
        match merged.iter_mut().find(|r| r.material_id == line.material_id) {
            Some(existing) => existing.required += required,
            None => merged.push(Requirement {
                material_id: line.material_id,
                required,
            }),
        }
    }
    merged
}

struct Produce<'a> {
    product_id: i64,
    qty: f64,
    date: NaiveDate,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for Produce<'_> {
    type Output = ProductionResult;

    fn label(&self) -> &'static str {
        "create_production_order"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<ProductionResult> {
        // reads
        let product = stock::read_item(txn, ItemType::Product, self.product_id).await?;
        let recipe = bom::get_bom(txn, self.product_id).await?;
        if recipe.is_empty() {
            return Err(Error::MissingBom {
                product: product.name,
            });
        }
        let needs = requirements(&recipe, self.qty);
        let material_ids: Vec<i64> = needs.iter().map(|r| r.material_id).collect();
        let materials = stock::read_items(txn, ItemType::Material, &material_ids).await?;

        // validate every line before the first write
        for need in &needs {
            let material = materials
                .get(&need.material_id)
                .ok_or_else(|| Error::not_found("material", need.material_id))?;
            if material.qty_on_hand + EPS < need.required {
                return Err(Error::InsufficientStock {
                    item: material.name.clone(),
                    required: need.required,
                    available: material.qty_on_hand,
                });
            }
        }

        // writes
        let order = production_order::ActiveModel {
            product_id: Set(product.id),
            product_name: Set(product.name.clone()),
            qty_produced: Set(self.qty),
            date: Set(self.date.format("%Y-%m-%d").to_string()),
            status: Set(ProductionStatus::Done),
            note: Set(self.note.to_string()),
            active: Set(true),
            created_at: Set(at.to_string()),
            updated_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            updated_by: Set(self.actor.to_string()),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        let mut consumed = Vec::with_capacity(needs.len());
        for need in &needs {
            if let Some(material) = materials.get(&need.material_id) {
                let source =
                    MoveSource::new(MoveType::ProductionConsume, "production_order", self.note, self.actor)
                        .with_ref(order.id);
                consumed.push(stock::apply_delta(txn, material, -need.required, &source, at).await?);
            }
        }

        let source = MoveSource::new(MoveType::ProductionProduce, "production_order", self.note, self.actor)
            .with_ref(order.id);
        let produced = stock::apply_delta(txn, &product, self.qty, &source, at).await?;

        Ok(ProductionResult {
            order,
            consumed,
            produced,
        })
    }
}

/// Produces `qty` units of a product from its bill of materials.
///
/// Fails with `MissingBom` when the product has no recipe and with `InsufficientStock`
/// naming the first short material; in both cases nothing is written.
#[instrument(skip(engine))]
pub async fn create_production_order(
    engine: &Engine,
    product_id: i64,
    qty: f64,
    date: NaiveDate,
    note: &str,
    actor: &str,
) -> Result<ProductionResult> {
    require_positive("production quantity", qty)?;

    let unit = Produce {
        product_id,
        qty,
        date,
        note,
        actor,
    };
    match engine.run(&unit).await {
        Ok(result) => {
            info!(
                order_id = result.order.id,
                product = %result.order.product_name,
                qty,
                materials = result.consumed.len(),
                "production recorded"
            );
            Ok(result)
        }
        Err(err) => {
            warn!(product_id, qty, error = %err, "production rejected");
            Err(err)
        }
    }
}

/// Most recent production orders, newest first.
pub async fn list_production_orders(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<production_order::Model>> {
    ProductionOrder::find()
        .filter(production_order::Column::Active.eq(true))
        .order_by_desc(production_order::Column::CreatedAt)
        .order_by_desc(production_order::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::bom::set_bom_line;
    use crate::core::move_log::{MoveFilter, list_moves, moves_for_ref};
    use crate::test_utils::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    #[tokio::test]
    async fn test_production_consumes_and_produces() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 100.0).await?;
        let loaf = create_test_product(&engine, "Loaf", 0.0, 2.0).await?;
        set_bom_line(&engine, loaf.id, flour.id, 5.0, "", "baker").await?;

        let result = create_production_order(&engine, loaf.id, 10.0, today(), "morning", "baker").await?;

        assert_eq!(result.order.qty_produced, 10.0);
        assert_eq!(result.order.date, "2024-05-02");
        assert_eq!(result.order.status, ProductionStatus::Done);
        assert_eq!(result.consumed.len(), 1);
        assert_eq!(result.consumed[0].qty_delta, -50.0);
        assert_eq!(result.produced.qty_delta, 10.0);

        assert_eq!(stock::get_material(engine.db(), flour.id).await?.qty_on_hand, 50.0);
        assert_eq!(stock::get_product(engine.db(), loaf.id).await?.qty_on_hand, 10.0);

        let moves = moves_for_ref(engine.db(), "production_order", &result.order.id.to_string()).await?;
        assert_eq!(moves.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_material_changes_nothing() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 50.0).await?;
        let sugar = create_test_material(&engine, "Sugar", 100.0).await?;
        let loaf = create_test_product(&engine, "Loaf", 3.0, 2.0).await?;
        set_bom_line(&engine, loaf.id, sugar.id, 1.0, "", "baker").await?;
        set_bom_line(&engine, loaf.id, flour.id, 5.0, "", "baker").await?;

        let result = create_production_order(&engine, loaf.id, 15.0, today(), "", "baker").await;
        match result {
            Err(Error::InsufficientStock {
                item,
                required,
                available,
            }) => {
                assert_eq!(item, "Flour");
                assert_eq!(required, 75.0);
                assert_eq!(available, 50.0);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(stock::get_material(engine.db(), flour.id).await?.qty_on_hand, 50.0);
        assert_eq!(stock::get_material(engine.db(), sugar.id).await?.qty_on_hand, 100.0);
        assert_eq!(stock::get_product(engine.db(), loaf.id).await?.qty_on_hand, 3.0);

        let consumed = list_moves(
            engine.db(),
            &MoveFilter {
                move_type: Some(MoveType::ProductionConsume),
                ..Default::default()
            },
        )
        .await?;
        assert!(consumed.is_empty());
        assert!(list_production_orders(engine.db(), 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_bom() -> Result<()> {
        let engine = setup_test_engine().await?;
        let loaf = create_test_product(&engine, "Loaf", 0.0, 2.0).await?;

        let result = create_production_order(&engine, loaf.id, 1.0, today(), "", "baker").await;
        assert!(matches!(result, Err(Error::MissingBom { product }) if product == "Loaf"));
        Ok(())
    }

    #[tokio::test]
    async fn test_exact_stock_is_enough() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 0.3).await?;
        let roll = create_test_product(&engine, "Roll", 0.0, 0.5).await?;
        set_bom_line(&engine, roll.id, flour.id, 0.1, "", "baker").await?;

        create_production_order(&engine, roll.id, 3.0, today(), "", "baker").await?;
        assert_eq!(stock::get_material(engine.db(), flour.id).await?.qty_on_hand, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_quantity() -> Result<()> {
        let engine = setup_test_engine().await?;
        let result = create_production_order(&engine, 1, 0.0, today(), "", "baker").await;
        assert!(matches!(result, Err(Error::InvalidQuantity { .. })));
        Ok(())
    }

    #[test]
    fn test_requirements_merge_duplicate_materials() {
        let line = |material_id, qty_per_unit| crate::entities::bom_line::Model {
            id: 0,
            product_id: 1,
            material_id,
            qty_per_unit,
            unit: "kg".to_string(),
            note: String::new(),
            position: 0,
            active: true,
            created_at: String::new(),
            updated_at: String::new(),
            created_by: String::new(),
            updated_by: String::new(),
        };
        let needs = requirements(&[line(1, 0.5), line(2, 0.1), line(1, 0.25)], 4.0);
        assert_eq!(
            needs,
            vec![
                Requirement {
                    material_id: 1,
                    required: 3.0
                },
                Requirement {
                    material_id: 2,
                    required: 0.4
                },
            ]
        );
    }
}
