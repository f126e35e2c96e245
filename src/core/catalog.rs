//! Catalog business logic - creating, editing and retiring materials and products.
//!
//! Editing never touches `qty_on_hand`; quantities only move through the stock ledger.
//! An item created with a starting quantity gets an opening `adjustment` move so its
//! quantity can be replayed from the move log like any other.

use crate::{
    core::{
        engine::{AtomicUnit, EPS, Engine, ensure_single_row, require_name, require_non_negative},
        move_log::MoveSource,
        stock::{self, StockItem},
    },
    entities::{ItemType, Material, MoveType, Product, material, product},
    errors::Result,
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, QueryOrder, Set, prelude::*, sea_query::Expr};
use serde::Deserialize;
use tracing::{info, instrument};

/// Editable material attributes
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialDetails {
    /// Display name, unique among active items
    pub name: String,
    /// Unit of measure
    pub unit: String,
    /// Reorder threshold
    #[serde(default)]
    pub min_qty: f64,
    /// Initial unit cost
    #[serde(default)]
    pub last_cost: f64,
}

/// Editable product attributes
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDetails {
    /// Display name, unique among active items
    pub name: String,
    /// Unit the product is sold in
    pub sale_unit: String,
    /// Base price per sale unit
    pub price: f64,
    /// Reorder threshold
    #[serde(default)]
    pub min_qty: f64,
}

impl MaterialDetails {
    fn validated(&self) -> Result<Self> {
        require_non_negative("min_qty", self.min_qty)?;
        require_non_negative("last_cost", self.last_cost)?;
        Ok(Self {
            name: require_name("material name", &self.name)?,
            unit: require_name("unit", &self.unit)?,
            ..self.clone()
        })
    }
}

impl ProductDetails {
    fn validated(&self) -> Result<Self> {
        require_non_negative("price", self.price)?;
        require_non_negative("min_qty", self.min_qty)?;
        Ok(Self {
            name: require_name("product name", &self.name)?,
            sale_unit: require_name("sale unit", &self.sale_unit)?,
            ..self.clone()
        })
    }
}

async fn record_opening<C>(conn: &C, item: &StockItem, qty: f64, actor: &str, at: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    if qty > EPS {
        let source = MoveSource::new(MoveType::Adjustment, "opening", "opening stock", actor)
            .with_ref(item.id);
        stock::apply_delta(conn, item, qty, &source, at).await?;
    }
    Ok(())
}

struct CreateMaterial<'a> {
    details: MaterialDetails,
    opening_qty: f64,
    actor: &'a str,
}

impl AtomicUnit for CreateMaterial<'_> {
    type Output = material::Model;

    fn label(&self) -> &'static str {
        "create_material"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<material::Model> {
        let created = material::ActiveModel {
            name: Set(self.details.name.clone()),
            unit: Set(self.details.unit.clone()),
            qty_on_hand: Set(0.0),
            min_qty: Set(self.details.min_qty),
            last_cost: Set(self.details.last_cost),
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

        let id = created.id;
        record_opening(txn, &StockItem::from(created), self.opening_qty, self.actor, at).await?;
        stock::get_material(txn, id).await
    }
}

/// Creates a material, optionally with opening stock.
#[instrument(skip(engine))]
pub async fn create_material(
    engine: &Engine,
    details: &MaterialDetails,
    opening_qty: f64,
    actor: &str,
) -> Result<material::Model> {
    let details = details.validated()?;
    require_non_negative("opening quantity", opening_qty)?;

    let material = engine
        .run(&CreateMaterial {
            details,
            opening_qty,
            actor,
        })
        .await?;
    info!(id = material.id, name = %material.name, "material created");
    Ok(material)
}

struct CreateProduct<'a> {
    details: ProductDetails,
    opening_qty: f64,
    actor: &'a str,
}

impl AtomicUnit for CreateProduct<'_> {
    type Output = product::Model;

    fn label(&self) -> &'static str {
        "create_product"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<product::Model> {
        let created = product::ActiveModel {
            name: Set(self.details.name.clone()),
            sale_unit: Set(self.details.sale_unit.clone()),
            qty_on_hand: Set(0.0),
            price: Set(self.details.price),
            min_qty: Set(self.details.min_qty),
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

        let id = created.id;
        record_opening(txn, &StockItem::from(created), self.opening_qty, self.actor, at).await?;
        stock::get_product(txn, id).await
    }
}

/// Creates a product, optionally with opening stock.
#[instrument(skip(engine))]
pub async fn create_product(
    engine: &Engine,
    details: &ProductDetails,
    opening_qty: f64,
    actor: &str,
) -> Result<product::Model> {
    let details = details.validated()?;
    require_non_negative("opening quantity", opening_qty)?;

    let product = engine
        .run(&CreateProduct {
            details,
            opening_qty,
            actor,
        })
        .await?;
    info!(id = product.id, name = %product.name, "product created");
    Ok(product)
}

enum CatalogEdit {
    Material(MaterialDetails),
    Product(ProductDetails),
    Deactivate,
}

struct EditItem<'a> {
    item_type: ItemType,
    id: i64,
    edit: CatalogEdit,
    actor: &'a str,
}

impl AtomicUnit for EditItem<'_> {
    type Output = ();

    fn label(&self) -> &'static str {
        "edit_catalog_item"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<()> {
        let item = stock::read_item(txn, self.item_type, self.id).await?;

        let result = match (&self.edit, self.item_type) {
            (CatalogEdit::Material(details), _) => {
                Material::update_many()
                    .col_expr(material::Column::Name, Expr::value(details.name.clone()))
                    .col_expr(material::Column::Unit, Expr::value(details.unit.clone()))
                    .col_expr(material::Column::MinQty, Expr::value(details.min_qty))
                    .col_expr(material::Column::LastCost, Expr::value(details.last_cost))
                    .col_expr(material::Column::Version, Expr::value(item.version + 1))
                    .col_expr(material::Column::UpdatedAt, Expr::value(at))
                    .col_expr(material::Column::UpdatedBy, Expr::value(self.actor))
                    .filter(material::Column::Id.eq(item.id))
                    .filter(material::Column::Version.eq(item.version))
                    .exec(txn)
                    .await?
            }
            (CatalogEdit::Product(details), _) => {
                Product::update_many()
                    .col_expr(product::Column::Name, Expr::value(details.name.clone()))
                    .col_expr(product::Column::SaleUnit, Expr::value(details.sale_unit.clone()))
                    .col_expr(product::Column::Price, Expr::value(details.price))
                    .col_expr(product::Column::MinQty, Expr::value(details.min_qty))
                    .col_expr(product::Column::Version, Expr::value(item.version + 1))
                    .col_expr(product::Column::UpdatedAt, Expr::value(at))
                    .col_expr(product::Column::UpdatedBy, Expr::value(self.actor))
                    .filter(product::Column::Id.eq(item.id))
                    .filter(product::Column::Version.eq(item.version))
                    .exec(txn)
                    .await?
            }
            (CatalogEdit::Deactivate, ItemType::Material) => {
                Material::update_many()
                    .col_expr(material::Column::Active, Expr::value(false))
                    .col_expr(material::Column::Version, Expr::value(item.version + 1))
                    .col_expr(material::Column::UpdatedAt, Expr::value(at))
                    .col_expr(material::Column::UpdatedBy, Expr::value(self.actor))
                    .filter(material::Column::Id.eq(item.id))
                    .filter(material::Column::Version.eq(item.version))
                    .exec(txn)
                    .await?
            }
            (CatalogEdit::Deactivate, ItemType::Product) => {
                Product::update_many()
                    .col_expr(product::Column::Active, Expr::value(false))
                    .col_expr(product::Column::Version, Expr::value(item.version + 1))
                    .col_expr(product::Column::UpdatedAt, Expr::value(at))
                    .col_expr(product::Column::UpdatedBy, Expr::value(self.actor))
                    .filter(product::Column::Id.eq(item.id))
                    .filter(product::Column::Version.eq(item.version))
                    .exec(txn)
                    .await?
            }
        };
        ensure_single_row(&result, self.item_type.label(), item.id)
    }
}

/// Updates a material's name, unit, reorder level and cost.
#[instrument(skip(engine))]
pub async fn update_material(
    engine: &Engine,
    material_id: i64,
    details: &MaterialDetails,
    actor: &str,
) -> Result<material::Model> {
    let details = details.validated()?;
    engine
        .run(&EditItem {
            item_type: ItemType::Material,
            id: material_id,
            edit: CatalogEdit::Material(details),
            actor,
        })
        .await?;
    stock::get_material(engine.db(), material_id).await
}

/// Updates a product's name, sale unit, price and reorder level.
#[instrument(skip(engine))]
pub async fn update_product(
    engine: &Engine,
    product_id: i64,
    details: &ProductDetails,
    actor: &str,
) -> Result<product::Model> {
    let details = details.validated()?;
    engine
        .run(&EditItem {
            item_type: ItemType::Product,
            id: product_id,
            edit: CatalogEdit::Product(details),
            actor,
        })
        .await?;
    stock::get_product(engine.db(), product_id).await
}

/// Soft-deletes a material or product. Its moves stay in the log.
#[instrument(skip(engine))]
pub async fn deactivate_item(
    engine: &Engine,
    item_type: ItemType,
    id: i64,
    actor: &str,
) -> Result<()> {
    engine
        .run(&EditItem {
            item_type,
            id,
            edit: CatalogEdit::Deactivate,
            actor,
        })
        .await?;
    info!(item_type = item_type.label(), id, "catalog item deactivated");
    Ok(())
}

/// All active materials, alphabetically.
pub async fn list_materials(db: &DatabaseConnection) -> Result<Vec<material::Model>> {
    Material::find()
        .filter(material::Column::Active.eq(true))
        .order_by_asc(material::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All active products, alphabetically.
pub async fn list_products(db: &DatabaseConnection) -> Result<Vec<product::Model>> {
    Product::find()
        .filter(product::Column::Active.eq(true))
        .order_by_asc(product::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds an active material by exact name.
pub async fn find_material_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<material::Model>> {
    Material::find()
        .filter(material::Column::Name.eq(name))
        .filter(material::Column::Active.eq(true))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds an active product by exact name.
pub async fn find_product_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<product::Model>> {
    Product::find()
        .filter(product::Column::Name.eq(name))
        .filter(product::Column::Active.eq(true))
        .one(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::move_log::moves_for_ref;
    use crate::errors::Error;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_material_with_opening_stock() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 100.0).await?;

        assert_eq!(flour.qty_on_hand, 100.0);
        assert_eq!(flour.version, 1);

        let moves = moves_for_ref(engine.db(), "opening", &flour.id.to_string()).await?;
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].move_type, MoveType::Adjustment);
        assert_eq!(moves[0].qty_delta, 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_without_stock_writes_no_move() -> Result<()> {
        let engine = setup_test_engine().await?;
        let loaf = create_test_product(&engine, "Loaf", 0.0, 2.5).await?;

        assert_eq!(loaf.qty_on_hand, 0.0);
        assert_eq!(loaf.version, 0);
        assert!(moves_for_ref(engine.db(), "opening", &loaf.id.to_string()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_validation() -> Result<()> {
        let engine = setup_test_engine().await?;
        let details = MaterialDetails {
            name: "   ".to_string(),
            unit: "kg".to_string(),
            min_qty: 0.0,
            last_cost: 0.0,
        };
        let result = create_material(&engine, &details, 0.0, "baker").await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let details = ProductDetails {
            name: "Loaf".to_string(),
            sale_unit: "piece".to_string(),
            price: -1.0,
            min_qty: 0.0,
        };
        let result = create_product(&engine, &details, 0.0, "baker").await;
        assert!(matches!(result, Err(Error::InvalidQuantity { field: "price", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_keeps_quantity() -> Result<()> {
        let engine = setup_test_engine().await?;
        let loaf = create_test_product(&engine, "Loaf", 12.0, 2.5).await?;

        let details = ProductDetails {
            name: "White Loaf".to_string(),
            sale_unit: "piece".to_string(),
            price: 3.0,
            min_qty: 5.0,
        };
        let updated = update_product(&engine, loaf.id, &details, "manager").await?;
        assert_eq!(updated.name, "White Loaf");
        assert_eq!(updated.price, 3.0);
        assert_eq!(updated.qty_on_hand, 12.0);
        assert_eq!(updated.version, loaf.version + 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivated_items_hidden() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 1.0).await?;
        create_test_material(&engine, "Sugar", 1.0).await?;

        deactivate_item(&engine, ItemType::Material, flour.id, "manager").await?;

        let names: Vec<String> = list_materials(engine.db())
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Sugar".to_string()]);
        assert!(find_material_by_name(engine.db(), "Flour").await?.is_none());

        let result = stock::adjust_material(&engine, flour.id, 1.0, "", "baker").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }
}
