//! Inventory count engine: `draft` stocktakes that become stock corrections when posted.
//!
//! Loading snapshots `qty_on_hand` into the count lines, saving only records what was
//! physically counted, and posting overwrites each counted item's quantity with the counted
//! value. A posted count is terminal.

use crate::{
    core::{
        engine::{AtomicUnit, EPS, Engine, ensure_single_row, require_non_negative},
        move_log::MoveSource,
        stock::{self, StockItem},
    },
    entities::{
        CountScope, CountStatus, InventoryCount, InventoryCountLine, ItemType, MoveType, inventory_count,
        inventory_count_line, stock_move,
    },
    errors::{Error, Result},
};
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, QueryOrder, QuerySelect, Set, prelude::*, sea_query::Expr,
};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

async fn read_count<C>(conn: &C, count_id: i64) -> Result<inventory_count::Model>
where
    C: ConnectionTrait,
{
    InventoryCount::find_by_id(count_id)
        .filter(inventory_count::Column::Active.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("inventory count", count_id))
}

fn require_draft(count: &inventory_count::Model) -> Result<()> {
    if count.status == CountStatus::Draft {
        Ok(())
    } else {
        Err(Error::InvalidState {
            entity: "inventory count",
            id: count.id.to_string(),
            message: "count is already posted".to_string(),
        })
    }
}

/// Versioned header update; `posted` marks the count terminal.
async fn touch_count<C>(
    conn: &C,
    count: &inventory_count::Model,
    posted: bool,
    at: &str,
    actor: &str,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let mut update = InventoryCount::update_many()
        .col_expr(inventory_count::Column::Version, Expr::value(count.version + 1))
        .col_expr(inventory_count::Column::UpdatedAt, Expr::value(at))
        .col_expr(inventory_count::Column::UpdatedBy, Expr::value(actor));
    if posted {
        update = update
            .col_expr(inventory_count::Column::Status, Expr::value(CountStatus::Posted))
            .col_expr(inventory_count::Column::PostedAt, Expr::value(at))
            .col_expr(inventory_count::Column::PostedBy, Expr::value(actor));
    }
    let result = update
        .filter(inventory_count::Column::Id.eq(count.id))
        .filter(inventory_count::Column::Version.eq(count.version))
        .exec(conn)
        .await?;
    ensure_single_row(&result, "inventory count", count.id)
}

async fn read_lines<C>(conn: &C, count_id: i64) -> Result<Vec<inventory_count_line::Model>>
where
    C: ConnectionTrait,
{
    InventoryCountLine::find()
        .filter(inventory_count_line::Column::CountId.eq(count_id))
        .filter(inventory_count_line::Column::Active.eq(true))
        .order_by_asc(inventory_count_line::Column::ItemType)
        .order_by_asc(inventory_count_line::Column::ItemName)
        .order_by_asc(inventory_count_line::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

struct StartCount<'a> {
    scope: CountScope,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for StartCount<'_> {
    type Output = inventory_count::Model;

    fn label(&self) -> &'static str {
        "start_inventory_count"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<inventory_count::Model> {
        let count = inventory_count::ActiveModel {
            scope: Set(self.scope),
            status: Set(CountStatus::Draft),
            note: Set(self.note.to_string()),
            posted_at: Set(None),
            posted_by: Set(None),
            version: Set(0),
            active: Set(true),
            created_at: Set(at.to_string()),
            updated_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            updated_by: Set(self.actor.to_string()),
            ..Default::default()
        };
        Ok(count.insert(txn).await?)
    }
}

/// Opens a new draft count over materials, products or both.
#[instrument(skip(engine))]
pub async fn start_inventory_count(
    engine: &Engine,
    scope: CountScope,
    note: &str,
    actor: &str,
) -> Result<inventory_count::Model> {
    let count = engine.run(&StartCount { scope, note, actor }).await?;
    info!(count_id = count.id, ?scope, "inventory count started");
    Ok(count)
}

struct LoadLines<'a> {
    count_id: i64,
    actor: &'a str,
}

impl AtomicUnit for LoadLines<'_> {
    type Output = Vec<inventory_count_line::Model>;

    fn label(&self) -> &'static str {
        "load_count_lines"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<Self::Output> {
        // reads
        let count = read_count(txn, self.count_id).await?;
        require_draft(&count)?;
        let existing: HashMap<(ItemType, i64), inventory_count_line::Model> = read_lines(txn, count.id)
            .await?
            .into_iter()
            .map(|line| ((line.item_type, line.item_id), line))
            .collect();
        let mut items: Vec<StockItem> = Vec::new();
        if count.scope.includes_materials() {
            items.extend(stock::read_all(txn, ItemType::Material).await?);
        }
        if count.scope.includes_products() {
            items.extend(stock::read_all(txn, ItemType::Product).await?);
        }

        // writes
        for item in &items {
            match existing.get(&(item.item_type, item.id)) {
                Some(line) => {
                    InventoryCountLine::update_many()
                        .col_expr(inventory_count_line::Column::SystemQty, Expr::value(item.qty_on_hand))
                        .col_expr(inventory_count_line::Column::ItemName, Expr::value(item.name.clone()))
                        .col_expr(inventory_count_line::Column::Unit, Expr::value(item.unit.clone()))
                        .col_expr(inventory_count_line::Column::UpdatedAt, Expr::value(at))
                        .col_expr(inventory_count_line::Column::UpdatedBy, Expr::value(self.actor))
                        .filter(inventory_count_line::Column::Id.eq(line.id))
                        .exec(txn)
                        .await?;
                }
                None => {
                    inventory_count_line::ActiveModel {
                        count_id: Set(count.id),
                        item_type: Set(item.item_type),
                        item_id: Set(item.id),
                        item_name: Set(item.name.clone()),
                        unit: Set(item.unit.clone()),
                        system_qty: Set(item.qty_on_hand),
                        counted_qty: Set(None),
                        active: Set(true),
                        created_at: Set(at.to_string()),
                        updated_at: Set(at.to_string()),
                        created_by: Set(self.actor.to_string()),
                        updated_by: Set(self.actor.to_string()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                }
            }
        }
        touch_count(txn, &count, false, at, self.actor).await?;

        read_lines(txn, count.id).await
    }
}

/// Snapshots current quantities into the count's lines.
///
/// Re-running refreshes `system_qty` and keeps any `counted_qty` already entered.
#[instrument(skip(engine))]
pub async fn load_count_lines(
    engine: &Engine,
    count_id: i64,
    actor: &str,
) -> Result<Vec<inventory_count_line::Model>> {
    let lines = engine.run(&LoadLines { count_id, actor }).await?;
    info!(count_id, lines = lines.len(), "count lines loaded");
    Ok(lines)
}

/// Physical count entered for one line; `None` clears it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountedQty {
    /// Line of the count being updated
    pub line_id: i64,
    /// Physical quantity, never negative
    pub counted_qty: Option<f64>,
}

struct SaveCounted<'a> {
    count_id: i64,
    entries: &'a [CountedQty],
    actor: &'a str,
}

impl AtomicUnit for SaveCounted<'_> {
    type Output = Vec<inventory_count_line::Model>;

    fn label(&self) -> &'static str {
        "save_counted_quantities"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<Self::Output> {
        let count = read_count(txn, self.count_id).await?;
        require_draft(&count)?;
        let lines = read_lines(txn, count.id).await?;
        for entry in self.entries {
            if !lines.iter().any(|l| l.id == entry.line_id) {
                return Err(Error::not_found("count line", entry.line_id));
            }
        }

        for entry in self.entries {
            InventoryCountLine::update_many()
                .col_expr(inventory_count_line::Column::CountedQty, Expr::value(entry.counted_qty))
                .col_expr(inventory_count_line::Column::UpdatedAt, Expr::value(at))
                .col_expr(inventory_count_line::Column::UpdatedBy, Expr::value(self.actor))
                .filter(inventory_count_line::Column::Id.eq(entry.line_id))
                .exec(txn)
                .await?;
        }
        touch_count(txn, &count, false, at, self.actor).await?;

        read_lines(txn, count.id).await
    }
}

/// Records counted quantities on a draft count. No stock changes.
#[instrument(skip(engine, entries))]
pub async fn save_counted_quantities(
    engine: &Engine,
    count_id: i64,
    entries: &[CountedQty],
    actor: &str,
) -> Result<Vec<inventory_count_line::Model>> {
    for entry in entries {
        if let Some(qty) = entry.counted_qty {
            require_non_negative("counted quantity", qty)?;
        }
    }

    let lines = engine
        .run(&SaveCounted {
            count_id,
            entries,
            actor,
        })
        .await?;
    info!(count_id, saved = entries.len(), "counted quantities saved");
    Ok(lines)
}

/// A posted count and the stock corrections it wrote
#[derive(Debug, Clone)]
pub struct PostedCount {
    /// The count header after posting
    pub count: inventory_count::Model,
    /// One `count` move per corrected item
    pub moves: Vec<stock_move::Model>,
    /// Counted lines whose delta was effectively zero
    pub unchanged: usize,
}

struct PostCount<'a> {
    count_id: i64,
    actor: &'a str,
}

impl AtomicUnit for PostCount<'_> {
    type Output = PostedCount;

    fn label(&self) -> &'static str {
        "post_inventory_count"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<PostedCount> {
        // reads
        let count = read_count(txn, self.count_id).await?;
        require_draft(&count)?;
        let counted: Vec<(inventory_count_line::Model, f64)> = read_lines(txn, count.id)
            .await?
            .into_iter()
            .filter_map(|line| line.counted_qty.map(|qty| (line, qty)))
            .collect();
        if counted.is_empty() {
            return Err(Error::InvalidState {
                entity: "inventory count",
                id: count.id.to_string(),
                message: "no line has a counted quantity".to_string(),
            });
        }

        let ids_of = |kind: ItemType| -> Vec<i64> {
            counted
                .iter()
                .filter(|(line, _)| line.item_type == kind)
                .map(|(line, _)| line.item_id)
                .collect()
        };
        let mut items = stock::read_items(txn, ItemType::Material, &ids_of(ItemType::Material))
            .await?
            .into_values()
            .map(|item| ((item.item_type, item.id), item))
            .collect::<HashMap<_, _>>();
        items.extend(
            stock::read_items(txn, ItemType::Product, &ids_of(ItemType::Product))
                .await?
                .into_values()
                .map(|item| ((item.item_type, item.id), item)),
        );

        // validate
        let mut corrections = Vec::with_capacity(counted.len());
        let mut unchanged = 0;
        for (line, qty) in &counted {
            require_non_negative("counted quantity", *qty)?;
            let delta = qty - line.system_qty;
            if delta.abs() < EPS {
                unchanged += 1;
                continue;
            }
            let item = items
                .get(&(line.item_type, line.item_id))
                .ok_or_else(|| Error::not_found(line.item_type.label(), line.item_id))?;
            corrections.push((item, *qty, delta));
        }

        // writes
        let source = MoveSource::new(MoveType::Count, "inventory_count", &count.note, self.actor)
            .with_ref(count.id);
        let mut moves = Vec::with_capacity(corrections.len());
        for (item, qty, delta) in corrections {
            moves.push(stock::set_quantity(txn, item, qty, delta, &source, at).await?);
        }
        touch_count(txn, &count, true, at, self.actor).await?;

        Ok(PostedCount {
            count: read_count(txn, count.id).await?,
            moves,
            unchanged,
        })
    }
}

/// Posts a draft count: every counted item with a non-zero difference gets its quantity
/// set to the counted value and one `count` move recording `counted − system`.
#[instrument(skip(engine))]
pub async fn post_inventory_count(engine: &Engine, count_id: i64, actor: &str) -> Result<PostedCount> {
    match engine.run(&PostCount { count_id, actor }).await {
        Ok(posted) => {
            info!(
                count_id,
                corrected = posted.moves.len(),
                unchanged = posted.unchanged,
                "inventory count posted"
            );
            Ok(posted)
        }
        Err(err) => {
            warn!(count_id, error = %err, "inventory count not posted");
            Err(err)
        }
    }
}

/// Lines of a count, materials before products, then by name.
pub async fn get_count_lines<C>(conn: &C, count_id: i64) -> Result<Vec<inventory_count_line::Model>>
where
    C: ConnectionTrait,
{
    read_count(conn, count_id).await?;
    read_lines(conn, count_id).await
}

/// Most recent counts, newest first.
pub async fn list_counts(db: &DatabaseConnection, limit: u64) -> Result<Vec<inventory_count::Model>> {
    InventoryCount::find()
        .filter(inventory_count::Column::Active.eq(true))
        .order_by_desc(inventory_count::Column::CreatedAt)
        .order_by_desc(inventory_count::Column::Id)
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
    use crate::core::move_log::moves_for_ref;
    use crate::core::stock::adjust_product;
    use crate::test_utils::*;

    fn line_for(
        lines: &[inventory_count_line::Model],
        item_type: ItemType,
        item_id: i64,
    ) -> &inventory_count_line::Model {
        lines
            .iter()
            .find(|l| l.item_type == item_type && l.item_id == item_id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_sets_counted_quantity() -> Result<()> {
        let engine = setup_test_engine().await?;
        let rolls = create_test_product(&engine, "Rolls", 50.0, 0.4).await?;
        let count = start_inventory_count(&engine, CountScope::Products, "weekly", "clerk").await?;
        assert_eq!(count.status, CountStatus::Draft);

        let lines = load_count_lines(&engine, count.id, "clerk").await?;
        let line = line_for(&lines, ItemType::Product, rolls.id);
        assert_eq!(line.system_qty, 50.0);
        assert_eq!(line.counted_qty, None);

        save_counted_quantities(
            &engine,
            count.id,
            &[CountedQty {
                line_id: line.id,
                counted_qty: Some(45.0),
            }],
            "clerk",
        )
        .await?;
        assert_eq!(stock::get_product(engine.db(), rolls.id).await?.qty_on_hand, 50.0);

        let posted = post_inventory_count(&engine, count.id, "manager").await?;
        assert_eq!(posted.count.status, CountStatus::Posted);
        assert_eq!(posted.count.posted_by.as_deref(), Some("manager"));
        assert!(posted.count.posted_at.is_some());
        assert_eq!(posted.moves.len(), 1);
        assert_eq!(posted.moves[0].move_type, MoveType::Count);
        assert_eq!(posted.moves[0].qty_delta, -5.0);
        assert_eq!(posted.moves[0].qty_after, 45.0);

        assert_eq!(stock::get_product(engine.db(), rolls.id).await?.qty_on_hand, 45.0);
        let moves = moves_for_ref(engine.db(), "inventory_count", &count.id.to_string()).await?;
        assert_eq!(moves.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reload_keeps_counted_and_refreshes_system() -> Result<()> {
        let engine = setup_test_engine().await?;
        let rolls = create_test_product(&engine, "Rolls", 50.0, 0.4).await?;
        let flour = create_test_material(&engine, "Flour", 20.0).await?;
        let count = start_inventory_count(&engine, CountScope::Both, "", "clerk").await?;

        let lines = load_count_lines(&engine, count.id, "clerk").await?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].item_type, ItemType::Material);
        assert_eq!(lines[1].item_type, ItemType::Product);

        let roll_line = line_for(&lines, ItemType::Product, rolls.id).id;
        save_counted_quantities(
            &engine,
            count.id,
            &[CountedQty {
                line_id: roll_line,
                counted_qty: Some(48.0),
            }],
            "clerk",
        )
        .await?;
        adjust_product(&engine, rolls.id, -2.0, "sold", "clerk").await?;

        let reloaded = load_count_lines(&engine, count.id, "clerk").await?;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(rolls.id, flour.id);
        let line = line_for(&reloaded, ItemType::Product, rolls.id);
        assert_eq!(line.id, roll_line);
        assert_eq!(line.system_qty, 48.0);
        assert_eq!(line.counted_qty, Some(48.0));
        assert_eq!(line_for(&reloaded, ItemType::Material, flour.id).counted_qty, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_count_lines_record_actors() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 20.0).await?;
        let count = start_inventory_count(&engine, CountScope::Materials, "", "clerk").await?;
        let lines = load_count_lines(&engine, count.id, "clerk").await?;
        let line = line_for(&lines, ItemType::Material, flour.id);
        assert!(line.active);
        assert_eq!(line.created_by, "clerk");
        assert_eq!(line.updated_by, "clerk");
        assert_eq!(line.created_at, line.updated_at);

        let saved = save_counted_quantities(
            &engine,
            count.id,
            &[CountedQty {
                line_id: line.id,
                counted_qty: Some(19.0),
            }],
            "auditor",
        )
        .await?;
        let line = line_for(&saved, ItemType::Material, flour.id);
        assert_eq!(line.created_by, "clerk");
        assert_eq!(line.updated_by, "auditor");
        assert!(line.updated_at >= line.created_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_post_skips_unchanged_and_is_terminal() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 20.0).await?;
        let count = start_inventory_count(&engine, CountScope::Materials, "", "clerk").await?;
        let lines = load_count_lines(&engine, count.id, "clerk").await?;

        let result = post_inventory_count(&engine, count.id, "manager").await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));

        save_counted_quantities(
            &engine,
            count.id,
            &[CountedQty {
                line_id: line_for(&lines, ItemType::Material, flour.id).id,
                counted_qty: Some(20.0),
            }],
            "clerk",
        )
        .await?;
        let posted = post_inventory_count(&engine, count.id, "manager").await?;
        assert!(posted.moves.is_empty());
        assert_eq!(posted.unchanged, 1);

        let again = post_inventory_count(&engine, count.id, "manager").await;
        assert!(matches!(again, Err(Error::InvalidState { .. })));
        let reload = load_count_lines(&engine, count.id, "clerk").await;
        assert!(matches!(reload, Err(Error::InvalidState { .. })));
        let save = save_counted_quantities(&engine, count.id, &[], "clerk").await;
        assert!(matches!(save, Err(Error::InvalidState { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_counted_rejected() -> Result<()> {
        let engine = setup_test_engine().await?;
        let flour = create_test_material(&engine, "Flour", 20.0).await?;
        let count = start_inventory_count(&engine, CountScope::Materials, "", "clerk").await?;
        let lines = load_count_lines(&engine, count.id, "clerk").await?;

        let result = save_counted_quantities(
            &engine,
            count.id,
            &[CountedQty {
                line_id: line_for(&lines, ItemType::Material, flour.id).id,
                counted_qty: Some(-1.0),
            }],
            "clerk",
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidQuantity { .. })));

        let result = save_counted_quantities(
            &engine,
            count.id,
            &[CountedQty {
                line_id: 9999,
                counted_qty: Some(1.0),
            }],
            "clerk",
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(get_count_lines(engine.db(), count.id).await?[0].counted_qty, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_counts_newest_first() -> Result<()> {
        let engine = setup_test_engine().await?;
        let first = start_inventory_count(&engine, CountScope::Materials, "a", "clerk").await?;
        let second = start_inventory_count(&engine, CountScope::Products, "b", "clerk").await?;

        let counts = list_counts(engine.db(), 10).await?;
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].id, second.id);
        assert_eq!(counts[1].id, first.id);
        Ok(())
    }
}
