//! Move log - append-only audit trail of stock quantity changes.
//!
//! Rows are only ever inserted, always inside the same unit that changes the quantity
//! they describe. The read side lists moves and replays an item's history.

use crate::{
    core::stock::StockItem,
    entities::{ItemType, MoveType, StockMove, stock_move},
    errors::Result,
};
use sea_orm::{ConnectionTrait, QueryOrder, QuerySelect, Set, prelude::*};

/// Where a stock move comes from and who caused it
#[derive(Debug, Clone)]
pub struct MoveSource<'a> {
    /// Kind of stock change
    pub move_type: MoveType,
    /// Kind of source document, e.g. `"manual"` or `"production_order"`
    pub ref_type: &'a str,
    /// Key of the source document
    pub ref_id: String,
    /// Free-text note copied onto the move
    pub note: &'a str,
    /// Actor recorded as `created_by`
    pub actor: &'a str,
}

impl<'a> MoveSource<'a> {
    /// Source without a document key.
    #[must_use]
    pub const fn new(move_type: MoveType, ref_type: &'a str, note: &'a str, actor: &'a str) -> Self {
        Self {
            move_type,
            ref_type,
            ref_id: String::new(),
            note,
            actor,
        }
    }

    /// Attaches the source document key.
    #[must_use]
    pub fn with_ref(mut self, ref_id: impl ToString) -> Self {
        self.ref_id = ref_id.to_string();
        self
    }
}

/// Appends one stock move. Callers must already have written `qty_after` to the item.
pub(crate) async fn append<C>(
    conn: &C,
    item: &StockItem,
    qty_delta: f64,
    qty_after: f64,
    source: &MoveSource<'_>,
    at: &str,
) -> Result<stock_move::Model>
where
    C: ConnectionTrait,
{
    let record = stock_move::ActiveModel {
        move_type: Set(source.move_type),
        ref_type: Set(source.ref_type.to_string()),
        ref_id: Set(source.ref_id.clone()),
        item_type: Set(item.item_type),
        item_id: Set(item.id),
        item_name: Set(item.name.clone()),
        qty_delta: Set(qty_delta),
        qty_after: Set(qty_after),
        unit: Set(item.unit.clone()),
        note: Set(source.note.to_string()),
        created_at: Set(at.to_string()),
        created_by: Set(source.actor.to_string()),
        ..Default::default()
    };

    Ok(record.insert(conn).await?)
}

/// Optional filters for [`list_moves`]
#[derive(Debug, Clone, Default)]
pub struct MoveFilter {
    /// Only moves of this type
    pub move_type: Option<MoveType>,
    /// Only moves of this item
    pub item: Option<(ItemType, i64)>,
    /// Only moves from this kind of document
    pub ref_type: Option<String>,
    /// Only moves whose timestamp starts with this prefix (e.g. a `YYYY-MM-DD` date)
    pub date_prefix: Option<String>,
    /// Maximum number of moves returned
    pub limit: Option<u64>,
}

/// Lists stock moves, newest first.
pub async fn list_moves<C>(conn: &C, filter: &MoveFilter) -> Result<Vec<stock_move::Model>>
where
    C: ConnectionTrait,
{
    let mut query = StockMove::find();
    if let Some(move_type) = filter.move_type {
        query = query.filter(stock_move::Column::MoveType.eq(move_type));
    }
    if let Some((item_type, item_id)) = filter.item {
        query = query
            .filter(stock_move::Column::ItemType.eq(item_type))
            .filter(stock_move::Column::ItemId.eq(item_id));
    }
    if let Some(ref_type) = &filter.ref_type {
        query = query.filter(stock_move::Column::RefType.eq(ref_type.as_str()));
    }
    if let Some(prefix) = &filter.date_prefix {
        query = query.filter(stock_move::Column::CreatedAt.starts_with(prefix.as_str()));
    }

    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }

    query
        .order_by_desc(stock_move::Column::CreatedAt)
        .order_by_desc(stock_move::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// All moves written for one source document, in write order.
pub async fn moves_for_ref<C>(conn: &C, ref_type: &str, ref_id: &str) -> Result<Vec<stock_move::Model>>
where
    C: ConnectionTrait,
{
    StockMove::find()
        .filter(stock_move::Column::RefType.eq(ref_type))
        .filter(stock_move::Column::RefId.eq(ref_id))
        .order_by_asc(stock_move::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Result of replaying one item's move history
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    /// Material or product
    pub item_type: ItemType,
    /// Item id
    pub item_id: i64,
    /// Number of moves replayed
    pub moves: usize,
    /// Sum of every `qty_delta`
    pub sum_of_deltas: f64,
    /// `qty_after` of the latest move, if any
    pub last_qty_after: Option<f64>,
}

/// Replays an item's moves in write order.
pub async fn replay_item<C>(conn: &C, item_type: ItemType, item_id: i64) -> Result<Replay>
where
    C: ConnectionTrait,
{
    let moves = StockMove::find()
        .filter(stock_move::Column::ItemType.eq(item_type))
        .filter(stock_move::Column::ItemId.eq(item_id))
        .order_by_asc(stock_move::Column::Id)
        .all(conn)
        .await?;

    Ok(Replay {
        item_type,
        item_id,
        moves: moves.len(),
        sum_of_deltas: moves.iter().map(|m| m.qty_delta).sum(),
        last_qty_after: moves.last().map(|m| m.qty_after),
    })
}
