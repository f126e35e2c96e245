//! Distributor custody and cash ledger.
//!
//! Every crate move updates the distributor (crates and money) and appends exactly one
//! [`crate_move`] row in the same unit. Moves that carry product also change that
//! product's stock through the stock ledger, so crates, goods and money move together.

use crate::{
    core::{
        engine::{AtomicUnit, Engine, ensure_single_row, require_name, require_positive},
        move_log::MoveSource,
        stock,
    },
    entities::{CrateMove, CrateMoveType, Distributor, ItemType, MoveType, crate_move, distributor},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseTransaction, QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{info, instrument, warn};

/// Product packed in the crates of an `out`/`in` move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxedGoods {
    /// Product in the crates
    pub product_id: i64,
    /// Units packed per crate, always > 0
    pub units_per_box: i64,
}

/// A crate movement requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrateMoveRequest {
    /// Crates leave the bakery, optionally full of product
    Out {
        /// Crates handed over, always > 0
        boxes: i64,
        /// Product packed in them, if any
        goods: Option<BoxedGoods>,
    },
    /// Crates come back, optionally with unsold product
    In {
        /// Crates returned, always > 0
        boxes: i64,
        /// Product brought back in them, if any
        goods: Option<BoxedGoods>,
    },
    /// Manual correction of the crate count
    Adjust {
        /// Signed non-zero change to the crate balance
        delta_boxes: i64,
    },
}

impl CrateMoveRequest {
    fn validate(&self) -> Result<()> {
        match *self {
            Self::Out { boxes, goods } | Self::In { boxes, goods } => {
                if boxes <= 0 {
                    return Err(Error::InvalidCount {
                        field: "boxes",
                        value: boxes,
                    });
                }
                if let Some(goods) = goods
                    && goods.units_per_box <= 0
                {
                    return Err(Error::InvalidCount {
                        field: "units per box",
                        value: goods.units_per_box,
                    });
                }
                Ok(())
            }
            Self::Adjust { delta_boxes: 0 } => Err(Error::InvalidCount {
                field: "delta boxes",
                value: 0,
            }),
            Self::Adjust { .. } => Ok(()),
        }
    }

    const fn move_type(&self) -> CrateMoveType {
        match self {
            Self::Out { .. } => CrateMoveType::Out,
            Self::In { .. } => CrateMoveType::In,
            Self::Adjust { .. } => CrateMoveType::Adjust,
        }
    }

    /// Signed change to the crate balance
    const fn delta_boxes(&self) -> i64 {
        match *self {
            Self::Out { boxes, .. } => boxes,
            Self::In { boxes, .. } => -boxes,
            Self::Adjust { delta_boxes } => delta_boxes,
        }
    }

    const fn boxes(&self) -> i64 {
        match *self {
            Self::Out { boxes, .. } | Self::In { boxes, .. } => boxes,
            Self::Adjust { .. } => 0,
        }
    }

    const fn goods(&self) -> Option<BoxedGoods> {
        match *self {
            Self::Out { goods, .. } | Self::In { goods, .. } => goods,
            Self::Adjust { .. } => None,
        }
    }
}

/// The move written and the distributor after it
#[derive(Debug, Clone)]
pub struct CrateMoveOutcome {
    /// The stored crate move
    pub record: crate_move::Model,
    /// Crates held after the move
    pub crates_balance: i64,
    /// Money owed after the move
    pub money_balance: f64,
}

async fn read_distributor<C>(conn: &C, distributor_id: i64) -> Result<distributor::Model>
where
    C: ConnectionTrait,
{
    Distributor::find_by_id(distributor_id)
        .filter(distributor::Column::Active.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("distributor", distributor_id))
}

/// Current state of an active distributor.
pub async fn get_distributor(db: &DatabaseConnection, distributor_id: i64) -> Result<distributor::Model> {
    read_distributor(db, distributor_id).await
}

async fn write_balances<C>(
    conn: &C,
    current: &distributor::Model,
    crates: i64,
    money: f64,
    at: &str,
    actor: &str,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Distributor::update_many()
        .col_expr(distributor::Column::CratesBalance, Expr::value(crates))
        .col_expr(distributor::Column::MoneyBalance, Expr::value(money))
        .col_expr(distributor::Column::Version, Expr::value(current.version + 1))
        .col_expr(distributor::Column::UpdatedAt, Expr::value(at))
        .col_expr(distributor::Column::UpdatedBy, Expr::value(actor))
        .filter(distributor::Column::Id.eq(current.id))
        .filter(distributor::Column::Version.eq(current.version))
        .exec(conn)
        .await?;
    ensure_single_row(&result, "distributor", current.id)
}

struct ApplyCrateMove<'a> {
    distributor_id: i64,
    request: CrateMoveRequest,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for ApplyCrateMove<'_> {
    type Output = CrateMoveOutcome;

    fn label(&self) -> &'static str {
        "apply_distributor_move"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<CrateMoveOutcome> {
        // reads
        let current = read_distributor(txn, self.distributor_id).await?;
        let goods = match self.request.goods() {
            Some(goods) => Some((
                goods,
                stock::read_item(txn, ItemType::Product, goods.product_id).await?,
            )),
            None => None,
        };

        // validate
        let delta_boxes = self.request.delta_boxes();
        let crates_after = current
            .crates_balance
            .checked_add(delta_boxes)
            .ok_or(Error::InvalidCount {
                field: "crates_balance",
                value: delta_boxes,
            })?;
        if crates_after < 0 {
            return Err(Error::NegativeCrateBalance {
                distributor: current.name,
                current: current.crates_balance,
                delta: delta_boxes,
            });
        }

        let outgoing = self.request.move_type() == CrateMoveType::Out;
        let (total_units, unit_price) = match &goods {
            Some((packing, product)) => {
                let total = self
                    .request
                    .boxes()
                    .checked_mul(packing.units_per_box)
                    .ok_or(Error::InvalidCount {
                        field: "total_units",
                        value: self.request.boxes(),
                    })?;
                (total, product.unit_value)
            }
            None => (0, 0.0),
        };
        #[allow(clippy::cast_precision_loss)]
        let units = total_units as f64;
        let stock_delta = if outgoing { -units } else { units };
        if let Some((_, product)) = &goods {
            stock::check_delta(product, stock_delta, MoveType::Sale)?;
        }
        let amount = if outgoing {
            units * unit_price
        } else {
            -units * unit_price
        };
        let money_after = current.money_balance + amount;

        // writes
        write_balances(txn, &current, crates_after, money_after, at, self.actor).await?;
        let record = crate_move::ActiveModel {
            distributor_id: Set(current.id),
            distributor_name: Set(current.name.clone()),
            move_type: Set(self.request.move_type()),
            boxes_qty: Set(self.request.boxes()),
            delta_boxes: Set(delta_boxes),
            product_id: Set(goods.as_ref().map(|(_, p)| p.id)),
            product_name: Set(goods.as_ref().map(|(_, p)| p.name.clone()).unwrap_or_default()),
            units_per_box: Set(goods.as_ref().map_or(0, |(g, _)| g.units_per_box)),
            total_units: Set(total_units),
            unit_price: Set(unit_price),
            amount: Set(amount),
            crates_after: Set(crates_after),
            money_after: Set(money_after),
            note: Set(self.note.to_string()),
            created_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        if let Some((_, product)) = &goods {
            let ref_type = if outgoing { "crate_out" } else { "crate_in" };
            let source = MoveSource::new(MoveType::Sale, ref_type, self.note, self.actor).with_ref(record.id);
            stock::apply_delta(txn, product, stock_delta, &source, at).await?;
        }

        Ok(CrateMoveOutcome {
            record,
            crates_balance: crates_after,
            money_balance: money_after,
        })
    }
}

/// Applies an `out`, `in` or `adjust` crate move to a distributor.
///
/// Product-carrying moves change the product's stock by `boxes × units_per_box` and the
/// distributor's money balance by that many units at the product price.
#[instrument(skip(engine))]
pub async fn apply_distributor_move(
    engine: &Engine,
    distributor_id: i64,
    request: CrateMoveRequest,
    note: &str,
    actor: &str,
) -> Result<CrateMoveOutcome> {
    request.validate()?;

    let unit = ApplyCrateMove {
        distributor_id,
        request,
        note,
        actor,
    };
    match engine.run(&unit).await {
        Ok(outcome) => {
            info!(
                distributor_id,
                delta_boxes = outcome.record.delta_boxes,
                amount = outcome.record.amount,
                crates = outcome.crates_balance,
                "crate move applied"
            );
            Ok(outcome)
        }
        Err(err) => {
            warn!(distributor_id, error = %err, "crate move rejected");
            Err(err)
        }
    }
}

struct CashCollection<'a> {
    distributor_id: i64,
    amount: f64,
    note: &'a str,
    actor: &'a str,
}

impl AtomicUnit for CashCollection<'_> {
    type Output = CrateMoveOutcome;

    fn label(&self) -> &'static str {
        "apply_distributor_cash_collection"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<CrateMoveOutcome> {
        let current = read_distributor(txn, self.distributor_id).await?;
        let money_after = current.money_balance - self.amount;

        write_balances(txn, &current, current.crates_balance, money_after, at, self.actor).await?;
        let record = crate_move::ActiveModel {
            distributor_id: Set(current.id),
            distributor_name: Set(current.name.clone()),
            move_type: Set(CrateMoveType::Cash),
            boxes_qty: Set(0),
            delta_boxes: Set(0),
            product_id: Set(None),
            product_name: Set(String::new()),
            units_per_box: Set(0),
            total_units: Set(0),
            unit_price: Set(0.0),
            amount: Set(-self.amount),
            crates_after: Set(current.crates_balance),
            money_after: Set(money_after),
            note: Set(self.note.to_string()),
            created_at: Set(at.to_string()),
            created_by: Set(self.actor.to_string()),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        Ok(CrateMoveOutcome {
            record,
            crates_balance: current.crates_balance,
            money_balance: money_after,
        })
    }
}

/// Records cash collected from a distributor. No crate or stock effect; the money
/// balance may go negative.
#[instrument(skip(engine))]
pub async fn apply_distributor_cash_collection(
    engine: &Engine,
    distributor_id: i64,
    amount: f64,
    note: &str,
    actor: &str,
) -> Result<CrateMoveOutcome> {
    require_positive("cash amount", amount)?;

    let outcome = engine
        .run(&CashCollection {
            distributor_id,
            amount,
            note,
            actor,
        })
        .await?;
    info!(distributor_id, amount, money = outcome.money_balance, "distributor cash collected");
    Ok(outcome)
}

struct CreateDistributor<'a> {
    name: String,
    phone: String,
    actor: &'a str,
}

impl AtomicUnit for CreateDistributor<'_> {
    type Output = distributor::Model;

    fn label(&self) -> &'static str {
        "create_distributor"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<distributor::Model> {
        let model = distributor::ActiveModel {
            name: Set(self.name.clone()),
            phone: Set(self.phone.clone()),
            crates_balance: Set(0),
            money_balance: Set(0.0),
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

/// Registers a distributor holding no crates and owing nothing.
#[instrument(skip(engine))]
pub async fn create_distributor(
    engine: &Engine,
    name: &str,
    phone: &str,
    actor: &str,
) -> Result<distributor::Model> {
    let distributor = engine
        .run(&CreateDistributor {
            name: require_name("distributor name", name)?,
            phone: phone.trim().to_string(),
            actor,
        })
        .await?;
    info!(id = distributor.id, name = %distributor.name, "distributor created");
    Ok(distributor)
}

struct DeactivateDistributor<'a> {
    distributor_id: i64,
    actor: &'a str,
}

impl AtomicUnit for DeactivateDistributor<'_> {
    type Output = ();

    fn label(&self) -> &'static str {
        "deactivate_distributor"
    }

    async fn apply(&self, txn: &DatabaseTransaction, at: &str) -> Result<()> {
        let current = read_distributor(txn, self.distributor_id).await?;
        let result = Distributor::update_many()
            .col_expr(distributor::Column::Active, Expr::value(false))
            .col_expr(distributor::Column::Version, Expr::value(current.version + 1))
            .col_expr(distributor::Column::UpdatedAt, Expr::value(at))
            .col_expr(distributor::Column::UpdatedBy, Expr::value(self.actor))
            .filter(distributor::Column::Id.eq(current.id))
            .filter(distributor::Column::Version.eq(current.version))
            .exec(txn)
            .await?;
        ensure_single_row(&result, "distributor", current.id)
    }
}

/// Soft-deletes a distributor; their move history is kept.
#[instrument(skip(engine))]
pub async fn deactivate_distributor(engine: &Engine, distributor_id: i64, actor: &str) -> Result<()> {
    engine
        .run(&DeactivateDistributor {
            distributor_id,
            actor,
        })
        .await
}

/// Active distributors, alphabetically.
pub async fn list_distributors(db: &DatabaseConnection) -> Result<Vec<distributor::Model>> {
    Distributor::find()
        .filter(distributor::Column::Active.eq(true))
        .order_by_asc(distributor::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// One line of a distributor statement
#[derive(Debug, Clone, PartialEq)]
pub struct DistributorStatementLine {
    /// The stored crate move
    pub record: crate_move::Model,
    /// Crate balance after this line
    pub crates_running: i64,
    /// Money balance after this line
    pub money_running: f64,
}

/// Distributor balances rebuilt from their crate moves
#[derive(Debug, Clone)]
pub struct DistributorStatement {
    /// Distributor the statement covers
    pub distributor_id: i64,
    /// Crate moves in the order they were written
    pub lines: Vec<DistributorStatementLine>,
    /// Crates held after the move
    pub crates_balance: i64,
    /// Money owed after the move
    pub money_balance: f64,
}

impl DistributorStatement {
    /// True when the replayed balances equal `cached`
    #[must_use]
    pub fn matches(&self, cached: &distributor::Model) -> bool {
        self.crates_balance == cached.crates_balance
            && (self.money_balance - cached.money_balance).abs() < 1e-6
    }
}

/// Replays a distributor's moves in write order.
pub async fn distributor_statement<C>(conn: &C, distributor_id: i64) -> Result<DistributorStatement>
where
    C: ConnectionTrait,
{
    let moves = CrateMove::find()
        .filter(crate_move::Column::DistributorId.eq(distributor_id))
        .order_by_asc(crate_move::Column::Id)
        .all(conn)
        .await?;

    let mut crates = 0;
    let mut money = 0.0;
    let lines = moves
        .into_iter()
        .map(|record| {
            crates += record.delta_boxes;
            money += record.amount;
            DistributorStatementLine {
                record,
                crates_running: crates,
                money_running: money,
            }
        })
        .collect();

    Ok(DistributorStatement {
        distributor_id,
        lines,
        crates_balance: crates,
        money_balance: money,
    })
}

/// Replays a distributor's moves and compares them with the stored balances.
#[instrument(skip(db))]
pub async fn verify_distributor_balances(
    db: &DatabaseConnection,
    distributor_id: i64,
) -> Result<(distributor::Model, DistributorStatement)> {
    let cached = Distributor::find_by_id(distributor_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("distributor", distributor_id))?;
    let statement = distributor_statement(db, distributor_id).await?;
    if !statement.matches(&cached) {
        warn!(
            distributor_id,
            cached_crates = cached.crates_balance,
            replayed_crates = statement.crates_balance,
            cached_money = cached.money_balance,
            replayed_money = statement.money_balance,
            "distributor balance drift"
        );
    }
    Ok((cached, statement))
}
