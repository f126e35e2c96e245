//! Entity module - one SeaORM entity per ledger table.
//! Balance-bearing tables carry a `version` column for optimistic writes; audit tables
//! (stock moves, crate moves, collections, returns) are append-only.

pub mod bom_line;
pub mod collection;
pub mod crate_move;
pub mod customer;
pub mod customer_price;
pub mod distributor;
pub mod inventory_count;
pub mod inventory_count_line;
pub mod material;
pub mod product;
pub mod production_order;
pub mod sale;
pub mod sale_line;
pub mod sale_return;
pub mod stock_move;

// Re-export specific types to avoid conflicts
pub use bom_line::{Column as BomLineColumn, Entity as BomLine, Model as BomLineModel};
pub use collection::{Column as CollectionColumn, Entity as Collection, Model as CollectionModel};
pub use crate_move::{
    Column as CrateMoveColumn, CrateMoveType, Entity as CrateMove, Model as CrateMoveModel,
};
pub use customer::{Column as CustomerColumn, Entity as Customer, Model as CustomerModel};
pub use customer_price::{
    Column as CustomerPriceColumn, Entity as CustomerPrice, Model as CustomerPriceModel,
};
pub use distributor::{
    Column as DistributorColumn, Entity as Distributor, Model as DistributorModel,
};
pub use inventory_count::{
    Column as InventoryCountColumn, CountScope, CountStatus, Entity as InventoryCount,
    Model as InventoryCountModel,
};
pub use inventory_count_line::{
    Column as InventoryCountLineColumn, Entity as InventoryCountLine,
    Model as InventoryCountLineModel,
};
pub use material::{Column as MaterialColumn, Entity as Material, Model as MaterialModel};
pub use product::{Column as ProductColumn, Entity as Product, Model as ProductModel};
pub use production_order::{
    Column as ProductionOrderColumn, Entity as ProductionOrder, Model as ProductionOrderModel,
    ProductionStatus,
};
pub use sale::{Column as SaleColumn, Entity as Sale, Model as SaleModel, PaymentType, SaleStatus};
pub use sale_line::{Column as SaleLineColumn, Entity as SaleLine, Model as SaleLineModel};
pub use sale_return::{
    Column as SaleReturnColumn, Entity as SaleReturn, Model as SaleReturnModel, Settlement,
};
pub use stock_move::{
    Column as StockMoveColumn, Entity as StockMove, ItemType, Model as StockMoveModel, MoveType,
};
