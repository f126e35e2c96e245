//! Database configuration module for the bakery ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the database schema always matches the Rust structs without manual SQL.

use crate::entities::{
    BomLine, Collection, CrateMove, Customer, CustomerPrice, Distributor, InventoryCount,
    InventoryCountLine, Material, Product, ProductionOrder, Sale, SaleLine, SaleReturn, StockMove,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/bakery.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the `SQLite` database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    tracing::debug!(url = %database_url, "connecting to database");
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()> {
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates every ledger table that does not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Material).await?;
    create_table(db, &schema, Product).await?;
    create_table(db, &schema, BomLine).await?;
    create_table(db, &schema, ProductionOrder).await?;
    create_table(db, &schema, StockMove).await?;
    create_table(db, &schema, Customer).await?;
    create_table(db, &schema, CustomerPrice).await?;
    create_table(db, &schema, Sale).await?;
    create_table(db, &schema, SaleLine).await?;
    create_table(db, &schema, Collection).await?;
    create_table(db, &schema, SaleReturn).await?;
    create_table(db, &schema, Distributor).await?;
    create_table(db, &schema, CrateMove).await?;
    create_table(db, &schema, InventoryCount).await?;
    create_table(db, &schema, InventoryCountLine).await?;

    Ok(())
}
