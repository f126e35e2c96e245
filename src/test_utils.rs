//! Shared test utilities for the bakery ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    config::settings::LedgerSettings,
    core::{
        Engine,
        catalog::{self, MaterialDetails, ProductDetails},
        customer::{self, CustomerDetails},
        distributor,
        sale::{self, SaleLineInput},
    },
    entities,
    errors::Result,
};
use sea_orm::DatabaseConnection;

/// Actor recorded by test helpers
pub const TEST_ACTOR: &str = "test_user";

/// Default settings with a short retry backoff so conflict tests stay fast.
#[must_use]
pub fn test_settings() -> LedgerSettings {
    LedgerSettings {
        retry_backoff_ms: 1,
        ..LedgerSettings::default()
    }
}

/// Routes engine logs to the test harness; honours `RUST_LOG`, silent by default.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates an engine over a fresh in-memory database.
/// This is the standard setup for all integration tests.
pub async fn setup_test_engine() -> Result<Engine> {
    setup_test_engine_with(test_settings()).await
}

/// Creates an engine over a fresh in-memory database with custom settings.
pub async fn setup_test_engine_with(settings: LedgerSettings) -> Result<Engine> {
    init_test_tracing();
    Engine::new(setup_test_db().await?, settings)
}

/// Creates a test material with opening stock.
///
/// # Defaults
/// * `unit`: "kg"
/// * `min_qty`: 0.0
/// * `last_cost`: 1.0
pub async fn create_test_material(
    engine: &Engine,
    name: &str,
    qty: f64,
) -> Result<entities::material::Model> {
    let details = MaterialDetails {
        name: name.to_string(),
        unit: "kg".to_string(),
        min_qty: 0.0,
        last_cost: 1.0,
    };
    catalog::create_material(engine, &details, qty, TEST_ACTOR).await
}

/// Creates a test product with opening stock and a list price.
///
/// # Defaults
/// * `sale_unit`: "piece"
/// * `min_qty`: 0.0
pub async fn create_test_product(
    engine: &Engine,
    name: &str,
    qty: f64,
    price: f64,
) -> Result<entities::product::Model> {
    let details = ProductDetails {
        name: name.to_string(),
        sale_unit: "piece".to_string(),
        price,
        min_qty: 0.0,
    };
    catalog::create_product(engine, &details, qty, TEST_ACTOR).await
}

/// Creates a test customer with an opening balance.
pub async fn create_test_customer(
    engine: &Engine,
    name: &str,
    opening_balance: f64,
) -> Result<entities::customer::Model> {
    let details = CustomerDetails {
        name: name.to_string(),
        ..Default::default()
    };
    customer::create_customer(engine, &details, opening_balance, TEST_ACTOR).await
}

/// Creates a test distributor holding no crates.
pub async fn create_test_distributor(
    engine: &Engine,
    name: &str,
) -> Result<entities::distributor::Model> {
    distributor::create_distributor(engine, name, "", TEST_ACTOR).await
}

/// Prepares a single-line sale without discount.
pub async fn prepare_test_sale(
    engine: &Engine,
    customer_id: Option<i64>,
    product_id: i64,
    qty: f64,
) -> Result<entities::sale::Model> {
    let lines = [SaleLineInput { product_id, qty }];
    Ok(sale::prepare_sale(engine, customer_id, &lines, 0.0, TEST_ACTOR)
        .await?
        .sale)
}
