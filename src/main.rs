use bakery_ledger::{
    config::{catalog, database, settings},
    core::{Engine, customer, distributor, report},
    errors::Result,
};
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Settings and catalog seed share config.toml
    let config_path = settings::config_path();
    let ledger_settings = settings::load_settings(&config_path)
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    let seed = if std::path::Path::new(&config_path).exists() {
        catalog::load_catalog(&config_path)?
    } else {
        catalog::CatalogSeed::default()
    };

    // 4. Database
    if std::env::var("DATABASE_URL").is_err() {
        std::fs::create_dir_all("data")?;
    }
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    let engine = Engine::new(db, ledger_settings)?;
    catalog::seed_catalog(&engine, &seed).await?;

    // 5. Audit pass
    for alert in report::stock_alerts(engine.db()).await? {
        warn!(
            level = ?alert.level,
            item = %alert.item.name,
            qty = alert.item.qty_on_hand,
            min = alert.item.min_qty,
            "stock alert"
        );
    }

    let mut drifted = 0;
    for account in customer::list_customers(engine.db()).await? {
        if !customer::verify_balance(engine.db(), account.id).await?.is_consistent() {
            drifted += 1;
        }
    }
    for van in distributor::list_distributors(engine.db()).await? {
        let (cached, statement) = distributor::verify_distributor_balances(engine.db(), van.id).await?;
        if !statement.matches(&cached) {
            drifted += 1;
        }
    }

    let summary = report::daily_summary(engine.db(), &engine.today()).await?;
    info!(
        date = %summary.date,
        sales = summary.sales_count,
        net = %report::format_amount(summary.net_total),
        received = %report::format_amount(summary.total_received),
        drifted,
        "audit complete"
    );
    Ok(())
}
