//! Catalog seed loading from config.toml
//!
//! The `[[materials]]` and `[[products]]` tables of config.toml describe the starting
//! catalog. Seeding creates any entry whose name is not yet in the database and leaves
//! existing items untouched, so it is safe to run on every start.

use crate::{
    core::{
        Engine,
        catalog::{self, MaterialDetails, ProductDetails},
    },
    errors::{Error, Result},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Actor recorded on rows created by seeding
pub const SEED_ACTOR: &str = "seed";

/// Catalog section of config.toml
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    /// `[[materials]]` entries
    #[serde(default)]
    pub materials: Vec<MaterialSeed>,
    /// `[[products]]` entries
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

/// A material to seed
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialSeed {
    /// Catalog attributes, flattened into the entry
    #[serde(flatten)]
    pub details: MaterialDetails,
    /// Stock on hand when first created
    #[serde(default)]
    pub opening_qty: f64,
}

/// A product to seed
#[derive(Debug, Clone, Deserialize)]
pub struct ProductSeed {
    /// Catalog attributes, flattened into the entry
    #[serde(flatten)]
    pub details: ProductDetails,
    /// Stock on hand when first created
    #[serde(default)]
    pub opening_qty: f64,
}

/// What seeding did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Materials inserted by this run
    pub materials_created: usize,
    /// Products inserted by this run
    pub products_created: usize,
    /// Entries whose name already existed
    pub skipped: usize,
}

/// Parses the catalog tables of a config.toml document.
pub fn parse_catalog(contents: &str) -> Result<CatalogSeed> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse catalog: {e}"),
    })
}

/// Loads the catalog seed from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the catalog tables are malformed
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<CatalogSeed> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_catalog(&contents)
}

/// Creates every seeded item that does not exist yet, matched by name.
pub async fn seed_catalog(engine: &Engine, seed: &CatalogSeed) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for entry in &seed.materials {
        if catalog::find_material_by_name(engine.db(), entry.details.name.trim())
            .await?
            .is_some()
        {
            report.skipped += 1;
            continue;
        }
        catalog::create_material(engine, &entry.details, entry.opening_qty, SEED_ACTOR).await?;
        report.materials_created += 1;
    }

    for entry in &seed.products {
        if catalog::find_product_by_name(engine.db(), entry.details.name.trim())
            .await?
            .is_some()
        {
            report.skipped += 1;
            continue;
        }
        catalog::create_product(engine, &entry.details, entry.opening_qty, SEED_ACTOR).await?;
        report.products_created += 1;
    }

    info!(
        materials = report.materials_created,
        products = report.products_created,
        skipped = report.skipped,
        "catalog seeded"
    );
    Ok(report)
}
