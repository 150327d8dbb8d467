use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A storefront dropcart knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storefront {
    BestBuy,
    Walmart,
    TheSource,
}

impl Storefront {
    pub const ALL: [Storefront; 3] = [Storefront::BestBuy, Storefront::Walmart, Storefront::TheSource];

    /// Stable key used for notification channels, logs and config maps.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Storefront::BestBuy => "bestbuy",
            Storefront::Walmart => "walmart",
            Storefront::TheSource => "thesource",
        }
    }
}

impl std::fmt::Display for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Identifiers read back from the rendered product page before the cart is touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchKeys {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub storefront: Storefront,
    /// Human-readable name. Walmart verifies it against the page title.
    pub name: String,
    /// Path of the product page relative to the storefront's locale root,
    /// e.g. `/product/playstation-5-console/15463567`.
    pub page_path: String,
    #[serde(flatten)]
    pub keys: MatchKeys,
}

impl Product {
    /// Which keys this product's storefront verifies before adding to cart.
    fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        match self.storefront {
            Storefront::BestBuy => {
                if blank(&self.keys.sku) {
                    missing.push("sku");
                }
                if blank(&self.keys.model) {
                    missing.push("model");
                }
            }
            Storefront::Walmart => {
                if blank(&self.keys.product_id) {
                    missing.push("product_id");
                }
            }
            Storefront::TheSource => {
                if blank(&self.keys.sku) {
                    missing.push("sku");
                }
            }
        }
        missing
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TasksFile {
    pub products: Vec<Product>,
}

impl TasksFile {
    /// Products for one storefront, in file order.
    #[must_use]
    pub fn for_storefront(&self, storefront: Storefront) -> Vec<Product> {
        self.products
            .iter()
            .filter(|p| p.storefront == storefront)
            .cloned()
            .collect()
    }

    /// Storefronts that have at least one product, in [`Storefront::ALL`] order.
    #[must_use]
    pub fn storefronts(&self) -> Vec<Storefront> {
        Storefront::ALL
            .into_iter()
            .filter(|s| self.products.iter().any(|p| p.storefront == *s))
            .collect()
    }
}

/// Load and validate the product task list from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_tasks(path: &Path) -> Result<TasksFile, ConfigError> {
    let tasks: TasksFile = crate::read_yaml(path)?;
    validate_tasks(&tasks)?;
    Ok(tasks)
}

fn validate_tasks(tasks: &TasksFile) -> Result<(), ConfigError> {
    if tasks.products.is_empty() {
        return Err(ConfigError::Validation(
            "task list must contain at least one product".to_string(),
        ));
    }

    let mut seen = HashSet::new();

    for product in &tasks.products {
        if product.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "product name must be non-empty".to_string(),
            ));
        }

        if !product.page_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "product '{}' has page_path '{}'; it must start with '/'",
                product.name, product.page_path
            )));
        }

        let missing = product.missing_keys();
        if !missing.is_empty() {
            return Err(ConfigError::Validation(format!(
                "product '{}' on {} is missing match keys: {}",
                product.name,
                product.storefront,
                missing.join(", ")
            )));
        }

        if !seen.insert((product.storefront, product.page_path.clone())) {
            return Err(ConfigError::Validation(format!(
                "duplicate product page '{}' for {}",
                product.page_path, product.storefront
            )));
        }
    }

    Ok(())
}
