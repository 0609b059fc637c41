use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::catalog::Product;
use crate::customers::Customer;
use crate::orders::PricingPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("Cannot load seed data from {path}: {reason}")]
    Seed { path: String, reason: String },
}

/// Where orders, products and customers live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Service configuration read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    /// JSON file with products and customers for the memory backend
    pub memory_seed_file: Option<String>,
    pub pricing: PricingPolicy,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => 8080,
        };

        let storage = match lookup("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let memory_seed_file = lookup("MEMORY_SEED_FILE").filter(|path| !path.trim().is_empty());

        let pricing = PricingPolicy {
            tax_rate: decimal_var(&lookup, "TAX_RATE")?.unwrap_or(Decimal::ZERO),
            shipping_fee: decimal_var(&lookup, "SHIPPING_FEE")?.unwrap_or(Decimal::ZERO),
            free_shipping_threshold: decimal_var(&lookup, "FREE_SHIPPING_THRESHOLD")?,
        };

        Ok(Self {
            host,
            port,
            storage,
            database_url,
            memory_seed_file,
            pricing,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Catalog and customer records loaded into the memory backend at startup
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub customers: Vec<Customer>,
}

impl MemorySeed {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Seed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(path, &raw)
    }

    pub fn from_json(path: &str, raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Seed {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Non-negative decimal variable, `None` when unset
fn decimal_var<F>(lookup: &F, name: &'static str) -> Result<Option<Decimal>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => match Decimal::from_str(raw.trim()) {
            Ok(value) if value >= Decimal::ZERO => Ok(Some(value)),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
    }
}
