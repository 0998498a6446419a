//! Application configuration management.

use std::collections::HashMap;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// External accounting API configuration.
    pub accounting: AccountingConfig,
    /// Sync engine mapping and policy configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// External accounting API configuration.
///
/// The access token is supplied by whatever process owns the OAuth
/// refresh cycle; this service only presents it.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    /// API base URL, without the `/v3/company/{realm}` suffix.
    #[serde(default = "default_accounting_base_url")]
    pub base_url: String,
    /// Company (realm) identifier in the external system.
    pub realm_id: String,
    /// Bearer token for API calls.
    pub access_token: String,
    /// API minor version sent with every request.
    #[serde(default = "default_minor_version")]
    pub minor_version: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_accounting_base_url() -> String {
    "https://quickbooks.api.intuit.com".to_string()
}

fn default_minor_version() -> u32 {
    75
}

fn default_timeout_secs() -> u64 {
    30
}

/// Whether a missing item mapping may be provisioned dynamically.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ItemFallbackConfig {
    /// Allow find-or-create for sales receipt lines.
    #[serde(default = "default_true")]
    pub payments: bool,
    /// Allow find-or-create for refund receipt lines.
    #[serde(default = "default_true")]
    pub refunds: bool,
}

impl Default for ItemFallbackConfig {
    fn default() -> Self {
        Self {
            payments: true,
            refunds: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Sync engine mapping and policy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Class name per entity type (e.g. `event` -> `Events`).
    pub entity_classes: HashMap<String, String>,
    /// Class name per property; overrides the entity type mapping.
    pub property_classes: HashMap<String, String>,
    /// Statically configured external item id per entity type.
    pub items: HashMap<String, String>,
    /// Dynamic item provisioning policy per document kind.
    pub item_fallback: ItemFallbackConfig,
    /// Account that sales receipts deposit into.
    pub undeposited_funds_account: String,
    /// Account that refund receipts are paid from.
    pub refund_from_account: String,
    /// Bank account that payouts are deposited into.
    pub deposit_account: String,
    /// Expense account for processor fees.
    pub fee_account: String,
    /// Class applied to the processor fee line.
    pub fee_class: String,
    /// Statically configured item id for the processor fee line.
    pub fee_item_id: Option<String>,
    /// Item name used when the fee item has to be found or created.
    pub fee_item_name: String,
    /// Lookup cache time-to-live; `None` keeps entries for the process lifetime.
    pub lookup_cache_ttl_secs: Option<u64>,
    /// Maximum number of cached lookups.
    pub lookup_cache_capacity: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let entity_classes = [
            ("event", "Events"),
            ("donation", "Administration"),
            ("membership", "Administration"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let property_classes = [("tahoe", "Tahoe"), ("clear_lake", "Clear Lake")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            entity_classes,
            property_classes,
            items: HashMap::new(),
            item_fallback: ItemFallbackConfig::default(),
            undeposited_funds_account: "Undeposited Funds".to_string(),
            refund_from_account: "Undeposited Funds".to_string(),
            deposit_account: "Bank Account".to_string(),
            fee_account: "Stripe Fees".to_string(),
            fee_class: "Administration".to_string(),
            fee_item_id: None,
            fee_item_name: "Processor Fees".to_string(),
            lookup_cache_ttl_secs: None,
            lookup_cache_capacity: 1_000,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("LEDGERSYNC").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_defaults() {
        let sync = SyncConfig::default();
        assert_eq!(sync.entity_classes.get("event").unwrap(), "Events");
        assert_eq!(sync.entity_classes.get("donation").unwrap(), "Administration");
        assert_eq!(sync.property_classes.get("clear_lake").unwrap(), "Clear Lake");
        assert!(sync.items.is_empty());
        assert!(sync.item_fallback.payments);
        assert!(sync.lookup_cache_ttl_secs.is_none());
    }

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("LEDGERSYNC__DATABASE__URL", Some("postgres://localhost/ledgersync")),
                ("LEDGERSYNC__ACCOUNTING__REALM_ID", Some("realm-1")),
                ("LEDGERSYNC__ACCOUNTING__ACCESS_TOKEN", Some("token")),
                ("LEDGERSYNC__SERVER__PORT", Some("9090")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/ledgersync");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.accounting.realm_id, "realm-1");
                assert_eq!(config.accounting.minor_version, 75);
                assert_eq!(config.server.port, 9090);
                assert_eq!(config.sync.deposit_account, "Bank Account");
            },
        );
    }

    #[test]
    fn test_load_fails_without_database() {
        temp_env::with_vars_unset(
            [
                "LEDGERSYNC__DATABASE__URL",
                "LEDGERSYNC__ACCOUNTING__REALM_ID",
                "LEDGERSYNC__ACCOUNTING__ACCESS_TOKEN",
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }
}
