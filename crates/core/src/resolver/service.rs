//! Account, class and item resolution against the accounting API.

use std::sync::Arc;

use tracing::{debug, warn};

use ledgersync_shared::config::SyncConfig;

use super::cache::{LookupCache, LookupKind};
use super::mapping::{ClassMapping, ItemMapping};
use crate::client::{AccountingClient, ItemOptions, Ref};
use crate::error::SyncError;
use crate::record::{Classification, RecordKind};

/// Item, class and account for the payout fee line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeLineRefs {
    /// Fee item.
    pub item: Ref,
    /// Fee class.
    pub class: Ref,
    /// Fee expense account.
    pub account: Ref,
}

/// Resolves names to external references, caching every successful lookup.
pub struct Resolver {
    client: Arc<dyn AccountingClient>,
    cache: LookupCache,
    classes: ClassMapping,
    items: ItemMapping,
    config: SyncConfig,
}

impl Resolver {
    /// Creates a resolver with an injected cache.
    #[must_use]
    pub fn new(client: Arc<dyn AccountingClient>, config: SyncConfig, cache: LookupCache) -> Self {
        Self {
            client,
            cache,
            classes: ClassMapping::from_config(&config),
            items: ItemMapping::from_config(&config),
            config,
        }
    }

    /// The sync configuration this resolver was built from.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The lookup cache.
    #[must_use]
    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Resolves the class for a classification.
    ///
    /// # Errors
    ///
    /// `ConfigurationMissing` if unmapped, `ResolutionFailed` if the class
    /// does not exist externally, `ExternalApi` if the lookup fails.
    pub async fn resolve_class(&self, classification: &Classification) -> Result<Ref, SyncError> {
        let name = self.classes.class_name(classification)?;
        self.resolve_class_named(name).await
    }

    /// Resolves a class by name.
    pub async fn resolve_class_named(&self, name: &str) -> Result<Ref, SyncError> {
        let id = self.lookup(LookupKind::Class, name).await?;
        Ok(Ref::named(id, name))
    }

    /// Resolves an account by name.
    pub async fn resolve_account(&self, name: &str) -> Result<Ref, SyncError> {
        let id = self.lookup(LookupKind::Account, name).await?;
        Ok(Ref::named(id, name))
    }

    /// Resolves the item for a line of the given document kind.
    ///
    /// A configured id wins. Otherwise the item named after the line's
    /// class is found or created, if the document kind allows it.
    ///
    /// # Errors
    ///
    /// `ConfigurationMissing` when no item is configured and the fallback
    /// is disabled for `kind`.
    pub async fn resolve_item(
        &self,
        classification: &Classification,
        kind: RecordKind,
    ) -> Result<Ref, SyncError> {
        if let Some(id) = self.items.configured(&classification.entity_type) {
            return Ok(Ref::id(id));
        }

        if !self.items.fallback_allowed(kind) {
            return Err(SyncError::ConfigurationMissing(format!(
                "no item configured for entity type '{}' and {} item fallback is disabled",
                classification.entity_type,
                kind.document_type()
            )));
        }

        let name = self.classes.class_name(classification)?;
        let id = self.lookup(LookupKind::Item, name).await?;
        Ok(Ref::named(id, name))
    }

    /// Resolves the payout fee line, or `None` if any part of it fails.
    pub async fn resolve_fee_line(&self) -> Option<FeeLineRefs> {
        match self.try_resolve_fee_line().await {
            Ok(refs) => Some(refs),
            Err(err) => {
                warn!(
                    error = %err,
                    code = err.error_code(),
                    "fee line could not be resolved, omitting it"
                );
                None
            }
        }
    }

    async fn try_resolve_fee_line(&self) -> Result<FeeLineRefs, SyncError> {
        let item = match &self.config.fee_item_id {
            Some(id) => Ref::id(id.clone()),
            None => {
                let name = &self.config.fee_item_name;
                Ref::named(self.lookup(LookupKind::Item, name).await?, name.clone())
            }
        };
        let class = self.resolve_class_named(&self.config.fee_class).await?;
        let account = self.resolve_account(&self.config.fee_account).await?;

        Ok(FeeLineRefs {
            item,
            class,
            account,
        })
    }

    async fn lookup(&self, kind: LookupKind, name: &str) -> Result<String, SyncError> {
        if let Some(id) = self.cache.get(kind, name) {
            return Ok(id);
        }

        let found = match kind {
            LookupKind::Account => self.client.query_account_by_name(name).await?,
            LookupKind::Class => self.client.query_class_by_name(name).await?,
            LookupKind::Item => {
                let options = ItemOptions {
                    income_account_id: None,
                    description: Some(name.to_string()),
                };
                Some(self.client.get_or_create_item(name, &options).await?)
            }
        };

        let id = found.ok_or_else(|| SyncError::ResolutionFailed {
            kind,
            name: name.to_string(),
        })?;

        debug!(kind = kind.as_str(), name, id = %id, "resolved external reference");
        self.cache.insert(kind, name, id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::client::InMemoryAccounting;
    use crate::client::memory::Operation;
    use ledgersync_shared::config::ItemFallbackConfig;

    fn resolver(client: &Arc<InMemoryAccounting>, config: SyncConfig) -> Resolver {
        Resolver::new(client.clone(), config, LookupCache::new())
    }

    #[tokio::test]
    async fn test_class_lookup_is_cached() {
        let client = Arc::new(InMemoryAccounting::seeded());
        let resolver = resolver(&client, SyncConfig::default());

        let first = resolver
            .resolve_class(&Classification::new("event"))
            .await
            .unwrap();
        let second = resolver
            .resolve_class(&Classification::new("event"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name.as_deref(), Some("Events"));
        assert_eq!(Some(first.value), client.class_id("Events"));
        assert_eq!(client.calls(Operation::QueryClass), 1);
    }

    #[tokio::test]
    async fn test_missing_class_fails_resolution() {
        let client = Arc::new(InMemoryAccounting::new());
        let resolver = resolver(&client, SyncConfig::default());

        let err = resolver
            .resolve_class(&Classification::new("event"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::ResolutionFailed {
                kind: LookupKind::Class,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        let client = Arc::new(InMemoryAccounting::new());
        let resolver = resolver(&client, SyncConfig::default());

        assert!(resolver.resolve_account("Bank Account").await.is_err());
        client.add_account("Bank Account");
        assert!(resolver.resolve_account("Bank Account").await.is_ok());
        assert_eq!(client.calls(Operation::QueryAccount), 2);
    }

    #[tokio::test]
    async fn test_configured_item_skips_external_call() {
        let client = Arc::new(InMemoryAccounting::seeded());
        let mut config = SyncConfig::default();
        config.items.insert("event".into(), "42".into());
        let resolver = resolver(&client, config);

        let item = resolver
            .resolve_item(&Classification::new("event"), RecordKind::Payment)
            .await
            .unwrap();
        assert_eq!(item.value, "42");
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_item_fallback_creates_item_named_after_class() {
        let client = Arc::new(InMemoryAccounting::seeded());
        let resolver = resolver(&client, SyncConfig::default());

        let item = resolver
            .resolve_item(
                &Classification::with_property("booking", "tahoe"),
                RecordKind::Refund,
            )
            .await
            .unwrap();
        assert_eq!(item.name.as_deref(), Some("Tahoe"));
        assert_eq!(Some(item.value), client.item_id("Tahoe"));
    }

    #[tokio::test]
    async fn test_item_fallback_disabled() {
        let client = Arc::new(InMemoryAccounting::seeded());
        let config = SyncConfig {
            item_fallback: ItemFallbackConfig {
                payments: false,
                refunds: true,
            },
            ..SyncConfig::default()
        };
        let resolver = resolver(&client, config);

        let err = resolver
            .resolve_item(&Classification::new("event"), RecordKind::Payment)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "configuration_missing");
        assert_eq!(client.calls(Operation::GetOrCreateItem), 0);
    }

    #[tokio::test]
    async fn test_fee_line_resolves() {
        let client = Arc::new(InMemoryAccounting::seeded());
        let resolver = resolver(&client, SyncConfig::default());

        let fee = resolver.resolve_fee_line().await.unwrap();
        assert_eq!(fee.account.name.as_deref(), Some("Stripe Fees"));
        assert_eq!(fee.class.name.as_deref(), Some("Administration"));
        assert_eq!(fee.item.name.as_deref(), Some("Processor Fees"));
    }

    #[tokio::test]
    async fn test_fee_line_degrades_to_none() {
        let client = Arc::new(InMemoryAccounting::seeded());
        client.fail_on(
            Operation::GetOrCreateItem,
            ClientError::Transport("connection reset".into()),
        );
        let resolver = resolver(&client, SyncConfig::default());

        assert!(resolver.resolve_fee_line().await.is_none());
    }
}
