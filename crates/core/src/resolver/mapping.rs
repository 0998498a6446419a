//! Static classification tables.

use std::collections::HashMap;

use ledgersync_shared::config::{ItemFallbackConfig, SyncConfig};

use crate::error::SyncError;
use crate::record::{Classification, RecordKind};

/// Maps a classification to an external class name.
///
/// A mapped property overrides the entity type mapping.
#[derive(Debug, Clone, Default)]
pub struct ClassMapping {
    entity_classes: HashMap<String, String>,
    property_classes: HashMap<String, String>,
}

impl ClassMapping {
    /// Creates a mapping from explicit tables.
    #[must_use]
    pub fn new(
        entity_classes: HashMap<String, String>,
        property_classes: HashMap<String, String>,
    ) -> Self {
        Self {
            entity_classes,
            property_classes,
        }
    }

    /// Creates a mapping from the sync configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.entity_classes.clone(), config.property_classes.clone())
    }

    /// Returns the class name for a classification.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ConfigurationMissing` when neither the property
    /// nor the entity type is mapped.
    pub fn class_name(&self, classification: &Classification) -> Result<&str, SyncError> {
        if let Some(name) = classification
            .property
            .as_ref()
            .and_then(|p| self.property_classes.get(p))
        {
            return Ok(name);
        }

        self.entity_classes
            .get(&classification.entity_type)
            .map(String::as_str)
            .ok_or_else(|| {
                SyncError::ConfigurationMissing(match &classification.property {
                    Some(property) => format!(
                        "no class mapped for entity type '{}' or property '{property}'",
                        classification.entity_type
                    ),
                    None => format!(
                        "no class mapped for entity type '{}'",
                        classification.entity_type
                    ),
                })
            })
    }
}

/// Statically configured item ids and the dynamic fallback policy.
#[derive(Debug, Clone, Default)]
pub struct ItemMapping {
    items: HashMap<String, String>,
    fallback: ItemFallbackConfig,
}

impl ItemMapping {
    /// Creates a mapping from explicit tables.
    #[must_use]
    pub fn new(items: HashMap<String, String>, fallback: ItemFallbackConfig) -> Self {
        Self { items, fallback }
    }

    /// Creates a mapping from the sync configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.items.clone(), config.item_fallback)
    }

    /// Configured item id for an entity type.
    pub fn configured(&self, entity_type: &str) -> Option<&str> {
        self.items.get(entity_type).map(String::as_str)
    }

    /// Whether lines of this document kind may find-or-create their item.
    ///
    /// Payout fee lines always may; failure there only drops the line.
    #[must_use]
    pub fn fallback_allowed(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Payment => self.fallback.payments,
            RecordKind::Refund => self.fallback.refunds,
            RecordKind::Payout => true,
        }
    }
}
