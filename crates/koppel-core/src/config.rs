//! Scheduling configuration and credential resolution.
//!
//! The bridge is driven by a small configuration mapping (which object
//! types to sync, for which customer IDs, how often) plus a credential set
//! holding a general destination API key and optional per-object-type
//! overrides. Both are read-only from the core's perspective; an external
//! store owns them.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    error::{CoreError, Result},
    models::ObjectType,
};

fn default_frequency_minutes() -> u32 {
    15
}

fn default_true() -> bool {
    true
}

/// Scheduling configuration for sync runs.
///
/// Mirrors the configuration mapping the external store provides. Customer
/// IDs arrive as one free-form string, newline or comma separated, exactly
/// as an operator pasted them.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// Minutes between periodic runs. Zero means run once.
    #[serde(default = "default_frequency_minutes")]
    pub frequency_minutes: u32,
    /// Whether periodic syncing is enabled at all.
    #[serde(default)]
    pub enabled: bool,
    /// Raw customer ID list, newline and/or comma separated.
    #[serde(default)]
    pub customer_ids: String,
    /// Sync customer records as contacts.
    #[serde(default = "default_true")]
    pub sync_contacts: bool,
    /// Sync membership records.
    #[serde(default = "default_true")]
    pub sync_memberships: bool,
    /// Sync purchased products as deals.
    #[serde(default)]
    pub sync_orders: bool,
    /// Sync event registrations as deals.
    #[serde(default)]
    pub sync_events: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            frequency_minutes: default_frequency_minutes(),
            enabled: false,
            customer_ids: String::new(),
            sync_contacts: true,
            sync_memberships: true,
            sync_orders: false,
            sync_events: false,
        }
    }
}

impl SchedulingConfig {
    /// Parses the raw customer ID string into a cleaned list.
    ///
    /// Commas and newlines both separate entries; surrounding whitespace is
    /// trimmed and empty entries are dropped. Order is preserved.
    pub fn customer_id_list(&self) -> Vec<String> {
        self.customer_ids
            .replace(',', "\n")
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Whether the given object type is enabled for syncing.
    pub fn is_enabled_for(&self, object_type: ObjectType) -> bool {
        match object_type {
            ObjectType::Contacts => self.sync_contacts,
            ObjectType::Memberships => self.sync_memberships,
            ObjectType::Orders => self.sync_orders,
            ObjectType::Events => self.sync_events,
        }
    }

    /// Returns the enabled object types in stable order.
    pub fn enabled_object_types(&self) -> Vec<ObjectType> {
        ObjectType::ALL.into_iter().filter(|ty| self.is_enabled_for(*ty)).collect()
    }
}

/// Destination API credentials with per-object-type overrides.
///
/// Resolution order is fixed: the object type's override key when present
/// and non-empty, otherwise the general key. A sync is never attempted
/// without a resolved key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialSet {
    /// Default API key, used for every type without an override.
    #[serde(default)]
    pub general_key: String,
    /// Optional per-object-type override keys.
    #[serde(default)]
    pub per_object_keys: HashMap<ObjectType, String>,
}

impl CredentialSet {
    /// Creates a credential set with only a general key.
    pub fn new(general_key: impl Into<String>) -> Self {
        Self { general_key: general_key.into(), per_object_keys: HashMap::new() }
    }

    /// Sets an override key for one object type.
    pub fn with_override(mut self, object_type: ObjectType, key: impl Into<String>) -> Self {
        self.per_object_keys.insert(object_type, key.into());
        self
    }

    /// Resolves the key to use for an object type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingCredential`] when neither a non-empty
    /// override nor a non-empty general key exists.
    pub fn resolve_key(&self, object_type: ObjectType) -> Result<&str> {
        if let Some(key) = self.per_object_keys.get(&object_type) {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
        if self.general_key.trim().is_empty() {
            return Err(CoreError::missing_credential(object_type.as_str()));
        }
        Ok(&self.general_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_ids_split_on_commas_and_newlines() {
        let config = SchedulingConfig {
            customer_ids: "12345\n67890, 24680 ,\n\n 13579".to_string(),
            ..Default::default()
        };
        assert_eq!(config.customer_id_list(), vec!["12345", "67890", "24680", "13579"]);
    }

    #[test]
    fn empty_customer_ids_yield_empty_list() {
        let config = SchedulingConfig::default();
        assert!(config.customer_id_list().is_empty());

        let blank =
            SchedulingConfig { customer_ids: " \n , ,\n".to_string(), ..Default::default() };
        assert!(blank.customer_id_list().is_empty());
    }

    #[test]
    fn enabled_types_follow_flags() {
        let config = SchedulingConfig {
            sync_contacts: true,
            sync_memberships: false,
            sync_orders: true,
            sync_events: false,
            ..Default::default()
        };
        assert_eq!(config.enabled_object_types(), vec![ObjectType::Contacts, ObjectType::Orders]);

        let none = SchedulingConfig {
            sync_contacts: false,
            sync_memberships: false,
            sync_orders: false,
            sync_events: false,
            ..Default::default()
        };
        assert!(none.enabled_object_types().is_empty());
    }

    #[test]
    fn credential_fallback_to_general_key() {
        let credentials = CredentialSet::new("general-key")
            .with_override(ObjectType::Orders, "orders-key")
            .with_override(ObjectType::Events, "   ");

        // Override present and non-empty wins.
        assert_eq!(credentials.resolve_key(ObjectType::Orders).unwrap(), "orders-key");
        // No override falls back.
        assert_eq!(credentials.resolve_key(ObjectType::Contacts).unwrap(), "general-key");
        // Blank override falls back too.
        assert_eq!(credentials.resolve_key(ObjectType::Events).unwrap(), "general-key");
    }

    #[test]
    fn missing_general_key_is_an_error() {
        let credentials = CredentialSet::new("").with_override(ObjectType::Orders, "orders-key");

        // The override still works for its own type.
        assert_eq!(credentials.resolve_key(ObjectType::Orders).unwrap(), "orders-key");
        // Everything else has nothing to fall back to.
        let err = credentials.resolve_key(ObjectType::Contacts).unwrap_err();
        assert!(matches!(err, CoreError::MissingCredential { .. }));
    }

    #[test]
    fn config_deserializes_from_external_mapping() {
        let config: SchedulingConfig = serde_json::from_value(serde_json::json!({
            "frequency_minutes": 30,
            "enabled": true,
            "customer_ids": "12345,67890",
            "sync_orders": true
        }))
        .unwrap();

        assert_eq!(config.frequency_minutes, 30);
        assert!(config.enabled);
        assert!(config.sync_contacts);
        assert!(config.sync_orders);
        assert!(!config.sync_events);
        assert_eq!(config.customer_id_list().len(), 2);
    }
}
