//! Configuration storage: point rates, access rules, earning types
//!
//! Small, mostly-read tables resolved on every scan. Point configs and
//! access rules are scanned linearly; both tables stay in the tens-to-
//! hundreds of rows in practice.

use crate::types::{AccessRule, Category, EarningTypeId, ParticipantId, PointConfig, RewardsError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Store of point configurations, access rules, and earning types
#[derive(Debug, Default)]
pub struct ConfigStore {
    point_configs: Mutex<Vec<PointConfig>>,
    access_rules: Mutex<Vec<AccessRule>>,
    earning_types: DashMap<String, EarningTypeId>,
    next_earning_type: AtomicU32,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        ConfigStore {
            point_configs: Mutex::new(Vec::new()),
            access_rules: Mutex::new(Vec::new()),
            earning_types: DashMap::new(),
            next_earning_type: AtomicU32::new(1),
        }
    }

    /// Add a point configuration; the rate must be positive
    pub fn add_point_config(&self, config: PointConfig) -> Result<(), RewardsError> {
        if config.rate <= Decimal::ZERO {
            return Err(RewardsError::invalid_input(format!(
                "point rate for sku '{}' must be positive",
                config.sku
            )));
        }
        self.point_configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config);
        Ok(())
    }

    /// Add an access rule for a participant
    pub fn add_access_rule(&self, rule: AccessRule) {
        self.access_rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rule);
    }

    /// Register an earning type by name, returning its id
    ///
    /// Idempotent: re-registering a name returns the existing id.
    pub fn register_earning_type(&self, name: &str) -> EarningTypeId {
        *self
            .earning_types
            .entry(name.to_string())
            .or_insert_with(|| self.next_earning_type.fetch_add(1, Ordering::Relaxed))
    }

    /// Look up a registered earning type id by name
    pub fn earning_type_id(&self, name: &str) -> Option<EarningTypeId> {
        self.earning_types.get(name).map(|entry| *entry)
    }

    /// All point configs matching the sku and category at `as_of`
    pub fn configs_matching(
        &self,
        sku: &str,
        category: Category,
        as_of: DateTime<Utc>,
    ) -> Vec<PointConfig> {
        self.point_configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|config| config.matches(sku, category, as_of))
            .cloned()
            .collect()
    }

    /// All access rules recorded for a participant, active or not
    ///
    /// Callers distinguish "no rules" (unrestricted) from "rules but no
    /// match" (forbidden); expired and inactive rules still count towards
    /// "rules exist".
    pub fn rules_for(&self, participant: ParticipantId) -> Vec<AccessRule> {
        self.access_rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|rule| rule.participant == participant)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_add_point_config_rejects_non_positive_rate() {
        let store = ConfigStore::new();
        let config = PointConfig::new(1, "SKU-9", Category::Retailer, Decimal::ZERO);
        assert!(store.add_point_config(config).is_err());
    }

    #[test]
    fn test_configs_matching_filters_by_category_and_window() {
        let store = ConfigStore::new();
        let june = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        store
            .add_point_config(PointConfig::new(
                1,
                "SKU-9",
                Category::Retailer,
                Decimal::new(500, 2),
            ))
            .unwrap();
        store
            .add_point_config(PointConfig::new(
                1,
                "SKU-9",
                Category::Electrician,
                Decimal::new(800, 2),
            ))
            .unwrap();

        let matches = store.configs_matching("SKU-9", Category::Retailer, june);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rate, Decimal::new(500, 2));
    }

    #[test]
    fn test_register_earning_type_is_idempotent() {
        let store = ConfigStore::new();
        let first = store.register_earning_type("QR Scan");
        let second = store.register_earning_type("QR Scan");
        assert_eq!(first, second);

        let other = store.register_earning_type("Referral Bonus");
        assert_ne!(first, other);
        assert_eq!(store.earning_type_id("QR Scan"), Some(first));
        assert_eq!(store.earning_type_id("Unknown"), None);
    }

    #[test]
    fn test_rules_for_returns_only_that_participant() {
        let store = ConfigStore::new();
        store.add_access_rule(AccessRule::specific(1, "SKU-9"));
        store.add_access_rule(AccessRule::specific(2, "SKU-9"));
        store.add_access_rule(AccessRule::specific(1, "SKU-8").deactivated());

        let rules = store.rules_for(1);
        assert_eq!(rules.len(), 2);
        assert!(store.rules_for(3).is_empty());
    }
}
