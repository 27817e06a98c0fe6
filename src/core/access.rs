//! Participant access authorization
//!
//! The access table is an opt-in restriction, not an opt-in grant: a
//! participant with no rules at all earns anywhere, while a participant
//! with any rule on file needs an active, in-window rule for the specific
//! product. The asymmetry is intentional and must not be "fixed".

use crate::store::ConfigStore;
use crate::types::{ParticipantId, RewardsError};
use chrono::{DateTime, Utc};

/// Authorize a participant to earn on a product sku at `as_of`
pub fn authorize(
    config: &ConfigStore,
    participant: ParticipantId,
    sku: &str,
    as_of: DateTime<Utc>,
) -> Result<(), RewardsError> {
    let rules = config.rules_for(participant);
    if rules.is_empty() {
        // No rules on file: unrestricted
        return Ok(());
    }
    if rules.iter().any(|rule| rule.permits(sku, as_of)) {
        Ok(())
    } else {
        Err(RewardsError::forbidden(participant, sku))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessRule, ErrorKind};
    use chrono::TimeZone;

    fn june() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_rules_means_unrestricted() {
        let store = ConfigStore::new();
        assert!(authorize(&store, 7, "SKU-9", june()).is_ok());
    }

    #[test]
    fn test_matching_rule_allows() {
        let store = ConfigStore::new();
        store.add_access_rule(AccessRule::specific(7, "SKU-9"));
        assert!(authorize(&store, 7, "SKU-9", june()).is_ok());
    }

    #[test]
    fn test_rules_without_match_forbid() {
        let store = ConfigStore::new();
        store.add_access_rule(AccessRule::specific(7, "SKU-8"));
        let result = authorize(&store, 7, "SKU-9", june());
        assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::Forbidden));
    }

    #[test]
    fn test_single_expired_rule_forbids_rather_than_unrestricts() {
        let store = ConfigStore::new();
        let start = Utc.with_ymd_and_hms(2023, 4, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        store.add_access_rule(
            AccessRule::specific(7, "SKU-9").with_window(Some(start), Some(end)),
        );

        // An expired rule still counts as "rules exist": forbidden
        assert!(authorize(&store, 7, "SKU-9", june()).is_err());
    }

    #[test]
    fn test_inactive_rule_forbids() {
        let store = ConfigStore::new();
        store.add_access_rule(AccessRule::specific(7, "SKU-9").deactivated());
        assert!(authorize(&store, 7, "SKU-9", june()).is_err());
    }

    #[test]
    fn test_other_participants_rules_do_not_restrict() {
        let store = ConfigStore::new();
        store.add_access_rule(AccessRule::specific(8, "SKU-9"));
        assert!(authorize(&store, 7, "SKU-9", june()).is_ok());
    }
}
