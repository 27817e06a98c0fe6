//! Point-rate resolution
//!
//! Finds the single point configuration applicable to a (sku, category)
//! pair at the scan instant. Zero matches and multiple matches are both
//! configuration errors; the resolver never tie-breaks ambiguity.

use crate::store::ConfigStore;
use crate::types::{Category, RewardsError};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Resolve the per-unit rate for a sku/category pair at `as_of`
///
/// # Errors
///
/// - `PointConfigMissing` when no config matches
/// - `PointConfigAmbiguous` when more than one config matches; ambiguous
///   configuration fails the scan rather than guessing a winner
pub fn resolve_rate(
    config: &ConfigStore,
    sku: &str,
    category: Category,
    as_of: DateTime<Utc>,
) -> Result<Decimal, RewardsError> {
    let matches = config.configs_matching(sku, category, as_of);
    match matches.as_slice() {
        [] => Err(RewardsError::point_config_missing(sku, category)),
        [only] => Ok(only.rate),
        many => Err(RewardsError::point_config_ambiguous(
            sku,
            category,
            many.len(),
        )),
    }
}

/// Whole points granted for one scanned unit at the given rate
///
/// Fractional rates floor to whole points; balances and ledger amounts are
/// integral throughout the engine.
pub fn points_for(rate: Decimal) -> Result<i64, RewardsError> {
    rate.floor()
        .to_i64()
        .ok_or_else(|| RewardsError::internal(format!("point rate {} out of range", rate)))
}
