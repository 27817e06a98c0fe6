//! Boundary blob types: free-form metadata and geolocation
//!
//! Callers hand the engine loosely-structured JSON metadata and scan
//! coordinates. Both are validated once at the boundary and carried opaquely
//! afterwards; the engine never introspects metadata contents.

use crate::types::error::RewardsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque, validated JSON-object metadata blob
///
/// Construction enforces that the value is a JSON object (or absent); the
/// contents are never interpreted by the engine, only stored and echoed back
/// on records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Value);

impl Metadata {
    /// Validate and wrap a JSON value; only objects are accepted
    pub fn new(value: Value) -> Result<Self, RewardsError> {
        if value.is_object() {
            Ok(Metadata(value))
        } else {
            Err(RewardsError::invalid_input("metadata must be a JSON object"))
        }
    }

    /// An empty metadata object
    pub fn empty() -> Self {
        Metadata(Value::Object(serde_json::Map::new()))
    }

    /// Borrow the underlying JSON value
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::empty()
    }
}

/// A validated latitude/longitude pair captured at scan time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl Geolocation {
    /// Validate coordinate ranges: latitude -90..=90, longitude -180..=180
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RewardsError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(RewardsError::invalid_input(format!(
                "latitude {} out of range",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(RewardsError::invalid_input(format!(
                "longitude {} out of range",
                longitude
            )));
        }
        Ok(Geolocation {
            latitude,
            longitude,
        })
    }
}
