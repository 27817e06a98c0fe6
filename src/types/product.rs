//! Product-side types: QR codes, point configurations, and access rules
//!
//! QR codes are provisioned upstream and consumed exactly once by a scan.
//! Point configurations map a (sku, category) pair to a per-unit rate inside
//! an optional validity window. Access rules are opt-in restrictions: a
//! participant with no rules at all earns anywhere, a participant with any
//! rule needs an explicit match.

use crate::types::metadata::{Geolocation, Metadata};
use crate::types::participant::{Category, ParticipantId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// A physical QR code printed on product packaging
///
/// The `claimed` flag transitions false to true exactly once, under the scan
/// row lock, and never reverses.
#[derive(Debug, Clone, PartialEq)]
pub struct QrCode {
    /// Unique printed code, the claim key
    pub code: String,

    /// Secondary verification code printed alongside
    pub security_code: String,

    /// Product SKU this code was printed for
    pub sku: String,

    /// Manufacturing batch the code belongs to
    pub batch_number: String,

    /// Parent code for nested batch / sub-batch hierarchies
    pub parent_code: Option<String>,

    /// Date the unit was manufactured
    pub manufacturing_date: NaiveDate,

    /// Whether the code has been consumed by a scan
    pub claimed: bool,

    /// Participant who claimed the code
    pub claimed_by: Option<ParticipantId>,

    /// Coordinates captured by the claiming scan
    pub scan_location: Option<Geolocation>,

    /// Free-form location metadata from provisioning
    pub location_note: Option<Metadata>,
}

impl QrCode {
    /// Create an unclaimed code
    pub fn new(
        code: impl Into<String>,
        security_code: impl Into<String>,
        sku: impl Into<String>,
        batch_number: impl Into<String>,
        manufacturing_date: NaiveDate,
    ) -> Self {
        QrCode {
            code: code.into(),
            security_code: security_code.into(),
            sku: sku.into(),
            batch_number: batch_number.into(),
            parent_code: None,
            manufacturing_date,
            claimed: false,
            claimed_by: None,
            scan_location: None,
            location_note: None,
        }
    }

    /// Attach a parent code (batch / sub-batch nesting)
    pub fn with_parent(mut self, parent_code: impl Into<String>) -> Self {
        self.parent_code = Some(parent_code.into());
        self
    }
}

/// Per-unit point rate for a (sku, participant-category) pair
///
/// Multiple configs may exist per sku across categories; resolution must
/// find exactly one for the caller's category at the scan instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PointConfig {
    /// Owning tenant
    pub client_id: u64,

    /// Product SKU code
    pub sku: String,

    /// Category the rate applies to
    pub category: Category,

    /// Points credited per scanned unit
    pub rate: Decimal,

    /// Start of the validity window, unbounded when absent
    pub valid_from: Option<DateTime<Utc>>,

    /// End of the validity window, unbounded when absent
    pub valid_to: Option<DateTime<Utc>>,

    /// Operator notes
    pub remarks: Option<String>,
}

impl PointConfig {
    /// Create an always-valid config
    pub fn new(client_id: u64, sku: impl Into<String>, category: Category, rate: Decimal) -> Self {
        PointConfig {
            client_id,
            sku: sku.into(),
            category,
            rate,
            valid_from: None,
            valid_to: None,
            remarks: None,
        }
    }

    /// Restrict the config to a validity window
    pub fn with_window(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_to = valid_to;
        self
    }

    /// Whether `as_of` falls inside the validity window
    pub fn in_window(&self, as_of: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if as_of < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if as_of > to {
                return false;
            }
        }
        true
    }

    /// Whether this config applies to the given sku/category at `as_of`
    pub fn matches(&self, sku: &str, category: Category, as_of: DateTime<Utc>) -> bool {
        self.sku == sku && self.category == category && self.in_window(as_of)
    }
}

/// An opt-in restriction granting a participant access to a product node
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRule {
    /// Participant the rule applies to
    pub participant: ParticipantId,

    /// Product SKU the rule grants access to
    pub sku: String,

    /// Access-type discriminator, `"specific"` for direct sku grants
    pub access_type: String,

    /// Start of the validity window
    pub valid_from: Option<DateTime<Utc>>,

    /// End of the validity window
    pub valid_to: Option<DateTime<Utc>>,

    /// Inactive rules still count as "rules exist" but never permit
    pub active: bool,
}

impl AccessRule {
    /// A direct, always-valid grant for one sku
    pub fn specific(participant: ParticipantId, sku: impl Into<String>) -> Self {
        AccessRule {
            participant,
            sku: sku.into(),
            access_type: "specific".to_string(),
            valid_from: None,
            valid_to: None,
            active: true,
        }
    }

    /// Restrict the rule to a validity window
    pub fn with_window(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_to = valid_to;
        self
    }

    /// Mark the rule inactive
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether this rule permits earning on the sku at `as_of`
    pub fn permits(&self, sku: &str, as_of: DateTime<Utc>) -> bool {
        if !self.active || self.sku != sku {
            return false;
        }
        if let Some(from) = self.valid_from {
            if as_of < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if as_of > to {
                return false;
            }
        }
        true
    }
}
