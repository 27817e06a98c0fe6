//! Participant-related types for the loyalty rewards engine
//!
//! This module defines participant identity, the earning categories a
//! participant can belong to, and the two redundant balance rows the engine
//! keeps per participant (category profile + central account).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Participant identifier
pub type ParticipantId = u64;

/// The role under which a participant earns and redeems points
///
/// The category determines which physical books (transactions, audit log,
/// ledger, profile) a participant's earnings are written to, and which point
/// rate applies for a given product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Shop owner scanning stock they sell
    Retailer,

    /// Installer scanning product they fit
    Electrician,

    /// Staff behind a retailer's counter, usually credited indirectly
    CounterStaff,
}

impl Category {
    /// All categories, in stable book order
    pub const ALL: [Category; 3] = [
        Category::Retailer,
        Category::Electrician,
        Category::CounterStaff,
    ];

    /// Stable index into per-category book arrays
    pub fn index(self) -> usize {
        match self {
            Category::Retailer => 0,
            Category::Electrician => 1,
            Category::CounterStaff => 2,
        }
    }

    /// Human-readable category name
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Retailer => "retailer",
            Category::Electrician => "electrician",
            Category::CounterStaff => "counter-staff",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retailer" => Ok(Category::Retailer),
            "electrician" => Ok(Category::Electrician),
            "counter-staff" | "counter_staff" | "counter staff" => Ok(Category::CounterStaff),
            other => Err(format!("unknown participant category '{}'", other)),
        }
    }
}

/// Category-specific profile row for a participant
///
/// Holds the balance redundantly with the central account; every balance
/// mutation updates both rows in the same unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// The participant this profile belongs to
    pub participant: ParticipantId,

    /// Current points balance on the category books
    pub balance: i64,

    /// Lifetime earned points (never decremented by redemptions)
    pub total_earnings: i64,

    /// Linked counter-staff account, set on retailer profiles only
    ///
    /// When present, a primary retailer scan triggers a derivative bonus
    /// credit to this participant.
    pub linked_staff: Option<ParticipantId>,
}

impl Profile {
    /// Create a fresh profile with zero balances
    pub fn new(participant: ParticipantId) -> Self {
        Profile {
            participant,
            balance: 0,
            total_earnings: 0,
            linked_staff: None,
        }
    }
}

/// Central account row for a participant
///
/// The aggregate balance row shared by all categories. Records the category
/// the participant registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct CentralAccount {
    /// The participant this account belongs to
    pub participant: ParticipantId,

    /// The category the participant registered under
    pub category: Category,

    /// Current aggregate points balance
    pub balance: i64,

    /// Lifetime earned points
    pub total_earnings: i64,
}

impl CentralAccount {
    /// Create a fresh central account with zero balances
    pub fn new(participant: ParticipantId, category: Category) -> Self {
        CentralAccount {
            participant,
            category,
            balance: 0,
            total_earnings: 0,
        }
    }
}
