//! Core business logic
//!
//! The engine's components, leaf-first:
//! - `resolver` - point-rate resolution with validity windows
//! - `access` - opt-in access restriction per participant and product
//! - `withholding` - per-financial-year tax withholding and settlement
//! - `poster` - staging of the full write set of an earning credit
//! - `constraints` - ordered post-credit business rules
//! - `redemption` - balance debit into a Pending redemption
//! - `engine` - the assembled resource bundle and its exposed operations

pub mod access;
pub mod constraints;
pub mod engine;
pub mod poster;
pub mod redemption;
pub mod resolver;
pub mod withholding;

pub use constraints::{ConstraintPipeline, RuleContext, RuleError, ScanRule};
pub use engine::{
    CreditReceipt, CreditRequest, RewardsEngine, ScanReceipt, ScanRequest, TdsSummary,
};
pub use poster::{earning_types, CreditContext, StagedCredit};
pub use redemption::{RedemptionReceipt, RedemptionRequest};
pub use withholding::{
    FyResetSummary, WithholdingEngine, WithholdingOutcome, WithholdingPolicy,
    DEFAULT_SETTLEMENT_THRESHOLD,
};
