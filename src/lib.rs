//! Loyalty Rewards Engine Library
//! # Overview
//!
//! The earning & withholding ledger engine of a multi-tenant loyalty
//! rewards backend: one-time QR claims, point-rate resolution, opt-in
//! access restriction, per-financial-year tax withholding with threshold
//! settlement, reconciling balance ledgers, post-credit constraint rules,
//! and redemption requests. The thin HTTP boundary, master-data CRUD, and
//! notification plumbing of the surrounding system live elsewhere; this
//! crate is the part with the invariants.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (participants, QR codes, ledger records, errors)
//! - [`store`] - In-process storage: claim-locked QR codes, per-category
//!   books, the all-or-nothing unit of work
//! - [`core`] - Business logic:
//!   - [`core::resolver`] - point-rate resolution
//!   - [`core::access`] - participant access authorization
//!   - [`core::withholding`] - tax withholding and year-end reset
//!   - [`core::poster`] - earning credit posting
//!   - [`core::constraints`] - post-credit rule pipeline
//!   - [`core::redemption`] - redemption requests
//!   - [`core::engine`] - the assembled engine
//! - [`io`] - CSV formats for the replay tool
//! - [`replay`] - sequential and concurrent operation replay
//! - [`cli`] - CLI arguments parsing
//!
//! # Invariants
//!
//! - A QR code's claimed flag transitions false to true exactly once; a
//!   losing concurrent scanner fails fast with a business error.
//! - Both balance rows of a participant move together or not at all.
//! - Every ledger row's closing minus opening equals its signed amount.
//! - No unit of work leaves a kitty at or above the settlement threshold.
//! - A failed operation mutates nothing; its only trace is a failure audit
//!   row written after the unit of work was abandoned.

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod replay;
pub mod store;
pub mod types;

pub use crate::core::{
    earning_types, ConstraintPipeline, CreditReceipt, CreditRequest, FyResetSummary,
    RedemptionReceipt, RedemptionRequest, RewardsEngine, ScanReceipt, ScanRequest, TdsSummary,
    WithholdingPolicy,
};
pub use crate::replay::{build_engine, replay_concurrent, replay_sequential, ReplayReport};
pub use crate::types::{
    AccessRule, Category, CentralAccount, EngineError, ErrorKind, FinancialYear, Geolocation,
    Metadata, ParticipantId, PointConfig, QrCode, RewardsError, TdsRecord, TdsStatus,
};
