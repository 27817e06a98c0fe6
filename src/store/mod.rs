//! Storage layer
//!
//! In-process realization of the engine's shared store:
//! - `qr` - provisioned QR codes and the one-time claim guard
//! - `config` - point configurations, access rules, earning types
//! - `books` - per-category books, central accounts, withholding records
//! - `unit_of_work` - staged writes with all-or-nothing commit

pub mod books;
pub mod config;
pub mod qr;
pub mod unit_of_work;

pub use books::Books;
pub use config::ConfigStore;
pub use qr::{ClaimedCode, QrCodeStore};
pub use unit_of_work::{BalanceChange, CommitOutcome, UnitOfWork};
