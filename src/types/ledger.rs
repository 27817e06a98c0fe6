//! Bookkeeping record types: transactions, audit mirrors, ledger rows,
//! withholding records, and redemptions
//!
//! Transactions, audit records, and ledger entries are append-only artifacts
//! written when a credit or debit commits. Transactions store the NET points
//! actually credited; audit records mirror them with the GROSS figure and an
//! explicit status so downstream reporting stays comparable across
//! categories and independent of the transactional write path.

use crate::types::error::RewardsError;
use crate::types::fiscal::FinancialYear;
use crate::types::metadata::{Geolocation, Metadata};
use crate::types::participant::ParticipantId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Registered earning-type identifier (e.g. the id behind `"QR Scan"`)
pub type EarningTypeId = u32;

/// Redemption channel identifier (voucher, bank transfer, catalog, ...)
pub type ChannelId = u32;

/// An earned credit, as written to the category transaction books
///
/// Append-only. `points` holds the net figure after withholding, matching
/// the ledger row and the balance increment.
#[derive(Debug, Clone, PartialEq)]
pub struct EarningTransaction {
    pub participant: ParticipantId,
    pub earning_type: EarningTypeId,

    /// Net points credited
    pub points: i64,

    /// Product SKU the earning originated from, when applicable
    pub sku: Option<String>,

    /// Originating QR code, for scan earnings
    pub qr_code: Option<String>,

    /// Scan coordinates, when captured
    pub location: Option<Geolocation>,

    /// Opaque caller metadata
    pub metadata: Metadata,

    /// Promotional scheme reference, when the credit came from one
    pub scheme_id: Option<u64>,

    pub recorded_at: DateTime<Utc>,
}

/// Audit mirror of an earning attempt, successful or not
///
/// Unlike [`EarningTransaction`], audit rows exist for failures too: a
/// failed scan writes one outside the abandoned unit of work. `points`
/// holds the gross figure before withholding.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub participant: ParticipantId,

    /// Absent when the failure happened before type resolution
    pub earning_type: Option<EarningTypeId>,

    /// Gross points before withholding; zero for failures rejected before
    /// rate resolution
    pub points: i64,

    pub sku: Option<String>,

    /// `"SUCCESS"` or the stable error-kind label of the failure
    pub status: String,

    pub qr_code: Option<String>,
    pub location: Option<Geolocation>,
    pub metadata: Metadata,

    /// Correlation id of the unit of work that produced this row
    pub correlation_id: Uuid,

    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Status written for committed earnings
    pub const STATUS_SUCCESS: &'static str = "SUCCESS";
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl EntryDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryDirection::Credit => "CREDIT",
            EntryDirection::Debit => "DEBIT",
        }
    }
}

/// A reconciling balance-ledger row
///
/// Invariant: `closing_balance - opening_balance` equals `amount` for
/// credits and `-amount` for debits, on every row ever written.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub participant: ParticipantId,

    /// Earning-type reference for credits
    pub earning_type: Option<EarningTypeId>,

    /// Redemption channel reference for debits
    pub redemption_channel: Option<ChannelId>,

    /// Always positive; the direction carries the sign
    pub amount: i64,

    pub direction: EntryDirection,

    /// Free-text remark, defaults to the earning-type name
    pub remark: String,

    pub opening_balance: i64,
    pub closing_balance: i64,

    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether the opening/closing pair matches the signed amount
    pub fn reconciles(&self) -> bool {
        match self.direction {
            EntryDirection::Credit => self.closing_balance - self.opening_balance == self.amount,
            EntryDirection::Debit => self.opening_balance - self.closing_balance == self.amount,
        }
    }
}

/// Lifecycle of a per-financial-year withholding record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdsStatus {
    /// Accruing into the kitty
    Active,

    /// Kitty crossed the settlement threshold and was folded into
    /// `deducted`
    Settled,

    /// Closed out at year end below the threshold; kitty returned via
    /// `reversed_amount`
    Reverted,
}

impl TdsStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TdsStatus::Active => "active",
            TdsStatus::Settled => "settled",
            TdsStatus::Reverted => "reverted",
        }
    }
}

/// Bookkeeping metadata carried on a withholding record
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TdsMeta {
    /// Number of withholding events applied to this record
    pub transaction_count: u64,

    /// When the most recent deduction happened
    pub last_deduction_at: Option<DateTime<Utc>>,

    /// Amount of the most recent deduction
    pub last_deducted_amount: Option<i64>,

    /// Kitty reverted from the previous financial year at reset time
    pub reversed_carry_in: i64,
}

/// One row per (participant, financial year) of withheld points
#[derive(Debug, Clone, PartialEq)]
pub struct TdsRecord {
    pub participant: ParticipantId,
    pub financial_year: FinancialYear,

    /// Withheld amount accruing this year, not yet settled
    pub kitty: i64,

    /// Settled (permanently deducted) total
    pub deducted: i64,

    /// Amount returned at year-end reset when the kitty stayed below the
    /// settlement threshold
    pub reversed_amount: i64,

    pub status: TdsStatus,

    /// When the record last settled or closed out
    pub settled_at: Option<DateTime<Utc>>,

    pub meta: TdsMeta,
}

impl TdsRecord {
    /// A fresh active record with zeroed kitty and deductions
    pub fn open(participant: ParticipantId, financial_year: FinancialYear) -> Self {
        TdsRecord {
            participant,
            financial_year,
            kitty: 0,
            deducted: 0,
            reversed_amount: 0,
            status: TdsStatus::Active,
            settled_at: None,
            meta: TdsMeta::default(),
        }
    }

    /// Absorb a withheld amount into the kitty
    ///
    /// When the running kitty reaches the settlement threshold, the whole
    /// kitty (prior accrual plus this amount) folds into `deducted`, the
    /// kitty zeroes, and the record settles. Below the threshold the record
    /// keeps accruing as `Active`; a previously settled record that
    /// receives further withholding re-opens, so the year-end reset still
    /// sees it.
    pub fn absorb(
        &mut self,
        amount: i64,
        settlement_threshold: i64,
        at: DateTime<Utc>,
    ) -> Result<(), RewardsError> {
        let new_kitty = self
            .kitty
            .checked_add(amount)
            .ok_or_else(|| RewardsError::arithmetic_overflow("withholding", self.participant))?;

        if new_kitty >= settlement_threshold {
            self.deducted = self.deducted.checked_add(new_kitty).ok_or_else(|| {
                RewardsError::arithmetic_overflow("withholding settlement", self.participant)
            })?;
            self.kitty = 0;
            self.status = TdsStatus::Settled;
            self.settled_at = Some(at);
        } else {
            self.kitty = new_kitty;
            self.status = TdsStatus::Active;
        }

        self.meta.transaction_count += 1;
        self.meta.last_deduction_at = Some(at);
        self.meta.last_deducted_amount = Some(amount);
        Ok(())
    }

    /// Close the record out at the financial-year boundary
    ///
    /// A kitty at or above the threshold settles into `deducted`; anything
    /// below reverts into `reversed_amount`. Either way the kitty zeroes
    /// and the returned status is terminal for this year's record.
    pub fn close_for_reset(
        &mut self,
        settlement_threshold: i64,
        at: DateTime<Utc>,
    ) -> Result<TdsStatus, RewardsError> {
        let kitty = self.kitty;
        let closed = if kitty >= settlement_threshold {
            self.deducted = self.deducted.checked_add(kitty).ok_or_else(|| {
                RewardsError::arithmetic_overflow("year-end settlement", self.participant)
            })?;
            TdsStatus::Settled
        } else {
            self.reversed_amount = self.reversed_amount.checked_add(kitty).ok_or_else(|| {
                RewardsError::arithmetic_overflow("year-end reversal", self.participant)
            })?;
            TdsStatus::Reverted
        };
        self.kitty = 0;
        self.status = closed;
        self.settled_at = Some(at);
        Ok(closed)
    }
}

/// Status of a redemption request; the engine only ever writes `Pending`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Rejected,
}

impl RedemptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "Pending",
            RedemptionStatus::Approved => "Approved",
            RedemptionStatus::Rejected => "Rejected",
        }
    }
}

/// A redemption request, created in `Pending` alongside the balance debit
#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    pub participant: ParticipantId,

    /// Human-readable unique id, `RED-<millis>-<suffix>`
    pub redemption_id: String,

    pub channel: ChannelId,

    /// Points debited from the balance
    pub points: i64,

    /// Optional monetary amount for cash-equivalent channels
    pub amount: Option<i64>,

    pub status: RedemptionStatus,
    pub metadata: Metadata,

    /// Later workflow; always `None` when written by this engine
    pub approved_by: Option<ParticipantId>,

    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EntryDirection::Credit, 0, 5, 5, true)]
    #[case(EntryDirection::Credit, 10, 15, 5, true)]
    #[case(EntryDirection::Credit, 10, 14, 5, false)]
    #[case(EntryDirection::Debit, 150, 0, 150, true)]
    #[case(EntryDirection::Debit, 150, 10, 150, false)]
    fn test_ledger_reconciliation(
        #[case] direction: EntryDirection,
        #[case] opening: i64,
        #[case] closing: i64,
        #[case] amount: i64,
        #[case] expected: bool,
    ) {
        let entry = LedgerEntry {
            participant: 1,
            earning_type: Some(1),
            redemption_channel: None,
            amount,
            direction,
            remark: "QR Scan".to_string(),
            opening_balance: opening,
            closing_balance: closing,
            recorded_at: Utc::now(),
        };
        assert_eq!(entry.reconciles(), expected);
    }

    #[test]
    fn test_fresh_tds_record_is_active_and_zeroed() {
        let record = TdsRecord::open(7, FinancialYear::starting(2024));
        assert_eq!(record.status, TdsStatus::Active);
        assert_eq!(record.kitty, 0);
        assert_eq!(record.deducted, 0);
        assert_eq!(record.reversed_amount, 0);
        assert_eq!(record.meta.transaction_count, 0);
        assert!(record.settled_at.is_none());
    }

    #[test]
    fn test_absorb_accrues_below_threshold() {
        let mut record = TdsRecord::open(7, FinancialYear::starting(2024));
        record.absorb(5, 20_000, Utc::now()).unwrap();

        assert_eq!(record.kitty, 5);
        assert_eq!(record.deducted, 0);
        assert_eq!(record.status, TdsStatus::Active);
        assert_eq!(record.meta.transaction_count, 1);
        assert_eq!(record.meta.last_deducted_amount, Some(5));
    }

    #[test]
    fn test_absorb_settles_at_threshold() {
        let mut record = TdsRecord::open(7, FinancialYear::starting(2024));
        record.kitty = 19_998;

        record.absorb(5, 20_000, Utc::now()).unwrap();

        assert_eq!(record.kitty, 0);
        assert_eq!(record.deducted, 20_003);
        assert_eq!(record.status, TdsStatus::Settled);
        assert!(record.settled_at.is_some());
    }

    #[test]
    fn test_absorb_after_settlement_reopens_record() {
        let mut record = TdsRecord::open(7, FinancialYear::starting(2024));
        record.kitty = 19_999;
        record.absorb(1, 20_000, Utc::now()).unwrap();
        assert_eq!(record.status, TdsStatus::Settled);

        record.absorb(3, 20_000, Utc::now()).unwrap();
        assert_eq!(record.status, TdsStatus::Active);
        assert_eq!(record.kitty, 3);
        assert_eq!(record.deducted, 20_000);
    }

    #[test]
    fn test_close_for_reset_reverts_below_threshold() {
        let mut record = TdsRecord::open(7, FinancialYear::starting(2024));
        record.kitty = 1_200;

        let closed = record.close_for_reset(20_000, Utc::now()).unwrap();

        assert_eq!(closed, TdsStatus::Reverted);
        assert_eq!(record.kitty, 0);
        assert_eq!(record.reversed_amount, 1_200);
        assert!(record.settled_at.is_some());
    }

    #[test]
    fn test_close_for_reset_settles_at_threshold() {
        let mut record = TdsRecord::open(7, FinancialYear::starting(2024));
        record.kitty = 20_000;

        let closed = record.close_for_reset(20_000, Utc::now()).unwrap();

        assert_eq!(closed, TdsStatus::Settled);
        assert_eq!(record.kitty, 0);
        assert_eq!(record.deducted, 20_000);
        assert_eq!(record.reversed_amount, 0);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(TdsStatus::Active.as_str(), "active");
        assert_eq!(TdsStatus::Settled.as_str(), "settled");
        assert_eq!(TdsStatus::Reverted.as_str(), "reverted");
        assert_eq!(RedemptionStatus::Pending.as_str(), "Pending");
        assert_eq!(EntryDirection::Credit.as_str(), "CREDIT");
        assert_eq!(EntryDirection::Debit.as_str(), "DEBIT");
    }
}
