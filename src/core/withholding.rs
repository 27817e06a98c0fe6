//! Tax withholding against gross earnings
//!
//! A percentage of every gross credit is withheld into a per-financial-year
//! "kitty". When the running kitty reaches the settlement threshold it is
//! folded into the permanently-deducted total in the same unit of work as
//! the triggering credit. At the April 1 boundary, active records of the
//! closing year settle or revert and a fresh record opens for the new year.
//!
//! Failure policy: withholding errors never propagate. A tax-bookkeeping
//! defect must not prevent a participant from receiving earned points, so
//! every internal failure degrades to zero withholding and a warning. This
//! is a deliberate risk trade-off, not an oversight.

use crate::store::unit_of_work::TdsPosting;
use crate::store::{Books, UnitOfWork};
use crate::types::{Category, FinancialYear, ParticipantId, RewardsError, TdsRecord, TdsStatus};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{error, warn};

/// Default kitty value at which withholding settles
pub const DEFAULT_SETTLEMENT_THRESHOLD: i64 = 20_000;

/// Withholding configuration, assembled once at startup
///
/// Rate resolution tries the category-specific entry first, then the
/// generic fallback; absent both, no withholding applies. The settlement
/// threshold is configuration rather than a constant so finance can move it
/// without a release.
#[derive(Debug, Clone, Default)]
pub struct WithholdingPolicy {
    settlement_threshold: Option<i64>,
    category_rates: HashMap<Category, Decimal>,
    fallback_rate: Option<Decimal>,
}

impl WithholdingPolicy {
    /// A policy with no rates: withholding disabled
    pub fn new() -> Self {
        WithholdingPolicy::default()
    }

    /// Set the rate for one category
    pub fn with_category_rate(mut self, category: Category, percent: Decimal) -> Self {
        self.category_rates.insert(category, percent);
        self
    }

    /// Set the generic fallback rate
    pub fn with_fallback_rate(mut self, percent: Decimal) -> Self {
        self.fallback_rate = Some(percent);
        self
    }

    /// Override the settlement threshold
    pub fn with_settlement_threshold(mut self, threshold: i64) -> Self {
        self.settlement_threshold = Some(threshold);
        self
    }

    /// The percentage applicable to a category
    pub fn rate_for(&self, category: Category) -> Decimal {
        self.category_rates
            .get(&category)
            .copied()
            .or(self.fallback_rate)
            .unwrap_or(Decimal::ZERO)
    }

    /// The kitty value at which withholding settles
    pub fn settlement_threshold(&self) -> i64 {
        self.settlement_threshold
            .unwrap_or(DEFAULT_SETTLEMENT_THRESHOLD)
    }
}

/// What a withholding application did to one gross credit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithholdingOutcome {
    pub gross: i64,
    pub withheld: i64,
    pub net: i64,
}

impl WithholdingOutcome {
    fn passthrough(gross: i64) -> Self {
        WithholdingOutcome {
            gross,
            withheld: 0,
            net: gross,
        }
    }
}

/// Result counters of a financial-year reset batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FyResetSummary {
    /// Records closed out
    pub processed: usize,

    /// Records whose kitty settled into the deducted total
    pub settled: usize,

    /// Records whose kitty reverted to the participant
    pub reverted: usize,

    /// Records skipped because their close-out failed
    pub errors: usize,
}

/// The withholding engine: rate resolution, kitty postings, year-end reset
#[derive(Debug, Default)]
pub struct WithholdingEngine {
    policy: WithholdingPolicy,
}

impl WithholdingEngine {
    pub fn new(policy: WithholdingPolicy) -> Self {
        WithholdingEngine { policy }
    }

    pub fn policy(&self) -> &WithholdingPolicy {
        &self.policy
    }

    /// Compute withholding for a gross credit and stage the kitty posting
    ///
    /// Never fails. A zero rate or a rounded-down zero amount stages
    /// nothing (no zero-value ledger noise); internal errors degrade to a
    /// passthrough outcome with a warning.
    pub fn stage(
        &self,
        uow: &mut UnitOfWork<'_>,
        participant: ParticipantId,
        category: Category,
        gross: i64,
        at: DateTime<Utc>,
    ) -> WithholdingOutcome {
        let amount = match self.compute_amount(category, gross) {
            Ok(amount) => amount,
            Err(error) => {
                warn!(
                    participant,
                    %category,
                    gross,
                    %error,
                    "withholding computation failed; crediting gross"
                );
                return WithholdingOutcome::passthrough(gross);
            }
        };
        if amount == 0 {
            return WithholdingOutcome::passthrough(gross);
        }

        uow.stage_tds_posting(TdsPosting {
            participant,
            financial_year: FinancialYear::from_date(at.date_naive()),
            amount,
            settlement_threshold: self.policy.settlement_threshold(),
            at,
        });

        WithholdingOutcome {
            gross,
            withheld: amount,
            net: gross - amount,
        }
    }

    /// `floor(gross * pct / 100)` for the category's rate
    fn compute_amount(&self, category: Category, gross: i64) -> Result<i64, RewardsError> {
        let percent = self.policy.rate_for(category);
        if percent <= Decimal::ZERO {
            return Ok(0);
        }
        let amount = (Decimal::from(gross) * percent / Decimal::from(100)).floor();
        let amount = amount
            .to_i64()
            .ok_or_else(|| RewardsError::internal(format!("withheld amount {} out of range", amount)))?;
        if amount < 0 || amount > gross {
            return Err(RewardsError::internal(format!(
                "withholding rate {} produced amount {} for gross {}",
                percent, amount, gross
            )));
        }
        Ok(amount)
    }

    /// Close out every active record of `previous` and open records for
    /// `next`
    ///
    /// Records with a kitty at or above the threshold settle; the rest
    /// revert, and the reverted amount is noted on the fresh record.
    /// Per-record failures are counted, never fatal to the batch.
    pub fn reset_financial_year(
        &self,
        books: &Books,
        previous: FinancialYear,
        next: FinancialYear,
        at: DateTime<Utc>,
    ) -> FyResetSummary {
        let mut summary = FyResetSummary::default();
        for participant in books.active_tds_participants(previous) {
            match self.reset_one(books, participant, previous, next, at) {
                Ok(Some(TdsStatus::Settled)) => {
                    summary.processed += 1;
                    summary.settled += 1;
                }
                Ok(Some(TdsStatus::Reverted)) => {
                    summary.processed += 1;
                    summary.reverted += 1;
                }
                // Raced with a concurrent closer or the record vanished
                Ok(_) => {}
                Err(err) => {
                    error!(participant, year = %previous, error = %err, "year-end reset failed");
                    summary.errors += 1;
                }
            }
        }
        summary
    }

    fn reset_one(
        &self,
        books: &Books,
        participant: ParticipantId,
        previous: FinancialYear,
        next: FinancialYear,
        at: DateTime<Utc>,
    ) -> Result<Option<TdsStatus>, RewardsError> {
        let (closed, carry) = {
            let mut record = match books.tds_entry_existing(participant, previous) {
                Some(record) => record,
                None => return Ok(None),
            };
            if record.status != TdsStatus::Active {
                return Ok(None);
            }
            let kitty = record.kitty;
            let closed = record.close_for_reset(self.policy.settlement_threshold(), at)?;
            let carry = if closed == TdsStatus::Reverted { kitty } else { 0 };
            (closed, carry)
            // guard drops here, before touching the map again
        };

        let mut fresh = TdsRecord::open(participant, next);
        fresh.meta.reversed_carry_in = carry;
        books.open_tds_if_absent(fresh);

        Ok(Some(closed))
    }
}
