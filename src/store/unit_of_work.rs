//! The unit of work: staged writes committed all-or-nothing
//!
//! Every engine operation stages its writes into a `UnitOfWork` value passed
//! through plain functions, then commits once at the end. Nothing staged is
//! visible to other callers until commit, and a unit dropped on the error
//! path leaves no trace, which is the rollback behavior the surrounding
//! system gets from its database transactions.
//!
//! Commit ordering:
//!
//! 1. Balance deltas merge per participant, then every affected balance
//!    cell is locked in ascending participant order (central before
//!    profile). All new values are computed with checked arithmetic and
//!    redemption sufficiency is verified before anything is written, so a
//!    failing commit releases its locks without a single mutation.
//! 2. Withholding postings apply one record at a time. Their failures are
//!    logged and swallowed: a withholding defect must never block the
//!    earning credit it rode in on.
//! 3. Append-only rows are pushed; ledger intents resolve their
//!    opening/closing pair from the balances captured in step 1, so every
//!    row reconciles by construction.
//! 4. The QR claim, when one is attached, is finalized last and its entry
//!    lock released.

use crate::store::books::{lock_cell, Books};
use crate::store::qr::ClaimedCode;
use crate::types::{
    AuditRecord, Category, CentralAccount, ChannelId, EarningTransaction, EarningTypeId,
    EntryDirection, FinancialYear, Geolocation, LedgerEntry, ParticipantId, Profile, Redemption,
    RewardsError,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::MutexGuard;
use tracing::warn;

/// A staged balance movement against both rows of one participant
#[derive(Debug, Clone, Copy)]
pub(crate) struct BalanceDelta {
    pub participant: ParticipantId,
    pub category: Category,

    /// Signed movement; negative debits must not take the balance below
    /// zero
    pub amount: i64,
}

/// A staged withholding accrual
#[derive(Debug, Clone, Copy)]
pub(crate) struct TdsPosting {
    pub participant: ParticipantId,
    pub financial_year: FinancialYear,
    pub amount: i64,
    pub settlement_threshold: i64,
    pub at: DateTime<Utc>,
}

/// A ledger row whose opening/closing pair is resolved at commit time
#[derive(Debug, Clone)]
pub(crate) struct LedgerIntent {
    pub participant: ParticipantId,
    pub category: Category,
    pub earning_type: Option<EarningTypeId>,
    pub redemption_channel: Option<ChannelId>,

    /// Always positive; direction carries the sign
    pub amount: i64,
    pub direction: EntryDirection,
    pub remark: String,
    pub at: DateTime<Utc>,
}

/// A QR claim held open until commit
struct PendingClaim<'a> {
    claim: ClaimedCode<'a>,
    claimant: ParticipantId,
    location: Option<Geolocation>,
}

/// Balance movement observed by a committed unit of work
#[derive(Debug, Clone, Copy)]
pub struct BalanceChange {
    pub opening: i64,
    pub closing: i64,
}

/// The result of a successful commit
#[derive(Debug, Default)]
pub struct CommitOutcome {
    changes: BTreeMap<(ParticipantId, Category), BalanceChange>,
}

impl CommitOutcome {
    /// The profile balance movement for a participant, when one committed
    pub fn change_for(
        &self,
        participant: ParticipantId,
        category: Category,
    ) -> Option<BalanceChange> {
        self.changes.get(&(participant, category)).copied()
    }
}

/// New values for one participant's pair of balance rows, computed during
/// validation and written only when every cell validated
#[derive(Debug, Clone, Copy)]
struct StagedBalances {
    central_balance: i64,
    profile_balance: i64,
    central_earned: i64,
    profile_earned: i64,
}

/// Staged writes for one engine operation
///
/// Holds the QR entry lock (when a scan attached one) for its whole
/// lifetime; dropping without [`commit`](UnitOfWork::commit) abandons
/// everything.
pub struct UnitOfWork<'a> {
    books: &'a Books,
    claim: Option<PendingClaim<'a>>,
    deltas: Vec<BalanceDelta>,
    tds_postings: Vec<TdsPosting>,
    transactions: Vec<(Category, EarningTransaction)>,
    audits: Vec<(Category, AuditRecord)>,
    ledger_intents: Vec<LedgerIntent>,
    redemptions: Vec<Redemption>,
}

impl<'a> UnitOfWork<'a> {
    /// Open an empty unit of work over the books
    pub fn new(books: &'a Books) -> Self {
        UnitOfWork {
            books,
            claim: None,
            deltas: Vec::new(),
            tds_postings: Vec::new(),
            transactions: Vec::new(),
            audits: Vec::new(),
            ledger_intents: Vec::new(),
            redemptions: Vec::new(),
        }
    }

    /// Attach a held QR claim, finalized only if the unit commits
    pub fn attach_claim(
        &mut self,
        claim: ClaimedCode<'a>,
        claimant: ParticipantId,
        location: Option<Geolocation>,
    ) {
        self.claim = Some(PendingClaim {
            claim,
            claimant,
            location,
        });
    }

    pub(crate) fn stage_balance_delta(&mut self, delta: BalanceDelta) {
        self.deltas.push(delta);
    }

    pub(crate) fn stage_tds_posting(&mut self, posting: TdsPosting) {
        self.tds_postings.push(posting);
    }

    pub(crate) fn stage_transaction(&mut self, category: Category, row: EarningTransaction) {
        self.transactions.push((category, row));
    }

    pub(crate) fn stage_audit(&mut self, category: Category, row: AuditRecord) {
        self.audits.push((category, row));
    }

    pub(crate) fn stage_ledger(&mut self, intent: LedgerIntent) {
        self.ledger_intents.push(intent);
    }

    pub(crate) fn stage_redemption(&mut self, row: Redemption) {
        self.redemptions.push(row);
    }

    /// Commit every staged write, or nothing
    ///
    /// # Errors
    ///
    /// Returns `InsufficientBalance` when a staged debit exceeds the live
    /// balance, `UnknownParticipant` when a balance row has vanished, or an
    /// overflow error; in every case no staged write has become visible.
    pub fn commit(self) -> Result<CommitOutcome, RewardsError> {
        let UnitOfWork {
            books,
            claim,
            deltas,
            tds_postings,
            transactions,
            audits,
            ledger_intents,
            redemptions,
        } = self;

        let changes = Self::apply_balances(books, &deltas)?;

        // Withholding failures are deliberately swallowed so tax
        // bookkeeping can never block an earned credit.
        for posting in tds_postings {
            let mut record = books.tds_entry(posting.participant, posting.financial_year);
            if let Err(error) =
                record.absorb(posting.amount, posting.settlement_threshold, posting.at)
            {
                warn!(
                    participant = posting.participant,
                    year = %posting.financial_year,
                    %error,
                    "withholding posting skipped"
                );
            }
        }

        for (category, row) in transactions {
            books.append_transaction(category, row);
        }
        for (category, row) in audits {
            books.append_audit(category, row);
        }

        // Ledger rows replay the balance movement: each intent consumes a
        // slice of its participant's committed change in stage order.
        let mut running: BTreeMap<(ParticipantId, Category), i64> = changes
            .iter()
            .map(|(key, change)| (*key, change.opening))
            .collect();
        for intent in ledger_intents {
            let key = (intent.participant, intent.category);
            let opening = running.get(&key).copied().unwrap_or_default();
            let closing = match intent.direction {
                EntryDirection::Credit => opening + intent.amount,
                EntryDirection::Debit => opening - intent.amount,
            };
            running.insert(key, closing);
            books.append_ledger(
                intent.category,
                LedgerEntry {
                    participant: intent.participant,
                    earning_type: intent.earning_type,
                    redemption_channel: intent.redemption_channel,
                    amount: intent.amount,
                    direction: intent.direction,
                    remark: intent.remark,
                    opening_balance: opening,
                    closing_balance: closing,
                    recorded_at: intent.at,
                },
            );
        }

        for row in redemptions {
            books.append_redemption(row);
        }

        if let Some(pending) = claim {
            pending.claim.commit(pending.claimant, pending.location);
        }

        Ok(CommitOutcome { changes })
    }

    /// Lock, validate, and apply all balance deltas atomically
    fn apply_balances(
        books: &Books,
        deltas: &[BalanceDelta],
    ) -> Result<BTreeMap<(ParticipantId, Category), BalanceChange>, RewardsError> {
        // Merge to one movement per participant so each cell is locked once.
        let mut merged: BTreeMap<(ParticipantId, Category), i64> = BTreeMap::new();
        for delta in deltas {
            let slot = merged
                .entry((delta.participant, delta.category))
                .or_default();
            *slot = slot.checked_add(delta.amount).ok_or_else(|| {
                RewardsError::arithmetic_overflow("balance staging", delta.participant)
            })?;
        }

        let mut cells = Vec::with_capacity(merged.len());
        for (&(participant, category), &amount) in &merged {
            let central = books
                .central_cell(participant)
                .ok_or_else(|| RewardsError::unknown_participant(participant))?;
            let profile = books
                .profile_cell(category, participant)
                .ok_or_else(|| RewardsError::unknown_participant(participant))?;
            cells.push((participant, category, amount, central, profile));
        }

        // Lock phase: ascending participant order (BTreeMap iteration),
        // central before profile. Every unit of work locks this way, so two
        // units touching the same participants cannot deadlock.
        type Guards<'g> = (
            ParticipantId,
            Category,
            i64,
            MutexGuard<'g, CentralAccount>,
            MutexGuard<'g, Profile>,
        );
        let mut guards: Vec<Guards<'_>> = Vec::with_capacity(cells.len());
        for (participant, category, amount, central, profile) in &cells {
            guards.push((
                *participant,
                *category,
                *amount,
                lock_cell(central),
                lock_cell(profile),
            ));
        }

        // Validate phase: compute every new value before writing any.
        let mut staged: Vec<StagedBalances> = Vec::with_capacity(guards.len());
        for (participant, _category, amount, central, profile) in &guards {
            let (participant, amount) = (*participant, *amount);
            let operation = if amount < 0 { "redemption" } else { "credit" };

            let central_balance = central
                .balance
                .checked_add(amount)
                .ok_or_else(|| RewardsError::arithmetic_overflow(operation, participant))?;
            if amount < 0 && central_balance < 0 {
                return Err(RewardsError::insufficient_balance(
                    participant,
                    central.balance,
                    -amount,
                ));
            }
            let profile_balance = profile
                .balance
                .checked_add(amount)
                .ok_or_else(|| RewardsError::arithmetic_overflow(operation, participant))?;

            let earned = amount.max(0);
            let central_earned = central
                .total_earnings
                .checked_add(earned)
                .ok_or_else(|| RewardsError::arithmetic_overflow("lifetime earnings", participant))?;
            let profile_earned = profile
                .total_earnings
                .checked_add(earned)
                .ok_or_else(|| RewardsError::arithmetic_overflow("lifetime earnings", participant))?;

            staged.push(StagedBalances {
                central_balance,
                profile_balance,
                central_earned,
                profile_earned,
            });
        }

        // Write phase: infallible.
        let mut changes = BTreeMap::new();
        for ((participant, category, _amount, central, profile), new) in
            guards.iter_mut().zip(staged)
        {
            let opening = profile.balance;
            central.balance = new.central_balance;
            central.total_earnings = new.central_earned;
            profile.balance = new.profile_balance;
            profile.total_earnings = new.profile_earned;
            changes.insert(
                (*participant, *category),
                BalanceChange {
                    opening,
                    closing: new.profile_balance,
                },
            );
        }

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, TdsStatus};

    fn books_with_participant(id: ParticipantId, category: Category) -> Books {
        let books = Books::new();
        books.register_participant(id, category, None).unwrap();
        books
    }

    fn credit_delta(participant: ParticipantId, category: Category, amount: i64) -> BalanceDelta {
        BalanceDelta {
            participant,
            category,
            amount,
        }
    }

    #[test]
    fn test_commit_applies_balances_to_both_rows() {
        let books = books_with_participant(1, Category::Retailer);
        let mut uow = UnitOfWork::new(&books);
        uow.stage_balance_delta(credit_delta(1, Category::Retailer, 95));

        let outcome = uow.commit().unwrap();
        let change = outcome.change_for(1, Category::Retailer).unwrap();
        assert_eq!(change.opening, 0);
        assert_eq!(change.closing, 95);

        assert_eq!(books.central_snapshot(1).unwrap().balance, 95);
        assert_eq!(books.central_snapshot(1).unwrap().total_earnings, 95);
        assert_eq!(
            books.profile_snapshot(Category::Retailer, 1).unwrap().balance,
            95
        );
    }

    #[test]
    fn test_debit_does_not_grow_lifetime_earnings() {
        let books = books_with_participant(1, Category::Retailer);
        let mut seed = UnitOfWork::new(&books);
        seed.stage_balance_delta(credit_delta(1, Category::Retailer, 150));
        seed.commit().unwrap();

        let mut uow = UnitOfWork::new(&books);
        uow.stage_balance_delta(credit_delta(1, Category::Retailer, -150));
        uow.commit().unwrap();

        let central = books.central_snapshot(1).unwrap();
        assert_eq!(central.balance, 0);
        assert_eq!(central.total_earnings, 150);
    }

    #[test]
    fn test_insufficient_debit_commits_nothing() {
        let books = books_with_participant(1, Category::Retailer);
        let mut seed = UnitOfWork::new(&books);
        seed.stage_balance_delta(credit_delta(1, Category::Retailer, 150));
        seed.commit().unwrap();

        let mut uow = UnitOfWork::new(&books);
        uow.stage_balance_delta(credit_delta(1, Category::Retailer, -200));
        uow.stage_redemption(Redemption {
            participant: 1,
            redemption_id: "RED-TEST".to_string(),
            channel: 1,
            points: 200,
            amount: None,
            status: crate::types::RedemptionStatus::Pending,
            metadata: Metadata::empty(),
            approved_by: None,
            requested_at: Utc::now(),
        });

        let result = uow.commit();
        assert!(matches!(
            result,
            Err(RewardsError::InsufficientBalance {
                balance: 150,
                requested: 200,
                ..
            })
        ));

        // Nothing leaked: balance untouched, no redemption row
        assert_eq!(books.central_snapshot(1).unwrap().balance, 150);
        assert!(books.redemptions().is_empty());
    }

    #[test]
    fn test_ledger_intents_reconcile_by_construction() {
        let books = books_with_participant(1, Category::Electrician);
        let mut uow = UnitOfWork::new(&books);
        uow.stage_balance_delta(credit_delta(1, Category::Electrician, 95));
        uow.stage_ledger(LedgerIntent {
            participant: 1,
            category: Category::Electrician,
            earning_type: Some(1),
            redemption_channel: None,
            amount: 95,
            direction: EntryDirection::Credit,
            remark: "QR Scan".to_string(),
            at: Utc::now(),
        });
        uow.commit().unwrap();

        let ledger = books.ledger(Category::Electrician);
        assert_eq!(ledger.len(), 1);
        assert!(ledger[0].reconciles());
        assert_eq!(ledger[0].opening_balance, 0);
        assert_eq!(ledger[0].closing_balance, 95);
    }

    #[test]
    fn test_two_participants_commit_together() {
        let books = Books::new();
        books
            .register_participant(1, Category::Retailer, None)
            .unwrap();
        books
            .register_participant(9, Category::CounterStaff, None)
            .unwrap();

        let mut uow = UnitOfWork::new(&books);
        uow.stage_balance_delta(credit_delta(1, Category::Retailer, 95));
        uow.stage_balance_delta(credit_delta(9, Category::CounterStaff, 95));
        uow.commit().unwrap();

        assert_eq!(books.central_snapshot(1).unwrap().balance, 95);
        assert_eq!(books.central_snapshot(9).unwrap().balance, 95);
    }

    #[test]
    fn test_tds_posting_applies_with_threshold() {
        let books = books_with_participant(1, Category::Retailer);
        let fy = FinancialYear::starting(2024);
        let mut uow = UnitOfWork::new(&books);
        uow.stage_tds_posting(TdsPosting {
            participant: 1,
            financial_year: fy,
            amount: 5,
            settlement_threshold: 20_000,
            at: Utc::now(),
        });
        uow.commit().unwrap();

        let record = books.tds_snapshot(1, fy).unwrap();
        assert_eq!(record.kitty, 5);
        assert_eq!(record.status, TdsStatus::Active);
    }

    #[test]
    fn test_dropped_unit_of_work_leaves_no_trace() {
        let books = books_with_participant(1, Category::Retailer);
        {
            let mut uow = UnitOfWork::new(&books);
            uow.stage_balance_delta(credit_delta(1, Category::Retailer, 50));
            uow.stage_transaction(
                Category::Retailer,
                EarningTransaction {
                    participant: 1,
                    earning_type: 1,
                    points: 50,
                    sku: None,
                    qr_code: None,
                    location: None,
                    metadata: Metadata::empty(),
                    scheme_id: None,
                    recorded_at: Utc::now(),
                },
            );
            // dropped without commit
        }

        assert_eq!(books.central_snapshot(1).unwrap().balance, 0);
        assert!(books.transactions(Category::Retailer).is_empty());
    }

    #[test]
    fn test_concurrent_commits_merge_additively() {
        use std::sync::Arc;
        use std::thread;

        let books = Arc::new(books_with_participant(1, Category::Retailer));
        let mut handles = vec![];
        for _ in 0..50 {
            let books = Arc::clone(&books);
            handles.push(thread::spawn(move || {
                let mut uow = UnitOfWork::new(&books);
                uow.stage_balance_delta(BalanceDelta {
                    participant: 1,
                    category: Category::Retailer,
                    amount: 10,
                });
                uow.commit().unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(books.central_snapshot(1).unwrap().balance, 500);
        assert_eq!(
            books.profile_snapshot(Category::Retailer, 1).unwrap().balance,
            500
        );
    }
}
