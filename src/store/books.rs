//! Per-category books and central accounts
//!
//! Each participant category owns a physical set of books: transactions,
//! audit log, ledger, and profile rows. Rather than dispatching on a
//! category string at every call, the books are assembled once at startup
//! into a fixed array indexed by [`Category::index`].
//!
//! Balance rows live behind per-participant mutexes handed out as
//! `Arc<Mutex<_>>` cells, so a unit of work can lock several participants'
//! rows in a deterministic order without holding any map-wide lock.

use crate::types::{
    AuditRecord, Category, CentralAccount, EarningTransaction, FinancialYear, LedgerEntry,
    ParticipantId, Profile, Redemption, RewardsError, TdsRecord,
};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Lock a balance cell, recovering from poisoning
///
/// Balance mutations never panic mid-write, so a poisoned cell still holds
/// a consistent row.
pub(crate) fn lock_cell<T>(cell: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One category's physical books
#[derive(Debug, Default)]
pub struct CategoryBooks {
    transactions: Mutex<Vec<EarningTransaction>>,
    audit_log: Mutex<Vec<AuditRecord>>,
    ledger: Mutex<Vec<LedgerEntry>>,
    profiles: DashMap<ParticipantId, Arc<Mutex<Profile>>>,
}

/// All engine state: per-category books, central accounts, withholding
/// records, and redemptions
#[derive(Debug, Default)]
pub struct Books {
    by_category: [CategoryBooks; 3],
    central: DashMap<ParticipantId, Arc<Mutex<CentralAccount>>>,
    tds_records: DashMap<(ParticipantId, FinancialYear), TdsRecord>,
    redemptions: Mutex<Vec<Redemption>>,
}

impl Books {
    /// Create empty books
    pub fn new() -> Self {
        Books::default()
    }

    /// The books for one category
    pub fn category(&self, category: Category) -> &CategoryBooks {
        &self.by_category[category.index()]
    }

    // ---- registration ----------------------------------------------------

    /// Register a participant under a category, creating both balance rows
    ///
    /// `linked_staff` links a retailer profile to a counter-staff account
    /// for the derivative bonus rule.
    pub fn register_participant(
        &self,
        participant: ParticipantId,
        category: Category,
        linked_staff: Option<ParticipantId>,
    ) -> Result<(), RewardsError> {
        if self.central.contains_key(&participant) {
            return Err(RewardsError::invalid_input(format!(
                "participant {} is already registered",
                participant
            )));
        }

        let mut profile = Profile::new(participant);
        profile.linked_staff = linked_staff;

        self.central.insert(
            participant,
            Arc::new(Mutex::new(CentralAccount::new(participant, category))),
        );
        self.category(category)
            .profiles
            .insert(participant, Arc::new(Mutex::new(profile)));
        Ok(())
    }

    /// The category a participant registered under
    pub fn category_of(&self, participant: ParticipantId) -> Result<Category, RewardsError> {
        let cell = self
            .central
            .get(&participant)
            .ok_or_else(|| RewardsError::unknown_participant(participant))?;
        let account = lock_cell(&cell);
        Ok(account.category)
    }

    /// The linked counter-staff account of a retailer, when one is set
    pub fn linked_staff_of(&self, participant: ParticipantId) -> Option<ParticipantId> {
        let books = self.category(Category::Retailer);
        let cell = books.profiles.get(&participant)?;
        let profile = lock_cell(&cell);
        profile.linked_staff
    }

    // ---- balance cells ---------------------------------------------------

    pub(crate) fn central_cell(
        &self,
        participant: ParticipantId,
    ) -> Option<Arc<Mutex<CentralAccount>>> {
        self.central.get(&participant).map(|cell| Arc::clone(&cell))
    }

    pub(crate) fn profile_cell(
        &self,
        category: Category,
        participant: ParticipantId,
    ) -> Option<Arc<Mutex<Profile>>> {
        self.category(category)
            .profiles
            .get(&participant)
            .map(|cell| Arc::clone(&cell))
    }

    // ---- snapshots -------------------------------------------------------

    /// Current central account state
    pub fn central_snapshot(&self, participant: ParticipantId) -> Option<CentralAccount> {
        self.central
            .get(&participant)
            .map(|cell| lock_cell(&cell).clone())
    }

    /// Current category profile state
    pub fn profile_snapshot(
        &self,
        category: Category,
        participant: ParticipantId,
    ) -> Option<Profile> {
        self.category(category)
            .profiles
            .get(&participant)
            .map(|cell| lock_cell(&cell).clone())
    }

    /// All central accounts, sorted by participant id for stable reports
    pub fn balances_report(&self) -> Vec<CentralAccount> {
        let mut accounts: Vec<CentralAccount> = self
            .central
            .iter()
            .map(|entry| lock_cell(entry.value()).clone())
            .collect();
        accounts.sort_by_key(|account| account.participant);
        accounts
    }

    /// Copy of a category's transaction book
    pub fn transactions(&self, category: Category) -> Vec<EarningTransaction> {
        lock_cell(&self.category(category).transactions).clone()
    }

    /// Copy of a category's audit log
    pub fn audit_log(&self, category: Category) -> Vec<AuditRecord> {
        lock_cell(&self.category(category).audit_log).clone()
    }

    /// Copy of a category's ledger
    pub fn ledger(&self, category: Category) -> Vec<LedgerEntry> {
        lock_cell(&self.category(category).ledger).clone()
    }

    /// Copy of the redemption book
    pub fn redemptions(&self) -> Vec<Redemption> {
        lock_cell(&self.redemptions).clone()
    }

    // ---- appends ---------------------------------------------------------

    pub(crate) fn append_transaction(&self, category: Category, row: EarningTransaction) {
        lock_cell(&self.category(category).transactions).push(row);
    }

    pub(crate) fn append_audit(&self, category: Category, row: AuditRecord) {
        lock_cell(&self.category(category).audit_log).push(row);
    }

    pub(crate) fn append_ledger(&self, category: Category, row: LedgerEntry) {
        lock_cell(&self.category(category).ledger).push(row);
    }

    pub(crate) fn append_redemption(&self, row: Redemption) {
        lock_cell(&self.redemptions).push(row);
    }

    // ---- withholding records --------------------------------------------

    /// Entry guard over the (participant, year) withholding record,
    /// creating a fresh active record when absent
    pub(crate) fn tds_entry(
        &self,
        participant: ParticipantId,
        financial_year: FinancialYear,
    ) -> RefMut<'_, (ParticipantId, FinancialYear), TdsRecord> {
        self.tds_records
            .entry((participant, financial_year))
            .or_insert_with(|| TdsRecord::open(participant, financial_year))
    }

    /// Guard over an existing record only
    pub(crate) fn tds_entry_existing(
        &self,
        participant: ParticipantId,
        financial_year: FinancialYear,
    ) -> Option<RefMut<'_, (ParticipantId, FinancialYear), TdsRecord>> {
        self.tds_records.get_mut(&(participant, financial_year))
    }

    /// Insert a record for (participant, year) unless one already exists
    pub(crate) fn open_tds_if_absent(&self, record: TdsRecord) {
        self.tds_records
            .entry((record.participant, record.financial_year))
            .or_insert(record);
    }

    /// Snapshot of one withholding record
    pub fn tds_snapshot(
        &self,
        participant: ParticipantId,
        financial_year: FinancialYear,
    ) -> Option<TdsRecord> {
        self.tds_records
            .get(&(participant, financial_year))
            .map(|entry| entry.clone())
    }

    /// All withholding records for a participant, newest year first
    pub fn tds_records_for(&self, participant: ParticipantId) -> Vec<TdsRecord> {
        let mut records: Vec<TdsRecord> = self
            .tds_records
            .iter()
            .filter(|entry| entry.key().0 == participant)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| std::cmp::Reverse(record.financial_year));
        records
    }

    /// Participants holding an active record for the given year
    pub fn active_tds_participants(&self, financial_year: FinancialYear) -> Vec<ParticipantId> {
        let mut participants: Vec<ParticipantId> = self
            .tds_records
            .iter()
            .filter(|entry| {
                entry.key().1 == financial_year
                    && entry.value().status == crate::types::TdsStatus::Active
            })
            .map(|entry| entry.key().0)
            .collect();
        participants.sort_unstable();
        participants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TdsStatus;

    #[test]
    fn test_register_creates_both_balance_rows() {
        let books = Books::new();
        books
            .register_participant(1, Category::Retailer, Some(9))
            .unwrap();

        let central = books.central_snapshot(1).unwrap();
        assert_eq!(central.category, Category::Retailer);
        assert_eq!(central.balance, 0);

        let profile = books.profile_snapshot(Category::Retailer, 1).unwrap();
        assert_eq!(profile.balance, 0);
        assert_eq!(profile.linked_staff, Some(9));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let books = Books::new();
        books
            .register_participant(1, Category::Retailer, None)
            .unwrap();
        assert!(books
            .register_participant(1, Category::Electrician, None)
            .is_err());
    }

    #[test]
    fn test_category_of_unknown_participant_fails() {
        let books = Books::new();
        assert!(books.category_of(42).is_err());
    }

    #[test]
    fn test_balances_report_is_sorted() {
        let books = Books::new();
        for id in [5u64, 1, 3] {
            books
                .register_participant(id, Category::Electrician, None)
                .unwrap();
        }
        let report = books.balances_report();
        let ids: Vec<ParticipantId> = report.iter().map(|a| a.participant).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn test_tds_entry_creates_lazily() {
        let books = Books::new();
        let fy = FinancialYear::starting(2024);

        assert!(books.tds_snapshot(1, fy).is_none());
        {
            let record = books.tds_entry(1, fy);
            assert_eq!(record.status, TdsStatus::Active);
        }
        assert!(books.tds_snapshot(1, fy).is_some());
    }

    #[test]
    fn test_active_tds_participants_filters_by_year_and_status() {
        let books = Books::new();
        let fy24 = FinancialYear::starting(2024);
        let fy25 = FinancialYear::starting(2025);

        books.tds_entry(1, fy24);
        books.tds_entry(2, fy24);
        books.tds_entry(3, fy25);
        {
            let mut settled = books.tds_entry(2, fy24);
            settled.status = TdsStatus::Settled;
        }

        assert_eq!(books.active_tds_participants(fy24), vec![1]);
        assert_eq!(books.active_tds_participants(fy25), vec![3]);
    }

    #[test]
    fn test_linked_staff_lookup() {
        let books = Books::new();
        books
            .register_participant(1, Category::Retailer, Some(9))
            .unwrap();
        books
            .register_participant(2, Category::Retailer, None)
            .unwrap();

        assert_eq!(books.linked_staff_of(1), Some(9));
        assert_eq!(books.linked_staff_of(2), None);
        assert_eq!(books.linked_staff_of(42), None);
    }
}
