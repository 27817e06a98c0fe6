//! The rewards engine: one explicit resource bundle, no global state
//!
//! `RewardsEngine` owns the stores, the withholding policy, and the
//! constraint pipeline. It is constructed once at process start, shared by
//! reference, and shut down explicitly. Each exposed operation runs as one
//! unit of work under a fresh correlation id and a tracing span; business
//! failures leave a best-effort audit record behind after the unit has been
//! abandoned.

use crate::core::access;
use crate::core::constraints::{ConstraintPipeline, RuleContext};
use crate::core::poster::{self, earning_types, CreditContext};
use crate::core::redemption::{self, RedemptionReceipt, RedemptionRequest};
use crate::core::resolver;
use crate::core::withholding::{FyResetSummary, WithholdingEngine, WithholdingPolicy};
use crate::store::{Books, ConfigStore, QrCodeStore, UnitOfWork};
use crate::types::{
    AccessRule, AuditRecord, Category, CentralAccount, EarningTransaction, EarningTypeId,
    EngineError, ErrorKind, FinancialYear, Geolocation, LedgerEntry, Metadata, ParticipantId,
    PointConfig, Profile, QrCode, Redemption, RewardsError, TdsRecord,
};
use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// A QR scan request from the boundary layer
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub participant: ParticipantId,
    pub qr_code: String,
    pub location: Option<Geolocation>,
    pub metadata: Metadata,
}

/// Result of a successful scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReceipt {
    /// Net points credited to the scanner
    pub points: i64,

    /// Amount withheld from the gross figure
    pub withheld: i64,

    pub message: String,
    pub correlation_id: Uuid,
}

/// A direct credit request (primary path and derivative rules both use
/// this shape)
#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub participant: ParticipantId,
    pub category: Category,
    pub gross_points: i64,

    /// Must name a registered earning type
    pub earning_type: String,

    pub sku: Option<String>,
    pub metadata: Metadata,
    pub scheme_id: Option<u64>,
}

/// Result of a successful direct credit
#[derive(Debug, Clone, PartialEq)]
pub struct CreditReceipt {
    pub net_points: i64,
    pub withheld: i64,
    pub closing_balance: i64,
    pub correlation_id: Uuid,
}

/// Per-participant withholding rollup across financial years
#[derive(Debug, Clone, PartialEq)]
pub struct TdsSummary {
    pub participant: ParticipantId,
    pub current_year: FinancialYear,

    /// Kitty of the current year's record, zero when none exists
    pub current_kitty: i64,

    /// Settled total across all years
    pub total_deducted: i64,

    /// Reverted total across all years
    pub total_reverted: i64,

    /// All records, newest year first
    pub records: Vec<TdsRecord>,
}

/// The earning & withholding ledger engine
pub struct RewardsEngine {
    books: Books,
    qr_codes: QrCodeStore,
    config: ConfigStore,
    withholding: WithholdingEngine,
    pipeline: ConstraintPipeline,
}

impl RewardsEngine {
    /// Assemble an engine with the standard constraint pipeline
    ///
    /// Registers the built-in earning types so the scan path is usable
    /// immediately.
    pub fn new(policy: WithholdingPolicy) -> Self {
        let config = ConfigStore::new();
        config.register_earning_type(earning_types::QR_SCAN);
        config.register_earning_type(earning_types::QR_SCAN_INDIRECT);

        RewardsEngine {
            books: Books::new(),
            qr_codes: QrCodeStore::new(),
            config,
            withholding: WithholdingEngine::new(policy),
            pipeline: ConstraintPipeline::standard(),
        }
    }

    /// Replace the constraint pipeline
    pub fn with_pipeline(mut self, pipeline: ConstraintPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    // ---- seeding / registration -----------------------------------------

    /// Register a participant under a category
    pub fn register_participant(
        &self,
        participant: ParticipantId,
        category: Category,
        linked_staff: Option<ParticipantId>,
    ) -> Result<(), RewardsError> {
        self.books
            .register_participant(participant, category, linked_staff)
    }

    /// Add a provisioned QR code
    pub fn provision_qr(&self, qr: QrCode) -> Result<(), RewardsError> {
        self.qr_codes.provision(qr)
    }

    /// Add a point configuration
    pub fn add_point_config(&self, config: PointConfig) -> Result<(), RewardsError> {
        self.config.add_point_config(config)
    }

    /// Add an access rule
    pub fn add_access_rule(&self, rule: AccessRule) {
        self.config.add_access_rule(rule)
    }

    /// Register an earning type by name
    pub fn register_earning_type(&self, name: &str) -> EarningTypeId {
        self.config.register_earning_type(name)
    }

    // ---- reads -----------------------------------------------------------

    /// Current state of a QR code
    pub fn qr(&self, code: &str) -> Option<QrCode> {
        self.qr_codes.get(code)
    }

    /// Central balance of a participant
    pub fn balance_of(&self, participant: ParticipantId) -> Option<i64> {
        self.books
            .central_snapshot(participant)
            .map(|account| account.balance)
    }

    /// Central account snapshot
    pub fn central_account(&self, participant: ParticipantId) -> Option<CentralAccount> {
        self.books.central_snapshot(participant)
    }

    /// Category profile snapshot
    pub fn profile(&self, category: Category, participant: ParticipantId) -> Option<Profile> {
        self.books.profile_snapshot(category, participant)
    }

    /// All central accounts, sorted by participant id
    pub fn balances_report(&self) -> Vec<CentralAccount> {
        self.books.balances_report()
    }

    /// Copy of a category's transaction book
    pub fn transactions(&self, category: Category) -> Vec<EarningTransaction> {
        self.books.transactions(category)
    }

    /// Copy of a category's audit log
    pub fn audit_log(&self, category: Category) -> Vec<AuditRecord> {
        self.books.audit_log(category)
    }

    /// Copy of a category's ledger
    pub fn ledger(&self, category: Category) -> Vec<LedgerEntry> {
        self.books.ledger(category)
    }

    /// Copy of the redemption book
    pub fn redemptions(&self) -> Vec<Redemption> {
        self.books.redemptions()
    }

    /// One withholding record
    pub fn tds_record(
        &self,
        participant: ParticipantId,
        financial_year: FinancialYear,
    ) -> Option<TdsRecord> {
        self.books.tds_snapshot(participant, financial_year)
    }

    /// Withholding rollup for a participant as of a given instant
    pub fn tds_summary(&self, participant: ParticipantId, as_of: DateTime<Utc>) -> TdsSummary {
        let records = self.books.tds_records_for(participant);
        let current_year = FinancialYear::from_date(as_of.date_naive());
        let current_kitty = records
            .iter()
            .find(|record| record.financial_year == current_year)
            .map(|record| record.kitty)
            .unwrap_or(0);
        TdsSummary {
            participant,
            current_year,
            current_kitty,
            total_deducted: records.iter().map(|record| record.deducted).sum(),
            total_reverted: records.iter().map(|record| record.reversed_amount).sum(),
            records,
        }
    }

    // ---- operations ------------------------------------------------------

    /// Claim a QR code and credit the scanning participant
    ///
    /// The whole flow (claim, rate resolution, authorization, withholding,
    /// posting, constraint rules) is one unit of work; any failure rolls
    /// back everything including the claim.
    pub fn scan_qr(&self, request: ScanRequest) -> Result<ScanReceipt, EngineError> {
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "scan_qr",
            correlation = %correlation_id,
            participant = request.participant,
            qr = %request.qr_code
        );
        let _entered = span.enter();
        let now = Utc::now();

        match self.scan_inner(&request, correlation_id, now) {
            Ok(receipt) => {
                info!(points = receipt.points, withheld = receipt.withheld, "scan credited");
                Ok(receipt)
            }
            Err(error) => {
                self.report_failure(
                    request.participant,
                    Some(&request.qr_code),
                    &request.metadata,
                    &error,
                    correlation_id,
                    now,
                );
                Err(EngineError::new(error, correlation_id))
            }
        }
    }

    fn scan_inner(
        &self,
        request: &ScanRequest,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScanReceipt, RewardsError> {
        let category = self.books.category_of(request.participant)?;

        let mut uow = UnitOfWork::new(&self.books);

        // Row lock: held by the unit of work until commit or abandonment
        let claim = self.qr_codes.begin_claim(&request.qr_code)?;
        let qr = claim.qr().clone();
        uow.attach_claim(claim, request.participant, request.location);

        let rate = resolver::resolve_rate(&self.config, &qr.sku, category, now)?;
        access::authorize(&self.config, request.participant, &qr.sku, now)?;
        let gross = resolver::points_for(rate)?;

        let staged = poster::stage_credit(
            &mut uow,
            &self.books,
            &self.config,
            &self.withholding,
            request.participant,
            category,
            gross,
            CreditContext {
                sku: Some(&qr.sku),
                qr_code: Some(&qr.code),
                location: request.location,
                metadata: request.metadata.clone(),
                remark: None,
                earning_type: earning_types::QR_SCAN,
                scheme_id: None,
            },
            correlation_id,
            now,
        )?;

        let mut ctx = RuleContext {
            participant: request.participant,
            category,
            qr: &qr,
            gross_points: staged.gross,
            net_points: staged.net_points,
            primary_scan: true,
            correlation_id,
            at: now,
        };
        self.pipeline.run(
            &self.books,
            &self.config,
            &self.withholding,
            &mut uow,
            &mut ctx,
        )?;

        uow.commit()?;

        Ok(ScanReceipt {
            points: staged.net_points,
            withheld: staged.withheld,
            message: "Scan successful".to_string(),
            correlation_id,
        })
    }

    /// Credit points outside the scan path (referrals, adjustments, ...)
    pub fn credit_points(&self, request: CreditRequest) -> Result<CreditReceipt, EngineError> {
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "credit_points",
            correlation = %correlation_id,
            participant = request.participant,
            earning_type = %request.earning_type
        );
        let _entered = span.enter();
        let now = Utc::now();

        match self.credit_inner(&request, correlation_id, now) {
            Ok(receipt) => {
                info!(net = receipt.net_points, "points credited");
                Ok(receipt)
            }
            Err(error) => {
                self.report_failure(
                    request.participant,
                    None,
                    &request.metadata,
                    &error,
                    correlation_id,
                    now,
                );
                Err(EngineError::new(error, correlation_id))
            }
        }
    }

    fn credit_inner(
        &self,
        request: &CreditRequest,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CreditReceipt, RewardsError> {
        let mut uow = UnitOfWork::new(&self.books);

        let staged = poster::stage_credit(
            &mut uow,
            &self.books,
            &self.config,
            &self.withholding,
            request.participant,
            request.category,
            request.gross_points,
            CreditContext {
                sku: request.sku.as_deref(),
                qr_code: None,
                location: None,
                metadata: request.metadata.clone(),
                remark: None,
                earning_type: &request.earning_type,
                scheme_id: request.scheme_id,
            },
            correlation_id,
            now,
        )?;

        let outcome = uow.commit()?;
        let closing_balance = outcome
            .change_for(request.participant, request.category)
            .map(|change| change.closing)
            .ok_or_else(|| RewardsError::internal("credit committed without balance change"))?;

        Ok(CreditReceipt {
            net_points: staged.net_points,
            withheld: staged.withheld,
            closing_balance,
            correlation_id,
        })
    }

    /// Debit points into a Pending redemption
    pub fn request_redemption(
        &self,
        request: RedemptionRequest,
    ) -> Result<RedemptionReceipt, EngineError> {
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "request_redemption",
            correlation = %correlation_id,
            participant = request.participant,
            points = request.points
        );
        let _entered = span.enter();
        let now = Utc::now();

        match self.redemption_inner(&request, correlation_id, now) {
            Ok(receipt) => {
                info!(redemption = %receipt.redemption_id, "redemption pending");
                Ok(receipt)
            }
            Err(error) => {
                self.report_failure(
                    request.participant,
                    None,
                    &request.metadata,
                    &error,
                    correlation_id,
                    now,
                );
                Err(EngineError::new(error, correlation_id))
            }
        }
    }

    fn redemption_inner(
        &self,
        request: &RedemptionRequest,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RedemptionReceipt, RewardsError> {
        let category = self.books.category_of(request.participant)?;
        let mut uow = UnitOfWork::new(&self.books);
        let redemption_id = redemption::stage_redemption(&mut uow, &self.books, request, now)?;

        let outcome = uow.commit()?;
        let closing_balance = outcome
            .change_for(request.participant, category)
            .map(|change| change.closing)
            .ok_or_else(|| RewardsError::internal("redemption committed without balance change"))?;

        Ok(RedemptionReceipt {
            redemption_id,
            closing_balance,
            correlation_id,
        })
    }

    /// Close the previous financial year's withholding records and open the
    /// next
    ///
    /// Administrative batch, run at the April 1 boundary. Per-record
    /// failures are counted in the summary, never fatal.
    pub fn reset_financial_year(
        &self,
        previous: FinancialYear,
        next: FinancialYear,
    ) -> FyResetSummary {
        let span = info_span!("reset_financial_year", previous = %previous, next = %next);
        let _entered = span.enter();

        let summary = self
            .withholding
            .reset_financial_year(&self.books, previous, next, Utc::now());
        info!(
            processed = summary.processed,
            settled = summary.settled,
            reverted = summary.reverted,
            errors = summary.errors,
            "financial year reset complete"
        );
        summary
    }

    /// Tear the engine down, logging final totals
    pub fn shutdown(self) {
        info!(
            participants = self.books.balances_report().len(),
            qr_codes = self.qr_codes.len(),
            redemptions = self.books.redemptions().len(),
            "rewards engine shut down"
        );
    }

    /// Log a failed operation and leave a best-effort failure audit row
    ///
    /// The audit write happens outside the abandoned unit of work, mirroring
    /// the separate-transaction failure log of the surrounding system.
    fn report_failure(
        &self,
        participant: ParticipantId,
        qr_code: Option<&str>,
        metadata: &Metadata,
        error: &RewardsError,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) {
        match error.kind() {
            ErrorKind::Internal => {
                error!(correlation = %correlation_id, %error, "operation failed")
            }
            _ => warn!(correlation = %correlation_id, %error, "operation rejected"),
        }

        if let Ok(category) = self.books.category_of(participant) {
            self.books.append_audit(
                category,
                AuditRecord {
                    participant,
                    earning_type: None,
                    points: 0,
                    sku: None,
                    status: error.kind().label().to_string(),
                    qr_code: qr_code.map(String::from),
                    location: None,
                    metadata: metadata.clone(),
                    correlation_id,
                    recorded_at: now,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn qr(code: &str, sku: &str) -> QrCode {
        QrCode::new(
            code,
            "SEC-1",
            sku,
            "B-100",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
    }

    fn engine_without_withholding() -> RewardsEngine {
        let engine = RewardsEngine::new(WithholdingPolicy::new());
        engine
            .register_participant(1, Category::Retailer, None)
            .unwrap();
        engine.provision_qr(qr("QR-1", "SKU-9")).unwrap();
        engine
            .add_point_config(PointConfig::new(
                1,
                "SKU-9",
                Category::Retailer,
                Decimal::new(500, 2),
            ))
            .unwrap();
        engine
    }

    fn scan(engine: &RewardsEngine, participant: ParticipantId, code: &str) -> Result<ScanReceipt, EngineError> {
        engine.scan_qr(ScanRequest {
            participant,
            qr_code: code.to_string(),
            location: None,
            metadata: Metadata::empty(),
        })
    }

    #[test]
    fn test_scan_credits_rate_and_reconciles() {
        let engine = engine_without_withholding();
        let receipt = scan(&engine, 1, "QR-1").unwrap();

        assert_eq!(receipt.points, 5);
        assert_eq!(receipt.withheld, 0);
        assert_eq!(engine.balance_of(1), Some(5));

        let ledger = engine.ledger(Category::Retailer);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].opening_balance, 0);
        assert_eq!(ledger[0].closing_balance, 5);

        let code = engine.qr("QR-1").unwrap();
        assert!(code.claimed);
        assert_eq!(code.claimed_by, Some(1));
    }

    #[test]
    fn test_second_scan_fails_and_mutates_nothing() {
        let engine = engine_without_withholding();
        engine
            .register_participant(2, Category::Retailer, None)
            .unwrap();
        scan(&engine, 1, "QR-1").unwrap();

        let failure = scan(&engine, 2, "QR-1").unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::AlreadyClaimed);

        assert_eq!(engine.balance_of(1), Some(5));
        assert_eq!(engine.balance_of(2), Some(0));
        assert_eq!(engine.ledger(Category::Retailer).len(), 1);
        assert_eq!(engine.transactions(Category::Retailer).len(), 1);
    }

    #[test]
    fn test_failed_scan_leaves_failure_audit_with_correlation() {
        let engine = engine_without_withholding();
        scan(&engine, 1, "QR-1").unwrap();
        let failure = scan(&engine, 1, "QR-1").unwrap_err();

        let audits = engine.audit_log(Category::Retailer);
        let failure_row = audits
            .iter()
            .find(|row| row.status == ErrorKind::AlreadyClaimed.label())
            .expect("failure audit row");
        assert_eq!(failure_row.correlation_id, failure.correlation_id);
        assert_eq!(failure_row.qr_code.as_deref(), Some("QR-1"));
    }

    #[test]
    fn test_unconfigured_product_rolls_back_claim() {
        let engine = engine_without_withholding();
        engine.provision_qr(qr("QR-2", "SKU-UNKNOWN")).unwrap();

        let failure = scan(&engine, 1, "QR-2").unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::NotConfigured);

        // The claim rolled back with everything else
        assert!(!engine.qr("QR-2").unwrap().claimed);
        assert_eq!(engine.balance_of(1), Some(0));
    }

    #[test]
    fn test_forbidden_participant_rolls_back_claim() {
        let engine = engine_without_withholding();
        engine.add_access_rule(AccessRule::specific(1, "SKU-OTHER"));

        let failure = scan(&engine, 1, "QR-1").unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Forbidden);
        assert!(!engine.qr("QR-1").unwrap().claimed);
        assert_eq!(engine.balance_of(1), Some(0));
    }

    #[test]
    fn test_credit_points_requires_registered_earning_type() {
        let engine = engine_without_withholding();
        let failure = engine
            .credit_points(CreditRequest {
                participant: 1,
                category: Category::Retailer,
                gross_points: 50,
                earning_type: "Referral Bonus".to_string(),
                sku: None,
                metadata: Metadata::empty(),
                scheme_id: None,
            })
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::NotConfigured);

        engine.register_earning_type("Referral Bonus");
        let receipt = engine
            .credit_points(CreditRequest {
                participant: 1,
                category: Category::Retailer,
                gross_points: 50,
                earning_type: "Referral Bonus".to_string(),
                sku: None,
                metadata: Metadata::empty(),
                scheme_id: None,
            })
            .unwrap();
        assert_eq!(receipt.net_points, 50);
        assert_eq!(receipt.closing_balance, 50);
    }

    #[test]
    fn test_tds_summary_rolls_up_years() {
        let engine = RewardsEngine::new(
            WithholdingPolicy::new().with_fallback_rate(Decimal::new(500, 2)),
        );
        engine
            .register_participant(1, Category::Electrician, None)
            .unwrap();
        engine
            .credit_points(CreditRequest {
                participant: 1,
                category: Category::Electrician,
                gross_points: 100,
                earning_type: earning_types::QR_SCAN.to_string(),
                sku: None,
                metadata: Metadata::empty(),
                scheme_id: None,
            })
            .unwrap();

        let summary = engine.tds_summary(1, Utc::now());
        assert_eq!(summary.current_kitty, 5);
        assert_eq!(summary.total_deducted, 0);
        assert_eq!(summary.records.len(), 1);
    }
}
