//! Post-credit constraint pipeline
//!
//! An ordered list of business rules run after the primary credit has been
//! staged, sharing one mutable context and the same unit of work, so
//! everything a rule stages commits (or vanishes) together with the primary
//! scan. Rule failures are soft by default: logged, skipped, and the scan
//! proceeds. A rule that signals a hard failure aborts the whole unit.

use crate::core::poster::{self, earning_types, CreditContext};
use crate::core::withholding::WithholdingEngine;
use crate::store::{Books, ConfigStore, UnitOfWork};
use crate::types::{Category, Metadata, ParticipantId, QrCode, RewardsError};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// Shared mutable context handed to each rule in order
#[derive(Debug)]
pub struct RuleContext<'a> {
    /// The scanning participant
    pub participant: ParticipantId,

    /// The scanner's category
    pub category: Category,

    /// The claimed code, as read under the claim lock
    pub qr: &'a QrCode,

    /// Points before withholding
    pub gross_points: i64,

    /// Points after withholding; rules may adjust this
    pub net_points: i64,

    /// Whether this participant initiated the scan (as opposed to being
    /// credited derivatively)
    pub primary_scan: bool,

    pub correlation_id: Uuid,
    pub at: DateTime<Utc>,
}

/// How a rule failed
#[derive(Debug)]
pub enum RuleError {
    /// Logged and skipped; the scan continues
    Soft(RewardsError),

    /// Aborts the entire unit of work
    Hard(RewardsError),
}

/// A post-credit business rule
///
/// Rules are a closed set of variants executed in registration order; each
/// declares the categories it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRule {
    /// Credit a retailer's linked counter-staff account the same net
    /// points under the indirect earning type
    LinkedStaffBonus,
}

impl ScanRule {
    /// Rule name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ScanRule::LinkedStaffBonus => "linked-staff-bonus",
        }
    }

    /// Whether the rule runs for scans by this category
    pub fn applies_to(&self, category: Category) -> bool {
        match self {
            ScanRule::LinkedStaffBonus => category == Category::Retailer,
        }
    }

    fn execute(
        &self,
        books: &Books,
        config: &ConfigStore,
        withholding: &WithholdingEngine,
        uow: &mut UnitOfWork<'_>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), RuleError> {
        match self {
            ScanRule::LinkedStaffBonus => {
                Self::linked_staff_bonus(books, config, withholding, uow, ctx)
            }
        }
    }

    fn linked_staff_bonus(
        books: &Books,
        config: &ConfigStore,
        withholding: &WithholdingEngine,
        uow: &mut UnitOfWork<'_>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), RuleError> {
        if !ctx.primary_scan {
            return Ok(());
        }
        let Some(staff) = books.linked_staff_of(ctx.participant) else {
            return Ok(());
        };

        let metadata = Metadata::new(json!({
            "source": "Retailer Scan Bonus",
            "triggeredBy": ctx.participant,
            "originalQrScan": true,
        }))
        .map_err(RuleError::Soft)?;

        poster::stage_credit(
            uow,
            books,
            config,
            withholding,
            staff,
            Category::CounterStaff,
            ctx.net_points,
            CreditContext {
                sku: Some(&ctx.qr.sku),
                qr_code: Some(&ctx.qr.code),
                location: None,
                metadata,
                remark: Some("Bonus from linked retailer scan".to_string()),
                earning_type: earning_types::QR_SCAN_INDIRECT,
                scheme_id: None,
            },
            ctx.correlation_id,
            ctx.at,
        )
        .map_err(RuleError::Soft)?;

        Ok(())
    }
}

/// The ordered rule list for a deployment
#[derive(Debug, Clone, Default)]
pub struct ConstraintPipeline {
    rules: Vec<ScanRule>,
}

impl ConstraintPipeline {
    /// A pipeline with no rules
    pub fn empty() -> Self {
        ConstraintPipeline { rules: Vec::new() }
    }

    /// The standard deployment: linked-staff bonus only
    pub fn standard() -> Self {
        ConstraintPipeline {
            rules: vec![ScanRule::LinkedStaffBonus],
        }
    }

    /// Append a rule; execution order is registration order
    pub fn push(&mut self, rule: ScanRule) {
        self.rules.push(rule);
    }

    /// Run every applicable rule against the scan context
    ///
    /// Soft failures are logged and skipped; a hard failure propagates and
    /// the caller abandons the unit of work.
    pub(crate) fn run(
        &self,
        books: &Books,
        config: &ConfigStore,
        withholding: &WithholdingEngine,
        uow: &mut UnitOfWork<'_>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), RewardsError> {
        for rule in &self.rules {
            if !rule.applies_to(ctx.category) {
                continue;
            }
            match rule.execute(books, config, withholding, uow, ctx) {
                Ok(()) => {}
                Err(RuleError::Soft(error)) => {
                    warn!(
                        rule = rule.name(),
                        participant = ctx.participant,
                        %error,
                        "constraint rule failed; continuing"
                    );
                }
                Err(RuleError::Hard(error)) => return Err(error),
            }
        }
        Ok(())
    }
}
