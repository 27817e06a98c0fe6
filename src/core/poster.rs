//! Ledger posting for earning credits
//!
//! Stages the full write set of one credit into the caller's unit of work:
//! withholding, the transaction row, its audit mirror, both balance
//! increments, and the reconciling ledger row. All validation happens here,
//! before anything is staged that could commit.
//!
//! Figure conventions, applied identically for every category so downstream
//! reporting stays comparable: the transaction row and the ledger row carry
//! the NET points actually credited; the audit row carries the GROSS
//! figure.

use crate::core::withholding::WithholdingEngine;
use crate::store::unit_of_work::{BalanceDelta, LedgerIntent};
use crate::store::{Books, ConfigStore, UnitOfWork};
use crate::types::{
    AuditRecord, Category, EarningTransaction, EarningTypeId, EntryDirection, Geolocation,
    Metadata, ParticipantId, RewardsError,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Well-known earning type names registered at engine construction
pub mod earning_types {
    /// Primary QR scan credit
    pub const QR_SCAN: &str = "QR Scan";

    /// Derivative credit to a linked counter-staff account
    pub const QR_SCAN_INDIRECT: &str = "QR Scan - Indirect";
}

/// Context for one credit: where the points came from and how to label them
#[derive(Debug, Clone)]
pub struct CreditContext<'a> {
    /// Product sku the earning originated from
    pub sku: Option<&'a str>,

    /// Originating QR code for scan credits
    pub qr_code: Option<&'a str>,

    /// Scan coordinates
    pub location: Option<Geolocation>,

    /// Opaque caller metadata, copied onto the transaction and audit rows
    pub metadata: Metadata,

    /// Ledger remark; defaults to the earning type name
    pub remark: Option<String>,

    /// Earning type name, resolved against the registry
    pub earning_type: &'a str,

    /// Promotional scheme reference
    pub scheme_id: Option<u64>,
}

/// The staged result of a credit, available before commit
#[derive(Debug, Clone, Copy)]
pub struct StagedCredit {
    pub gross: i64,
    pub net_points: i64,
    pub withheld: i64,
    pub earning_type: EarningTypeId,
}

/// Validate and stage a full earning credit into the unit of work
///
/// # Errors
///
/// - `InvalidInput` when `gross` is not strictly positive
/// - `UnknownParticipant` / `CategoryMismatch` when the participant does
///   not match the registry
/// - `UnknownEarningType` when the earning type name is unregistered
///
/// No error path leaves anything staged that was not already staged by the
/// caller.
#[allow(clippy::too_many_arguments)]
pub fn stage_credit(
    uow: &mut UnitOfWork<'_>,
    books: &Books,
    config: &ConfigStore,
    withholding: &WithholdingEngine,
    participant: ParticipantId,
    category: Category,
    gross: i64,
    ctx: CreditContext<'_>,
    correlation_id: Uuid,
    at: DateTime<Utc>,
) -> Result<StagedCredit, RewardsError> {
    if gross <= 0 {
        return Err(RewardsError::invalid_input(
            "points must be greater than zero",
        ));
    }

    let registered = books.category_of(participant)?;
    if registered != category {
        return Err(RewardsError::CategoryMismatch {
            participant,
            registered,
            requested: category,
        });
    }

    let earning_type = config
        .earning_type_id(ctx.earning_type)
        .ok_or_else(|| RewardsError::unknown_earning_type(ctx.earning_type))?;

    // Validation is done; everything below stages into the caller's unit.
    let outcome = withholding.stage(uow, participant, category, gross, at);

    uow.stage_balance_delta(BalanceDelta {
        participant,
        category,
        amount: outcome.net,
    });

    uow.stage_transaction(
        category,
        EarningTransaction {
            participant,
            earning_type,
            points: outcome.net,
            sku: ctx.sku.map(String::from),
            qr_code: ctx.qr_code.map(String::from),
            location: ctx.location,
            metadata: ctx.metadata.clone(),
            scheme_id: ctx.scheme_id,
            recorded_at: at,
        },
    );

    uow.stage_audit(
        category,
        AuditRecord {
            participant,
            earning_type: Some(earning_type),
            points: gross,
            sku: ctx.sku.map(String::from),
            status: AuditRecord::STATUS_SUCCESS.to_string(),
            qr_code: ctx.qr_code.map(String::from),
            location: ctx.location,
            metadata: ctx.metadata,
            correlation_id,
            recorded_at: at,
        },
    );

    uow.stage_ledger(LedgerIntent {
        participant,
        category,
        earning_type: Some(earning_type),
        redemption_channel: None,
        amount: outcome.net,
        direction: EntryDirection::Credit,
        remark: ctx
            .remark
            .unwrap_or_else(|| ctx.earning_type.to_string()),
        at,
    });

    Ok(StagedCredit {
        gross,
        net_points: outcome.net,
        withheld: outcome.withheld,
        earning_type,
    })
}
