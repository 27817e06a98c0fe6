//! Redemption requests
//!
//! Validates the request, stages the atomic balance debit against both
//! rows, a Pending redemption record, and the reconciling DEBIT ledger row.
//! Sufficiency is enforced under the balance lock at commit, so a request
//! exceeding the live balance fails with no mutation even under concurrent
//! earning. Approval and settlement belong to a later workflow.

use crate::store::unit_of_work::{BalanceDelta, LedgerIntent};
use crate::store::{Books, UnitOfWork};
use crate::types::{
    ChannelId, EntryDirection, Metadata, ParticipantId, Redemption, RedemptionStatus, RewardsError,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A request to redeem points
#[derive(Debug, Clone)]
pub struct RedemptionRequest {
    pub participant: ParticipantId,

    /// Redemption channel (voucher, transfer, catalog, ...)
    pub channel: ChannelId,

    /// Points to debit; must be strictly positive
    pub points: i64,

    /// Monetary amount for cash-equivalent channels
    pub amount: Option<i64>,

    pub metadata: Metadata,
}

/// Receipt of an accepted redemption request
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionReceipt {
    /// Human-readable unique id of the pending record
    pub redemption_id: String,

    /// Balance after the debit
    pub closing_balance: i64,

    pub correlation_id: Uuid,
}

/// Validate a request and stage the debit, the Pending record, and the
/// ledger row
///
/// Returns the generated redemption id; the `InsufficientBalance` check
/// itself happens under the balance lock when the unit commits.
pub(crate) fn stage_redemption(
    uow: &mut UnitOfWork<'_>,
    books: &Books,
    request: &RedemptionRequest,
    at: DateTime<Utc>,
) -> Result<String, RewardsError> {
    if request.points <= 0 {
        return Err(RewardsError::invalid_input(
            "redemption points must be greater than zero",
        ));
    }
    if let Some(amount) = request.amount {
        if amount < 0 {
            return Err(RewardsError::invalid_input(
                "redemption amount must not be negative",
            ));
        }
    }

    let category = books.category_of(request.participant)?;
    let redemption_id = new_redemption_id(at);

    uow.stage_balance_delta(BalanceDelta {
        participant: request.participant,
        category,
        amount: -request.points,
    });

    uow.stage_redemption(Redemption {
        participant: request.participant,
        redemption_id: redemption_id.clone(),
        channel: request.channel,
        points: request.points,
        amount: request.amount,
        status: RedemptionStatus::Pending,
        metadata: request.metadata.clone(),
        approved_by: None,
        requested_at: at,
    });

    uow.stage_ledger(LedgerIntent {
        participant: request.participant,
        category,
        earning_type: None,
        redemption_channel: Some(request.channel),
        amount: request.points,
        direction: EntryDirection::Debit,
        remark: format!("Redemption {}", redemption_id),
        at,
    });

    Ok(redemption_id)
}

/// `RED-<millis>-<suffix>`: sortable by request time, unique by suffix
fn new_redemption_id(at: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(9)
        .collect();
    format!("RED-{}-{}", at.timestamp_millis(), suffix)
}
