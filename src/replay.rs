//! Replay driver: feed recorded operations through an engine
//!
//! The operational counterpart of the HTTP layer: seeds an engine from
//! master data, replays scan/credit/redeem records against it, and reports
//! how many were accepted. Per-record business failures are logged by the
//! engine and counted here; they never abort a replay.
//!
//! Two modes mirror production traffic shapes: `sequential` preserves
//! record order exactly; `concurrent` dispatches fixed-size batches of
//! records as parallel tasks, trading strict cross-batch ordering for
//! request-per-call concurrency.

use crate::core::{
    CreditRequest, RedemptionRequest, RewardsEngine, ScanRequest, WithholdingPolicy,
};
use crate::io::{ReplayOp, SeedData};
use crate::types::{EngineError, Metadata, RewardsError};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

/// Outcome counters of one replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ReplayReport {
    fn tally(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Assemble an engine from seed data
///
/// The withholding policy is built first (rates, threshold), then master
/// data registers in dependency order: participants, earning types, QR
/// codes, point configs, access rules.
pub fn build_engine(seed: &SeedData) -> Result<RewardsEngine, RewardsError> {
    let mut policy = WithholdingPolicy::new();
    for (category, percent) in &seed.rates {
        policy = match category {
            Some(category) => policy.with_category_rate(*category, *percent),
            None => policy.with_fallback_rate(*percent),
        };
    }
    if let Some(threshold) = seed.threshold {
        policy = policy.with_settlement_threshold(threshold);
    }

    let engine = RewardsEngine::new(policy);
    for (participant, category, linked_staff) in &seed.participants {
        engine.register_participant(*participant, *category, *linked_staff)?;
    }
    for name in &seed.earning_types {
        engine.register_earning_type(name);
    }
    for qr in &seed.qr_codes {
        engine.provision_qr(qr.clone())?;
    }
    for config in &seed.point_configs {
        engine.add_point_config(config.clone())?;
    }
    for rule in &seed.access_rules {
        engine.add_access_rule(rule.clone());
    }
    Ok(engine)
}

/// Apply one operation to the engine
fn apply_op(engine: &RewardsEngine, op: ReplayOp) -> Result<(), EngineError> {
    match op {
        ReplayOp::Scan {
            participant,
            qr_code,
        } => engine
            .scan_qr(ScanRequest {
                participant,
                qr_code,
                location: None,
                metadata: Metadata::empty(),
            })
            .map(|_| ()),
        ReplayOp::Credit {
            participant,
            category,
            points,
            earning_type,
        } => engine
            .credit_points(CreditRequest {
                participant,
                category,
                gross_points: points,
                earning_type,
                sku: None,
                metadata: Metadata::empty(),
                scheme_id: None,
            })
            .map(|_| ()),
        ReplayOp::Redeem {
            participant,
            points,
            channel,
            amount,
        } => engine
            .request_redemption(RedemptionRequest {
                participant,
                channel,
                points,
                amount,
                metadata: Metadata::empty(),
            })
            .map(|_| ()),
    }
}

/// Replay operations one at a time, in file order
pub fn replay_sequential(engine: &RewardsEngine, ops: Vec<ReplayOp>) -> ReplayReport {
    let mut report = ReplayReport::default();
    for op in ops {
        report.tally(apply_op(engine, op).is_ok());
    }
    info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        "sequential replay complete"
    );
    report
}

/// Replay operations in concurrent batches
///
/// Each batch of `concurrency` records is dispatched as parallel tasks and
/// awaited before the next batch starts, so unrelated records exercise the
/// engine's request-per-call concurrency while the file's coarse ordering
/// survives.
pub async fn replay_concurrent(
    engine: Arc<RewardsEngine>,
    ops: Vec<ReplayOp>,
    concurrency: usize,
) -> ReplayReport {
    let batch_size = concurrency.max(1);
    let mut report = ReplayReport::default();

    for batch in ops.chunks(batch_size) {
        let mut tasks = JoinSet::new();
        for op in batch.iter().cloned() {
            let engine = Arc::clone(&engine);
            tasks.spawn(async move { apply_op(&engine, op).is_ok() });
        }
        while let Some(joined) = tasks.join_next().await {
            report.tally(joined.unwrap_or(false));
        }
    }

    info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        batch_size,
        "concurrent replay complete"
    );
    report
}
