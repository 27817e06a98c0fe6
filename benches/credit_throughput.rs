//! Benchmark suite for the earning credit path
//!
//! Measures the cost of a full credit unit of work (withholding, balance
//! pair, transaction/audit/ledger rows) and of the scan path with its claim
//! lock, using the divan benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```

use loyalty_rewards_engine::core::earning_types;
use loyalty_rewards_engine::{
    Category, CreditRequest, Metadata, PointConfig, QrCode, RewardsEngine, ScanRequest,
    WithholdingPolicy,
};
use rust_decimal::Decimal;

fn main() {
    divan::main();
}

fn engine_with_participants(count: u64) -> RewardsEngine {
    let engine = RewardsEngine::new(
        WithholdingPolicy::new().with_fallback_rate(Decimal::new(500, 2)),
    );
    for participant in 0..count {
        engine
            .register_participant(participant, Category::Retailer, None)
            .expect("register");
    }
    engine
        .add_point_config(PointConfig::new(
            1,
            "SKU-9",
            Category::Retailer,
            Decimal::new(500, 2),
        ))
        .expect("config");
    engine
}

/// One thousand direct credits to a single participant
#[divan::bench]
fn credit_single_participant(bencher: divan::Bencher) {
    bencher
        .with_inputs(|| engine_with_participants(1))
        .bench_values(|engine| {
            for _ in 0..1_000 {
                engine
                    .credit_points(CreditRequest {
                        participant: 0,
                        category: Category::Retailer,
                        gross_points: 100,
                        earning_type: earning_types::QR_SCAN.to_string(),
                        sku: None,
                        metadata: Metadata::empty(),
                        scheme_id: None,
                    })
                    .expect("credit");
            }
        });
}

/// One thousand scans of distinct codes across one hundred participants
#[divan::bench]
fn scan_distinct_codes(bencher: divan::Bencher) {
    bencher
        .with_inputs(|| {
            let engine = engine_with_participants(100);
            for i in 0..1_000u64 {
                engine
                    .provision_qr(QrCode::new(
                        format!("QR-{}", i),
                        "SEC",
                        "SKU-9",
                        "B-100",
                        chrono::NaiveDate::default(),
                    ))
                    .expect("provision");
            }
            engine
        })
        .bench_values(|engine| {
            for i in 0..1_000u64 {
                engine
                    .scan_qr(ScanRequest {
                        participant: i % 100,
                        qr_code: format!("QR-{}", i),
                        location: None,
                        metadata: Metadata::empty(),
                    })
                    .expect("scan");
            }
        });
}
