//! CSV format handling for seed data, operation records, and the balances
//! report
//!
//! Two input files drive a replay: a seed file describing master data
//! (participants, QR codes, point configs, access rules, withholding
//! rates) and an operations file of scan/credit/redeem records. The final
//! balances report is written as CSV.
//!
//! All conversion functions are pure (no I/O) for easy testing.

use crate::types::{
    AccessRule, Category, CentralAccount, ChannelId, ParticipantId, PointConfig, QrCode,
};
use chrono::NaiveDate;
use csv::StringRecord;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// One replayable operation
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOp {
    Scan {
        participant: ParticipantId,
        qr_code: String,
    },
    Credit {
        participant: ParticipantId,
        category: Category,
        points: i64,
        earning_type: String,
    },
    Redeem {
        participant: ParticipantId,
        points: i64,
        channel: ChannelId,
        amount: Option<i64>,
    },
}

/// Raw operations CSV row
///
/// Matches the header `op,participant,qr,category,points,earning_type,
/// channel,amount`; unused columns stay empty per operation kind.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OpRecord {
    pub op: String,
    pub participant: ParticipantId,
    pub qr: Option<String>,
    pub category: Option<String>,
    pub points: Option<i64>,
    pub earning_type: Option<String>,
    pub channel: Option<ChannelId>,
    pub amount: Option<i64>,
}

/// Convert a raw operations row into a [`ReplayOp`]
pub fn convert_op_record(record: OpRecord) -> Result<ReplayOp, String> {
    let non_empty = |value: Option<String>| value.filter(|s| !s.trim().is_empty());
    match record.op.to_lowercase().as_str() {
        "scan" => {
            let qr_code = non_empty(record.qr)
                .ok_or_else(|| "scan requires a qr column".to_string())?;
            Ok(ReplayOp::Scan {
                participant: record.participant,
                qr_code,
            })
        }
        "credit" => {
            let category = non_empty(record.category)
                .ok_or_else(|| "credit requires a category column".to_string())?
                .parse::<Category>()?;
            let points = record
                .points
                .ok_or_else(|| "credit requires a points column".to_string())?;
            let earning_type = non_empty(record.earning_type)
                .ok_or_else(|| "credit requires an earning_type column".to_string())?;
            Ok(ReplayOp::Credit {
                participant: record.participant,
                category,
                points,
                earning_type,
            })
        }
        "redeem" => {
            let points = record
                .points
                .ok_or_else(|| "redeem requires a points column".to_string())?;
            let channel = record
                .channel
                .ok_or_else(|| "redeem requires a channel column".to_string())?;
            Ok(ReplayOp::Redeem {
                participant: record.participant,
                points,
                channel,
                amount: record.amount,
            })
        }
        other => Err(format!("unknown operation '{}'", other)),
    }
}

/// Master data collected from a seed file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedData {
    pub participants: Vec<(ParticipantId, Category, Option<ParticipantId>)>,
    pub qr_codes: Vec<QrCode>,
    pub point_configs: Vec<PointConfig>,
    pub access_rules: Vec<AccessRule>,

    /// Withholding rates: `None` category is the generic fallback
    pub rates: Vec<(Option<Category>, Decimal)>,

    /// Settlement threshold override
    pub threshold: Option<i64>,

    pub earning_types: Vec<String>,
}

/// Parse one seed record (headerless, kind in the first column) into the
/// accumulating [`SeedData`]
///
/// Record shapes:
///
/// ```csv
/// participant,<id>,<category>[,<linked_staff>]
/// qr,<code>,<security>,<sku>,<batch>[,<mfg YYYY-MM-DD>][,<parent>]
/// config,<sku>,<category>,<rate>
/// access,<participant>,<sku>
/// rate,<category|*>,<percent>
/// threshold,<value>
/// earning_type,<name>
/// ```
pub fn apply_seed_record(seed: &mut SeedData, record: &StringRecord) -> Result<(), String> {
    match required(record, 0, "kind")? {
        "participant" => {
            let id: ParticipantId = required(record, 1, "participant id")?
                .parse()
                .map_err(|_| "invalid participant id".to_string())?;
            let category: Category = required(record, 2, "category")?.parse()?;
            let linked_staff = match field(record, 3) {
                Some(raw) => Some(
                    raw.parse::<ParticipantId>()
                        .map_err(|_| "invalid linked staff id".to_string())?,
                ),
                None => None,
            };
            seed.participants.push((id, category, linked_staff));
        }
        "qr" => {
            let code = required(record, 1, "code")?;
            let security = required(record, 2, "security code")?;
            let sku = required(record, 3, "sku")?;
            let batch = required(record, 4, "batch")?;
            let manufacturing_date = match field(record, 5) {
                Some(raw) => NaiveDate::from_str(raw)
                    .map_err(|_| format!("invalid manufacturing date '{}'", raw))?,
                None => NaiveDate::default(),
            };
            let mut qr = QrCode::new(code, security, sku, batch, manufacturing_date);
            if let Some(parent) = field(record, 6) {
                qr = qr.with_parent(parent);
            }
            seed.qr_codes.push(qr);
        }
        "config" => {
            let sku = required(record, 1, "sku")?;
            let category: Category = required(record, 2, "category")?.parse()?;
            let rate = Decimal::from_str(required(record, 3, "rate")?)
                .map_err(|_| "invalid point rate".to_string())?;
            seed.point_configs
                .push(PointConfig::new(1, sku, category, rate));
        }
        "access" => {
            let participant: ParticipantId = required(record, 1, "participant id")?
                .parse()
                .map_err(|_| "invalid participant id".to_string())?;
            let sku = required(record, 2, "sku")?;
            seed.access_rules.push(AccessRule::specific(participant, sku));
        }
        "rate" => {
            let category = match required(record, 1, "category")? {
                "*" => None,
                raw => Some(raw.parse::<Category>()?),
            };
            let percent = Decimal::from_str(required(record, 2, "percent")?)
                .map_err(|_| "invalid withholding percent".to_string())?;
            seed.rates.push((category, percent));
        }
        "threshold" => {
            let value: i64 = required(record, 1, "threshold")?
                .parse()
                .map_err(|_| "invalid threshold".to_string())?;
            seed.threshold = Some(value);
        }
        "earning_type" => {
            seed.earning_types.push(required(record, 1, "name")?.to_string());
        }
        other => return Err(format!("unknown seed kind '{}'", other)),
    }
    Ok(())
}

fn field<'r>(record: &'r StringRecord, index: usize) -> Option<&'r str> {
    record
        .get(index)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required<'r>(record: &'r StringRecord, index: usize, name: &str) -> Result<&'r str, String> {
    field(record, index).ok_or_else(|| format!("missing {} column", name))
}

/// Write the final balances report
///
/// Columns: participant, category, balance, total_earnings; rows sorted by
/// participant id by the caller.
pub fn write_balances_csv<W: Write>(
    accounts: &[CentralAccount],
    output: &mut W,
) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);
    writer
        .write_record(["participant", "category", "balance", "total_earnings"])
        .map_err(|e| format!("failed to write report header: {}", e))?;
    for account in accounts {
        writer
            .write_record([
                account.participant.to_string(),
                account.category.to_string(),
                account.balance.to_string(),
                account.total_earnings.to_string(),
            ])
            .map_err(|e| format!("failed to write report row: {}", e))?;
    }
    writer
        .flush()
        .map_err(|e| format!("failed to flush report: {}", e))?;
    Ok(())
}
