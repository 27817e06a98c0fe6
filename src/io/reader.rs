//! File readers for seed and operations CSVs
//!
//! Seed files are headerless, kind-tagged, flexible-width records with `#`
//! comments. Operations files carry a fixed header. Malformed rows are
//! reported with their line number; a malformed file is fatal to a replay
//! rather than silently skipped.

use crate::io::csv_format::{apply_seed_record, convert_op_record, OpRecord, ReplayOp, SeedData};
use csv::{ReaderBuilder, Trim};
use std::path::Path;

/// Read a seed file into [`SeedData`]
pub fn read_seed_file(path: &Path) -> Result<SeedData, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| format!("cannot open seed file {}: {}", path.display(), e))?;

    let mut seed = SeedData::default();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("seed file {}: {}", path.display(), e))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        apply_seed_record(&mut seed, &record)
            .map_err(|e| format!("seed file {} record {}: {}", path.display(), index + 1, e))?;
    }
    Ok(seed)
}

/// Read an operations file into replay order
pub fn read_ops_file(path: &Path) -> Result<Vec<ReplayOp>, String> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| format!("cannot open operations file {}: {}", path.display(), e))?;

    let mut ops = Vec::new();
    for (index, result) in reader.deserialize::<OpRecord>().enumerate() {
        let record = result.map_err(|e| format!("operations file {}: {}", path.display(), e))?;
        let op = convert_op_record(record).map_err(|e| {
            format!(
                "operations file {} record {}: {}",
                path.display(),
                index + 1,
                e
            )
        })?;
        ops.push(op);
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_seed_file_with_comments() {
        let file = write_temp(
            "# master data\n\
             participant,1,retailer,9\n\
             participant,9,counter-staff\n\
             qr,QR-1,SEC-1,SKU-9,B-100\n\
             config,SKU-9,retailer,5.00\n\
             rate,*,5\n",
        );

        let seed = read_seed_file(file.path()).unwrap();
        assert_eq!(seed.participants.len(), 2);
        assert_eq!(seed.qr_codes.len(), 1);
        assert_eq!(seed.rates.len(), 1);
    }

    #[test]
    fn test_read_seed_file_reports_bad_record() {
        let file = write_temp("participant,not-a-number,retailer\n");
        let error = read_seed_file(file.path()).unwrap_err();
        assert!(error.contains("record 1"));
    }

    #[test]
    fn test_read_ops_file_preserves_order() {
        let file = write_temp(
            "op,participant,qr,category,points,earning_type,channel,amount\n\
             scan,1,QR-1,,,,,\n\
             credit,1,,retailer,50,Referral Bonus,,\n\
             redeem,1,,,100,,2,\n",
        );

        let ops = read_ops_file(file.path()).unwrap();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], ReplayOp::Scan { .. }));
        assert!(matches!(
            ops[1],
            ReplayOp::Credit {
                category: Category::Retailer,
                points: 50,
                ..
            }
        ));
        assert!(matches!(ops[2], ReplayOp::Redeem { points: 100, .. }));
    }

    #[test]
    fn test_read_ops_file_rejects_unknown_op() {
        let file = write_temp(
            "op,participant,qr,category,points,earning_type,channel,amount\n\
             approve,1,,,,,,\n",
        );
        assert!(read_ops_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_seed_file(Path::new("/nonexistent/seed.csv")).is_err());
        assert!(read_ops_file(Path::new("/nonexistent/ops.csv")).is_err());
    }
}
