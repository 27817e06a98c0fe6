//! I/O handling: CSV formats and file readers

pub mod csv_format;
pub mod reader;

pub use csv_format::{
    apply_seed_record, convert_op_record, write_balances_csv, OpRecord, ReplayOp, SeedData,
};
pub use reader::{read_ops_file, read_seed_file};
