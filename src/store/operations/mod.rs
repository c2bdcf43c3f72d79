pub mod feature_records;
pub mod reports;
