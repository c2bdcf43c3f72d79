pub const FEATURE_RECORDS: &str = "feature_records";
pub const RECORDS_BY_PARTICIPANT: &str = "records_by_participant";
pub const REPORTS: &str = "reports";
pub const META: &str = "meta";
