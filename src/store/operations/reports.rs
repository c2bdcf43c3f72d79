use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::comparison::MetricDelta;
use crate::services::report::ComparisonReport;
use crate::store::keys;
use crate::store::operations::feature_records::StoredRecordHandle;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub id: String,
    pub participant_id: String,
    pub before: StoredRecordHandle,
    pub after: Option<StoredRecordHandle>,
    pub report: ComparisonReport,
    /// Skipped on read; recomputed from the records when needed.
    #[serde(default, skip_deserializing)]
    pub deltas: Vec<MetricDelta>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn save_report(&self, report: &StoredReport) -> Result<(), StoreError> {
        let key = keys::report_key(
            &report.participant_id,
            report.created_at.timestamp_millis(),
            &report.id,
        )?;
        self.reports.insert(key.as_bytes(), Self::serialize(report)?)?;
        Ok(())
    }

    pub fn latest_report(&self, participant_id: &str) -> Result<Option<StoredReport>, StoreError> {
        let prefix = keys::participant_prefix(participant_id)?;
        match self.reports.scan_prefix(prefix.as_bytes()).next() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(Self::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }
}
