//! Hands finished captures to persistence and builds before/after reports.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::capture::session::{CaptureSession, SessionError};
use crate::capture::types::{CaptureStage, FeatureRecord};
use crate::services::comparison;
use crate::services::report::{ReportGenerator, ReportRequest};
use crate::store::{Store, StoreError, StoredFeatureRecord, StoredRecordHandle, StoredReport};

/// The record is always returned; `handle` is `None` when storing failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub record: FeatureRecord,
    pub handle: Option<StoredRecordHandle>,
    pub persistence_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("record {0} not found")]
    RecordNotFound(StoredRecordHandle),
    #[error("record {handle} belongs to another participant")]
    ParticipantMismatch { handle: StoredRecordHandle },
    #[error("record {handle} is not a {expected} capture")]
    StageMismatch {
        handle: StoredRecordHandle,
        expected: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct CheckInService {
    store: Arc<Store>,
    reports: ReportGenerator,
}

impl CheckInService {
    pub fn new(store: Arc<Store>, reports: ReportGenerator) -> Self {
        Self { store, reports }
    }

    pub fn report_backend(&self) -> &'static str {
        self.reports.backend_name()
    }

    pub fn persist(&self, record: FeatureRecord) -> CheckInOutcome {
        match self.store.save_feature_record(&record) {
            Ok(handle) => CheckInOutcome {
                record,
                handle: Some(handle),
                persistence_error: None,
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    participant_id = record.participant_id(),
                    stage = record.stage().as_str(),
                    "Persisting feature record failed, keeping it in memory"
                );
                CheckInOutcome {
                    record,
                    handle: None,
                    persistence_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Terminal step of a capture: attaches the self-report and persists.
    pub fn finish(
        &self,
        session: &mut CaptureSession,
        self_report: &str,
    ) -> Result<CheckInOutcome, SessionError> {
        let record = session.complete(self_report)?;
        Ok(self.persist(record))
    }

    fn load(
        &self,
        participant_id: &str,
        handle: &StoredRecordHandle,
        expected: CaptureStage,
    ) -> Result<StoredFeatureRecord, CheckInError> {
        let stored = self
            .store
            .get_feature_record(handle)?
            .ok_or_else(|| CheckInError::RecordNotFound(handle.clone()))?;
        if stored.record.participant_id() != participant_id {
            return Err(CheckInError::ParticipantMismatch {
                handle: handle.clone(),
            });
        }
        if stored.record.stage() != expected {
            return Err(CheckInError::StageMismatch {
                handle: handle.clone(),
                expected: expected.as_str(),
            });
        }
        Ok(stored)
    }

    /// Generates and stores a report. A failed report write is logged and the
    /// report is still returned.
    pub async fn compare(
        &self,
        participant_id: &str,
        before: &StoredRecordHandle,
        after: Option<&StoredRecordHandle>,
    ) -> Result<StoredReport, CheckInError> {
        let before_rec = self.load(participant_id, before, CaptureStage::Before)?;
        let after_rec = after
            .map(|h| self.load(participant_id, h, CaptureStage::After))
            .transpose()?;

        let request = ReportRequest {
            before: before_rec.record,
            after: after_rec.map(|s| s.record),
        };
        let report = self.reports.generate(&request).await;
        let deltas = comparison::compare(&request.before, request.after.as_ref());

        let stored = StoredReport {
            id: uuid::Uuid::new_v4().to_string(),
            participant_id: participant_id.to_string(),
            before: before.clone(),
            after: after.cloned(),
            report,
            deltas,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.save_report(&stored) {
            tracing::warn!(error = %e, participant_id, "Persisting report failed");
        }
        Ok(stored)
    }

    /// Latest stored report with its delta table recomputed from the records.
    pub fn latest_report(&self, participant_id: &str) -> Result<Option<StoredReport>, CheckInError> {
        let Some(mut stored) = self.store.latest_report(participant_id)? else {
            return Ok(None);
        };
        let before = self.store.get_feature_record(&stored.before)?;
        let after = match &stored.after {
            Some(h) => self.store.get_feature_record(h)?,
            None => None,
        };
        if let Some(before) = before {
            stored.deltas =
                comparison::compare(&before.record, after.as_ref().map(|a| &a.record));
        }
        Ok(Some(stored))
    }
}
