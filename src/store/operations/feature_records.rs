use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::capture::types::{CaptureStage, FeatureRecord};
use crate::store::keys;
use crate::store::{Store, StoreError};

/// Opaque id of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredRecordHandle(String);

impl StoredRecordHandle {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        keys::feature_record_key(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoredRecordHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFeatureRecord {
    pub handle: StoredRecordHandle,
    pub stored_at: DateTime<Utc>,
    pub record: FeatureRecord,
}

impl Store {
    /// Writes the record and its participant index entry atomically.
    pub fn save_feature_record(&self, record: &FeatureRecord) -> Result<StoredRecordHandle, StoreError> {
        let handle = StoredRecordHandle::generate();
        let stored = StoredFeatureRecord {
            handle: handle.clone(),
            stored_at: Utc::now(),
            record: record.clone(),
        };

        let primary_key = keys::feature_record_key(handle.as_str())?;
        let index_key = keys::participant_record_key(
            record.participant_id(),
            record.stage().as_str(),
            record.timestamp().timestamp_millis(),
            handle.as_str(),
        )?;
        let bytes = Self::serialize(&stored)?;

        (&self.feature_records, &self.records_by_participant)
            .transaction(|(tx_records, tx_index)| {
                tx_records.insert(primary_key.as_bytes(), bytes.as_slice())?;
                tx_index.insert(index_key.as_bytes(), handle.as_str().as_bytes())?;
                Ok(())
            })
            .map_err(
                |error: sled::transaction::TransactionError<StoreError>| match error {
                    sled::transaction::TransactionError::Abort(store_error) => store_error,
                    sled::transaction::TransactionError::Storage(storage_error) => {
                        StoreError::Sled(storage_error)
                    }
                },
            )?;

        tracing::debug!(
            handle = %handle,
            participant_id = record.participant_id(),
            stage = record.stage().as_str(),
            "Feature record stored"
        );
        Ok(handle)
    }

    pub fn get_feature_record(
        &self,
        handle: &StoredRecordHandle,
    ) -> Result<Option<StoredFeatureRecord>, StoreError> {
        let key = keys::feature_record_key(handle.as_str())?;
        match self.feature_records.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Newest first. With `stage` set only that stage is scanned.
    pub fn list_feature_records(
        &self,
        participant_id: &str,
        stage: Option<CaptureStage>,
        limit: usize,
    ) -> Result<Vec<StoredFeatureRecord>, StoreError> {
        if let Some(stage) = stage {
            return self.scan_stage(participant_id, stage, limit);
        }

        let mut records = self.scan_stage(participant_id, CaptureStage::Before, limit)?;
        records.extend(self.scan_stage(participant_id, CaptureStage::After, limit)?);
        // 两个 stage 的索引段各自有序，合并后重新排序
        records.sort_by(|a, b| b.record.timestamp().cmp(&a.record.timestamp()));
        records.truncate(limit);
        Ok(records)
    }

    /// Walks one stage's index segment, which is already newest first, and
    /// stops after `limit` loaded records.
    fn scan_stage(
        &self,
        participant_id: &str,
        stage: CaptureStage,
        limit: usize,
    ) -> Result<Vec<StoredFeatureRecord>, StoreError> {
        let prefix = keys::participant_stage_prefix(participant_id, stage.as_str())?;
        let mut records = Vec::new();
        for item in self.records_by_participant.scan_prefix(prefix.as_bytes()) {
            if records.len() >= limit {
                break;
            }
            let (_, handle_bytes) = item?;
            let handle = StoredRecordHandle(String::from_utf8_lossy(&handle_bytes).into_owned());
            match self.get_feature_record(&handle)? {
                Some(stored) => records.push(stored),
                None => tracing::warn!(handle = %handle, "Dangling participant index entry"),
            }
        }
        Ok(records)
    }

    pub fn latest_feature_record(
        &self,
        participant_id: &str,
        stage: CaptureStage,
    ) -> Result<Option<StoredFeatureRecord>, StoreError> {
        Ok(self
            .list_feature_records(participant_id, Some(stage), 1)?
            .into_iter()
            .next())
    }
}
