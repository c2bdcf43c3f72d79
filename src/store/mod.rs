pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

pub use operations::feature_records::{StoredFeatureRecord, StoredRecordHandle};
pub use operations::reports::StoredReport;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub feature_records: sled::Tree,
    // Secondary index: participant/stage/time -> handle
    pub records_by_participant: sled::Tree,
    pub reports: sled::Tree,
    pub meta: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let feature_records = db.open_tree(trees::FEATURE_RECORDS)?;
        let records_by_participant = db.open_tree(trees::RECORDS_BY_PARTICIPANT)?;
        let reports = db.open_tree(trees::REPORTS)?;
        let meta = db.open_tree(trees::META)?;

        Ok(Self {
            db,
            feature_records,
            records_by_participant,
            reports,
            meta,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn current_schema_version(&self) -> Result<u32, StoreError> {
        migrate::get_current_version(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
