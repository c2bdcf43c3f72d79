use crate::store::operations::feature_records::StoredFeatureRecord;
use crate::store::{keys, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_participant_index", m002_participant_index),
    ]
}

/// 执行所有未应用的迁移。
///
/// - 每个迁移必须幂等：进程可能在迁移成功后、写版本号前崩溃，重启会重跑。
/// - 版本号在每个迁移成功后立即持久化。
/// - 仅向前：set_version 拒绝降级。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }
    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt version marker ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuilds the participant index from the primary tree.
fn m002_participant_index(store: &Store) -> Result<(), StoreError> {
    let mut rebuilt = 0usize;
    for item in store.feature_records.iter() {
        let (_, value) = item?;
        let stored: StoredFeatureRecord = Store::deserialize(&value)?;
        let record = &stored.record;
        let key = keys::participant_record_key(
            record.participant_id(),
            record.stage().as_str(),
            record.timestamp().timestamp_millis(),
            stored.handle.as_str(),
        )?;
        store
            .records_by_participant
            .insert(key.as_bytes(), stored.handle.as_str().as_bytes())?;
        rebuilt += 1;
    }
    tracing::debug!(rebuilt, "Participant index rebuilt");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 2);
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db2");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        set_version(&store, 3).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }
}
