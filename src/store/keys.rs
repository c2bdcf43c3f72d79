use crate::store::StoreError;

const SEPARATOR: char = ':';
const MAX_ID_LEN: usize = 128;

/// Ids become key segments, so the separator is rejected.
fn segment<'a>(kind: &str, value: &'a str) -> Result<&'a str, StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{kind} must not be empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(StoreError::Validation(format!(
            "{kind} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if value.contains(SEPARATOR) {
        return Err(StoreError::Validation(format!(
            "{kind} must not contain '{SEPARATOR}'"
        )));
    }
    Ok(value)
}

fn reverse_ts(timestamp_ms: i64) -> u64 {
    u64::MAX - timestamp_ms.max(0) as u64
}

pub fn feature_record_key(handle: &str) -> Result<String, StoreError> {
    Ok(segment("handle", handle)?.to_string())
}

/// `participant:stage:reverse_ts:handle`, newest first within a stage.
pub fn participant_record_key(
    participant_id: &str,
    stage: &str,
    timestamp_ms: i64,
    handle: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{:020}:{}",
        segment("participantId", participant_id)?,
        stage,
        reverse_ts(timestamp_ms),
        segment("handle", handle)?
    ))
}

pub fn participant_prefix(participant_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment("participantId", participant_id)?))
}

pub fn participant_stage_prefix(participant_id: &str, stage: &str) -> Result<String, StoreError> {
    Ok(format!("{}:{}:", segment("participantId", participant_id)?, stage))
}

pub fn report_key(participant_id: &str, timestamp_ms: i64, report_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{:020}:{}",
        segment("participantId", participant_id)?,
        reverse_ts(timestamp_ms),
        segment("reportId", report_id)?
    ))
}
