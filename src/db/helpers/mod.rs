use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::models::{SessionStatus, SleepStage};

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn millis_to_rfc3339(value: i64) -> Result<String> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| anyhow!("timestamp {value} is out of range"))
}

pub fn parse_status(value: &str) -> Result<SessionStatus> {
    match value {
        "Active" => Ok(SessionStatus::Active),
        "Paused" => Ok(SessionStatus::Paused),
        "Completed" => Ok(SessionStatus::Completed),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

pub fn parse_stage(value: &str) -> Result<SleepStage> {
    SleepStage::ALL
        .into_iter()
        .find(|stage| stage.as_str() == value)
        .ok_or_else(|| anyhow!("unknown sleep stage {value}"))
}
