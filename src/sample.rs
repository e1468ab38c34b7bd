use crate::error::SampleError;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// One scalar sensor reading. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    /// Rejects NaN and infinities; the models have no meaning for them.
    pub fn new(timestamp: i64, value: f64) -> Result<Self, SampleError> {
        if !value.is_finite() {
            return Err(SampleError::NonFinite { timestamp });
        }
        Ok(Self { timestamp, value })
    }

    pub fn from_reading(reading: Reading) -> Result<Self, SampleError> {
        match reading.value {
            Some(value) => Self::new(reading.timestamp, value),
            None => Err(SampleError::MissingValue {
                timestamp: reading.timestamp,
            }),
        }
    }
}

/// A reading as delivered by the producer, before null handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: i64,
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BorrowedReading<'a> {
    #[serde(default, borrow)]
    timestamp: Option<BorrowedTimestamp<'a>>,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BorrowedTimestamp<'a> {
    Str(&'a str),
    Int(i64),
    Float(f64),
}

impl<'a> BorrowedTimestamp<'a> {
    fn to_millis(&self) -> Result<i64, SampleError> {
        match self {
            BorrowedTimestamp::Str(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.timestamp_millis())
                .map_err(|err| SampleError::Malformed {
                    reason: format!("timestamp {s:?}: {err}"),
                }),
            BorrowedTimestamp::Int(ms) => Ok(*ms),
            BorrowedTimestamp::Float(secs) => Ok((*secs * 1000.0) as i64),
        }
    }
}

/// Parses one input line: a JSON object `{"timestamp": .., "value": ..}` or a
/// `timestamp,value` CSV pair. Blank lines yield `Ok(None)`. A missing JSON
/// timestamp is stamped with the current time.
pub fn parse_reading_line(line: &str) -> Result<Option<Reading>, SampleError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    if trimmed.starts_with('{') {
        return parse_json_reading(trimmed).map(Some);
    }
    parse_csv_reading(trimmed).map(Some)
}

fn parse_json_reading(line: &str) -> Result<Reading, SampleError> {
    let mut bytes = line.as_bytes().to_vec();
    let parsed: BorrowedReading = simd_json::from_slice(&mut bytes).map_err(|err| {
        SampleError::Malformed {
            reason: err.to_string(),
        }
    })?;
    let timestamp = match parsed.timestamp.as_ref() {
        Some(ts) => ts.to_millis()?,
        None => Utc::now().timestamp_millis(),
    };
    Ok(Reading {
        timestamp,
        value: parsed.value,
    })
}

fn parse_csv_reading(line: &str) -> Result<Reading, SampleError> {
    let Some((ts_raw, value_raw)) = line.split_once(',') else {
        return Err(SampleError::Malformed {
            reason: format!("expected `timestamp,value`, got {line:?}"),
        });
    };
    let timestamp = ts_raw
        .trim()
        .parse::<i64>()
        .map_err(|err| SampleError::Malformed {
            reason: format!("timestamp {ts_raw:?}: {err}"),
        })?;
    let value_raw = value_raw.trim();
    let value = if value_raw.is_empty() || value_raw.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(
            value_raw
                .parse::<f64>()
                .map_err(|err| SampleError::Malformed {
                    reason: format!("value {value_raw:?}: {err}"),
                })?,
        )
    };
    Ok(Reading { timestamp, value })
}

pub fn millis_to_dt(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// ISO-8601 with millisecond precision and a numeric zone offset,
/// e.g. `2024-03-01T12:00:00.250+00:00`.
pub fn format_iso_millis(ms: i64) -> Option<String> {
    millis_to_dt(ms).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string())
}
