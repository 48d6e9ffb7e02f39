//! Intake for loosely typed annotation records.
//!
//! Corpus loaders hand over JSON-shaped data where a time might have been written as `3` rather
//! than `3.0`. Those values are rejected with [`Error::TypeMismatch`] instead of being coerced.

use crate::error::{Error, Result};
use crate::model::example::MelodyTranscriptionExample;
use crate::model::note::Note;
use crate::util::parse_split;
use log::debug;
use serde_json::{Map, Value};

/// Dataset partition a raw record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Valid,
    Test,
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn seconds(field: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) if n.is_f64() => n.as_f64().ok_or_else(|| {
            Error::TypeMismatch(format!("{field} is not representable as seconds: {n}"))
        }),
        other => Err(Error::TypeMismatch(format!(
            "{field} must be real-valued seconds, got {}: {other}",
            kind(other)
        ))),
    }
}

fn pitch(value: &Value) -> Result<u8> {
    match value {
        Value::Number(n) if !n.is_f64() => match n.as_i64() {
            Some(p) if (0..=127).contains(&p) => Ok(p as u8),
            _ => Err(Error::RangeViolation(format!(
                "pitch must be within 0..=127, got {n}"
            ))),
        },
        other => Err(Error::TypeMismatch(format!(
            "pitch must be an integer, got {}: {other}",
            kind(other)
        ))),
    }
}

fn optional_seconds(field: &str, value: Option<&Value>) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => seconds(field, value).map(Some),
    }
}

fn required<'a>(record: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    record
        .get(field)
        .ok_or_else(|| Error::TypeMismatch(format!("record is missing the `{field}` field")))
}

impl TryFrom<&Value> for Note {
    type Error = Error;

    /// Accepts `{"onset": f, "pitch": i, "offset": f}` or `[onset, pitch, offset]`, with the
    /// offset optional in both forms.
    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Object(record) => Note::new(
                seconds("onset", required(record, "onset")?)?,
                pitch(required(record, "pitch")?)?,
                optional_seconds("offset", record.get("offset"))?,
            ),
            Value::Array(fields) if (2..=3).contains(&fields.len()) => Note::new(
                seconds("onset", &fields[0])?,
                pitch(&fields[1])?,
                optional_seconds("offset", fields.get(2))?,
            ),
            other => Err(Error::TypeMismatch(format!(
                "expected a note record, got {}",
                kind(other)
            ))),
        }
    }
}

impl TryFrom<Value> for Note {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Note::try_from(&value)
    }
}

impl TryFrom<&Value> for MelodyTranscriptionExample {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        let Value::Object(record) = value else {
            return Err(Error::TypeMismatch(format!(
                "expected an example record, got {}",
                kind(value)
            )));
        };

        let segment_start = seconds("segment_start", required(record, "segment_start")?)?;
        let segment_end = seconds("segment_end", required(record, "segment_end")?)?;

        let notes = match required(record, "notes")? {
            Value::Array(notes) => notes
                .iter()
                .map(Note::try_from)
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(Error::TypeMismatch(format!(
                    "notes must be an array, got {}",
                    kind(other)
                )));
            }
        };

        let example = MelodyTranscriptionExample::new(segment_start, segment_end, notes)?;

        match record.get("uid") {
            None | Some(Value::Null) => Ok(example),
            Some(Value::String(uid)) => Ok(example.with_uid(uid.as_str())),
            Some(other) => Err(Error::TypeMismatch(format!(
                "uid must be a string, got {}",
                kind(other)
            ))),
        }
    }
}

impl TryFrom<Value> for MelodyTranscriptionExample {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        MelodyTranscriptionExample::try_from(&value)
    }
}

/// Builds examples from a keyed collection of raw records (`{uid: record, ...}`), in uid order.
///
/// The key becomes the example's uid. When `split` is given, only records whose `split` field
/// names that partition are kept.
pub fn load_records(records: &Value, split: Option<Split>) -> Result<Vec<MelodyTranscriptionExample>> {
    let Value::Object(records) = records else {
        return Err(Error::TypeMismatch(format!(
            "expected records keyed by uid, got {}",
            kind(records)
        )));
    };

    let mut uids: Vec<&String> = records.keys().collect();
    uids.sort();

    let mut examples = Vec::with_capacity(uids.len());
    for uid in uids {
        let record = &records[uid.as_str()];

        if let Some(wanted) = split {
            let record_split = match record.get("split") {
                Some(Value::String(s)) => Some(parse_split(s).ok_or_else(|| {
                    Error::RangeViolation(format!("record {uid} has an unknown split '{s}'"))
                })?),
                _ => None,
            };

            if record_split != Some(wanted) {
                debug!("Skipping record {} outside the {:?} split", uid, wanted);
                continue;
            }
        }

        let example = MelodyTranscriptionExample::try_from(record)
            .map_err(|e| annotate(e, uid))?
            .with_uid(uid.as_str());
        examples.push(example);
    }

    Ok(examples)
}

fn annotate(error: Error, uid: &str) -> Error {
    match error {
        Error::TypeMismatch(msg) => Error::TypeMismatch(format!("{uid}: {msg}")),
        Error::RangeViolation(msg) => Error::RangeViolation(format!("{uid}: {msg}")),
        Error::ContainmentViolation(msg) => Error::ContainmentViolation(format!("{uid}: {msg}")),
        Error::OverlapViolation(msg) => Error::OverlapViolation(format!("{uid}: {msg}")),
        Error::Codec(msg) => Error::Codec(format!("{uid}: {msg}")),
    }
}
