use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const MAX_PITCH: u8 = 127;

/// A single pitched event, timed in seconds.
///
/// A missing `offset` means the note's duration is unspecified; for overlap purposes it lasts
/// until the following note begins.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(try_from = "serde_json::Value")]
pub struct Note {
    onset: f64,
    pitch: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<f64>,
}

impl Note {
    pub fn new(onset: f64, pitch: u8, offset: Option<f64>) -> Result<Self> {
        ensure_seconds("onset", onset)?;
        if onset < 0.0 {
            return Err(Error::RangeViolation(format!(
                "onset must be non-negative, got {onset}"
            )));
        }

        if pitch > MAX_PITCH {
            return Err(Error::RangeViolation(format!(
                "pitch must be within 0..={MAX_PITCH}, got {pitch}"
            )));
        }

        if let Some(offset) = offset {
            ensure_seconds("offset", offset)?;
            if offset <= onset {
                return Err(Error::RangeViolation(format!(
                    "offset ({offset}) must be greater than onset ({onset})"
                )));
            }
        }

        Ok(Self {
            onset,
            pitch,
            offset,
        })
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn offset(&self) -> Option<f64> {
        self.offset
    }
}

/// NaN and the infinities are not a number of seconds.
pub(crate) fn ensure_seconds(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::TypeMismatch(format!(
            "{name} must be a real number of seconds, got {value}"
        )))
    }
}
