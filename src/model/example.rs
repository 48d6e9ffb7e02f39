use crate::error::{Error, Result};
use crate::midi_codec;
use crate::model::note::{Note, ensure_seconds};
use serde::{Deserialize, Serialize};

/// A monophonic melody transcription bounded by the segment `[segment_start, segment_end]`.
///
/// Instances only exist in a fully validated state: every note lies inside the segment, notes
/// are ordered by onset, and no note begins before the previous one has ended.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "serde_json::Value")]
pub struct MelodyTranscriptionExample {
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    segment_start: f64,
    segment_end: f64,
    notes: Vec<Note>,
}

impl MelodyTranscriptionExample {
    pub fn new(segment_start: f64, segment_end: f64, notes: Vec<Note>) -> Result<Self> {
        ensure_seconds("segment_start", segment_start)?;
        ensure_seconds("segment_end", segment_end)?;

        if segment_start < 0.0 {
            return Err(Error::RangeViolation(format!(
                "segment_start must be non-negative, got {segment_start}"
            )));
        }

        if segment_start >= segment_end {
            return Err(Error::RangeViolation(format!(
                "segment_start ({segment_start}) must precede segment_end ({segment_end})"
            )));
        }

        for (i, note) in notes.iter().enumerate() {
            if note.onset() < segment_start {
                return Err(Error::ContainmentViolation(format!(
                    "note {i} begins at {} before the segment starts at {segment_start}",
                    note.onset()
                )));
            }

            if note.onset() > segment_end {
                return Err(Error::ContainmentViolation(format!(
                    "note {i} begins at {} after the segment ends at {segment_end}",
                    note.onset()
                )));
            }

            if let Some(offset) = note.offset()
                && offset > segment_end
            {
                return Err(Error::ContainmentViolation(format!(
                    "note {i} ends at {offset} after the segment ends at {segment_end}"
                )));
            }
        }

        for (i, pair) in notes.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);

            if next.onset() == prev.onset() {
                return Err(Error::OverlapViolation(format!(
                    "notes {i} and {} share the onset {}",
                    i + 1,
                    next.onset()
                )));
            }

            if next.onset() < prev.onset() {
                return Err(Error::OverlapViolation(format!(
                    "note {} at {} is listed after note {i} at {}",
                    i + 1,
                    next.onset(),
                    prev.onset()
                )));
            }

            // An unspecified offset lasts until the next onset, which can never overlap.
            if let Some(offset) = prev.offset()
                && next.onset() < offset
            {
                return Err(Error::OverlapViolation(format!(
                    "note {} begins at {} before note {i} ends at {offset}",
                    i + 1,
                    next.onset()
                )));
            }
        }

        Ok(Self {
            uid: None,
            segment_start,
            segment_end,
            notes,
        })
    }

    /// Returns the same example tagged with an opaque identifier.
    pub fn with_uid(self, uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..self
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn segment_start(&self) -> f64 {
        self.segment_start
    }

    pub fn segment_end(&self) -> f64 {
        self.segment_end
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Encodes this example as a single-track Standard MIDI File.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        midi_codec::encode(self)
    }

    /// Decodes and validates an example previously written by [`Self::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        midi_codec::decode(data)
    }

    pub fn to_midi(&self) -> Result<Vec<u8>> {
        self.to_bytes()
    }

    pub fn from_midi(data: &[u8]) -> Result<Self> {
        Self::from_bytes(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scale() -> Vec<Note> {
        [(0.0, 60, 1.0), (1.0, 62, 2.0), (2.0, 64, 3.0), (3.0, 65, 4.0), (4.0, 67, 5.0)]
            .into_iter()
            .map(|(on, pitch, off)| Note::new(on, pitch, Some(off)).unwrap())
            .collect()
    }

    fn without_offsets(notes: &[Note]) -> Vec<Note> {
        notes
            .iter()
            .map(|n| Note::new(n.onset(), n.pitch(), None).unwrap())
            .collect()
    }

    #[test]
    fn valid_melody_constructs() {
        let melody = scale();
        let example = MelodyTranscriptionExample::new(0.0, 5.0, melody.clone()).unwrap();
        assert_eq!(example.notes(), melody.as_slice());
        assert_eq!(example.segment_start(), 0.0);
        assert_eq!(example.segment_end(), 5.0);
        assert_eq!(example.uid(), None);
    }

    #[test]
    fn empty_segment_is_valid() {
        assert!(MelodyTranscriptionExample::new(0.0, 5.0, vec![]).is_ok());
        assert!(MelodyTranscriptionExample::new(12.5, 12.75, vec![]).is_ok());
    }

    #[test]
    fn notes_without_offsets() {
        let melody = without_offsets(&scale());
        assert!(MelodyTranscriptionExample::new(0.0, 5.0, melody.clone()).is_ok());
        // The final onset may coincide with the end of the segment.
        assert!(MelodyTranscriptionExample::new(0.0, 4.0, melody).is_ok());
    }

    #[test]
    fn segment_bounds_rejected() {
        let melody = scale();
        assert!(matches!(
            MelodyTranscriptionExample::new(-1.0, 5.0, melody.clone()),
            Err(Error::RangeViolation(_))
        ));
        assert!(matches!(
            MelodyTranscriptionExample::new(5.0, 0.0, melody.clone()),
            Err(Error::RangeViolation(_))
        ));
        assert!(matches!(
            MelodyTranscriptionExample::new(2.0, 2.0, vec![]),
            Err(Error::RangeViolation(_))
        ));
        assert!(matches!(
            MelodyTranscriptionExample::new(f64::NAN, 5.0, melody),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn notes_outside_segment_rejected() {
        let melody = scale();
        assert!(matches!(
            MelodyTranscriptionExample::new(1.0, 5.0, melody.clone()),
            Err(Error::ContainmentViolation(_))
        ));
        assert!(matches!(
            MelodyTranscriptionExample::new(0.0, 3.0, melody.clone()),
            Err(Error::ContainmentViolation(_))
        ));
        assert!(matches!(
            MelodyTranscriptionExample::new(0.0, 4.0, melody),
            Err(Error::ContainmentViolation(_))
        ));

        let late = vec![Note::new(6.0, 60, None).unwrap()];
        assert!(matches!(
            MelodyTranscriptionExample::new(0.0, 5.0, late),
            Err(Error::ContainmentViolation(_))
        ));
    }

    #[test]
    fn shared_onsets_rejected() {
        let cases = [
            (Note::new(0.0, 60, None), Note::new(0.0, 60, None)),
            (Note::new(0.0, 60, None), Note::new(0.0, 72, Some(1.0))),
            (Note::new(0.5, 60, Some(1.0)), Note::new(0.5, 48, Some(2.0))),
        ];

        for (a, b) in cases {
            let notes = vec![a.unwrap(), b.unwrap()];
            assert!(matches!(
                MelodyTranscriptionExample::new(0.0, 5.0, notes),
                Err(Error::OverlapViolation(_))
            ));
        }
    }

    #[test]
    fn overlapping_notes_rejected() {
        let notes = vec![
            Note::new(0.0, 60, Some(1.0)).unwrap(),
            Note::new(0.5, 62, Some(1.5)).unwrap(),
        ];
        assert!(matches!(
            MelodyTranscriptionExample::new(0.0, 5.0, notes),
            Err(Error::OverlapViolation(_))
        ));
    }

    #[test]
    fn unordered_notes_rejected() {
        let mut notes = scale();
        notes.swap(1, 2);
        assert!(matches!(
            MelodyTranscriptionExample::new(0.0, 5.0, notes),
            Err(Error::OverlapViolation(_))
        ));
    }

    #[test]
    fn with_uid_keeps_content() {
        let example = MelodyTranscriptionExample::new(0.0, 5.0, scale()).unwrap();
        let tagged = example.clone().with_uid("RWC_RYY_001");
        assert_eq!(tagged.uid(), Some("RWC_RYY_001"));
        assert_eq!(tagged.notes(), example.notes());
        assert_ne!(tagged, example);
    }

    #[test]
    fn midi_round_trip() {
        let example = MelodyTranscriptionExample::new(0.0, 5.0, scale()).unwrap();
        let bytes = example.to_midi().unwrap();
        let decoded = MelodyTranscriptionExample::from_midi(&bytes).unwrap();
        assert_eq!(decoded, example);
        assert_eq!(decoded.to_midi().unwrap(), bytes);
    }
}
