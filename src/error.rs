use thiserror::Error;

/// Every way constructing or decoding a transcription can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A value of the wrong kind was supplied, e.g. integral seconds or a fractional pitch.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A value fell outside its legal numeric range.
    #[error("range violation: {0}")]
    RangeViolation(String),

    /// A note lies outside the segment that bounds it.
    #[error("containment violation: {0}")]
    ContainmentViolation(String),

    /// Notes overlap, share an onset, or are out of order.
    #[error("overlap violation: {0}")]
    OverlapViolation(String),

    /// The byte stream is malformed, truncated, unsupported or cannot be written.
    #[error("codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, Error>;
