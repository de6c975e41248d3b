use std::io;
use thiserror::Error;

/// Broad class of an [`EdfError`].
///
/// Callers processing many files usually only care whether a failure means
/// "skip this file" (`Open`), "this file is broken" (`Format`), or "the
/// requested operation does not fit this recording" (`Consistency`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Open,
    Format,
    Consistency,
    Io,
}

#[derive(Debug, Error)]
pub enum EdfError {
    #[error("could not open {path}: {reason}")]
    OpenFailure { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("problem converting {field} field: [{raw}]")]
    InvalidField { field: &'static str, raw: String },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error(
        "corrupt EDF: expecting {expected} bytes but observed {observed} \
         ({record_discrepancy:+.3} records discrepancy)"
    )]
    SizeMismatch {
        expected: u64,
        observed: u64,
        record_discrepancy: f64,
    },

    #[error("Invalid number of signals: {0}")]
    InvalidSignalCount(i64),

    #[error("signal {label}: digital max ({max}) must exceed digital min ({min})")]
    DigitalRange { label: String, min: i32, max: i32 },

    #[error("EDF+D recording without a time-track")]
    MissingTimeTrack,

    #[error("compressed stream index: {0}")]
    CompressedIndex(String),

    #[error("Signal index {0} out of range")]
    InvalidSignalIndex(usize),

    #[error("could not find signal {0}")]
    UnknownSignal(String),

    #[error("{0} already exists in the EDF")]
    DuplicateSignal(String),

    #[error("signal {label}: expected {expected} samples, got {got}")]
    SampleCountMismatch {
        label: String,
        expected: usize,
        got: usize,
    },

    #[error("signal {label}: {implied} samples per record is not an integer")]
    NonIntegralSampleCount { label: String, implied: f64 },

    #[error("sampling rate mismatch: {0}")]
    RateMismatch(String),

    #[error("different channels map to the same alias {alias}: {labels}")]
    AliasCollision { alias: String, labels: String },

    #[error("cannot modify annotation channel {0}")]
    AnnotationChannel(String),

    #[error("File is discontinuous")]
    DiscontinuousFile,

    #[error("record {0} is not available")]
    RecordUnavailable(usize),

    #[error("bad record range {lo}..={hi} (record count {count})")]
    InvalidRecordRange { lo: usize, hi: usize, count: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EdfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EdfError::OpenFailure { .. } | EdfError::CompressedIndex(_) => ErrorKind::Open,
            EdfError::Io(_) => ErrorKind::Io,
            EdfError::InvalidField { .. }
            | EdfError::InvalidFormat(_)
            | EdfError::SizeMismatch { .. }
            | EdfError::InvalidSignalCount(_)
            | EdfError::DigitalRange { .. }
            | EdfError::MissingTimeTrack => ErrorKind::Format,
            _ => ErrorKind::Consistency,
        }
    }

    pub(crate) fn open_failure<P: AsRef<std::path::Path>>(path: P, reason: impl ToString) -> Self {
        EdfError::OpenFailure {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let e = EdfError::open_failure("missing.edf", "no such file");
        assert_eq!(e.kind(), ErrorKind::Open);
        assert!(e.to_string().contains("missing.edf"));

        let e = EdfError::SizeMismatch {
            expected: 1024,
            observed: 1536,
            record_discrepancy: 1.0,
        };
        assert_eq!(e.kind(), ErrorKind::Format);
        assert!(e.to_string().contains("+1.000 records"));

        assert_eq!(EdfError::RateMismatch("x".into()).kind(), ErrorKind::Consistency);
    }
}
