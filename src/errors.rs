//! Error taxonomy for the ingestion pipeline.
//!
//! Client-fault conditions (bad documents, bad timestamps, bad zone names)
//! get their own variants so the HTTP layer can classify them; store and I/O
//! faults pass through transparently.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The uploaded document is not well-formed XML (or not UTF-8).
    #[error("malformed GPX document: {0}")]
    Parse(String),

    /// A top-level child of the GPX root is none of wpt/trk/trkseg/trkpt.
    #[error("unsupported top-level GPX element <{0}>")]
    UnsupportedElement(String),

    /// The uploaded bytes do not sniff as a known image format.
    #[error("unrecognized image format")]
    UnsupportedFormat,

    /// A timestamp string could not be read as ISO-8601.
    #[error("unparsable timestamp {0:?}")]
    UnparsableTimestamp(String),

    /// A zone hint is not a recognized IANA zone name.
    #[error("unknown time zone {0:?}")]
    UnknownZone(String),

    /// A concurrent derive call already wrote the web rendition.
    #[error("web rendition already exists for photo {0}")]
    DuplicateDerivation(i64),

    /// The external image conversion tool failed or produced no output.
    #[error("image conversion failed: {0}")]
    Convert(String),

    #[error("no such trip {0}")]
    TripNotFound(i64),

    #[error("no such photo {0}")]
    PhotoNotFound(i64),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether the condition is the caller's fault (bad input) rather than
    /// an internal failure. The HTTP layer maps this to a 4xx class.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            IngestError::Parse(_)
                | IngestError::UnsupportedElement(_)
                | IngestError::UnsupportedFormat
                | IngestError::UnparsableTimestamp(_)
                | IngestError::UnknownZone(_)
                | IngestError::TripNotFound(_)
                | IngestError::PhotoNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
