// src/error.rs
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures reported by the hardware transport. The codec never creates these,
/// it only passes them through.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("transmit error: {0}")]
    Transmit(#[from] pcsc::Error),

    #[error("short APDU response")]
    ShortResponse,

    #[error("APDU failed: SW={sw1:02X}{sw2:02X}")]
    Status { sw1: u8, sw2: u8 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed TLV 0x{tag:02X} at offset {offset}: declared {declared:?} bytes, {available} available")]
    MalformedTlv {
        offset: usize,
        tag: u8,
        declared: Option<usize>,
        available: usize,
    },

    #[error("malformed record: {field} needs {required} bytes at offset {offset}, {available} available")]
    MalformedRecord {
        field: &'static str,
        offset: usize,
        required: usize,
        available: usize,
    },

    #[error("NDEF message of {0} bytes does not fit a single-byte TLV length")]
    UnsupportedLength(usize),

    #[error("record payload of {0} bytes is too large for a short record")]
    PayloadTooLarge(usize),

    #[error("record {field} of {len} bytes does not fit a one-byte length")]
    FieldTooLarge { field: &'static str, len: usize },

    #[error("NDEF message has no records")]
    EmptyMessage,

    #[error("message ended after {records} record(s) without an ME flag")]
    UnterminatedMessage { records: usize },

    #[error("empty URI payload")]
    EmptyUriPayload,

    #[error("invalid text record: {0}")]
    InvalidTextRecord(String),

    #[error("message needs {needed} bytes, the tag data area holds {available}")]
    DataAreaTooSmall { needed: usize, available: usize },

    #[error("tag family could not be determined")]
    UnknownTagFamily,

    #[error(transparent)]
    Io(#[from] TransportError),
}

/// A best-effort decode result: whatever could be recovered, plus every problem
/// found along the way. Callers that want strict behaviour use `into_result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosed<T> {
    pub value: T,
    pub issues: Vec<Error>,
}

impl<T> Diagnosed<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            issues: Vec::new(),
        }
    }

    pub fn with_issue(value: T, issue: Error) -> Self {
        Self {
            value,
            issues: vec![issue],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Diagnosed<U> {
        Diagnosed {
            value: f(self.value),
            issues: self.issues,
        }
    }

    /// Strict view: the first issue, if any, becomes the error.
    pub fn into_result(self) -> Result<T> {
        match self.issues.into_iter().next() {
            Some(issue) => Err(issue),
            None => Ok(self.value),
        }
    }
}
