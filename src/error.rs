//! Error taxonomy shared by every decoder in the crate.
//!
//! Every variant carries the absolute byte offset (into the buffer handed to
//! the outermost decode call) where the problem was detected, and, where one
//! exists, the index of the record being decoded.  Nothing here is retryable:
//! each error means either the format assumption is wrong or the input is
//! corrupt.

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum FormatError {
    /// Wrong or missing format signature.  No partial result is produced.
    #[error("{format}: bad magic at offset {offset:#x}")]
    BadMagic { format: &'static str, offset: usize },

    #[error("truncated input at offset {offset:#x}: wanted {wanted} byte(s), {available} available")]
    TruncatedInput { offset: usize, wanted: usize, available: usize },

    /// The archive index is malformed after a valid footer.
    #[error("index corrupted at inode {record} (offset {offset:#x})")]
    IndexCorrupted { record: usize, offset: usize },

    /// A format-internal cross-check (repeated name, sentinel byte, magic) failed.
    #[error("structural mismatch at offset {offset:#x}: {what}")]
    StructuralMismatch { offset: usize, what: String },

    #[error("reserved field of {len} byte(s) at offset {offset:#x} is not zero")]
    ReservedFieldViolation { offset: usize, len: usize },

    /// The element header disagrees with the id from the offset table.
    #[error("record {record}: offset table says id {expected}, element header says {found}")]
    IdMismatch { record: usize, expected: i32, found: u32 },

    #[error("member {record} '{name}' (offset {offset:#x}): index says {expected}, content hashes to {actual}")]
    IntegrityFailure {
        record:   usize,
        offset:   usize,
        name:     String,
        expected: String,
        actual:   String,
    },

    #[error("member {record} (offset {offset:#x}) failed to decompress: {source}")]
    Decompression {
        record: usize,
        offset: usize,
        #[source]
        source: CodecError,
    },

    #[error("record {record} (offset {offset:#x}): {source}")]
    InRecord {
        record: usize,
        offset: usize,
        #[source]
        source: Box<FormatError>,
    },
}

impl FormatError {
    pub(crate) fn mismatch(offset: usize, what: impl Into<String>) -> Self {
        FormatError::StructuralMismatch { offset, what: what.into() }
    }

    pub(crate) fn in_record(self, record: usize, offset: usize) -> Self {
        FormatError::InRecord { record, offset, source: Box::new(self) }
    }

    /// The innermost error, looking through any [`FormatError::InRecord`] wrappers.
    pub fn root_cause(&self) -> &FormatError {
        match self {
            FormatError::InRecord { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T, E = FormatError> = std::result::Result<T, E>;
