//! Streaming access to WARC (Web ARChive) files.
//!
//! ## Background
//!
//! WARC files store digital resources and related information, generally for
//! archival storage. They are most commonly used to hold the results of web
//! crawls: the request sent for each resource, the corresponding response,
//! and metadata for both. The format is formalized in ISO 28500; public
//! discussion and freely-available specifications are maintained by the IIPC
//! at <https://iipc.github.io/warc-specifications/>.
//!
//! ## WARC structure
//!
//! A WARC file is a simple concatenation of records. Each record has a format
//! similar to an HTTP message: a version line, a number of header fields, and
//! a block of `Content-Length` bytes followed by two CRLFs. A gzip-framed
//! WARC file is a concatenation of independent gzip *members*, each enclosing
//! exactly one record, so that any record can be read without decompressing
//! the ones before it.
//!
//! ## Library structure
//!
//! [`RecordReader`] walks a file (or any buffered stream) record by record,
//! yielding [`Record`] views. A record exposes its parsed [`Header`] and its
//! payload through [`std::io::Read`]/[`std::io::BufRead`]; calling
//! [`Record::finish`] consumes the record tail and reports the byte offset
//! and compressed length of the enclosing gzip member, which is what CDX-style
//! indexes need to address the record later.

use thiserror::Error;

mod compression;
mod header;
pub mod record;
#[cfg(test)]
mod tests;

pub use compression::Compression;
pub use header::{get_record_header, FieldName, Header, Version};
pub use record::{FinishError, InvalidRecord, Record, RecordReader};

/// Reasons it may be impossible to parse a WARC header.
#[derive(Debug, Error)]
pub enum HeaderParseError {
    /// The WARC/m.n signature marking the start of a record is not present or invalid.
    ///
    /// Carries a lossy UTF-8 rendering of the bytes that failed to parse,
    /// for error messages.
    #[error("WARC signature missing or invalid (near \"{0}\")")]
    InvalidSignature(String),
    /// A header field was malformed or truncated.
    #[error("header field is malformed or truncated")]
    MalformedField,
    /// An I/O error occurred while trying to read the input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The parser reached the end of the input before the end of the WARC header.
    #[error("input ended before end of header")]
    Truncated,
}

impl HeaderParseError {
    fn invalid_signature(sig_bytes: &[u8]) -> Self {
        HeaderParseError::InvalidSignature(String::from_utf8_lossy(sig_bytes).into_owned())
    }
}
