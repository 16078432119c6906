//! Handling of record compression.
//!
//! WARC files can be compressed, but the structure of the compressed data must
//! be managed to ensure a record can be accessed without decompressing every
//! previous one in a file. In general, records are individually compressed as
//! independent gzip members: provided the file offset of a compressed record
//! is known, a reading tool can decode that record alone.

use std::io::{BufRead, Result as IoResult};
use std::path::Path;

/// The two-byte magic number that opens every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The supported methods of compressing a single [`Record`](crate::Record).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Compression {
    /// Uncompressed records.
    None,
    /// One gzip member per record.
    Gzip,
}

impl Compression {
    /// Return the best guess of compression for a file with the given name.
    ///
    /// A file that may be present is not accessed in any way; only the path is
    /// used to guess based on the name.
    ///
    /// ```
    /// # use warcread::Compression;
    /// assert_eq!(Compression::guess_for_filename("test.warc.gz"), Compression::Gzip);
    /// ```
    pub fn guess_for_filename<P: AsRef<Path>>(path: P) -> Compression {
        match path.as_ref().extension() {
            Some(ext) if ext == "gz" => Compression::Gzip,
            _ => Compression::None,
        }
    }

    /// Detect compression from the stream contents by peeking for the gzip
    /// magic bytes (`1F 8B`).
    ///
    /// Nothing is consumed from the input. A stream too short to carry the
    /// magic is reported as uncompressed and will fail later, when parsed.
    pub fn detect<R: BufRead>(input: &mut R) -> IoResult<Compression> {
        let buf = input.fill_buf()?;
        Ok(if buf.starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else {
            Compression::None
        })
    }
}
