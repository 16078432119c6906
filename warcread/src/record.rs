//! Operations on complete WARC records.

use std::cmp;
use std::io::{self, BufRead, BufReader, Read};

use flate2::bufread::GzDecoder;
use log::trace;
use thiserror::Error;

use crate::header::get_record_header;
use crate::{Compression, Header, HeaderParseError};

/// Chunk size used to step over unread payload when a record is closed.
const SKIP_BUF_LEN: usize = 4096;

/// An error in reading a record from an input stream.
#[derive(Debug, Error)]
pub enum InvalidRecord {
    /// The header of the record was malformed.
    ///
    /// Often a sign that the input is not a WARC file at all.
    #[error("record header is not valid: {0}")]
    InvalidHeader(#[source] HeaderParseError),
    /// The length of the payload could not be determined.
    ///
    /// Contained value is the contents of the Content-Length header.
    #[error("Content-Length is not a valid integer (contained bytes {0:?})")]
    UnknownLength(Option<Vec<u8>>),
    /// Reached the end of the input stream.
    #[error("unexpected end of input")]
    EndOfStream,
    /// Other I/O error.
    #[error("I/O error")]
    Io(#[source] io::Error),
}

impl From<HeaderParseError> for InvalidRecord {
    fn from(e: HeaderParseError) -> Self {
        match e {
            HeaderParseError::Io(e) => InvalidRecord::Io(e),
            HeaderParseError::Truncated => InvalidRecord::EndOfStream,
            e => InvalidRecord::InvalidHeader(e),
        }
    }
}

/// Errors that might occur when closing a record.
#[derive(Debug, Error)]
pub enum FinishError {
    /// The record tail (CRLF CRLF) was not present.
    ///
    /// This may be because the record is malformed and lacks the tail, or the
    /// input is truncated.
    #[error("missing record tail")]
    MissingTail,
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A `BufRead` adapter that counts the bytes consumed from the underlying
/// stream.
///
/// All reads from a record, compressed or not, pass through this adapter, so
/// its count is always a position in the file as it exists on disk. That is
/// the position a CDX-style index must record.
#[derive(Debug)]
struct CountingBuf<R> {
    inner: R,
    consumed: u64,
}

impl<R> CountingBuf<R> {
    fn new(inner: R) -> Self {
        CountingBuf { inner, consumed: 0 }
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: BufRead> Read for CountingBuf<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = {
            let src = self.inner.fill_buf()?;
            let n = cmp::min(src.len(), out.len());
            out[..n].copy_from_slice(&src[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingBuf<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, n: usize) {
        self.inner.consume(n);
        self.consumed += n as u64;
    }
}

/// Where a record's bytes come from: directly from the file, or through a
/// decoder over the current gzip member.
enum RecordSource<'a, R: BufRead> {
    Plain(&'a mut CountingBuf<R>),
    Gzip(BufReader<GzDecoder<&'a mut CountingBuf<R>>>),
}

impl<R: BufRead> Read for RecordSource<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            RecordSource::Plain(r) => r.read(buf),
            RecordSource::Gzip(r) => r.read(buf),
        }
    }
}

impl<R: BufRead> BufRead for RecordSource<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            RecordSource::Plain(r) => r.fill_buf(),
            RecordSource::Gzip(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            RecordSource::Plain(r) => r.consume(amt),
            RecordSource::Gzip(r) => r.consume(amt),
        }
    }
}

/// Reads the records of a WARC file in sequence.
///
/// For gzip-framed input every record is decoded from its own gzip member;
/// [`RecordReader::next_record`] notes where each member starts and
/// [`Record::finish`] reports how many compressed bytes it occupied, so
/// callers can build indexes that address members directly.
pub struct RecordReader<R: BufRead> {
    input: CountingBuf<R>,
    compression: Compression,
}

impl<R: BufRead> RecordReader<R> {
    /// Construct a reader over an input stream with the given compression mode.
    pub fn new(input: R, compression: Compression) -> Self {
        RecordReader {
            input: CountingBuf::new(input),
            compression,
        }
    }

    /// The current byte position in the underlying (possibly compressed)
    /// stream.
    pub fn position(&self) -> u64 {
        self.input.consumed()
    }

    /// Read the next record from the input.
    ///
    /// Returns `Ok(None)` at a clean end of input. The returned record
    /// borrows this reader; call [`Record::finish`] to advance past the
    /// record before requesting another.
    pub fn next_record(&mut self) -> Result<Option<Record<'_, R>>, InvalidRecord> {
        match self.input.fill_buf() {
            Ok(buf) if buf.is_empty() => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(InvalidRecord::Io(e)),
        }

        let member_offset = self.input.consumed();
        let mut source = match self.compression {
            Compression::None => RecordSource::Plain(&mut self.input),
            Compression::Gzip => {
                RecordSource::Gzip(BufReader::new(GzDecoder::new(&mut self.input)))
            }
        };

        let header = get_record_header(&mut source)?;
        let len = match header.content_length() {
            None => {
                return Err(InvalidRecord::UnknownLength(
                    header
                        .get_field_bytes("Content-Length")
                        .map(|bytes| bytes.to_vec()),
                ));
            }
            Some(n) => n,
        };

        Ok(Some(Record {
            header,
            content_length: len,
            bytes_remaining: len,
            member_offset,
            source,
        }))
    }
}

/// A streaming WARC record.
///
/// The header of the record is accessible via the [`Self::header`] field, and
/// its payload is accessible through the [`Read`] impl.
///
/// When done reading the payload, call [`Self::finish`] to advance the
/// underlying reader past this record; it consumes the record tail, drains the
/// rest of the enclosing gzip member for compressed input, and reports the
/// member's compressed length. A record that is dropped without `finish`
/// leaves the input mid-record, and the reader it came from must not be used
/// further.
pub struct Record<'a, R: BufRead> {
    /// The parsed record header.
    pub header: Header,
    /// The record Content-Length in bytes.
    content_length: u64,
    /// The number of bytes left to read in the record body.
    bytes_remaining: u64,
    /// Offset of the enclosing gzip member (or of the record itself for plain
    /// input) in the underlying stream.
    member_offset: u64,
    source: RecordSource<'a, R>,
}

/// Reads are clamped to the record's declared Content-Length.
impl<R: BufRead> Read for Record<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let constrained = if (buf.len() as u64) > self.bytes_remaining {
            &mut buf[..self.bytes_remaining as usize]
        } else {
            buf
        };

        let n = self.source.read(constrained)?;
        self.bytes_remaining -= n as u64;
        Ok(n)
    }
}

/// Buffered access to the body, clamped the same way, so callers can digest
/// chunks without copying them out first.
impl<R: BufRead> BufRead for Record<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let buf = self.source.fill_buf()?;
        let remaining = self.bytes_remaining as usize;
        let out = if buf.len() > remaining {
            &buf[..remaining]
        } else {
            buf
        };

        debug_assert!(out.len() <= remaining);
        Ok(out)
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n as u64 <= self.bytes_remaining);
        self.source.consume(n);
        self.bytes_remaining -= n as u64;
    }
}

impl<R: BufRead> Record<'_, R> {
    /// Get the expected length of the record body.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.content_length
    }

    /// Offset of the enclosing gzip member in the underlying stream.
    ///
    /// For uncompressed input this is the offset of the record header.
    pub fn member_offset(&self) -> u64 {
        self.member_offset
    }

    /// Advance the input reader past this record and return the number of
    /// compressed bytes the record occupied in the underlying stream.
    ///
    /// Finishing is mandatory before asking the reader for another record:
    /// it skips whatever payload was left unread and checks the standard's
    /// closing CRLF pair, reporting `FinishError::MissingTail` when the tail
    /// is absent or the input stops short.
    pub fn finish(mut self) -> Result<u64, FinishError> {
        let mut buf = [0u8; SKIP_BUF_LEN];
        while self.bytes_remaining > 0 {
            let n = cmp::min(buf.len() as u64, self.bytes_remaining) as usize;
            self.source.read_exact(&mut buf[..n])?;
            self.bytes_remaining -= n as u64;
        }

        {
            let mut tail = [0u8; 4];
            if let Err(e) = self.source.read_exact(&mut tail[..]) {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    return Err(FinishError::MissingTail);
                }
                return Err(e.into());
            }

            if &tail[..] != b"\r\n\r\n" {
                return Err(FinishError::MissingTail);
            }
        }

        // A compressed member must also be decoded to exhaustion before the
        // next record can start: the decoder only passes its 8-byte trailer
        // once it reports EOF, and the compressed length returned below has
        // to cover the member in full.
        let counting = match self.source {
            RecordSource::Plain(input) => input,
            RecordSource::Gzip(mut decoder) => {
                loop {
                    let n = decoder.fill_buf()?.len();
                    if n == 0 {
                        break;
                    }
                    trace!("draining {} leftover byte(s) from gzip member", n);
                    decoder.consume(n);
                }
                decoder.into_inner().into_inner()
            }
        };

        Ok(counting.consumed() - self.member_offset)
    }
}
