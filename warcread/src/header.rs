use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io::BufRead;
use std::str::{self, FromStr};

use lazy_static::lazy_static;
use log::{debug, trace};
use regex::bytes::Regex;
use uncased::{AsUncased, UncasedStr};

use crate::HeaderParseError;

/// The name of a WARC header field.
///
/// Field names are case-insensitive, so the [`Eq`], [`Ord`] and [`Hash`]
/// implementations for this type are all case-insensitive. Unrecognized names
/// preserve their case when converted back to strings but still compare
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct FieldName(Box<str>);

impl FieldName {
    /// The string representation of this field name, as parsed.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldName {
    fn from(s: &str) -> Self {
        FieldName(s.into())
    }
}

impl From<String> for FieldName {
    fn from(s: String) -> Self {
        FieldName(s.into())
    }
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<UncasedStr> for FieldName {
    fn borrow(&self) -> &UncasedStr {
        self.0.as_uncased()
    }
}

// Implementing Borrow requires the same semantics between the borrowed and
// original versions, so Eq, Ord and Hash are all implemented in terms of the
// case-insensitive name.
impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_uncased().eq(other.0.as_uncased())
    }
}

impl Eq for FieldName {}

impl PartialOrd for FieldName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_uncased().cmp(other.0.as_uncased())
    }
}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_uncased().hash(state)
    }
}

/// The version of a WARC record.
///
/// Versions 0.9, 1.0 and 1.1 are all well-known, corresponding to the IIPC
/// draft WARC specification, ISO 28500 and ISO 28500:2016, respectively.
///
/// No particular value for the version is assumed, just that one is specified.
/// Users should validate the version number if desired (such as to ignore
/// records with newer versions).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Version {
    /// The integer part of the version number.
    ///
    /// In '12.345', this is 12.
    pub major: u32,
    /// The fractional part of the version number.
    ///
    /// In '12.345', this is 345.
    pub minor: u32,
}

impl Version {
    /// WARC 1.0: ISO 28500:2009
    pub const WARC1_0: Self = Version { major: 1, minor: 0 };
    /// WARC 1.1: ISO 28500:2017
    pub const WARC1_1: Self = Version { major: 1, minor: 1 };

    /// Parse the version line from a record header, returning the number of
    /// bytes consumed and the version.
    pub fn parse(bytes: &[u8]) -> Result<(usize, Version), HeaderParseError> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^WARC/(\d+)\.(\d+)\r\n").expect("Version regex invalid");
        }
        fn bytes_to_u32(bytes: &[u8]) -> Result<u32, HeaderParseError> {
            match str::from_utf8(bytes).map(u32::from_str) {
                Ok(Ok(x)) => Ok(x),
                Err(_) | Ok(Err(_)) => Err(HeaderParseError::invalid_signature(bytes)),
            }
        }

        match RE.captures(bytes) {
            None => {
                let prefix = &bytes[..bytes.len().min(16)];
                Err(HeaderParseError::invalid_signature(prefix))
            }
            Some(m) => {
                let version = Version {
                    major: bytes_to_u32(&m[1])?,
                    minor: bytes_to_u32(&m[2])?,
                };
                let bytes_consumed = m[0].len();

                Ok((bytes_consumed, version))
            }
        }
    }
}

/// A header field.
///
/// The name of a field is case-insensitive, and its value may be any bytes.
///
/// This type is a convenience for parsing; actual header fields are stored in
/// a map inside the record header.
#[derive(Debug, PartialEq, Eq)]
struct Field {
    name: FieldName,
    value: Vec<u8>,
}

impl Field {
    fn new(name: &str, value: Vec<u8>) -> Field {
        Field {
            name: name.into(),
            value,
        }
    }

    /// Parse a Field from bytes.
    ///
    /// Returns the number of bytes consumed and the parsed field on success.
    fn parse(bytes: &[u8]) -> Result<(usize, Field), HeaderParseError> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^([a-zA-Z_\-]+): *(.*?)\r\n").expect("Field regex invalid");
            static ref CONTINUATION: Regex =
                Regex::new(r"^[ \t]+(.*?)\r\n").expect("Continuation regex invalid");
        }

        let m = match RE.captures(bytes) {
            None => {
                debug!("Header regex did not match");
                return Err(HeaderParseError::MalformedField);
            }
            Some(c) => c,
        };
        // The name pattern admits only ASCII, so the lossy conversion never
        // actually rewrites anything.
        debug_assert!(m[1].iter().all(u8::is_ascii));
        let name = String::from_utf8_lossy(&m[1]);
        let mut bytes_taken = m[0].len();
        let mut value: Vec<u8> = m[2].to_owned();

        // Fold LWS continuation lines into the value.
        while let Some(m) = CONTINUATION.captures(&bytes[bytes_taken..]) {
            trace!("folding continuation line {:?}", m);
            value.extend(&m[1]);
            bytes_taken += m[0].len();
        }

        trace!("Got header {}: {:?}", name, value);
        Ok((bytes_taken, Field::new(name.as_ref(), value)))
    }
}

/// The header of a WARC record.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Header {
    version: Version,
    fields: HashMap<FieldName, Vec<u8>>,
}

impl Header {
    /// Parse a header from bytes.
    ///
    /// The input must contain the complete header block, terminated by an
    /// empty line (`\r\n`).
    pub fn parse(mut bytes: &[u8]) -> Result<Header, HeaderParseError> {
        // version, fields, CRLF
        let (mut bytes_consumed, version) = Version::parse(bytes)?;
        bytes = &bytes[bytes_consumed..];

        let mut fields = HashMap::new();
        loop {
            match bytes.get(..2) {
                Some([b'\r', b'\n']) => break,
                Some(_) => {}
                None => return Err(HeaderParseError::Truncated),
            }
            let (n, field) = Field::parse(bytes)?;
            bytes_consumed += n;
            bytes = &bytes[n..];
            fields.insert(field.name, field.value);
        }

        Ok(Header { version, fields })
    }

    /// The WARC version this record declares.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Get the value of a header field as bytes, or None if no such header exists.
    ///
    /// Although the WARC specification does not permit values that are not also
    /// valid Rust strings, users that wish to be lenient in accepting malformed
    /// records may relax that requirement by using this function.
    pub fn get_field_bytes<F: AsUncased>(&self, field: F) -> Option<&[u8]> {
        self.fields.get(field.as_uncased()).map(Vec::as_slice)
    }

    /// Get the value of a header field, or None if it does not exist or is not
    /// a valid Rust string.
    pub fn get_field<F: AsUncased>(&self, field: F) -> Option<&str> {
        str::from_utf8(self.get_field_bytes(field)?).ok()
    }

    /// Get the value of a header field that is a URI as a string.
    ///
    /// This handles the difference between the definition of a URI in the WARC
    /// 1.0 and WARC 1.1 standards, where the former specifies angle brackets
    /// (<>) around the URI and the latter doesn't, by stripping the brackets
    /// if present.
    pub fn field_uri<F: AsUncased>(&self, field: F) -> Option<&str> {
        let s = self.get_field(field)?;
        // Trim brackets only if both are present; preserve weird (unmatched)
        // brackets.
        Some(
            s.strip_prefix('<')
                .and_then(|s| s.strip_suffix('>'))
                .unwrap_or(s),
        )
    }

    /// Get the WARC-Record-ID field value.
    ///
    /// Returns `None` if the field is absent or is not a valid `str`.
    ///
    /// This is a mandatory field, but in the interest of parsing leniency it
    /// is not required to exist or have any particular value in order to parse
    /// a record header.
    pub fn record_id(&self) -> Option<&str> {
        self.get_field("WARC-Record-ID")
    }

    /// Get the Content-Length field value.
    ///
    /// Returns `None` if the field is absent or does not represent a valid
    /// content length.
    pub fn content_length(&self) -> Option<u64> {
        self.get_field("Content-Length")
            .and_then(|s| str::parse::<u64>(s).ok())
    }

    /// Get the WARC-Type field value.
    ///
    /// The WARC specification non-exhaustively defines the types `warcinfo`,
    /// `response`, `resource`, `request`, `metadata`, `revisit`, `conversion`
    /// and `continuation`; additional types are permitted as extensions.
    pub fn warc_type(&self) -> Option<&str> {
        self.get_field("WARC-Type")
    }

    /// Get the WARC-Date field value as a string.
    pub fn warc_date(&self) -> Option<&str> {
        self.get_field("WARC-Date")
    }

    /// Get the WARC-Date field value, parsed as a `DateTime`.
    ///
    /// YYYY-MM-DDThh:mm:ssZ per WARC-1.0 is valid RFC 3339, which is itself
    /// valid ISO 8601. This is slightly lenient in accepting non-UTC zone
    /// offsets.
    #[cfg(feature = "chrono")]
    pub fn warc_date_parsed(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        use chrono::{DateTime, Utc};
        self.warc_date()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Get the WARC-Target-URI field value, with angle brackets stripped if
    /// present.
    pub fn target_uri(&self) -> Option<&str> {
        self.field_uri("WARC-Target-URI")
    }

    /// Get the WARC-Payload-Digest field value (a `labelled-digest` such as
    /// `sha1:3I42H3S6...`).
    pub fn payload_digest(&self) -> Option<&str> {
        self.get_field("WARC-Payload-Digest")
    }

    /// Get the Content-Type field value of the record block itself.
    pub fn content_type(&self) -> Option<&str> {
        self.get_field("Content-Type")
    }
}

/// Parse a WARC record header out of the provided `BufRead`.
///
/// Consumes the bytes that are parsed, leaving the reader at the beginning of
/// the record payload. In case of an error in parsing, some or all of the
/// input may be consumed.
pub fn get_record_header<R: BufRead>(mut reader: R) -> Result<Header, HeaderParseError> {
    const TERMINATOR: &[u8] = b"\r\n\r\n";

    /// Find where the header block ends (one past the blank line), searching
    /// no earlier than `from` minus a few bytes so a terminator straddling
    /// two chunks is still caught.
    fn header_end(buf: &[u8], from: usize) -> Option<usize> {
        use memchr::memmem::Finder;
        lazy_static! {
            static ref SEARCHER: Finder<'static> = Finder::new(b"\r\n\r\n");
        }

        let from = from.saturating_sub(TERMINATOR.len() - 1);
        SEARCHER
            .find(&buf[from..])
            .map(|i| from + i + TERMINATOR.len())
    }

    // Headers are small, so the reader's current buffer usually holds the
    // whole block and it can be parsed right out of that borrow. The consume
    // has to wait until the parse result no longer references the buffer.
    let in_place = {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Err(HeaderParseError::Truncated);
        }
        header_end(buf, 0).map(|end| Header::parse(&buf[..end]).map(|header| (header, end)))
    };
    if let Some(parsed) = in_place {
        let (header, end) = parsed?;
        trace!("header fit in a single buffered chunk, {} bytes", end);
        reader.consume(end);
        return Ok(header);
    }

    // The block spans several buffered chunks. Append the reader's chunks to
    // an owned copy, consuming each one once it has been searched; when the
    // terminator finally lands inside the freshest (still unconsumed) chunk,
    // take only that chunk's header portion so the payload stays buffered,
    // then parse the copy.
    let mut owned: Vec<u8> = Vec::new();
    loop {
        let chunk_start = owned.len();
        let chunk_len = {
            let chunk = reader.fill_buf()?;
            if chunk.is_empty() {
                return Err(HeaderParseError::Truncated);
            }
            owned.extend_from_slice(chunk);
            chunk.len()
        };

        if let Some(end) = header_end(&owned, chunk_start) {
            reader.consume(end - chunk_start);
            return Header::parse(&owned[..end]);
        }
        reader.consume(chunk_len);
    }
}
