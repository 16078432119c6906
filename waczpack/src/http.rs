//! Minimal parsing of HTTP message heads embedded in WARC record blocks.
//!
//! Response and revisit records carry a full HTTP message as their payload;
//! the index needs its status code and Content-Type, and page detection needs
//! the method of the paired request. Only the head is parsed; the entity body
//! stays in the record stream for the caller.

use std::io::BufRead;

use memchr::memmem;

/// Upper bound on the bytes examined for an HTTP head.
///
/// A head that has not terminated within this window is treated as absent.
const MAX_HEAD_LEN: usize = 64 * 1024;

/// The parsed head of an HTTP response message.
#[derive(Debug, Default, Clone)]
pub struct ResponseHead {
    /// Status code from the status line, 0 when unparseable.
    pub status: u16,
    /// Content-Type value, without parameters.
    pub content_type: Option<String>,
}

/// Read an HTTP response head from the start of a record payload.
///
/// Consumes the head, including its terminating blank line, from the reader;
/// the reader is left positioned at the entity body. Returns `None` when the
/// payload does not look like an HTTP message.
pub fn read_response_head<R: BufRead>(reader: &mut R) -> std::io::Result<Option<ResponseHead>> {
    let raw = match read_head_bytes(reader)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let text = String::from_utf8_lossy(&raw);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or("");
    if !status_line.starts_with("HTTP/") {
        return Ok(None);
    }
    let status = status_line
        .split_ascii_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(0);

    let mut content_type = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-type") {
                let value = value.trim();
                let bare = value.split(';').next().unwrap_or(value).trim();
                if !bare.is_empty() {
                    content_type = Some(bare.to_owned());
                }
                break;
            }
        }
    }

    Ok(Some(ResponseHead {
        status,
        content_type,
    }))
}

/// Read the method from an HTTP request head at the start of a record payload.
///
/// Returns `None` when the payload does not look like an HTTP request.
pub fn read_request_method<R: BufRead>(reader: &mut R) -> std::io::Result<Option<String>> {
    let raw = match read_head_bytes(reader)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let text = String::from_utf8_lossy(&raw);
    let request_line = text.split("\r\n").next().unwrap_or("");

    let mut parts = request_line.split_ascii_whitespace();
    let method = match parts.next() {
        Some(m) if !m.is_empty() => m,
        _ => return Ok(None),
    };
    // "GET /path HTTP/1.1": require the trailing version to avoid treating
    // arbitrary binary as a request.
    match parts.nth(1) {
        Some(version) if version.starts_with("HTTP/") => Ok(Some(method.to_ascii_uppercase())),
        _ => Ok(None),
    }
}

/// Pull bytes up to and including the `\r\n\r\n` head terminator.
fn read_head_bytes<R: BufRead>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut head: Vec<u8> = Vec::new();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(None);
        }

        let search_from = head.len().saturating_sub(3);
        head.extend_from_slice(available);
        let take = available.len();

        if let Some(i) = memmem::find(&head[search_from..], b"\r\n\r\n") {
            let end = search_from + i + 4;
            // Give back the bytes that belong to the entity body.
            let overshoot = head.len() - end;
            reader.consume(take - overshoot);
            head.truncate(end);
            return Ok(Some(head));
        }

        reader.consume(take);
        if head.len() > MAX_HEAD_LEN {
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{read_request_method, read_response_head};

    #[test]
    fn response_head_parses_status_and_mime() {
        let mut input = Cursor::new(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<html>".to_vec(),
        );
        let head = read_response_head(&mut input).unwrap().expect("head");
        assert_eq!(head.status, 200);
        assert_eq!(head.content_type.as_deref(), Some("text/html"));

        // Reader is left at the body.
        let mut body = Vec::new();
        std::io::Read::read_to_end(&mut input, &mut body).unwrap();
        assert_eq!(body, b"<html>");
    }

    #[test]
    fn non_http_payload_is_rejected() {
        let mut input = Cursor::new(b"%PDF-1.4 garbage\r\n\r\n".to_vec());
        assert!(read_response_head(&mut input).unwrap().is_none());
    }

    #[test]
    fn request_method_is_uppercased() {
        let mut input = Cursor::new(b"get /index.html HTTP/1.1\r\nHost: a\r\n\r\n".to_vec());
        assert_eq!(
            read_request_method(&mut input).unwrap().as_deref(),
            Some("GET")
        );
    }

    #[test]
    fn request_without_version_is_rejected() {
        let mut input = Cursor::new(b"HELLO WORLD\r\n\r\n".to_vec());
        assert_eq!(read_request_method(&mut input).unwrap(), None);
    }
}
