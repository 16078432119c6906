//! Shared helpers for end-to-end packaging tests: synthetic WARC builders
//! and a minimal STORE-only ZIP walker.
#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use waczpack::{Clock, PageIds};

pub const EXAMPLE_DATE: &str = "2023-02-22T12:00:00Z";

/// Serialize one WARC record with the given type, extra headers, and block.
pub fn warc_record(warc_type: &str, headers: &[(&str, &str)], block: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"WARC/1.0\r\n");
    out.extend_from_slice(format!("WARC-Type: {warc_type}\r\n").as_bytes());
    for (name, value) in headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", block.len()).as_bytes());
    out.extend_from_slice(block);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// An HTTP response block: status line, Content-Type header, body.
pub fn http_response(status: u16, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status} OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// A response record for `url` captured at [`EXAMPLE_DATE`].
pub fn response_record(url: &str, record_id: &str, status: u16, mime: &str, body: &[u8]) -> Vec<u8> {
    warc_record(
        "response",
        &[
            ("WARC-Record-ID", &format!("<{record_id}>")),
            ("WARC-Target-URI", url),
            ("WARC-Date", EXAMPLE_DATE),
            ("Content-Type", "application/http;msgtype=response"),
        ],
        &http_response(status, mime, body),
    )
}

/// A request record paired to a response via WARC-Concurrent-To.
pub fn request_record(url: &str, method: &str, concurrent_to: &str) -> Vec<u8> {
    let block = format!("{method} / HTTP/1.1\r\nHost: example.com\r\n\r\n");
    warc_record(
        "request",
        &[
            ("WARC-Record-ID", "<urn:uuid:req>"),
            ("WARC-Target-URI", url),
            ("WARC-Date", EXAMPLE_DATE),
            ("WARC-Concurrent-To", &format!("<{concurrent_to}>")),
            ("Content-Type", "application/http;msgtype=request"),
        ],
        block.as_bytes(),
    )
}

/// A bare warcinfo record.
pub fn warcinfo_record() -> Vec<u8> {
    warc_record(
        "warcinfo",
        &[
            ("WARC-Record-ID", "<urn:uuid:info>"),
            ("WARC-Date", EXAMPLE_DATE),
            ("Content-Type", "application/warc-fields"),
        ],
        b"software: test-fixture\r\n",
    )
}

/// Frame each record as its own gzip member, concatenated.
pub fn gzip_members(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(record).unwrap();
        out.extend_from_slice(&encoder.finish().unwrap());
    }
    out
}

/// Walk a STORE-only ZIP produced by the packager, returning entries in
/// archive order.
pub fn read_zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    fn le16(bytes: &[u8], at: usize) -> usize {
        u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
    }
    fn le32(bytes: &[u8], at: usize) -> usize {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
    }

    let mut entries = Vec::new();
    let mut at = 0;
    while at + 30 <= bytes.len() && le32(bytes, at) == 0x0403_4b50 {
        let size = le32(bytes, at + 18);
        let name_len = le16(bytes, at + 26);
        let extra_len = le16(bytes, at + 28);
        let name = String::from_utf8(bytes[at + 30..at + 30 + name_len].to_vec()).unwrap();
        let data_at = at + 30 + name_len + extra_len;
        entries.push((name, bytes[data_at..data_at + size].to_vec()));
        at = data_at + size;
    }
    entries
}

/// Look up one entry's content by name.
pub fn zip_entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> &'a [u8] {
    &entries
        .iter()
        .find(|(entry_name, _)| entry_name == name)
        .unwrap_or_else(|| panic!("no entry named {name}"))
        .1
}

/// A clock pinned to [`EXAMPLE_DATE`].
pub struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 2, 22, 12, 0, 0).unwrap()
    }
}

/// Sequential 32-hex page identifiers.
#[derive(Default)]
pub struct SeqIds(AtomicU64);

impl PageIds for SeqIds {
    fn next_id(&self) -> String {
        format!("{:032x}", self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A fresh deterministic (clock, ids) pair for reproducible bundles.
pub fn deterministic_seams() -> (Arc<FixedClock>, Arc<SeqIds>) {
    (Arc::new(FixedClock), Arc::new(SeqIds::default()))
}
