//! Page detection and the `pages/pages.jsonl` listing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::PageIds;

/// Header line opening `pages/pages.jsonl`, byte-exact.
pub const PAGES_HEADER: &str =
    "{\"format\": \"json-pages-1.0\", \"id\": \"pages\", \"title\": \"All Pages\"}\n";

/// How much of a decoded body is examined for a `<title>` element.
pub const TITLE_SCAN_LIMIT: usize = 128 * 1024;

/// A detected or manually added page, before an identifier is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub url: String,
    pub title: Option<String>,
    pub ts: Option<DateTime<Utc>>,
}

/// One line of `pages.jsonl`.
#[derive(Debug, Serialize)]
struct PageEntry<'a> {
    id: String,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<String>,
}

/// Decide whether a response qualifies as a page.
///
/// A page is a successful HTML response that a browser address bar would have
/// displayed: 2xx status, `text/html` content type, fetched with `GET` (or a
/// method we never learned, when the request record is absent).
pub fn qualifies(status: u16, content_type: Option<&str>, method: Option<&str>) -> bool {
    if !(200..300).contains(&status) {
        return false;
    }
    if !content_type.is_some_and(|ct| ct.starts_with("text/html")) {
        return false;
    }
    match method {
        None => true,
        Some(m) => m.eq_ignore_ascii_case("GET"),
    }
}

/// Extract the first `<title>…</title>` from a body prefix, best-effort.
///
/// Matching is ASCII case-insensitive; surrounding and internal whitespace is
/// collapsed. Empty titles yield `None`.
pub fn extract_title(body: &[u8]) -> Option<String> {
    let scan = &body[..body.len().min(TITLE_SCAN_LIMIT)];
    let lower: Vec<u8> = scan.iter().map(u8::to_ascii_lowercase).collect();

    let open = memchr::memmem::find(&lower, b"<title")?;
    let after_tag = open + memchr::memchr(b'>', &lower[open..])? + 1;
    let close = after_tag + memchr::memmem::find(&lower[after_tag..], b"</title")?;

    let raw = String::from_utf8_lossy(&scan[after_tag..close]);
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Serialize pages as JSONL: the fixed header line, then one object per page
/// in the order given (callers pass them already sorted by URL).
///
/// Identifiers are drawn from the injected generator here, at emission, so a
/// deterministic generator yields deterministic output bytes.
pub fn to_jsonl<'a, I>(pages: I, ids: &dyn PageIds) -> Vec<u8>
where
    I: IntoIterator<Item = &'a PageInfo>,
{
    let mut out = Vec::new();
    out.extend_from_slice(PAGES_HEADER.as_bytes());
    for page in pages {
        let entry = PageEntry {
            id: ids.next_id(),
            url: &page.url,
            title: page.title.as_deref(),
            ts: page
                .ts
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        };
        // PageEntry contains only JSON-representable fields.
        if let Ok(line) = serde_json::to_string(&entry) {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
    }
    out
}
