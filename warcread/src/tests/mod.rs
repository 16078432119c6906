use crate::{Header, HeaderParseError, Version};


#[test]
fn header_parse_round_trips_fields() {
    // "WARC/1.1" CRLF (=version)
    // named-field CRLF (=warc-fields)
    // CRLF
    let text = b"\
        WARC/1.1\r\n\
        WARC-Type: response\r\n\
        Content-Length: 123\r\n\
        \r\n\
    ";

    let header = Header::parse(&text[..]).expect("parse should succeed");
    assert_eq!(header.version(), &Version::WARC1_1);
    assert_eq!(header.warc_type(), Some("response"));
    assert_eq!(header.content_length(), Some(123));
}

#[test]
fn header_fields_are_case_insensitive() {
    let text = b"\
        WARC/1.0\r\n\
        coNTent-LENgth: 8\r\n\
        warc-tyPE: reVISit\r\n\
        \r\n\
    ";

    let header = Header::parse(&text[..]).expect("parse should succeed");
    assert_eq!(header.get_field("Content-Length"), Some("8"));
    assert_eq!(header.get_field("content-length"), Some("8"));
    // Values keep their case even though names don't care.
    assert_eq!(header.warc_type(), Some("reVISit"));
}

#[test]
fn header_continuation_lines_fold() {
    let text = b"\
        WARC/1.1\r\n\
        WARC-Target-URI: https://example.com/a\r\n\
        \tvery/long/path\r\n\
        \r\n\
    ";

    let header = Header::parse(&text[..]).expect("parse should succeed");
    assert_eq!(
        header.target_uri(),
        Some("https://example.com/avery/long/path")
    );
}

#[test]
fn header_uri_brackets_stripped() {
    let text = b"\
        WARC/1.0\r\n\
        WARC-Target-URI: <https://example.com/>\r\n\
        \r\n\
    ";

    let header = Header::parse(&text[..]).expect("parse should succeed");
    assert_eq!(header.target_uri(), Some("https://example.com/"));
}

#[test]
fn header_bad_signature_is_rejected() {
    let text = b"HTTP/1.1 200 OK\r\n\r\n";

    match Header::parse(&text[..]) {
        Err(HeaderParseError::InvalidSignature(_)) => {}
        other => panic!("expected InvalidSignature, got {:?}", other),
    }
}

#[test]
fn header_truncated_is_rejected() {
    let text = b"WARC/1.1\r\nContent-Length: 4\r\n";

    match Header::parse(&text[..]) {
        Err(HeaderParseError::Truncated) | Err(HeaderParseError::MalformedField) => {}
        other => panic!("expected truncation error, got {:?}", other),
    }
}

#[cfg(feature = "chrono")]
#[test]
fn header_date_parses_as_utc() {
    use chrono::{TimeZone, Utc};

    let text = b"\
        WARC/1.1\r\n\
        WARC-Date: 2023-02-22T12:00:00Z\r\n\
        \r\n\
    ";

    let header = Header::parse(&text[..]).expect("parse should succeed");
    assert_eq!(
        header.warc_date_parsed(),
        Some(Utc.with_ymd_and_hms(2023, 2, 22, 12, 0, 0).unwrap())
    );
}
