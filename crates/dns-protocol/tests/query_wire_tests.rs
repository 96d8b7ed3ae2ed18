//! Input lines through to wire bytes.
//!
//! These tests use only the public API and check full message layouts.

use dns_protocol::{Question, ResponseCode, ResponseHeader, HEADER_LEN};

// ============================================================================
// Plain queries
// ============================================================================

#[test]
fn test_line_to_wire_plain() {
    let question = Question::parse_line("www.example.org AAAA").unwrap().unwrap();
    let wire = question.encode(0xBEEF).unwrap();

    let expected: &[u8] = &[
        0xBE, 0xEF, // ID
        0x01, 0x00, // RD
        0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // counts
        3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'o', b'r', b'g',
        0, // root
        0x00, 0x1C, // AAAA
        0x00, 0x01, // IN
    ];
    assert_eq!(&wire[..], expected);
}

#[test]
fn test_unknown_type_code_round_trips_through_line() {
    let question = Question::parse_line("example.com TYPE65280").unwrap().unwrap();
    let wire = question.encode(1).unwrap();

    let qtype = &wire[wire.len() - 4..wire.len() - 2];
    assert_eq!(qtype, &[0xFF, 0x00]);
    assert_eq!(question.to_string(), "example.com. TYPE65280");
}

// ============================================================================
// Client subnet
// ============================================================================

#[test]
fn test_line_to_wire_ipv6_subnet() {
    let question = Question::parse_line("example.com A 2001:db8:abcd::/36")
        .unwrap()
        .unwrap();
    let wire = question.encode(7).unwrap();

    // ARCOUNT carries the OPT record.
    assert_eq!(&wire[10..12], &[0x00, 0x01]);

    let question_len = 1 + 7 + 1 + 3 + 1 + 4;
    let opt = &wire[HEADER_LEN + question_len..];
    let expected: &[u8] = &[
        0, // root owner
        0x00, 0x29, // OPT
        0x04, 0xD0, // 1232-byte UDP payload
        0, 0, 0, 0, // ext RCODE, version, flags
        0x00, 0x0D, // RDLEN
        0x00, 0x08, // CLIENT-SUBNET
        0x00, 0x09, // option length
        0x00, 0x02, // IPv6
        36, 0, // source, scope prefix
        0x20, 0x01, 0x0D, 0xB8, 0xA0, // 36 bits, trailing nibble zeroed
    ];
    assert_eq!(opt, expected);
}

#[test]
fn test_zero_prefix_subnet_sends_no_address() {
    let question = Question::parse_line("example.com A 0.0.0.0/0").unwrap().unwrap();
    let wire = question.encode(7).unwrap();

    // Option header only: family, source prefix, scope prefix.
    assert_eq!(&wire[wire.len() - 4..], &[0x00, 0x01, 0, 0]);
}

// ============================================================================
// Responses
// ============================================================================

#[test]
fn test_echoed_query_as_response() {
    let question: Question = "example.com MX".parse().unwrap();
    let mut response = question.encode(0x1234).unwrap().to_vec();
    response[2] |= 0x80; // QR
    response[3] |= 0x05; // REFUSED

    let header = ResponseHeader::parse(&response).unwrap();
    assert_eq!(header.id, 0x1234);
    assert!(header.is_response());
    assert!(!header.is_truncated());
    assert_eq!(header.qdcount, 1);
    assert_eq!(header.response_code(), ResponseCode::REFUSED);
}
