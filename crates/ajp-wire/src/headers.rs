//! Well-known header codes
//!
//! Common header names travel as a 2-byte code whose high byte is `0xA0`.
//! Requests and responses use two independent tables; the same code means a
//! different header in each direction.

/// High byte marking a 16-bit value as a header code
pub const HEADER_CODE_MARKER: u16 = 0xA000;

/// Request headers with a code, matched case-sensitively; code is `0xA001 + index`
pub const REQUEST_HEADERS: [&str; 14] = [
    "accept",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "authorization",
    "connection",
    "content-type",
    "content-length",
    "cookie",
    "cookie2",
    "host",
    "pragma",
    "referer",
    "user-agent",
];

/// Response headers with a code; code is `0xA001 + index`
pub const RESPONSE_HEADERS: [&str; 11] = [
    "Content-Type",
    "Content-Language",
    "Content-Length",
    "Date",
    "Last-Modified",
    "Location",
    "Set-Cookie",
    "Set-Cookie2",
    "Servlet-Engine",
    "Status",
    "WWW-Authenticate",
];

/// Whether a peeked 16-bit value is a header code rather than a string length
#[must_use]
pub const fn is_header_code(value: u16) -> bool {
    value & 0xFF00 == HEADER_CODE_MARKER
}

fn code_for(table: &[&str], name: &str) -> Option<u16> {
    table
        .iter()
        .position(|&known| known == name)
        .map(|i| HEADER_CODE_MARKER + 1 + i as u16)
}

fn name_for(table: &'static [&'static str], code: u16) -> Option<&'static str> {
    if !is_header_code(code) {
        return None;
    }
    let index = usize::from(code & 0x00FF).checked_sub(1)?;
    table.get(index).copied()
}

/// Code for a request header name
#[must_use]
pub fn request_header_code(name: &str) -> Option<u16> {
    code_for(&REQUEST_HEADERS, name)
}

/// Request header name for a code
#[must_use]
pub fn request_header_name(code: u16) -> Option<&'static str> {
    name_for(&REQUEST_HEADERS, code)
}

/// Code for a response header name
#[must_use]
pub fn response_header_code(name: &str) -> Option<u16> {
    code_for(&RESPONSE_HEADERS, name)
}

/// Response header name for a code
#[must_use]
pub fn response_header_name(code: u16) -> Option<&'static str> {
    name_for(&RESPONSE_HEADERS, code)
}
