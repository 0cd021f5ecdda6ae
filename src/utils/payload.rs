//! Diagnostic pretty-printer for relayed traffic.
//!
//! Classifies a byte chunk as TLS, HTTP, an SSH banner, plain text or binary
//! and renders a one-line human description. Not on the data path: the relay
//! calls it only when DEBUG logging is enabled.

/// Describe an observed payload chunk. `print_len` bounds how much raw data
/// is echoed back in the description.
pub fn describe_payload(data: &[u8], print_len: usize) -> String {
    if data.len() >= 3 && (data[0] == 0x16 || data[0] == 0x14 || data[0] == 0x17) {
        return describe_tls(data, print_len);
    }
    if contains(data, b"HTTP/") || contains(data, b"GET ") || contains(data, b"POST ") {
        return describe_http(data, print_len);
    }
    if contains(data, b"SSH-") {
        return describe_ssh(data, print_len);
    }
    match std::str::from_utf8(data) {
        Ok(text) => {
            if text.len() > 50 {
                format!("text: {}...", truncate(text, print_len))
            } else {
                format!("text: {}", text)
            }
        }
        Err(_) => {
            if data.len() >= 4 && data[0] == 0 {
                let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                format!(
                    "binary (length-prefixed): len={} data: {}...",
                    length,
                    hex_snippet(data, print_len)
                )
            } else {
                format!("binary: {}...", hex_snippet(data, print_len))
            }
        }
    }
}

fn describe_tls(data: &[u8], print_len: usize) -> String {
    let content_type = match data[0] {
        0x16 => "handshake",
        0x14 => "change-cipher-spec",
        _ => "application-data",
    };
    let version = match (data[1], data[2]) {
        (0x03, 0x01) => "TLS 1.0",
        (0x03, 0x02) => "TLS 1.1",
        (0x03, 0x03) => "TLS 1.2",
        (0x03, 0x04) => "TLS 1.3",
        _ => "unknown version",
    };
    let record_length = if data.len() >= 5 {
        u16::from_be_bytes([data[3], data[4]])
    } else {
        0
    };
    format!(
        "TLS record: type={} version={} len={} data: {}...",
        content_type,
        version,
        record_length,
        hex_snippet(data, print_len)
    )
}

fn describe_http(data: &[u8], print_len: usize) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => {
            let mut lines = text.split("\r\n");
            let first = lines.next().unwrap_or("");
            let count = 1 + lines.count();
            format!("HTTP: {} ... ({} lines)", first, count)
        }
        Err(_) => format!("HTTP (undecodable): {}...", hex_snippet(data, print_len)),
    }
}

/// SSH identification strings are a plain ASCII line terminated by CRLF
/// ("SSH-2.0-..."), so the banner is read up to the first CR or LF.
fn describe_ssh(data: &[u8], print_len: usize) -> String {
    let start = data
        .windows(4)
        .position(|w| w == b"SSH-")
        .unwrap_or_default();
    let banner: Vec<u8> = data[start..]
        .iter()
        .copied()
        .take_while(|&b| b != b'\r' && b != b'\n')
        .collect();
    format!(
        "SSH banner: {} data: {}...",
        String::from_utf8_lossy(&banner),
        hex_snippet(data, print_len)
    )
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn truncate(text: &str, len: usize) -> &str {
    match text.char_indices().nth(len) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn hex_snippet(data: &[u8], len: usize) -> String {
    data.iter()
        .take(len)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
