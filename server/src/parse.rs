//! HTTP/1.1 parsing and response helpers
//!
//! The rendezvous speaks a deliberately small slice of HTTP: one request
//! per connection (or one upgrade), UTF-8 JSON bodies, no chunked encoding.
//! Hand-rolled over the raw socket so the server carries no framework.

/// Find the end of HTTP headers (position after `\r\n\r\n` or `\n\n`).
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(3) {
        if &data[i..i + 4] == b"\r\n\r\n" {
            return Some(i + 4);
        }
    }
    for i in 0..data.len().saturating_sub(1) {
        if &data[i..i + 2] == b"\n\n" {
            return Some(i + 2);
        }
    }
    None
}

/// Parse the `Content-Length` header; absent means no body.
pub fn parse_content_length(headers: &str) -> usize {
    header_value(headers, "content-length")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Case-insensitive header lookup. Returns the raw value, untrimmed.
pub fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    for line in headers.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(name) {
                return Some(value);
            }
        }
    }
    None
}

/// Whether this request asks to upgrade to the signaling protocol.
pub fn is_signal_upgrade(headers: &str) -> bool {
    let upgrade = header_value(headers, "upgrade")
        .map(|v| v.trim().eq_ignore_ascii_case(cove_proto::signal::SIGNAL_PROTOCOL))
        .unwrap_or(false);
    let connection = header_value(headers, "connection")
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    upgrade && connection
}

fn status_text(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Permissive CORS headers on every response: the rendezvous is a public
/// bulletin board and carries no credentials.
const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
     Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
     Access-Control-Allow-Headers: Content-Type\r\n";

/// A full JSON response with CORS headers.
pub fn json_response(status: u16, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text(status),
        CORS_HEADERS,
        body.len(),
        body
    )
}

/// A JSON error response: `{"error": "..."}`.
pub fn error_response(status: u16, message: &str) -> String {
    let body = serde_json::to_string(&cove_proto::api::ErrorResponse {
        error: message.to_string(),
    })
    .unwrap_or_else(|_| String::from("{\"error\":\"internal\"}"));
    json_response(status, &body)
}

/// The CORS preflight response.
pub fn preflight_response() -> String {
    format!(
        "HTTP/1.1 204 No Content\r\n{}Content-Length: 0\r\nConnection: close\r\n\r\n",
        CORS_HEADERS
    )
}

/// The 101 response completing a signaling upgrade.
pub fn upgrade_response() -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: {}\r\nConnection: Upgrade\r\n\r\n",
        cove_proto::signal::SIGNAL_PROTOCOL
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_end_crlf() {
        let data = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nbody";
        assert_eq!(find_header_end(data), Some(27));
    }

    #[test]
    fn test_find_header_end_lf_only() {
        let data = b"GET / HTTP/1.1\nHost: x\n\nbody";
        assert_eq!(find_header_end(data), Some(24));
    }

    #[test]
    fn test_find_header_end_incomplete() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\nHost"), None);
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(
            parse_content_length("POST / HTTP/1.1\r\nContent-Length: 42\r\n"),
            42
        );
        assert_eq!(
            parse_content_length("POST / HTTP/1.1\r\ncontent-length:7\r\n"),
            7
        );
        assert_eq!(parse_content_length("GET / HTTP/1.1\r\n"), 0);
    }

    #[test]
    fn test_is_signal_upgrade() {
        let headers = "GET /room/x/signal HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: cove-signal/1\r\n";
        assert!(is_signal_upgrade(headers));

        let no_upgrade = "GET /room/x/signal HTTP/1.1\r\nHost: x\r\n";
        assert!(!is_signal_upgrade(no_upgrade));

        let wrong_protocol = "GET / HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n";
        assert!(!is_signal_upgrade(wrong_protocol));
    }

    #[test]
    fn test_json_response_shape() {
        let resp = json_response(200, "{\"a\":1}");
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Content-Length: 7\r\n"));
        assert!(resp.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(resp.ends_with("{\"a\":1}"));
    }

    #[test]
    fn test_error_response_is_json() {
        let resp = error_response(404, "unknown or expired code");
        assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(resp.contains("{\"error\":\"unknown or expired code\"}"));
    }

    #[test]
    fn test_upgrade_response_names_protocol() {
        let resp = upgrade_response();
        assert!(resp.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(resp.contains("Upgrade: cove-signal/1\r\n"));
    }
}
