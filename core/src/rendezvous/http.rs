//! Minimal HTTP/1.1 client
//!
//! One request per connection against the rendezvous: write the request,
//! read to EOF, split status and body. The server always closes after
//! responding, which keeps this honest without connection pooling.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::super::session::SessionError;

/// A parsed response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Issue one request. `authority` is `host:port`.
pub async fn request(
    authority: &str,
    method: &str,
    path: &str,
    json_body: Option<&str>,
    deadline: Duration,
) -> Result<HttpResponse, SessionError> {
    tokio::time::timeout(deadline, request_inner(authority, method, path, json_body))
        .await
        .map_err(|_| SessionError::Transient(format!("request to {} timed out", authority)))?
}

async fn request_inner(
    authority: &str,
    method: &str,
    path: &str,
    json_body: Option<&str>,
) -> Result<HttpResponse, SessionError> {
    let mut socket = TcpStream::connect(authority)
        .await
        .map_err(|e| SessionError::Transient(format!("connect {}: {}", authority, e)))?;

    let body = json_body.unwrap_or("");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        authority,
        body.len(),
        body
    );
    socket
        .write_all(request.as_bytes())
        .await
        .map_err(|e| SessionError::Transient(format!("send request: {}", e)))?;

    let mut raw = Vec::new();
    socket
        .read_to_end(&mut raw)
        .await
        .map_err(|e| SessionError::Transient(format!("read response: {}", e)))?;

    parse_response(&raw)
}

fn parse_response(raw: &[u8]) -> Result<HttpResponse, SessionError> {
    let text = String::from_utf8_lossy(raw);
    let mut parts = text.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap_or("");
    let body = parts.next().unwrap_or("").to_string();

    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SessionError::Transient("malformed HTTP response".to_string()))?;

    Ok(HttpResponse { status, body })
}
