/*!
 * HTTP Wire Codec
 * Just enough HTTP/1.1 to turn buffered socket bytes into one host fetch
 * and the fetch result back into socket bytes
 */

use bytes::{BufMut, Bytes, BytesMut};
use url::Url;

use super::types::{SocketError, SocketResult};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Request parsed out of a socket's send buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Response as reported by a host transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Parse one request; head and body split at the first blank line
///
/// Bytes without a blank line are taken as a head with no body.
pub fn parse_request(raw: &[u8]) -> SocketResult<HttpRequest> {
    let (head, body) = match find(raw, HEAD_TERMINATOR) {
        Some(at) => (&raw[..at], &raw[at + HEAD_TERMINATOR.len()..]),
        None => (raw, &[][..]),
    };
    let head = std::str::from_utf8(head)
        .map_err(|_| SocketError::Malformed("request head is not valid UTF-8".into()))?;

    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| SocketError::Malformed("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method.to_string(), path.to_string()),
        _ => {
            return Err(SocketError::Malformed(format!(
                "bad request line '{request_line}'"
            )))
        }
    };

    let headers = lines
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    Ok(HttpRequest {
        method,
        path,
        headers,
        body: Bytes::copy_from_slice(body),
    })
}

/// Serialize a response into the single blob a socket reader sees
///
/// Existing `content-length` and `transfer-encoding` headers are dropped;
/// a `content-length` matching the body is always appended.
pub fn serialize_response(response: &HttpResponse) -> Bytes {
    let mut out = BytesMut::with_capacity(128 + response.body.len());
    out.put_slice(format!("HTTP/1.1 {} {}\r\n", response.status, response.status_text).as_bytes());
    for (key, value) in &response.headers {
        if key.eq_ignore_ascii_case("content-length") || key.eq_ignore_ascii_case("transfer-encoding")
        {
            continue;
        }
        out.put_slice(format!("{key}: {value}\r\n").as_bytes());
    }
    out.put_slice(format!("content-length: {}\r\n\r\n", response.body.len()).as_bytes());
    out.put_slice(&response.body);
    out.freeze()
}

/// Absolute URL a parsed request should be fetched from
///
/// An explicit `url` from connect wins; otherwise the host and port are
/// combined with the request path, using https for port 443.
pub fn target_url(
    request: &HttpRequest,
    host: &str,
    port: u16,
    explicit: Option<&str>,
) -> SocketResult<Url> {
    if let Some(url) = explicit {
        return Url::parse(url).map_err(|err| SocketError::Malformed(err.to_string()));
    }
    let scheme = if port == 443 { "https" } else { "http" };
    let authority = match (scheme, port) {
        ("http", 80) | ("https", 443) => host.to_string(),
        _ => format!("{host}:{port}"),
    };
    let path = if request.path.starts_with('/') {
        request.path.clone()
    } else {
        format!("/{}", request.path)
    };
    Url::parse(&format!("{scheme}://{authority}{path}"))
        .map_err(|err| SocketError::Malformed(err.to_string()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
