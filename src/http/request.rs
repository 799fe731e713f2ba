//! Request-line / header / body parsing (spec §4.1).

use std::fmt::Display;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::headers::OrderedParams;
use regex::Regex;
use std::sync::LazyLock;

/// One of the request-line verbs the codec recognizes. Anything else is a
/// parse failure (spec §4.1: "Unknown method token").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Trace,
}

impl Method {
    fn from_token(token: &str) -> Option<Method> {
        Some(match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            _ => return None,
        })
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
        };
        f.write_str(s)
    }
}

/// Every way the parser can reject a request, each mapped to exactly one
/// status code by `crate::handlers::error_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MalformedRequest(String),
    UnsupportedHeader(String),
    UnsupportedContentEncoding(String),
    MissingContentLength,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MalformedRequest(reason) => write!(f, "malformed request: {reason}"),
            ParseError::UnsupportedHeader(name) => write!(f, "unsupported header: {name}"),
            ParseError::UnsupportedContentEncoding(enc) => {
                write!(f, "unsupported content encoding: {enc}")
            }
            ParseError::MissingContentLength => write!(f, "missing content-length"),
        }
    }
}

/// An immutable parsed HTTP/1.1 request (spec §3).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// The raw URI as received, including the query string.
    pub resource_chain: String,
    /// The path without its leading `/` and without the query string.
    pub resource_name: String,
    /// `resource_name` split on `/`.
    pub resource_path: Vec<String>,
    pub resource_parameters: OrderedParams,
    pub header_parameters: OrderedParams,
    pub version: String,
    pub content_length: usize,
    pub body_bytes: Vec<u8>,
    pub text_body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_parameters.get(name)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.resource_parameters.get(name)
    }
}

static URI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/[^\s]*$").unwrap());
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^HTTP/1\.\d+$").unwrap());

/// Reads one CRLF- (or bare-LF-) terminated line, stripping the
/// terminator. Returns `None` at end of stream. Rejects a line that grows
/// past `super::MAX_HEADER_BYTES` before a terminator shows up, so a client
/// that never sends a newline can't make the parser buffer unbounded input
/// (spec §4.1's "reasonable defensive limit" on a single request).
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, max_bytes: usize) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }

        let found_terminator = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                buf.extend_from_slice(&available[..=pos]);
                reader.consume(pos + 1);
                true
            }
            None => {
                buf.extend_from_slice(available);
                let consumed = available.len();
                reader.consume(consumed);
                false
            }
        };

        if buf.len() > max_bytes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line exceeds the {max_bytes}-byte limit"),
            ));
        }
        if found_terminator {
            break;
        }
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let part = part.trim();
        part.strip_prefix("charset=")
            .or_else(|| part.strip_prefix("Charset="))
            .map(|v| v.trim_matches('"').to_string())
    })
}

fn main_mime(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Splits a raw (still percent-encoded) query string into an ordered
/// parameter map. A pair lacking `=` is a parse failure (spec §4.1).
fn decode_form_pairs(raw: &str) -> Result<OrderedParams, ParseError> {
    let mut params = OrderedParams::new();
    for segment in raw.split('&') {
        if segment.is_empty() {
            continue;
        }
        if !segment.contains('=') {
            return Err(ParseError::MalformedRequest(format!(
                "query/body parameter without '=': {segment}"
            )));
        }
        if let Some((key, value)) = url::form_urlencoded::parse(segment.as_bytes()).next() {
            params.insert(key.into_owned(), value.into_owned());
        }
    }
    Ok(params)
}

fn decode_body_text(bytes: &[u8], charset: &str) -> Result<String, ParseError> {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" => String::from_utf8(bytes.to_vec())
            .map_err(|_| ParseError::MalformedRequest("body is not valid UTF-8".to_string())),
        "us-ascii" | "ascii" | "iso-8859-1" | "latin1" => {
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
        other => Err(ParseError::UnsupportedContentEncoding(other.to_string())),
    }
}

/// Parses one request off `reader`: the request line, the header block up
/// to the blank line, then exactly `Content-Length` bytes of body.
pub async fn parse<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<HttpRequest, ParseError> {
    let line = read_line(reader, super::MAX_HEADER_BYTES)
        .await
        .map_err(|e| ParseError::MalformedRequest(format!("read error: {e}")))?
        .ok_or_else(|| {
            ParseError::MalformedRequest("end of stream before request line".to_string())
        })?;

    // Exactly three space-separated tokens; no leniency for extra
    // whitespace (spec §9, resolved Open Question).
    let tokens: Vec<&str> = line.split(' ').collect();
    if tokens.len() != 3 {
        return Err(ParseError::MalformedRequest(format!(
            "request line must have exactly three fields, got {:?}",
            line
        )));
    }
    let (method_token, uri, version) = (tokens[0], tokens[1], tokens[2]);

    let method = Method::from_token(method_token)
        .ok_or_else(|| ParseError::MalformedRequest(format!("unknown method {method_token}")))?;

    if uri == "*" {
        if !matches!(method, Method::Options | Method::Trace) {
            return Err(ParseError::MalformedRequest(
                "'*' URI is only valid for OPTIONS/TRACE".to_string(),
            ));
        }
    } else if !URI_RE.is_match(uri) {
        return Err(ParseError::MalformedRequest(format!(
            "URI is not a valid relative path: {uri}"
        )));
    }

    if !VERSION_RE.is_match(version) {
        return Err(ParseError::MalformedRequest(format!(
            "unsupported HTTP version: {version}"
        )));
    }

    let mut headers = OrderedParams::new();
    loop {
        let line = read_line(reader, super::MAX_HEADER_BYTES)
            .await
            .map_err(|e| ParseError::MalformedRequest(format!("read error: {e}")))?
            .ok_or_else(|| {
                ParseError::MalformedRequest("end of stream in header block".to_string())
            })?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(": ").ok_or_else(|| {
            ParseError::MalformedRequest(format!("header line missing ': ': {line}"))
        })?;
        headers.insert(name, value);
    }

    if headers.contains("Transfer-Encoding") {
        return Err(ParseError::UnsupportedHeader("Transfer-Encoding".to_string()));
    }

    if let Some(content_type) = headers.get("Content-Type") {
        if main_mime(content_type).eq_ignore_ascii_case("multipart/byteranges") {
            return Err(ParseError::MalformedRequest(
                "multipart/byteranges is not supported".to_string(),
            ));
        }
    }

    if let Some(encoding) = headers.get("Content-Encoding") {
        let encoding = encoding.trim();
        if !encoding.eq_ignore_ascii_case("identity") && !super::is_supported_charset(encoding) {
            return Err(ParseError::UnsupportedContentEncoding(encoding.to_string()));
        }
    }

    let content_length = match headers.get("Content-Length") {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| {
                ParseError::MalformedRequest(format!("invalid Content-Length: {raw}"))
            })?
            as usize,
        None => {
            if matches!(method, Method::Post | Method::Put) {
                return Err(ParseError::MissingContentLength);
            }
            0
        }
    };

    let mut body_bytes = vec![0u8; content_length];
    if content_length > 0 {
        reader
            .read_exact(&mut body_bytes)
            .await
            .map_err(|_| ParseError::MalformedRequest("truncated request body".to_string()))?;
    }

    let charset = headers
        .get("Content-Type")
        .and_then(charset_from_content_type)
        .or_else(|| {
            headers.get("Content-Encoding").and_then(|enc| {
                if enc.eq_ignore_ascii_case("identity") {
                    None
                } else {
                    Some(enc.to_string())
                }
            })
        })
        .unwrap_or_else(|| "ISO-8859-1".to_string());

    let text_body = if body_bytes.is_empty() {
        None
    } else {
        Some(decode_body_text(&body_bytes, &charset)?)
    };

    let (path, query) = match uri.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (uri, None),
    };
    let resource_name = path.strip_prefix('/').unwrap_or(path).to_string();
    let resource_path: Vec<String> = resource_name
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let mut resource_parameters = match query {
        Some(q) if !q.is_empty() => decode_form_pairs(q)?,
        _ => OrderedParams::new(),
    };

    let is_form_urlencoded = headers
        .get("Content-Type")
        .map(|ct| main_mime(ct).eq_ignore_ascii_case("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if matches!(method, Method::Post | Method::Put) && is_form_urlencoded {
        if let Some(body_text) = &text_body {
            let body_params = decode_form_pairs(body_text)?;
            for (k, v) in body_params.iter() {
                resource_parameters.set(k, v);
            }
        }
    }

    Ok(HttpRequest {
        method,
        resource_chain: uri.to_string(),
        resource_name,
        resource_path,
        resource_parameters,
        header_parameters: headers,
        version: version.to_string(),
        content_length,
        body_bytes,
        text_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    async fn parse_str(s: &str) -> Result<HttpRequest, ParseError> {
        let mut reader = BufReader::new(Cursor::new(s.as_bytes().to_vec()));
        parse(&mut reader).await
    }

    #[tokio::test]
    async fn parses_simple_get() {
        let req = parse_str("GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.resource_name, "");
    }

    #[tokio::test]
    async fn rejects_extra_spaces_in_request_line() {
        let err = parse_str("GET /foo  bar HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_method() {
        let err = parse_str("FOO / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn rejects_transfer_encoding() {
        let err = parse_str("GET / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
            .await
            .unwrap_err();
        assert_eq!(err, ParseError::UnsupportedHeader("Transfer-Encoding".to_string()));
    }

    #[tokio::test]
    async fn post_without_content_length_is_411() {
        let err = parse_str("POST /html HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap_err();
        assert_eq!(err, ParseError::MissingContentLength);
    }

    #[tokio::test]
    async fn parses_form_urlencoded_body_into_parameters() {
        let body = "html=%3Cp%3EA%3C%2Fp%3E";
        let req = parse_str(&format!(
            "POST /html HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ))
        .await
        .unwrap();
        assert_eq!(req.param("html"), Some("<p>A</p>"));
    }

    #[tokio::test]
    async fn query_pair_without_equals_is_rejected() {
        let err = parse_str("GET /html?uuid HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn rejects_a_request_line_that_never_terminates_within_the_limit() {
        let oversized = "a".repeat(super::super::MAX_HEADER_BYTES + 1);
        let err = parse_str(&format!("GET /{oversized} HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn rejects_absolute_uri_form() {
        let err = parse_str("GET http://example.com/ HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequest(_)));
    }
}
