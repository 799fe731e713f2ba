//! The response builder and writer (spec §4.1).

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::headers::OrderedParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const LENGTH_REQUIRED: StatusCode = StatusCode(411);
    pub const UNSUPPORTED_MEDIA_TYPE: StatusCode = StatusCode(415);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);

    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            411 => "Length Required",
            415 => "Unsupported Media Type",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown Status",
        }
    }
}

/// Whether the writer is allowed to mangle headers on the way out.
///
/// `Standard` is what the running server uses; `TestFaithful` exists so
/// unit tests can assert on exactly the headers a handler set, without the
/// writer's standards-conforming `Connection: close` injection getting in
/// the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintMode {
    #[default]
    Standard,
    TestFaithful,
}

/// A mutable response builder. Invariant: a 204 must not carry a body
/// (spec §3); `HttpResponse::build` panics in debug builds if violated via
/// the exposed constructors, since it indicates a handler bug, not client
/// input.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub version: String,
    pub headers: OrderedParams,
    pub body: Option<String>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: "HTTP/1.1".to_string(),
            headers: OrderedParams::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        debug_assert!(
            self.status != StatusCode::NO_CONTENT || body.is_empty(),
            "a 204 response must not carry a body"
        );
        self.headers.set("Content-Type", content_type);
        self.body = Some(body);
        self
    }

    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status).with_body("text/html; charset=UTF-8", body)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// Serializes the response to `writer` using `mode`. If the caller
    /// didn't set `Content-Length` explicitly, it's computed as the UTF-8
    /// byte length of the body (spec §3/§4.1). `text/plain` bodies without
    /// an explicit `charset` parameter get `; charset=UTF-8` appended.
    pub async fn write<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        mode: PrintMode,
    ) -> std::io::Result<()> {
        let mut headers = self.headers.clone();

        if let Some(content_type) = headers.get("Content-Type") {
            if content_type
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("text/plain")
                && !content_type.to_ascii_lowercase().contains("charset=")
            {
                let updated = format!("{content_type}; charset=UTF-8");
                headers.set("Content-Type", updated);
            }
        }

        let body_bytes = self.body.as_deref().unwrap_or("").as_bytes();
        if !body_bytes.is_empty() && !headers.contains("Content-Length") {
            headers.set("Content-Length", body_bytes.len().to_string());
        }

        if mode == PrintMode::Standard {
            headers.set("Connection", "close");
        }

        let status_line = format!(
            "{} {} {}\r\n",
            self.version,
            self.status.0,
            self.status.reason()
        );
        writer.write_all(status_line.as_bytes()).await?;
        for (name, value) in headers.iter() {
            writer
                .write_all(format!("{name}: {value}\r\n").as_bytes())
                .await?;
        }
        writer.write_all(b"\r\n").await?;
        if !body_bytes.is_empty() {
            writer.write_all(body_bytes).await?;
        }
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(resp: &HttpResponse, mode: PrintMode) -> String {
        let mut buf = Vec::new();
        resp.write(&mut buf, mode).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn content_length_is_byte_length_of_utf8_body() {
        let resp = HttpResponse::html(StatusCode::OK, "héllo");
        let rendered = render(&resp, PrintMode::TestFaithful).await;
        assert!(rendered.contains(&format!("Content-Length: {}\r\n", "héllo".len())));
    }

    #[tokio::test]
    async fn standard_mode_forces_connection_close() {
        let resp = HttpResponse::new(StatusCode::OK).with_header("Connection", "keep-alive");
        let rendered = render(&resp, PrintMode::Standard).await;
        assert!(rendered.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn test_faithful_mode_does_not_touch_connection_header() {
        let resp = HttpResponse::new(StatusCode::OK).with_header("Connection", "keep-alive");
        let rendered = render(&resp, PrintMode::TestFaithful).await;
        assert!(rendered.contains("Connection: keep-alive\r\n"));
    }

    #[tokio::test]
    async fn text_plain_gets_charset_appended() {
        let resp = HttpResponse::new(StatusCode::OK).with_body("text/plain", "hi");
        let rendered = render(&resp, PrintMode::TestFaithful).await;
        assert!(rendered.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
    }
}
