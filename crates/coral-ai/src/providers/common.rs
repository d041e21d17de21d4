use std::sync::OnceLock;

use reqwest::Client;

use crate::error::{AiError, AiErrorCode};

pub(super) fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

pub(super) fn shared_http_client(base_url: &str) -> &'static Client {
    static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();
    static LOOPBACK_CLIENT: OnceLock<Client> = OnceLock::new();

    if is_loopback_base_url(base_url) {
        LOOPBACK_CLIENT.get_or_init(|| {
            Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new())
        })
    } else {
        DEFAULT_CLIENT.get_or_init(Client::new)
    }
}

pub(super) fn is_loopback_base_url(base_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(base_url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1"
}

/// Splits a `data:<mime>;base64,<payload>` URI into its media type and raw
/// base64 payload, for providers whose wire format takes them separately.
pub(super) fn split_data_url(source_url: &str) -> Result<(String, String), AiError> {
    let rest = source_url.strip_prefix("data:").ok_or_else(|| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            "Attachment source is not a data URI",
        )
    })?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            "Attachment data URI has no payload",
        )
    })?;
    let media_type = header
        .strip_suffix(";base64")
        .unwrap_or(header)
        .to_string();
    let media_type = if media_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        media_type
    };
    Ok((media_type, payload.to_string()))
}

pub(super) fn transport_error(provider: &str, error: impl std::fmt::Display) -> AiError {
    AiError::new(
        AiErrorCode::ProviderTransport,
        format!("{provider} transport failed: {error}"),
    )
}

pub(super) fn read_error(provider: &str, error: impl std::fmt::Display) -> AiError {
    AiError::new(
        AiErrorCode::ProviderTransport,
        format!("{provider} stream read failed: {error}"),
    )
}

pub(super) async fn http_error(provider: &str, response: reqwest::Response) -> AiError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    AiError::new(
        AiErrorCode::ProviderHttp,
        format!("{provider} HTTP {status}: {body}"),
    )
}

/// Incremental server-sent-events parser.
///
/// Fed raw body bytes as they arrive; yields each complete event's joined
/// `data:` payload. Handles CRLF line endings, events split across reads,
/// and multi-line data blocks.
#[derive(Default)]
pub(super) struct SseParser {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    events.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines.push(data.trim_start().to_string());
            }
        }

        events
    }

    /// Flushes a trailing event not terminated by a blank line.
    pub(super) fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(data) = line.strip_prefix("data:") {
                self.data_lines.push(data.trim_start().to_string());
            }
        }
        if self.data_lines.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data_lines).join("\n"))
        }
    }
}

/// Incremental newline-delimited-JSON splitter, for providers that stream
/// one JSON object per line instead of SSE.
#[derive(Default)]
pub(super) struct LineParser {
    buffer: Vec<u8>,
}

impl LineParser {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        lines
    }

    pub(super) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_parser_handles_events_split_across_reads() {
        let mut parser = SseParser::new();

        let mut events = parser.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(events.is_empty());
        events.extend(parser.feed(b"lo\"}}]}\n"));
        assert!(events.is_empty());
        events.extend(parser.feed(b"\ndata: [DONE]\n\n"));

        assert_eq!(
            events,
            vec![
                "{\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}".to_string(),
                "[DONE]".to_string(),
            ]
        );
    }

    #[test]
    fn sse_parser_joins_multi_line_data_and_ignores_other_fields() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: message\r\ndata: first\r\ndata: second\r\n\r\n");
        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn sse_parser_finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: tail").is_empty());
        assert_eq!(parser.finish(), Some("tail".to_string()));
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn line_parser_splits_ndjson_across_reads() {
        let mut parser = LineParser::new();
        let mut lines = parser.feed(b"{\"message\":{\"content\":\"a\"}}\n{\"mess");
        lines.extend(parser.feed(b"age\":{\"content\":\"b\"}}\n"));
        assert_eq!(
            lines,
            vec![
                "{\"message\":{\"content\":\"a\"}}".to_string(),
                "{\"message\":{\"content\":\"b\"}}".to_string(),
            ]
        );
    }

    #[test]
    fn split_data_url_extracts_media_type_and_payload() {
        let (media_type, payload) =
            split_data_url("data:image/png;base64,iVBORw0KGgo=").expect("valid data uri");
        assert_eq!(media_type, "image/png");
        assert_eq!(payload, "iVBORw0KGgo=");

        assert!(split_data_url("https://example.com/cat.png").is_err());
    }

    #[test]
    fn http_client_is_reused_across_requests() {
        let first = shared_http_client("https://api.openai.com/v1");
        let second = shared_http_client("https://api.openai.com/v1");
        assert!(std::ptr::eq(first, second));
    }
}
