//! HTTP server for the query endpoint
//! Simple HTTP/1.1 handling on top of tokio, one request per connection

use crate::error::{PipelineError, Result};
use crate::pipeline::{QueryPipeline, QueryRequest};
use std::any::Any;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 1_000_000;

/// A parsed HTTP response, ready to be written to the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: String::new(),
        }
    }

    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: application/json\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type, Authorization\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            status_text(self.status),
            self.body.len(),
            self.body
        )
    }
}

impl From<&PipelineError> for HttpResponse {
    fn from(err: &PipelineError) -> Self {
        HttpResponse::error(err.status_code(), &err.to_string())
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

/// Accepts connections forever, one task per connection.
pub async fn serve(listener: TcpListener, pipeline: QueryPipeline) -> Result<()> {
    info!("Server listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        let pipeline = pipeline.clone();
        tokio::spawn(handle_connection(stream, pipeline));
    }
}

async fn handle_connection(mut stream: TcpStream, pipeline: QueryPipeline) {
    let buffer = match timeout(READ_TIMEOUT, read_request(&mut stream)).await {
        Ok(Ok(buffer)) => buffer,
        Ok(Err(e)) => {
            warn!("Failed to read from stream: {}", e);
            return;
        }
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
    };

    if buffer.is_empty() {
        return;
    }

    let declared_too_large = request_framing(&buffer)
        .map(|(_, content_length)| content_length > MAX_REQUEST_BYTES)
        .unwrap_or(false);

    let response = if declared_too_large || buffer.len() > MAX_REQUEST_BYTES {
        HttpResponse::error(413, "request too large")
    } else {
        match String::from_utf8(buffer) {
            Ok(request) => handle_request(&request, &pipeline).await,
            Err(_) => HttpResponse::error(400, "request is not valid UTF-8"),
        }
    };

    if let Err(e) = stream.write_all(response.to_http().as_bytes()).await {
        warn!("Failed to write response: {}", e);
    }
    let _ = stream.shutdown().await;
}

/// Reads until the headers and `Content-Length` bytes of body have arrived.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    loop {
        let n = stream.read(&mut temp_buf).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&temp_buf[..n]);

        if let Some((headers_end, content_length)) = request_framing(&buffer) {
            if content_length > MAX_REQUEST_BYTES
                || buffer.len() >= headers_end.saturating_add(content_length)
            {
                break;
            }
        }

        if buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }

    Ok(buffer)
}

fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// End of the header block and the declared body length (0 when absent),
/// once the headers have fully arrived.
fn request_framing(buffer: &[u8]) -> Option<(usize, usize)> {
    let headers_end = find_headers_end(buffer)?;
    let head = String::from_utf8_lossy(&buffer[..headers_end]);
    Some((headers_end, extract_content_length(&head).unwrap_or(0)))
}

fn extract_content_length(request: &str) -> Option<usize> {
    request.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Routes one raw HTTP request.
pub async fn handle_request(request: &str, pipeline: &QueryPipeline) -> HttpResponse {
    let request_line = request.lines().next().unwrap_or_default();
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return HttpResponse::error(400, "malformed request line");
    }

    let method = parts[0];
    let full_path = parts[1];
    let path_str = full_path.split('?').next().unwrap_or_default();
    let path = match path_str.trim_end_matches('/') {
        "" => "/",
        p => p,
    };

    let body = match request.find("\r\n\r\n") {
        Some(idx) => {
            let rest = &request[idx + 4..];
            // Anything past Content-Length belongs to a following request.
            match extract_content_length(&request[..idx]) {
                Some(len) => rest.get(..len).unwrap_or(rest),
                None => rest,
            }
        }
        None => "",
    };

    debug!("Request: {} {}", method, path);

    match (method, path) {
        ("OPTIONS", _) => HttpResponse::no_content(),
        ("GET", "/health") => HttpResponse::json(
            200,
            &serde_json::json!({ "status": "ok", "service": "sql-chatbot" }),
        ),
        ("POST", "/query") => {
            let request_id = Uuid::new_v4();
            let span = tracing::info_span!("query", %request_id);
            handle_query(body, pipeline).instrument(span).await
        }
        (_, "/query") | (_, "/health") => HttpResponse::error(405, "method not allowed"),
        _ => HttpResponse::error(404, "not found"),
    }
}

async fn handle_query(body: &str, pipeline: &QueryPipeline) -> HttpResponse {
    let request = match parse_query_body(body) {
        Ok(request) => request,
        Err(e) => return HttpResponse::from(&e),
    };

    // Run in its own task so a panic turns into a 500 instead of a dropped socket.
    let pipeline = pipeline.clone();
    let task = tokio::spawn(async move { pipeline.run(&request).await }.in_current_span());

    match task.await {
        Ok(Ok(response)) => match serde_json::to_value(&response) {
            Ok(json) => HttpResponse::json(200, &json),
            Err(e) => HttpResponse::from(&PipelineError::Unexpected(e.to_string())),
        },
        Ok(Err(e)) => {
            error!("Query failed: {}", e);
            HttpResponse::from(&e)
        }
        Err(join_error) => {
            let message = if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                join_error.to_string()
            };
            error!("Query handler panicked: {}", message);
            HttpResponse::from(&PipelineError::Unexpected(message))
        }
    }
}

fn parse_query_body(body: &str) -> std::result::Result<QueryRequest, PipelineError> {
    let value: serde_json::Value =
        serde_json::from_str(body.trim()).map_err(|_| PipelineError::InvalidBody)?;

    if !value.is_object() {
        return Ok(QueryRequest::default());
    }
    serde_json::from_value(value).map_err(|_| PipelineError::InvalidBody)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content_length() {
        let head = "POST /query HTTP/1.1\r\nHost: x\r\ncontent-length: 27\r\n\r\n";
        assert_eq!(extract_content_length(head), Some(27));
        assert_eq!(extract_content_length("GET / HTTP/1.1\r\n\r\n"), None);
    }

    #[test]
    fn test_request_framing() {
        let raw = b"POST /query HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}";
        assert_eq!(request_framing(raw), Some((43, 2)));
        assert_eq!(request_framing(b"POST /query HTTP/1.1\r\n"), None);

        let huge = b"POST /query HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n";
        let (headers_end, content_length) = request_framing(huge).unwrap();
        assert_eq!(content_length, usize::MAX);
        assert!(content_length > MAX_REQUEST_BYTES);
        assert_eq!(headers_end.saturating_add(content_length), usize::MAX);
    }

    #[tokio::test]
    async fn test_body_is_cut_at_content_length() {
        let pipeline = QueryPipeline::new(
            std::sync::Arc::new(NoSqlModel),
            std::sync::Arc::new(EmptyDatabase),
        );
        let body = r#"{"userInput":"hi"}"#;
        let request = format!(
            "POST /query HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}GET /health HTTP/1.1\r\n\r\n",
            body.len(),
            body
        );

        let response = handle_request(&request, &pipeline).await;
        assert_eq!(response.status, 500);
        assert!(response.body.contains("could not generate the SQL query"));
    }

    struct NoSqlModel;

    #[async_trait::async_trait]
    impl crate::llm::LanguageModel for NoSqlModel {
        async fn generate_sql(
            &self,
            _user_input: &str,
        ) -> std::result::Result<Option<String>, crate::error::LlmError> {
            Ok(None)
        }

        async fn explain(
            &self,
            _rows: &[crate::db::Record],
        ) -> std::result::Result<Option<String>, crate::error::LlmError> {
            Ok(None)
        }
    }

    struct EmptyDatabase;

    #[async_trait::async_trait]
    impl crate::db::DatabaseGateway for EmptyDatabase {
        async fn execute(
            &self,
            _sql: &str,
        ) -> std::result::Result<Vec<crate::db::Record>, crate::error::DbError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_find_headers_end() {
        assert_eq!(find_headers_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(find_headers_end(b"GET / HTTP/1.1\r\n"), None);
    }

    #[test]
    fn test_parse_query_body() {
        let request = parse_query_body(r#"{"userInput":"hello"}"#).unwrap();
        assert_eq!(request.user_input().as_deref(), Some("hello"));

        assert!(parse_query_body("[1,2]").unwrap().user_input().is_none());
        assert!(matches!(parse_query_body("not json"), Err(PipelineError::InvalidBody)));
        assert!(matches!(parse_query_body(""), Err(PipelineError::InvalidBody)));
    }

    #[test]
    fn test_response_format() {
        let raw = HttpResponse::error(400, "missing parameter").to_http();
        assert!(raw.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(raw.contains("Access-Control-Allow-Origin: *"));
        assert!(raw.ends_with(r#"{"error":"missing parameter"}"#));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "handler panicked");
    }
}
