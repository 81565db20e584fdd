//! Minimal HTTP/1.1 framing over an established connection.
//!
//! Requests are written as raw bytes so the profile's header order reaches
//! the wire exactly as declared; responses are parsed with `httparse`.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

use crate::transport::connector::MaybeTlsStream;
use crate::transport::{RawResponse, TransportError};

const MAX_HEADERS_SIZE: usize = 64 * 1024;
const MAX_HEADERS_COUNT: usize = 100;

/// Send one request and read the full response. The connection is not reused.
pub async fn send_request(
    mut stream: MaybeTlsStream,
    method: &Method,
    url: &Url,
    headers: &[(String, String)],
    body: Option<&[u8]>,
) -> Result<RawResponse, TransportError> {
    let request = build_request(method, url, headers, body);
    stream
        .write_all(&request)
        .await
        .map_err(|e| TransportError::Io(format!("write request: {}", e)))?;
    if let Some(body) = body {
        stream
            .write_all(body)
            .await
            .map_err(|e| TransportError::Io(format!("write body: {}", e)))?;
    }
    stream
        .flush()
        .await
        .map_err(|e| TransportError::Io(format!("flush: {}", e)))?;

    read_response(&mut stream, method).await
}

fn build_request(
    method: &Method,
    url: &Url,
    headers: &[(String, String)],
    body: Option<&[u8]>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(1024);

    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(url.path().as_bytes());
    if let Some(query) = url.query() {
        out.push(b'?');
        out.extend_from_slice(query.as_bytes());
    }
    out.extend_from_slice(b" HTTP/1.1\r\n");

    out.extend_from_slice(b"Host: ");
    out.extend_from_slice(url.host_str().unwrap_or_default().as_bytes());
    if let Some(port) = url.port() {
        out.extend_from_slice(format!(":{}", port).as_bytes());
    }
    out.extend_from_slice(b"\r\n");

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b"Connection: close\r\n");
    if let Some(body) = body {
        out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out
}

async fn read_response(
    stream: &mut MaybeTlsStream,
    method: &Method,
) -> Result<RawResponse, TransportError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(8192);
    let mut read_buf = vec![0u8; 8192];

    loop {
        // Accumulate until the header terminator arrives.
        let header_end = loop {
            if let Some(end) = find_header_end(&buffer) {
                break end;
            }
            if buffer.len() >= MAX_HEADERS_SIZE {
                return Err(TransportError::Io("response headers too large".into()));
            }
            let n = stream
                .read(&mut read_buf)
                .await
                .map_err(|e| TransportError::Io(format!("read response: {}", e)))?;
            if n == 0 {
                return Err(TransportError::Io(
                    "connection closed before response headers".into(),
                ));
            }
            buffer.extend_from_slice(&read_buf[..n]);
        };

        let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut response = httparse::Response::new(&mut parsed_headers);
        let status_len = match response
            .parse(&buffer)
            .map_err(|e| TransportError::Io(format!("parse response: {}", e)))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                return Err(TransportError::Io("incomplete response headers".into()))
            }
        };
        debug_assert_eq!(status_len, header_end);

        let status = response
            .code
            .ok_or_else(|| TransportError::Io("missing status code".into()))?;

        let mut headers = HeaderMap::new();
        for header in response.headers.iter().filter(|h| !h.name.is_empty()) {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(header.name.as_bytes()),
                HeaderValue::from_bytes(header.value),
            ) {
                headers.append(name, value);
            }
        }

        // 1xx informational responses carry no body; keep reading.
        if (100..200).contains(&status) {
            buffer.drain(..header_end);
            continue;
        }

        let body = read_body(stream, &headers, status, method, &buffer[header_end..]).await?;
        return Ok(RawResponse {
            status,
            headers,
            body,
        });
    }
}

async fn read_body(
    stream: &mut MaybeTlsStream,
    headers: &HeaderMap,
    status: u16,
    method: &Method,
    initial: &[u8],
) -> Result<Bytes, TransportError> {
    if matches!(status, 204 | 304) || *method == Method::HEAD {
        return Ok(Bytes::new());
    }

    let chunked = headers
        .get(http::header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .next_back()
                .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                .unwrap_or(false)
        })
        .unwrap_or(false);

    if chunked {
        return read_chunked_body(stream, initial.to_vec()).await;
    }

    let content_length = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());

    if let Some(len) = content_length {
        return read_fixed_body(stream, initial, len).await;
    }

    // No framing information: body is delimited by connection close.
    read_until_close(stream, initial).await
}

async fn read_fixed_body(
    stream: &mut MaybeTlsStream,
    initial: &[u8],
    content_length: usize,
) -> Result<Bytes, TransportError> {
    let take = initial.len().min(content_length);
    let mut body = Vec::with_capacity(content_length);
    body.extend_from_slice(&initial[..take]);

    while body.len() < content_length {
        let mut chunk = vec![0u8; (content_length - body.len()).min(8192)];
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| TransportError::Io(format!("read body: {}", e)))?;
        if n == 0 {
            return Err(TransportError::Io(format!(
                "connection closed mid-body ({} of {} bytes)",
                body.len(),
                content_length
            )));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Ok(Bytes::from(body))
}

async fn read_until_close(
    stream: &mut MaybeTlsStream,
    initial: &[u8],
) -> Result<Bytes, TransportError> {
    let mut body = initial.to_vec();
    let mut read_buf = vec![0u8; 8192];
    loop {
        let n = stream
            .read(&mut read_buf)
            .await
            .map_err(|e| TransportError::Io(format!("read body: {}", e)))?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&read_buf[..n]);
    }
    Ok(Bytes::from(body))
}

async fn read_chunked_body(
    stream: &mut MaybeTlsStream,
    initial: Vec<u8>,
) -> Result<Bytes, TransportError> {
    let mut body = Vec::new();
    let mut buffer = initial;
    let mut read_buf = vec![0u8; 8192];

    loop {
        let (chunk_size, line_end) = loop {
            if let Some(found) = find_chunk_size(&buffer) {
                break found;
            }
            let n = stream
                .read(&mut read_buf)
                .await
                .map_err(|e| TransportError::Io(format!("read chunk size: {}", e)))?;
            if n == 0 {
                return Err(TransportError::Io(
                    "connection closed while reading chunk size".into(),
                ));
            }
            buffer.extend_from_slice(&read_buf[..n]);
        };

        buffer.drain(..line_end);

        if chunk_size == 0 {
            break;
        }

        // chunk data plus trailing CRLF
        let chunk_end = chunk_size + 2;
        while buffer.len() < chunk_end {
            let n = stream
                .read(&mut read_buf)
                .await
                .map_err(|e| TransportError::Io(format!("read chunk data: {}", e)))?;
            if n == 0 {
                return Err(TransportError::Io(
                    "connection closed while reading chunk data".into(),
                ));
            }
            buffer.extend_from_slice(&read_buf[..n]);
        }
        body.extend_from_slice(&buffer[..chunk_size]);
        buffer.drain(..chunk_end);
    }

    Ok(Bytes::from(body))
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    let pos = buffer.windows(2).position(|w| w == b"\r\n")?;
    let line = std::str::from_utf8(&buffer[..pos]).ok()?;
    let size_part = line.split(';').next()?;
    let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
    Some((size, pos + 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_header_end() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(find_header_end(data), Some(38));
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n"), None);
    }

    #[test]
    fn parses_chunk_sizes() {
        assert_eq!(find_chunk_size(b"5\r\nhello"), Some((5, 3)));
        assert_eq!(find_chunk_size(b"a\r\n0123456789"), Some((10, 3)));
        assert_eq!(find_chunk_size(b"0\r\n"), Some((0, 3)));
        assert_eq!(find_chunk_size(b"5;ext=val\r\ndata"), Some((5, 11)));
        assert_eq!(find_chunk_size(b"XYZ\r\n"), None);
        assert_eq!(find_chunk_size(b"10"), None);
    }

    #[test]
    fn request_preserves_header_order() {
        let url = Url::parse("https://example.com/path?x=1").unwrap();
        let headers = vec![
            ("User-Agent".to_string(), "test-agent".to_string()),
            ("Accept".to_string(), "text/html".to_string()),
            ("Accept-Language".to_string(), "en-US".to_string()),
        ];
        let raw = build_request(&Method::GET, &url, &headers, None);
        let text = String::from_utf8(raw).unwrap();

        assert!(text.starts_with("GET /path?x=1 HTTP/1.1\r\nHost: example.com\r\n"));
        let ua = text.find("User-Agent:").unwrap();
        let accept = text.find("Accept:").unwrap();
        let lang = text.find("Accept-Language:").unwrap();
        assert!(ua < accept && accept < lang);
    }
}
