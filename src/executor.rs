//! Request executor: header assembly, redirects, content decoding.

use std::io::Read;

use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

use crate::profiles::BrowserProfile;
use crate::transport::{Transport, TransportError};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("too many redirects")]
    RedirectLoop,
    #[error("decompress failed: {0}")]
    Decompress(String),
}

impl From<TransportError> for ExecuteError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Dial(msg) => ExecuteError::Dial(msg),
            TransportError::Tls(msg) | TransportError::Handshake(msg) => {
                ExecuteError::Handshake(msg)
            }
            TransportError::Io(msg) => ExecuteError::Io(msg),
        }
    }
}

/// A finished response with the body already decoded.
#[derive(Debug)]
pub struct ExecutedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// URL of the final hop after redirects.
    pub url: Url,
}

/// Execute a request: profile headers in declared order, extra headers as
/// overrides, cookies as a single `Cookie` header. Follows up to 10
/// redirects and decodes `gzip`/`br` bodies; other encodings pass through.
pub async fn execute(
    transport: &Transport,
    profile: &BrowserProfile,
    method: &Method,
    url: &Url,
    extra_headers: &[(String, String)],
    cookies: &[(String, String)],
    body: Option<&[u8]>,
) -> Result<ExecutedResponse, ExecuteError> {
    let headers = assemble_headers(profile, extra_headers, cookies);

    let mut current = url.clone();
    let mut hops = 0usize;
    let raw = loop {
        let raw = transport.request(method, &current, &headers, body).await?;

        if !is_redirect(raw.status) {
            break raw;
        }
        let location = match raw
            .headers
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            Some(loc) => loc.to_string(),
            None => break raw,
        };

        hops += 1;
        if hops > MAX_REDIRECTS {
            return Err(ExecuteError::RedirectLoop);
        }
        current = current
            .join(&location)
            .map_err(|e| ExecuteError::Io(format!("redirect target {:?}: {}", location, e)))?;
        log::debug!("redirect {} -> {}", hops, current);
    };

    let body = decode_body(&raw.headers, raw.body)?;
    Ok(ExecutedResponse {
        status: raw.status,
        headers: raw.headers,
        body,
        url: current,
    })
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Profile headers first, in declared order; extras override by appending
/// after; cookies collapse into one RFC 6265 `Cookie` header.
fn assemble_headers(
    profile: &BrowserProfile,
    extra_headers: &[(String, String)],
    cookies: &[(String, String)],
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = profile
        .headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    for (name, value) in extra_headers {
        if let Some(existing) = headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            existing.1 = value.clone();
        } else {
            headers.push((name.clone(), value.clone()));
        }
    }

    if !cookies.is_empty() {
        let joined = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        headers.push(("Cookie".to_string(), joined));
    }

    headers
}

fn decode_body(headers: &HeaderMap, body: Bytes) -> Result<Vec<u8>, ExecuteError> {
    let encoding = headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase());

    match encoding.as_deref() {
        Some("gzip") => {
            let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
            let mut decoded = Vec::new();
            decoder
                .read_to_end(&mut decoded)
                .map_err(|e| ExecuteError::Decompress(format!("gzip: {}", e)))?;
            Ok(decoded)
        }
        Some("br") => {
            let mut decoder = brotli::Decompressor::new(body.as_ref(), 4096);
            let mut decoded = Vec::new();
            decoder
                .read_to_end(&mut decoded)
                .map_err(|e| ExecuteError::Decompress(format!("brotli: {}", e)))?;
            Ok(decoded)
        }
        _ => Ok(body.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::chrome_profile;
    use http::HeaderValue;
    use std::io::Write;

    #[test]
    fn headers_keep_profile_order_and_apply_overrides() {
        let profile = chrome_profile();
        let extra = vec![("Accept-Language".to_string(), "de-DE".to_string())];
        let cookies = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        let headers = assemble_headers(&profile, &extra, &cookies);

        assert_eq!(headers[0].0, "User-Agent");
        let lang = headers
            .iter()
            .find(|(n, _)| n == "Accept-Language")
            .unwrap();
        assert_eq!(lang.1, "de-DE");
        let cookie = headers.iter().find(|(n, _)| n == "Cookie").unwrap();
        assert_eq!(cookie.1, "a=1; b=2");
    }

    #[test]
    fn decodes_gzip_bodies() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello gzip").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            HeaderValue::from_static("gzip"),
        );
        let decoded = decode_body(&headers, Bytes::from(compressed)).unwrap();
        assert_eq!(decoded, b"hello gzip");
    }

    #[test]
    fn decodes_brotli_bodies() {
        let mut compressed = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
            writer.write_all(b"hello brotli").unwrap();
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            HeaderValue::from_static("br"),
        );
        let decoded = decode_body(&headers, Bytes::from(compressed)).unwrap();
        assert_eq!(decoded, b"hello brotli");
    }

    #[test]
    fn unknown_encoding_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            HeaderValue::from_static("zstd"),
        );
        let body = Bytes::from_static(b"opaque bytes");
        let decoded = decode_body(&headers, body.clone()).unwrap();
        assert_eq!(decoded, body.to_vec());
    }

    #[test]
    fn corrupt_gzip_is_a_decompress_error() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            HeaderValue::from_static("gzip"),
        );
        let err = decode_body(&headers, Bytes::from_static(b"not gzip")).unwrap_err();
        assert!(matches!(err, ExecuteError::Decompress(_)));
    }
}
