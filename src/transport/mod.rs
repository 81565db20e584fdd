//! Fingerprinting transport: browser-grade TLS dialing plus protocol routing.
//!
//! `https` requests are dialed with the profile's ClientHello and routed by
//! the negotiated ALPN — `h2` to the HTTP/2 client, anything else to
//! HTTP/1.1 framing over the same TLS connection. Non-HTTPS requests use
//! HTTP/1.1 over plain TCP.

pub mod connector;
mod h1;
mod h2;

use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

use crate::profiles::BrowserProfile;
use connector::{AlpnProtocol, Connector};

/// Transport-level failures, in the order they can occur on a dial.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("TLS configuration failed: {0}")]
    Tls(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    #[error("io error: {0}")]
    Io(String),
}

/// A single exchanged response before any content decoding.
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Shareable transport bound to one browser profile.
pub struct Transport {
    connector: Connector,
}

impl Transport {
    pub fn new(profile: &BrowserProfile) -> Self {
        Self {
            connector: Connector::new(profile.tls),
        }
    }

    /// Issue one request to `url`, dialing a fresh connection.
    pub async fn request(
        &self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    ) -> Result<RawResponse, TransportError> {
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::Dial(format!("no host in {}", url)))?;

        if url.scheme() != "https" {
            let port = url.port().unwrap_or(80);
            let stream = self.connector.dial_plain(host, port).await?;
            return h1::send_request(stream, method, url, headers, body).await;
        }

        let port = url.port().unwrap_or(443);
        let stream = self.connector.dial(host, port).await?;
        match stream.alpn_protocol() {
            AlpnProtocol::H2 => h2::send_request(stream, method, url, headers, body).await,
            _ => h1::send_request(stream, method, url, headers, body).await,
        }
    }
}
