//! BoringSSL connector that reproduces a browser's ClientHello.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslVersion};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::profiles::TlsFingerprint;
use crate::transport::TransportError;

// BoringSSL extension controls not exposed by the safe wrapper.
use boring_sys::SSL_CTX;
use std::os::raw::c_int;

extern "C" {
    fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
    fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
}

/// ALPN protocol negotiated during the TLS handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpnProtocol {
    H2,
    Http1,
    Unknown,
}

/// Connection handed to the HTTP layer: plain TCP for `http`, TLS for `https`.
#[derive(Debug)]
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl MaybeTlsStream {
    /// The ALPN protocol the server selected. Plain connections carry none.
    pub fn alpn_protocol(&self) -> AlpnProtocol {
        match self {
            MaybeTlsStream::Plain(_) => AlpnProtocol::Unknown,
            MaybeTlsStream::Tls(stream) => match stream.ssl().selected_alpn_protocol() {
                Some(b"h2") => AlpnProtocol::H2,
                Some(b"http/1.1") => AlpnProtocol::Http1,
                _ => AlpnProtocol::Unknown,
            },
        }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Opens TCP connections and wraps them in TLS shaped by a browser profile.
///
/// SNI is set to the original host and the ALPN offer list is always
/// `["h2", "http/1.1"]`, in that order. Shareable across requests; each dial
/// produces a fresh connection.
#[derive(Clone)]
pub struct Connector {
    fingerprint: TlsFingerprint,
}

impl Connector {
    pub fn new(fingerprint: TlsFingerprint) -> Self {
        Self { fingerprint }
    }

    fn configure_ssl(&self) -> Result<SslConnector, TransportError> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        let fp = &self.fingerprint;
        if !fp.cipher_list.is_empty() {
            builder
                .set_cipher_list(&fp.cipher_list.join(":"))
                .map_err(|e| TransportError::Tls(format!("cipher list: {}", e)))?;
        }
        if !fp.curves.is_empty() {
            builder
                .set_curves_list(&fp.curves.join(":"))
                .map_err(|e| TransportError::Tls(format!("curves: {}", e)))?;
        }
        if !fp.sigalgs.is_empty() {
            builder
                .set_sigalgs_list(&fp.sigalgs.join(":"))
                .map_err(|e| TransportError::Tls(format!("sigalgs: {}", e)))?;
        }

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        // Both Chrome and Firefox permute extension order; only Chrome GREASEs.
        unsafe {
            let ctx = builder.as_ptr() as *mut SSL_CTX;
            SSL_CTX_set_grease_enabled(ctx, if fp.grease { 1 } else { 0 });
            SSL_CTX_set_permute_extensions(ctx, 1);
        }

        // Browsers resume sessions; matching that is part of the fingerprint.
        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

        builder
            .set_alpn_protos(b"\x02h2\x08http/1.1")
            .map_err(|e| TransportError::Tls(format!("alpn: {}", e)))?;

        Ok(builder.build())
    }

    /// Open a plain TCP connection (non-HTTPS requests).
    pub async fn dial_plain(&self, host: &str, port: u16) -> Result<MaybeTlsStream, TransportError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::Dial(format!("{}:{}: {}", host, port, e)))?;
        Ok(MaybeTlsStream::Plain(stream))
    }

    /// Open a TCP connection and perform the fingerprinted TLS handshake.
    ///
    /// The TCP stream is dropped (closed) when the handshake fails.
    pub async fn dial(&self, host: &str, port: u16) -> Result<MaybeTlsStream, TransportError> {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::Dial(format!("{}:{}: {}", host, port, e)))?;

        let connector = self.configure_ssl()?;
        let config = connector
            .configure()
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        let tls = tokio_boring::connect(config, host, tcp)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        Ok(MaybeTlsStream::Tls(tls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::chrome_profile;

    #[test]
    fn connector_builds_ssl_config() {
        let connector = Connector::new(chrome_profile().tls);
        assert!(connector.configure_ssl().is_ok());
    }

    #[tokio::test]
    async fn dial_refused_port_is_dial_error() {
        let connector = Connector::new(chrome_profile().tls);
        let err = connector.dial("127.0.0.1", 1).await.unwrap_err();
        assert!(matches!(err, TransportError::Dial(_)));
    }
}
