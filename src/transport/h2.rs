//! HTTP/2 client connection built directly on the `h2` crate.
//!
//! Going below hyper's abstractions lets the connection advertise the same
//! SETTINGS frame a Chrome build sends, which origin servers fingerprint
//! alongside the ClientHello.

use bytes::Bytes;
use h2::client::SendRequest;
use http::{HeaderName, HeaderValue, Method, Request};
use url::Url;

use crate::transport::connector::MaybeTlsStream;
use crate::transport::{RawResponse, TransportError};

// Chrome's SETTINGS values.
const HEADER_TABLE_SIZE: u32 = 65_536;
const INITIAL_WINDOW_SIZE: u32 = 6_291_456;
const MAX_HEADER_LIST_SIZE: u32 = 262_144;
// Chrome sends initial 65535 plus an immediate WINDOW_UPDATE to ~15MB.
const CONNECTION_WINDOW_SIZE: u32 = 15_728_640;

/// Perform the HTTP/2 handshake and issue a single request.
///
/// The connection driver is spawned in the background and winds down when
/// the stream completes.
pub async fn send_request(
    stream: MaybeTlsStream,
    method: &Method,
    url: &Url,
    headers: &[(String, String)],
    body: Option<&[u8]>,
) -> Result<RawResponse, TransportError> {
    let mut builder = h2::client::Builder::new();
    builder
        .header_table_size(HEADER_TABLE_SIZE)
        .initial_window_size(INITIAL_WINDOW_SIZE)
        .initial_connection_window_size(CONNECTION_WINDOW_SIZE)
        .max_header_list_size(MAX_HEADER_LIST_SIZE)
        .enable_push(false);

    let (send, connection) = builder
        .handshake::<_, Bytes>(stream)
        .await
        .map_err(|e| TransportError::Io(format!("h2 handshake: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::debug!("h2 connection error: {}", e);
        }
    });

    dispatch(send, method, url, headers, body).await
}

async fn dispatch(
    send: SendRequest<Bytes>,
    method: &Method,
    url: &Url,
    headers: &[(String, String)],
    body: Option<&[u8]>,
) -> Result<RawResponse, TransportError> {
    let mut send = send
        .ready()
        .await
        .map_err(|e| TransportError::Io(format!("h2 not ready: {}", e)))?;

    let mut request = Request::builder().method(method.clone()).uri(url.as_str());
    for (name, value) in headers {
        // HTTP/2 forbids connection-level headers.
        if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            request = request.header(name, value);
        }
    }
    let request = request
        .body(())
        .map_err(|e| TransportError::Io(format!("build h2 request: {}", e)))?;

    let has_body = body.is_some();
    let (response, mut send_stream) = send
        .send_request(request, !has_body)
        .map_err(|e| TransportError::Io(format!("send h2 request: {}", e)))?;

    if let Some(body) = body {
        send_stream
            .send_data(Bytes::copy_from_slice(body), true)
            .map_err(|e| TransportError::Io(format!("send h2 body: {}", e)))?;
    }

    let response = response
        .await
        .map_err(|e| TransportError::Io(format!("h2 response: {}", e)))?;

    let status = response.status().as_u16();
    let headers = response.headers().clone();

    let mut recv = response.into_body();
    let mut body_bytes = Vec::new();
    while let Some(chunk) = recv.data().await {
        let chunk = chunk.map_err(|e| TransportError::Io(format!("read h2 body: {}", e)))?;
        body_bytes.extend_from_slice(&chunk);
        let _ = recv.flow_control().release_capacity(chunk.len());
    }

    Ok(RawResponse {
        status,
        headers,
        body: Bytes::from(body_bytes),
    })
}
