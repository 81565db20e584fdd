//! End-to-end pipeline tests against scripted local HTTP servers.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ghostfetch::{fetch_with_jar, FetchError, FetchOptions, PersistentJar};

/// Serve one scripted raw response per connection, recording each request
/// head for later assertions.
async fn scripted_server(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let record = received.clone();

    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let mut buffer = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            record
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&buffer).into_owned());
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}", addr), received)
}

fn response(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        extra_headers,
        body.len(),
        body
    )
}

fn options_for(url: &str) -> FetchOptions {
    let mut options = FetchOptions::for_url(url);
    options.timeout = "10s".to_string();
    options.no_cookies = true;
    options
}

#[tokio::test]
async fn plain_fetch_returns_body_and_status() {
    let (base, received) = scripted_server(vec![response(
        "200 OK",
        "Content-Type: text/html\r\n",
        "<html><body>Hello</body></html>",
    )])
    .await;

    let result = fetch_with_jar(options_for(&base), None).await.unwrap();
    assert_eq!(result.status, 200);
    assert_eq!(result.body, b"<html><body>Hello</body></html>");

    let heads = received.lock().unwrap();
    assert!(heads[0].starts_with("GET / HTTP/1.1\r\n"));
    // profile headers reach the wire in declared order
    let ua = heads[0].find("User-Agent:").unwrap();
    let accept = heads[0].find("Accept:").unwrap();
    assert!(ua < accept);
}

#[tokio::test]
async fn js_challenge_is_solved_and_retried_with_cookie() {
    let challenge_body = concat!(
        "<html><head><title>Just a moment...</title></head><body>",
        "<script>var a = 40; var b = 2; ",
        "document.cookie = \"cf_chl_token=\" + (a + b) + \"; path=/\";</script>",
        "</body></html>",
    );
    let (base, received) = scripted_server(vec![
        response(
            "503 Service Unavailable",
            "Server: cloudflare\r\nContent-Type: text/html\r\n",
            challenge_body,
        ),
        response("200 OK", "Content-Type: text/html\r\n", "real content"),
    ])
    .await;

    let result = fetch_with_jar(options_for(&base), None).await.unwrap();
    assert_eq!(result.status, 200);
    assert_eq!(result.body, b"real content");

    let heads = received.lock().unwrap();
    assert_eq!(heads.len(), 2);
    assert!(
        heads[1].contains("Cookie: cf_chl_token=42"),
        "retry must carry the solved cookie, got:\n{}",
        heads[1]
    );
}

#[tokio::test]
async fn redirects_are_followed() {
    let (base, received) = scripted_server(vec![
        response("302 Found", "Location: /next\r\n", ""),
        response("200 OK", "", "landed"),
    ])
    .await;

    let result = fetch_with_jar(options_for(&base), None).await.unwrap();
    assert_eq!(result.status, 200);
    assert_eq!(result.body, b"landed");
    assert!(result.url.starts_with(&base));

    let heads = received.lock().unwrap();
    assert!(heads[1].starts_with("GET /next HTTP/1.1\r\n"));
}

#[tokio::test]
async fn redirect_loops_fail_after_ten_hops() {
    let responses = (0..12)
        .map(|_| response("302 Found", "Location: /\r\n", ""))
        .collect();
    let (base, _) = scripted_server(responses).await;

    let err = fetch_with_jar(options_for(&base), None).await.unwrap_err();
    assert!(err.to_string().contains("too many redirects"), "{}", err);
}

#[tokio::test]
async fn missing_sitekey_returns_challenge_page_as_is() {
    // Captcha classification without a data-sitekey attribute: nothing to
    // submit, the page itself is the result.
    let body = "<html><body><div class=\"h-captcha\"></div></body></html>";
    let (base, received) =
        scripted_server(vec![response("403 Forbidden", "", body)]).await;

    let result = fetch_with_jar(options_for(&base), None).await.unwrap();
    assert_eq!(result.status, 403);
    assert_eq!(result.body, body.as_bytes());
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn response_cookies_persist_across_fetches() {
    let dir = tempfile::TempDir::new().unwrap();
    let jar_path = dir.path().join("cookies.json");

    let (first_base, _) = scripted_server(vec![response(
        "200 OK",
        "Set-Cookie: sid=abc123; Path=/\r\n",
        "with cookie",
    )])
    .await;

    let jar = Arc::new(PersistentJar::new(&jar_path));
    jar.load().unwrap();
    let mut options = options_for(&first_base);
    options.no_cookies = false;
    fetch_with_jar(options, Some(jar)).await.unwrap();

    // A second fetch with a store reloaded from disk presents the cookie.
    let (second_base, received) =
        scripted_server(vec![response("200 OK", "", "second")]).await;
    let jar = Arc::new(PersistentJar::new(&jar_path));
    jar.load().unwrap();
    let mut options = options_for(&second_base);
    options.no_cookies = false;
    fetch_with_jar(options, Some(jar)).await.unwrap();

    let heads = received.lock().unwrap();
    assert!(
        heads[0].contains("Cookie: sid=abc123"),
        "expected persisted cookie on second fetch, got:\n{}",
        heads[0]
    );
}

#[tokio::test]
async fn bad_timeout_is_rejected_before_any_io() {
    let mut options = FetchOptions::for_url("http://127.0.0.1:1/");
    options.timeout = "soon".to_string();
    options.no_cookies = true;
    let err = fetch_with_jar(options, None).await.unwrap_err();
    assert!(matches!(err, FetchError::BadTimeout(_)));
}
