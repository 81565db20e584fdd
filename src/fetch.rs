//! High level fetch orchestration.
//!
//! Wires together the fingerprinting transport, challenge detector, JS
//! sandbox, captcha adapters and cookie store into the pipeline run for a
//! single URL: initial request, classify, solve, retry at most once with the
//! earned cookie, persist cookies, return the result.

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

use crate::challenges::{
    detect_challenge, extract_script_content, extract_sitekey, Challenge, JsSolver,
};
use crate::cookies::{Cookie, CookieError, PersistentJar};
use crate::executor::{execute, ExecuteError};
use crate::external_deps::captcha::{new_captcha_solver, CaptchaError};
use crate::profiles::get_profile;
use crate::transport::Transport;

/// Captcha credentials come only from the environment, never from argv.
pub const CAPTCHA_SERVICE_ENV: &str = "GHOSTFETCH_CAPTCHA_SERVICE";
pub const CAPTCHA_KEY_ENV: &str = "GHOSTFETCH_CAPTCHA_KEY";

const DEFAULT_TIMEOUT: &str = "30s";

/// Parameters for a single fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub url: String,
    pub browser: String,
    /// Total deadline for the whole pipeline, e.g. `"30s"`. Empty uses the
    /// default.
    pub timeout: String,
    pub no_cookies: bool,
    pub verbose: bool,
}

impl FetchOptions {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            browser: String::new(),
            timeout: String::new(),
            no_cookies: false,
            verbose: false,
        }
    }
}

/// Outcome of one fetch. `error` is only populated by the parallel
/// scheduler; `fetch_one` reports failures through its `Result`.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn from_error(url: impl Into<String>, error: &FetchError) -> Self {
        Self {
            url: url.into(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid timeout {0:?}")]
    BadTimeout(String),
    #[error("invalid url {0:?}: {1}")]
    BadUrl(String, url::ParseError),
    #[error("fetch failed: {0}")]
    Execute(#[from] ExecuteError),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to load cookie jar: {0}")]
    CookieLoad(CookieError),
    #[error("captcha solver init failed: {0}")]
    CaptchaInit(CaptchaError),
    #[error("captcha solve failed: {0}")]
    CaptchaSolve(CaptchaError),
}

/// Run the full pipeline for one URL, creating and loading a fresh cookie
/// store at the default path when cookies are enabled.
pub async fn fetch_one(options: FetchOptions) -> Result<FetchResult, FetchError> {
    let jar = if options.no_cookies {
        None
    } else {
        let jar = Arc::new(PersistentJar::new(PersistentJar::default_path()));
        jar.load().map_err(FetchError::CookieLoad)?;
        Some(jar)
    };
    fetch_with_jar(options, jar).await
}

/// Run the pipeline against an already-loaded cookie store. The parallel
/// scheduler shares one store across all of its tasks this way.
pub async fn fetch_with_jar(
    options: FetchOptions,
    jar: Option<Arc<PersistentJar>>,
) -> Result<FetchResult, FetchError> {
    let target = normalize_url(&options.url);
    let timeout = parse_timeout(&options.timeout)?;

    match tokio::time::timeout(timeout, run_pipeline(&options, &target, jar)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

async fn run_pipeline(
    options: &FetchOptions,
    target: &str,
    jar: Option<Arc<PersistentJar>>,
) -> Result<FetchResult, FetchError> {
    let url =
        Url::parse(target).map_err(|e| FetchError::BadUrl(target.to_string(), e))?;

    let profile = get_profile(&options.browser);
    log::debug!("using {} profile", profile.name);
    let transport = Transport::new(&profile);

    let mut cookies: Vec<(String, String)> = jar
        .as_deref()
        .map(|jar| {
            jar.cookies(&url)
                .into_iter()
                .map(|c| (c.name, c.value))
                .collect()
        })
        .unwrap_or_default();

    log::debug!("fetching {}", url);
    let mut response =
        execute(&transport, &profile, &Method::GET, &url, &[], &cookies, None).await?;

    let challenge = detect_challenge(response.status, &response.headers, &response.body);
    log::debug!("challenge: {}", challenge);

    match challenge {
        Challenge::None => {}
        Challenge::Js => {
            let script = extract_script_content(&response.body);
            if !script.is_empty() {
                let solver = JsSolver::new(url.as_str(), profile.user_agent());
                match solver.solve(&script).await {
                    Err(err) => log::debug!("JS solver error: {}", err),
                    Ok(solved) if !solved.cookie_name.is_empty() => {
                        cookies.push((solved.cookie_name.clone(), solved.cookie_value.clone()));
                        if let Some(jar) = &jar {
                            jar.set_cookies(
                                &url,
                                &[Cookie::new(
                                    solved.cookie_name.clone(),
                                    solved.cookie_value.clone(),
                                )],
                            );
                        }
                        log::debug!("retrying with solved JS cookie: {}", solved.cookie_name);
                        response =
                            execute(&transport, &profile, &Method::GET, &url, &[], &cookies, None)
                                .await?;
                    }
                    Ok(_) => {}
                }
            }
        }
        Challenge::Captcha => {
            if let Some((sitekey, kind)) = extract_sitekey(&response.body) {
                let service = std::env::var(CAPTCHA_SERVICE_ENV).unwrap_or_default();
                let key = std::env::var(CAPTCHA_KEY_ENV).unwrap_or_default();
                if service.is_empty() || key.is_empty() {
                    log::debug!("captcha detected but no service/key configured");
                } else {
                    let provider =
                        new_captcha_solver(&service, &key).map_err(FetchError::CaptchaInit)?;
                    log::debug!("solving {} captcha via {}", kind, service);
                    let token = provider
                        .solve(&sitekey, url.as_str(), kind)
                        .await
                        .map_err(FetchError::CaptchaSolve)?;
                    log::debug!("captcha solved, retrying fetch");
                    cookies.push(("cf_clearance".to_string(), token.clone()));
                    if let Some(jar) = &jar {
                        jar.set_cookies(&url, &[Cookie::new("cf_clearance", token)]);
                    }
                    response =
                        execute(&transport, &profile, &Method::GET, &url, &[], &cookies, None)
                            .await?;
                }
            }
        }
    }

    if let Some(jar) = &jar {
        let received: Vec<Cookie> = response
            .headers
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Cookie::parse_set_cookie)
            .collect();
        if !received.is_empty() {
            jar.set_cookies(&response.url, &received);
        }
        if let Err(err) = jar.save() {
            log::warn!("failed to save cookies: {}", err);
        }
    }

    Ok(FetchResult {
        url: target.to_string(),
        status: response.status,
        headers: response.headers,
        body: response.body,
        error: None,
    })
}

/// Prefix `https://` when the input carries no scheme.
pub fn normalize_url(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, FetchError> {
    let value = if raw.trim().is_empty() {
        DEFAULT_TIMEOUT
    } else {
        raw.trim()
    };
    parse_duration(value).ok_or_else(|| FetchError::BadTimeout(raw.to_string()))
}

/// Parse `"300ms"`, `"30s"`, `"2m"`, `"1h"` style durations. A bare number
/// without a unit is invalid.
fn parse_duration(value: &str) -> Option<Duration> {
    const UNITS: &[(&str, f64)] = &[
        ("ms", 1.0),
        ("h", 3_600_000.0),
        ("m", 60_000.0),
        ("s", 1_000.0),
    ];
    for (suffix, millis) in UNITS {
        if let Some(number) = value.strip_suffix(suffix) {
            let parsed: f64 = number.parse().ok()?;
            if !parsed.is_finite() || parsed < 0.0 {
                return None;
            }
            return Some(Duration::from_secs_f64(parsed * millis / 1000.0));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_hosts() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(
            normalize_url("https://example.com/path"),
            "https://example.com/path"
        );
    }

    #[test]
    fn parses_timeouts() {
        assert_eq!(parse_timeout("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_timeout("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_timeout("1h").unwrap(), Duration::from_secs(3600));
        // empty falls back to the default
        assert_eq!(parse_timeout("").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_timeout_is_bad_timeout() {
        assert!(matches!(
            parse_timeout("not-a-duration"),
            Err(FetchError::BadTimeout(_))
        ));
        assert!(matches!(parse_timeout("30"), Err(FetchError::BadTimeout(_))));
        assert!(matches!(
            parse_timeout("-5s"),
            Err(FetchError::BadTimeout(_))
        ));
    }

    #[test]
    fn error_results_carry_the_message() {
        let err = FetchError::BadTimeout("x".to_string());
        let result = FetchResult::from_error("https://example.com", &err);
        assert_eq!(result.url, "https://example.com");
        assert_eq!(result.status, 0);
        assert!(result.error.unwrap().contains("invalid timeout"));
    }

    #[tokio::test]
    async fn fetches_plain_http_server() {
        let base = crate::external_deps::captcha::testing::mock_json_server(vec![
            "{\"hello\":true}".to_string(),
        ])
        .await;

        let mut options = FetchOptions::for_url(base);
        options.no_cookies = true;
        let result = fetch_one(options).await.unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.body, b"{\"hello\":true}");
    }
}
