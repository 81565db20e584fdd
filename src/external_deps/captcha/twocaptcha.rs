//! 2captcha submit/poll protocol.
//!
//! Submit: form-urlencoded POST to `/in.php` with `json=1`, answering
//! `{status, request}` where `request` is the task id. Poll: GET `/res.php`
//! until `status=1` (token in `request`) or a terminal error; the literal
//! `CAPCHA_NOT_READY` keeps the poll going.

use async_trait::async_trait;
use serde::Deserialize;

use super::{build_client, CaptchaConfig, CaptchaError, CaptchaProvider, CaptchaResult};
use crate::challenges::CaptchaKind;

const DEFAULT_BASE_URL: &str = "https://2captcha.com";

#[derive(Debug)]
pub struct TwoCaptchaProvider {
    api_key: String,
    base_url: String,
    config: CaptchaConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: i32,
    #[serde(default)]
    request: String,
}

impl TwoCaptchaProvider {
    pub fn with_config(
        api_key: impl Into<String>,
        config: CaptchaConfig,
    ) -> Result<Self, CaptchaError> {
        let client = build_client(&config)?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            config,
            client,
        })
    }

    /// Point the adapter at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_for(kind: CaptchaKind) -> &'static str {
        match kind {
            CaptchaKind::Turnstile => "turnstile",
            CaptchaKind::Hcaptcha => "hcaptcha",
            CaptchaKind::Recaptcha | CaptchaKind::Unknown => "userrecaptcha",
        }
    }

    async fn submit(
        &self,
        sitekey: &str,
        page_url: &str,
        kind: CaptchaKind,
    ) -> Result<String, CaptchaError> {
        let response: ApiResponse = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(&[
                ("key", self.api_key.as_str()),
                ("method", Self::method_for(kind)),
                ("sitekey", sitekey),
                ("pageurl", page_url),
                ("json", "1"),
            ])
            .send()
            .await
            .map_err(|e| CaptchaError::Provider(format!("submit: {}", e)))?
            .json()
            .await
            .map_err(|e| CaptchaError::Provider(format!("submit response: {}", e)))?;

        if response.status != 1 {
            return Err(CaptchaError::Provider(format!(
                "submit failed: {}",
                response.request
            )));
        }
        Ok(response.request)
    }

    async fn poll(&self, task_id: &str) -> CaptchaResult {
        for _ in 0..self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;

            let response: ApiResponse = self
                .client
                .get(format!("{}/res.php", self.base_url))
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("action", "get"),
                    ("id", task_id),
                    ("json", "1"),
                ])
                .send()
                .await
                .map_err(|e| CaptchaError::Provider(format!("poll: {}", e)))?
                .json()
                .await
                .map_err(|e| CaptchaError::Provider(format!("poll response: {}", e)))?;

            if response.status == 1 {
                return Ok(response.request);
            }
            if response.request != "CAPCHA_NOT_READY" {
                return Err(CaptchaError::Provider(format!(
                    "solve failed: {}",
                    response.request
                )));
            }
        }
        Err(CaptchaError::Timeout(self.config.max_polls))
    }
}

#[async_trait]
impl CaptchaProvider for TwoCaptchaProvider {
    fn name(&self) -> &'static str {
        "2captcha"
    }

    async fn solve(&self, sitekey: &str, page_url: &str, kind: CaptchaKind) -> CaptchaResult {
        let task_id = self.submit(sitekey, page_url, kind).await?;
        log::debug!("2captcha task {} submitted", task_id);
        self.poll(&task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external_deps::captcha::testing::mock_json_server;
    use std::time::Duration;

    #[test]
    fn kind_mapping() {
        assert_eq!(TwoCaptchaProvider::method_for(CaptchaKind::Turnstile), "turnstile");
        assert_eq!(TwoCaptchaProvider::method_for(CaptchaKind::Hcaptcha), "hcaptcha");
        assert_eq!(TwoCaptchaProvider::method_for(CaptchaKind::Recaptcha), "userrecaptcha");
        assert_eq!(TwoCaptchaProvider::method_for(CaptchaKind::Unknown), "userrecaptcha");
    }

    fn fast_config() -> CaptchaConfig {
        CaptchaConfig {
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            max_polls: 5,
        }
    }

    #[tokio::test]
    async fn submit_poll_returns_token() {
        let base = mock_json_server(vec![
            r#"{"status":1,"request":"42"}"#.to_string(),
            r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#.to_string(),
            r#"{"status":1,"request":"token-abc"}"#.to_string(),
        ])
        .await;

        let provider = TwoCaptchaProvider::with_config("key", fast_config())
            .unwrap()
            .with_base_url(base);
        let token = provider
            .solve("sitekey", "https://example.com", CaptchaKind::Turnstile)
            .await
            .unwrap();
        assert_eq!(token, "token-abc");
    }

    #[tokio::test]
    async fn submit_error_is_fatal() {
        let base = mock_json_server(vec![
            r#"{"status":0,"request":"ERROR_WRONG_USER_KEY"}"#.to_string(),
        ])
        .await;

        let provider = TwoCaptchaProvider::with_config("key", fast_config())
            .unwrap()
            .with_base_url(base);
        let err = provider
            .solve("sitekey", "https://example.com", CaptchaKind::Recaptcha)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ERROR_WRONG_USER_KEY"));
    }

    #[tokio::test]
    async fn poll_error_is_fatal() {
        let base = mock_json_server(vec![
            r#"{"status":1,"request":"42"}"#.to_string(),
            r#"{"status":0,"request":"ERROR_CAPTCHA_UNSOLVABLE"}"#.to_string(),
        ])
        .await;

        let provider = TwoCaptchaProvider::with_config("key", fast_config())
            .unwrap()
            .with_base_url(base);
        let err = provider
            .solve("sitekey", "https://example.com", CaptchaKind::Hcaptcha)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ERROR_CAPTCHA_UNSOLVABLE"));
    }
}
