//! anti-captcha.com createTask/getTaskResult protocol.
//!
//! Both calls are JSON POSTs. A nonzero `errorId` is terminal at any stage;
//! `status: "processing"` keeps the poll going and `status: "ready"` carries
//! the token in `solution.token`, falling back to
//! `solution.gRecaptchaResponse` for recaptcha-style tasks.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{build_client, CaptchaConfig, CaptchaError, CaptchaProvider, CaptchaResult};
use crate::challenges::CaptchaKind;

const DEFAULT_BASE_URL: &str = "https://api.anti-captcha.com";

#[derive(Debug)]
pub struct AntiCaptchaProvider {
    api_key: String,
    base_url: String,
    config: CaptchaConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(rename = "errorId", default)]
    error_id: i64,
    #[serde(rename = "taskId", default)]
    task_id: i64,
    #[serde(rename = "errorCode", default)]
    error_code: String,
    #[serde(rename = "errorDescription", default)]
    error_description: String,
}

#[derive(Debug, Default, Deserialize)]
struct Solution {
    #[serde(default)]
    token: String,
    #[serde(rename = "gRecaptchaResponse", default)]
    g_recaptcha_response: String,
}

#[derive(Debug, Deserialize)]
struct TaskResultResponse {
    #[serde(rename = "errorId", default)]
    error_id: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    solution: Solution,
    #[serde(rename = "errorCode", default)]
    error_code: String,
    #[serde(rename = "errorDescription", default)]
    error_description: String,
}

impl AntiCaptchaProvider {
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

    fn task_type_for(kind: CaptchaKind) -> &'static str {
        match kind {
            CaptchaKind::Turnstile => "TurnstileTaskProxyless",
            CaptchaKind::Hcaptcha => "HCaptchaTaskProxyless",
            CaptchaKind::Recaptcha | CaptchaKind::Unknown => "RecaptchaV2TaskProxyless",
        }
    }

    async fn create_task(
        &self,
        sitekey: &str,
        page_url: &str,
        kind: CaptchaKind,
    ) -> Result<i64, CaptchaError> {
        let payload = json!({
            "clientKey": self.api_key,
            "task": {
                "type": Self::task_type_for(kind),
                "websiteURL": page_url,
                "websiteKey": sitekey,
            },
        });

        let response: CreateTaskResponse = self
            .client
            .post(format!("{}/createTask", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| CaptchaError::Provider(format!("createTask: {}", e)))?
            .json()
            .await
            .map_err(|e| CaptchaError::Provider(format!("createTask response: {}", e)))?;

        if response.error_id != 0 {
            return Err(CaptchaError::Provider(format!(
                "createTask failed: {} ({})",
                response.error_code, response.error_description
            )));
        }
        Ok(response.task_id)
    }

    async fn poll(&self, task_id: i64) -> CaptchaResult {
        for _ in 0..self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;

            let payload = json!({
                "clientKey": self.api_key,
                "taskId": task_id,
            });
            let response: TaskResultResponse = self
                .client
                .post(format!("{}/getTaskResult", self.base_url))
                .json(&payload)
                .send()
                .await
                .map_err(|e| CaptchaError::Provider(format!("getTaskResult: {}", e)))?
                .json()
                .await
                .map_err(|e| CaptchaError::Provider(format!("getTaskResult response: {}", e)))?;

            if response.error_id != 0 {
                return Err(CaptchaError::Provider(format!(
                    "solve failed: {} ({})",
                    response.error_code, response.error_description
                )));
            }
            if response.status == "ready" {
                let token = if response.solution.token.is_empty() {
                    response.solution.g_recaptcha_response
                } else {
                    response.solution.token
                };
                return Ok(token);
            }
            // status == "processing": keep polling
        }
        Err(CaptchaError::Timeout(self.config.max_polls))
    }
}

#[async_trait]
impl CaptchaProvider for AntiCaptchaProvider {
    fn name(&self) -> &'static str {
        "anticaptcha"
    }

    async fn solve(&self, sitekey: &str, page_url: &str, kind: CaptchaKind) -> CaptchaResult {
        let task_id = self.create_task(sitekey, page_url, kind).await?;
        log::debug!("anticaptcha task {} created", task_id);
        self.poll(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external_deps::captcha::testing::mock_json_server;
    use std::time::Duration;

    #[test]
    fn kind_mapping() {
        assert_eq!(
            AntiCaptchaProvider::task_type_for(CaptchaKind::Turnstile),
            "TurnstileTaskProxyless"
        );
        assert_eq!(
            AntiCaptchaProvider::task_type_for(CaptchaKind::Hcaptcha),
            "HCaptchaTaskProxyless"
        );
        assert_eq!(
            AntiCaptchaProvider::task_type_for(CaptchaKind::Recaptcha),
            "RecaptchaV2TaskProxyless"
        );
        assert_eq!(
            AntiCaptchaProvider::task_type_for(CaptchaKind::Unknown),
            "RecaptchaV2TaskProxyless"
        );
    }

    fn fast_config() -> CaptchaConfig {
        CaptchaConfig {
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            max_polls: 5,
        }
    }

    #[tokio::test]
    async fn ready_solution_prefers_token_field() {
        let base = mock_json_server(vec![
            r#"{"errorId":0,"taskId":7}"#.to_string(),
            r#"{"errorId":0,"status":"processing"}"#.to_string(),
            r#"{"errorId":0,"status":"ready","solution":{"token":"tok-1"}}"#.to_string(),
        ])
        .await;

        let provider = AntiCaptchaProvider::with_config("key", fast_config())
            .unwrap()
            .with_base_url(base);
        let token = provider
            .solve("sitekey", "https://example.com", CaptchaKind::Turnstile)
            .await
            .unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn ready_solution_falls_back_to_grecaptcha_response() {
        let base = mock_json_server(vec![
            r#"{"errorId":0,"taskId":7}"#.to_string(),
            r#"{"errorId":0,"status":"ready","solution":{"gRecaptchaResponse":"g-tok"}}"#
                .to_string(),
        ])
        .await;

        let provider = AntiCaptchaProvider::with_config("key", fast_config())
            .unwrap()
            .with_base_url(base);
        let token = provider
            .solve("sitekey", "https://example.com", CaptchaKind::Recaptcha)
            .await
            .unwrap();
        assert_eq!(token, "g-tok");
    }

    #[tokio::test]
    async fn create_error_is_fatal() {
        let base = mock_json_server(vec![
            r#"{"errorId":1,"errorCode":"ERROR_KEY_DOES_NOT_EXIST","errorDescription":"bad key"}"#
                .to_string(),
        ])
        .await;

        let provider = AntiCaptchaProvider::with_config("key", fast_config())
            .unwrap()
            .with_base_url(base);
        let err = provider
            .solve("sitekey", "https://example.com", CaptchaKind::Hcaptcha)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ERROR_KEY_DOES_NOT_EXIST"));
    }
}
