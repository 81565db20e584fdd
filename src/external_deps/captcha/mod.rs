//! Captcha provider integrations.
//!
//! These adapters give the coordinator a unified submit/poll interface for
//! third-party captcha solvers. The pipeline stays agnostic of
//! vendor-specific wire formats while still retrieving challenge tokens when
//! a page embeds a captcha widget.

mod anticaptcha;
mod twocaptcha;

pub use anticaptcha::AntiCaptchaProvider;
pub use twocaptcha::TwoCaptchaProvider;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::challenges::CaptchaKind;

/// Timing knobs shared by both providers.
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// Per-HTTP-request timeout inside the adapter, distinct from the
    /// coordinator's overall deadline.
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: usize,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            max_polls: 60,
        }
    }
}

/// Solved challenge token.
pub type CaptchaResult = Result<String, CaptchaError>;

/// Shared interface implemented by captcha vendors.
#[async_trait]
pub trait CaptchaProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    async fn solve(&self, sitekey: &str, page_url: &str, kind: CaptchaKind) -> CaptchaResult;
}

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("unsupported captcha service: {0:?} (supported: 2captcha, anticaptcha)")]
    UnsupportedService(String),
    #[error("captcha provider misconfigured: {0}")]
    Configuration(String),
    #[error("captcha provider request failed: {0}")]
    Provider(String),
    #[error("captcha solving timed out after {0} polls")]
    Timeout(usize),
}

/// Construct the provider named by `service`. Unknown names fail immediately.
pub fn new_captcha_solver(
    service: &str,
    api_key: &str,
) -> Result<Box<dyn CaptchaProvider>, CaptchaError> {
    let config = CaptchaConfig::default();
    match service {
        "2captcha" => Ok(Box::new(TwoCaptchaProvider::with_config(api_key, config)?)),
        "anticaptcha" => Ok(Box::new(AntiCaptchaProvider::with_config(api_key, config)?)),
        other => Err(CaptchaError::UnsupportedService(other.to_string())),
    }
}

pub(crate) fn build_client(config: &CaptchaConfig) -> Result<reqwest::Client, CaptchaError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| CaptchaError::Configuration(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_known_providers() {
        let two = new_captcha_solver("2captcha", "fake-key").unwrap();
        assert_eq!(two.name(), "2captcha");
        let anti = new_captcha_solver("anticaptcha", "fake-key").unwrap();
        assert_eq!(anti.name(), "anticaptcha");
    }

    #[test]
    fn rejects_unknown_service() {
        let err = new_captcha_solver("unknown", "key").unwrap_err();
        assert!(matches!(err, CaptchaError::UnsupportedService(_)));
    }
}
