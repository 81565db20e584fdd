//! Integrations that rely on third-party services.
//!
//! Groups the captcha-provider adapters that bridge the fetch pipeline with
//! external solving services.

pub mod captcha;
