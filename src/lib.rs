//! # ghostfetch
//!
//! A read-only web fetcher and search aggregator that looks like a real
//! browser to origin servers. Built for autonomous agents that need to read
//! arbitrary pages and run searches without being stopped by anti-bot
//! systems.
//!
//! ## Features
//!
//! - TLS transport reproducing Chrome/Firefox ClientHello fingerprints,
//!   with ALPN-routed HTTP/2 and HTTP/1.1
//! - Challenge detection for Cloudflare interstitials and captcha widgets
//! - Embedded JavaScript sandbox that solves interstitial challenges
//! - 2captcha / anti-captcha adapters for widget challenges
//! - Persistent, RFC 6265 cookie jar shared across invocations
//! - Bounded-concurrency parallel fetching with order-preserving results
//! - HTML to markdown reduction, link extraction, search-engine scraping
//!
//! ## Example
//!
//! ```no_run
//! use ghostfetch::{fetch_one, FetchOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let result = fetch_one(FetchOptions::for_url("https://example.com")).await?;
//!     println!("{}", String::from_utf8_lossy(&result.body));
//!     Ok(())
//! }
//! ```

mod fetch;

pub mod challenges;
pub mod cookies;
pub mod executor;
pub mod external_deps;
pub mod links;
pub mod markdown;
pub mod output;
pub mod parallel;
pub mod profiles;
pub mod search;
pub mod transport;

pub use crate::fetch::{
    fetch_one, fetch_with_jar, normalize_url, FetchError, FetchOptions, FetchResult,
    CAPTCHA_KEY_ENV, CAPTCHA_SERVICE_ENV,
};

pub use crate::challenges::{
    detect_challenge, extract_script_content, extract_sitekey, CaptchaKind, Challenge, JsSolver,
    SolveError, SolveResult,
};

pub use crate::cookies::{Cookie, CookieError, PersistentJar};

pub use crate::executor::{execute, ExecuteError, ExecutedResponse};

pub use crate::external_deps::captcha::{
    new_captcha_solver, AntiCaptchaProvider, CaptchaConfig, CaptchaError, CaptchaProvider,
    CaptchaResult, TwoCaptchaProvider,
};

pub use crate::links::{extract_links, filter_links, format_links, PageLink};

pub use crate::markdown::{html_to_markdown, MarkdownError};

pub use crate::output::{
    format_output, format_parallel_json, format_parallel_results, OutputOptions,
};

pub use crate::parallel::fetch_parallel;

pub use crate::profiles::{chrome_profile, firefox_profile, get_profile, BrowserProfile};

pub use crate::search::{format_search_results, SearchEngine, SearchOutput, SearchResult};

pub use crate::transport::{Transport, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
