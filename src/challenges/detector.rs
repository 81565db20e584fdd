//! Challenge classification.
//!
//! Classification is a pure, total function over (headers, status, body).
//! Markers are matched as raw byte substrings rather than parsed HTML, so
//! broken or minified challenge pages still classify.

use std::fmt;

use http::HeaderMap;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Challenge classes the fetch pipeline can encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    None,
    Js,
    Captcha,
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Challenge::None => write!(f, "none"),
            Challenge::Js => write!(f, "js"),
            Challenge::Captcha => write!(f, "captcha"),
        }
    }
}

/// Captcha widget families recognised in challenge pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaKind {
    Turnstile,
    Hcaptcha,
    Recaptcha,
    Unknown,
}

impl fmt::Display for CaptchaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptchaKind::Turnstile => write!(f, "turnstile"),
            CaptchaKind::Hcaptcha => write!(f, "hcaptcha"),
            CaptchaKind::Recaptcha => write!(f, "recaptcha"),
            CaptchaKind::Unknown => write!(f, "unknown"),
        }
    }
}

const CAPTCHA_MARKERS: &[&[u8]] = &[
    b"turnstile",
    b"challenges.cloudflare.com",
    b"h-captcha",
    b"data-sitekey",
    b"g-recaptcha",
    b"www.google.com/recaptcha",
];

const CLOUDFLARE_JS_MARKERS: &[&[u8]] = &[
    b"Just a moment",
    b"_cf_chl",
    b"cf-challenge",
    b"jschl_vc",
    b"jschl_answer",
];

const GENERIC_JS_MARKERS: &[&[u8]] = &[b"<noscript>", b"document.cookie"];

/// Classify a response. Captcha markers win over interstitial markers.
pub fn detect_challenge(status: u16, headers: &HeaderMap, body: &[u8]) -> Challenge {
    if contains_any(body, CAPTCHA_MARKERS) {
        return Challenge::Captcha;
    }

    let is_cloudflare = headers
        .get(http::header::SERVER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("cloudflare"))
        .unwrap_or(false);

    if is_cloudflare && matches!(status, 403 | 503) && contains_any(body, CLOUDFLARE_JS_MARKERS) {
        return Challenge::Js;
    }

    // Generic JS redirect pages are small and lean on noscript/document.cookie.
    if status == 503 && contains_any(body, GENERIC_JS_MARKERS) && body.len() < 10_000 {
        return Challenge::Js;
    }

    Challenge::None
}

static SITEKEY_RE: Lazy<Regex> = Lazy::new(|| build_regex(r#"data-sitekey=["']([^"']+)["']"#));

static SCRIPT_TAG_RE: Lazy<Regex> = Lazy::new(|| build_regex(r"(?is)<script[^>]*>(.*?)</script>"));

static SCRIPT_SRC_RE: Lazy<Regex> = Lazy::new(|| build_regex(r"(?i)src\s*="));

fn build_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid marker regex `{}`: {}", pattern, err))
}

/// Find the first `data-sitekey` attribute and derive the widget kind.
pub fn extract_sitekey(body: &[u8]) -> Option<(String, CaptchaKind)> {
    let captures = SITEKEY_RE.captures(body)?;
    let sitekey = String::from_utf8_lossy(captures.get(1)?.as_bytes()).into_owned();

    let kind = if contains(body, b"cf-turnstile") || contains(body, b"turnstile") {
        CaptchaKind::Turnstile
    } else if contains(body, b"h-captcha") {
        CaptchaKind::Hcaptcha
    } else if contains(body, b"g-recaptcha") {
        CaptchaKind::Recaptcha
    } else {
        CaptchaKind::Unknown
    };

    Some((sitekey, kind))
}

/// Concatenate the contents of all inline `<script>` tags, skipping any tag
/// whose opening tag carries a `src=` attribute.
pub fn extract_script_content(body: &[u8]) -> String {
    let mut scripts = Vec::new();
    for captures in SCRIPT_TAG_RE.captures_iter(body) {
        let full = match captures.get(0) {
            Some(m) => m.as_bytes(),
            None => continue,
        };
        if let Some(open_end) = full.iter().position(|&b| b == b'>') {
            if SCRIPT_SRC_RE.is_match(&full[..open_end]) {
                continue;
            }
        }
        if let Some(content) = captures.get(1) {
            let text = String::from_utf8_lossy(content.as_bytes());
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                scripts.push(trimmed.to_string());
            }
        }
    }
    scripts.join("\n")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn contains_any(haystack: &[u8], needles: &[&[u8]]) -> bool {
    needles.iter().any(|needle| contains(haystack, needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::SERVER;

    fn cloudflare_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SERVER, "cloudflare".parse().unwrap());
        headers
    }

    #[test]
    fn normal_200_is_no_challenge() {
        let challenge = detect_challenge(
            200,
            &HeaderMap::new(),
            b"<html><body>Hello</body></html>",
        );
        assert_eq!(challenge, Challenge::None);
    }

    #[test]
    fn cloudflare_interstitial_is_js() {
        let body = b"<html><head><title>Just a moment...</title></head><body></body></html>";
        let challenge = detect_challenge(503, &cloudflare_headers(), body);
        assert_eq!(challenge, Challenge::Js);
    }

    #[test]
    fn cloudflare_markers_need_matching_status() {
        let body = b"<html>Just a moment</html>";
        assert_eq!(
            detect_challenge(200, &cloudflare_headers(), body),
            Challenge::None
        );
    }

    #[test]
    fn turnstile_page_is_captcha() {
        let body = br#"<div class="cf-turnstile" data-sitekey="0x4AAAAAAAB1234"></div>"#;
        let challenge = detect_challenge(403, &cloudflare_headers(), body);
        assert_eq!(challenge, Challenge::Captcha);
    }

    #[test]
    fn captcha_wins_over_js_markers() {
        let body = b"<html>Just a moment <div class=\"h-captcha\"></div></html>";
        let challenge = detect_challenge(503, &cloudflare_headers(), body);
        assert_eq!(challenge, Challenge::Captcha);
    }

    #[test]
    fn generic_js_page_needs_small_body() {
        let small = b"<noscript>enable js</noscript>";
        assert_eq!(
            detect_challenge(503, &HeaderMap::new(), small),
            Challenge::Js
        );

        let mut large = small.to_vec();
        large.resize(10_000, b' ');
        assert_eq!(
            detect_challenge(503, &HeaderMap::new(), &large),
            Challenge::None
        );
    }

    #[test]
    fn header_case_does_not_matter() {
        let mut headers = HeaderMap::new();
        headers.insert("server", "CloudFlare".parse().unwrap());
        let body = b"<html>jschl_vc</html>";
        assert_eq!(detect_challenge(403, &headers, body), Challenge::Js);
    }

    #[test]
    fn extracts_turnstile_sitekey() {
        let body = br#"<div class="cf-turnstile" data-sitekey="0x4AAAAAAAB1234"></div>"#;
        let (sitekey, kind) = extract_sitekey(body).unwrap();
        assert_eq!(sitekey, "0x4AAAAAAAB1234");
        assert_eq!(kind, CaptchaKind::Turnstile);
    }

    #[test]
    fn extracts_hcaptcha_sitekey() {
        let body = br#"<div class="h-captcha" data-sitekey="abcdef-123456"></div>"#;
        let (sitekey, kind) = extract_sitekey(body).unwrap();
        assert_eq!(sitekey, "abcdef-123456");
        assert_eq!(kind, CaptchaKind::Hcaptcha);
    }

    #[test]
    fn single_quoted_sitekey_and_unknown_kind() {
        let body = b"<div data-sitekey='xyz'></div>";
        let (sitekey, kind) = extract_sitekey(body).unwrap();
        assert_eq!(sitekey, "xyz");
        assert_eq!(kind, CaptchaKind::Unknown);
    }

    #[test]
    fn no_sitekey_found() {
        assert!(extract_sitekey(b"<html><body>No captcha here</body></html>").is_none());
    }

    #[test]
    fn script_extraction_skips_external_scripts() {
        let body = br#"
            <script src="/cdn.js"></script>
            <script>var a = 1;</script>
            <script type="text/javascript">var b = 2;</script>
        "#;
        let script = extract_script_content(body);
        assert_eq!(script, "var a = 1;\nvar b = 2;");
    }

    #[test]
    fn script_extraction_empty_when_only_external() {
        let body = br#"<script src="https://x/y.js"></script>"#;
        assert_eq!(extract_script_content(body), "");
    }
}
