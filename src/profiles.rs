//! Browser impersonation profiles.
//!
//! A profile pairs a TLS ClientHello shape with the ordered HTTP header list
//! the same browser build sends on navigation. Profiles are program-wide
//! constants; unknown names resolve to the Chrome profile.

/// TLS fingerprint parameters consumed by the transport connector.
///
/// Cipher, curve and signature-algorithm ordering follow the named browser
/// build. Chrome additionally sends GREASE values and permutes extension
/// order (Chrome 110+); Firefox permutes but does not GREASE.
#[derive(Debug, Clone, Copy)]
pub struct TlsFingerprint {
    pub cipher_list: &'static [&'static str],
    pub curves: &'static [&'static str],
    pub sigalgs: &'static [&'static str],
    pub grease: bool,
}

/// An immutable browser identity: name, TLS fingerprint, ordered header list.
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub name: &'static str,
    pub tls: TlsFingerprint,
    pub headers: &'static [(&'static str, &'static str)],
}

impl BrowserProfile {
    /// The profile's User-Agent string, as sent on the wire.
    pub fn user_agent(&self) -> &'static str {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .map(|(_, value)| *value)
            .unwrap_or_default()
    }
}

/// Resolve a profile by name. Unknown names fall back to Chrome.
pub fn get_profile(name: &str) -> BrowserProfile {
    match name {
        "firefox" => firefox_profile(),
        _ => chrome_profile(),
    }
}

const CHROME_CIPHER_LIST: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Firefox ranks ChaCha20 above AES-256.
const FIREFOX_CIPHER_LIST: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

const COMMON_SIGALGS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

const CHROME_CURVES: &[&str] = &["x25519", "P-256", "P-384"];

// Firefox also offers P-521.
const FIREFOX_CURVES: &[&str] = &["x25519", "P-256", "P-384", "P-521"];

pub fn chrome_profile() -> BrowserProfile {
    BrowserProfile {
        name: "chrome",
        tls: TlsFingerprint {
            cipher_list: CHROME_CIPHER_LIST,
            curves: CHROME_CURVES,
            sigalgs: COMMON_SIGALGS,
            grease: true,
        },
        headers: &[
            ("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Sec-Ch-Ua", "\"Chromium\";v=\"133\", \"Not(A:Brand\";v=\"99\", \"Google Chrome\";v=\"133\""),
            ("Sec-Ch-Ua-Mobile", "?0"),
            ("Sec-Ch-Ua-Platform", "\"Windows\""),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-Fetch-Dest", "document"),
            ("Upgrade-Insecure-Requests", "1"),
        ],
    }
}

pub fn firefox_profile() -> BrowserProfile {
    BrowserProfile {
        name: "firefox",
        tls: TlsFingerprint {
            cipher_list: FIREFOX_CIPHER_LIST,
            curves: FIREFOX_CURVES,
            sigalgs: COMMON_SIGALGS,
            grease: false,
        },
        headers: &[
            ("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Upgrade-Insecure-Requests", "1"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_profile_has_user_agent() {
        let profile = get_profile("chrome");
        assert_eq!(profile.name, "chrome");
        assert!(!profile.headers.is_empty());
        assert!(profile.user_agent().contains("Chrome"));
    }

    #[test]
    fn firefox_profile_exists() {
        let profile = get_profile("firefox");
        assert_eq!(profile.name, "firefox");
        assert!(profile.user_agent().contains("Firefox"));
        assert!(!profile.tls.grease);
    }

    #[test]
    fn unknown_name_falls_back_to_chrome() {
        let profile = get_profile("something-unknown");
        assert_eq!(profile.name, "chrome");
    }

    #[test]
    fn header_order_starts_with_user_agent() {
        let profile = chrome_profile();
        assert_eq!(profile.headers[0].0, "User-Agent");
    }
}
