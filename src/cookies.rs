//! Persistent cookie store.
//!
//! An RFC 6265 jar is not enumerable — matching happens at query time — so
//! the store keeps a parallel insertion log of every cookie that passed
//! through the public setter and serializes that log to disk. Overwriting by
//! (name, origin-key) removes the old tuple before appending, so the file
//! order equals insertion order at load time.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("cookie file io: {0}")]
    Io(#[from] io::Error),
    #[error("cookie file encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A cookie as handled by the fetch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Empty means host-only: scoped to the exact host it was set under.
    pub domain: String,
    pub path: String,
    /// `None` is a session cookie.
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: String::new(),
            expires: None,
            secure: false,
        }
    }

    /// Parse a `Set-Cookie` response header value. Returns `None` when the
    /// leading `name=value` pair is missing or empty-named.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim());
        let mut max_age: Option<i64> = None;
        for attr in parts {
            if attr.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if let Some((key, val)) = attr.split_once('=') {
                match key.trim().to_ascii_lowercase().as_str() {
                    "domain" => cookie.domain = normalize_domain(val.trim()),
                    "path" => cookie.path = val.trim().to_string(),
                    "expires" => cookie.expires = parse_cookie_date(val.trim()),
                    "max-age" => max_age = val.trim().parse().ok(),
                    _ => {}
                }
            }
        }

        // Max-Age takes precedence over Expires (RFC 6265 §5.3).
        if let Some(seconds) = max_age {
            cookie.expires = Some(if seconds > 0 {
                Utc::now() + chrono::Duration::seconds(seconds)
            } else {
                Utc::now() - chrono::Duration::seconds(1)
            });
        }

        Some(cookie)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at < now).unwrap_or(false)
    }
}

/// On-disk tuple. `url` is the origin-key (`scheme://host`) the cookie was
/// inserted under; `expires` is ISO-8601 UTC or null for session cookies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    expires: Option<DateTime<Utc>>,
    secure: bool,
    url: String,
}

/// In-memory matcher with RFC 6265 domain and path semantics.
#[derive(Debug, Default)]
struct Jar {
    // keyed by the cookie's effective domain
    cookies: HashMap<String, Vec<JarCookie>>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct JarCookie {
    cookie: Cookie,
    host_only: bool,
    seq: u64,
}

impl Jar {
    fn set(&mut self, url: &Url, cookie: &Cookie) {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return,
        };

        let (domain, host_only) = if cookie.domain.is_empty() {
            (host.clone(), true)
        } else {
            let domain = normalize_domain(&cookie.domain);
            // Registry suffixes cannot scope cookies (RFC 6265 §5.3).
            if is_public_suffix(&domain) && domain != host {
                return;
            }
            // The attribute must cover the request host.
            if domain != host && !host.ends_with(&format!(".{}", domain)) {
                return;
            }
            (domain, false)
        };

        let mut stored = cookie.clone();
        stored.domain = domain.clone();
        if stored.path.is_empty() {
            stored.path = "/".to_string();
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let list = self.cookies.entry(domain).or_default();
        if let Some(pos) = list
            .iter()
            .position(|c| c.cookie.name == stored.name && c.cookie.path == stored.path)
        {
            let old_seq = list[pos].seq;
            list[pos] = JarCookie {
                cookie: stored,
                host_only,
                seq: old_seq,
            };
        } else {
            list.push(JarCookie {
                cookie: stored,
                host_only,
                seq,
            });
        }
    }

    fn get(&self, url: &Url) -> Vec<Cookie> {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return Vec::new(),
        };
        let secure_transport = url.scheme() == "https";
        let request_path = url.path();
        let now = Utc::now();

        let mut matched: Vec<&JarCookie> = self
            .cookies
            .values()
            .flat_map(|list| list.iter())
            .filter(|c| !c.cookie.is_expired(now))
            .filter(|c| !c.cookie.secure || secure_transport)
            .filter(|c| domain_matches(&c.cookie.domain, c.host_only, &host))
            .filter(|c| path_matches(&c.cookie.path, request_path))
            .collect();

        // Longest path first, then insertion order (RFC 6265 §5.4).
        matched.sort_by(|a, b| {
            b.cookie
                .path
                .len()
                .cmp(&a.cookie.path.len())
                .then(a.seq.cmp(&b.seq))
        });

        matched.into_iter().map(|c| c.cookie.clone()).collect()
    }
}

/// RFC 6265 §5.1.3 domain matching.
fn domain_matches(cookie_domain: &str, host_only: bool, request_host: &str) -> bool {
    if host_only {
        return request_host == cookie_domain;
    }
    if request_host == cookie_domain {
        return true;
    }
    request_host.ends_with(&format!(".{}", cookie_domain))
}

/// RFC 6265 §5.1.4 path matching.
fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    if !request_path.starts_with(cookie_path) {
        return false;
    }
    if cookie_path.ends_with('/') {
        return true;
    }
    request_path[cookie_path.len()..].starts_with('/')
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_public_suffix(domain: &str) -> bool {
    psl::suffix(domain.as_bytes())
        .map(|suffix| suffix.is_known() && suffix.as_bytes() == domain.as_bytes())
        .unwrap_or(false)
}

fn origin_key(url: &Url) -> String {
    format!(
        "{}://{}",
        url.scheme(),
        url.host_str().unwrap_or_default()
    )
}

struct JarInner {
    jar: Jar,
    tracked: Vec<StoredCookie>,
}

/// Process-wide cookie store with JSON persistence.
///
/// One lock covers the jar, the tracking log, and the file I/O of
/// `save`/`load`; per-fetch hold times are dwarfed by network I/O, so a
/// single coarse lock is enough under the parallel scheduler.
pub struct PersistentJar {
    path: PathBuf,
    inner: Mutex<JarInner>,
}

impl PersistentJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(JarInner {
                jar: Jar::default(),
                tracked: Vec::new(),
            }),
        }
    }

    /// `~/.ghostfetch/cookies.json`, anchored at the working directory when
    /// the home lookup fails.
    pub fn default_path() -> PathBuf {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".ghostfetch").join("cookies.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert cookies under `url`, updating the tracking log.
    pub fn set_cookies(&self, url: &Url, cookies: &[Cookie]) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = origin_key(url);
        for cookie in cookies {
            inner.jar.set(url, cookie);
            if let Some(pos) = inner
                .tracked
                .iter()
                .position(|t| t.name == cookie.name && t.url == key)
            {
                inner.tracked.remove(pos);
            }
            inner.tracked.push(StoredCookie {
                name: cookie.name.clone(),
                value: cookie.value.clone(),
                domain: cookie.domain.clone(),
                path: cookie.path.clone(),
                expires: cookie.expires,
                secure: cookie.secure,
                url: key.clone(),
            });
        }
    }

    /// Domain-aware retrieval for `url`.
    pub fn cookies(&self, url: &Url) -> Vec<Cookie> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.jar.get(url)
    }

    /// Write all non-expired tracked cookies to disk. The parent directory
    /// is created 0700 and the file lands atomically as 0600.
    pub fn save(&self) -> Result<(), CookieError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }

        let now = Utc::now();
        let active: Vec<&StoredCookie> = inner
            .tracked
            .iter()
            .filter(|t| t.expires.map(|at| at >= now).unwrap_or(true))
            .collect();
        let data = serde_json::to_vec_pretty(&active)?;

        let tmp = self.path.with_extension("json.tmp");
        write_private_file(&tmp, &data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the on-disk log into the jar, dropping expired tuples. A missing
    /// file is success with an empty store.
    pub fn load(&self) -> Result<(), CookieError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let saved: Vec<StoredCookie> = serde_json::from_slice(&data)?;

        let now = Utc::now();
        for stored in saved {
            if stored.expires.map(|at| at < now).unwrap_or(false) {
                continue;
            }
            let url = match Url::parse(&stored.url) {
                Ok(url) => url,
                Err(_) => continue,
            };
            inner.jar.set(
                &url,
                &Cookie {
                    name: stored.name.clone(),
                    value: stored.value.clone(),
                    domain: stored.domain.clone(),
                    path: stored.path.clone(),
                    expires: stored.expires,
                    secure: stored.secure,
                },
            );
            inner.tracked.push(stored);
        }
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    fs::write(path, data)
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    const FORMATS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%d %b %Y %H:%M:%S GMT",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}
