//! Link extraction from fetched pages.

use std::collections::HashSet;
use std::fmt::Write as _;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

/// One link found on a page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageLink {
    pub url: String,
    pub text: String,
}

static ANCHORS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href]").unwrap_or_else(|err| panic!("invalid selector: {:?}", err))
});

/// Extract all `<a href>` links, resolving relative targets against
/// `base_url`. Empty, fragment-only and `javascript:` hrefs are skipped and
/// duplicates (by resolved URL) collapse to the first occurrence.
pub fn extract_links(body: &[u8], base_url: &str) -> Vec<PageLink> {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };

    let document = Html::parse_document(&String::from_utf8_lossy(body));
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&ANCHORS) {
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.to_ascii_lowercase().starts_with("javascript:")
        {
            continue;
        }

        let resolved = match base.join(href) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => continue,
        };
        if !seen.insert(resolved.clone()) {
            continue;
        }

        let text = anchor.text().collect::<String>().trim().to_string();
        links.push(PageLink {
            url: resolved,
            text,
        });
    }

    links
}

/// Keep only links whose URL or text matches `pattern`.
pub fn filter_links(links: Vec<PageLink>, pattern: &regex::Regex) -> Vec<PageLink> {
    links
        .into_iter()
        .filter(|link| pattern.is_match(&link.url) || pattern.is_match(&link.text))
        .collect()
}

/// Render links as a markdown list, one `- [text](url)` per line. Links
/// without text use the URL as the label.
pub fn format_links(links: &[PageLink]) -> String {
    let mut out = String::new();
    for link in links {
        let text = if link.text.is_empty() {
            &link.url
        } else {
            &link.text
        };
        let _ = writeln!(out, "- [{}]({})", text, link.url);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><body>
            <a href="/docs">Docs</a>
            <a href="https://other.example/page">Other</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>
            <a href="">Empty</a>
            <a href="/docs">Docs again</a>
        </body></html>
    "##;

    #[test]
    fn resolves_skips_and_dedups() {
        let links = extract_links(PAGE.as_bytes(), "https://example.com/base/");
        assert_eq!(
            links,
            vec![
                PageLink {
                    url: "https://example.com/docs".to_string(),
                    text: "Docs".to_string(),
                },
                PageLink {
                    url: "https://other.example/page".to_string(),
                    text: "Other".to_string(),
                },
            ]
        );
    }

    #[test]
    fn filter_matches_url_or_text() {
        let links = extract_links(PAGE.as_bytes(), "https://example.com/");
        let re = regex::Regex::new("other").unwrap();
        let filtered = filter_links(links, &re);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "https://other.example/page");
    }

    #[test]
    fn formats_as_markdown_list() {
        let links = vec![
            PageLink {
                url: "https://a.example/".to_string(),
                text: "A".to_string(),
            },
            PageLink {
                url: "https://b.example/".to_string(),
                text: String::new(),
            },
        ];
        let out = format_links(&links);
        assert_eq!(
            out,
            "- [A](https://a.example/)\n- [https://b.example/](https://b.example/)\n"
        );
    }
}
