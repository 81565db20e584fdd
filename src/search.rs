//! Search engine aggregation: query URL builders and result scrapers.
//!
//! Each engine gets a scraper tuned to its result markup. Class names are
//! the stable-ish ones each engine has carried for a while; when they rot,
//! parsing degrades to an empty result list rather than an error.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

/// A single search result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// JSON envelope for search output.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub query: String,
    pub engine: String,
    pub results: Vec<SearchResult>,
}

/// Supported search engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Google,
    Bing,
    DuckDuckGo,
    Brave,
}

impl SearchEngine {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "google" => Some(Self::Google),
            "bing" => Some(Self::Bing),
            "duckduckgo" => Some(Self::DuckDuckGo),
            "brave" => Some(Self::Brave),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Bing => "bing",
            Self::DuckDuckGo => "duckduckgo",
            Self::Brave => "brave",
        }
    }

    /// Build the query URL for this engine.
    pub fn search_url(&self, query: &str, max_results: usize) -> String {
        let count = max_results.to_string();
        let url = match self {
            Self::Google => Url::parse_with_params(
                "https://www.google.com/search",
                &[("q", query), ("num", &count), ("hl", "en")],
            ),
            Self::Bing => Url::parse_with_params(
                "https://www.bing.com/search",
                &[("q", query), ("count", &count)],
            ),
            Self::DuckDuckGo => {
                Url::parse_with_params("https://html.duckduckgo.com/html/", &[("q", query)])
            }
            Self::Brave => Url::parse_with_params(
                "https://search.brave.com/search",
                &[("q", query), ("count", &count)],
            ),
        };
        url.map(|u| u.to_string()).unwrap_or_default()
    }

    /// Scrape results out of a fetched result page.
    pub fn parse(&self, body: &[u8]) -> Vec<SearchResult> {
        let document = Html::parse_document(&String::from_utf8_lossy(body));
        match self {
            Self::Google => parse_google(&document),
            Self::Bing => parse_bing(&document),
            Self::DuckDuckGo => parse_duckduckgo(&document),
            Self::Brave => parse_brave(&document),
        }
    }
}

fn selector(selector: &str) -> Selector {
    Selector::parse(selector)
        .unwrap_or_else(|err| panic!("invalid selector `{}`: {:?}", selector, err))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(element: ElementRef<'_>, sel: &Selector) -> String {
    element.select(sel).next().map(text_of).unwrap_or_default()
}

fn keep_if_nonempty(results: &mut Vec<SearchResult>, result: SearchResult) {
    if !result.title.is_empty() || !result.url.is_empty() {
        results.push(result);
    }
}

static GOOGLE_BLOCK: Lazy<Selector> = Lazy::new(|| selector("div.g"));
static GOOGLE_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href^=\"http\"]"));
static GOOGLE_TITLE: Lazy<Selector> = Lazy::new(|| selector("h3"));
static GOOGLE_SNIPPET: Lazy<Selector> = Lazy::new(|| selector("div.VwiC3b, div.IsZvec"));

fn parse_google(document: &Html) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for block in document.select(&GOOGLE_BLOCK) {
        let url = block
            .select(&GOOGLE_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_string();
        let result = SearchResult {
            title: first_text(block, &GOOGLE_TITLE),
            url,
            snippet: first_text(block, &GOOGLE_SNIPPET),
        };
        keep_if_nonempty(&mut results, result);
    }
    results
}

static BING_BLOCK: Lazy<Selector> = Lazy::new(|| selector("li.b_algo"));
static BING_LINK: Lazy<Selector> = Lazy::new(|| selector("h2 a[href^=\"http\"]"));
static BING_SNIPPET: Lazy<Selector> = Lazy::new(|| selector("div.b_caption p"));
static BING_CAPTION: Lazy<Selector> = Lazy::new(|| selector("div.b_caption"));

fn parse_bing(document: &Html) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for block in document.select(&BING_BLOCK) {
        let (title, url) = block
            .select(&BING_LINK)
            .next()
            .map(|a| {
                (
                    text_of(a),
                    a.value().attr("href").unwrap_or_default().to_string(),
                )
            })
            .unwrap_or_default();
        let mut snippet = first_text(block, &BING_SNIPPET);
        if snippet.is_empty() {
            snippet = first_text(block, &BING_CAPTION);
        }
        keep_if_nonempty(
            &mut results,
            SearchResult {
                title,
                url,
                snippet,
            },
        );
    }
    results
}

static DDG_BLOCK: Lazy<Selector> = Lazy::new(|| selector("div.result"));
static DDG_LINK: Lazy<Selector> = Lazy::new(|| selector("a.result__a"));
static DDG_SNIPPET: Lazy<Selector> = Lazy::new(|| selector(".result__snippet"));

fn parse_duckduckgo(document: &Html) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for block in document.select(&DDG_BLOCK) {
        let (title, url) = block
            .select(&DDG_LINK)
            .next()
            .map(|a| {
                (
                    text_of(a),
                    a.value().attr("href").unwrap_or_default().to_string(),
                )
            })
            .unwrap_or_default();
        keep_if_nonempty(
            &mut results,
            SearchResult {
                title,
                url,
                snippet: first_text(block, &DDG_SNIPPET),
            },
        );
    }
    results
}

static BRAVE_BLOCK: Lazy<Selector> = Lazy::new(|| selector("div.snippet[data-type=\"web\"]"));
static BRAVE_LINK: Lazy<Selector> = Lazy::new(|| selector(".snippet-title a[href^=\"http\"]"));
static BRAVE_SNIPPET: Lazy<Selector> = Lazy::new(|| selector(".snippet-description"));

fn parse_brave(document: &Html) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for block in document.select(&BRAVE_BLOCK) {
        let (title, url) = block
            .select(&BRAVE_LINK)
            .next()
            .map(|a| {
                (
                    text_of(a),
                    a.value().attr("href").unwrap_or_default().to_string(),
                )
            })
            .unwrap_or_default();
        keep_if_nonempty(
            &mut results,
            SearchResult {
                title,
                url,
                snippet: first_text(block, &BRAVE_SNIPPET),
            },
        );
    }
    results
}

/// Render results as a numbered markdown list under a `## Search:` heading.
pub fn format_search_results(query: &str, results: &[SearchResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Search: {:?}\n", query);
    for (i, result) in results.iter().enumerate() {
        let _ = writeln!(out, "{}. **[{}]({})**", i + 1, result.title, result.url);
        if !result.snippet.is_empty() {
            let _ = writeln!(out, "   {}", result.snippet);
        }
        let _ = writeln!(out);
    }
    out
}
