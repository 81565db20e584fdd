//! HTML to markdown conversion.
//!
//! Full-page mode converts the document as-is. Reader mode first narrows to
//! the `<article>`/`<main>` content when present and strips boilerplate
//! chrome, which is the shape agents usually want to read.

use htmd::HtmlToMarkdown;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkdownError {
    #[error("markdown conversion failed: {0}")]
    Convert(String),
}

const READER_STRIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "iframe", "noscript", "svg", "form",
];

static MAIN_CONTENT: Lazy<Selector> = Lazy::new(|| parse_selector("article, main"));

fn parse_selector(selector: &str) -> Selector {
    Selector::parse(selector)
        .unwrap_or_else(|err| panic!("invalid selector `{}`: {:?}", selector, err))
}

/// Convert HTML to markdown. `reader_mode` extracts the main content and
/// drops navigation chrome before converting.
pub fn html_to_markdown(html: &str, reader_mode: bool) -> Result<String, MarkdownError> {
    if !reader_mode {
        let markdown = htmd::convert(html).map_err(|e| MarkdownError::Convert(e.to_string()))?;
        return Ok(markdown.trim().to_string());
    }

    let document = Html::parse_document(html);
    let content = document
        .select(&MAIN_CONTENT)
        .next()
        .map(|node| node.html())
        .unwrap_or_else(|| html.to_string());

    let converter = HtmlToMarkdown::builder()
        .skip_tags(READER_STRIP_TAGS.to_vec())
        .build();
    let markdown = converter
        .convert(&content)
        .map_err(|e| MarkdownError::Convert(e.to_string()))?;
    Ok(markdown.trim().to_string())
}
