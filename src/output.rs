//! Output formatting. All page content goes to standard output.

use std::collections::BTreeMap;
use std::io::{self, Write};

use http::HeaderMap;
use serde::Serialize;

use crate::fetch::FetchResult;
use crate::markdown::html_to_markdown;

#[derive(Debug, Default, Clone)]
pub struct OutputOptions {
    pub json: bool,
    /// Reader-mode markdown: main content only, boilerplate stripped.
    pub markdown: bool,
    /// Full-page markdown.
    pub markdown_full: bool,
}

#[derive(Serialize)]
struct JsonOutput {
    status: u16,
    headers: BTreeMap<String, Vec<String>>,
    body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    url: String,
}

#[derive(Serialize)]
struct ParallelJsonEntry {
    url: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

/// Write one fetch result: raw body by default, a JSON envelope with
/// `--json`, markdown with the markdown toggles.
pub fn format_output(
    writer: &mut dyn Write,
    result: &FetchResult,
    options: &OutputOptions,
) -> io::Result<()> {
    if !options.json {
        if options.markdown || options.markdown_full {
            return writeln!(writer, "{}", rendered_content(result, options));
        }
        return writer.write_all(&result.body);
    }

    let out = JsonOutput {
        status: result.status,
        headers: headers_to_map(&result.headers),
        body: rendered_content(result, options),
        url: result.url.clone(),
    };
    serde_json::to_writer_pretty(&mut *writer, &out)?;
    writeln!(writer)
}

/// Parallel text output. Each result is framed with `---` separator blocks
/// so downstream consumers can split the stream by page:
///
/// ```text
/// ---
/// # Page: <url>
/// url: <url>
/// ---
///
/// <content>
/// ```
///
/// Failed targets render as `# Error: <url>` blocks with the message inline.
pub fn format_parallel_results(
    writer: &mut dyn Write,
    results: &[FetchResult],
    options: &OutputOptions,
) -> io::Result<()> {
    for (i, result) in results.iter().enumerate() {
        match &result.error {
            Some(error) => {
                writeln!(writer, "---\n# Error: {}\n---\n\n{}", result.url, error)?;
            }
            None => {
                writeln!(
                    writer,
                    "---\n# Page: {}\nurl: {}\n---\n\n{}",
                    result.url,
                    result.url,
                    rendered_content(result, options)
                )?;
            }
        }
        if i < results.len() - 1 {
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Parallel JSON output: an array of `{url, status, headers, body, error}`.
pub fn format_parallel_json(
    writer: &mut dyn Write,
    results: &[FetchResult],
    options: &OutputOptions,
) -> io::Result<()> {
    let entries: Vec<ParallelJsonEntry> = results
        .iter()
        .map(|result| match &result.error {
            Some(error) => ParallelJsonEntry {
                url: result.url.clone(),
                status: result.status,
                headers: None,
                body: String::new(),
                error: error.clone(),
            },
            None => ParallelJsonEntry {
                url: result.url.clone(),
                status: result.status,
                headers: Some(headers_to_map(&result.headers)),
                body: rendered_content(result, options),
                error: String::new(),
            },
        })
        .collect();

    serde_json::to_writer_pretty(&mut *writer, &entries)?;
    writeln!(writer)
}

/// Body as text, converted to markdown when requested. Conversion failures
/// fall back to the raw content.
fn rendered_content(result: &FetchResult, options: &OutputOptions) -> String {
    let content = String::from_utf8_lossy(&result.body).into_owned();
    if options.markdown || options.markdown_full {
        let reader_mode = options.markdown;
        match html_to_markdown(&content, reader_mode) {
            Ok(markdown) => return markdown,
            Err(err) => log::debug!("markdown conversion failed: {}", err),
        }
    }
    content
}

fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}
