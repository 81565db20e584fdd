//! ghostfetch command-line interface.

use std::error::Error;
use std::io::Write;

use clap::Parser;

use ghostfetch::{
    extract_links, fetch_one, fetch_parallel, filter_links, format_links, format_output,
    format_parallel_json, format_parallel_results, format_search_results, FetchOptions,
    OutputOptions, SearchEngine, SearchOutput,
};

#[derive(Parser)]
#[command(
    name = "ghostfetch",
    version,
    about = "Fetch web pages like curl, but past bot detection",
    long_about = "ghostfetch fetches web pages with browser-grade TLS fingerprints,\n\
                  solves JavaScript challenges, and handles captchas via external\n\
                  services. It reads past bot detection without running a browser."
)]
struct Cli {
    /// URLs to fetch; more than one runs a parallel batch
    #[arg(required_unless_present = "search")]
    urls: Vec<String>,

    /// Browser to impersonate: chrome, firefox
    #[arg(short, long, default_value = "chrome")]
    browser: String,

    /// Total timeout per fetch (e.g. 30s, 2m)
    #[arg(short, long, default_value = "30s")]
    timeout: String,

    /// Don't load or save cookies
    #[arg(long)]
    no_cookies: bool,

    /// Print pipeline details to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Output JSON with body, status and headers
    #[arg(short, long)]
    json: bool,

    /// Convert to markdown (reader mode: main content only)
    #[arg(short, long)]
    markdown: bool,

    /// Convert the full page HTML to markdown
    #[arg(long)]
    markdown_full: bool,

    /// Extract page links instead of printing the body
    #[arg(long)]
    links: bool,

    /// Regex filter applied to extracted links (URL or text)
    #[arg(long)]
    filter: Option<String>,

    /// Run a web search instead of fetching a URL
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,

    /// Search engine: google, bing, duckduckgo, brave
    #[arg(long, default_value = "duckduckgo")]
    engine: String,

    /// Maximum number of search results
    #[arg(long, default_value_t = 10)]
    max_results: usize,

    /// Concurrent fetches in a batch
    #[arg(long, default_value_t = 5)]
    max_parallel: usize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("ghostfetch: {}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let options = FetchOptions {
        url: String::new(),
        browser: cli.browser.clone(),
        timeout: cli.timeout.clone(),
        no_cookies: cli.no_cookies,
        verbose: cli.verbose,
    };
    let output = OutputOptions {
        json: cli.json,
        markdown: cli.markdown,
        markdown_full: cli.markdown_full,
    };

    if let Some(query) = &cli.search {
        return run_search(query, &cli, &options).await;
    }

    if cli.links {
        return run_links(&cli, &options).await;
    }

    let stdout = std::io::stdout();
    if cli.urls.len() > 1 {
        let results = fetch_parallel(&cli.urls, &options, cli.max_parallel).await?;
        let mut writer = stdout.lock();
        if cli.json {
            format_parallel_json(&mut writer, &results, &output)?;
        } else {
            format_parallel_results(&mut writer, &results, &output)?;
        }
        // Per-target errors live in their slots; the batch itself succeeded.
        return Ok(());
    }

    let mut single = options;
    single.url = cli.urls[0].clone();
    let result = fetch_one(single).await?;
    format_output(&mut stdout.lock(), &result, &output)?;
    Ok(())
}

async fn run_links(cli: &Cli, options: &FetchOptions) -> Result<(), Box<dyn Error>> {
    let mut fetch_options = options.clone();
    fetch_options.url = cli.urls[0].clone();
    let result = fetch_one(fetch_options).await?;

    let mut links = extract_links(&result.body, &result.url);
    if let Some(pattern) = &cli.filter {
        let re = regex::Regex::new(pattern)
            .map_err(|e| format!("invalid filter pattern: {}", e))?;
        links = filter_links(links, &re);
    }

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut writer, &links)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_links(&links))?;
    }
    Ok(())
}

async fn run_search(
    query: &str,
    cli: &Cli,
    options: &FetchOptions,
) -> Result<(), Box<dyn Error>> {
    let engine = SearchEngine::from_name(&cli.engine)
        .ok_or_else(|| format!("unknown search engine: {}", cli.engine))?;

    let mut fetch_options = options.clone();
    fetch_options.url = engine.search_url(query, cli.max_results);
    let result = fetch_one(fetch_options).await?;

    let mut results = engine.parse(&result.body);
    results.truncate(cli.max_results);

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    if cli.json {
        let out = SearchOutput {
            query: query.to_string(),
            engine: engine.name().to_string(),
            results,
        };
        serde_json::to_writer_pretty(&mut writer, &out)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_search_results(query, &results))?;
    }
    Ok(())
}
