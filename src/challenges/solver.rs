//! Sandboxed JavaScript evaluation for interstitial challenges.
//!
//! Challenge scripts run in a fresh Boa context that lives for a single
//! solve. A minimal set of browser globals is installed first; the
//! `document.cookie` setter routes into a capture global the host reads back
//! after evaluation. A host-side timer bounds the wall clock at 10 s, and
//! the interpreter's own runtime limits interrupt unbounded loops at the
//! next safe point.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use boa_engine::{
    js_string, Context, JsArgs, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source,
};
use thiserror::Error;
use url::Url;

/// Wall-clock limit for one solve.
pub const SOLVE_TIMEOUT: Duration = Duration::from_secs(10);

const LOOP_ITERATION_LIMIT: u64 = 8_000_000;
const RECURSION_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("script execution timed out")]
    Timeout,
    #[error("script error: {0}")]
    Script(String),
}

/// Cookie captured from the script's `document.cookie` setter. Both fields
/// are empty when the script never wrote a cookie.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SolveResult {
    pub cookie_name: String,
    pub cookie_value: String,
}

/// One-shot JavaScript solver bound to the page being challenged.
pub struct JsSolver {
    page_url: String,
    user_agent: String,
}

impl JsSolver {
    pub fn new(page_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Evaluate `script` and return the captured cookie.
    ///
    /// The interpreter runs on a blocking thread; the timer here wins the
    /// race against runaway scripts, and the interpreter's loop limit stops
    /// the abandoned thread shortly after.
    pub async fn solve(&self, script: &str) -> Result<SolveResult, SolveError> {
        let prelude = build_prelude(&self.page_url, &self.user_agent);
        let script = script.to_owned();

        let handle = tokio::task::spawn_blocking(move || run_sandbox(&prelude, &script));
        match tokio::time::timeout(SOLVE_TIMEOUT, handle).await {
            Err(_) => Err(SolveError::Timeout),
            Ok(Err(join_err)) => Err(SolveError::Script(join_err.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

fn run_sandbox(prelude: &str, script: &str) -> Result<SolveResult, SolveError> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context
        .runtime_limits_mut()
        .set_recursion_limit(RECURSION_LIMIT);

    register_base64_globals(&mut context)?;

    context
        .eval(Source::from_bytes(prelude))
        .map_err(|e| SolveError::Script(format!("prelude: {}", e)))?;

    if let Err(err) = context.eval(Source::from_bytes(script)) {
        let message = err.to_string();
        if is_interrupt(&message) {
            return Err(SolveError::Timeout);
        }
        return Err(SolveError::Script(message));
    }

    read_capture(&mut context)
}

/// Runtime-limit aborts are the interpreter observing the interrupt, not a
/// fault in the script itself.
fn is_interrupt(message: &str) -> bool {
    message.contains("iteration limit") || message.contains("recursion limit")
}

fn read_capture(context: &mut Context) -> Result<SolveResult, SolveError> {
    let captured = context
        .eval(Source::from_bytes("__cookie_capture"))
        .map_err(|e| SolveError::Script(e.to_string()))?;
    let raw = captured
        .to_string(context)
        .map_err(|e| SolveError::Script(e.to_string()))?
        .to_std_string_escaped();
    Ok(parse_cookie_assignment(&raw))
}

/// `name=value; …attributes…` — the first `;` bounds the head, the first `=`
/// inside the trimmed head splits name and value. Attributes are ignored.
fn parse_cookie_assignment(raw: &str) -> SolveResult {
    let head = raw.split(';').next().unwrap_or("").trim();
    match head.split_once('=') {
        Some((name, value)) => SolveResult {
            cookie_name: name.to_string(),
            cookie_value: value.to_string(),
        },
        None => SolveResult::default(),
    }
}

fn register_base64_globals(context: &mut Context) -> Result<(), SolveError> {
    context
        .register_global_callable(js_string!("atob"), 1, NativeFunction::from_fn_ptr(atob))
        .map_err(|e| SolveError::Script(e.to_string()))?;
    context
        .register_global_callable(js_string!("btoa"), 1, NativeFunction::from_fn_ptr(btoa))
        .map_err(|e| SolveError::Script(e.to_string()))?;
    Ok(())
}

fn atob(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let encoded = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    let decoded = BASE64
        .decode(encoded.trim().as_bytes())
        .map_err(|_| JsNativeError::typ().with_message("invalid base64"))?;
    let text: String = decoded.iter().map(|&b| b as char).collect();
    Ok(JsString::from(text.as_str()).into())
}

fn btoa(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let raw = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    let mut bytes = Vec::with_capacity(raw.len());
    for ch in raw.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return Err(JsNativeError::typ()
                .with_message("character out of latin1 range")
                .into());
        }
        bytes.push(code as u8);
    }
    Ok(JsString::from(BASE64.encode(&bytes).as_str()).into())
}

fn js_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn build_prelude(page_url: &str, user_agent: &str) -> String {
    let parsed = Url::parse(page_url).ok();
    let hostname = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .unwrap_or_default()
        .to_string();
    let pathname = parsed
        .as_ref()
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let protocol = parsed
        .as_ref()
        .map(|u| format!("{}:", u.scheme()))
        .unwrap_or_default();
    let host = parsed
        .as_ref()
        .map(|u| match u.port() {
            Some(port) => format!("{}:{}", hostname, port),
            None => hostname.clone(),
        })
        .unwrap_or_default();

    format!(
        r#"
var __cookie_capture = "";
function setTimeout(cb, delay) {{ if (typeof cb === "function") {{ cb(); }} return 0; }}
function clearTimeout() {{}}
var console = {{ log: function() {{}}, error: function() {{}} }};
var document = {{
    createElement: function(tag) {{
        var element = {{
            tagName: String(tag).toUpperCase(),
            setAttribute: function(name, value) {{ element[name] = value; }},
            getAttribute: function(name) {{
                return element[name] === undefined ? null : element[name];
            }}
        }};
        return element;
    }},
    getElementById: function() {{ return null; }},
    getElementsByTagName: function() {{ return []; }}
}};
Object.defineProperty(document, "cookie", {{
    get: function() {{ return ""; }},
    set: function(v) {{ __cookie_capture = String(v); }},
    configurable: true
}});
var location = {{
    href: {href},
    hostname: {hostname},
    pathname: {pathname},
    protocol: {protocol},
    host: {host}
}};
var window = {{ location: location, document: document }};
var navigator = {{
    userAgent: {user_agent},
    language: "en-US",
    languages: ["en-US", "en"],
    platform: "Win32"
}};
window.navigator = navigator;
"#,
        href = js_quote(page_url),
        hostname = js_quote(&hostname),
        pathname = js_quote(&pathname),
        protocol = js_quote(&protocol),
        host = js_quote(&host),
        user_agent = js_quote(user_agent),
    )
}
