//! Title/description extraction: validate the target URL, fetch it once,
//! parse whatever body comes back as HTML and pick out `<title>` and
//! `<meta name="description">`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use scraper::{Html, Selector};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::ExtractionResult;

mod client;

pub use client::MetadataClient;

pub const INVALID_URL_MESSAGE: &str = "Must be a valid URL";

/// Upstream bytes read before parsing; the rest of the body is dropped.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// ── Fallback policy ────────────────────────────────────────────────────────

/// Values used when a page has no title or no description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FallbackPolicy {
    /// `""` for both fields.
    #[default]
    Empty,
    /// `"(no title)"` / `"(no description)"`.
    Sentinel,
}

impl FallbackPolicy {
    pub fn title(self) -> &'static str {
        match self {
            FallbackPolicy::Empty => "",
            FallbackPolicy::Sentinel => "(no title)",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FallbackPolicy::Empty => "",
            FallbackPolicy::Sentinel => "(no description)",
        }
    }
}

// ── Public helpers ─────────────────────────────────────────────────────────

/// Returns `true` if `ip` is a private, loopback, or link-local address.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            matches!(
                o,
                [127, ..]
                    | [10, ..]
                    | [169, 254, ..]
                    | [192, 168, ..]
                    | [0, ..]
                    | [255, 255, 255, 255]
            ) || (o[0] == 172 && (16..=31).contains(&o[1]))
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00 == 0xfc00)
                || (v6.segments()[0] & 0xffc0 == 0xfe80)
        }
    }
}

/// Syntactic check that `raw` is an absolute URI with a scheme and an
/// authority. Never touches the network.
///
/// The raw text is checked before `Url::parse`, which would otherwise repair
/// input such as `http:example.com` or embedded tabs and fetch a different URL.
pub fn validate_target_url(raw: &str) -> AppResult<Url> {
    let invalid = || AppError::InvalidInput(INVALID_URL_MESSAGE.into());

    if !has_uri_shape(raw) {
        return Err(invalid());
    }

    let parsed = Url::parse(raw).map_err(|_| invalid())?;
    if parsed.cannot_be_a_base() || !parsed.has_host() {
        return Err(invalid());
    }
    Ok(parsed)
}

/// `scheme "://" authority [path-abempty] [?query] [#fragment]` with no
/// whitespace, control characters, backslashes or malformed percent escapes.
fn has_uri_shape(raw: &str) -> bool {
    if raw
        .chars()
        .any(|c| c.is_ascii_whitespace() || c.is_control() || c == '\\')
    {
        return false;
    }

    let bytes = raw.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'%'
            && !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
        {
            return false;
        }
    }

    let Some((scheme, rest)) = raw.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let scheme_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !scheme_ok {
        return false;
    }

    let Some(after_slashes) = rest.strip_prefix("//") else {
        return false;
    };
    let authority = after_slashes
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    !authority.is_empty()
}

/// `true` when the URL's host is a literal address (or `localhost`) pointing
/// at the local machine or a private network. No DNS lookup is made.
pub fn targets_private_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(v4)) => is_private_ip(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_private_ip(IpAddr::V6(v6)),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            domain.eq_ignore_ascii_case("localhost")
                || domain.to_ascii_lowercase().ends_with(".localhost")
        }
        None => false,
    }
}

/// Parse `html` and pull out the first `<title>` and the first
/// `<meta name="description">` in document order.
///
/// The HTML parser itself never rejects input, so malformed markup still
/// yields a result.
pub fn extract_from_html(html: &str, fallback: FallbackPolicy) -> AppResult<ExtractionResult> {
    let document = Html::parse_document(html);

    let title = get_title_tag(&document)?.unwrap_or_else(|| fallback.title().to_string());
    let description =
        get_meta_description(&document)?.unwrap_or_else(|| fallback.description().to_string());

    Ok(ExtractionResult { title, description })
}

fn selector(css: &str) -> AppResult<Selector> {
    Selector::parse(css).map_err(|e| AppError::Parse(format!("selector {css:?}: {e:?}")))
}

fn get_title_tag(doc: &Html) -> AppResult<Option<String>> {
    let selector = selector("title")?;
    Ok(doc
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>()))
}

fn get_meta_description(doc: &Html) -> AppResult<Option<String>> {
    let selector = selector("meta")?;
    // Only the first description meta counts, even when it lacks `content`.
    Ok(doc
        .select(&selector)
        .find(|el| el.value().attr("name") == Some("description"))
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string))
}

// ── Extraction service ─────────────────────────────────────────────────────

/// Anything that can turn a target URL into an [`ExtractionResult`]: the
/// in-process [`MetadataExtractor`] or a remote [`MetadataClient`].
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, target_url: &str) -> AppResult<ExtractionResult>;
}

/// Runs the validate → fetch → parse → select pipeline.
///
/// Cheaply cloneable; the underlying `reqwest::Client` shares its connection
/// pool between clones.
#[derive(Clone, Debug)]
pub struct MetadataExtractor {
    client: ReqwestClient,
    fallback: FallbackPolicy,
    block_private_targets: bool,
    max_body_bytes: usize,
}

impl MetadataExtractor {
    pub fn new(client: ReqwestClient, fallback: FallbackPolicy) -> Self {
        MetadataExtractor {
            client,
            fallback,
            block_private_targets: false,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    /// Build an extractor with its own HTTP client using `fetch_timeout`.
    pub fn with_timeout(fetch_timeout: Duration, fallback: FallbackPolicy) -> AppResult<Self> {
        let client = ReqwestClient::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| {
                tracing::error!(error = ?e, "Failed to build HTTP client");
                AppError::Internal
            })?;
        Ok(Self::new(client, fallback))
    }

    pub fn block_private_targets(mut self, block: bool) -> Self {
        self.block_private_targets = block;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    pub async fn extract(&self, target_url: &str) -> AppResult<ExtractionResult> {
        let url = validate_target_url(target_url).map_err(|e| {
            tracing::info!(url = %target_url, "Rejected invalid target URL");
            e
        })?;

        if self.block_private_targets && targets_private_host(&url) {
            tracing::warn!(url = %url, "Rejected target URL pointing at a private address");
            return Err(AppError::InvalidInput(INVALID_URL_MESSAGE.into()));
        }

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            tracing::error!(error = ?e, url = %url, "Failed to fetch target URL");
            AppError::Fetch(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            // Error pages still carry a title worth returning.
            tracing::debug!(%status, url = %url, "Upstream returned non-success status");
        }

        let body = read_capped(response, self.max_body_bytes)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "Failed to read response body");
                AppError::Fetch(e.to_string())
            })?;
        let html = String::from_utf8_lossy(&body).into_owned();

        let fallback = self.fallback;
        let result = tokio::task::spawn_blocking(move || extract_from_html(&html, fallback))
            .await
            .map_err(|e| AppError::Parse(format!("parser task failed: {e}")))
            .and_then(|r| r);

        if let Err(ref e) = result {
            tracing::error!(error = %e, url = %url, "Failed to parse response body");
        }
        result
    }

    /// Like [`extract`](Self::extract), but gives up as soon as `cancel`
    /// fires, dropping the in-flight request.
    pub async fn extract_cancellable(
        &self,
        target_url: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ExtractionResult> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(url = %target_url, "Extraction cancelled");
                Err(AppError::Fetch("cancelled".into()))
            }
            result = self.extract(target_url) => result,
        }
    }
}

/// Read at most `limit` bytes of the body. Larger bodies are truncated, not
/// rejected: the title and description live near the top of a page.
async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::with_capacity(
        response
            .content_length()
            .map_or(0, |len| (len as usize).min(limit)),
    );
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            tracing::debug!(limit, "Upstream body truncated");
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[async_trait]
impl MetadataSource for MetadataExtractor {
    async fn fetch(&self, target_url: &str) -> AppResult<ExtractionResult> {
        self.extract(target_url).await
    }
}

/// The metadata source bookmark sync should use: the remote endpoint at
/// `FUNCTION_URL` when one is configured, otherwise an in-process extractor.
pub fn source_from_config(config: &Config) -> AppResult<Arc<dyn MetadataSource>> {
    let extractor = MetadataExtractor::with_timeout(config.fetch_timeout, config.fallback)?
        .block_private_targets(config.block_private_targets);

    match &config.function_url {
        Some(endpoint) => {
            tracing::debug!(%endpoint, "Using remote metadata endpoint");
            Ok(Arc::new(MetadataClient::new(extractor.client, endpoint)?))
        }
        None => Ok(Arc::new(extractor)),
    }
}

// ── Unit tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> ExtractionResult {
        extract_from_html(html, FallbackPolicy::Empty).unwrap()
    }

    #[test]
    fn accepts_absolute_http_urls() {
        assert!(validate_target_url("https://example.com").is_ok());
        assert!(validate_target_url("http://example.com:8080/a/b?c=d#e").is_ok());
        assert!(validate_target_url("http://127.0.0.1/").is_ok());
    }

    #[test]
    fn rejects_empty_url() {
        assert!(matches!(
            validate_target_url(""),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(validate_target_url("example.com").is_err());
        assert!(validate_target_url("//example.com/path").is_err());
        assert!(validate_target_url("not-a-url").is_err());
    }

    #[test]
    fn rejects_missing_authority() {
        assert!(validate_target_url("mailto:someone@example.com").is_err());
        assert!(validate_target_url("file:///etc/passwd").is_err());
        assert!(validate_target_url("http://").is_err());
        assert!(validate_target_url("http:example.com").is_err());
        assert!(validate_target_url("http:/example.com").is_err());
        assert!(validate_target_url("http:///example.com").is_err());
        assert!(validate_target_url("https:\\\\example.com").is_err());
        assert!(validate_target_url("://example.com").is_err());
        assert!(validate_target_url("1http://example.com").is_err());
    }

    #[test]
    fn rejects_text_the_url_parser_would_repair() {
        for raw in [
            "http://exa\tmple.com/",
            "http://example.com/\npath",
            "http://example.com/a b",
            "http://example.com\\path",
            "http://example.com/%zz",
            "http://example.com/%4",
        ] {
            assert!(validate_target_url(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn keeps_well_formed_escapes_and_queries() {
        let url = validate_target_url("https://example.com/a%20b?q=1#top").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a%20b?q=1#top");
        assert!(validate_target_url("https://user@example.com:8443").is_ok());
    }

    #[test]
    fn rejects_surrounding_whitespace() {
        assert!(validate_target_url(" https://example.com").is_err());
        assert!(validate_target_url("https://example.com\n").is_err());
    }

    #[test]
    fn flags_private_literal_hosts() {
        let private = |s: &str| targets_private_host(&Url::parse(s).unwrap());
        assert!(private("http://127.0.0.1/"));
        assert!(private("http://10.1.2.3/"));
        assert!(private("http://172.16.0.1/"));
        assert!(private("http://192.168.1.1/"));
        assert!(private("http://169.254.169.254/latest/meta-data"));
        assert!(private("http://[::1]/"));
        assert!(private("http://localhost:3000/"));
        assert!(!private("http://8.8.8.8/"));
        assert!(!private("http://[2606:4700:4700::1111]/"));
        assert!(!private("https://example.com/"));
    }

    #[test]
    fn extracts_title_and_description() {
        let html = r#"<html><head>
            <title>Example</title>
            <meta name="description" content="Example desc">
        </head><body></body></html>"#;
        assert_eq!(
            extract(html),
            ExtractionResult {
                title: "Example".into(),
                description: "Example desc".into(),
            }
        );
    }

    #[test]
    fn missing_title_uses_fallback() {
        let html = r#"<html><head><meta name="description" content="D"></head></html>"#;
        assert_eq!(extract(html).title, "");

        let sentinel = extract_from_html(html, FallbackPolicy::Sentinel).unwrap();
        assert_eq!(sentinel.title, "(no title)");
        assert_eq!(sentinel.description, "D");
    }

    #[test]
    fn missing_description_uses_fallback() {
        let html = "<html><head><title>T</title></head></html>";
        assert_eq!(extract(html).description, "");

        let sentinel = extract_from_html(html, FallbackPolicy::Sentinel).unwrap();
        assert_eq!(sentinel.description, "(no description)");
    }

    #[test]
    fn first_description_wins() {
        let html = r#"<head>
            <meta name="description" content="first">
            <meta name="description" content="second">
        </head>"#;
        assert_eq!(extract(html).description, "first");
    }

    #[test]
    fn first_title_wins() {
        let html = "<head><title>one</title></head><body><title>two</title></body>";
        assert_eq!(extract(html).title, "one");
    }

    #[test]
    fn description_without_content_falls_back() {
        let html = r#"<head>
            <meta name="description">
            <meta name="description" content="second">
        </head>"#;
        assert_eq!(extract(html).description, "");
    }

    #[test]
    fn description_name_match_is_case_sensitive() {
        let html = r#"<head>
            <meta name="Description" content="capitalised">
            <meta name="description" content="exact">
        </head>"#;
        assert_eq!(extract(html).description, "exact");
    }

    #[test]
    fn ignores_other_meta_tags() {
        let html = r#"<head>
            <meta charset="utf-8">
            <meta property="og:description" content="og">
            <meta name="keywords" content="a, b">
        </head>"#;
        assert_eq!(extract(html).description, "");
    }

    #[test]
    fn tolerates_malformed_markup() {
        let html = "<html><head><title>Unclosed<meta name=description content=bare></head><body><p>text";
        let result = extract(html);
        assert!(result.title.starts_with("Unclosed"));
    }

    #[test]
    fn title_text_is_not_trimmed() {
        let html = "<title>  spaced out  </title>";
        assert_eq!(extract(html).title, "  spaced out  ");
    }

    #[test]
    fn decodes_entities() {
        let html = r#"<title>Tom &amp; Jerry</title><meta name="description" content="a &lt; b">"#;
        let result = extract(html);
        assert_eq!(result.title, "Tom & Jerry");
        assert_eq!(result.description, "a < b");
    }

    #[test]
    fn empty_body_yields_fallbacks() {
        let result = extract_from_html("", FallbackPolicy::Sentinel).unwrap();
        assert_eq!(result.title, "(no title)");
        assert_eq!(result.description, "(no description)");
    }

    #[test]
    fn extraction_recovers_generated_values() {
        let cases = [
            ("Plain", "Simple description"),
            ("Ünïcödé — title", "日本語の説明"),
            ("", "only description"),
            ("Title with 'quotes'", "desc with \"quotes\""),
        ];
        for (title, description) in cases {
            let html = format!(
                "<!doctype html><html><head><title>{}</title><meta name=\"description\" content=\"{}\"></head><body><p>x</p></body></html>",
                title,
                description.replace('"', "&quot;")
            );
            let first = extract(&html);
            assert_eq!(first.title, title);
            assert_eq!(first.description, description);
            assert_eq!(extract(&html), first);
        }
    }

    #[test]
    fn fallback_policy_parses_case_insensitively() {
        assert_eq!("empty".parse::<FallbackPolicy>().unwrap(), FallbackPolicy::Empty);
        assert_eq!(
            "Sentinel".parse::<FallbackPolicy>().unwrap(),
            FallbackPolicy::Sentinel
        );
        assert!("other".parse::<FallbackPolicy>().is_err());
        assert_eq!(FallbackPolicy::Sentinel.to_string(), "sentinel");
    }

    #[tokio::test]
    async fn invalid_url_never_reaches_the_network() {
        use wiremock::matchers::any;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_raw("<title>x</title>", "text/html"))
            .expect(0)
            .mount(&server)
            .await;
        let addr = server.address();

        let extractor = MetadataExtractor::new(ReqwestClient::new(), FallbackPolicy::Empty);
        for raw in [
            String::new(),
            addr.to_string(),
            format!("http:{addr}/"),
            format!("http:/{addr}/"),
            format!("http:\\\\{addr}/"),
            format!("http://{addr}/a b"),
            "mailto:a@b.c".to_string(),
            "http://".to_string(),
        ] {
            assert!(
                matches!(extractor.extract(&raw).await, Err(AppError::InvalidInput(_))),
                "expected InvalidInput for {raw:?}"
            );
        }
        // `expect(0)` is verified when `server` drops.
    }

    #[tokio::test]
    async fn oversized_body_is_truncated_before_parsing() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let padding = "x".repeat(4096);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/head"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!("<title>Early</title><body>{padding}</body>"),
                "text/html",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tail"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!("<body>{padding}</body><title>Late</title>"),
                "text/html",
            ))
            .mount(&server)
            .await;

        let extractor =
            MetadataExtractor::new(ReqwestClient::new(), FallbackPolicy::Empty).max_body_bytes(256);

        let early = extractor.extract(&format!("{}/head", server.uri())).await.unwrap();
        assert_eq!(early.title, "Early");

        let late = extractor.extract(&format!("{}/tail", server.uri())).await.unwrap();
        assert_eq!(late.title, "");
    }

    #[tokio::test]
    async fn blocked_private_target_is_invalid_input() {
        let extractor = MetadataExtractor::new(ReqwestClient::new(), FallbackPolicy::Empty)
            .block_private_targets(true);
        assert!(matches!(
            extractor.extract("http://127.0.0.1:1/").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_extraction_returns_fetch_error() {
        let extractor = MetadataExtractor::new(ReqwestClient::new(), FallbackPolicy::Empty);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = extractor
            .extract_cancellable("http://example.invalid/", &cancel)
            .await;
        assert!(matches!(result, Err(AppError::Fetch(_))));
    }

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    #[tokio::test]
    async fn configured_function_url_routes_through_remote_endpoint() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fetchTitle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Remote",
                "description": "From the endpoint",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/fetchTitle", server.uri());
        let source = source_from_config(&config_with(&[("FUNCTION_URL", &endpoint)])).unwrap();
        let found = source.fetch("https://example.com/").await.unwrap();
        assert_eq!(found.title, "Remote");
    }

    #[tokio::test]
    async fn without_function_url_source_extracts_in_process() {
        let source = source_from_config(&config_with(&[("BLOCK_PRIVATE_TARGETS", "true")])).unwrap();
        // The local extractor applies the configured private-target check.
        assert!(matches!(
            source.fetch("http://127.0.0.1:1/").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn invalid_function_url_is_rejected() {
        assert!(source_from_config(&config_with(&[("FUNCTION_URL", "not a url")])).is_err());
    }
}
