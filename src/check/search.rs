//! Web search and page fetching for the check loop.
//!
//! Search goes through DuckDuckGo's HTML endpoint, so no search API key is
//! needed; pages are reduced to plain text before they reach the prompt.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_HITS: usize = 5;
const PAGE_TEXT_CAP: usize = 15_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Seam between the check loop and the live web, so tests and fixtures can
/// stand in for the network.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
}

impl Default for SearchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(
                "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
            )
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("reqwest client");
        Self { http }
    }

    /// Top results for one query.
    async fn search_impl(&self, query: &str) -> Result<Vec<SearchHit>> {
        let body = self
            .http
            .post(SEARCH_ENDPOINT)
            .form(&[("q", query)])
            .send()
            .await
            .context("search request")?
            .error_for_status()
            .context("search non-2xx")?
            .text()
            .await
            .context("read search body")?;
        Ok(parse_results(&body))
    }

    /// Fetch a page and reduce it to capped plain text.
    async fn fetch_page_impl(&self, url: &str) -> Result<String> {
        let body = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("{url} non-2xx"))?
            .text()
            .await
            .context("read page body")?;
        Ok(page_text(&body))
    }
}

#[async_trait::async_trait]
impl SearchProvider for SearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.search_impl(query).await
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.fetch_page_impl(url).await
    }
}

/// Canned search results for tests and offline runs: every query returns
/// the same hits, every fetch the same page text.
#[derive(Default)]
pub struct FixtureSearch {
    pub hits: Vec<SearchHit>,
    pub page: String,
}

#[async_trait::async_trait]
impl SearchProvider for FixtureSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Ok(self.hits.clone())
    }

    async fn fetch_page(&self, _url: &str) -> Result<String> {
        Ok(self.page.clone())
    }
}

/// Parse the DuckDuckGo HTML result list: titles/links from `result__a`
/// anchors, snippets from `result__snippet`, paired by position.
pub fn parse_results(html: &str) -> Vec<SearchHit> {
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    static RE_SNIPPET: OnceCell<Regex> = OnceCell::new();
    let re_link = RE_LINK.get_or_init(|| {
        Regex::new(r#"(?is)<a[^>]+class="[^"]*result__a[^"]*"[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#)
            .unwrap()
    });
    let re_snippet = RE_SNIPPET.get_or_init(|| {
        Regex::new(r#"(?is)<[^>]+class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</a>"#).unwrap()
    });

    let snippets: Vec<String> = re_snippet
        .captures_iter(html)
        .map(|c| clean_fragment(&c[1]))
        .collect();

    re_link
        .captures_iter(html)
        .take(MAX_HITS)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: clean_fragment(&c[2]),
            url: unwrap_redirect(&c[1]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// DuckDuckGo wraps result URLs in a redirect carrying the real target in
/// the `uddg` query parameter.
fn unwrap_redirect(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let rest = &href[pos + 5..];
        let encoded = rest.split('&').next().unwrap_or(rest);
        return percent_decode(encoded);
    }
    href.to_string()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Strip tags from an inline HTML fragment and decode entities.
fn clean_fragment(fragment: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(fragment, "");
    let decoded = html_escape::decode_html_entities(&stripped);
    collapse_ws(&decoded)
}

/// Reduce a whole HTML document to plain text: drop script/style/nav/chrome
/// blocks, turn tags into line breaks, decode entities, cap the length.
pub fn page_text(html: &str) -> String {
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_BLANK: OnceCell<Regex> = OnceCell::new();
    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(
            r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<nav[^>]*>.*?</nav>|<footer[^>]*>.*?</footer>|<header[^>]*>.*?</header>",
        )
        .unwrap()
    });
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let re_blank = RE_BLANK.get_or_init(|| Regex::new(r"\n{2,}").unwrap());

    let without_blocks = re_blocks.replace_all(html, "\n");
    let without_tags = re_tags.replace_all(&without_blocks, "\n");
    let decoded = html_escape::decode_html_entities(&without_tags);

    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let line = collapse_ws(line);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    let joined = re_blank.replace_all(&lines.join("\n"), "\n").into_owned();
    truncate_chars(&joined, PAGE_TEXT_CAP)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}
