//! Fetch adapters: the external capability boundary of the pipeline.
//!
//! The pipeline only sees [`FetchAdapter`]: one opaque target string in, zero
//! or more result strings out, or a [`FetchError`] the item processor drops
//! locally. Two adapters exist: news search (query → article URLs, via a
//! Google News RSS feed) and article fetch (URL → extracted text).

use async_trait::async_trait;
use quick_xml::events::Event;
use scraper::{Html, Selector};
use std::time::Duration;

use crate::config::{FetchConfig, SearchConfig};
use crate::error::{Error, FetchError, Result};

#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Adapter label used in logs and summaries.
    fn name(&self) -> &str;

    /// Fetch one target. May fail; the caller treats every failure as
    /// per-target-skippable.
    async fn fetch(&self, target: &str) -> std::result::Result<Vec<String>, FetchError>;
}

// ============ News Search (query -> article URLs) ============

/// Searches a Google News RSS feed for a query and returns the article URLs
/// of every `<item>` in the result channel.
pub struct NewsSearchAdapter {
    client: reqwest::Client,
    endpoint: String,
    lang: String,
    region: String,
}

impl NewsSearchAdapter {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            lang: config.lang.clone(),
            region: config.region.clone(),
        })
    }
}

#[async_trait]
impl FetchAdapter for NewsSearchAdapter {
    fn name(&self) -> &str {
        "news-search"
    }

    async fn fetch(&self, target: &str) -> std::result::Result<Vec<String>, FetchError> {
        // ceid is region:language-prefix, e.g. "US:en" for lang "en-US".
        let lang_prefix = self.lang.split('-').next().unwrap_or(&self.lang);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", target),
                ("hl", &self.lang),
                ("gl", &self.region),
                ("ceid", &format!("{}:{}", self.region, lang_prefix)),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_rss_links(&body)
    }
}

/// Pull the `<link>` of every `<item>` out of an RSS channel, in document
/// order. The channel-level `<link>` (outside any item) is not a result.
pub fn parse_rss_links(xml: &str) -> std::result::Result<Vec<String>, FetchError> {
    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut links = Vec::new();
    let mut buf = Vec::new();
    let mut in_item = false;
    let mut in_link = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => in_item = true,
                b"link" if in_item => in_link = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"item" => in_item = false,
                b"link" => in_link = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_link => {
                let url = t
                    .unescape()
                    .map_err(|e| FetchError::Malformed(format!("rss text: {}", e)))?
                    .trim()
                    .to_string();
                if !url.is_empty() {
                    links.push(url);
                }
            }
            Ok(Event::CData(t)) if in_link => {
                let url = String::from_utf8_lossy(&t).trim().to_string();
                if !url.is_empty() {
                    links.push(url);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FetchError::Malformed(format!("rss: {}", e))),
        }
        buf.clear();
    }

    Ok(links)
}

// ============ Article Fetch (URL -> extracted text) ============

/// Fetches an article page and extracts its readable text. One target URL
/// yields at most one result string.
pub struct ArticleAdapter {
    client: reqwest::Client,
}

impl ArticleAdapter {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchAdapter for ArticleAdapter {
    fn name(&self) -> &str {
        "article"
    }

    async fn fetch(&self, target: &str) -> std::result::Result<Vec<String>, FetchError> {
        let response = self.client.get(target).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let html = response.text().await?;
        let text = extract_article_text(&html);
        if text.is_empty() {
            return Err(FetchError::Malformed("no readable text".to_string()));
        }
        Ok(vec![text])
    }
}

/// Content-bearing elements collected from the article root, in order.
const TEXT_SELECTOR: &str = "h1, h2, h3, p, li";

/// Containers tried (in order) as the article root before falling back to
/// `<body>`; skipping header/footer/nav chrome happens by never selecting it.
const ROOT_SELECTORS: &[&str] = &["article", "main", "[role='main']", "body"];

/// Extract readable article text: paragraph and heading text from the main
/// content container, one block per line, whitespace collapsed.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text_selector = Selector::parse(TEXT_SELECTOR).expect("static selector");

    for root_str in ROOT_SELECTORS {
        let root_selector = match Selector::parse(root_str) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let Some(root) = document.select(&root_selector).next() else {
            continue;
        };

        let blocks: Vec<String> = root
            .select(&text_selector)
            .map(|el| {
                el.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|block| !block.is_empty())
            .collect();

        if !blocks.is_empty() {
            return blocks.join("\n");
        }
    }

    String::new()
}
