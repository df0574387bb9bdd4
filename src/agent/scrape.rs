//! # Scraping tools
//!
//! HTTP fetching plus two HTML tools for the agent:
//!
//! - [`ScrapeTool`] is driven entirely by a [`ScrapeToolConfig`]: a URL template, a CSS
//!   selector for the repeated item (a search hit, a table row, ...) and named field
//!   selectors inside it. Output is a JSON list of records.
//! - [`PageTextTool`] returns the readable text of one page.
//!
//! Parsing happens in plain synchronous functions after the body is downloaded, because a
//! parsed [`Html`] tree cannot be held across an await point.
//!
//! ```yaml
//! tools:
//!   - name: search_shows
//!     description: "Search TV shows by title. Input: the title."
//!     url_template: "https://shows.example/search?q={input}"
//!     item_selector: "div.show"
//!     limit: 5
//!     fields:
//!       - name: title
//!         selector: "h2"
//!       - name: link
//!         selector: "a"
//!         attr: href
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;

use tracing::{debug, info};

use super::tool::{Tool, ToolError};
use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// Placeholder replaced by the URL-encoded tool input.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Upper bound on the text [`PageTextTool`] returns.
pub const DEFAULT_PAGE_CHARS: usize = 4000;

/// Elements whose text is never part of a page's readable content.
const EXCLUDED_TAGS: [&str; 7] = ["script", "style", "noscript", "nav", "header", "footer", "head"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// HTTP client shared by the loader and the scraping tools.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Self::new(&config.user_agent, config.timeout_secs)
    }

    /// GET `url` and return the body as text.
    ///
    /// # Errors
    /// [`ToolError::Http`] on connection failures, timeouts and non-2xx statuses.
    pub async fn fetch(&self, url: &str) -> std::result::Result<String, ToolError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// One named value pulled out of every matched item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldSelector {
    pub name: String,
    /// Selector relative to the item; the item itself when absent.
    #[serde(default)]
    pub selector: Option<String>,
    /// Attribute to read instead of the element text.
    #[serde(default)]
    pub attr: Option<String>,
}

/// Declarative description of a [`ScrapeTool`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScrapeToolConfig {
    pub name: String,
    pub description: String,
    /// URL containing `{input}`. Without a template the input itself must be a URL.
    #[serde(default)]
    pub url_template: Option<String>,
    pub item_selector: String,
    pub fields: Vec<FieldSelector>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

struct CompiledField {
    name: String,
    selector: Option<Selector>,
    attr: Option<String>,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| Error::Config(format!("invalid CSS selector `{selector}`: {e}")))
}

/// Tool that extracts records from a page using configured selectors.
pub struct ScrapeTool {
    config: ScrapeToolConfig,
    fetcher: HttpFetcher,
    item: Selector,
    fields: Vec<CompiledField>,
}

impl ScrapeTool {
    /// # Errors
    /// [`Error::Config`] for invalid selectors, a template without `{input}`, no fields or a
    /// zero limit.
    pub fn new(config: ScrapeToolConfig, fetcher: HttpFetcher) -> Result<Self> {
        if let Some(template) = &config.url_template {
            if !template.contains(INPUT_PLACEHOLDER) {
                return Err(Error::Config(format!(
                    "url_template of tool `{}` has no {INPUT_PLACEHOLDER} placeholder",
                    config.name
                )));
            }
        }
        if config.fields.is_empty() {
            return Err(Error::Config(format!("tool `{}` has no fields", config.name)));
        }
        if config.limit == 0 {
            return Err(Error::Config(format!("tool `{}` has a zero limit", config.name)));
        }

        let item = parse_selector(&config.item_selector)?;
        let fields = config
            .fields
            .iter()
            .map(|field| {
                Ok(CompiledField {
                    name: field.name.clone(),
                    selector: field.selector.as_deref().map(parse_selector).transpose()?,
                    attr: field.attr.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            fetcher,
            item,
            fields,
        })
    }

    fn url_for(&self, input: &str) -> std::result::Result<String, ToolError> {
        match &self.config.url_template {
            Some(template) => {
                Ok(template.replace(INPUT_PLACEHOLDER, &urlencoding::encode(input)))
            }
            None => require_url(input),
        }
    }

    /// Records for every matched item, up to the limit.
    fn extract(&self, body: &str, page_url: &str) -> Vec<Map<String, Value>> {
        let document = Html::parse_document(body);
        let base = Url::parse(page_url).ok();

        document
            .select(&self.item)
            .filter_map(|item| {
                let mut record = Map::new();
                for field in &self.fields {
                    let target = match &field.selector {
                        Some(selector) => item.select(selector).next(),
                        None => Some(item),
                    };
                    let value = target.and_then(|el| field_value(el, field, base.as_ref()));
                    if let Some(value) = value {
                        record.insert(field.name.clone(), Value::String(value));
                    }
                }
                (!record.is_empty()).then_some(record)
            })
            .take(self.config.limit)
            .collect()
    }
}

fn field_value(element: ElementRef<'_>, field: &CompiledField, base: Option<&Url>) -> Option<String> {
    let value = match &field.attr {
        Some(attr) => {
            let raw = element.value().attr(attr)?.trim();
            match (attr.as_str(), base) {
                ("href" | "src", Some(base)) => base
                    .join(raw)
                    .map(|url| url.to_string())
                    .unwrap_or_else(|_| raw.to_string()),
                _ => raw.to_string(),
            }
        }
        None => collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")),
    };
    (!value.is_empty()).then_some(value)
}

fn require_url(input: &str) -> std::result::Result<String, ToolError> {
    let input = input.trim();
    if input.starts_with("http://") || input.starts_with("https://") {
        Ok(input.to_string())
    } else {
        Err(ToolError::InvalidInput(format!(
            "expected an http(s) URL, got {input:?}"
        )))
    }
}

#[async_trait]
impl Tool for ScrapeTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn input_schema(&self) -> Value {
        match self.config.url_template {
            Some(_) => json!({"type": "string", "description": "search text"}),
            None => json!({"type": "string", "format": "uri"}),
        }
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, ToolError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ToolError::InvalidInput("empty input".into()));
        }

        let url = self.url_for(input)?;
        let body = self.fetcher.fetch(&url).await?;
        let records = self.extract(&body, &url);
        if records.is_empty() {
            return Err(ToolError::EmptyResult(format!(
                "`{}` matched nothing on {url}",
                self.config.item_selector
            )));
        }

        info!("{} extracted {} records from {}", self.config.name, records.len(), url);
        serde_json::to_string(&records).map_err(|e| ToolError::Parse(e.to_string()))
    }
}

/// Tool that returns the visible text of a page.
pub struct PageTextTool {
    fetcher: HttpFetcher,
    max_chars: usize,
}

impl PageTextTool {
    pub const NAME: &'static str = "fetch_page";

    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            max_chars: DEFAULT_PAGE_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl Tool for PageTextTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text. Input: the page URL."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "string", "format": "uri"})
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, ToolError> {
        let url = require_url(input)?;
        let body = self.fetcher.fetch(&url).await?;
        let text = page_text(&body);
        if text.is_empty() {
            return Err(ToolError::EmptyResult(format!("{url} has no readable text")));
        }
        Ok(truncate_chars(&text, self.max_chars))
    }
}

/// Readable text of an HTML document, whitespace collapsed.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    collect_text(document.root_element(), &mut text);
    collapse_whitespace(&text)
}

fn collect_text(element: ElementRef<'_>, text: &mut String) {
    if EXCLUDED_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(node) = child.value().as_text() {
            text.push_str(node);
            text.push(' ');
        } else if let Some(child) = ElementRef::wrap(child) {
            collect_text(child, text);
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}... [content truncated]", &text[..cut]),
        None => text.to_string(),
    }
}
