use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{CACHE_CONTROL, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

pub const ARENA_API_BASE: &str = "https://api.are.na/v2/channels";
pub const ARENA_BLOCK_URL: &str = "https://www.are.na/block";

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed base url {0} cannot carry a channel path")]
    InvalidBase(String),
    #[error("feed request to {url} failed with status {status}")]
    Status { url: String, status: StatusCode },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: ARENA_API_BASE.to_string(),
            user_agent: format!("arena-roll/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            http_client: None,
        }
    }
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("are.na client user agent required");
        }

        let base_url = Url::parse(config.base_url.trim())
            .with_context(|| format!("parse feed base url {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!(FeedError::InvalidBase(config.base_url));
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout)
                .build()
                .context("build feed http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn contents_url(&self, channel: &str, page: u32, per: u32) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::InvalidBase(self.base_url.to_string()))?
            .pop_if_empty()
            .push(channel)
            .push("contents");
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per", &per.to_string())
            .append_pair("direction", "desc");
        Ok(url)
    }

    pub fn contents(&self, channel: &str, page: u32, per: u32) -> Result<Page> {
        let url = self.contents_url(channel, page, per)?;
        let response = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .with_context(|| format!("request {url}"))?;

        if !response.status().is_success() {
            bail!(FeedError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let body: RawContents = response
            .json()
            .with_context(|| format!("decode contents page {page} of {channel}"))?;
        Ok(Page::from_values(page, body.contents))
    }
}

#[derive(Debug, Deserialize)]
struct RawContents {
    contents: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BlockClass {
    Image,
    Text,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub id: Option<u64>,
    pub class: BlockClass,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_html: Option<String>,
    #[serde(default)]
    pub image: Option<BlockImage>,
    #[serde(default)]
    pub source: Option<BlockSource>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BlockImage {
    #[serde(default)]
    pub thumb: Option<ImageVersion>,
    #[serde(default)]
    pub display: Option<ImageVersion>,
    #[serde(default)]
    pub large: Option<ImageVersion>,
    #[serde(default)]
    pub original: Option<ImageVersion>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ImageVersion {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BlockSource {
    #[serde(default)]
    pub url: Option<String>,
}

fn version_url(version: Option<&ImageVersion>) -> Option<&str> {
    version
        .and_then(|v| v.url.as_deref())
        .map(str::trim)
        .filter(|url| !url.is_empty())
}

impl Block {
    pub fn thumb_url(&self) -> Option<&str> {
        version_url(self.image.as_ref().and_then(|img| img.thumb.as_ref()))
    }

    pub fn display_url(&self) -> Option<&str> {
        version_url(self.image.as_ref().and_then(|img| img.display.as_ref()))
    }

    pub fn original_url(&self) -> Option<&str> {
        let image = self.image.as_ref()?;
        version_url(image.original.as_ref()).or_else(|| version_url(image.large.as_ref()))
    }

    pub fn title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }

    pub fn page_url(&self) -> Option<String> {
        self.source
            .as_ref()
            .and_then(|source| source.url.as_deref())
            .filter(|url| !url.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.id.map(|id| format!("{ARENA_BLOCK_URL}/{id}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Block(Block),
    Malformed { position: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub entries: Vec<Entry>,
}

impl Page {
    // elements decode one by one; a bad one becomes Entry::Malformed
    pub fn from_values(number: u32, values: Vec<serde_json::Value>) -> Self {
        let entries = values
            .into_iter()
            .enumerate()
            .map(|(position, value)| match serde_json::from_value::<Block>(value) {
                Ok(block) => Entry::Block(block),
                Err(err) => {
                    tracing::warn!(
                        page = number,
                        position,
                        error = %err,
                        "skipping malformed block"
                    );
                    Entry::Malformed {
                        position,
                        reason: err.to_string(),
                    }
                }
            })
            .collect();
        Self { number, entries }
    }

    pub fn from_json(number: u32, body: &str) -> Result<Self> {
        let raw: RawContents = serde_json::from_str(body).context("decode contents body")?;
        Ok(Self::from_values(number, raw.contents))
    }

    pub fn empty(number: u32) -> Self {
        Self {
            number,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Block(block) => Some(block),
            Entry::Malformed { .. } => None,
        })
    }

    pub fn leading_block(&self) -> Option<&Block> {
        match self.entries.first() {
            Some(Entry::Block(block)) => Some(block),
            _ => None,
        }
    }
}
