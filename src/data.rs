use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;

use crate::arena::{self, Page};

pub trait FeedService: Send + Sync {
    fn channel(&self) -> &str;
    fn load_page(&self, page: u32, per: u32) -> Result<Page>;
}

pub struct ArenaFeedService {
    client: Arc<arena::Client>,
    channel: String,
}

impl ArenaFeedService {
    pub fn new(client: Arc<arena::Client>, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }
}

impl FeedService for ArenaFeedService {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn load_page(&self, page: u32, per: u32) -> Result<Page> {
        self.client
            .contents(&self.channel, page, per)
            .with_context(|| format!("fetch page {page} of {}", self.channel))
    }
}

#[derive(Default)]
pub struct MockFeedService {
    channel: String,
    script: Mutex<VecDeque<std::result::Result<Page, String>>>,
    requests: Mutex<Vec<(u32, u32)>>,
}

impl MockFeedService {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Self::default()
        }
    }

    pub fn push_page(&self, page: Page) -> &Self {
        self.script.lock().push_back(Ok(page));
        self
    }

    pub fn push_json(&self, body: &str) -> Result<&Self> {
        let number = self.script.lock().len() as u32 + 1;
        let page = Page::from_json(number, body)?;
        Ok(self.push_page(page))
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.script.lock().push_back(Err(message.into()));
        self
    }

    pub fn requests(&self) -> Vec<(u32, u32)> {
        self.requests.lock().clone()
    }
}

impl FeedService for MockFeedService {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn load_page(&self, page: u32, per: u32) -> Result<Page> {
        self.requests.lock().push((page, per));
        match self.script.lock().pop_front() {
            Some(Ok(mut scripted)) => {
                scripted.number = page;
                Ok(scripted)
            }
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Page::empty(page)),
        }
    }
}
