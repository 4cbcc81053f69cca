use std::collections::HashSet;

use crate::arena::{Block, BlockClass, Page};
use crate::markup;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub thumb_url: String,
    pub large_url: String,
    pub original_url: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub content: String,
    pub title: Option<String>,
}

impl TextItem {
    pub fn markup(&self) -> String {
        markup::unescape_quotes(&self.content)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Image(ImageItem),
    Text(TextItem),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub index: usize,
    pub block_id: Option<u64>,
    pub page_url: Option<String>,
    pub kind: ItemKind,
}

impl Item {
    pub fn title(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Image(image) => image.title.as_deref(),
            ItemKind::Text(text) => text.title.as_deref(),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, ItemKind::Image(_))
    }

    pub fn large_url(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Image(image) => Some(&image.large_url),
            ItemKind::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    Added(usize),
    Duplicate,
    Ignored,
    Malformed(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSummary {
    pub added: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub malformed: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    items: Vec<Item>,
    seen: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, block: &Block) -> Accepted {
        let kind = match block.class {
            BlockClass::Image => {
                let Some(large_url) = block.display_url() else {
                    tracing::warn!(block = ?block.id, "image block without display url");
                    return Accepted::Malformed("image without display url");
                };
                if self.seen.contains(large_url) {
                    return Accepted::Duplicate;
                }
                let image = ImageItem {
                    thumb_url: block.thumb_url().unwrap_or(large_url).to_string(),
                    large_url: large_url.to_string(),
                    original_url: block.original_url().map(str::to_string),
                    title: block.title().map(str::to_string),
                };
                self.seen.insert(image.large_url.clone());
                ItemKind::Image(image)
            }
            BlockClass::Text => ItemKind::Text(TextItem {
                content: resolve_text_content(block),
                title: block.title().map(str::to_string),
            }),
            BlockClass::Other => return Accepted::Ignored,
        };

        let index = self.items.len();
        self.items.push(Item {
            index,
            block_id: block.id,
            page_url: block.page_url(),
            kind,
        });
        Accepted::Added(index)
    }

    pub fn accept_page(&mut self, page: &Page) -> PageSummary {
        let mut summary = PageSummary {
            malformed: page.len() - page.blocks().count(),
            ..PageSummary::default()
        };
        for block in page.blocks() {
            match self.accept(block) {
                Accepted::Added(_) => summary.added += 1,
                Accepted::Duplicate => summary.duplicates += 1,
                Accepted::Ignored => summary.ignored += 1,
                Accepted::Malformed(_) => summary.malformed += 1,
            }
        }
        summary
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn get_signed(&self, index: isize) -> Option<&Item> {
        usize::try_from(index).ok().and_then(|i| self.items.get(i))
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn image_count(&self) -> usize {
        self.seen.len()
    }
}

pub fn resolve_text_content(block: &Block) -> String {
    let html = block
        .content_html
        .as_deref()
        .filter(|html| !html.trim().is_empty());
    let resolved = match html {
        Some(html) => html.to_string(),
        None => markup::markdown_to_html(block.content.as_deref().unwrap_or_default()),
    };
    markup::escape_quotes(&resolved)
}
