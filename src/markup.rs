use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<(/?)([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").expect("tag pattern")
});
static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("href pattern")
});
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("entity pattern"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space pattern"));

pub fn markdown_to_html(input: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(input, opts);
    let mut out = String::with_capacity(input.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub fn escape_quotes(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// `&amp;` goes last so entities already present in the markup survive.
pub fn unescape_quotes(input: &str) -> String {
    input
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn decode_entities(input: &str) -> String {
    ENTITY_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    "hellip" => Some('…'),
                    "mdash" => Some('—'),
                    "ndash" => Some('–'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

enum Token<'a> {
    Open { name: String, attrs: &'a str },
    Close { name: String },
    Text(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in TAG_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            tokens.push(Token::Text(&input[last..whole.start()]));
        }
        last = whole.end();
        let Some(name) = caps.get(2) else {
            // comment
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            tokens.push(Token::Close { name });
        } else {
            let attrs = caps.get(3).map_or("", |m| m.as_str());
            tokens.push(Token::Open { name, attrs });
        }
    }
    if last < input.len() {
        tokens.push(Token::Text(&input[last..]));
    }
    tokens
}

pub fn render(markup: &str) -> Text<'static> {
    let mut writer = MarkupWriter::default();
    for token in tokenize(markup) {
        match token {
            Token::Open { name, attrs } => writer.open(&name, attrs),
            Token::Close { name } => writer.close(&name),
            Token::Text(text) => writer.text(text),
        }
    }
    writer.flush_buffer();
    writer.into_text()
}

#[derive(Default)]
struct MarkupWriter {
    lines: Vec<RenderLine>,
    buffer: String,
    list_stack: Vec<ListState>,
    current_item: Option<ListMeta>,
    blockquote_depth: usize,
    heading_level: Option<u8>,
    pre: Option<String>,
    link_target: Option<String>,
    link_start: usize,
}

#[derive(Clone, Copy)]
struct ListState {
    ordered: bool,
    index: usize,
}

#[derive(Clone)]
struct ListMeta {
    indent: usize,
    marker: String,
}

#[derive(Clone)]
enum RenderLine {
    Text(String),
    Heading { level: u8, text: String },
    Bullet { indent: usize, marker: String, text: String },
    Quote { depth: usize, text: String },
    Code(String),
    Separator,
}

impl MarkupWriter {
    fn open(&mut self, name: &str, attrs: &str) {
        match name {
            "p" | "div" | "section" | "article" | "figure" | "figcaption" => self.flush_buffer(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_buffer();
                self.heading_level = name[1..].parse().ok();
            }
            "blockquote" => {
                self.flush_buffer();
                self.blockquote_depth += 1;
            }
            "pre" => {
                self.flush_buffer();
                self.pre = Some(String::new());
            }
            "ul" | "ol" => {
                self.flush_buffer();
                self.list_stack.push(ListState {
                    ordered: name == "ol",
                    index: 1,
                });
            }
            "li" => {
                self.flush_buffer();
                let indent = self.list_stack.len().saturating_sub(1);
                let marker = match self.list_stack.last() {
                    Some(state) if state.ordered => format!("{}.", state.index),
                    _ => "•".to_string(),
                };
                self.current_item = Some(ListMeta { indent, marker });
            }
            "br" => self.flush_buffer(),
            "hr" => {
                self.flush_buffer();
                self.lines.push(RenderLine::Text("―".repeat(20)));
                self.lines.push(RenderLine::Separator);
            }
            "img" => self.append_text("[image]"),
            "a" => {
                self.link_target = HREF_RE.captures(attrs).and_then(|caps| {
                    caps.get(1)
                        .or_else(|| caps.get(2))
                        .or_else(|| caps.get(3))
                        .map(|m| decode_entities(m.as_str()))
                });
                self.link_start = self.buffer.len();
            }
            "code" if self.pre.is_none() => self.append_text("`"),
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "p" | "div" | "section" | "article" | "figure" | "figcaption" => {
                self.flush_buffer();
                self.push_separator();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_buffer();
                self.heading_level = None;
                self.push_separator();
            }
            "blockquote" => {
                self.flush_buffer();
                self.blockquote_depth = self.blockquote_depth.saturating_sub(1);
                self.push_separator();
            }
            "pre" => {
                if let Some(code) = self.pre.take() {
                    for line in code.trim_end_matches('\n').split('\n') {
                        self.lines.push(RenderLine::Code(line.to_string()));
                    }
                    self.push_separator();
                }
            }
            "ul" | "ol" => {
                self.flush_buffer();
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.push_separator();
                }
            }
            "li" => {
                self.flush_buffer();
                if let Some(state) = self.list_stack.last_mut() {
                    state.index += 1;
                }
                self.current_item = None;
            }
            "a" => {
                if let Some(target) = self.link_target.take() {
                    let label = self.buffer.get(self.link_start..).unwrap_or("").trim();
                    if !target.is_empty() && label != target {
                        self.append_text(format!(" <{target}>"));
                    }
                }
            }
            "code" if self.pre.is_none() => self.append_text("`"),
            _ => {}
        }
    }

    fn text(&mut self, raw: &str) {
        let decoded = decode_entities(raw);
        if let Some(code) = self.pre.as_mut() {
            code.push_str(&decoded);
            return;
        }
        let collapsed = SPACE_RE.replace_all(&decoded, " ");
        if collapsed.trim().is_empty() && self.buffer.is_empty() {
            return;
        }
        self.append_text(collapsed);
    }

    fn append_text<T: AsRef<str>>(&mut self, text: T) {
        self.buffer.push_str(text.as_ref());
    }

    fn push_separator(&mut self) {
        if !matches!(self.lines.last(), None | Some(RenderLine::Separator)) {
            self.lines.push(RenderLine::Separator);
        }
    }

    fn flush_buffer(&mut self) {
        let text = self.consume_buffer();
        if text.is_empty() {
            return;
        }

        if let Some(level) = self.heading_level {
            self.lines.push(RenderLine::Heading { level, text });
            return;
        }

        if let Some(item) = &self.current_item {
            self.lines.push(RenderLine::Bullet {
                indent: item.indent,
                marker: item.marker.clone(),
                text,
            });
            return;
        }

        if self.blockquote_depth > 0 {
            self.lines.push(RenderLine::Quote {
                depth: self.blockquote_depth,
                text,
            });
            return;
        }

        self.lines.push(RenderLine::Text(text));
    }

    fn consume_buffer(&mut self) -> String {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        self.link_start = 0;
        text
    }

    fn into_text(mut self) -> Text<'static> {
        while matches!(self.lines.last(), Some(RenderLine::Separator)) {
            self.lines.pop();
        }

        let mut styled_lines = Vec::with_capacity(self.lines.len());
        for line in self.lines {
            match line {
                RenderLine::Text(content) => styled_lines.push(Line::from(Span::raw(content))),
                RenderLine::Heading { level, text } => {
                    styled_lines.push(Line::from(Span::styled(text, heading_style(level))));
                }
                RenderLine::Bullet {
                    indent,
                    marker,
                    text,
                } => {
                    styled_lines.push(Line::from(vec![
                        Span::raw("  ".repeat(indent)),
                        Span::styled(format!("{marker} "), Style::default().fg(Color::Yellow)),
                        Span::raw(text),
                    ]));
                }
                RenderLine::Quote { depth, text } => {
                    let prefix = "│".repeat(depth.max(1));
                    styled_lines.push(Line::from(vec![
                        Span::styled(prefix + " ", Style::default().fg(Color::Green)),
                        Span::styled(text, Style::default().fg(Color::Green)),
                    ]));
                }
                RenderLine::Code(text) => {
                    styled_lines.push(Line::from(Span::styled(
                        text,
                        Style::default().fg(Color::Cyan),
                    )));
                }
                RenderLine::Separator => styled_lines.push(Line::default()),
            }
        }

        if styled_lines.is_empty() {
            styled_lines.push(Line::from(Span::raw("")));
        }

        Text {
            lines: styled_lines,
            alignment: Some(Alignment::Left),
            style: Style::default(),
        }
    }
}

fn heading_style(level: u8) -> Style {
    match level {
        1 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        2 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        3 => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        _ => Style::default().fg(Color::Magenta),
    }
}

pub fn first_line(markup: &str) -> String {
    render(markup)
        .lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
}
