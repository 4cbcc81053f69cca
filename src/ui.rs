use std::io::{self, Cursor, Stdout, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::cursor::MoveTo;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::style::Print;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use crossterm::ExecutableCommand;
use percent_encoding::percent_decode_str;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;
use url::Url;

use crate::data::FeedService;
use crate::feed::{self, LoadEvent};
use crate::input::{self, Command, Gesture, SwipeTracker};
use crate::kitty::{self, KittyImage};
use crate::markup;
use crate::media;
use crate::registry::{Item, ItemKind};
use crate::session::{LoadState, Session};
use crate::viewer::{ImageLoader, ImageRequest, ImageSlot, ViewerState};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const LOADING_MESSAGE: &str = "camera roll is loading...";
const TILE_WIDTH: u16 = 24;
const TILE_HEIGHT: u16 = 5;
const ICON_IMAGE: &str = "▣";
const ICON_TEXT: &str = "¶";
const NO_INLINE_IMAGES: &str =
    "This terminal cannot show inline images. Press o to open the original.";

#[derive(Debug, Clone)]
pub struct DisplayImage {
    pub label: String,
    pub width: u32,
    pub height: u32,
    kitty: Option<KittyImage>,
}

enum AsyncResponse {
    Feed {
        request_id: u64,
        event: LoadEvent,
    },
    Image {
        generation: u64,
        index: usize,
        result: Result<DisplayImage, String>,
    },
}

struct PendingLoad {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

struct ActiveKitty {
    image_id: u32,
    wrap_tmux: bool,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

struct MediaLoader {
    handle: Option<media::Handle>,
    tx: Sender<AsyncResponse>,
    kitty: bool,
}

impl ImageLoader for MediaLoader {
    fn load(&self, request: ImageRequest) {
        let ImageRequest {
            generation,
            index,
            url,
        } = request;
        let tx = self.tx.clone();
        let Some(handle) = self.handle.clone() else {
            let _ = tx.send(AsyncResponse::Image {
                generation,
                index,
                result: Err("media downloads are unavailable".to_string()),
            });
            return;
        };
        let kitty = self.kitty;
        thread::spawn(move || {
            let rx = handle.enqueue(media::Request {
                url: url.clone(),
                purpose: media::Purpose::Display,
            });
            let result = match rx.recv() {
                Ok(Ok(fetched)) => prepare_image(&fetched.url, &fetched.bytes, kitty)
                    .map_err(|err| format!("{err:#}")),
                Ok(Err(err)) => Err(format!("{err:#}")),
                Err(_) => Err("media worker stopped".to_string()),
            };
            let _ = tx.send(AsyncResponse::Image {
                generation,
                index,
                result,
            });
        });
    }

    fn preload(&self, url: &str) {
        if let Some(handle) = &self.handle {
            handle.preload(url);
        }
    }
}

fn prepare_image(url: &str, bytes: &[u8], kitty_enabled: bool) -> Result<DisplayImage> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("sniff image format")?
        .into_dimensions()
        .context("read image dimensions")?;
    let kitty = if kitty_enabled {
        Some(kitty::transmit(bytes, 1, 1, kitty::image_id(url))?)
    } else {
        None
    };
    Ok(DisplayImage {
        label: image_label(url),
        width,
        height,
        kitty,
    })
}

fn image_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(|segment| percent_decode_str(segment).decode_utf8_lossy().to_string())
        })
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

fn grid_columns(width: u16) -> usize {
    usize::from((width / TILE_WIDTH).max(1))
}

fn move_selection(selected: usize, dx: isize, dy: isize, columns: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let columns = columns.max(1) as isize;
    let target = selected as isize + dx + dy * columns;
    if target < 0 || target >= len as isize {
        return selected;
    }
    target as usize
}

fn scroll_rows(offset: usize, selected: usize, columns: usize, visible_rows: usize) -> usize {
    let row = selected / columns.max(1);
    let visible_rows = visible_rows.max(1);
    if row < offset {
        row
    } else if row >= offset + visible_rows {
        row + 1 - visible_rows
    } else {
        offset
    }
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    for ch in text.chars() {
        if out.width() + 2 > width {
            break;
        }
        out.push(ch);
    }
    out.push('…');
    out
}

fn tile_lines(label: &str, width: usize, max_lines: usize) -> Vec<String> {
    let width = width.max(2);
    let wrapped = wrap(label, WrapOptions::new(width));
    let cut = wrapped.len() > max_lines;
    let mut lines: Vec<String> = wrapped
        .into_iter()
        .take(max_lines.max(1))
        .map(|line| line.into_owned())
        .collect();
    if cut {
        if let Some(last) = lines.last_mut() {
            *last = truncate_to_width(&format!("{last} …"), width);
        }
    }
    lines
}

fn tile_label(item: &Item) -> String {
    match &item.kind {
        ItemKind::Image(image) => image
            .title
            .clone()
            .unwrap_or_else(|| image_label(&image.thumb_url)),
        ItemKind::Text(text) => text
            .title
            .clone()
            .unwrap_or_else(|| markup::first_line(&text.markup())),
    }
}

fn load_banner(state: &LoadState, channel: &str, items: usize) -> (String, bool) {
    match state {
        LoadState::Loading { .. } => (LOADING_MESSAGE.to_string(), false),
        LoadState::Complete { .. } => (format!("{channel} · {items} items"), false),
        LoadState::Failed { page } => (
            format!("could not load page {page} of {channel} · {items} items so far · r to retry"),
            true,
        ),
        LoadState::Cancelled => (format!("{channel} · load cancelled"), false),
    }
}

pub struct Options {
    pub feed_service: Arc<dyn FeedService>,
    pub per_page: u32,
    pub preload_radius: usize,
    pub swipe_threshold: u16,
    pub media_handle: Option<media::Handle>,
    pub config_path: String,
}

pub struct Model {
    feed_service: Arc<dyn FeedService>,
    per_page: u32,
    config_path: String,
    session: Session<DisplayImage>,
    tile_labels: Vec<String>,
    selected: usize,
    grid_offset: usize,
    grid_columns: usize,
    tiles: Vec<(Rect, usize)>,
    image_area: Option<Rect>,
    text_scroll: u16,
    status_message: String,
    spinner: Spinner,
    pending_load: Option<PendingLoad>,
    next_request_id: u64,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    loader: MediaLoader,
    kitty_enabled: bool,
    active_kitty: Option<ActiveKitty>,
    needs_kitty_flush: bool,
    needs_redraw: bool,
    swipe: SwipeTracker,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let kitty_enabled = kitty::is_kitty_terminal();
        let channel = opts.feed_service.channel().to_string();
        let loader = MediaLoader {
            handle: opts.media_handle,
            tx: response_tx.clone(),
            kitty: kitty_enabled,
        };
        tracing::debug!(channel = %channel, kitty = kitty_enabled, "ui model created");
        Self {
            feed_service: opts.feed_service,
            per_page: opts.per_page,
            config_path: opts.config_path,
            session: Session::new(channel, opts.preload_radius),
            tile_labels: Vec::new(),
            selected: 0,
            grid_offset: 0,
            grid_columns: 1,
            tiles: Vec::new(),
            image_area: None,
            text_scroll: 0,
            status_message: String::new(),
            spinner: Spinner::new(),
            pending_load: None,
            next_request_id: 1,
            response_tx,
            response_rx,
            loader,
            kitty_enabled,
            active_kitty: None,
            needs_kitty_flush: false,
            needs_redraw: true,
            swipe: SwipeTracker::new(opts.swipe_threshold),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        stdout.execute(SetTitle(format!("{} · arena-roll", self.session.channel())))?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.start_load();
        let result = self.event_loop(&mut terminal);

        if let Some(pending) = self.pending_load.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        let _ = self.emit_active_kitty_delete(terminal.backend_mut());
        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.flush_inline_images(terminal.backend_mut())?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(..) => {
                        self.needs_kitty_flush = true;
                        self.mark_dirty();
                    }
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_busy() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_busy(&self) -> bool {
        self.session.load_state().is_loading()
            || matches!(self.session.viewer().image(), ImageSlot::Loading { .. })
    }

    fn start_load(&mut self) {
        if let Some(pending) = self.pending_load.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        self.active_kitty_to_delete();
        self.session = self.session.reload();
        self.tile_labels.clear();
        self.selected = 0;
        self.grid_offset = 0;
        self.text_scroll = 0;
        self.status_message.clear();
        self.spinner.reset();

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_load = Some(PendingLoad {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });

        let tx = self.response_tx.clone();
        tracing::info!(channel = self.session.channel(), request_id, "loading channel");
        feed::spawn(
            self.feed_service.clone(),
            self.per_page,
            cancel_flag,
            move |event| {
                let _ = tx.send(AsyncResponse::Feed { request_id, event });
            },
        );
        self.mark_dirty();
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            changed |= self.handle_async_response(message);
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) -> bool {
        match message {
            AsyncResponse::Feed { request_id, event } => {
                let Some(pending) = &self.pending_load else {
                    return false;
                };
                if pending.request_id != request_id || pending.cancel_flag.load(Ordering::SeqCst) {
                    return false;
                }
                match event {
                    LoadEvent::Page(page) => {
                        self.session.ingest_page(&page);
                        let items = self.session.registry().items();
                        for item in &items[self.tile_labels.len()..] {
                            self.tile_labels.push(tile_label(item));
                        }
                    }
                    LoadEvent::Finished(outcome) => {
                        self.session.finish(&outcome);
                        self.pending_load = None;
                    }
                }
                true
            }
            AsyncResponse::Image {
                generation,
                index,
                result,
            } => {
                let applied = self.session.complete_image(generation, index, result);
                if applied {
                    self.needs_kitty_flush = true;
                }
                applied
            }
        }
    }

    fn apply(&mut self, command: Command) -> bool {
        let changed = self.session.apply(command, &self.loader);
        if changed {
            self.text_scroll = 0;
            self.needs_kitty_flush = true;
            if let Some(current) = self.session.viewer().current() {
                self.selected = current;
            }
            self.mark_dirty();
        }
        changed
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let viewer_open = self.session.viewer().is_open();
        if let Some(command) = input::route_key(code, viewer_open) {
            self.apply(command);
            return Ok(false);
        }

        if viewer_open {
            match code {
                KeyCode::Char('q') => {
                    self.apply(Command::Close);
                }
                KeyCode::PageDown | KeyCode::Char('J') => {
                    self.text_scroll = self.text_scroll.saturating_add(5);
                    self.mark_dirty();
                }
                KeyCode::PageUp | KeyCode::Char('K') => {
                    self.text_scroll = self.text_scroll.saturating_sub(5);
                    self.mark_dirty();
                }
                KeyCode::Char('o') => self.open_in_browser(true),
                _ => {}
            }
            return Ok(false);
        }

        let len = self.session.registry().len();
        let columns = self.grid_columns;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Left | KeyCode::Char('h') => {
                self.selected = move_selection(self.selected, -1, 0, columns, len);
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.selected = move_selection(self.selected, 1, 0, columns, len);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = move_selection(self.selected, 0, -1, columns, len);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = move_selection(self.selected, 0, 1, columns, len);
            }
            KeyCode::Enter => {
                if len > 0 {
                    self.apply(Command::Open(self.selected));
                }
            }
            KeyCode::Char('o') => self.open_in_browser(false),
            KeyCode::Char('r') => self.start_load(),
            _ => {}
        }
        self.mark_dirty();
        Ok(false)
    }

    fn handle_mouse(&mut self, event: MouseEvent) {
        let viewer_open = self.session.viewer().is_open();
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if viewer_open {
                    self.swipe.begin(event.column);
                } else if let Some(command) =
                    input::route_tile_click(&self.tiles, event.column, event.row)
                {
                    self.apply(command);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if !viewer_open {
                    self.swipe.cancel();
                    return;
                }
                match self.swipe.end(event.column) {
                    Some(Gesture::Swipe(command)) => {
                        self.apply(command);
                    }
                    Some(Gesture::Tap) => {
                        if let Some(command) = input::route_backdrop_click(viewer_open) {
                            self.apply(command);
                        }
                    }
                    None => {}
                }
            }
            MouseEventKind::ScrollDown => {
                if viewer_open {
                    self.text_scroll = self.text_scroll.saturating_add(1);
                } else {
                    let len = self.session.registry().len();
                    self.selected =
                        move_selection(self.selected, 0, 1, self.grid_columns, len);
                }
                self.mark_dirty();
            }
            MouseEventKind::ScrollUp => {
                if viewer_open {
                    self.text_scroll = self.text_scroll.saturating_sub(1);
                } else {
                    let len = self.session.registry().len();
                    self.selected =
                        move_selection(self.selected, 0, -1, self.grid_columns, len);
                }
                self.mark_dirty();
            }
            _ => {}
        }
    }

    fn open_in_browser(&mut self, from_viewer: bool) {
        let index = if from_viewer {
            self.session.viewer().current()
        } else {
            Some(self.selected)
        };
        let Some(item) = index.and_then(|index| self.session.registry().get(index)) else {
            return;
        };
        let target = match (&item.kind, from_viewer) {
            (ItemKind::Image(image), true) => Some(
                image
                    .original_url
                    .clone()
                    .or_else(|| item.page_url.clone())
                    .unwrap_or_else(|| image.large_url.clone()),
            ),
            _ => item.page_url.clone(),
        };
        let Some(url) = target else {
            self.status_message = "This item has no page to open.".to_string();
            self.mark_dirty();
            return;
        };

        match webbrowser::open(&url) {
            Ok(_) => {
                self.status_message = format!("Opened {url} in your browser.");
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "could not open browser");
                self.status_message = format!("Failed to open {url}: {err}");
            }
        }
        self.mark_dirty();
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_header(frame, layout[0]);
        self.draw_grid(frame, layout[1]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);

        self.image_area = None;
        if self.session.viewer().is_open() {
            self.draw_viewer(frame, layout[1]);
        }
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let registry = self.session.registry();
        let (banner, is_error) =
            load_banner(self.session.load_state(), self.session.channel(), registry.len());

        let mut spans = Vec::new();
        if let Some(icon) = self.session.icon_url() {
            spans.push(Span::styled(
                format!("{ICON_IMAGE} {} ", image_label(icon)),
                Style::default().fg(COLOR_ACCENT),
            ));
        }
        spans.push(Span::styled(
            format!("{} ", self.session.channel()),
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        ));
        if self.session.load_state().is_loading() {
            spans.push(Span::raw(format!("{} ", self.spinner.frame())));
        }
        let banner_style = if is_error {
            Style::default().fg(COLOR_ERROR).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        spans.push(Span::styled(banner, banner_style));
        if !self.status_message.is_empty() {
            spans.push(Span::styled(
                format!("  {}", self.status_message),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }

        let header = Paragraph::new(Line::from(spans))
            .style(Style::default().bg(COLOR_PANEL_FOCUSED_BG));
        frame.render_widget(header, area);
    }

    fn draw_grid(&mut self, frame: &mut Frame<'_>, area: Rect) {
        self.tiles.clear();
        let items = self.session.registry().items();
        self.grid_columns = grid_columns(area.width);

        if items.is_empty() {
            let message = match self.session.load_state() {
                LoadState::Loading { .. } => LOADING_MESSAGE.to_string(),
                _ => format!("Nothing to show in {}.", self.session.channel()),
            };
            let empty = Paragraph::new(message)
                .style(Style::default().fg(COLOR_TEXT_SECONDARY))
                .alignment(Alignment::Center)
                .block(Block::default().padding(Padding::uniform(1)));
            frame.render_widget(empty, area);
            return;
        }

        let columns = self.grid_columns;
        let visible_rows = usize::from((area.height / TILE_HEIGHT).max(1));
        self.selected = self.selected.min(items.len() - 1);
        self.grid_offset = scroll_rows(self.grid_offset, self.selected, columns, visible_rows);

        let first = self.grid_offset * columns;
        let last = (first + visible_rows * columns).min(items.len());
        for (slot, item) in items[first..last].iter().enumerate() {
            let col = (slot % columns) as u16;
            let row = (slot / columns) as u16;
            let tile = Rect::new(
                area.x + col * TILE_WIDTH,
                area.y + row * TILE_HEIGHT,
                TILE_WIDTH.min(area.width),
                TILE_HEIGHT.min(area.height.saturating_sub(row * TILE_HEIGHT)),
            );
            if tile.height == 0 {
                continue;
            }

            let selected = item.index == self.selected;
            let border_style = if selected {
                Style::default().fg(COLOR_BORDER_FOCUSED)
            } else {
                Style::default().fg(COLOR_BORDER_IDLE)
            };
            let background = if selected {
                COLOR_PANEL_SELECTED_BG
            } else {
                COLOR_PANEL_BG
            };
            let (icon, kind) = if item.is_image() {
                (ICON_IMAGE, "image")
            } else {
                (ICON_TEXT, "text")
            };
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(Span::styled(
                    format!(" {} ", item.index + 1),
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                ))
                .style(Style::default().bg(background));
            let inner_width = usize::from(tile.width.saturating_sub(2));
            let label = self
                .tile_labels
                .get(item.index)
                .map(String::as_str)
                .unwrap_or_default();
            let label_rows = usize::from(tile.height.saturating_sub(3)).max(1);
            let mut lines: Vec<Line<'static>> =
                tile_lines(&format!("{icon} {label}"), inner_width, label_rows)
                    .into_iter()
                    .map(|line| {
                        Line::from(Span::styled(line, Style::default().fg(COLOR_TEXT_PRIMARY)))
                    })
                    .collect();
            lines.push(Line::from(Span::styled(
                kind,
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .add_modifier(Modifier::ITALIC),
            )));
            let body = Text::from(lines);
            frame.render_widget(Paragraph::new(body).block(block), tile);
            self.tiles.push((tile, item.index));
        }
    }

    fn draw_viewer(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let overlay = centered_rect(92, 92, area);
        frame.render_widget(Clear, overlay);

        let viewer = self.session.viewer();
        let position = viewer
            .current()
            .map(|index| format!("{}/{}", index + 1, self.session.registry().len()))
            .unwrap_or_default();
        let title = match viewer.title() {
            Some(title) => format!(" {position} · {title} "),
            None => format!(" {position} "),
        };
        // the frame lights up once the image has arrived
        let frame_color = match (viewer.state(), viewer.image()) {
            (ViewerState::ShowingImage, ImageSlot::Loaded(_)) | (ViewerState::ShowingText, _) => {
                COLOR_BORDER_FOCUSED
            }
            _ => COLOR_BORDER_IDLE,
        };
        let block = Block::default()
            .title(Span::styled(
                title,
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(frame_color))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::uniform(1));
        let inner = block.inner(overlay);
        frame.render_widget(block, overlay);

        let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);
        match viewer.state() {
            ViewerState::ShowingText => {
                let rendered = viewer.text().map(markup::render).unwrap_or_default();
                let paragraph = Paragraph::new(rendered)
                    .style(Style::default().fg(COLOR_TEXT_PRIMARY))
                    .wrap(Wrap { trim: false })
                    .scroll((self.text_scroll, 0));
                frame.render_widget(paragraph, inner);
            }
            ViewerState::ShowingImage => {
                let placeholder = match viewer.image() {
                    ImageSlot::Loading { url } => Some(Paragraph::new(format!(
                        "{} loading {}…",
                        self.spinner.frame(),
                        image_label(url)
                    ))
                    .style(secondary)),
                    ImageSlot::Failed(message) => Some(
                        Paragraph::new(format!("Could not load this image.\n\n{message}"))
                            .style(Style::default().fg(COLOR_ERROR))
                            .wrap(Wrap { trim: true }),
                    ),
                    ImageSlot::Loaded(image) if image.kitty.is_none() => Some(
                        Paragraph::new(format!(
                            "{ICON_IMAGE} {} ({}×{})\n\n{NO_INLINE_IMAGES}",
                            image.label, image.width, image.height
                        ))
                        .style(secondary)
                        .wrap(Wrap { trim: true }),
                    ),
                    ImageSlot::Loaded(_) => None,
                    ImageSlot::Empty => None,
                };
                match placeholder {
                    Some(paragraph) => {
                        frame.render_widget(paragraph.alignment(Alignment::Center), inner)
                    }
                    None => self.image_area = Some(inner),
                }
            }
            ViewerState::Closed => {}
        }
    }

    fn footer_text(&self) -> String {
        let base = if self.session.viewer().is_open() {
            "←/→ previous/next · PgUp/PgDn scroll · o open original · Esc close"
        } else {
            "arrows/hjkl move · Enter view · o open page · r reload · q quit"
        };
        format!("{base} · config {}", self.config_path)
    }

    fn active_kitty_to_delete(&mut self) {
        if self.active_kitty.is_some() {
            self.needs_kitty_flush = true;
        }
    }

    fn emit_active_kitty_delete(
        &mut self,
        backend: &mut CrosstermBackend<Stdout>,
    ) -> io::Result<()> {
        if let Some(active) = self.active_kitty.take() {
            let sequence = kitty::delete_sequence_for(active.image_id, active.wrap_tmux);
            crossterm::queue!(backend, Print(sequence))?;
            backend.flush()?;
        }
        Ok(())
    }

    fn flush_inline_images(&mut self, backend: &mut CrosstermBackend<Stdout>) -> Result<()> {
        if !self.kitty_enabled || !self.needs_kitty_flush {
            return Ok(());
        }
        self.needs_kitty_flush = false;

        let Some(area) = self.image_area else {
            self.emit_active_kitty_delete(backend)?;
            return Ok(());
        };
        let metrics = kitty::terminal_cell_metrics();
        let ImageSlot::Loaded(image) = self.session.viewer_mut().image_mut() else {
            self.emit_active_kitty_delete(backend)?;
            return Ok(());
        };
        let (width, height) = (image.width, image.height);
        let Some(graphic) = image.kitty.as_mut() else {
            self.emit_active_kitty_delete(backend)?;
            return Ok(());
        };

        let (cols, rows) = kitty::fit_cells(width, height, area.width, area.height, metrics);
        graphic.resize(cols, rows);
        let col = area.x + (area.width.saturating_sub(cols)) / 2;
        let row = area.y + (area.height.saturating_sub(rows)) / 2;

        let image_id = graphic.id();
        let wrap_tmux = graphic.wraps_tmux();
        let sequence = graphic.placement_sequence();
        if self
            .active_kitty
            .as_ref()
            .is_some_and(|active| active.image_id != image_id)
        {
            self.emit_active_kitty_delete(backend)?;
        }

        let ImageSlot::Loaded(image) = self.session.viewer_mut().image_mut() else {
            return Ok(());
        };
        let Some(graphic) = image.kitty.as_mut() else {
            return Ok(());
        };
        graphic.ensure_transmitted(backend)?;
        crossterm::queue!(backend, MoveTo(col, row), Print(sequence))?;
        backend.flush()?;

        self.active_kitty = Some(ActiveKitty {
            image_id,
            wrap_tmux,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};

    #[test]
    fn selection_moves_within_bounds() {
        assert_eq!(move_selection(0, -1, 0, 4, 10), 0);
        assert_eq!(move_selection(0, 1, 0, 4, 10), 1);
        assert_eq!(move_selection(1, 0, 1, 4, 10), 5);
        assert_eq!(move_selection(8, 0, 1, 4, 10), 8);
        assert_eq!(move_selection(5, 0, -1, 4, 10), 1);
        assert_eq!(move_selection(3, 0, 0, 4, 0), 0);
    }

    #[test]
    fn scroll_keeps_the_selected_row_visible() {
        assert_eq!(scroll_rows(0, 3, 4, 2), 0);
        assert_eq!(scroll_rows(0, 12, 4, 2), 2);
        assert_eq!(scroll_rows(3, 1, 4, 2), 0);
        assert_eq!(scroll_rows(1, 7, 4, 2), 1);
    }

    #[test]
    fn grid_always_has_a_column() {
        assert_eq!(grid_columns(5), 1);
        assert_eq!(grid_columns(TILE_WIDTH * 3 + 2), 3);
    }

    #[test]
    fn labels_come_from_the_last_path_segment() {
        assert_eq!(
            image_label("https://d2w9rnfcy7mm78.cloudfront.net/1/large_sky%20blue.jpg?1"),
            "large_sky blue.jpg"
        );
        assert_eq!(image_label("not a url"), "image");
    }

    #[test]
    fn tile_labels_wrap_and_mark_cut_text() {
        assert_eq!(tile_lines("one two", 20, 2), vec!["one two"]);
        assert_eq!(tile_lines("alpha beta", 6, 2), vec!["alpha", "beta"]);
        let cut = tile_lines("alpha beta gamma", 6, 2);
        assert_eq!(cut.len(), 2);
        assert!(cut[1].ends_with('…'));
    }

    #[test]
    fn truncation_respects_display_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("a longer label", 6), "a lon…");
    }

    #[test]
    fn failed_load_shows_an_error_banner_instead_of_loading() {
        let (loading, loading_error) = load_banner(&LoadState::Loading { pages: 1 }, "c", 0);
        assert_eq!(loading, LOADING_MESSAGE);
        assert!(!loading_error);

        let (failed, is_error) = load_banner(&LoadState::Failed { page: 3 }, "c", 40);
        assert!(is_error);
        assert!(failed.contains("page 3"));
        assert!(!failed.contains(LOADING_MESSAGE));
    }

    #[test]
    fn prepared_images_report_their_size() {
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(6, 4);
        let mut png = Vec::new();
        buffer
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let plain = prepare_image("https://x.test/a.png", &png, false).unwrap();
        assert_eq!((plain.width, plain.height), (6, 4));
        assert_eq!(plain.label, "a.png");
        assert!(plain.kitty.is_none());

        let graphic = prepare_image("https://x.test/a.png", &png, true).unwrap();
        assert!(graphic.kitty.is_some());
    }

    #[test]
    fn undecodable_bytes_fail_to_prepare() {
        assert!(prepare_image("u", b"not an image", false).is_err());
    }
}
