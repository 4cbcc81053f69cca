use crossterm::event::KeyCode;
use ratatui::layout::Rect;

pub const DEFAULT_SWIPE_THRESHOLD: u16 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Open(usize),
    Navigate(isize),
    Close,
}

pub fn route_key(code: KeyCode, viewer_open: bool) -> Option<Command> {
    if !viewer_open {
        return None;
    }
    match code {
        KeyCode::Esc => Some(Command::Close),
        KeyCode::Right | KeyCode::Down => Some(Command::Navigate(1)),
        KeyCode::Left | KeyCode::Up => Some(Command::Navigate(-1)),
        _ => None,
    }
}

pub fn route_backdrop_click(viewer_open: bool) -> Option<Command> {
    viewer_open.then_some(Command::Close)
}

pub fn route_tile_click(tiles: &[(Rect, usize)], column: u16, row: u16) -> Option<Command> {
    tiles
        .iter()
        .find(|(area, _)| {
            column >= area.x
                && column < area.x.saturating_add(area.width)
                && row >= area.y
                && row < area.y.saturating_add(area.height)
        })
        .map(|(_, index)| Command::Open(*index))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Swipe(Command),
    Tap,
}

#[derive(Debug, Clone)]
pub struct SwipeTracker {
    threshold: u16,
    start_x: Option<u16>,
}

impl Default for SwipeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_THRESHOLD)
    }
}

impl SwipeTracker {
    pub fn new(threshold: u16) -> Self {
        Self {
            threshold,
            start_x: None,
        }
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn begin(&mut self, x: u16) {
        self.start_x = Some(x);
    }

    pub fn cancel(&mut self) {
        self.start_x = None;
    }

    // below the threshold is a tap; rightward goes back, leftward forward
    pub fn end(&mut self, x: u16) -> Option<Gesture> {
        let start = self.start_x.take()?;
        let delta = i32::from(x) - i32::from(start);
        if delta.unsigned_abs() < u32::from(self.threshold) {
            return Some(Gesture::Tap);
        }
        let step = if delta > 0 { -1 } else { 1 };
        Some(Gesture::Swipe(Command::Navigate(step)))
    }
}
