use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Write};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use crossterm::terminal::window_size;
use image::ImageFormat;

const CHUNK_SIZE: usize = 4096;
const PLACEMENT_ID: u32 = 1;

#[derive(Clone, Debug)]
pub struct KittyImage {
    id: u32,
    cols: u16,
    rows: u16,
    transmit_chunks: Vec<String>,
    transmitted: bool,
    wrap_tmux: bool,
}

impl KittyImage {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn wraps_tmux(&self) -> bool {
        self.wrap_tmux
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols.max(1);
        self.rows = rows.max(1);
    }

    pub fn ensure_transmitted<W: Write>(&mut self, writer: &mut W) -> io::Result<()> {
        if self.transmitted {
            return Ok(());
        }
        for chunk in &self.transmit_chunks {
            writer.write_all(chunk.as_bytes())?;
        }
        writer.flush()?;
        self.transmitted = true;
        Ok(())
    }

    pub fn placement_sequence(&self) -> String {
        wrap(
            format!(
                "\x1b_Ga=p,q=2,C=1,i={},p={PLACEMENT_ID},c={},r={};\x1b\\",
                self.id, self.cols, self.rows
            ),
            self.wrap_tmux,
        )
    }

    pub fn delete_sequence(&self) -> String {
        delete_sequence_for(self.id, self.wrap_tmux)
    }
}

pub fn delete_sequence_for(id: u32, wrap_tmux: bool) -> String {
    wrap(format!("\x1b_Ga=d,d=I,q=2,i={id};\x1b\\"), wrap_tmux)
}

fn wrap(base: String, wrap_tmux: bool) -> String {
    if wrap_tmux {
        format!("\x1bPtmux;\x1b{base}\x1b\\")
    } else {
        base
    }
}

pub fn image_id(url: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    // id 0 is reserved by the protocol
    ((hasher.finish() & 0xFFFF_FFFF) as u32).max(1)
}

fn encode_png(bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    if bytes.is_empty() {
        bail!("image had no bytes");
    }

    if matches!(image::guess_format(bytes), Ok(ImageFormat::Png)) {
        return Ok(Cow::Borrowed(bytes));
    }

    let decoded = image::load_from_memory(bytes).context("decode image")?;
    let mut png_bytes = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .context("encode image as png")?;
    Ok(Cow::Owned(png_bytes))
}

pub fn transmit(bytes: &[u8], cols: u16, rows: u16, id: u32) -> Result<KittyImage> {
    let png = encode_png(bytes)?;
    let encoded = general_purpose::STANDARD.encode(png.as_ref());
    Ok(chunk_transmission(
        &encoded,
        cols.max(1),
        rows.max(1),
        id,
        tmux_passthrough_enabled(),
    ))
}

fn chunk_transmission(
    encoded: &str,
    cols: u16,
    rows: u16,
    id: u32,
    wrap_tmux: bool,
) -> KittyImage {
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < encoded.len() {
        let end = usize::min(offset + CHUNK_SIZE, encoded.len());
        let more = u8::from(end < encoded.len());
        let header = if offset == 0 {
            format!("\x1b_Ga=t,q=2,i={id},f=100,m={more};")
        } else {
            format!("\x1b_Ga=t,q=2,i={id},m={more};")
        };
        chunks.push(wrap(
            format!("{header}{}\x1b\\", &encoded[offset..end]),
            wrap_tmux,
        ));
        offset = end;
    }

    KittyImage {
        id,
        cols,
        rows,
        transmit_chunks: chunks,
        transmitted: false,
        wrap_tmux,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMetrics {
    pub width: f64,
    pub height: f64,
}

pub fn terminal_cell_metrics() -> CellMetrics {
    static METRICS: OnceLock<CellMetrics> = OnceLock::new();
    *METRICS.get_or_init(|| {
        window_size().ok().map_or(
            CellMetrics {
                width: 1.0,
                height: 1.0,
            },
            |size| {
                let columns = f64::from(size.columns.max(1));
                let rows = f64::from(size.rows.max(1));
                let width = if size.width > 0 {
                    f64::from(size.width) / columns
                } else {
                    1.0
                };
                let height = if size.height > 0 {
                    f64::from(size.height) / rows
                } else {
                    1.0
                };
                CellMetrics { width, height }
            },
        )
    })
}

pub fn fit_cells(
    width: u32,
    height: u32,
    max_cols: u16,
    max_rows: u16,
    metrics: CellMetrics,
) -> (u16, u16) {
    let max_cols = max_cols.max(1);
    let max_rows = max_rows.max(1);
    if width == 0 || height == 0 {
        return (max_cols, max_rows);
    }
    let native_cols = f64::from(width) / metrics.width.max(1.0);
    let native_rows = f64::from(height) / metrics.height.max(1.0);
    let scale = (f64::from(max_cols) / native_cols)
        .min(f64::from(max_rows) / native_rows)
        .min(1.0);
    let cols = (native_cols * scale).round().clamp(1.0, f64::from(max_cols)) as u16;
    let rows = (native_rows * scale).round().clamp(1.0, f64::from(max_rows)) as u16;
    (cols, rows)
}

fn env_truthy(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "YES"))
        .unwrap_or(false)
}

fn tmux_passthrough_enabled() -> bool {
    env::var("TMUX").map(|v| !v.is_empty()).unwrap_or(false)
}

fn running_inside_tmux() -> bool {
    tmux_passthrough_enabled()
        || env::var("TMUX_PANE").map(|v| !v.is_empty()).unwrap_or(false)
        || env::var("TERM")
            .map(|term| term.to_ascii_lowercase().contains("tmux"))
            .unwrap_or(false)
}

pub fn is_kitty_terminal() -> bool {
    if env_truthy("ARENA_ROLL_DISABLE_KITTY") {
        return false;
    }
    if env_truthy("ARENA_ROLL_FORCE_KITTY") {
        return true;
    }
    if running_inside_tmux() {
        return false;
    }
    if env::var("KITTY_WINDOW_ID").map(|v| !v.is_empty()).unwrap_or(false)
        || env::var("WEZTERM_PANE").map(|v| !v.is_empty()).unwrap_or(false)
    {
        return true;
    }
    if env::var("TERM_PROGRAM")
        .map(|term| term.to_lowercase().contains("wezterm"))
        .unwrap_or(false)
    {
        return true;
    }
    env::var("TERM")
        .map(|term| {
            let lower = term.to_lowercase();
            lower.contains("kitty") || lower.contains("wezterm")
        })
        .unwrap_or(false)
}
