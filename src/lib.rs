#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod arena;
pub mod config;
pub mod data;
pub mod feed;
pub mod input;
pub mod kitty;
pub mod logging;
pub mod markup;
pub mod media;
pub mod registry;
pub mod session;
pub mod ui;
pub mod viewer;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
