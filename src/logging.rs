use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

pub fn init(cfg: &LogConfig) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = cfg.file.clone() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::sink))
            .try_init()
            .map_err(|err| anyhow!("install log subscriber: {err}"))?;
        return Ok(None);
    };

    let file = open_log_file(&path)?;
    let fmt_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| anyhow!("install log subscriber: {err}"))?;

    tracing::info!(version = crate::VERSION, log = %path.display(), "logging initialised");
    Ok(Some(path))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_file_and_parent_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("roll.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
