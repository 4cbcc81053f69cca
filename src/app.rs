use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::arena;
use crate::config;
use crate::data::{ArenaFeedService, FeedService};
use crate::logging;
use crate::media;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub channel: Option<String>,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let mut cfg = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    if let Some(channel) = opts.channel.as_deref().map(str::trim) {
        if !channel.is_empty() {
            cfg.feed.channel = channel.to_string();
        }
    }

    logging::init(&cfg.log).context("initialise logging")?;

    let config_path = opts.config_file.clone().or_else(config::default_path);
    let display_path = friendly_path(config_path.as_deref());

    let client = arena::Client::new(arena::ClientConfig {
        base_url: cfg.feed.api_base.clone(),
        user_agent: cfg.feed.user_agent.clone(),
        timeout: cfg.feed.timeout,
        http_client: None,
    })
    .context("create are.na client")?;
    let feed_service: Arc<dyn FeedService> = Arc::new(ArenaFeedService::new(
        Arc::new(client),
        cfg.feed.channel.clone(),
    ));

    let media_cfg = media::Config {
        workers: cfg.media.workers,
        cache_bytes: cfg.media.cache_bytes,
        timeout: cfg.media.timeout,
        user_agent: cfg.feed.user_agent.clone(),
        http_client: None,
    };
    let media_manager = match media::Manager::new(media_cfg) {
        Ok(manager) => Some(manager),
        Err(err) => {
            let message = format!("{err:#}");
            tracing::warn!(error = %message, "media manager unavailable; images will not load");
            None
        }
    };
    let media_handle = media_manager.as_ref().map(|manager| manager.handle());

    tracing::info!(
        channel = %cfg.feed.channel,
        per_page = cfg.feed.per_page,
        "starting arena-roll"
    );

    let options = ui::Options {
        feed_service,
        per_page: cfg.feed.per_page,
        preload_radius: cfg.viewer.preload_radius,
        swipe_threshold: cfg.input.swipe_threshold,
        media_handle,
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    let result = model.run();

    drop(model);
    drop(media_manager);
    tracing::info!("arena-roll exiting");

    result
}

fn friendly_path(path: Option<&Path>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/arena-roll/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_under_home_are_shortened() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let path = home.join(".config").join("arena-roll").join("config.yaml");
        assert_eq!(
            friendly_path(Some(&path)),
            "~/.config/arena-roll/config.yaml"
        );
        assert_eq!(friendly_path(Some(&home)), "~");
    }

    #[test]
    fn missing_path_falls_back_to_the_default_location() {
        assert_eq!(friendly_path(None), "~/.config/arena-roll/config.yaml");
    }
}
