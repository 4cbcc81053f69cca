use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::arena::ARENA_API_BASE;
use crate::feed::DEFAULT_PAGE_SIZE;
use crate::input::DEFAULT_SWIPE_THRESHOLD;
use crate::media::DEFAULT_CACHE_BYTES;
use crate::viewer::DEFAULT_PRELOAD_RADIUS;

const DEFAULT_ENV_PREFIX: &str = "ARENA_ROLL";
const APP_DIR: &str = "arena-roll";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("feed.per_page must be at least 1")]
    ZeroPageSize,
    #[error("feed.channel must not be empty")]
    EmptyChannel,
    #[error("input.swipe_threshold must be at least 1")]
    ZeroSwipeThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_feed_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            channel: default_channel(),
            per_page: default_per_page(),
            user_agent: default_user_agent(),
            timeout: default_feed_timeout(),
        }
    }
}

fn default_api_base() -> String {
    ARENA_API_BASE.to_string()
}

fn default_channel() -> String {
    "ifeelyesterday".into()
}

fn default_per_page() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_user_agent() -> String {
    format!("arena-roll/{}", crate::VERSION)
}

fn default_feed_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "default_preload_radius")]
    pub preload_radius: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            preload_radius: default_preload_radius(),
        }
    }
}

fn default_preload_radius() -> usize {
    DEFAULT_PRELOAD_RADIUS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputConfig {
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold: u16,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            swipe_threshold: default_swipe_threshold(),
        }
    }
}

fn default_swipe_threshold() -> u16 {
    DEFAULT_SWIPE_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_cache_bytes")]
    pub cache_bytes: usize,
    #[serde(default = "default_media_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cache_bytes: default_cache_bytes(),
            timeout: default_media_timeout(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_cache_bytes() -> usize {
    DEFAULT_CACHE_BYTES
}

fn default_media_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(APP_DIR).join("arena-roll.log"))
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let path = options.config_file.clone().or_else(default_config_path);
    let mut cfg = match path {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix, env::vars());

    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.per_page == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.feed.channel.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        if self.input.swipe_threshold == 0 {
            return Err(ConfigError::ZeroSwipeThreshold);
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env<I>(cfg: &mut Config, prefix: &str, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.api_base" => cfg.feed.api_base = value,
        "feed.channel" => cfg.feed.channel = value,
        "feed.user_agent" => cfg.feed.user_agent = value,
        "feed.per_page" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.per_page = parsed;
            }
        }
        "feed.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.timeout = duration;
            }
        }
        "viewer.preload_radius" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.viewer.preload_radius = parsed;
            }
        }
        "input.swipe_threshold" => {
            if let Ok(parsed) = value.parse::<u16>() {
                cfg.input.swipe_threshold = parsed;
            }
        }
        "media.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.workers = parsed;
            }
        }
        "media.cache_bytes" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.cache_bytes = parsed;
            }
        }
        "media.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.media.timeout = duration;
            }
        }
        "log.level" => cfg.log.level = value,
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.feed.api_base, "https://api.are.na/v2/channels");
        assert_eq!(cfg.feed.channel, "ifeelyesterday");
        assert_eq!(cfg.feed.per_page, 20);
        assert_eq!(cfg.feed.timeout, Duration::from_secs(20));
        assert_eq!(cfg.viewer.preload_radius, 3);
        assert_eq!(cfg.input.swipe_threshold, 50);
        assert_eq!(cfg.media.workers, 2);
        assert_eq!(cfg.media.cache_bytes, 64 * 1024 * 1024);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "feed:\n  channel: arena-influences\n  timeout: 5s\ninput:\n  swipe_threshold: 80\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("ARENA_ROLL_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.channel, "arena-influences");
        assert_eq!(cfg.feed.timeout, Duration::from_secs(5));
        assert_eq!(cfg.feed.per_page, 20);
        assert_eq!(cfg.input.swipe_threshold, 80);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("absent.yaml")),
            env_prefix: Some("ARENA_ROLL_TEST_MISSING".into()),
        })
        .unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "feed:\n  per_page: 0\n").unwrap();
        let err = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("ARENA_ROLL_TEST_ZERO".into()),
        })
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroPageSize)
        );
    }

    #[test]
    fn zero_swipe_threshold_is_rejected() {
        let mut cfg = Config::default();
        cfg.input.swipe_threshold = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSwipeThreshold));
        cfg.input.swipe_threshold = 1;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn env_overrides_nested_keys() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            "ARENA_ROLL",
            vars(&[
                ("ARENA_ROLL_FEED__CHANNEL", "other"),
                ("ARENA_ROLL_FEED__PER_PAGE", "50"),
                ("ARENA_ROLL_MEDIA__TIMEOUT", "1m"),
                ("ARENA_ROLL_LOG__LEVEL", "debug"),
                ("UNRELATED", "x"),
            ]),
        );
        assert_eq!(cfg.feed.channel, "other");
        assert_eq!(cfg.feed.per_page, 50);
        assert_eq!(cfg.media.timeout, Duration::from_secs(60));
        assert_eq!(cfg.log.level, "debug");
    }

    #[test]
    fn invalid_numeric_env_values_are_ignored() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            "ARENA_ROLL",
            vars(&[
                ("ARENA_ROLL_FEED__PER_PAGE", "many"),
                ("ARENA_ROLL_INPUT__SWIPE_THRESHOLD", "-4"),
            ]),
        );
        assert_eq!(cfg.feed.per_page, 20);
        assert_eq!(cfg.input.swipe_threshold, 50);
    }
}
