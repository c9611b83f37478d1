use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::constants::{CRAWLER_USER_AGENT, DEFAULT_BASE_URL};
use crate::crawler::links::CollectSettings;
use crate::crawler::post::ExtractSettings;
use crate::crawler::CrawlSettings;
use crate::renderer::{RendererConfig, ResourceType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to read topic rules from {}: {message}", .path.display())]
    TopicRules { path: PathBuf, message: String },
}

/// Which backend renders pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    /// Headless Chromium with JavaScript.
    Chromium,
    /// Plain HTTP fetch of server-rendered HTML.
    Http,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Source platform
    pub base_url: String,
    pub source_offset: FixedOffset,

    // Renderer
    pub renderer: RendererKind,
    pub chrome_path: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_timeout: Duration,
    pub list_timeout: Duration,
    pub blocked_resources: Vec<ResourceType>,

    // Link collection
    pub max_scrolls: usize,
    pub scroll_pause: Duration,
    pub stagnation_threshold: u32,
    pub initial_settle: Duration,
    pub scroll_settle: Duration,

    // Post extraction
    pub post_settle: Duration,
    pub retry_settle: Duration,
    pub hard_limit_floor: Duration,
    pub hard_limit_slack: Duration,

    // Orchestration
    pub per_post_delay: Duration,

    // Analysis
    pub topic_rules_path: Option<PathBuf>,

    // Output
    pub output_path: PathBuf,
    pub summary_path: PathBuf,
    pub topic_trend_path: PathBuf,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Source platform
            base_url: env_or_default("VELOG_BASE_URL", DEFAULT_BASE_URL),
            source_offset: parse_utc_offset(&env_or_default("SOURCE_UTC_OFFSET", "+09:00"))?,

            // Renderer
            renderer: parse_renderer_kind(&env_or_default("RENDERER", "chromium"))?,
            chrome_path: optional_env("CHROME_PATH"),
            viewport_width: parse_env_u32("VIEWPORT_WIDTH", 1280)?,
            viewport_height: parse_env_u32("VIEWPORT_HEIGHT", 900)?,
            page_timeout: Duration::from_secs(parse_env_u64("PAGE_TIMEOUT_SECS", 20)?),
            list_timeout: Duration::from_secs(parse_env_u64("LIST_TIMEOUT_SECS", 25)?),
            blocked_resources: parse_resource_types(&env_or_default(
                "BLOCKED_RESOURCES",
                "image,font",
            ))?,

            // Link collection
            max_scrolls: parse_env_usize("MAX_SCROLLS", 220)?,
            scroll_pause: Duration::from_millis(parse_env_u64("SCROLL_PAUSE_MS", 1000)?),
            stagnation_threshold: parse_env_u32("STAGNATION_THRESHOLD", 3)?,
            initial_settle: Duration::from_millis(parse_env_u64("INITIAL_SETTLE_MS", 6000)?),
            scroll_settle: Duration::from_millis(parse_env_u64("SCROLL_SETTLE_MS", 3000)?),

            // Post extraction
            post_settle: Duration::from_millis(parse_env_u64("POST_SETTLE_MS", 5000)?),
            retry_settle: Duration::from_millis(parse_env_u64("RETRY_SETTLE_MS", 2000)?),
            hard_limit_floor: Duration::from_secs(parse_env_u64("HARD_LIMIT_FLOOR_SECS", 8)?),
            hard_limit_slack: Duration::from_secs(parse_env_u64("HARD_LIMIT_SLACK_SECS", 4)?),

            // Orchestration
            per_post_delay: Duration::from_millis(parse_env_u64("PER_POST_DELAY_MS", 1000)?),

            // Analysis
            topic_rules_path: optional_env("TOPIC_RULES_PATH").map(PathBuf::from),

            // Output
            output_path: PathBuf::from(env_or_default("OUTPUT_PATH", "out.json")),
            summary_path: PathBuf::from(env_or_default("SUMMARY_PATH", "summary.json")),
            topic_trend_path: PathBuf::from(env_or_default(
                "TOPIC_TREND_PATH",
                "topic_trend.json",
            )),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "VELOG_BASE_URL".to_string(),
                message: format!("not an absolute URL: '{}'", self.base_url),
            });
        }
        if self.max_scrolls == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_SCROLLS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.stagnation_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                name: "STAGNATION_THRESHOLD".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(ConfigError::InvalidValue {
                name: "VIEWPORT_WIDTH/VIEWPORT_HEIGHT".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn renderer_config(&self, page_timeout: Duration) -> RendererConfig {
        RendererConfig {
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            page_timeout,
            chrome_path: self.chrome_path.clone(),
            blocked_resources: self.blocked_resources.clone(),
            user_agent: CRAWLER_USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn collect_settings(&self) -> CollectSettings {
        CollectSettings {
            base_url: self.base_url.clone(),
            max_scroll_iterations: self.max_scrolls,
            pause: self.scroll_pause,
            stagnation_threshold: self.stagnation_threshold,
            initial_settle: self.initial_settle,
            scroll_settle: self.scroll_settle,
        }
    }

    #[must_use]
    pub fn extract_settings(&self) -> ExtractSettings {
        ExtractSettings {
            timeout: self.page_timeout,
            initial_settle: self.post_settle,
            retry_settle: self.retry_settle,
            hard_limit_floor: self.hard_limit_floor,
            hard_limit_slack: self.hard_limit_slack,
        }
    }

    #[must_use]
    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            collect: self.collect_settings(),
            extract: self.extract_settings(),
            per_post_delay: self.per_post_delay,
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_renderer_kind(value: &str) -> Result<RendererKind, ConfigError> {
    match value.to_lowercase().as_str() {
        "chromium" | "chrome" => Ok(RendererKind::Chromium),
        "http" => Ok(RendererKind::Http),
        _ => Err(ConfigError::InvalidValue {
            name: "RENDERER".to_string(),
            message: format!("must be 'chromium' or 'http', got '{value}'"),
        }),
    }
}

fn parse_resource_types(value: &str) -> Result<Vec<ResourceType>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            ResourceType::parse(name).ok_or_else(|| ConfigError::InvalidValue {
                name: "BLOCKED_RESOURCES".to_string(),
                message: format!("unknown resource type '{name}'"),
            })
        })
        .collect()
}

/// Parse `+HH:MM` / `-HH:MM` into a fixed offset.
fn parse_utc_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    value
        .trim()
        .parse::<FixedOffset>()
        .map_err(|e| ConfigError::InvalidValue {
            name: "SOURCE_UTC_OFFSET".to_string(),
            message: format!("expected +HH:MM or -HH:MM, got '{value}': {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_renderer_kind() {
        assert_eq!(parse_renderer_kind("chromium").unwrap(), RendererKind::Chromium);
        assert_eq!(parse_renderer_kind("HTTP").unwrap(), RendererKind::Http);
        assert!(parse_renderer_kind("firefox").is_err());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(
            parse_utc_offset("+09:00").unwrap(),
            FixedOffset::east_opt(9 * 3600).unwrap()
        );
        assert_eq!(
            parse_utc_offset("-05:30").unwrap(),
            FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap()
        );
        assert!(parse_utc_offset("09:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("KST").is_err());
        assert_eq!(
            parse_utc_offset(" +00:00 ").unwrap(),
            FixedOffset::east_opt(0).unwrap()
        );
    }

    #[test]
    fn test_parse_resource_types() {
        assert_eq!(
            parse_resource_types("image, font").unwrap(),
            vec![ResourceType::Image, ResourceType::Font]
        );
        assert!(parse_resource_types("").unwrap().is_empty());
        assert!(parse_resource_types("image,script").is_err());
    }

    #[test]
    fn test_parse_env_defaults() {
        assert_eq!(parse_env_u64("NONEXISTENT_VAR", 7).unwrap(), 7);
        assert_eq!(parse_env_usize("NONEXISTENT_VAR", 3).unwrap(), 3);
    }
}
