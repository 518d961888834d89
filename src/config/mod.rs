//! Configuration loading and validation.
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional TOML
//! file, `COVID_BOT__SECTION__KEY` environment variables, and finally the
//! flat variables older deployments use (`BOT_TOKEN`, `URL_ITEMS`, `TEXT_*`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::DATASET_ID_PLACEHOLDER;
use crate::models::normalize_run_at;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Dataset API endpoints and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory listing every country with its dataset URL
    pub directory_url: String,

    /// Items endpoint; `$ID` is replaced by the dataset id
    pub items_url: String,

    /// Position of the dataset id in the `/`-split directory URL
    pub dataset_id_segment: usize,

    /// How long a fetched directory stays fresh
    pub directory_ttl_seconds: u64,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            directory_url: "https://api.apify.com/v2/key-value-stores/tVaYRsPHLjNdNBu7S/records/LATEST?disableRedirect=true".to_string(),
            items_url: "https://api.apify.com/v2/datasets/$ID/items".to_string(),
            dataset_id_segment: 5,
            directory_ttl_seconds: 24 * 60 * 60,
            timeout_seconds: 30,
            user_agent: format!("covid-bot/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Chat command and Discord REST settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token used for outbound Discord REST calls
    pub token: Option<String>,

    /// Discord REST API base URL
    pub api_base: String,

    pub command_prefix: String,
    pub command_name: String,

    /// Snapshots fetched per stats request (two diffs need three)
    pub items_limit: u32,

    /// Regions listed in the stats embed
    pub region_limit: usize,

    /// Notification time used when `notify` is given none
    pub default_run_at: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: "https://discord.com/api/v10".to_string(),
            command_prefix: "!".to_string(),
            command_name: "covid".to_string(),
            items_limit: 3,
            region_limit: 5,
            default_run_at: "08:00".to_string(),
        }
    }
}

/// Scheduled notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,

    /// Seconds between schedule checks
    pub tick_seconds: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_seconds: 60,
        }
    }
}

/// Command relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// User-facing strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub title_top: String,
    pub stats_description: String,

    /// strftime format of the embed title date
    pub stats_today_format: String,
    pub stats_total: String,
    pub total_title: String,
    pub by_region_title: String,
    pub infected_total: String,
    pub infected_new: String,
    pub deaths: String,
    pub author_icon_url: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            title_top: "COVID-19".to_string(),
            stats_description: "Day-over-day changes from the latest report.".to_string(),
            stats_today_format: "%d.%m.%Y".to_string(),
            stats_total: "**Totals**".to_string(),
            total_title: "Overall".to_string(),
            by_region_title: "By region".to_string(),
            infected_total: "Infected".to_string(),
            infected_new: "New cases".to_string(),
            deaths: "Deaths".to_string(),
            author_icon_url: "https://cdn.discordapp.com/embed/avatars/4.png".to_string(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    pub fetch: FetchConfig,
    pub bot: BotConfig,
    pub notify: NotifyConfig,
    pub server: ServerConfig,
    pub text: TextConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./covid.db"),
            log_level: "info".to_string(),
            fetch: FetchConfig::default(),
            bot: BotConfig::default(),
            notify: NotifyConfig::default(),
            server: ServerConfig::default(),
            text: TextConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("COVID_BOT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply the flat environment variables of the original deployment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut String); 11] = [
            ("URL_DATASETS", &mut self.fetch.directory_url),
            ("URL_ITEMS", &mut self.fetch.items_url),
            ("TEXT_TITLE_TOP", &mut self.text.title_top),
            ("TEXT_STATS_DESCRIPTION", &mut self.text.stats_description),
            ("TEXT_STATS_TODAY_FORMAT", &mut self.text.stats_today_format),
            ("TEXT_STATS_TOTAL", &mut self.text.stats_total),
            ("TEXT_TOTAL_TITLE", &mut self.text.total_title),
            ("TEXT_BY_REGION_TITLE", &mut self.text.by_region_title),
            ("TEXT_INFECTED_TOTAL", &mut self.text.infected_total),
            ("TEXT_INFECTED_NEW", &mut self.text.infected_new),
            ("TEXT_DEATHS", &mut self.text.deaths),
        ];
        for (key, target) in overrides {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        }

        if let Some(token) = lookup("BOT_TOKEN") {
            self.bot.token = Some(token);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        if !self.fetch.items_url.contains(DATASET_ID_PLACEHOLDER) {
            return Err(ConfigError::ValidationError(format!(
                "Items URL must contain the {} placeholder",
                DATASET_ID_PLACEHOLDER
            )));
        }

        if self.bot.items_limit < 3 {
            return Err(ConfigError::ValidationError(
                "Items limit must be at least 3".to_string(),
            ));
        }

        if self.bot.region_limit == 0 {
            return Err(ConfigError::ValidationError(
                "Region limit must be greater than 0".to_string(),
            ));
        }

        if normalize_run_at(&self.bot.default_run_at).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Default run time {:?} is not HH:MM",
                self.bot.default_run_at
            )));
        }

        if self.notify.tick_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Notify tick must be greater than 0".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
