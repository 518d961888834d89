//! Persisted per-guild and per-channel settings.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::{ChannelId, DatasetEntry, DatasetId, GuildId, UserId};

/// Format used for stored notification times.
pub const RUN_AT_FORMAT: &str = "%H:%M";

/// Guild-level configuration: the country shown by a bare `!covid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: GuildId,
    pub country_name: Option<String>,
    pub dataset_id: Option<DatasetId>,
}

impl GuildSettings {
    /// The configured dataset, if both halves are stored.
    pub fn dataset(&self) -> Option<DatasetEntry> {
        match (&self.country_name, &self.dataset_id) {
            (Some(country_name), Some(dataset_id)) => Some(DatasetEntry {
                country_name: country_name.clone(),
                dataset_id: dataset_id.clone(),
            }),
            _ => None,
        }
    }
}

/// A channel registered for scheduled notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub added_by_id: UserId,
    pub added_by_name: String,

    /// Local wall-clock time, `HH:MM`
    pub run_at: String,
    pub mention_everyone: bool,
}

/// A channel joined with its guild's dataset, ready to be notified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub channel: ChannelSettings,
    pub dataset: Option<DatasetEntry>,
}

/// Normalize a user supplied time (`8:05`, `08:05`) to `HH:MM`.
pub fn normalize_run_at(input: &str) -> Option<String> {
    NaiveTime::parse_from_str(input.trim(), RUN_AT_FORMAT)
        .ok()
        .map(|t| t.format(RUN_AT_FORMAT).to_string())
}
