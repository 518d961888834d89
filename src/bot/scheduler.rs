//! Daily notifications for registered channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{CovidBot, OutgoingMessage, Publisher};
use crate::calculate::local_offset;
use crate::models::{DatasetId, RUN_AT_FORMAT};
use crate::present::Embed;
use crate::storage::ConfigStore;

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub sent: usize,
    pub failed: usize,
    /// Channels whose guild has no country configured
    pub skipped: usize,
}

/// Posts stats to every channel whose run time matches the local clock.
pub struct NotificationScheduler {
    bot: Arc<CovidBot>,
    store: Arc<ConfigStore>,
    publisher: Arc<dyn Publisher>,
    last_run: Mutex<Option<String>>,
}

impl NotificationScheduler {
    pub fn new(bot: Arc<CovidBot>, store: Arc<ConfigStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            bot,
            store,
            publisher,
            last_run: Mutex::new(None),
        }
    }

    /// Run the pass for `now` unless this minute was already handled.
    pub async fn tick(&self, now: DateTime<FixedOffset>) -> Option<NotifyReport> {
        let run_at = now.format(RUN_AT_FORMAT).to_string();
        {
            let mut last_run = self.last_run.lock().await;
            if last_run.as_deref() == Some(run_at.as_str()) {
                return None;
            }
            *last_run = Some(run_at.clone());
        }
        Some(self.run_due(&run_at).await)
    }

    /// Notify all channels scheduled at `run_at` (`HH:MM`).
    pub async fn run_due(&self, run_at: &str) -> NotifyReport {
        let mut report = NotifyReport::default();
        let targets = match self.store.channels_due(run_at) {
            Ok(targets) => targets,
            Err(e) => {
                error!("Failed to load channels due at {}: {}", run_at, e);
                return report;
            }
        };
        if targets.is_empty() {
            return report;
        }
        info!("{} channel(s) due at {}", targets.len(), run_at);

        // One fetch per dataset, shared by every channel following it
        let mut rendered: HashMap<DatasetId, Option<Embed>> = HashMap::new();

        for target in targets {
            let channel = &target.channel;
            let Some(dataset) = &target.dataset else {
                warn!(
                    guild = %channel.guild_id,
                    "Channel {} is registered but the guild has no country", channel.channel_id
                );
                report.skipped += 1;
                continue;
            };

            if !rendered.contains_key(&dataset.dataset_id) {
                let embed = match self.bot.stats_for(dataset).await {
                    Ok(embed) => Some(embed),
                    Err(e) => {
                        warn!("Stats for {} unavailable: {}", dataset.country_name, e);
                        None
                    }
                };
                rendered.insert(dataset.dataset_id.clone(), embed);
            }

            let Some(embed) = rendered.get(&dataset.dataset_id).cloned().flatten() else {
                report.failed += 1;
                continue;
            };

            let message = OutgoingMessage::stats(embed, channel.mention_everyone);
            match self.publisher.publish(channel.channel_id, &message).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(
                        guild = %channel.guild_id,
                        "Posting to channel {} failed: {}", channel.channel_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Notifications at {}: {} sent, {} failed, {} skipped",
            run_at, report.sent, report.failed, report.skipped
        );
        report
    }

    /// Check the schedule every `interval` until the task is dropped.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        info!("Notification scheduler running every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = Utc::now().with_timezone(&local_offset());
            self.tick(now).await;
        }
    }
}
