use std::sync::Arc;

use tracing::{info, warn};

use super::{BotError, Command, CommandContext, CommandParser, Reply};
use crate::calculate::{compute_counts, compute_diffs};
use crate::config::{AppConfig, BotConfig, TextConfig};
use crate::fetch::{DatasetLocator, ItemSource};
use crate::models::{normalize_run_at, ChannelSettings, DatasetEntry, GuildId};
use crate::present::{stats_embed, Embed};
use crate::resolve::FieldTable;
use crate::storage::ConfigStore;

/// Executes chat commands: locate dataset → fetch → transform → render.
pub struct CovidBot {
    locator: Arc<DatasetLocator>,
    items: Arc<dyn ItemSource>,
    store: Arc<ConfigStore>,
    parser: CommandParser,
    settings: BotConfig,
    texts: TextConfig,
    table: FieldTable,
}

impl CovidBot {
    pub fn new(
        config: &AppConfig,
        locator: Arc<DatasetLocator>,
        items: Arc<dyn ItemSource>,
        store: Arc<ConfigStore>,
    ) -> Self {
        Self {
            locator,
            items,
            store,
            parser: CommandParser::new(&config.bot.command_prefix, &config.bot.command_name),
            settings: config.bot.clone(),
            texts: config.text.clone(),
            table: FieldTable::default(),
        }
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// Parse and answer a raw chat message. `None` if it is not a bot command.
    pub async fn handle_message(&self, ctx: &CommandContext, content: &str) -> Option<Reply> {
        match self.parser.parse(content) {
            Ok(Some(command)) => Some(self.handle(ctx, command).await),
            Ok(None) => None,
            Err(e) => Some(Reply::text(e.to_string())),
        }
    }

    /// Resolve `country` and store its dataset as the guild's default.
    pub async fn setup_guild(
        &self,
        guild_id: GuildId,
        country: &str,
    ) -> Result<DatasetEntry, BotError> {
        let dataset = self.locator.locate(country).await?;
        self.store.add_guild(guild_id, Some(&dataset))?;
        info!(guild = %guild_id, "Country set to {}", dataset.country_name);
        Ok(dataset)
    }

    /// Answer a command. Failures become the reply text.
    pub async fn handle(&self, ctx: &CommandContext, command: Command) -> Reply {
        info!(
            guild = %ctx.guild_id,
            channel = %ctx.channel_id,
            "Handling {:?} from {}",
            command,
            ctx.author_name
        );

        match self.execute(ctx, command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(guild = %ctx.guild_id, "Command failed: {}", e);
                Reply::text(e.to_string())
            }
        }
    }

    async fn execute(&self, ctx: &CommandContext, command: Command) -> Result<Reply, BotError> {
        match command {
            Command::Stats { country } => {
                let dataset = match country {
                    Some(country) => self.locator.locate(&country).await?,
                    None => self.guild_dataset(ctx)?,
                };
                Ok(Reply::embed(self.stats_for(&dataset).await?))
            }
            Command::Setup { country } => {
                let dataset = self.setup_guild(ctx.guild_id, &country).await?;
                Ok(Reply::text(format!(
                    "Country set to **{}**.",
                    dataset.country_name
                )))
            }
            Command::Notify {
                run_at,
                mention_everyone,
            } => {
                let dataset = self.guild_dataset(ctx)?;
                let run_at = match run_at {
                    Some(run_at) => run_at,
                    None => normalize_run_at(&self.settings.default_run_at)
                        .unwrap_or_else(|| self.settings.default_run_at.clone()),
                };
                self.store.add_channel(&ChannelSettings {
                    guild_id: ctx.guild_id,
                    channel_id: ctx.channel_id,
                    added_by_id: ctx.author_id,
                    added_by_name: ctx.author_name.clone(),
                    run_at: run_at.clone(),
                    mention_everyone,
                })?;
                Ok(Reply::text(format!(
                    "This channel will get **{}** statistics every day at {}.",
                    dataset.country_name, run_at
                )))
            }
            Command::StopNotify => {
                let removed = self.store.remove_channel(ctx.guild_id, ctx.channel_id)?;
                Ok(Reply::text(if removed {
                    "Notifications for this channel are off."
                } else {
                    "This channel has no notifications."
                }))
            }
            Command::Help => Ok(self.help()),
        }
    }

    fn guild_dataset(&self, ctx: &CommandContext) -> Result<DatasetEntry, BotError> {
        self.store
            .get_by_guild(ctx.guild_id)?
            .and_then(|settings| settings.dataset())
            .ok_or(BotError::NotConfigured)
    }

    /// Render the stats embed for a dataset.
    pub async fn stats_for(&self, dataset: &DatasetEntry) -> Result<Embed, BotError> {
        let items = self
            .items
            .fetch_items(&dataset.dataset_id, Some(self.settings.items_limit), true)
            .await?;

        let counts = compute_counts(&items, &self.table)?;
        let diffs = compute_diffs(&items, &self.table)?;

        Ok(stats_embed(
            &dataset.country_name,
            &counts,
            &diffs,
            &self.texts,
            self.settings.region_limit,
        )?)
    }

    fn help(&self) -> Reply {
        let cmd = self.parser.invocation();
        Reply::text(format!(
            "`{cmd}` statistics for this server's country\n\
             `{cmd} <country>` statistics for any country\n\
             `{cmd} setup <country>` set this server's country\n\
             `{cmd} notify [HH:MM] [everyone]` post statistics here every day\n\
             `{cmd} notify off` stop daily posts in this channel"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, harness};
    use super::*;

    #[tokio::test]
    async fn test_bare_stats_requires_setup() {
        let h = harness();
        let reply = h.bot.handle_message(&context(), "!covid").await.unwrap();

        assert_eq!(reply.content.unwrap(), BotError::NotConfigured.to_string());
        assert_eq!(h.items.calls(), 0);
    }

    #[tokio::test]
    async fn test_setup_then_stats() {
        let h = harness();
        let ctx = context();

        let reply = h.bot.handle_message(&ctx, "!covid setup czechia").await.unwrap();
        assert_eq!(reply.content.unwrap(), "Country set to **Czechia**.");
        let stored = h.store.get_by_guild(GuildId(1)).unwrap().unwrap();
        assert_eq!(stored.dataset_id.unwrap().as_str(), "cz-id");

        let reply = h.bot.handle_message(&ctx, "!covid").await.unwrap();
        let embed = reply.embed.unwrap();
        let latest = crate::calculate::parse_timestamp("2021-05-03T10:00:00Z").unwrap();
        assert_eq!(embed.title, Some(latest.format("%d.%m.%Y").to_string()));
        assert_eq!(embed.fields[0].value, "New cases: __**20**__ (-10)");
        assert_eq!(h.items.calls(), 1);
    }

    #[tokio::test]
    async fn test_setup_guild_directly() {
        let h = harness();

        let dataset = h.bot.setup_guild(GuildId(7), "  Slovakia ").await.unwrap();
        assert_eq!(dataset.country_name, "Slovakia");
        let stored = h.store.get_by_guild(GuildId(7)).unwrap().unwrap();
        assert_eq!(stored.country_name.as_deref(), Some("Slovakia"));

        let err = h.bot.setup_guild(GuildId(8), "Atlantis").await.unwrap_err();
        assert!(matches!(err, BotError::Locate(_)));
        assert_eq!(h.store.get_by_guild(GuildId(8)).unwrap(), None);
    }

    #[tokio::test]
    async fn test_ad_hoc_country() {
        let h = harness();
        let reply = h.bot.handle_message(&context(), "!covid SLOVAKIA").await.unwrap();

        let embed = reply.embed.unwrap();
        assert!(embed.author.unwrap().name.contains("Slovakia"));
        // Ad-hoc lookups do not touch the stored configuration
        assert_eq!(h.store.get_by_guild(GuildId(1)).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_country_is_echoed() {
        let h = harness();
        let reply = h.bot.handle_message(&context(), "!covid Narnia").await.unwrap();

        assert_eq!(reply.content.unwrap(), "Country not found: Narnia");
        assert!(reply.embed.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_echoed() {
        let h = harness();
        h.store
            .add_guild(
                GuildId(1),
                Some(&DatasetEntry {
                    country_name: "Broken".into(),
                    dataset_id: "broken-id".into(),
                }),
            )
            .unwrap();

        let reply = h.bot.handle_message(&context(), "!covid").await.unwrap();
        assert!(reply.content.unwrap().starts_with("Failed to fetch statistics"));
    }

    #[tokio::test]
    async fn test_notify_registers_channel() {
        let h = harness();
        let ctx = context();
        h.bot.handle_message(&ctx, "!covid setup Czechia").await.unwrap();

        let reply = h.bot.handle_message(&ctx, "!covid notify everyone").await.unwrap();
        assert!(reply.content.unwrap().contains("08:00"));

        let target = h.store.get_by_channel(ctx.guild_id, ctx.channel_id).unwrap().unwrap();
        assert_eq!(target.channel.run_at, "08:00");
        assert!(target.channel.mention_everyone);
        assert_eq!(target.channel.added_by_name, "alice");

        let reply = h.bot.handle_message(&ctx, "!covid notify off").await.unwrap();
        assert_eq!(reply.content.unwrap(), "Notifications for this channel are off.");
        assert_eq!(h.store.get_by_channel(ctx.guild_id, ctx.channel_id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_notify_requires_setup() {
        let h = harness();
        let reply = h.bot.handle_message(&context(), "!covid notify 09:00").await.unwrap();
        assert_eq!(reply.content.unwrap(), BotError::NotConfigured.to_string());
    }

    #[tokio::test]
    async fn test_usage_errors_and_non_commands() {
        let h = harness();
        assert_eq!(h.bot.handle_message(&context(), "good morning").await, None);

        let reply = h.bot.handle_message(&context(), "!covid setup").await.unwrap();
        assert!(reply.content.unwrap().starts_with("Usage"));

        let reply = h.bot.handle_message(&context(), "!covid help").await.unwrap();
        assert!(reply.content.unwrap().contains("!covid setup <country>"));
    }
}
