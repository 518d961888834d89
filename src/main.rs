use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use covid_bot::api::{build_router, state::AppState};
use covid_bot::bot::{CommandContext, CovidBot, DiscordPublisher, NotificationScheduler};
use covid_bot::config::AppConfig;
use covid_bot::fetch::{DatasetLocator, DirectoryCache, Fetcher, SystemClock};
use covid_bot::models::{ChannelId, GuildId, UserId};
use covid_bot::storage::ConfigStore;

#[derive(Parser)]
#[command(name = "covid-bot")]
#[command(about = "Discord bot posting COVID-19 statistics")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the command relay server and the notification scheduler
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,

        /// Do not post scheduled notifications
        #[arg(long)]
        no_notify: bool,
    },

    /// Print statistics for a country
    Stats {
        country: String,

        /// Print the embed as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a country to its dataset id
    Locate { country: String },

    /// Set a guild's default country
    Setup {
        country: String,

        #[arg(long)]
        guild: u64,
    },

    /// Run one chat command as if it was sent in a channel
    Command {
        /// Message text, e.g. "!covid setup Czechia"
        content: String,

        #[arg(long, default_value = "0")]
        guild: u64,

        #[arg(long, default_value = "0")]
        channel: u64,

        #[arg(long, default_value = "0")]
        author_id: u64,

        #[arg(long, default_value = "cli")]
        author_name: String,
    },

    /// Print the effective configuration
    Config,
}

struct Components {
    bot: Arc<CovidBot>,
    locator: Arc<DatasetLocator>,
    store: Arc<ConfigStore>,
}

fn build(config: &AppConfig) -> Result<Components> {
    let fetcher = Arc::new(Fetcher::new(config.fetch.clone()).context("building HTTP client")?);
    let locator = Arc::new(DatasetLocator::new(
        fetcher.clone(),
        DirectoryCache::new(
            Duration::from_secs(config.fetch.directory_ttl_seconds),
            Arc::new(SystemClock),
        ),
        config.fetch.dataset_id_segment,
    ));
    let store = Arc::new(
        ConfigStore::open(&config.database_path)
            .with_context(|| format!("opening {}", config.database_path.display()))?,
    );
    let bot = Arc::new(CovidBot::new(config, locator.clone(), fetcher, store.clone()));

    Ok(Components {
        bot,
        locator,
        store,
    })
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let path = path.exists().then_some(path);
    AppConfig::load(path).context("loading configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    // Initialize tracing
    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting covid-bot v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_notify,
        } => {
            let components = build(&config)?;

            if config.notify.enabled && !no_notify {
                match &config.bot.token {
                    Some(token) => {
                        let publisher = DiscordPublisher::new(
                            &config.bot.api_base,
                            token,
                            Duration::from_secs(config.fetch.timeout_seconds),
                        )?;
                        let scheduler = Arc::new(NotificationScheduler::new(
                            components.bot.clone(),
                            components.store.clone(),
                            Arc::new(publisher),
                        ));
                        tokio::spawn(
                            scheduler.run(Duration::from_secs(config.notify.tick_seconds)),
                        );
                    }
                    None => {
                        tracing::warn!("No bot token configured; scheduled notifications disabled")
                    }
                }
            }

            let app = build_router(AppState {
                bot: components.bot,
            });
            let addr = format!(
                "{}:{}",
                host.unwrap_or(config.server.host.clone()),
                port.unwrap_or(config.server.port)
            );
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Command relay listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Stats { country, json } => {
            let components = build(&config)?;
            let dataset = components.locator.locate(&country).await?;
            let embed = components.bot.stats_for(&dataset).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&embed)?);
            } else {
                print!("{}", embed);
            }
        }
        Commands::Locate { country } => {
            let components = build(&config)?;
            let dataset = components.locator.locate(&country).await?;
            println!("{}\t{}", dataset.country_name, dataset.dataset_id);
        }
        Commands::Setup { country, guild } => {
            let components = build(&config)?;
            let dataset = components.bot.setup_guild(GuildId(guild), &country).await?;
            println!(
                "Guild {} set to {} ({})",
                guild, dataset.country_name, dataset.dataset_id
            );
        }
        Commands::Command {
            content,
            guild,
            channel,
            author_id,
            author_name,
        } => {
            let components = build(&config)?;
            let ctx = CommandContext {
                guild_id: GuildId(guild),
                channel_id: ChannelId(channel),
                author_id: UserId(author_id),
                author_name,
            };

            match components.bot.handle_message(&ctx, &content).await {
                Some(reply) => {
                    if let Some(text) = reply.content {
                        println!("{}", text);
                    }
                    if let Some(embed) = reply.embed {
                        print!("{}", embed);
                    }
                }
                None => tracing::warn!(
                    "Not a bot command; messages start with {}",
                    components.bot.parser().invocation()
                ),
            }
        }
        Commands::Config => {
            let mut shown = config.clone();
            if shown.bot.token.is_some() {
                shown.bot.token = Some("<redacted>".to_string());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}
