//! Chat command surface.
//!
//! A message such as `!covid setup Czechia` is parsed into a [`Command`],
//! executed by [`CovidBot`] and answered with a [`Reply`]. Scheduled
//! notifications reuse the same stats pipeline through [`NotificationScheduler`].

mod handler;
pub mod publish;
pub mod scheduler;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculate::SeriesError;
use crate::fetch::{FetchError, LocateError};
use crate::models::{normalize_run_at, ChannelId, GuildId, UserId};
use crate::present::{Embed, PresentError};
use crate::storage::StorageError;

pub use handler::CovidBot;
pub use publish::{DiscordPublisher, OutgoingMessage, PublishError, Publisher};
pub use scheduler::{NotificationScheduler, NotifyReport};

/// Anything that can go wrong while answering a command. The display text is
/// what the user sees.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("{0}")]
    Usage(String),

    #[error("No country configured for this server. Use `setup <country>` first.")]
    NotConfigured,

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("Failed to fetch statistics: {0}")]
    Fetch(#[from] FetchError),

    #[error("Unusable statistics: {0}")]
    Series(#[from] SeriesError),

    #[error("Cannot render statistics: {0}")]
    Present(#[from] PresentError),

    #[error("Settings error: {0}")]
    Storage(#[from] StorageError),
}

/// Who sent a command, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub author_name: String,
}

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stats for the stored country, or an ad-hoc one
    Stats { country: Option<String> },
    Setup { country: String },
    Notify { run_at: Option<String>, mention_everyone: bool },
    StopNotify,
    Help,
}

/// Bot answer: plain text, an embed, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embed: Some(embed),
        }
    }
}

/// Recognises `<prefix><name> [args...]` messages.
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefix: String,
    name: String,
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    /// The command word users type, e.g. `!covid`.
    pub fn invocation(&self) -> String {
        format!("{}{}", self.prefix, self.name)
    }

    /// `Ok(None)` when the message is not addressed to the bot.
    pub fn parse(&self, content: &str) -> Result<Option<Command>, BotError> {
        let Some(rest) = content.trim().strip_prefix(self.prefix.as_str()) else {
            return Ok(None);
        };
        let mut words = rest.split_whitespace();
        match words.next() {
            Some(word) if word.eq_ignore_ascii_case(&self.name) => {}
            _ => return Ok(None),
        }

        let args: Vec<&str> = words.collect();
        let command = match args.split_first() {
            None => Command::Stats { country: None },
            Some((sub, rest)) => match sub.to_lowercase().as_str() {
                "help" if rest.is_empty() => Command::Help,
                "setup" => {
                    if rest.is_empty() {
                        return Err(BotError::Usage(format!(
                            "Usage: `{} setup <country>`",
                            self.invocation()
                        )));
                    }
                    Command::Setup {
                        country: rest.join(" "),
                    }
                }
                "notify" => self.parse_notify(rest)?,
                _ => Command::Stats {
                    country: Some(args.join(" ")),
                },
            },
        };

        Ok(Some(command))
    }

    fn parse_notify(&self, args: &[&str]) -> Result<Command, BotError> {
        if let [word] = args {
            if word.eq_ignore_ascii_case("off") || word.eq_ignore_ascii_case("stop") {
                return Ok(Command::StopNotify);
            }
        }

        let mut run_at = None;
        let mut mention_everyone = false;
        for arg in args {
            if arg.eq_ignore_ascii_case("everyone") || *arg == "@everyone" {
                mention_everyone = true;
            } else if let Some(time) = normalize_run_at(arg) {
                run_at = Some(time);
            } else {
                return Err(BotError::Usage(format!(
                    "Usage: `{} notify [HH:MM] [everyone]` or `{} notify off`",
                    self.invocation(),
                    self.invocation()
                )));
            }
        }

        Ok(Command::Notify {
            run_at,
            mention_everyone,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parser() -> CommandParser {
        CommandParser::new("!", "covid")
    }

    #[test]
    fn test_ignores_other_messages() {
        assert_eq!(parser().parse("hello").unwrap(), None);
        assert_eq!(parser().parse("!play music").unwrap(), None);
        assert_eq!(parser().parse("!covidx").unwrap(), None);
        assert_eq!(parser().parse("covid").unwrap(), None);
    }

    #[test]
    fn test_bare_invocation() {
        assert_eq!(
            parser().parse("  !covid ").unwrap(),
            Some(Command::Stats { country: None })
        );
        assert_eq!(
            parser().parse("!COVID").unwrap(),
            Some(Command::Stats { country: None })
        );
    }

    #[test]
    fn test_ad_hoc_country() {
        assert_eq!(
            parser().parse("!covid United Kingdom").unwrap(),
            Some(Command::Stats { country: Some("United Kingdom".into()) })
        );
    }

    #[test]
    fn test_setup() {
        assert_eq!(
            parser().parse("!covid setup  Czech   Republic").unwrap(),
            Some(Command::Setup { country: "Czech Republic".into() })
        );
        assert!(matches!(parser().parse("!covid setup"), Err(BotError::Usage(_))));
    }

    #[test]
    fn test_notify() {
        assert_eq!(
            parser().parse("!covid notify").unwrap(),
            Some(Command::Notify { run_at: None, mention_everyone: false })
        );
        assert_eq!(
            parser().parse("!covid notify 7:30 everyone").unwrap(),
            Some(Command::Notify { run_at: Some("07:30".into()), mention_everyone: true })
        );
        assert_eq!(parser().parse("!covid notify off").unwrap(), Some(Command::StopNotify));
        assert!(matches!(parser().parse("!covid notify soon"), Err(BotError::Usage(_))));
    }

    #[test]
    fn test_help_and_custom_prefix() {
        assert_eq!(parser().parse("!covid help").unwrap(), Some(Command::Help));

        let custom = CommandParser::new("?", "korona");
        assert_eq!(custom.invocation(), "?korona");
        assert_eq!(custom.parse("?korona").unwrap(), Some(Command::Stats { country: None }));
        assert_eq!(custom.parse("!covid").unwrap(), None);
    }

    #[test]
    fn test_reply_json_omits_empty_parts() {
        let json = serde_json::to_value(Reply::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"content": "hi"}));
    }
}
