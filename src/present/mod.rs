//! Discord embed rendering of case statistics.

use std::cmp::Reverse;
use std::fmt::{self, Display, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculate::count_delta;
use crate::config::TextConfig;
use crate::models::{CountResult, DiffResult};

/// Field name used for continuation fields that should render without a header.
pub const ZERO_WIDTH_SPACE: &str = "\u{200b}";

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("Not enough data: need 2 counts and 2 differences, got {counts} and {diffs}")]
    NotEnoughData { counts: usize, diffs: usize },

    #[error("Invalid date format {0:?}")]
    InvalidDateFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rich message body in Discord's embed JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(EmbedAuthor {
            name: name.into(),
            icon_url,
        });
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
    }
}

/// Plain-text rendering for terminals and logs.
impl Display for Embed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(author) = &self.author {
            writeln!(f, "{}", author.name)?;
        }
        if let Some(title) = &self.title {
            writeln!(f, "# {}", title)?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "{}", description)?;
        }
        for field in &self.fields {
            if field.name != ZERO_WIDTH_SPACE {
                writeln!(f, "\n## {}", field.name)?;
            }
            writeln!(f, "{}", field.value)?;
        }
        Ok(())
    }
}

/// `"{prefix}: __{count}__ (+{diff})"`, with the count bolded on request and
/// the parenthesised change only when `show_diff` is set.
pub fn field_value(
    prefix: &str,
    count: impl Display,
    diff: i64,
    show_diff: bool,
    bold: bool,
) -> String {
    let diff = match (show_diff, diff < 0) {
        (false, _) => String::new(),
        (true, true) => format!(" ({})", diff),
        (true, false) => format!(" (+{})", diff),
    };
    let bold = if bold { "**" } else { "" };
    format!("{}: __{}{}{}__{}", prefix, bold, count, bold, diff)
}

fn format_count(count: Option<i64>) -> String {
    count.map_or_else(|| "?".to_string(), |c| c.to_string())
}

/// New cases and deaths for the latest day, compared with the day before.
fn add_new_cases(
    embed: &mut Embed,
    latest: &DiffResult,
    previous: &DiffResult,
    texts: &TextConfig,
) {
    let rows = [
        (&texts.infected_new, latest.infected, previous.infected),
        (&texts.deaths, latest.deaths, previous.deaths),
    ];
    for (i, (prefix, today, yesterday)) in rows.into_iter().enumerate() {
        let name = if i == 0 { texts.total_title.as_str() } else { ZERO_WIDTH_SPACE };
        let value = field_value(prefix, today, count_delta(today, yesterday), true, true);
        embed.add_field(name, value, true);
    }
}

/// Cumulative totals for the latest day.
fn add_totals(embed: &mut Embed, latest: &CountResult, texts: &TextConfig) {
    let rows = [
        (&texts.infected_total, latest.infected),
        (&texts.deaths, latest.deaths),
    ];
    for (i, (prefix, count)) in rows.into_iter().enumerate() {
        let name = if i == 0 { texts.total_title.as_str() } else { ZERO_WIDTH_SPACE };
        embed.add_field(name, field_value(prefix, format_count(count), 0, false, false), true);
    }
}

/// Regions with the most new cases, each compared with its previous day.
fn add_region_cases(
    embed: &mut Embed,
    latest: &DiffResult,
    previous: &DiffResult,
    texts: &TextConfig,
    limit: usize,
) {
    if latest.regions.is_empty() {
        return;
    }

    let mut regions: Vec<(&str, i64, i64)> = latest
        .regions
        .iter()
        .map(|r| {
            let before = previous.region(&r.name).map_or(0, |p| p.infected);
            (r.name.as_str(), r.infected, count_delta(r.infected, before))
        })
        .collect();
    regions.sort_by_key(|&(_, count, _)| Reverse(count));

    let text = regions
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, (name, count, diff))| {
            format!("{}. {}", i + 1, field_value(name, count, *diff, true, false))
        })
        .collect::<Vec<_>>()
        .join("\n");

    embed.add_field(texts.by_region_title.as_str(), text, false);
}

/// Full statistics embed for one country.
///
/// `counts` and `diffs` are in chronological order as produced by
/// [`crate::calculate`]; the last entries are the latest day.
pub fn stats_embed(
    country: &str,
    counts: &[CountResult],
    diffs: &[DiffResult],
    texts: &TextConfig,
    region_limit: usize,
) -> Result<Embed, PresentError> {
    let (latest_diff, previous_diff, latest_count) = match (diffs, counts.last()) {
        ([.., previous, latest], Some(count)) if counts.len() >= 2 => (latest, previous, count),
        _ => {
            return Err(PresentError::NotEnoughData {
                counts: counts.len(),
                diffs: diffs.len(),
            })
        }
    };

    let mut title = String::new();
    write!(title, "{}", latest_diff.date.format(&texts.stats_today_format))
        .map_err(|_| PresentError::InvalidDateFormat(texts.stats_today_format.clone()))?;

    let mut embed = Embed::new(title)
        .with_description(texts.stats_description.as_str())
        .with_author(
            format!("{} ({})", texts.title_top, country),
            Some(texts.author_icon_url.clone()).filter(|u| !u.is_empty()),
        );

    add_new_cases(&mut embed, latest_diff, previous_diff, texts);
    add_region_cases(&mut embed, latest_diff, previous_diff, texts, region_limit);
    embed.add_field(ZERO_WIDTH_SPACE, texts.stats_total.as_str(), false);
    add_totals(&mut embed, latest_count, texts);

    Ok(embed)
}
