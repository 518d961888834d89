use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::StorageError;
use crate::models::{
    normalize_run_at, ChannelId, ChannelSettings, DatasetEntry, DatasetId, GuildId,
    GuildSettings, NotificationTarget, UserId,
};

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS guild (
            guildId INTEGER PRIMARY KEY,
            countryName TEXT,
            datasetId TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS channel (
            guildId INTEGER NOT NULL,
            channelId INTEGER NOT NULL,
            addedById INTEGER NOT NULL,
            addedByName TEXT NOT NULL,
            runAt TEXT NOT NULL,
            mentionEveryone INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (guildId, channelId),
            FOREIGN KEY (guildId) REFERENCES guild(guildId) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_channel_run_at ON channel(runAt)",
        [],
    )?;

    Ok(())
}

const CHANNEL_COLUMNS: &str = "channel.guildId, channel.channelId, channel.addedById, \
     channel.addedByName, channel.runAt, channel.mentionEveryone";

fn channel_from_row(row: &Row) -> rusqlite::Result<ChannelSettings> {
    Ok(ChannelSettings {
        guild_id: GuildId::from_sql(row.get(0)?),
        channel_id: ChannelId::from_sql(row.get(1)?),
        added_by_id: UserId::from_sql(row.get(2)?),
        added_by_name: row.get(3)?,
        run_at: row.get(4)?,
        mention_everyone: row.get(5)?,
    })
}

/// Columns 6 and 7 hold the joined guild's country and dataset.
fn dataset_from_row(row: &Row) -> rusqlite::Result<Option<DatasetEntry>> {
    let country: Option<String> = row.get(6)?;
    let dataset: Option<String> = row.get(7)?;
    Ok(country.zip(dataset).map(|(country_name, id)| DatasetEntry {
        country_name,
        dataset_id: DatasetId::from(id),
    }))
}

/// SQLite-backed settings store. Cheap to share behind an `Arc`.
pub struct ConfigStore {
    conn: Mutex<Connection>,
}

impl ConfigStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening settings database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Register a guild, optionally setting its country.
    pub fn add_guild(
        &self,
        guild_id: GuildId,
        dataset: Option<&DatasetEntry>,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO guild (guildId) VALUES (?1)",
            params![guild_id.to_sql()],
        )?;
        if let Some(dataset) = dataset {
            tx.execute(
                "UPDATE guild SET countryName = ?1, datasetId = ?2 WHERE guildId = ?3",
                params![
                    dataset.country_name,
                    dataset.dataset_id.as_str(),
                    guild_id.to_sql()
                ],
            )?;
        }

        tx.commit()?;
        debug!("Stored guild {}", guild_id);
        Ok(())
    }

    /// Remove a guild and all its channels.
    pub fn remove_guild(&self, guild_id: GuildId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM guild WHERE guildId = ?1",
            params![guild_id.to_sql()],
        )?;
        Ok(())
    }

    pub fn get_by_guild(&self, guild_id: GuildId) -> Result<Option<GuildSettings>, StorageError> {
        let conn = self.conn()?;
        let settings = conn
            .query_row(
                "SELECT guildId, countryName, datasetId FROM guild WHERE guildId = ?1",
                params![guild_id.to_sql()],
                |row| {
                    Ok(GuildSettings {
                        guild_id: GuildId::from_sql(row.get(0)?),
                        country_name: row.get(1)?,
                        dataset_id: row.get::<_, Option<String>>(2)?.map(DatasetId::from),
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    /// Channels of a guild registered for notifications.
    pub fn guild_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelSettings>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM channel WHERE guildId = ?1 ORDER BY channelId",
            CHANNEL_COLUMNS
        ))?;
        let channels = stmt
            .query_map(params![guild_id.to_sql()], channel_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }

    /// Register (or update) a channel for notifications. The guild row is
    /// created if missing.
    pub fn add_channel(&self, channel: &ChannelSettings) -> Result<(), StorageError> {
        let run_at = normalize_run_at(&channel.run_at)
            .ok_or_else(|| StorageError::InvalidRunAt(channel.run_at.clone()))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO guild (guildId) VALUES (?1)",
            params![channel.guild_id.to_sql()],
        )?;
        tx.execute(
            "INSERT INTO channel (guildId, channelId, addedById, addedByName, runAt, mentionEveryone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (guildId, channelId) DO UPDATE SET
                addedById = excluded.addedById,
                addedByName = excluded.addedByName,
                runAt = excluded.runAt,
                mentionEveryone = excluded.mentionEveryone",
            params![
                channel.guild_id.to_sql(),
                channel.channel_id.to_sql(),
                channel.added_by_id.to_sql(),
                channel.added_by_name,
                run_at,
                channel.mention_everyone
            ],
        )?;
        tx.commit()?;

        debug!(
            "Channel {} in guild {} notifies at {}",
            channel.channel_id, channel.guild_id, run_at
        );
        Ok(())
    }

    /// Returns whether a channel was registered.
    pub fn remove_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM channel WHERE guildId = ?1 AND channelId = ?2",
            params![guild_id.to_sql(), channel_id.to_sql()],
        )?;
        Ok(removed > 0)
    }

    /// A channel's settings joined with its guild's dataset.
    pub fn get_by_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Option<NotificationTarget>, StorageError> {
        let conn = self.conn()?;
        let target = conn
            .query_row(
                &format!(
                    "SELECT {}, guild.countryName, guild.datasetId
                     FROM channel JOIN guild ON guild.guildId = channel.guildId
                     WHERE channel.guildId = ?1 AND channel.channelId = ?2",
                    CHANNEL_COLUMNS
                ),
                params![guild_id.to_sql(), channel_id.to_sql()],
                |row| {
                    Ok(NotificationTarget {
                        channel: channel_from_row(row)?,
                        dataset: dataset_from_row(row)?,
                    })
                },
            )
            .optional()?;
        Ok(target)
    }

    /// Channels whose run time equals `run_at` (`HH:MM`).
    pub fn channels_due(&self, run_at: &str) -> Result<Vec<NotificationTarget>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, guild.countryName, guild.datasetId
             FROM channel JOIN guild ON guild.guildId = channel.guildId
             WHERE channel.runAt = ?1
             ORDER BY channel.guildId, channel.channelId",
            CHANNEL_COLUMNS
        ))?;
        let targets = stmt
            .query_map(params![run_at], |row| {
                Ok(NotificationTarget {
                    channel: channel_from_row(row)?,
                    dataset: dataset_from_row(row)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(targets)
    }
}
