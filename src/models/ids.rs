//! Identifier newtypes for datasets and Discord entities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token identifying a country's dataset in the directory.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatasetId({})", self.0)
    }
}

impl From<String> for DatasetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DatasetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// SQLite stores integers as i64; snowflakes fit in 63 bits.
            pub fn to_sql(self) -> i64 {
                self.0 as i64
            }

            pub fn from_sql(value: i64) -> Self {
                Self(value as u64)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// Discord guild (server) ID.
    GuildId
);
snowflake!(
    /// Discord text channel ID.
    ChannelId
);
snowflake!(
    /// Discord user ID.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_id_display() {
        let id = DatasetId::from("L3VCmhMeX0KUQeJto");
        assert_eq!(id.to_string(), "L3VCmhMeX0KUQeJto");
        assert_eq!(format!("{:?}", id), "DatasetId(L3VCmhMeX0KUQeJto)");
    }

    #[test]
    fn test_snowflake_sql_roundtrip_keeps_large_ids() {
        let guild = GuildId(812_345_678_901_234_567);
        assert_eq!(GuildId::from_sql(guild.to_sql()), guild);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&ChannelId(42)).unwrap();
        assert_eq!(json, "42");

        let json = serde_json::to_string(&DatasetId::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
