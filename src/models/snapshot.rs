//! Daily case snapshots and the count/diff views derived from them.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One raw daily record as returned by a dataset's items endpoint.
///
/// Providers name the same metric differently, so the record is kept as an
/// untyped JSON object and read through [`crate::resolve::FieldTable`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotRecord(Map<String, Value>);

impl SnapshotRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for SnapshotRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Region breakdown inside a [`CountResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCount {
    pub name: String,
    pub infected: Option<i64>,
    pub deaths: Option<i64>,
}

/// Absolute counts for one snapshot.
///
/// Missing metrics stay `None`; only diffs treat them as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResult {
    pub date: DateTime<FixedOffset>,
    pub infected: Option<i64>,
    pub deaths: Option<i64>,
    pub recovered: Option<i64>,
    pub tested: Option<i64>,
    pub regions: Vec<RegionCount>,
}

/// Per-region delta between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDiff {
    pub name: String,
    pub infected: i64,
    pub deaths: i64,
}

/// Day-over-day delta (current minus previous), dated with the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub date: DateTime<FixedOffset>,
    pub infected: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub tested: i64,
    pub regions: Vec<RegionDiff>,
}

impl DiffResult {
    /// Find a region delta by name.
    pub fn region(&self, name: &str) -> Option<&RegionDiff> {
        self.regions.iter().find(|r| r.name == name)
    }
}
