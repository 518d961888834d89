//! Canonical metric lookup over heterogeneous provider records.
//!
//! Each data provider names the same concept differently (`infected`,
//! `infectedCount`, `totalCases`, ...). A [`FieldTable`] maps every
//! [`MetricKind`] to an ordered list of candidate keys; the first key present
//! in a record wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical metrics a record can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    RegionList,
    RegionName,
    Infected,
    Deaths,
    Recovered,
    Tested,
    UpdatedAt,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::RegionList,
        MetricKind::RegionName,
        MetricKind::Infected,
        MetricKind::Deaths,
        MetricKind::Recovered,
        MetricKind::Tested,
        MetricKind::UpdatedAt,
    ];

    fn default_candidates(self) -> &'static [&'static str] {
        match self {
            MetricKind::RegionList => &["infectedByRegion", "regions", "regionData"],
            MetricKind::RegionName => &["region", "name", "regionName"],
            MetricKind::Infected => &["infected", "infectedCount", "casesReported", "totalCases"],
            MetricKind::Deaths => &["deceased", "deceasedCount", "deaths", "totalDeaths"],
            MetricKind::Recovered => &["recovered", "recoveredCount", "totalRecovered"],
            MetricKind::Tested => &["tested", "testedCount", "totalTested"],
            MetricKind::UpdatedAt => &["lastUpdatedAtApify", "lastUpdatedAtSource", "date"],
        }
    }
}

/// Ordered candidate keys per metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTable {
    candidates: HashMap<MetricKind, Vec<String>>,
}

impl Default for FieldTable {
    fn default() -> Self {
        let candidates = MetricKind::ALL
            .iter()
            .map(|&kind| {
                let keys = kind
                    .default_candidates()
                    .iter()
                    .map(|k| k.to_string())
                    .collect();
                (kind, keys)
            })
            .collect();
        Self { candidates }
    }
}

impl FieldTable {
    /// A table with no candidates at all; every lookup is absent.
    pub fn empty() -> Self {
        Self {
            candidates: HashMap::new(),
        }
    }

    /// Replace the candidate list for one metric.
    pub fn with_candidates<I, S>(mut self, kind: MetricKind, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates
            .insert(kind, keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn candidates(&self, kind: MetricKind) -> &[String] {
        self.candidates
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Value of the first candidate key present in `record`.
    ///
    /// A key holding JSON `null` is still "present".
    pub fn resolve<'a>(
        &self,
        record: &'a serde_json::Map<String, Value>,
        kind: MetricKind,
    ) -> Option<&'a Value> {
        self.candidates(kind)
            .iter()
            .find_map(|key| record.get(key.as_str()))
    }

    /// Resolve a metric as an integer count.
    pub fn resolve_i64(
        &self,
        record: &serde_json::Map<String, Value>,
        kind: MetricKind,
    ) -> Option<i64> {
        self.resolve(record, kind).and_then(as_count)
    }

    pub fn resolve_str<'a>(
        &self,
        record: &'a serde_json::Map<String, Value>,
        kind: MetricKind,
    ) -> Option<&'a str> {
        self.resolve(record, kind).and_then(Value::as_str)
    }

    /// Resolve the region list, keeping only object entries.
    pub fn resolve_regions<'a>(
        &self,
        record: &'a serde_json::Map<String, Value>,
    ) -> Vec<&'a serde_json::Map<String, Value>> {
        self.resolve(record, MetricKind::RegionList)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default()
    }
}

/// Integer view of a JSON value. Whole floats count; anything else is absent.
fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_default_infected_precedence() {
        let table = FieldTable::default();
        assert_eq!(
            table.candidates(MetricKind::Infected),
            ["infected", "infectedCount", "casesReported", "totalCases"]
        );

        // "infected" is declared before "infectedCount"
        let r = record(json!({"infectedCount": 5, "infected": 7}));
        assert_eq!(table.resolve_i64(&r, MetricKind::Infected), Some(7));
    }

    #[test]
    fn test_falls_through_to_later_candidates() {
        let table = FieldTable::default();
        let r = record(json!({"casesReported": 3, "totalCases": 9}));
        assert_eq!(table.resolve_i64(&r, MetricKind::Infected), Some(3));

        let r = record(json!({"totalCases": 9}));
        assert_eq!(table.resolve_i64(&r, MetricKind::Infected), Some(9));
    }

    #[test]
    fn test_absent_when_no_candidate_matches() {
        let table = FieldTable::default();
        let r = record(json!({"cases": 3}));
        assert_eq!(table.resolve(&r, MetricKind::Infected), None);
        assert_eq!(table.resolve(&r, MetricKind::Tested), None);
    }

    #[test]
    fn test_preserves_source_type() {
        let table = FieldTable::default();
        let r = record(json!({"region": "Praha", "infectedByRegion": [{"region": "X"}]}));

        assert_eq!(
            table.resolve(&r, MetricKind::RegionName),
            Some(&json!("Praha"))
        );
        assert!(table
            .resolve(&r, MetricKind::RegionList)
            .unwrap()
            .is_array());
    }

    #[test]
    fn test_null_counts_as_present_but_not_numeric() {
        let table = FieldTable::default();
        let r = record(json!({"infected": null, "infectedCount": 5}));

        assert_eq!(table.resolve(&r, MetricKind::Infected), Some(&Value::Null));
        assert_eq!(table.resolve_i64(&r, MetricKind::Infected), None);
    }

    #[test]
    fn test_whole_floats_are_counts() {
        let table = FieldTable::default();
        assert_eq!(
            table.resolve_i64(&record(json!({"deceased": 12.0})), MetricKind::Deaths),
            Some(12)
        );
        assert_eq!(
            table.resolve_i64(&record(json!({"deceased": 12.5})), MetricKind::Deaths),
            None
        );
        assert_eq!(
            table.resolve_i64(&record(json!({"deceased": "12"})), MetricKind::Deaths),
            None
        );
    }

    #[test]
    fn test_custom_table() {
        let table = FieldTable::empty().with_candidates(MetricKind::Infected, ["b", "a"]);
        let r = record(json!({"a": 1, "b": 2}));

        assert_eq!(table.resolve_i64(&r, MetricKind::Infected), Some(2));
        assert_eq!(table.resolve(&r, MetricKind::Deaths), None);
    }

    #[test]
    fn test_resolve_regions_skips_non_objects() {
        let table = FieldTable::default();
        let r = record(json!({"regions": [{"name": "A"}, 3, {"name": "B"}]}));

        let regions = table.resolve_regions(&r);
        assert_eq!(regions.len(), 2);
        assert_eq!(
            table.resolve_str(regions[1], MetricKind::RegionName),
            Some("B")
        );
    }
}
