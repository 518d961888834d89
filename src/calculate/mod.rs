//! Series transformation.
//!
//! Turns an unordered batch of daily snapshots into:
//! - absolute counts per day ([`compute_counts`])
//! - day-over-day deltas, including per-region deltas ([`compute_diffs`])
//!
//! Providers do not guarantee chronological order, so both views first sort
//! snapshots ascending by infected count (cumulative, so a proxy for time).

pub mod dates;

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::models::{CountResult, DiffResult, RegionCount, RegionDiff, SnapshotRecord};
use crate::resolve::{FieldTable, MetricKind};

pub use dates::{local_offset, parse_timestamp, parse_timestamp_in, DateParseError};

/// Errors that can occur while transforming a series.
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Need at least 2 snapshots to compute differences, got {count}")]
    InsufficientSnapshots { count: usize },

    #[error("Snapshot {index} has no timestamp")]
    MissingDate { index: usize },

    #[error(transparent)]
    Date(#[from] DateParseError),
}

/// Sort ascending by resolved infected count. Absent counts sort first; ties
/// keep their input order.
fn sort_snapshots<'a>(
    snapshots: &'a [SnapshotRecord],
    table: &FieldTable,
) -> Vec<&'a SnapshotRecord> {
    let mut sorted: Vec<&SnapshotRecord> = snapshots.iter().collect();
    sorted.sort_by_key(|s| table.resolve_i64(s.fields(), MetricKind::Infected));
    sorted
}

fn snapshot_date(
    snapshot: &SnapshotRecord,
    index: usize,
    table: &FieldTable,
) -> Result<chrono::DateTime<chrono::FixedOffset>, SeriesError> {
    let raw = table
        .resolve_str(snapshot.fields(), MetricKind::UpdatedAt)
        .ok_or(SeriesError::MissingDate { index })?;
    Ok(dates::parse_timestamp(raw)?)
}

fn region_name(region: &Map<String, Value>, table: &FieldTable) -> Option<String> {
    table
        .resolve_str(region, MetricKind::RegionName)
        .map(str::to_string)
}

/// Absolute counts, one per snapshot, in sorted order.
pub fn compute_counts(
    snapshots: &[SnapshotRecord],
    table: &FieldTable,
) -> Result<Vec<CountResult>, SeriesError> {
    sort_snapshots(snapshots, table)
        .into_iter()
        .enumerate()
        .map(|(index, snapshot)| -> Result<CountResult, SeriesError> {
            let fields = snapshot.fields();
            let regions = table
                .resolve_regions(fields)
                .into_iter()
                .map(|region| RegionCount {
                    name: region_name(region, table).unwrap_or_default(),
                    infected: table.resolve_i64(region, MetricKind::Infected),
                    deaths: table.resolve_i64(region, MetricKind::Deaths),
                })
                .collect();

            Ok(CountResult {
                date: snapshot_date(snapshot, index, table)?,
                infected: table.resolve_i64(fields, MetricKind::Infected),
                deaths: table.resolve_i64(fields, MetricKind::Deaths),
                recovered: table.resolve_i64(fields, MetricKind::Recovered),
                tested: table.resolve_i64(fields, MetricKind::Tested),
                regions,
            })
        })
        .collect()
}

/// `current - previous`, saturating at the `i64` bounds.
///
/// Provider counts are not validated, so an overflowing pair is clamped and
/// logged instead of wrapping.
pub fn count_delta(current: i64, previous: i64) -> i64 {
    current.checked_sub(previous).unwrap_or_else(|| {
        warn!(current, previous, "Count delta overflows i64; saturating");
        current.saturating_sub(previous)
    })
}

/// Day-over-day deltas: `len(snapshots) - 1` entries, earliest first.
pub fn compute_diffs(
    snapshots: &[SnapshotRecord],
    table: &FieldTable,
) -> Result<Vec<DiffResult>, SeriesError> {
    if snapshots.len() < 2 {
        return Err(SeriesError::InsufficientSnapshots {
            count: snapshots.len(),
        });
    }

    let sorted = sort_snapshots(snapshots, table);
    let mut diffs = Vec::with_capacity(sorted.len() - 1);

    for (index, pair) in sorted.windows(2).enumerate() {
        let (prev, curr) = (pair[0].fields(), pair[1].fields());
        let delta = |kind: MetricKind| {
            count_delta(
                table.resolve_i64(curr, kind).unwrap_or(0),
                table.resolve_i64(prev, kind).unwrap_or(0),
            )
        };

        diffs.push(DiffResult {
            date: snapshot_date(pair[1], index + 1, table)?,
            infected: delta(MetricKind::Infected),
            deaths: delta(MetricKind::Deaths),
            recovered: delta(MetricKind::Recovered),
            tested: delta(MetricKind::Tested),
            regions: region_diffs(curr, prev, table),
        });
    }

    Ok(diffs)
}

/// Per-region deltas, joined by region name.
///
/// Unnamed regions fall back to matching by position. A region missing on
/// the previous day counts as zero.
fn region_diffs(
    current: &Map<String, Value>,
    previous: &Map<String, Value>,
    table: &FieldTable,
) -> Vec<RegionDiff> {
    let prev_regions = table.resolve_regions(previous);
    let prev_by_name: HashMap<&str, &Map<String, Value>> = prev_regions
        .iter()
        .filter_map(|r| table.resolve_str(r, MetricKind::RegionName).map(|n| (n, *r)))
        .collect();

    let curr_regions = table.resolve_regions(current);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut diffs = Vec::with_capacity(curr_regions.len());

    for (index, region) in curr_regions.iter().enumerate() {
        let name = table.resolve_str(region, MetricKind::RegionName);
        let prev = match name {
            Some(name) => {
                seen.insert(name);
                prev_by_name.get(name).copied()
            }
            None => prev_regions.get(index).copied(),
        };

        if prev.is_none() && !prev_regions.is_empty() {
            warn!(
                "Region {:?} (index {}) has no counterpart in the previous snapshot",
                name.unwrap_or(""),
                index
            );
        }

        let delta = |kind: MetricKind| {
            count_delta(
                table.resolve_i64(region, kind).unwrap_or(0),
                prev.and_then(|p| table.resolve_i64(p, kind)).unwrap_or(0),
            )
        };

        diffs.push(RegionDiff {
            name: name.unwrap_or_default().to_string(),
            infected: delta(MetricKind::Infected),
            deaths: delta(MetricKind::Deaths),
        });
    }

    let dropped: Vec<&str> = prev_by_name
        .keys()
        .copied()
        .filter(|name| !seen.contains(name))
        .collect();
    if !dropped.is_empty() {
        warn!("Regions missing from the newer snapshot: {:?}", dropped);
    }

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot(value: Value) -> SnapshotRecord {
        serde_json::from_value(value).unwrap()
    }

    fn day(day: u32, infected: i64, deceased: i64) -> SnapshotRecord {
        snapshot(json!({
            "infected": infected,
            "deceased": deceased,
            "lastUpdatedAtApify": format!("2021-05-{:02}T10:00:00Z", day),
        }))
    }

    fn unsorted_series() -> Vec<SnapshotRecord> {
        vec![day(1, 100, 1), day(3, 150, 4), day(2, 130, 2)]
    }

    #[test]
    fn test_counts_sorted_by_infected() {
        let table = FieldTable::default();
        let counts = compute_counts(&unsorted_series(), &table).unwrap();

        let infected: Vec<_> = counts.iter().map(|c| c.infected).collect();
        assert_eq!(infected, vec![Some(100), Some(130), Some(150)]);
        assert_eq!(
            counts[0].date,
            Utc.with_ymd_and_hms(2021, 5, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_counts_same_length_as_input() {
        let table = FieldTable::default();
        assert_eq!(compute_counts(&[], &table).unwrap().len(), 0);
        assert_eq!(compute_counts(&[day(1, 5, 0)], &table).unwrap().len(), 1);
    }

    #[test]
    fn test_diffs_end_to_end() {
        let table = FieldTable::default();
        let diffs = compute_diffs(&unsorted_series(), &table).unwrap();

        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].infected, 30);
        assert_eq!(diffs[1].infected, 20);
        assert_eq!(diffs[0].deaths, 1);
        assert_eq!(diffs[1].deaths, 2);
        assert_eq!(
            diffs[0].date,
            Utc.with_ymd_and_hms(2021, 5, 2, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_diffs_match_consecutive_counts() {
        let table = FieldTable::default();
        let series = vec![day(4, 900, 9), day(1, 100, 1), day(3, 450, 3), day(2, 230, 2)];
        let counts = compute_counts(&series, &table).unwrap();
        let diffs = compute_diffs(&series, &table).unwrap();

        assert_eq!(diffs.len(), series.len() - 1);
        for (i, diff) in diffs.iter().enumerate() {
            let expected = counts[i + 1].infected.unwrap() - counts[i].infected.unwrap();
            assert_eq!(diff.infected, expected);
        }
    }

    #[test]
    fn test_diffs_need_two_snapshots() {
        let table = FieldTable::default();

        let err = compute_diffs(&[], &table).unwrap_err();
        assert!(matches!(err, SeriesError::InsufficientSnapshots { count: 0 }));

        let err = compute_diffs(&[day(1, 1, 0)], &table).unwrap_err();
        assert!(matches!(err, SeriesError::InsufficientSnapshots { count: 1 }));
    }

    #[test]
    fn test_absent_metrics_asymmetry() {
        // Counts keep absence, diffs treat it as zero.
        let table = FieldTable::default();
        let series = vec![
            snapshot(json!({"infected": 10, "lastUpdatedAtApify": "2021-05-01T00:00:00Z"})),
            snapshot(json!({
                "infected": 15,
                "deceased": 2,
                "lastUpdatedAtApify": "2021-05-02T00:00:00Z"
            })),
        ];

        let counts = compute_counts(&series, &table).unwrap();
        assert_eq!(counts[0].deaths, None);
        assert_eq!(counts[0].recovered, None);

        let diffs = compute_diffs(&series, &table).unwrap();
        assert_eq!(diffs[0].deaths, 2);
        assert_eq!(diffs[0].recovered, 0);
    }

    #[test]
    fn test_missing_or_bad_date() {
        let table = FieldTable::default();

        let err = compute_counts(&[snapshot(json!({"infected": 1}))], &table).unwrap_err();
        assert!(matches!(err, SeriesError::MissingDate { index: 0 }));

        let bad = snapshot(json!({"infected": 1, "lastUpdatedAtApify": "yesterday"}));
        let err = compute_counts(&[bad], &table).unwrap_err();
        assert!(matches!(err, SeriesError::Date(_)));
    }

    #[test]
    fn test_counts_resolve_regions() {
        let table = FieldTable::default();
        let series = vec![snapshot(json!({
            "infected": 25,
            "lastUpdatedAtApify": "2021-05-01T00:00:00Z",
            "infectedByRegion": [
                {"region": "X", "infectedCount": 10, "deceasedCount": 1},
                {"region": "Y", "infectedCount": 15}
            ]
        }))];

        let counts = compute_counts(&series, &table).unwrap();
        assert_eq!(
            counts[0].regions,
            vec![
                RegionCount { name: "X".into(), infected: Some(10), deaths: Some(1) },
                RegionCount { name: "Y".into(), infected: Some(15), deaths: None },
            ]
        );
    }

    #[test]
    fn test_region_diff() {
        let table = FieldTable::default();
        let series = vec![
            snapshot(json!({
                "infected": 10,
                "lastUpdatedAtApify": "2021-05-01T00:00:00Z",
                "infectedByRegion": [{"region": "X", "infectedCount": 10}]
            })),
            snapshot(json!({
                "infected": 15,
                "lastUpdatedAtApify": "2021-05-02T00:00:00Z",
                "infectedByRegion": [{"region": "X", "infectedCount": 15}]
            })),
        ];

        let diffs = compute_diffs(&series, &table).unwrap();
        assert_eq!(
            diffs[0].regions,
            vec![RegionDiff { name: "X".into(), infected: 5, deaths: 0 }]
        );
    }

    #[test]
    fn test_region_diff_joins_by_name_when_reordered() {
        let table = FieldTable::default();
        let series = vec![
            snapshot(json!({
                "infected": 30,
                "lastUpdatedAtApify": "2021-05-01T00:00:00Z",
                "infectedByRegion": [
                    {"region": "A", "infectedCount": 10},
                    {"region": "B", "infectedCount": 20}
                ]
            })),
            snapshot(json!({
                "infected": 40,
                "lastUpdatedAtApify": "2021-05-02T00:00:00Z",
                "infectedByRegion": [
                    {"region": "B", "infectedCount": 22},
                    {"region": "A", "infectedCount": 18},
                    {"region": "C", "infectedCount": 3}
                ]
            })),
        ];

        let diff = &compute_diffs(&series, &table).unwrap()[0];
        assert_eq!(diff.regions.len(), 3);
        assert_eq!(diff.regions[0].name, "B");
        assert_eq!(diff.region("A").unwrap().infected, 8);
        assert_eq!(diff.region("B").unwrap().infected, 2);
        // New region: previous day counts as zero
        assert_eq!(diff.region("C").unwrap().infected, 3);
    }

    #[test]
    fn test_region_diff_shorter_previous_list_does_not_fault() {
        let table = FieldTable::default();
        let series = vec![
            snapshot(json!({
                "infected": 1,
                "lastUpdatedAtApify": "2021-05-01T00:00:00Z"
            })),
            snapshot(json!({
                "infected": 2,
                "lastUpdatedAtApify": "2021-05-02T00:00:00Z",
                "infectedByRegion": [{"infectedCount": 4}, {"infectedCount": 6}]
            })),
        ];

        let diff = &compute_diffs(&series, &table).unwrap()[0];
        let infected: Vec<_> = diff.regions.iter().map(|r| r.infected).collect();
        assert_eq!(infected, vec![4, 6]);
    }

    #[test]
    fn test_unnamed_regions_match_by_position() {
        let table = FieldTable::default();
        let series = vec![
            snapshot(json!({
                "infected": 1,
                "lastUpdatedAtApify": "2021-05-01T00:00:00Z",
                "regions": [{"totalCases": 5}]
            })),
            snapshot(json!({
                "infected": 2,
                "lastUpdatedAtApify": "2021-05-02T00:00:00Z",
                "regions": [{"totalCases": 9}]
            })),
        ];

        let diff = &compute_diffs(&series, &table).unwrap()[0];
        assert_eq!(diff.regions[0].infected, 4);
        assert_eq!(diff.regions[0].name, "");
    }

    fn region_day(day: u32, infected: i64, regions: Value) -> SnapshotRecord {
        snapshot(json!({
            "infected": infected,
            "lastUpdatedAtApify": format!("2021-05-{:02}T00:00:00Z", day),
            "infectedByRegion": regions,
        }))
    }

    #[test]
    fn test_count_delta_saturates() {
        assert_eq!(count_delta(15, 10), 5);
        assert_eq!(count_delta(i64::MAX, -1), i64::MAX);
        assert_eq!(count_delta(i64::MIN, 1), i64::MIN);
    }

    #[test]
    fn test_region_diff_extreme_values_saturate() {
        let table = FieldTable::default();
        let series = vec![
            region_day(1, 1, json!([{"region": "X", "infectedCount": -1, "deceasedCount": 1}])),
            region_day(
                2,
                2,
                json!([{"region": "X", "infectedCount": i64::MAX, "deceasedCount": i64::MIN}]),
            ),
        ];

        let diff = &compute_diffs(&series, &table).unwrap()[0];
        assert_eq!(
            diff.regions,
            vec![RegionDiff { name: "X".into(), infected: i64::MAX, deaths: i64::MIN }]
        );
    }

    #[test]
    fn test_region_only_on_older_day_is_dropped() {
        let table = FieldTable::default();
        let series = vec![
            region_day(
                1,
                10,
                json!([
                    {"region": "A", "infectedCount": 4},
                    {"region": "Gone", "infectedCount": 6}
                ]),
            ),
            region_day(2, 12, json!([{"region": "A", "infectedCount": 7}])),
        ];

        let diff = &compute_diffs(&series, &table).unwrap()[0];
        assert_eq!(
            diff.regions,
            vec![RegionDiff { name: "A".into(), infected: 3, deaths: 0 }]
        );
        assert!(diff.region("Gone").is_none());
    }

    #[test]
    fn test_duplicate_region_names_share_previous_entry() {
        let table = FieldTable::default();
        let series = vec![
            region_day(1, 10, json!([{"region": "A", "infectedCount": 4}])),
            region_day(
                2,
                12,
                json!([
                    {"region": "A", "infectedCount": 7},
                    {"region": "A", "infectedCount": 9}
                ]),
            ),
        ];

        let diff = &compute_diffs(&series, &table).unwrap()[0];
        let infected: Vec<_> = diff.regions.iter().map(|r| r.infected).collect();
        assert_eq!(infected, vec![3, 5]);
    }
}
