//! Dataset directory models.

use serde::{Deserialize, Serialize};

use super::DatasetId;

/// One row of the dataset directory as served by the directory endpoint.
///
/// The endpoint returns more fields (latest totals, source URLs); only the
/// ones needed to locate a dataset are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub country: String,

    /// Items URL of the country's history dataset
    #[serde(rename = "historyData", default)]
    pub history_data: Option<String>,
}

/// A resolved country together with its dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Country name as spelled by the directory
    pub country_name: String,
    pub dataset_id: DatasetId,
}
