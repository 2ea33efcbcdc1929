//! Static reference tables: datasets, algorithms, timeouts, size ordering and
//! optional platform prices. Every table is keyed; a duplicate key or a missing
//! column fails the whole load.

use crate::error::{LeaderboardError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const DATASETS_FILE: &str = "datasets.csv";
pub const ALGORITHMS_FILE: &str = "algorithms.csv";
pub const TIMEOUTS_FILE: &str = "timeouts.csv";
pub const SIZE_ORDERING_FILE: &str = "size_ordering.csv";
pub const PLATFORMS_FILE: &str = "platforms.csv";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub name: String,
    #[serde(rename = "size")]
    pub size_class: String,
    pub weighted: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AlgorithmInfo {
    pub name: String,
    pub requires_weights: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct TimeoutRow {
    size: String,
    timeout_minutes: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct SizeRankRow {
    name: String,
    rank: i64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct PlatformRow {
    name: String,
    pricing: f64,
}

/// Parses a header-first CSV table, checking the required columns up front so
/// the error names the column instead of the first row that lacks it.
fn read_table<T, R>(reader: R, path: &Path, columns: &[&str]) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let csv_error = |source: csv::Error| LeaderboardError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers().map_err(csv_error)?.clone();
    for column in columns {
        if !headers.iter().any(|h| h == *column) {
            return Err(LeaderboardError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for row in reader.deserialize::<T>() {
        rows.push(row.map_err(csv_error)?);
    }
    Ok(rows)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| LeaderboardError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds a map from rows, rejecting any key seen twice.
fn index_unique<T, F>(table: &str, rows: Vec<T>, key: F) -> Result<BTreeMap<String, T>>
where
    F: Fn(&T) -> &str,
{
    let mut index = BTreeMap::new();
    for row in rows {
        let k = key(&row).to_string();
        if index.contains_key(&k) {
            return Err(LeaderboardError::DuplicateKey {
                table: table.to_string(),
                key: k,
            });
        }
        index.insert(k, row);
    }
    Ok(index)
}

/// Total order over size classes, independent of their spelling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizeOrdering {
    ranks: BTreeMap<String, i64>,
}

impl SizeOrdering {
    pub fn rank(&self, size_class: &str) -> Option<i64> {
        self.ranks.get(size_class).copied()
    }

    /// Size classes in rank order.
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<(&String, &i64)> = self.ranks.iter().collect();
        classes.sort_by_key(|(_, rank)| **rank);
        classes.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

impl FromIterator<(String, i64)> for SizeOrdering {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self {
            ranks: iter.into_iter().collect(),
        }
    }
}

/// All reference data, validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTables {
    pub datasets: BTreeMap<String, DatasetInfo>,
    pub algorithms: BTreeMap<String, AlgorithmInfo>,
    /// Size class -> timeout in minutes
    pub timeouts: BTreeMap<String, f64>,
    pub size_ordering: SizeOrdering,
    /// Platform name -> price, used when a submission carries none
    pub platform_pricing: BTreeMap<String, f64>,
}

impl ReferenceTables {
    /// Loads the tables from `dir` using the conventional file names.
    /// `platforms.csv` is optional.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let datasets = load_datasets(&dir.join(DATASETS_FILE))?;
        let algorithms = load_algorithms(&dir.join(ALGORITHMS_FILE))?;
        let timeouts = load_timeouts(&dir.join(TIMEOUTS_FILE))?;
        let size_ordering = load_size_ordering(&dir.join(SIZE_ORDERING_FILE))?;

        let platforms_path = dir.join(PLATFORMS_FILE);
        let platform_pricing = if platforms_path.is_file() {
            load_platform_pricing(&platforms_path)?
        } else {
            BTreeMap::new()
        };

        log::info!(
            "Loaded {} datasets, {} algorithms, {} timeouts, {} size classes, {} platform prices",
            datasets.len(),
            algorithms.len(),
            timeouts.len(),
            size_ordering.ranks.len(),
            platform_pricing.len()
        );

        Ok(Self {
            datasets,
            algorithms,
            timeouts,
            size_ordering,
            platform_pricing,
        })
    }

    /// Timeout of a size class in seconds.
    pub fn timeout_seconds(&self, size_class: &str) -> Option<f64> {
        self.timeouts.get(size_class).map(|minutes| minutes * 60.0)
    }

    /// Size class -> timeout in seconds.
    pub fn timeouts_in_seconds(&self) -> BTreeMap<String, f64> {
        self.timeouts
            .iter()
            .map(|(size, minutes)| (size.clone(), minutes * 60.0))
            .collect()
    }
}

pub fn load_datasets(path: &Path) -> Result<BTreeMap<String, DatasetInfo>> {
    parse_datasets(open(path)?, path)
}

pub fn parse_datasets<R: Read>(reader: R, path: &Path) -> Result<BTreeMap<String, DatasetInfo>> {
    let rows: Vec<DatasetInfo> = read_table(reader, path, &["name", "size", "weighted"])?;
    index_unique("datasets", rows, |d| d.name.as_str())
}

pub fn load_algorithms(path: &Path) -> Result<BTreeMap<String, AlgorithmInfo>> {
    parse_algorithms(open(path)?, path)
}

pub fn parse_algorithms<R: Read>(
    reader: R,
    path: &Path,
) -> Result<BTreeMap<String, AlgorithmInfo>> {
    let rows: Vec<AlgorithmInfo> = read_table(reader, path, &["name", "requires_weights"])?;
    index_unique("algorithms", rows, |a| a.name.as_str())
}

pub fn load_timeouts(path: &Path) -> Result<BTreeMap<String, f64>> {
    parse_timeouts(open(path)?, path)
}

pub fn parse_timeouts<R: Read>(reader: R, path: &Path) -> Result<BTreeMap<String, f64>> {
    let rows: Vec<TimeoutRow> = read_table(reader, path, &["size", "timeout_minutes"])?;
    let index = index_unique("timeouts", rows, |t| t.size.as_str())?;

    let mut timeouts = BTreeMap::new();
    for (size, row) in index {
        if !(row.timeout_minutes.is_finite() && row.timeout_minutes > 0.0) {
            return Err(LeaderboardError::InvalidReference {
                table: "timeouts".to_string(),
                reason: format!(
                    "timeout for '{}' must be positive, got {}",
                    size, row.timeout_minutes
                ),
            });
        }
        timeouts.insert(size, row.timeout_minutes);
    }
    Ok(timeouts)
}

pub fn load_size_ordering(path: &Path) -> Result<SizeOrdering> {
    parse_size_ordering(open(path)?, path)
}

pub fn parse_size_ordering<R: Read>(reader: R, path: &Path) -> Result<SizeOrdering> {
    let rows: Vec<SizeRankRow> = read_table(reader, path, &["name", "rank"])?;
    let index = index_unique("size_ordering", rows, |s| s.name.as_str())?;

    let mut seen: BTreeMap<i64, String> = BTreeMap::new();
    for (name, row) in &index {
        if let Some(other) = seen.insert(row.rank, name.clone()) {
            return Err(LeaderboardError::InvalidReference {
                table: "size_ordering".to_string(),
                reason: format!("'{}' and '{}' share rank {}", other, name, row.rank),
            });
        }
    }

    Ok(index.into_iter().map(|(name, row)| (name, row.rank)).collect())
}

pub fn load_platform_pricing(path: &Path) -> Result<BTreeMap<String, f64>> {
    parse_platform_pricing(open(path)?, path)
}

pub fn parse_platform_pricing<R: Read>(reader: R, path: &Path) -> Result<BTreeMap<String, f64>> {
    let rows: Vec<PlatformRow> = read_table(reader, path, &["name", "pricing"])?;
    let index = index_unique("platforms", rows, |p| p.name.as_str())?;
    Ok(index.into_iter().map(|(name, row)| (name, row.pricing)).collect())
}
