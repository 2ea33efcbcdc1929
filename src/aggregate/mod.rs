use crate::submission::RunTable;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Source timings have millisecond resolution; a reported zero is clamped to
/// this before it is turned into a rate.
pub const MIN_MEASURABLE_SECONDS: f64 = 0.001;

/// Identifies one measured (platform, environment, algorithm, dataset) item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub platform: String,
    pub environment: String,
    pub algorithm: String,
    pub dataset: String,
}

/// Successful runs of one item averaged together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemMean {
    pub mean_load_time: f64,
    pub mean_makespan: f64,
    pub mean_processing_time: f64,
    pub run_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputPerDollar {
    pub makespan: f64,
    pub processing: f64,
}

impl ThroughputPerDollar {
    pub const ZERO: ThroughputPerDollar = ThroughputPerDollar {
        makespan: 0.0,
        processing: 0.0,
    };

    pub fn from_times(makespan: f64, processing_time: f64, pricing: f64) -> Self {
        Self {
            makespan: throughput_per_dollar(makespan, pricing),
            processing: throughput_per_dollar(processing_time, pricing),
        }
    }
}

/// One row of an aggregated table. `algorithm` and `dataset` are set down to
/// the granularity of the row: both for a workload item, only `algorithm`
/// for an algorithm rollup, neither for a platform rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub size_class: String,
    pub platform: String,
    pub environment: String,
    pub pricing: Option<f64>,
    pub algorithm: Option<String>,
    pub dataset: Option<String>,
    pub mean_makespan: f64,
    pub mean_processing_time: f64,
    /// `None` when the platform has no known price
    pub throughput: Option<ThroughputPerDollar>,
    /// Successful runs of the item, or the minimum over contributing items
    pub run_count: u32,
    /// Number of workload items below this row that were penalty-imputed
    pub imputed_items: u32,
}

/// Work per dollar: the inverse of time × price.
pub fn throughput_per_dollar(seconds: f64, pricing: f64) -> f64 {
    1.0 / (seconds.max(MIN_MEASURABLE_SECONDS) * pricing)
}

/// `1 / mean(1/x)`. Any zero rate makes the whole aggregate zero.
pub fn harmonic_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    if values.iter().any(|&v| v <= 0.0) {
        return Some(0.0);
    }
    let reciprocal_sum: f64 = values.iter().map(|v| 1.0 / v).sum();
    Some(values.len() as f64 / reciprocal_sum)
}

pub fn arithmetic_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Averages the successful runs of every measured item. Failed runs are
/// skipped and do not count towards `run_count`.
pub fn item_means(table: &RunTable) -> FxHashMap<ItemKey, ItemMean> {
    #[derive(Default)]
    struct Sums {
        load_time: f64,
        makespan: f64,
        processing_time: f64,
        count: u32,
    }

    let mut sums: FxHashMap<ItemKey, Sums> = FxHashMap::default();
    for (run, measurement) in table.successful() {
        let key = ItemKey {
            platform: run.platform.clone(),
            environment: run.environment.clone(),
            algorithm: run.algorithm.clone(),
            dataset: run.dataset.clone(),
        };
        let entry = sums.entry(key).or_default();
        entry.load_time += measurement.load_time;
        entry.makespan += measurement.makespan;
        entry.processing_time += measurement.processing_time;
        entry.count += 1;
    }

    sums.into_iter()
        .map(|(key, s)| {
            let n = s.count as f64;
            (
                key,
                ItemMean {
                    mean_load_time: s.load_time / n,
                    mean_makespan: s.makespan / n,
                    mean_processing_time: s.processing_time / n,
                    run_count: s.count,
                },
            )
        })
        .collect()
}

/// Combines rows sharing a group key: arithmetic mean of times, harmonic mean
/// of throughput per dollar, minimum run count.
fn rollup<F>(rows: &[MetricRow], keep_algorithm: bool, group_key: F) -> Vec<MetricRow>
where
    F: Fn(&MetricRow) -> (String, String, String, Option<String>),
{
    let mut groups: BTreeMap<(String, String, String, Option<String>), Vec<&MetricRow>> =
        BTreeMap::new();
    for row in rows {
        groups.entry(group_key(row)).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|((size_class, platform, environment, algorithm), group)| {
            let makespans: Vec<f64> = group.iter().map(|r| r.mean_makespan).collect();
            let processing_times: Vec<f64> = group.iter().map(|r| r.mean_processing_time).collect();

            let throughputs: Option<Vec<ThroughputPerDollar>> =
                group.iter().map(|r| r.throughput).collect();
            let throughput = throughputs.and_then(|t| {
                let makespan: Vec<f64> = t.iter().map(|x| x.makespan).collect();
                let processing: Vec<f64> = t.iter().map(|x| x.processing).collect();
                Some(ThroughputPerDollar {
                    makespan: harmonic_mean(&makespan)?,
                    processing: harmonic_mean(&processing)?,
                })
            });

            MetricRow {
                size_class,
                platform,
                environment,
                pricing: group[0].pricing,
                algorithm: if keep_algorithm { algorithm } else { None },
                dataset: None,
                mean_makespan: arithmetic_mean(&makespans).unwrap_or_default(),
                mean_processing_time: arithmetic_mean(&processing_times).unwrap_or_default(),
                throughput,
                run_count: group.iter().map(|r| r.run_count).min().unwrap_or_default(),
                imputed_items: group.iter().map(|r| r.imputed_items).sum(),
            }
        })
        .collect()
}

/// Workload items -> one row per algorithm within a platform and size class.
pub fn rollup_algorithms(items: &[MetricRow]) -> Vec<MetricRow> {
    rollup(items, true, |r| {
        (
            r.size_class.clone(),
            r.platform.clone(),
            r.environment.clone(),
            r.algorithm.clone(),
        )
    })
}

/// Algorithm rows -> one row per platform and size class.
pub fn rollup_platforms(algorithms: &[MetricRow]) -> Vec<MetricRow> {
    rollup(algorithms, false, |r| {
        (
            r.size_class.clone(),
            r.platform.clone(),
            r.environment.clone(),
            None,
        )
    })
}
