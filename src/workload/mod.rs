//! The workload universe and its reconciliation against measured results.
//!
//! The universe is every (dataset, algorithm, platform environment) that
//! should have been benchmarked, whether or not any run exists for it. Items
//! without a successful measurement are charged a penalty instead of being
//! dropped, so skipping hard workloads never improves a platform's score.

use crate::aggregate::{ItemKey, ItemMean, MetricRow, ThroughputPerDollar};
use crate::config::PenaltyPolicy;
use crate::error::{LeaderboardError, Result};
use crate::reference::{AlgorithmInfo, DatasetInfo};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// One experiment that is expected to exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadItem {
    pub size_class: String,
    pub platform: String,
    pub environment: String,
    pub algorithm: String,
    pub dataset: String,
}

impl WorkloadItem {
    pub fn key(&self) -> ItemKey {
        ItemKey {
            platform: self.platform.clone(),
            environment: self.environment.clone(),
            algorithm: self.algorithm.clone(),
            dataset: self.dataset.clone(),
        }
    }
}

/// An algorithm that needs edge weights can only run on a weighted dataset.
pub fn is_weight_compatible(dataset: &DatasetInfo, algorithm: &AlgorithmInfo) -> bool {
    !algorithm.requires_weights || dataset.weighted
}

/// Builds the full set of required experiments: every dataset in an included
/// size class, paired with every compatible algorithm, on every platform
/// environment. Sorted by size class, platform, environment, algorithm and
/// dataset.
pub fn build_universe<'a, D, A, F>(
    datasets: D,
    algorithms: A,
    environments: &[(String, String)],
    include_size: F,
) -> Vec<WorkloadItem>
where
    D: IntoIterator<Item = &'a DatasetInfo>,
    A: IntoIterator<Item = &'a AlgorithmInfo>,
    F: Fn(&str) -> bool,
{
    let algorithms: Vec<&AlgorithmInfo> = algorithms.into_iter().collect();
    let mut universe = BTreeSet::new();

    for dataset in datasets.into_iter().filter(|d| include_size(&d.size_class)) {
        for algorithm in algorithms.iter().filter(|a| is_weight_compatible(dataset, a)) {
            for (platform, environment) in environments {
                universe.insert(WorkloadItem {
                    size_class: dataset.size_class.clone(),
                    platform: platform.clone(),
                    environment: environment.clone(),
                    algorithm: algorithm.name.clone(),
                    dataset: dataset.name.clone(),
                });
            }
        }
    }

    universe.into_iter().collect()
}

/// The stand-in for an item with no successful run: every attempt is charged
/// as having hit the timeout.
pub fn penalty_item(timeout_seconds: f64, policy: &PenaltyPolicy) -> ItemMean {
    let seconds = policy.timeout_multiplier * timeout_seconds;
    ItemMean {
        mean_load_time: seconds,
        mean_makespan: seconds,
        mean_processing_time: seconds,
        run_count: policy.run_count,
    }
}

/// Left-joins the universe against the measured item means. Every workload
/// item yields exactly one row, measured or imputed. Throughput is only set
/// where the environment has a known price.
pub fn reconcile(
    universe: &[WorkloadItem],
    measured: &FxHashMap<ItemKey, ItemMean>,
    timeout_seconds: &BTreeMap<String, f64>,
    pricing: &BTreeMap<(String, String), Option<f64>>,
    policy: &PenaltyPolicy,
) -> Result<Vec<MetricRow>> {
    let mut penalties: BTreeMap<&str, ItemMean> = BTreeMap::new();
    for item in universe {
        if !penalties.contains_key(item.size_class.as_str()) {
            let timeout = timeout_seconds
                .get(&item.size_class)
                .ok_or_else(|| LeaderboardError::MissingTimeout(item.size_class.clone()))?;
            penalties.insert(&item.size_class, penalty_item(*timeout, policy));
        }
    }

    let mut imputed = 0usize;
    let mut rows = Vec::with_capacity(universe.len());
    for item in universe {
        let price = pricing
            .get(&(item.platform.clone(), item.environment.clone()))
            .copied()
            .flatten();

        let (mean, throughput, imputed_items) = match measured.get(&item.key()) {
            Some(mean) => (
                *mean,
                price.map(|p| {
                    ThroughputPerDollar::from_times(
                        mean.mean_makespan,
                        mean.mean_processing_time,
                        p,
                    )
                }),
                0,
            ),
            None => {
                imputed += 1;
                (
                    penalties[item.size_class.as_str()],
                    price.map(|_| ThroughputPerDollar::ZERO),
                    1,
                )
            }
        };

        rows.push(MetricRow {
            size_class: item.size_class.clone(),
            platform: item.platform.clone(),
            environment: item.environment.clone(),
            pricing: price,
            algorithm: Some(item.algorithm.clone()),
            dataset: Some(item.dataset.clone()),
            mean_makespan: mean.mean_makespan,
            mean_processing_time: mean.mean_processing_time,
            throughput,
            run_count: mean.run_count,
            imputed_items,
        });
    }

    log::info!(
        "Reconciled {} workload items ({} imputed with penalties)",
        rows.len(),
        imputed
    );
    Ok(rows)
}

/// Platform environments that cannot be price-adjusted.
pub fn unpriced_environments(
    pricing: &BTreeMap<(String, String), Option<f64>>,
) -> Vec<(String, String)> {
    pricing
        .iter()
        .filter(|(_, price)| price.is_none())
        .map(|(pair, _)| pair.clone())
        .collect()
}
