//! One batch pass: submissions and reference tables in, every report table out.
//!
//! The stages only read what the previous stage produced. Nothing is written
//! until every table has been rendered, so a failing pass leaves the output
//! directory untouched.

use crate::aggregate::{
    item_means, rollup_algorithms, rollup_platforms, ItemKey, ItemMean, MetricRow,
};
use crate::config::PipelineConfig;
use crate::error::{LeaderboardError, Result};
use crate::ranking::{rank, RankedRow};
use crate::reference::{ReferenceTables, SizeOrdering};
use crate::report;
use crate::submission::{load_submissions, RunTable};
use crate::workload::{build_universe, reconcile, unpriced_environments, WorkloadItem};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Every derived table of one pass.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    pub universe: Vec<WorkloadItem>,
    pub measured: FxHashMap<ItemKey, ItemMean>,
    pub items: Vec<MetricRow>,
    pub algorithms: Vec<MetricRow>,
    pub platforms: Vec<MetricRow>,
    pub ranked: Vec<RankedRow>,
    /// Platform environments left out of the price-adjusted tables
    pub unpriced: Vec<(String, String)>,
}

/// Price of every platform environment: the denormalized submission price,
/// else the platform reference table.
fn resolve_pricing(
    runs: &RunTable,
    reference: &ReferenceTables,
    environments: &[(String, String)],
) -> BTreeMap<(String, String), Option<f64>> {
    let submitted = runs.pricing();
    environments
        .iter()
        .map(|pair| {
            let price = submitted.get(pair).copied().flatten().or_else(|| {
                reference
                    .platform_pricing
                    .get(&pair.0)
                    .copied()
                    .filter(|p| p.is_finite() && *p > 0.0)
            });
            (pair.clone(), price)
        })
        .collect()
}

fn warn_unreferenced(runs: &RunTable, reference: &ReferenceTables) {
    let datasets: BTreeSet<&str> = runs
        .runs()
        .iter()
        .map(|r| r.dataset.as_str())
        .filter(|d| !reference.datasets.contains_key(*d))
        .collect();
    let algorithms: BTreeSet<&str> = runs
        .runs()
        .iter()
        .map(|r| r.algorithm.as_str())
        .filter(|a| !reference.algorithms.contains_key(*a))
        .collect();

    for dataset in datasets {
        log::warn!("runs on unknown dataset '{}' are ignored", dataset);
    }
    for algorithm in algorithms {
        log::warn!("runs of unknown algorithm '{}' are ignored", algorithm);
    }
}

fn sort_by_size(rows: &mut [MetricRow], ordering: &SizeOrdering) {
    rows.sort_by_key(|r| ordering.rank(&r.size_class));
}

/// Runs every stage over already-loaded inputs.
pub fn compute(
    runs: &RunTable,
    reference: &ReferenceTables,
    config: &PipelineConfig,
) -> Result<Leaderboard> {
    warn_unreferenced(runs, reference);

    let environments = runs.environments();
    let pricing = resolve_pricing(runs, reference, &environments);
    let unpriced = unpriced_environments(&pricing);
    for (platform, environment) in &unpriced {
        log::warn!(
            "no pricing for {} / {}: excluded from price-adjusted tables",
            platform, environment
        );
    }

    let ordering = &reference.size_ordering;
    let universe = build_universe(
        reference.datasets.values(),
        reference.algorithms.values(),
        &environments,
        |size| config.includes_size(size) && ordering.rank(size).is_some(),
    );
    log::info!(
        "Workload universe: {} items over {} platform environments",
        universe.len(),
        environments.len()
    );

    let measured = item_means(runs);
    let mut items = reconcile(
        &universe,
        &measured,
        &reference.timeouts_in_seconds(),
        &pricing,
        &config.penalty,
    )?;
    let mut algorithms = rollup_algorithms(&items);
    let mut platforms = rollup_platforms(&algorithms);
    sort_by_size(&mut items, ordering);
    sort_by_size(&mut algorithms, ordering);
    sort_by_size(&mut platforms, ordering);

    let ranked = rank(&platforms, ordering);
    log::info!("Ranked {} platform rows", ranked.len());

    Ok(Leaderboard {
        universe,
        measured,
        items,
        algorithms,
        platforms,
        ranked,
        unpriced,
    })
}

/// Renders every output file in memory.
pub fn render(
    leaderboard: &Leaderboard,
    runs: &RunTable,
    config: &PipelineConfig,
) -> Result<Vec<(&'static str, Vec<u8>)>> {
    let scale = config.display.throughput_scale;
    Ok(vec![
        (
            report::LEADERBOARD_FILE,
            report::leaderboard_table(&leaderboard.ranked, scale).to_tsv().into_bytes(),
        ),
        (
            report::WORKLOAD_ITEMS_FILE,
            report::workload_items_table(&leaderboard.items, scale).to_tsv().into_bytes(),
        ),
        (
            report::ALGORITHMS_FILE,
            report::algorithms_table(&leaderboard.algorithms, scale).to_tsv().into_bytes(),
        ),
        (
            report::PLATFORM_TIMES_FILE,
            report::platform_times_table(&leaderboard.platforms).to_tsv().into_bytes(),
        ),
        (
            report::EXCLUDED_FILE,
            report::excluded_table(&leaderboard.unpriced).to_tsv().into_bytes(),
        ),
        (
            report::WIDE_PROCESSING_FILE,
            report::wide_processing_table(&leaderboard.universe, &leaderboard.measured)
                .to_tsv()
                .into_bytes(),
        ),
        (report::RUNS_FILE, report::runs_csv(runs.runs())?),
    ])
}

/// A rendered file on its way into the output directory.
struct StagedFile {
    temporary: PathBuf,
    backup: PathBuf,
    target: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LeaderboardError {
    let path = path.to_path_buf();
    move |source| LeaderboardError::Io { path, source }
}

fn discard(staged: &[StagedFile]) {
    for file in staged {
        let _ = fs::remove_file(&file.temporary);
    }
}

/// Puts back what was in place before `install` started. `replaced` holds
/// each installed file and whether a previous version was moved aside.
fn roll_back(replaced: &[(&StagedFile, bool)]) {
    for (file, had_previous) in replaced.iter().rev() {
        if *had_previous {
            let _ = fs::rename(&file.backup, &file.target);
        } else {
            let _ = fs::remove_file(&file.target);
        }
    }
}

/// Renames every staged file over its target. Existing targets are moved
/// aside first; if any rename fails, every target gets its previous content
/// back.
fn install(staged: &[StagedFile]) -> Result<()> {
    let mut replaced: Vec<(&StagedFile, bool)> = Vec::with_capacity(staged.len());
    for file in staged {
        let had_previous = file.target.is_file();
        if had_previous {
            if let Err(e) = fs::rename(&file.target, &file.backup) {
                roll_back(&replaced);
                discard(staged);
                return Err(io_error(&file.target)(e));
            }
        }
        if let Err(e) = fs::rename(&file.temporary, &file.target) {
            if had_previous {
                let _ = fs::rename(&file.backup, &file.target);
            }
            roll_back(&replaced);
            discard(staged);
            return Err(io_error(&file.target)(e));
        }
        replaced.push((file, had_previous));
    }

    for (file, had_previous) in &replaced {
        if *had_previous {
            let _ = fs::remove_file(&file.backup);
        }
    }
    Ok(())
}

/// Writes rendered files into `dir`. Every file is staged under a temporary
/// name first and only renamed into place once all of them were written.
/// A failure at any point leaves the previous tables in place.
pub fn write_outputs<P: AsRef<Path>>(dir: P, outputs: &[(&str, Vec<u8>)]) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut staged = Vec::with_capacity(outputs.len());
    for (name, content) in outputs {
        let file = StagedFile {
            temporary: dir.join(format!(".{}.partial", name)),
            backup: dir.join(format!(".{}.previous", name)),
            target: dir.join(name),
        };
        if let Err(e) = fs::write(&file.temporary, content) {
            let _ = fs::remove_file(&file.temporary);
            discard(&staged);
            return Err(io_error(&file.temporary)(e));
        }
        staged.push(file);
    }

    install(&staged)?;
    log::info!("Wrote {} tables to '{}'", staged.len(), dir.display());
    Ok(())
}

/// Loads, computes, renders and writes a full leaderboard pass.
pub fn run(
    submissions_dir: &Path,
    reference_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<Leaderboard> {
    let reference = ReferenceTables::load(reference_dir)?;
    let runs = load_submissions(submissions_dir, &config.normalization)?;
    let leaderboard = compute(&runs, &reference, config)?;
    let outputs = render(&leaderboard, &runs, config)?;
    write_outputs(output_dir, &outputs)?;
    Ok(leaderboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{AlgorithmInfo, DatasetInfo};
    use crate::submission::RunRecord;
    use tempfile::TempDir;

    fn reference() -> ReferenceTables {
        let mut reference = ReferenceTables::default();
        reference.datasets.insert(
            "g".into(),
            DatasetInfo {
                name: "g".into(),
                size_class: "S".into(),
                weighted: false,
            },
        );
        reference.algorithms.insert(
            "BFS".into(),
            AlgorithmInfo {
                name: "BFS".into(),
                requires_weights: false,
            },
        );
        reference.timeouts.insert("S".into(), 1.0);
        reference.size_ordering = [("S".to_string(), 1)].into_iter().collect();
        reference
    }

    fn run(platform: &str, pricing: Option<f64>) -> RunRecord {
        RunRecord {
            platform: platform.into(),
            environment: "env".into(),
            pricing,
            job: "j".into(),
            algorithm: "BFS".into(),
            dataset: "g".into(),
            run: "r".into(),
            success: true,
            load_time: Some(1.0),
            makespan: Some(2.0),
            processing_time: Some(1.0),
        }
    }

    #[test]
    fn test_platform_table_fills_missing_pricing() {
        let mut reference = reference();
        reference.platform_pricing.insert("listed".into(), 10.0);
        let runs = RunTable::new(vec![run("listed", None), run("unlisted", None)]);

        let leaderboard = compute(&runs, &reference, &PipelineConfig::default()).unwrap();
        assert_eq!(leaderboard.ranked.len(), 1);
        assert_eq!(leaderboard.ranked[0].row.pricing, Some(10.0));
        assert_eq!(leaderboard.unpriced, vec![("unlisted".to_string(), "env".to_string())]);
        assert_eq!(leaderboard.platforms.len(), 2);
    }

    #[test]
    fn test_write_outputs_stages_then_renames() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");
        let outputs = vec![("a.tsv", b"a\n".to_vec()), ("b.tsv", b"b\n".to_vec())];

        write_outputs(&out, &outputs).unwrap();

        assert_eq!(fs::read_to_string(out.join("a.tsv")).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(out.join("b.tsv")).unwrap(), "b\n");
        assert!(!out.join(".a.tsv.partial").exists());
    }

    #[test]
    fn test_failed_rename_restores_previous_tables() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");
        fs::create_dir_all(out.join("b.tsv").join("blocked")).unwrap();
        fs::write(out.join("a.tsv"), "old\n").unwrap();
        let outputs = vec![("a.tsv", b"new\n".to_vec()), ("b.tsv", b"b\n".to_vec())];

        assert!(write_outputs(&out, &outputs).is_err());

        assert_eq!(fs::read_to_string(out.join("a.tsv")).unwrap(), "old\n");
        assert!(out.join("b.tsv").is_dir());
        let leftovers: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
    }

    #[test]
    fn test_rewrite_replaces_previous_tables() {
        let temp_dir = TempDir::new().unwrap();
        write_outputs(temp_dir.path(), &[("a.tsv", b"old\n".to_vec())]).unwrap();
        write_outputs(temp_dir.path(), &[("a.tsv", b"new\n".to_vec())]).unwrap();

        assert_eq!(fs::read_to_string(temp_dir.path().join("a.tsv")).unwrap(), "new\n");
        assert!(!temp_dir.path().join(".a.tsv.previous").exists());
    }

    #[test]
    fn test_render_produces_every_table() {
        let runs = RunTable::new(vec![run("p", Some(5.0))]);
        let config = PipelineConfig::default();
        let leaderboard = compute(&runs, &reference(), &config).unwrap();

        let names: Vec<&str> = render(&leaderboard, &runs, &config)
            .unwrap()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(
            names,
            vec![
                report::LEADERBOARD_FILE,
                report::WORKLOAD_ITEMS_FILE,
                report::ALGORITHMS_FILE,
                report::PLATFORM_TIMES_FILE,
                report::EXCLUDED_FILE,
                report::WIDE_PROCESSING_FILE,
                report::RUNS_FILE,
            ]
        );
    }
}
