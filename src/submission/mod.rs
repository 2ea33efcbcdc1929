use crate::config::NormalizationConfig;
use crate::error::{LeaderboardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One submission document as produced by a benchmark attempt.
#[derive(Deserialize, Debug)]
pub struct Submission {
    pub system: SystemDescription,
    pub result: SubmissionResult,
}

#[derive(Deserialize, Debug)]
pub struct SystemDescription {
    pub platform: Named,
    pub environment: Named,
    #[serde(default)]
    pub pricing: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct Named {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct SubmissionResult {
    pub jobs: BTreeMap<String, Job>,
    pub runs: BTreeMap<String, RunOutcome>,
}

#[derive(Deserialize, Debug)]
pub struct Job {
    pub algorithm: String,
    pub dataset: String,
    pub runs: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct RunOutcome {
    pub success: bool,
    #[serde(default)]
    pub load_time: Option<f64>,
    #[serde(default)]
    pub makespan: Option<f64>,
    #[serde(default)]
    pub processing_time: Option<f64>,
}

impl RunOutcome {
    /// A successful run must carry every timing, each finite and non-negative.
    fn check_timings(&self, run_id: &str) -> std::result::Result<(), String> {
        let timings = [
            ("load_time", self.load_time),
            ("makespan", self.makespan),
            ("processing_time", self.processing_time),
        ];
        for (field, value) in timings {
            match value {
                None => {
                    return Err(format!("successful run '{}' is missing '{}'", run_id, field));
                }
                Some(v) if !v.is_finite() || v < 0.0 => {
                    return Err(format!("successful run '{}' has invalid {} {}", run_id, field, v));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// A single measured execution, flattened out of a submission.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub platform: String,
    pub environment: String,
    pub pricing: Option<f64>,
    pub job: String,
    pub algorithm: String,
    pub dataset: String,
    pub run: String,
    pub success: bool,
    pub load_time: Option<f64>,
    pub makespan: Option<f64>,
    pub processing_time: Option<f64>,
}

/// Timings of a successful run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub load_time: f64,
    pub makespan: f64,
    pub processing_time: f64,
}

impl RunRecord {
    /// Returns the timings if the run succeeded.
    pub fn measurement(&self) -> Option<Measurement> {
        if !self.success {
            return None;
        }
        Some(Measurement {
            load_time: self.load_time?,
            makespan: self.makespan?,
            processing_time: self.processing_time?,
        })
    }
}

impl Submission {
    /// Parses a submission document; `path` is only used to name errors.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| LeaderboardError::MalformedSubmission {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Flattens the document into one record per (job, run) pair.
    pub fn into_runs(
        self,
        path: &Path,
        normalization: &NormalizationConfig,
    ) -> Result<Vec<RunRecord>> {
        let platform = normalization.canonical_platform(&self.system.platform.name);
        if platform.is_empty() {
            return Err(malformed(path, "empty platform name".to_string()));
        }
        let environment = normalization.canonical_environment(&self.system.environment.name);
        let pricing = normalization.resolve_pricing(&environment, self.system.pricing);

        let mut records = Vec::new();
        let mut seen_runs: BTreeSet<&str> = BTreeSet::new();
        for (job_id, job) in &self.result.jobs {
            for run_id in &job.runs {
                let outcome = self.result.runs.get(run_id).ok_or_else(|| {
                    malformed(
                        path,
                        format!("job '{}' references unknown run '{}'", job_id, run_id),
                    )
                })?;
                if !seen_runs.insert(run_id.as_str()) {
                    return Err(malformed(
                        path,
                        format!("run '{}' is referenced more than once", run_id),
                    ));
                }
                if outcome.success {
                    outcome.check_timings(run_id).map_err(|reason| malformed(path, reason))?;
                }

                records.push(RunRecord {
                    platform: platform.clone(),
                    environment: environment.clone(),
                    pricing,
                    job: job_id.clone(),
                    algorithm: job.algorithm.clone(),
                    dataset: job.dataset.clone(),
                    run: run_id.clone(),
                    success: outcome.success,
                    load_time: outcome.load_time,
                    makespan: outcome.makespan,
                    processing_time: outcome.processing_time,
                });
            }
        }

        Ok(records)
    }
}

fn malformed(path: &Path, reason: String) -> LeaderboardError {
    LeaderboardError::MalformedSubmission {
        path: path.to_path_buf(),
        reason,
    }
}

/// Loads a single submission from a JSON file and flattens it.
pub fn load_submission<P: AsRef<Path>>(
    path: P,
    normalization: &NormalizationConfig,
) -> Result<Vec<RunRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| LeaderboardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = Submission::parse(&content, path)?.into_runs(path, normalization)?;
    log::debug!("{}: {} runs", path.display(), records.len());
    Ok(records)
}

/// Lists every `.json` file below `dir`, in path order.
pub fn submission_paths<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}

/// The flat fact table: every run of every submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTable {
    runs: Vec<RunRecord>,
}

impl RunTable {
    pub fn new(runs: Vec<RunRecord>) -> Self {
        Self { runs }
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn successful(&self) -> impl Iterator<Item = (&RunRecord, Measurement)> {
        self.runs.iter().filter_map(|r| r.measurement().map(|m| (r, m)))
    }

    /// Distinct (platform, environment) pairs with at least one successful run.
    pub fn environments(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .successful()
            .map(|(r, _)| (r.platform.clone(), r.environment.clone()))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    /// Price of each (platform, environment) pair as denormalized on its runs.
    /// The first known price wins; each pair with conflicting prices is
    /// reported once.
    pub fn pricing(&self) -> BTreeMap<(String, String), Option<f64>> {
        let (pricing, conflicts) = self.submitted_pricing();
        for key in &conflicts {
            if let Some(Some(kept)) = pricing.get(key) {
                log::warn!("conflicting pricing for {} / {}: keeping {}", key.0, key.1, kept);
            }
        }
        pricing
    }

    fn submitted_pricing(
        &self,
    ) -> (BTreeMap<(String, String), Option<f64>>, BTreeSet<(String, String)>) {
        let mut pricing: BTreeMap<(String, String), Option<f64>> = BTreeMap::new();
        let mut conflicts = BTreeSet::new();
        for run in &self.runs {
            let key = (run.platform.clone(), run.environment.clone());
            let slot = pricing.entry(key.clone()).or_insert(None);
            match (*slot, run.pricing) {
                (None, Some(price)) => *slot = Some(price),
                (Some(known), Some(price)) if known != price => {
                    conflicts.insert(key);
                }
                _ => {}
            }
        }
        (pricing, conflicts)
    }
}

/// Loads every submission below `dir`. Any malformed document aborts the load.
pub fn load_submissions<P: AsRef<Path>>(
    dir: P,
    normalization: &NormalizationConfig,
) -> Result<RunTable> {
    let mut runs = Vec::new();
    let paths = submission_paths(&dir)?;
    for path in &paths {
        runs.extend(load_submission(path, normalization)?);
    }
    log::info!(
        "Loaded {} runs from {} submissions in '{}'",
        runs.len(),
        paths.len(),
        dir.as_ref().display()
    );
    Ok(RunTable::new(runs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOCUMENT: &str = r#"{
        "system": {
            "platform": { "name": "graphx" },
            "environment": { "name": "" },
            "pricing": 5000.0
        },
        "result": {
            "jobs": {
                "j2": { "algorithm": "PR", "dataset": "dota-league", "runs": ["r3"] },
                "j1": { "algorithm": "BFS", "dataset": "dota-league", "runs": ["r1", "r2"] }
            },
            "runs": {
                "r1": { "success": true, "load_time": 1.0,
                        "makespan": 10.0, "processing_time": 4.0 },
                "r2": { "success": false, "load_time": null,
                        "makespan": null, "processing_time": null },
                "r3": { "success": true, "load_time": 2.0,
                        "makespan": 20.0, "processing_time": 8.0 }
            }
        }
    }"#;

    #[test]
    fn test_flattens_every_job_run_pair() {
        let path = Path::new("graphx.json");
        let runs = Submission::parse(DOCUMENT, path)
            .unwrap()
            .into_runs(path, &NormalizationConfig::default())
            .unwrap();

        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].job, "j1");
        assert_eq!(runs[0].run, "r1");
        assert_eq!(runs[1].run, "r2");
        assert!(!runs[1].success);
        assert_eq!(runs[1].measurement(), None);
        assert_eq!(runs[2].algorithm, "PR");
        assert!(runs.iter().all(|r| r.environment == "bare metal, dedicated server"));
        assert!(runs.iter().all(|r| r.pricing == Some(5000.0)));
    }

    #[test]
    fn test_aliases_and_overrides_apply() {
        let mut normalization = NormalizationConfig::default();
        normalization
            .platform_aliases
            .insert("graphx".into(), "GraphX".into());
        normalization
            .pricing_overrides
            .insert("bare metal, dedicated server".into(), 42.0);

        let path = Path::new("graphx.json");
        let runs = Submission::parse(DOCUMENT, path)
            .unwrap()
            .into_runs(path, &normalization)
            .unwrap();

        assert!(runs.iter().all(|r| r.platform == "GraphX"));
        assert!(runs.iter().all(|r| r.pricing == Some(42.0)));
    }

    #[test]
    fn test_unknown_run_reference_is_fatal() {
        let document = DOCUMENT.replace(r#"["r3"]"#, r#"["r9"]"#);
        let path = Path::new("broken.json");
        let err = Submission::parse(&document, path)
            .unwrap()
            .into_runs(path, &NormalizationConfig::default())
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("broken.json"));
        assert!(message.contains("r9"));
    }

    #[test]
    fn test_successful_run_without_timing_is_fatal() {
        let document = DOCUMENT.replace(r#""makespan": 20.0, "#, "");
        let path = Path::new("partial.json");
        let err = Submission::parse(&document, path)
            .unwrap()
            .into_runs(path, &NormalizationConfig::default())
            .unwrap_err();
        assert!(matches!(err, LeaderboardError::MalformedSubmission { .. }));
    }

    #[test]
    fn test_negative_timing_is_fatal() {
        let document = DOCUMENT.replace(r#""processing_time": 8.0"#, r#""processing_time": -8.0"#);
        let path = Path::new("negative.json");
        let err = Submission::parse(&document, path)
            .unwrap()
            .into_runs(path, &NormalizationConfig::default())
            .unwrap_err();
        assert!(matches!(err, LeaderboardError::MalformedSubmission { .. }));
        assert!(err.to_string().contains("processing_time"));
    }

    #[test]
    fn test_failed_run_timings_are_not_checked() {
        let document = DOCUMENT.replace(
            r#""success": false, "load_time": null"#,
            r#""success": false, "load_time": -1.0"#,
        );
        let path = Path::new("failed.json");
        let runs = Submission::parse(&document, path)
            .unwrap()
            .into_runs(path, &NormalizationConfig::default())
            .unwrap();
        assert_eq!(runs.len(), 3);
    }

    #[test]
    fn test_run_referenced_twice_is_fatal() {
        let within_job = DOCUMENT.replace(r#"["r1", "r2"]"#, r#"["r1", "r1"]"#);
        let across_jobs = DOCUMENT.replace(r#"["r3"]"#, r#"["r3", "r1"]"#);

        for document in [within_job, across_jobs] {
            let path = Path::new("twice.json");
            let err = Submission::parse(&document, path)
                .unwrap()
                .into_runs(path, &NormalizationConfig::default())
                .unwrap_err();
            assert!(err.to_string().contains("'r1' is referenced more than once"));
        }
    }

    #[test]
    fn test_missing_system_is_fatal() {
        let path = Path::new("empty.json");
        let document = r#"{ "result": { "jobs": {}, "runs": {} } }"#;
        let err = Submission::parse(document, path).unwrap_err();
        assert!(err.to_string().contains("empty.json"));
    }

    #[test]
    fn test_missing_pricing_is_unknown() {
        let document = DOCUMENT.replace(r#""pricing": 5000.0"#, r#""pricing": null"#);
        let path = Path::new("graphx.json");
        let runs = Submission::parse(&document, path)
            .unwrap()
            .into_runs(path, &NormalizationConfig::default())
            .unwrap();
        assert!(runs.iter().all(|r| r.pricing.is_none()));
    }

    #[test]
    fn test_load_submissions_walks_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("2024").join("graphx");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("submission.json"), DOCUMENT).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let table = load_submissions(temp_dir.path(), &NormalizationConfig::default()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.environments(),
            vec![("graphx".to_string(), "bare metal, dedicated server".to_string())]
        );
    }

    #[test]
    fn test_load_submissions_reports_bad_document() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.json"), DOCUMENT).unwrap();
        fs::write(temp_dir.path().join("b.json"), "{ not json").unwrap();

        let err = load_submissions(temp_dir.path(), &NormalizationConfig::default()).unwrap_err();
        assert!(err.to_string().contains("b.json"));
    }

    #[test]
    fn test_pricing_keeps_first_known_price() {
        let mut first = Submission::parse(DOCUMENT, Path::new("a.json"))
            .unwrap()
            .into_runs(Path::new("a.json"), &NormalizationConfig::default())
            .unwrap();
        for run in first.iter_mut().take(1) {
            run.pricing = None;
        }
        let table = RunTable::new(first);
        let pricing = table.pricing();
        assert_eq!(pricing.len(), 1);
        assert_eq!(pricing.values().next().copied().flatten(), Some(5000.0));
    }

    #[test]
    fn test_conflicting_pricing_is_reported_once_per_pair() {
        let path = Path::new("a.json");
        let mut runs = Submission::parse(DOCUMENT, path)
            .unwrap()
            .into_runs(path, &NormalizationConfig::default())
            .unwrap();
        for run in runs.iter_mut().skip(1) {
            run.pricing = Some(1.0);
        }

        let (pricing, conflicts) = RunTable::new(runs).submitted_pricing();
        assert_eq!(pricing.values().next().copied().flatten(), Some(5000.0));
        assert_eq!(conflicts.len(), 1);
    }
}
