use crate::aggregate::{ItemKey, ItemMean, MetricRow, ThroughputPerDollar};
use crate::error::{LeaderboardError, Result};
use crate::ranking::RankedRow;
use crate::submission::RunRecord;
use crate::workload::WorkloadItem;
use prettytable::{Cell, Row, Table};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub const LEADERBOARD_FILE: &str = "leaderboard.tsv";
pub const WORKLOAD_ITEMS_FILE: &str = "workload_items.tsv";
pub const ALGORITHMS_FILE: &str = "algorithms.tsv";
pub const PLATFORM_TIMES_FILE: &str = "platform_times.tsv";
pub const EXCLUDED_FILE: &str = "excluded_platforms.tsv";
pub const WIDE_PROCESSING_FILE: &str = "processing_times_wide.tsv";
pub const RUNS_FILE: &str = "results.csv";

pub const LEADERBOARD_COLUMNS: [&str; 10] = [
    "Position",
    "Size",
    "Platform",
    "Environment name",
    "Pricing (USD)",
    "Mean makespan (s)",
    "Mean processing time (s)",
    "Makespan throughput per dollar",
    "Processing throughput per dollar",
    "Minimum runs per workload item",
];

/// A rendered table: header labels plus formatted cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Tab-separated text. Empty cells are written as `""`.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(self.rows.iter()) {
            let fields: Vec<String> = line.iter().map(|f| tsv_field(f)).collect();
            out.push_str(&fields.join("\t"));
            out.push('\n');
        }
        out
    }

    pub fn print(&self, title: &str) {
        let mut table = Table::new();
        table.set_titles(Row::new(self.headers.iter().map(|h| Cell::new(h)).collect()));
        for line in &self.rows {
            table.add_row(Row::new(line.iter().map(|c| Cell::new(c)).collect()));
        }

        println!("\n{}", title);
        table.printstd();
    }
}

fn tsv_field(field: &str) -> String {
    if field.is_empty() {
        "\"\"".to_string()
    } else if field.contains(['\t', '\n', '\r', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn seconds(value: f64) -> String {
    format!("{:.3}", value)
}

fn pricing(value: Option<f64>) -> String {
    value.map(|p| format!("{:.2}", p)).unwrap_or_default()
}

fn scaled(value: Option<f64>, scale: f64) -> String {
    value.map(|v| format!("{:.6}", v * scale)).unwrap_or_default()
}

fn throughputs(throughput: Option<ThroughputPerDollar>, scale: f64) -> [String; 2] {
    [
        scaled(throughput.map(|t| t.makespan), scale),
        scaled(throughput.map(|t| t.processing), scale),
    ]
}

/// The final leaderboard, one row per priced platform per size class.
pub fn leaderboard_table(ranked: &[RankedRow], scale: f64) -> ReportTable {
    let mut table = ReportTable::new(&LEADERBOARD_COLUMNS);
    for r in ranked {
        let [makespan, processing] = throughputs(Some(r.throughput), scale);
        table.rows.push(vec![
            r.position.to_string(),
            r.row.size_class.clone(),
            r.row.platform.clone(),
            r.row.environment.clone(),
            pricing(r.row.pricing),
            seconds(r.row.mean_makespan),
            seconds(r.row.mean_processing_time),
            makespan,
            processing,
            r.row.run_count.to_string(),
        ]);
    }
    table
}

/// Price-adjusted workload items. Rows of unpriced platforms are left out;
/// their times are in the platform times and wide processing tables.
pub fn workload_items_table(items: &[MetricRow], scale: f64) -> ReportTable {
    let mut table = ReportTable::new(&[
        "Size",
        "Platform",
        "Environment name",
        "Pricing (USD)",
        "Algorithm",
        "Dataset",
        "Mean makespan (s)",
        "Mean processing time (s)",
        "Makespan throughput per dollar",
        "Processing throughput per dollar",
        "Runs",
        "Imputed",
    ]);
    for row in items.iter().filter(|r| r.throughput.is_some()) {
        let [makespan, processing] = throughputs(row.throughput, scale);
        table.rows.push(vec![
            row.size_class.clone(),
            row.platform.clone(),
            row.environment.clone(),
            pricing(row.pricing),
            row.algorithm.clone().unwrap_or_default(),
            row.dataset.clone().unwrap_or_default(),
            seconds(row.mean_makespan),
            seconds(row.mean_processing_time),
            makespan,
            processing,
            row.run_count.to_string(),
            (row.imputed_items > 0).to_string(),
        ]);
    }
    table
}

/// Price-adjusted algorithm rollup, unpriced platforms left out.
pub fn algorithms_table(algorithms: &[MetricRow], scale: f64) -> ReportTable {
    let mut table = ReportTable::new(&[
        "Size",
        "Platform",
        "Environment name",
        "Pricing (USD)",
        "Algorithm",
        "Mean makespan (s)",
        "Mean processing time (s)",
        "Makespan throughput per dollar",
        "Processing throughput per dollar",
        "Minimum runs per workload item",
        "Imputed workload items",
    ]);
    for row in algorithms.iter().filter(|r| r.throughput.is_some()) {
        let [makespan, processing] = throughputs(row.throughput, scale);
        table.rows.push(vec![
            row.size_class.clone(),
            row.platform.clone(),
            row.environment.clone(),
            pricing(row.pricing),
            row.algorithm.clone().unwrap_or_default(),
            seconds(row.mean_makespan),
            seconds(row.mean_processing_time),
            makespan,
            processing,
            row.run_count.to_string(),
            row.imputed_items.to_string(),
        ]);
    }
    table
}

/// Platform rollup without any price adjustment; unpriced platforms appear here.
pub fn platform_times_table(platforms: &[MetricRow]) -> ReportTable {
    let mut table = ReportTable::new(&[
        "Size",
        "Platform",
        "Environment name",
        "Mean makespan (s)",
        "Mean processing time (s)",
        "Minimum runs per workload item",
        "Imputed workload items",
    ]);
    for row in platforms {
        table.rows.push(vec![
            row.size_class.clone(),
            row.platform.clone(),
            row.environment.clone(),
            seconds(row.mean_makespan),
            seconds(row.mean_processing_time),
            row.run_count.to_string(),
            row.imputed_items.to_string(),
        ]);
    }
    table
}

pub fn excluded_table(unpriced: &[(String, String)]) -> ReportTable {
    let mut table = ReportTable::new(&["Platform", "Environment name", "Reason"]);
    for (platform, environment) in unpriced {
        table.rows.push(vec![
            platform.clone(),
            environment.clone(),
            "unknown pricing".to_string(),
        ]);
    }
    table
}

/// Mean processing time of successful runs, one column per algorithm. Items
/// without a successful run are left empty rather than penalized.
pub fn wide_processing_table(
    universe: &[WorkloadItem],
    measured: &FxHashMap<ItemKey, ItemMean>,
) -> ReportTable {
    let algorithms: BTreeSet<&str> = universe.iter().map(|i| i.algorithm.as_str()).collect();

    let mut cells: BTreeMap<(&str, &str, &str, &str), BTreeMap<&str, String>> = BTreeMap::new();
    for item in universe {
        let value = measured
            .get(&item.key())
            .map(|m| seconds(m.mean_processing_time))
            .unwrap_or_default();
        cells
            .entry((
                item.size_class.as_str(),
                item.platform.as_str(),
                item.environment.as_str(),
                item.dataset.as_str(),
            ))
            .or_default()
            .insert(item.algorithm.as_str(), value);
    }

    let mut headers = vec!["Size", "Platform", "Environment name", "Dataset"];
    headers.extend(algorithms.iter().copied());
    let mut table = ReportTable::new(&headers);

    for ((size, platform, environment, dataset), values) in cells {
        let mut line = vec![
            size.to_string(),
            platform.to_string(),
            environment.to_string(),
            dataset.to_string(),
        ];
        for algorithm in &algorithms {
            line.push(values.get(algorithm).cloned().unwrap_or_default());
        }
        table.rows.push(line);
    }
    table
}

/// The flattened fact table as CSV, failed runs included.
pub fn runs_csv(runs: &[RunRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for run in runs {
        writer.serialize(run).map_err(|source| LeaderboardError::Csv {
            path: PathBuf::from(RUNS_FILE),
            source,
        })?;
    }
    writer.into_inner().map_err(|e| LeaderboardError::Io {
        path: PathBuf::from(RUNS_FILE),
        source: e.into_error(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform_row(pricing: Option<f64>) -> MetricRow {
        MetricRow {
            size_class: "L".into(),
            platform: "GraphX".into(),
            environment: "bare metal, dedicated server".into(),
            pricing,
            algorithm: None,
            dataset: None,
            mean_makespan: 12.5,
            mean_processing_time: 4.25,
            throughput: pricing.map(|_| ThroughputPerDollar {
                makespan: 0.000002,
                processing: 0.000005,
            }),
            run_count: 3,
            imputed_items: 1,
        }
    }

    #[test]
    fn test_tsv_quotes_empty_fields() {
        assert_eq!(tsv_field(""), "\"\"");
        assert_eq!(tsv_field("a\tb"), "\"a\tb\"");
        assert_eq!(tsv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(tsv_field("plain"), "plain");
    }

    #[test]
    fn test_leaderboard_columns_and_scaling() {
        let row = platform_row(Some(1000.0));
        let ranked = vec![RankedRow {
            position: 1,
            size_rank: 3,
            throughput: row.throughput.unwrap(),
            row,
        }];

        let table = leaderboard_table(&ranked, 1_000_000.0);
        assert_eq!(table.headers, LEADERBOARD_COLUMNS.to_vec());
        assert_eq!(
            table.rows[0],
            vec![
                "1",
                "L",
                "GraphX",
                "bare metal, dedicated server",
                "1000.00",
                "12.500",
                "4.250",
                "2.000000",
                "5.000000",
                "3"
            ]
        );

        let tsv = table.to_tsv();
        let mut lines = tsv.lines();
        assert!(lines.next().unwrap().starts_with("Position\tSize\tPlatform"));
        assert!(lines.next().unwrap().starts_with("1\tL\tGraphX"));
    }

    #[test]
    fn test_price_adjusted_tables_skip_unpriced_rows() {
        let mut priced = platform_row(Some(1000.0));
        priced.algorithm = Some("BFS".into());
        priced.dataset = Some("g1".into());
        let mut unpriced = platform_row(None);
        unpriced.platform = "Unpriced".into();
        let rows = [priced, unpriced];

        let items = workload_items_table(&rows, 1_000_000.0);
        let algorithms = algorithms_table(&rows, 1_000_000.0);
        assert_eq!(items.rows.len(), 1);
        assert_eq!(algorithms.rows.len(), 1);
        assert!(!items.to_tsv().contains("Unpriced"));
        assert!(!algorithms.to_tsv().contains("Unpriced"));

        let times = platform_times_table(&rows);
        assert_eq!(times.rows.len(), 2);
    }

    #[test]
    fn test_empty_cells_are_quoted_in_tsv() {
        let table = excluded_table(&[("GraphX".to_string(), String::new())]);
        assert_eq!(table.to_tsv().lines().nth(1), Some("GraphX\t\"\"\tunknown pricing"));
    }

    #[test]
    fn test_wide_processing_table() {
        let item = |algorithm: &str, dataset: &str| WorkloadItem {
            size_class: "S".into(),
            platform: "GraphX".into(),
            environment: "env".into(),
            algorithm: algorithm.into(),
            dataset: dataset.into(),
        };
        let universe = vec![item("BFS", "g1"), item("PR", "g1"), item("BFS", "g2")];
        let mut measured = FxHashMap::default();
        measured.insert(
            universe[0].key(),
            ItemMean {
                mean_load_time: 1.0,
                mean_makespan: 3.0,
                mean_processing_time: 2.0,
                run_count: 1,
            },
        );

        let table = wide_processing_table(&universe, &measured);
        assert_eq!(
            table.headers,
            vec!["Size", "Platform", "Environment name", "Dataset", "BFS", "PR"]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["S", "GraphX", "env", "g1", "2.000", ""]);
        assert_eq!(table.rows[1], vec!["S", "GraphX", "env", "g2", "", ""]);
    }

    #[test]
    fn test_runs_csv_keeps_failed_runs() {
        let runs = vec![RunRecord {
            platform: "GraphX".into(),
            environment: "env".into(),
            pricing: None,
            job: "j1".into(),
            algorithm: "BFS".into(),
            dataset: "g1".into(),
            run: "r1".into(),
            success: false,
            load_time: None,
            makespan: None,
            processing_time: None,
        }];

        let csv = String::from_utf8(runs_csv(&runs).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            concat!(
                "platform,environment,pricing,job,algorithm,dataset,run,success,",
                "load_time,makespan,processing_time"
            )
        );
        assert_eq!(lines.next().unwrap(), "GraphX,env,,j1,BFS,g1,r1,false,,,");
    }
}
