use crate::aggregate::{MetricRow, ThroughputPerDollar};
use crate::reference::SizeOrdering;
use std::cmp::Ordering;

/// A price-adjusted platform row with its position inside its size class.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub position: u32,
    pub size_rank: i64,
    pub row: MetricRow,
    pub throughput: ThroughputPerDollar,
}

/// Orders platform rows by size class, then by descending processing
/// throughput per dollar, and assigns dense positions per size class. Rows
/// with equal throughput share a position and keep platform/environment order.
/// Rows without a price or with an unranked size class are left out.
pub fn rank(platform_rows: &[MetricRow], ordering: &SizeOrdering) -> Vec<RankedRow> {
    let mut candidates: Vec<RankedRow> = platform_rows
        .iter()
        .filter_map(|row| {
            let throughput = row.throughput?;
            let size_rank = ordering.rank(&row.size_class)?;
            Some(RankedRow {
                position: 0,
                size_rank,
                row: row.clone(),
                throughput,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        (&a.row.platform, &a.row.environment).cmp(&(&b.row.platform, &b.row.environment))
    });
    candidates.sort_by(|a, b| {
        a.size_rank
            .cmp(&b.size_rank)
            .then_with(|| descending(a.throughput.processing, b.throughput.processing))
    });

    let mut previous: Option<(i64, f64)> = None;
    let mut position = 0;
    for candidate in candidates.iter_mut() {
        let current = (candidate.size_rank, candidate.throughput.processing);
        position = match previous {
            Some((size_rank, _)) if size_rank != current.0 => 1,
            Some((_, value)) if value == current.1 => position,
            Some(_) => position + 1,
            None => 1,
        };
        candidate.position = position;
        previous = Some(current);
    }

    candidates
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}
