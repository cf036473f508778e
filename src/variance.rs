// Variance scoring: aggregated actuals against targets, ranked.
use crate::kpi::MetricTable;
use crate::targets::TargetSet;
use crate::types::{Dimension, Metric, Ratio, VarianceFlag, VarianceRecord};
use std::cmp::Ordering;
use tracing::{debug, warn};

fn record(
    actual: Ratio,
    target: Option<f64>,
    dimension: Dimension,
    key: &str,
    metric: Metric,
) -> VarianceRecord {
    let (absolute_delta, relative_delta, flag) = match (actual, target) {
        (Ratio::Undefined, _) => (Ratio::Undefined, Ratio::Undefined, VarianceFlag::UndefinedActual),
        (Ratio::Defined(_), None) => (Ratio::Undefined, Ratio::Undefined, VarianceFlag::MissingTarget),
        (Ratio::Defined(a), Some(t)) if t == 0.0 => {
            (Ratio::Defined(a - t), Ratio::Undefined, VarianceFlag::UndefinedTarget)
        }
        (Ratio::Defined(a), Some(t)) => (
            Ratio::Defined(a - t),
            Ratio::of(a - t, t),
            VarianceFlag::Scored,
        ),
    };
    let severity_score = match flag {
        VarianceFlag::Scored => relative_delta.value().map_or(0.0, f64::abs),
        _ => 0.0,
    };
    VarianceRecord {
        dimension,
        key: key.to_string(),
        metric,
        actual,
        target,
        absolute_delta,
        relative_delta,
        severity_score,
        flag,
    }
}

/// Score one single-dimension metric table against `targets`.
///
/// A (key, metric) pair is emitted when the key has an active target, or
/// when another key of the same dimension has one (flagged as missing).
/// Tables grouped on several dimensions at once have no target and yield
/// nothing.
pub fn score(table: &MetricTable, targets: &TargetSet, metrics: &[Metric]) -> Vec<VarianceRecord> {
    let dimension = match table.dims.as_slice() {
        [d] => *d,
        dims => {
            if !dims.is_empty() {
                warn!(dims = ?dims, "targets are per dimension; multi-dimension table not scored");
            }
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for metric in metrics {
        if !targets.covers(dimension, *metric) {
            continue;
        }
        for row in &table.rows {
            let Some((_, key)) = row.key.single() else {
                continue;
            };
            let target = targets.get(dimension, key, *metric);
            out.push(record(row.metric(*metric), target, dimension, key, *metric));
        }
    }
    rank(&mut out);
    debug!(dimension = %dimension, records = out.len(), "variances scored");
    out
}

/// Score several tables and rank the union.
pub fn score_all<'a, I>(tables: I, targets: &TargetSet, metrics: &[Metric]) -> Vec<VarianceRecord>
where
    I: IntoIterator<Item = &'a MetricTable>,
{
    let mut out: Vec<VarianceRecord> = tables
        .into_iter()
        .flat_map(|t| score(t, targets, metrics))
        .collect();
    rank(&mut out);
    out
}

/// Scored records first by severity then absolute delta (both descending);
/// records that could not be scored follow. Ties resolve on
/// (dimension, key, metric).
pub fn compare(a: &VarianceRecord, b: &VarianceRecord) -> Ordering {
    b.is_scored()
        .cmp(&a.is_scored())
        .then_with(|| b.severity_score.total_cmp(&a.severity_score))
        .then_with(|| {
            let da = a.absolute_delta.value().unwrap_or(f64::NEG_INFINITY);
            let db = b.absolute_delta.value().unwrap_or(f64::NEG_INFINITY);
            db.total_cmp(&da)
        })
        .then_with(|| {
            (a.dimension, a.key.as_str(), a.metric).cmp(&(b.dimension, b.key.as_str(), b.metric))
        })
}

pub fn rank(records: &mut [VarianceRecord]) {
    records.sort_by(compare);
}
