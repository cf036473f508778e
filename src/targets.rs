// Target rates: lookup by (dimension, key, metric) and derivation from history.
use crate::error::CockpitResult;
use crate::kpi::RecordMetrics;
use crate::types::{Dimension, Direction, Metric, OperationRecord, TargetRate};
use crate::util::median;
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::io::Read;
use tracing::{debug, warn};

/// Active targets, at most one per (dimension, key, metric).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSet {
    rates: BTreeMap<(Dimension, String, Metric), f64>,
    conflicts: Vec<TargetRate>,
}

impl TargetSet {
    /// Inactive rates are dropped. When several active rates share a triple
    /// the first one is kept and the others are recorded as conflicts.
    pub fn from_rates<I: IntoIterator<Item = TargetRate>>(rates: I) -> Self {
        let mut set = TargetSet::default();
        for rate in rates.into_iter().filter(|r| r.active) {
            let key = (rate.dimension, rate.key.clone(), rate.metric);
            if set.rates.contains_key(&key) {
                warn!(
                    dimension = %rate.dimension,
                    key = %rate.key,
                    metric = %rate.metric,
                    "more than one active target; keeping the first"
                );
                set.conflicts.push(rate);
            } else {
                set.rates.insert(key, rate.target);
            }
        }
        set
    }

    pub fn get(&self, dimension: Dimension, key: &str, metric: Metric) -> Option<f64> {
        self.rates
            .get(&(dimension, key.to_string(), metric))
            .copied()
    }

    /// Whether any key of `dimension` has a target for `metric`.
    pub fn covers(&self, dimension: Dimension, metric: Metric) -> bool {
        self.rates
            .keys()
            .any(|(d, _, m)| *d == dimension && *m == metric)
    }

    pub fn conflicts(&self) -> &[TargetRate] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn to_rates(&self) -> Vec<TargetRate> {
        self.rates
            .iter()
            .map(|((dimension, key, metric), target)| TargetRate {
                dimension: *dimension,
                key: key.clone(),
                metric: *metric,
                target: *target,
                active: true,
            })
            .collect()
    }
}

/// Targets as the median of the defined per-record values of each group,
/// moved to the better side of history by `tightening` according to each
/// metric's direction. Groups with no defined value get no target.
pub fn derive_targets(
    records: &[OperationRecord],
    dims: &[Dimension],
    metrics: &[Metric],
    tightening: f64,
    direction: impl Fn(Metric) -> Direction,
) -> Vec<TargetRate> {
    let per: Vec<RecordMetrics> = records.iter().map(RecordMetrics::of).collect();
    let mut out = Vec::new();
    for dim in dims {
        let mut groups: BTreeMap<&str, Vec<&RecordMetrics>> = BTreeMap::new();
        for (r, m) in records.iter().zip(&per) {
            groups.entry(dim.value_of(r)).or_default().push(m);
        }
        for (key, members) in groups {
            for metric in metrics {
                let values: Vec<f64> = members
                    .iter()
                    .filter_map(|m| m.metric(*metric).value())
                    .collect();
                if let Some(med) = median(values) {
                    out.push(TargetRate {
                        dimension: *dim,
                        key: key.to_string(),
                        metric: *metric,
                        target: direction(*metric).tighten(med, tightening),
                        active: true,
                    });
                }
            }
        }
    }
    debug!(targets = out.len(), "targets derived from history");
    out
}

/// Read a `dimension,key,metric,target[,active]` CSV.
///
/// Returns the readable rates and the number of rows skipped because a cell
/// could not be read.
pub fn read_targets<R: Read>(reader: R) -> CockpitResult<(Vec<TargetRate>, usize)> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rates = Vec::new();
    let mut skipped = 0usize;
    for (idx, result) in rdr.deserialize::<TargetRate>().enumerate() {
        match result {
            Ok(rate) if rate.target.is_finite() => rates.push(rate),
            Ok(_) => skipped += 1,
            Err(e) => {
                if matches!(e.kind(), csv::ErrorKind::Io(_) | csv::ErrorKind::Utf8 { .. }) {
                    return Err(e.into());
                }
                warn!(row = idx + 1, error = %e, "target row skipped");
                skipped += 1;
            }
        }
    }
    Ok((rates, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn rate(dim: Dimension, key: &str, metric: Metric, target: f64, active: bool) -> TargetRate {
        TargetRate {
            dimension: dim,
            key: key.into(),
            metric,
            target,
            active,
        }
    }

    #[test]
    fn first_active_target_wins() {
        let set = TargetSet::from_rates(vec![
            rate(Dimension::Contract, "A", Metric::CostPerKm, 9.0, false),
            rate(Dimension::Contract, "A", Metric::CostPerKm, 4.0, true),
            rate(Dimension::Contract, "A", Metric::CostPerKm, 5.0, true),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(Dimension::Contract, "A", Metric::CostPerKm), Some(4.0));
        assert_eq!(set.conflicts().len(), 1);
        assert!(set.covers(Dimension::Contract, Metric::CostPerKm));
        assert!(!set.covers(Dimension::Team, Metric::CostPerKm));
    }

    #[test]
    fn derived_targets_are_tightened_medians() {
        let mk = |eq: &str, km: f64, cost: f64| OperationRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            subsidiary: "S".into(),
            activity: "a".into(),
            contract: "C".into(),
            team: "T".into(),
            equipment_id: eq.into(),
            hours_operated: 1.0,
            km_driven: km,
            m3_moved: 0.0,
            revenue: 0.0,
            fuel_cost: cost,
            labor_cost: 0.0,
            maintenance_cost: 0.0,
            overhead_cost: 0.0,
            downtime_hours: 0.0,
            incident_count: 0,
            near_miss_count: 0,
        };
        let records = vec![
            mk("EQ-1", 10.0, 20.0),
            mk("EQ-1", 10.0, 40.0),
            mk("EQ-1", 0.0, 40.0),
            mk("EQ-2", 0.0, 10.0),
        ];
        let t = derive_targets(
            &records,
            &[Dimension::Equipment],
            &[Metric::CostPerKm],
            0.95,
            |_| Direction::LowerIsBetter,
        );
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].key, "EQ-1");
        assert_relative_eq!(t[0].target, 3.0 * 0.95);
    }

    #[test]
    fn higher_is_better_targets_are_raised() {
        let mk = |revenue: f64| OperationRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            subsidiary: "S".into(),
            activity: "a".into(),
            contract: "C".into(),
            team: "T".into(),
            equipment_id: "EQ-1".into(),
            hours_operated: 8.0,
            km_driven: 10.0,
            m3_moved: 0.0,
            revenue,
            fuel_cost: 50.0,
            labor_cost: 0.0,
            maintenance_cost: 0.0,
            overhead_cost: 0.0,
            downtime_hours: 2.0,
            incident_count: 0,
            near_miss_count: 0,
        };
        let records = vec![mk(100.0), mk(100.0)];
        let directions = crate::config::default_metric_directions();
        let t = derive_targets(
            &records,
            &[Dimension::Equipment],
            &[Metric::ProfitMargin, Metric::Utilization, Metric::CostPerKm],
            0.95,
            |m| directions[&m],
        );
        let get = |m: Metric| t.iter().find(|r| r.metric == m).unwrap().target;
        assert_relative_eq!(get(Metric::ProfitMargin), 0.5 / 0.95);
        assert_relative_eq!(get(Metric::Utilization), 0.8 / 0.95);
        assert_relative_eq!(get(Metric::CostPerKm), 5.0 * 0.95);
    }

    #[test]
    fn targets_csv_defaults_active_and_skips_bad_rows() {
        let text = "dimension,key,metric,target\n\
                    contract,A,cost_per_km,4.0\n\
                    equipment_id,EQ-1,cost_per_hour,30\n\
                    galaxy,X,cost_per_km,1\n\
                    team,T,cost_per_km,abc\n";
        let (rates, skipped) = read_targets(text.as_bytes()).unwrap();
        assert_eq!(rates.len(), 2);
        assert!(rates.iter().all(|r| r.active));
        assert_eq!(rates[1].dimension, Dimension::Equipment);
        assert_eq!(skipped, 2);
    }
}
