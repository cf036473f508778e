// Unit-economics KPIs over validated operations records.
//
// Sums are plain f64 totals; every ratio goes through `Ratio::of`, so a zero
// denominator yields `Ratio::Undefined` and is skipped by averages and medians.
use crate::types::{Dimension, GroupKey, Metric, OperationRecord, Ratio};
use crate::util::median_ratio;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Derived metrics of a single operations record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordMetrics {
    pub revenue: f64,
    pub total_cost: f64,
    pub profit: f64,
    pub cost_per_hour: Ratio,
    pub cost_per_km: Ratio,
    pub cost_per_m3: Ratio,
    pub profit_margin: Ratio,
    pub fuel_share: Ratio,
    pub maintenance_share: Ratio,
    pub labor_share: Ratio,
    pub utilization: Ratio,
}

impl RecordMetrics {
    pub fn of(r: &OperationRecord) -> Self {
        let mut t = Totals::default();
        t.add(r);
        let row = t.into_row(GroupKey::default());
        RecordMetrics {
            revenue: row.revenue,
            total_cost: row.total_cost,
            profit: row.profit,
            cost_per_hour: row.cost_per_hour,
            cost_per_km: row.cost_per_km,
            cost_per_m3: row.cost_per_m3,
            profit_margin: row.profit_margin,
            fuel_share: row.fuel_share,
            maintenance_share: row.maintenance_share,
            labor_share: row.labor_share,
            utilization: row.utilization,
        }
    }

    pub fn metric(&self, metric: Metric) -> Ratio {
        match metric {
            Metric::CostPerHour => self.cost_per_hour,
            Metric::CostPerKm => self.cost_per_km,
            Metric::CostPerM3 => self.cost_per_m3,
            Metric::TotalCost => Ratio::from(self.total_cost),
            Metric::Revenue => Ratio::from(self.revenue),
            Metric::Profit => Ratio::from(self.profit),
            Metric::ProfitMargin => self.profit_margin,
            Metric::FuelShare => self.fuel_share,
            Metric::MaintenanceShare => self.maintenance_share,
            Metric::LaborShare => self.labor_share,
            Metric::Utilization => self.utilization,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Totals {
    records: usize,
    hours_operated: f64,
    km_driven: f64,
    m3_moved: f64,
    revenue: f64,
    fuel_cost: f64,
    labor_cost: f64,
    maintenance_cost: f64,
    overhead_cost: f64,
    downtime_hours: f64,
    incidents: u64,
    near_misses: u64,
}

impl Totals {
    fn add(&mut self, r: &OperationRecord) {
        self.records += 1;
        self.hours_operated += r.hours_operated;
        self.km_driven += r.km_driven;
        self.m3_moved += r.m3_moved;
        self.revenue += r.revenue;
        self.fuel_cost += r.fuel_cost;
        self.labor_cost += r.labor_cost;
        self.maintenance_cost += r.maintenance_cost;
        self.overhead_cost += r.overhead_cost;
        self.downtime_hours += r.downtime_hours;
        self.incidents += u64::from(r.incident_count);
        self.near_misses += u64::from(r.near_miss_count);
    }

    fn total_cost(&self) -> f64 {
        self.fuel_cost + self.labor_cost + self.maintenance_cost + self.overhead_cost
    }

    fn into_row(self, key: GroupKey) -> MetricRow {
        let total_cost = self.total_cost();
        let profit = self.revenue - total_cost;
        MetricRow {
            key,
            record_count: self.records,
            hours_operated: self.hours_operated,
            km_driven: self.km_driven,
            m3_moved: self.m3_moved,
            revenue: self.revenue,
            fuel_cost: self.fuel_cost,
            labor_cost: self.labor_cost,
            maintenance_cost: self.maintenance_cost,
            overhead_cost: self.overhead_cost,
            downtime_hours: self.downtime_hours,
            incident_count: self.incidents,
            near_miss_count: self.near_misses,
            total_cost,
            profit,
            cost_per_hour: Ratio::of(total_cost, self.hours_operated),
            cost_per_km: Ratio::of(total_cost, self.km_driven),
            cost_per_m3: Ratio::of(total_cost, self.m3_moved),
            profit_margin: Ratio::of(profit, self.revenue),
            fuel_share: Ratio::of(self.fuel_cost, total_cost),
            maintenance_share: Ratio::of(self.maintenance_cost, total_cost),
            labor_share: Ratio::of(self.labor_cost, total_cost),
            utilization: Ratio::of(self.hours_operated, self.hours_operated + self.downtime_hours),
        }
    }
}

/// One aggregated group of operations records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub key: GroupKey,
    pub record_count: usize,
    pub hours_operated: f64,
    pub km_driven: f64,
    pub m3_moved: f64,
    pub revenue: f64,
    pub fuel_cost: f64,
    pub labor_cost: f64,
    pub maintenance_cost: f64,
    pub overhead_cost: f64,
    pub downtime_hours: f64,
    pub incident_count: u64,
    pub near_miss_count: u64,
    pub total_cost: f64,
    pub profit: f64,
    pub cost_per_hour: Ratio,
    pub cost_per_km: Ratio,
    pub cost_per_m3: Ratio,
    pub profit_margin: Ratio,
    pub fuel_share: Ratio,
    pub maintenance_share: Ratio,
    pub labor_share: Ratio,
    pub utilization: Ratio,
}

impl MetricRow {
    pub fn metric(&self, metric: Metric) -> Ratio {
        match metric {
            Metric::CostPerHour => self.cost_per_hour,
            Metric::CostPerKm => self.cost_per_km,
            Metric::CostPerM3 => self.cost_per_m3,
            Metric::TotalCost => Ratio::from(self.total_cost),
            Metric::Revenue => Ratio::from(self.revenue),
            Metric::Profit => Ratio::from(self.profit),
            Metric::ProfitMargin => self.profit_margin,
            Metric::FuelShare => self.fuel_share,
            Metric::MaintenanceShare => self.maintenance_share,
            Metric::LaborShare => self.labor_share,
            Metric::Utilization => self.utilization,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTable {
    pub dims: Vec<Dimension>,
    /// Ordered by group key.
    pub rows: Vec<MetricRow>,
}

impl MetricTable {
    pub fn get(&self, key: &GroupKey) -> Option<&MetricRow> {
        self.rows.iter().find(|r| &r.key == key)
    }

    /// Cross-group mean of a ratio; groups where it is undefined do not count.
    pub fn ratio_average(&self, metric: Metric) -> Ratio {
        Ratio::mean(self.rows.iter().map(|r| r.metric(metric)))
    }

    pub fn ratio_median(&self, metric: Metric) -> Ratio {
        median_ratio(self.rows.iter().map(|r| r.metric(metric)))
    }
}

/// Aggregate `records` by the requested dimensions.
///
/// Repeated dimensions are ignored. The empty grouping yields exactly one
/// global row, even over no records.
pub fn compute(records: &[OperationRecord], group_by: &[Dimension]) -> MetricTable {
    let mut dims: Vec<Dimension> = Vec::with_capacity(group_by.len());
    for d in group_by {
        if !dims.contains(d) {
            dims.push(*d);
        }
    }

    let mut map: HashMap<GroupKey, Totals> = HashMap::new();
    for r in records {
        map.entry(GroupKey::of(r, &dims)).or_default().add(r);
    }
    if dims.is_empty() && map.is_empty() {
        map.insert(GroupKey::default(), Totals::default());
    }

    let mut rows: Vec<MetricRow> = map.into_iter().map(|(k, t)| t.into_row(k)).collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));

    debug!(dims = ?dims, records = records.len(), groups = rows.len(), "kpi table computed");
    MetricTable { dims, rows }
}

pub fn per_record(records: &[OperationRecord]) -> Vec<RecordMetrics> {
    records.iter().map(RecordMetrics::of).collect()
}

/// Inclusive date range plus equality filters on the grouping dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub subsidiary: Option<String>,
    pub activity: Option<String>,
    pub contract: Option<String>,
    pub team: Option<String>,
    pub equipment_id: Option<String>,
}

impl OperationFilter {
    pub fn matches(&self, r: &OperationRecord) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        self.date_from.map_or(true, |d| r.date >= d)
            && self.date_to.map_or(true, |d| r.date <= d)
            && eq(&self.subsidiary, &r.subsidiary)
            && eq(&self.activity, &r.activity)
            && eq(&self.contract, &r.contract)
            && eq(&self.team, &r.team)
            && eq(&self.equipment_id, &r.equipment_id)
    }

    pub fn apply(&self, records: &[OperationRecord]) -> Vec<OperationRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyPoint {
    pub week_start: NaiveDate,
    pub record_count: usize,
    pub total_cost: f64,
    pub km_driven: f64,
    pub cost_per_km: Ratio,
}

/// Weekly cost per km for trend charts, oldest week first.
pub fn weekly_cost_per_km(records: &[OperationRecord]) -> Vec<WeeklyPoint> {
    let mut weeks: BTreeMap<NaiveDate, Totals> = BTreeMap::new();
    for r in records {
        weeks.entry(week_start(r.date)).or_default().add(r);
    }
    weeks
        .into_iter()
        .map(|(week_start, t)| {
            let row = t.into_row(GroupKey::default());
            WeeklyPoint {
                week_start,
                record_count: row.record_count,
                total_cost: row.total_cost,
                km_driven: row.km_driven,
                cost_per_km: row.cost_per_km,
            }
        })
        .collect()
}

/// Headline figures of a record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub record_count: usize,
    pub revenue: f64,
    pub total_cost: f64,
    pub profit: f64,
    pub profit_margin: Ratio,
    pub downtime_hours: f64,
    pub utilization: Ratio,
    /// Medians of the per-record ratios, undefined records skipped.
    pub median_cost_per_hour: Ratio,
    pub median_cost_per_km: Ratio,
    pub median_cost_per_m3: Ratio,
}

pub fn summarize(records: &[OperationRecord]) -> KpiSummary {
    let global = compute(records, &[]);
    let row = &global.rows[0];
    let per = per_record(records);
    KpiSummary {
        record_count: row.record_count,
        revenue: row.revenue,
        total_cost: row.total_cost,
        profit: row.profit,
        profit_margin: row.profit_margin,
        downtime_hours: row.downtime_hours,
        utilization: row.utilization,
        median_cost_per_hour: median_ratio(per.iter().map(|m| m.cost_per_hour)),
        median_cost_per_km: median_ratio(per.iter().map(|m| m.cost_per_km)),
        median_cost_per_m3: median_ratio(per.iter().map(|m| m.cost_per_m3)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rec(date: &str, contract: &str, eq: &str, hours: f64, km: f64, costs: [f64; 4]) -> OperationRecord {
        OperationRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            subsidiary: "Sub".into(),
            activity: "transport".into(),
            contract: contract.into(),
            team: "A".into(),
            equipment_id: eq.into(),
            hours_operated: hours,
            km_driven: km,
            m3_moved: 0.0,
            revenue: 100.0,
            fuel_cost: costs[0],
            labor_cost: costs[1],
            maintenance_cost: costs[2],
            overhead_cost: costs[3],
            downtime_hours: 0.0,
            incident_count: 0,
            near_miss_count: 0,
        }
    }

    #[test]
    fn zero_hours_leaves_cost_per_hour_undefined() {
        let r = rec("2024-01-01", "A", "EQ-1", 0.0, 10.0, [20.0, 10.0, 10.0, 10.0]);
        let m = RecordMetrics::of(&r);
        assert_relative_eq!(m.total_cost, 50.0);
        assert_eq!(m.cost_per_hour, Ratio::Undefined);
        assert_eq!(m.cost_per_km, Ratio::Defined(5.0));
        assert_eq!(m.cost_per_m3, Ratio::Undefined);
    }

    #[test]
    fn total_cost_is_sum_of_components() {
        let records = vec![
            rec("2024-01-01", "A", "EQ-1", 8.0, 100.0, [12.3, 45.6, 7.8, 9.0]),
            rec("2024-01-02", "A", "EQ-2", 6.0, 0.0, [0.1, 0.2, 0.3, 0.4]),
        ];
        for row in compute(&records, &[Dimension::Equipment]).rows {
            assert_relative_eq!(
                row.total_cost,
                row.fuel_cost + row.labor_cost + row.maintenance_cost + row.overhead_cost,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn grouping_sums_then_divides() {
        let records = vec![
            rec("2024-01-01", "A", "EQ-1", 8.0, 10.0, [10.0, 10.0, 10.0, 10.0]),
            rec("2024-01-02", "A", "EQ-2", 2.0, 30.0, [5.0, 5.0, 5.0, 5.0]),
            rec("2024-01-02", "B", "EQ-2", 0.0, 0.0, [1.0, 1.0, 1.0, 1.0]),
        ];
        let t = compute(&records, &[Dimension::Contract]);
        assert_eq!(t.rows.len(), 2);
        let a = &t.rows[0];
        assert_eq!(a.key.key_label(), "A");
        assert_eq!(a.record_count, 2);
        assert_eq!(a.cost_per_km, Ratio::Defined(60.0 / 40.0));
        assert_eq!(a.cost_per_hour, Ratio::Defined(6.0));
        let b = &t.rows[1];
        // undefined ratios, defined absolute components
        assert_eq!(b.cost_per_km, Ratio::Undefined);
        assert_eq!(b.cost_per_hour, Ratio::Undefined);
        assert_relative_eq!(b.total_cost, 4.0);
        assert_relative_eq!(b.profit, 96.0);
    }

    #[test]
    fn cross_group_average_skips_undefined_groups() {
        let records = vec![
            rec("2024-01-01", "A", "EQ-1", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-01", "B", "EQ-1", 8.0, 0.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-01", "C", "EQ-1", 8.0, 5.0, [15.0, 0.0, 0.0, 0.0]),
        ];
        let t = compute(&records, &[Dimension::Contract]);
        assert_eq!(t.ratio_average(Metric::CostPerKm), Ratio::Defined(2.0));
        assert_eq!(t.ratio_median(Metric::CostPerKm), Ratio::Defined(2.0));
    }

    #[test]
    fn empty_grouping_is_one_global_row() {
        let records = vec![
            rec("2024-01-01", "A", "EQ-1", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-01", "B", "EQ-2", 2.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
        ];
        let t = compute(&records, &[]);
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0].key.dimension_label(), "all");
        assert_eq!(t.rows[0].record_count, 2);

        let empty = compute(&[], &[]);
        assert_eq!(empty.rows.len(), 1);
        assert_eq!(empty.rows[0].cost_per_km, Ratio::Undefined);
        assert!(compute(&[], &[Dimension::Team]).rows.is_empty());
    }

    #[test]
    fn multi_dimension_keys_and_repeats() {
        let records = vec![
            rec("2024-01-01", "A", "EQ-1", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-01", "A", "EQ-2", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
        ];
        let t = compute(
            &records,
            &[Dimension::Contract, Dimension::Equipment, Dimension::Contract],
        );
        assert_eq!(t.dims, vec![Dimension::Contract, Dimension::Equipment]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1].key.key_label(), "A/EQ-2");
        assert_eq!(t.rows[1].key.dimension_label(), "contract+equipment");
    }

    #[test]
    fn weekly_series_is_ordered_by_monday() {
        let records = vec![
            rec("2024-01-10", "A", "EQ-1", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-02", "A", "EQ-1", 8.0, 0.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-07", "A", "EQ-1", 8.0, 20.0, [10.0, 0.0, 0.0, 0.0]),
        ];
        let w = weekly_cost_per_km(&records);
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].week_start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(w[0].record_count, 2);
        assert_eq!(w[0].cost_per_km, Ratio::Defined(1.0));
        assert_eq!(w[1].week_start, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    }

    #[test]
    fn filter_narrows_records() {
        let records = vec![
            rec("2024-01-01", "A", "EQ-1", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-05", "A", "EQ-2", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-09", "B", "EQ-1", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
        ];
        let f = OperationFilter {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 2),
            equipment_id: Some("EQ-1".into()),
            ..Default::default()
        };
        let out = f.apply(&records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].contract, "B");
    }

    #[test]
    fn summary_uses_medians_of_defined_record_ratios() {
        let records = vec![
            rec("2024-01-01", "A", "EQ-1", 8.0, 10.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-01", "B", "EQ-1", 8.0, 0.0, [10.0, 0.0, 0.0, 0.0]),
            rec("2024-01-01", "C", "EQ-1", 8.0, 2.0, [10.0, 0.0, 0.0, 0.0]),
        ];
        let s = summarize(&records);
        assert_eq!(s.record_count, 3);
        assert_relative_eq!(s.total_cost, 30.0);
        assert_relative_eq!(s.profit, 270.0);
        assert_eq!(s.median_cost_per_km, Ratio::Defined(3.0));
        assert_eq!(s.profit_margin, Ratio::Defined(0.9));
    }
}
