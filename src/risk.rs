// Per-run operational risk.
//
// Each operations record collects points from independent signals (loss,
// unit-cost overrun against its target, downtime, fuel share, safety
// events). The capped total maps to a level, and the worst runs get a list
// of follow-ups derived from their reason codes.
use crate::config::RiskConfig;
use crate::kpi::RecordMetrics;
use crate::targets::TargetSet;
use crate::types::{Metric, OperationRecord, Ratio};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NegativeProfit,
    HighCostPerKmVariance,
    HighCostPerHourVariance,
    HighDowntime,
    HighFuelShare,
    Incident,
    NearMiss,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NegativeProfit => "negative_profit",
            ReasonCode::HighCostPerKmVariance => "high_cost_per_km_variance",
            ReasonCode::HighCostPerHourVariance => "high_cost_per_hour_variance",
            ReasonCode::HighDowntime => "high_downtime",
            ReasonCode::HighFuelShare => "high_fuel_share",
            ReasonCode::Incident => "incident",
            ReasonCode::NearMiss => "near_miss",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Follow-ups in display order, each triggered by any of its reason codes.
const FOLLOW_UPS: [(&[ReasonCode], &str); 6] = [
    (
        &[ReasonCode::HighFuelShare],
        "Review route planning and fuel policy",
    ),
    (
        &[ReasonCode::HighDowntime],
        "Prioritize preventive maintenance on this equipment",
    ),
    (
        &[ReasonCode::HighCostPerKmVariance],
        "Analyze empty kilometres, payload and routing",
    ),
    (
        &[ReasonCode::HighCostPerHourVariance],
        "Analyze operating rate and labour per shift",
    ),
    (
        &[ReasonCode::NegativeProfit],
        "Review contract profitability: adjust rates or cut costs",
    ),
    (
        &[ReasonCode::Incident, ReasonCode::NearMiss],
        "Check the health and safety factors involved (training, procedure)",
    ),
];

const DEFAULT_FOLLOW_UP: &str = "Targeted operational review";

/// Risk of one operations run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub date: NaiveDate,
    pub subsidiary: String,
    pub activity: String,
    pub contract: String,
    pub team: String,
    pub equipment_id: String,
    pub score: f64,
    pub level: RiskLevel,
    /// In scoring order.
    pub reasons: Vec<ReasonCode>,
    pub profit: f64,
    pub cost_per_km: Ratio,
    pub cost_per_hour: Ratio,
    pub downtime_hours: f64,
}

impl RiskAssessment {
    pub fn has(&self, reason: ReasonCode) -> bool {
        self.reasons.contains(&reason)
    }

    /// Never empty: a run without any reason still gets a generic review.
    pub fn recommended_actions(&self) -> Vec<&'static str> {
        let actions: Vec<&'static str> = FOLLOW_UPS
            .iter()
            .filter(|(codes, _)| codes.iter().any(|c| self.has(*c)))
            .map(|(_, text)| *text)
            .collect();
        if actions.is_empty() {
            vec![DEFAULT_FOLLOW_UP]
        } else {
            actions
        }
    }
}

pub fn level_of(score: f64, cfg: &RiskConfig) -> RiskLevel {
    let l = &cfg.levels;
    if score >= l.critical {
        RiskLevel::Critical
    } else if score >= l.high {
        RiskLevel::High
    } else if score >= l.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Relative overrun of `actual` over the run's target for `metric`, when both
/// exist and the target is not zero.
fn overrun(r: &OperationRecord, actual: Ratio, metric: Metric, targets: &TargetSet, cfg: &RiskConfig) -> Ratio {
    let key = cfg.target_dimension.value_of(r);
    match (actual.value(), targets.get(cfg.target_dimension, key, metric)) {
        (Some(a), Some(t)) => Ratio::of(a - t, t),
        _ => Ratio::Undefined,
    }
}

pub fn assess(r: &OperationRecord, targets: &TargetSet, cfg: &RiskConfig) -> RiskAssessment {
    let m = RecordMetrics::of(r);
    let w = &cfg.weights;
    let above = |ratio: Ratio, threshold: f64| ratio.value().is_some_and(|v| v > threshold);

    let signals = [
        (m.profit < 0.0, ReasonCode::NegativeProfit, w.negative_profit),
        (
            above(overrun(r, m.cost_per_km, Metric::CostPerKm, targets, cfg), cfg.variance_threshold),
            ReasonCode::HighCostPerKmVariance,
            w.cost_per_km_variance,
        ),
        (
            above(overrun(r, m.cost_per_hour, Metric::CostPerHour, targets, cfg), cfg.variance_threshold),
            ReasonCode::HighCostPerHourVariance,
            w.cost_per_hour_variance,
        ),
        (
            above(Ratio::of(r.downtime_hours, r.hours_operated), cfg.downtime_threshold),
            ReasonCode::HighDowntime,
            w.downtime,
        ),
        (
            above(m.fuel_share, cfg.fuel_share_threshold),
            ReasonCode::HighFuelShare,
            w.fuel_share,
        ),
        (r.incident_count > 0, ReasonCode::Incident, w.incident),
        (r.near_miss_count > 0, ReasonCode::NearMiss, w.near_miss),
    ];

    let mut score = 0.0_f64;
    let mut reasons = Vec::new();
    for (hit, code, points) in signals {
        if hit {
            score += points;
            reasons.push(code);
        }
    }
    let score = score.clamp(0.0, MAX_SCORE);

    RiskAssessment {
        date: r.date,
        subsidiary: r.subsidiary.clone(),
        activity: r.activity.clone(),
        contract: r.contract.clone(),
        team: r.team.clone(),
        equipment_id: r.equipment_id.clone(),
        score,
        level: level_of(score, cfg),
        reasons,
        profit: m.profit,
        cost_per_km: m.cost_per_km,
        cost_per_hour: m.cost_per_hour,
        downtime_hours: r.downtime_hours,
    }
}

pub fn assess_all(records: &[OperationRecord], targets: &TargetSet, cfg: &RiskConfig) -> Vec<RiskAssessment> {
    let out: Vec<RiskAssessment> = records.iter().map(|r| assess(r, targets, cfg)).collect();
    debug!(runs = out.len(), "risk assessed");
    out
}

/// Highest score first, then the larger loss; remaining ties on
/// (date, equipment, contract).
fn compare(a: &RiskAssessment, b: &RiskAssessment) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.profit.total_cmp(&b.profit))
        .then_with(|| {
            (a.date, a.equipment_id.as_str(), a.contract.as_str())
                .cmp(&(b.date, b.equipment_id.as_str(), b.contract.as_str()))
        })
}

/// The `top_n` riskiest runs, in order.
pub fn recommend(assessments: &[RiskAssessment], top_n: usize) -> Vec<RiskAssessment> {
    let mut ranked = assessments.to_vec();
    ranked.sort_by(compare);
    ranked.truncate(top_n);
    ranked
}

pub fn level_counts(assessments: &[RiskAssessment]) -> BTreeMap<RiskLevel, usize> {
    let mut counts = BTreeMap::new();
    for a in assessments {
        *counts.entry(a.level).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimension, TargetRate};

    fn run(contract: &str, hours: f64, km: f64, revenue: f64, fuel: f64, other: f64, downtime: f64) -> OperationRecord {
        OperationRecord {
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            subsidiary: "S".into(),
            activity: "transport".into(),
            contract: contract.into(),
            team: "T1".into(),
            equipment_id: "EQ-1".into(),
            hours_operated: hours,
            km_driven: km,
            m3_moved: 0.0,
            revenue,
            fuel_cost: fuel,
            labor_cost: other,
            maintenance_cost: 0.0,
            overhead_cost: 0.0,
            downtime_hours: downtime,
            incident_count: 0,
            near_miss_count: 0,
        }
    }

    fn targets(cpkm: f64, cph: f64) -> TargetSet {
        let rate = |metric, target| TargetRate {
            dimension: Dimension::Activity,
            key: "transport".into(),
            metric,
            target,
            active: true,
        };
        TargetSet::from_rates(vec![rate(Metric::CostPerKm, cpkm), rate(Metric::CostPerHour, cph)])
    }

    #[test]
    fn quiet_run_scores_zero() {
        // cost 100 over 10 km and 10 h, on target, fuel share 0.4
        let r = run("A", 10.0, 10.0, 200.0, 40.0, 60.0, 1.0);
        let a = assess(&r, &targets(10.0, 10.0), &RiskConfig::default());
        assert_eq!(a.score, 0.0);
        assert!(a.reasons.is_empty());
        assert_eq!(a.level, RiskLevel::Low);
        assert_eq!(a.recommended_actions(), vec![DEFAULT_FOLLOW_UP]);
    }

    #[test]
    fn every_signal_adds_its_weight_and_the_total_is_capped() {
        // cost 200: fuel share 0.6, 20 per km and 20 per h against 10, loss of 100
        let mut r = run("A", 10.0, 10.0, 100.0, 120.0, 80.0, 5.0);
        r.incident_count = 1;
        r.near_miss_count = 2;
        let a = assess(&r, &targets(10.0, 10.0), &RiskConfig::default());
        assert_eq!(
            a.reasons,
            vec![
                ReasonCode::NegativeProfit,
                ReasonCode::HighCostPerKmVariance,
                ReasonCode::HighCostPerHourVariance,
                ReasonCode::HighDowntime,
                ReasonCode::HighFuelShare,
                ReasonCode::Incident,
                ReasonCode::NearMiss,
            ]
        );
        assert_eq!(a.score, MAX_SCORE);
        assert_eq!(a.level, RiskLevel::Critical);
        assert_eq!(a.recommended_actions().len(), 6);
        assert_eq!(a.recommended_actions()[0], "Review route planning and fuel policy");
    }

    #[test]
    fn overrun_must_exceed_threshold_and_needs_a_target() {
        // 11% over a 10.0 target
        let r = run("A", 0.0, 10.0, 200.0, 0.0, 111.0, 0.0);
        let a = assess(&r, &targets(10.0, 10.0), &RiskConfig::default());
        assert!(a.reasons.is_empty());

        let r = run("A", 0.0, 10.0, 200.0, 0.0, 113.0, 0.0);
        let a = assess(&r, &targets(10.0, 10.0), &RiskConfig::default());
        assert_eq!(a.reasons, vec![ReasonCode::HighCostPerKmVariance]);
        assert_eq!(a.score, 20.0);
        assert_eq!(a.cost_per_hour, Ratio::Undefined);

        let a = assess(&r, &TargetSet::default(), &RiskConfig::default());
        assert!(a.reasons.is_empty());
    }

    #[test]
    fn downtime_without_operated_hours_is_not_a_signal() {
        let r = run("A", 0.0, 10.0, 200.0, 0.0, 10.0, 4.0);
        let a = assess(&r, &TargetSet::default(), &RiskConfig::default());
        assert!(!a.has(ReasonCode::HighDowntime));
    }

    #[test]
    fn levels_follow_thresholds() {
        let cfg = RiskConfig::default();
        assert_eq!(level_of(75.0, &cfg), RiskLevel::Critical);
        assert_eq!(level_of(55.0, &cfg), RiskLevel::High);
        assert_eq!(level_of(54.9, &cfg), RiskLevel::Medium);
        assert_eq!(level_of(30.0, &cfg), RiskLevel::Medium);
        assert_eq!(level_of(29.0, &cfg), RiskLevel::Low);
    }

    #[test]
    fn recommendations_rank_by_score_then_loss() {
        let t = targets(10.0, 10.0);
        let cfg = RiskConfig::default();
        let loss_small = run("B", 10.0, 10.0, 90.0, 0.0, 100.0, 0.0);
        let loss_big = run("C", 10.0, 10.0, 10.0, 0.0, 100.0, 0.0);
        let quiet = run("A", 10.0, 10.0, 200.0, 0.0, 100.0, 0.0);
        let all = assess_all(&[quiet, loss_small, loss_big], &t, &cfg);

        let top = recommend(&all, 2);
        let contracts: Vec<&str> = top.iter().map(|a| a.contract.as_str()).collect();
        assert_eq!(contracts, vec!["C", "B"]);
        assert_eq!(
            top[0].recommended_actions(),
            vec!["Review contract profitability: adjust rates or cut costs"]
        );

        let counts = level_counts(&all);
        assert_eq!(counts.get(&RiskLevel::Medium), Some(&2));
        assert_eq!(counts.get(&RiskLevel::Low), Some(&1));
    }
}
