// Engine results rendered as display rows for previews and CSV exports.
use crate::kpi::{MetricTable, WeeklyPoint};
use crate::maintenance::MaintenanceMetrics;
use crate::risk::RiskAssessment;
use crate::scenario::ScenarioComparison;
use crate::types::{
    ActionReportRow, CapaAction, FindingReportRow, KpiReportRow, MaintenanceReportRow,
    QualityReport, Ratio, RiskReportRow, ScenarioReportRow, Severity, VarianceFlag, VarianceRecord,
    VarianceReportRow, WeeklyReportRow,
};
use crate::util::{format_number, format_pct, format_ratio, format_signed};
use chrono::NaiveDate;

pub fn kpi_rows(table: &MetricTable) -> Vec<KpiReportRow> {
    table
        .rows
        .iter()
        .map(|r| KpiReportRow {
            dimension: r.key.dimension_label(),
            key: r.key.key_label(),
            records: r.record_count,
            revenue: format_number(r.revenue, 2),
            total_cost: format_number(r.total_cost, 2),
            profit: format_number(r.profit, 2),
            margin: format_pct(r.profit_margin, 1),
            cost_per_hour: format_ratio(r.cost_per_hour, 2),
            cost_per_km: format_ratio(r.cost_per_km, 2),
            cost_per_m3: format_ratio(r.cost_per_m3, 2),
            utilization: format_ratio(r.utilization.map(|u| u * 100.0), 1),
        })
        .collect()
}

fn flag_label(flag: VarianceFlag) -> &'static str {
    match flag {
        VarianceFlag::Scored => "scored",
        VarianceFlag::UndefinedTarget => "undefined_target",
        VarianceFlag::MissingTarget => "missing_target",
        VarianceFlag::UndefinedActual => "undefined_actual",
    }
}

/// Rows keep the ranking order; `rank` is 1-based.
pub fn variance_rows(variances: &[VarianceRecord]) -> Vec<VarianceReportRow> {
    variances
        .iter()
        .enumerate()
        .map(|(i, v)| VarianceReportRow {
            rank: i + 1,
            dimension: v.dimension.to_string(),
            key: v.key.clone(),
            metric: v.metric.to_string(),
            actual: format_ratio(v.actual, 2),
            target: v
                .target
                .map(|t| format_number(t, 2))
                .unwrap_or_else(|| "-".to_string()),
            absolute_delta: match v.absolute_delta {
                Ratio::Defined(d) => format_signed(d, 2),
                Ratio::Undefined => "undefined".to_string(),
            },
            relative_delta_pct: format_pct(v.relative_delta, 1),
            severity: format_number(v.severity_score, 3),
            flag: flag_label(v.flag).to_string(),
        })
        .collect()
}

/// Status column shows the effective status as of `today` (overdue included).
pub fn action_rows(actions: &[CapaAction], today: NaiveDate) -> Vec<ActionReportRow> {
    actions
        .iter()
        .map(|a| ActionReportRow {
            id: a.id.clone(),
            title: a.title.clone(),
            owner: a.owner.clone(),
            priority: a
                .priority
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            due_date: a.due_date.to_string(),
            status: a.effective_status(today).as_str().to_string(),
        })
        .collect()
}

pub fn maintenance_rows(m: &MaintenanceMetrics) -> Vec<MaintenanceReportRow> {
    m.rows
        .iter()
        .map(|r| MaintenanceReportRow {
            group: r.group.clone(),
            events: r.event_count,
            downtime_hours: format_number(r.total_downtime_hours, 2),
            maintenance_cost: format_number(r.total_maintenance_cost, 2),
            preventive_ratio: format_ratio(r.preventive_ratio, 2),
        })
        .collect()
}

pub fn risk_rows(assessments: &[RiskAssessment]) -> Vec<RiskReportRow> {
    assessments
        .iter()
        .map(|a| RiskReportRow {
            date: a.date.to_string(),
            activity: a.activity.clone(),
            contract: a.contract.clone(),
            equipment: a.equipment_id.clone(),
            level: a.level.as_str().to_string(),
            score: format_number(a.score, 0),
            profit: format_number(a.profit, 2),
            cost_per_km: format_ratio(a.cost_per_km, 2),
            reasons: a
                .reasons
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(","),
            recommended_actions: a.recommended_actions().join("; "),
        })
        .collect()
}

pub fn finding_rows(report: &QualityReport) -> Vec<FindingReportRow> {
    report
        .findings
        .iter()
        .map(|f| FindingReportRow {
            rule: f.rule.as_str().to_string(),
            severity: match f.severity {
                Severity::Error => "error".to_string(),
                Severity::Warning => "warning".to_string(),
            },
            column: f.column.clone().unwrap_or_default(),
            rows: f.affected_row_count,
            sample: f
                .sample_row_refs
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect()
}

pub fn weekly_rows(points: &[WeeklyPoint]) -> Vec<WeeklyReportRow> {
    points
        .iter()
        .map(|p| WeeklyReportRow {
            week_start: p.week_start.to_string(),
            records: p.record_count,
            total_cost: format_number(p.total_cost, 2),
            km_driven: format_number(p.km_driven, 1),
            cost_per_km: format_ratio(p.cost_per_km, 2),
        })
        .collect()
}

pub fn scenario_rows(cmp: &ScenarioComparison) -> Vec<ScenarioReportRow> {
    let ratio_delta = |r: Ratio, decimals: usize| match r {
        Ratio::Defined(d) => format_signed(d, decimals),
        Ratio::Undefined => "undefined".to_string(),
    };
    vec![
        ScenarioReportRow {
            indicator: "Profit".to_string(),
            base: format_number(cmp.base.profit, 0),
            scenario: format_number(cmp.scenario.profit, 0),
            delta: format_signed(cmp.profit_delta, 0),
        },
        ScenarioReportRow {
            indicator: "Costs".to_string(),
            base: format_number(cmp.base.total_cost, 0),
            scenario: format_number(cmp.scenario.total_cost, 0),
            delta: format_signed(cmp.total_cost_delta, 0),
        },
        ScenarioReportRow {
            indicator: "Cost/km".to_string(),
            base: format_ratio(cmp.base.median_cost_per_km, 2),
            scenario: format_ratio(cmp.scenario.median_cost_per_km, 2),
            delta: ratio_delta(cmp.cost_per_km_delta, 2),
        },
        ScenarioReportRow {
            indicator: "Margin".to_string(),
            base: format_pct(cmp.base.profit_margin, 1),
            scenario: format_pct(cmp.scenario.profit_margin, 1),
            delta: match cmp.margin_delta {
                Ratio::Defined(d) => format!("{} pp", format_signed(d * 100.0, 1)),
                Ratio::Undefined => "undefined".to_string(),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::compute;
    use crate::types::{Dimension, Metric, OperationRecord};

    #[test]
    fn undefined_ratios_render_as_text_not_zero() {
        let r = OperationRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            subsidiary: "S".into(),
            activity: "chargement".into(),
            contract: "CTR-001".into(),
            team: "Équipe A".into(),
            equipment_id: "EQ-001".into(),
            hours_operated: 0.0,
            km_driven: 10.0,
            m3_moved: 0.0,
            revenue: 0.0,
            fuel_cost: 50.0,
            labor_cost: 0.0,
            maintenance_cost: 0.0,
            overhead_cost: 0.0,
            downtime_hours: 0.0,
            incident_count: 0,
            near_miss_count: 0,
        };
        let rows = kpi_rows(&compute(&[r], &[Dimension::Equipment]));
        assert_eq!(rows[0].cost_per_hour, "undefined");
        assert_eq!(rows[0].cost_per_km, "5.00");
        assert_eq!(rows[0].margin, "undefined");
    }

    #[test]
    fn risk_rows_list_reasons_and_follow_ups() {
        let r = OperationRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            subsidiary: "S".into(),
            activity: "transport".into(),
            contract: "CTR-001".into(),
            team: "Équipe A".into(),
            equipment_id: "EQ-001".into(),
            hours_operated: 10.0,
            km_driven: 10.0,
            m3_moved: 0.0,
            revenue: 40.0,
            fuel_cost: 50.0,
            labor_cost: 0.0,
            maintenance_cost: 0.0,
            overhead_cost: 0.0,
            downtime_hours: 0.0,
            incident_count: 1,
            near_miss_count: 0,
        };
        let a = crate::risk::assess(
            &r,
            &crate::targets::TargetSet::default(),
            &crate::config::RiskConfig::default(),
        );
        let rows = risk_rows(&[a]);
        assert_eq!(rows[0].level, "high");
        assert_eq!(rows[0].score, "55");
        assert_eq!(rows[0].reasons, "negative_profit,high_fuel_share,incident");
        assert_eq!(
            rows[0].recommended_actions,
            "Review route planning and fuel policy; \
             Review contract profitability: adjust rates or cut costs; \
             Check the health and safety factors involved (training, procedure)"
        );
    }

    #[test]
    fn variance_rows_are_ranked_from_one() {
        let v = VarianceRecord {
            dimension: Dimension::Contract,
            key: "A".into(),
            metric: Metric::CostPerKm,
            actual: Ratio::Defined(5.0),
            target: Some(4.0),
            absolute_delta: Ratio::Defined(1.0),
            relative_delta: Ratio::Defined(0.25),
            severity_score: 0.25,
            flag: VarianceFlag::Scored,
        };
        let rows = variance_rows(&[v]);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].absolute_delta, "+1.00");
        assert_eq!(rows[0].relative_delta_pct, "+25.0%");
        assert_eq!(rows[0].flag, "scored");
    }
}
