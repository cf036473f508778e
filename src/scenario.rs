// What-if simulation: scale cost, revenue and volume fields, then compare
// the headline KPIs against the unscaled base.
use crate::error::{CockpitError, CockpitResult};
use crate::kpi::{summarize, KpiSummary};
use crate::types::{OperationRecord, Ratio};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Multipliers applied record by record. `volume` scales km and m3 together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioParams {
    pub name: String,
    pub fuel: f64,
    pub maintenance: f64,
    pub labor: f64,
    pub overhead: f64,
    pub revenue: f64,
    pub volume: f64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            name: "Scenario A".to_string(),
            fuel: 1.0,
            maintenance: 1.0,
            labor: 1.0,
            overhead: 1.0,
            revenue: 1.0,
            volume: 1.0,
        }
    }
}

impl ScenarioParams {
    pub fn validate(&self) -> CockpitResult<()> {
        let fields = [
            ("fuel", self.fuel),
            ("maintenance", self.maintenance),
            ("labor", self.labor),
            ("overhead", self.overhead),
            ("revenue", self.revenue),
            ("volume", self.volume),
        ];
        for (name, v) in fields {
            if !v.is_finite() || v < 0.0 {
                return Err(CockpitError::InvalidConfig(format!(
                    "scenario multiplier {} must be a finite number >= 0, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, records: &[OperationRecord]) -> Vec<OperationRecord> {
        records
            .iter()
            .map(|r| OperationRecord {
                fuel_cost: r.fuel_cost * self.fuel,
                maintenance_cost: r.maintenance_cost * self.maintenance,
                labor_cost: r.labor_cost * self.labor,
                overhead_cost: r.overhead_cost * self.overhead,
                revenue: r.revenue * self.revenue,
                km_driven: r.km_driven * self.volume,
                m3_moved: r.m3_moved * self.volume,
                ..r.clone()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioComparison {
    pub params: ScenarioParams,
    pub base: KpiSummary,
    pub scenario: KpiSummary,
    pub profit_delta: f64,
    pub total_cost_delta: f64,
    /// On the median per-record cost per km.
    pub cost_per_km_delta: Ratio,
    pub margin_delta: Ratio,
}

fn diff(a: Ratio, b: Ratio) -> Ratio {
    match (a, b) {
        (Ratio::Defined(x), Ratio::Defined(y)) => Ratio::Defined(x - y),
        _ => Ratio::Undefined,
    }
}

pub fn run(records: &[OperationRecord], params: &ScenarioParams) -> CockpitResult<ScenarioComparison> {
    params.validate()?;
    let base = summarize(records);
    let scenario = summarize(&params.apply(records));
    let cmp = ScenarioComparison {
        params: params.clone(),
        profit_delta: scenario.profit - base.profit,
        total_cost_delta: scenario.total_cost - base.total_cost,
        cost_per_km_delta: diff(scenario.median_cost_per_km, base.median_cost_per_km),
        margin_delta: diff(scenario.profit_margin, base.profit_margin),
        base,
        scenario,
    };
    info!(
        scenario = %params.name,
        profit_delta = cmp.profit_delta,
        total_cost_delta = cmp.total_cost_delta,
        "scenario evaluated"
    );
    Ok(cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn rec(km: f64) -> OperationRecord {
        OperationRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            subsidiary: "S".into(),
            activity: "chargement".into(),
            contract: "CTR-001".into(),
            team: "Équipe A".into(),
            equipment_id: "EQ-001".into(),
            hours_operated: 8.0,
            km_driven: km,
            m3_moved: 100.0,
            revenue: 1000.0,
            fuel_cost: 200.0,
            labor_cost: 400.0,
            maintenance_cost: 100.0,
            overhead_cost: 100.0,
            downtime_hours: 0.5,
            incident_count: 0,
            near_miss_count: 0,
        }
    }

    #[test]
    fn neutral_scenario_changes_nothing() {
        let cmp = run(&[rec(100.0), rec(50.0)], &ScenarioParams::default()).unwrap();
        assert_eq!(cmp.base, cmp.scenario);
        assert_relative_eq!(cmp.profit_delta, 0.0);
        assert_eq!(cmp.cost_per_km_delta, Ratio::Defined(0.0));
    }

    #[test]
    fn fuel_increase_and_volume_drop() {
        let params = ScenarioParams {
            fuel: 1.5,
            volume: 0.5,
            ..ScenarioParams::default()
        };
        let cmp = run(&[rec(100.0)], &params).unwrap();
        assert_relative_eq!(cmp.total_cost_delta, 100.0);
        assert_relative_eq!(cmp.profit_delta, -100.0);
        // 800/100 -> 900/50
        assert_relative_eq!(cmp.cost_per_km_delta.value().unwrap(), 10.0);
        assert_relative_eq!(cmp.margin_delta.value().unwrap(), -0.1, epsilon = 1e-12);
    }

    #[test]
    fn zero_km_keeps_cost_per_km_delta_undefined() {
        let cmp = run(&[rec(0.0)], &ScenarioParams::default()).unwrap();
        assert_eq!(cmp.cost_per_km_delta, Ratio::Undefined);
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let params = ScenarioParams {
            labor: -1.0,
            ..ScenarioParams::default()
        };
        assert!(matches!(
            run(&[rec(10.0)], &params),
            Err(CockpitError::InvalidConfig(_))
        ));
    }
}
