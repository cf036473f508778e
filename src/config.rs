// Engine configuration: constants of the scoring rules and CAPA defaults.
//
// Loaded from a JSON file when one is given; every field has a default so a
// partial file only overrides what it names.
use crate::error::{CockpitError, CockpitResult};
use crate::types::{Dimension, Direction, Metric, Priority};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Longest lead time accepted for a proposed action's due date.
pub const MAX_LEAD_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many offending row refs a quality finding keeps.
    pub sample_size: usize,
    /// Cost of one maintenance labour hour.
    pub labor_rate: f64,
    pub top_n: usize,
    pub default_owner: String,
    pub default_lead_days: i64,
    pub owner_by_dimension: BTreeMap<Dimension, String>,
    pub metric_directions: BTreeMap<Metric, Direction>,
    pub scoring_dimensions: Vec<Dimension>,
    pub scored_metrics: Vec<Metric>,
    /// How far derived targets move past historical medians, toward the
    /// better side of each metric's direction.
    pub target_tightening: f64,
    pub priority_thresholds: PriorityThresholds,
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            high: 0.25,
            medium: 0.10,
        }
    }
}

impl PriorityThresholds {
    pub fn classify(&self, severity_score: f64) -> Priority {
        if severity_score >= self.high {
            Priority::High
        } else if severity_score >= self.medium {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

/// Per-run risk scoring rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Dimension whose targets a run is compared with.
    pub target_dimension: Dimension,
    /// Relative overrun of cost_per_km / cost_per_hour that counts as high.
    pub variance_threshold: f64,
    /// downtime_hours / hours_operated above which downtime counts as high.
    pub downtime_threshold: f64,
    pub fuel_share_threshold: f64,
    pub weights: RiskWeights,
    pub levels: RiskLevelThresholds,
    /// Number of runs kept in the recommendation list.
    pub top_n: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            target_dimension: Dimension::Activity,
            variance_threshold: 0.12,
            downtime_threshold: 0.15,
            fuel_share_threshold: 0.42,
            weights: RiskWeights::default(),
            levels: RiskLevelThresholds::default(),
            top_n: 8,
        }
    }
}

/// Points added by each signal; the total is capped at 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub negative_profit: f64,
    pub cost_per_km_variance: f64,
    pub cost_per_hour_variance: f64,
    pub downtime: f64,
    pub fuel_share: f64,
    pub incident: f64,
    pub near_miss: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            negative_profit: 35.0,
            cost_per_km_variance: 20.0,
            cost_per_hour_variance: 20.0,
            downtime: 15.0,
            fuel_share: 10.0,
            incident: 10.0,
            near_miss: 5.0,
        }
    }
}

impl RiskWeights {
    fn all(&self) -> [f64; 7] {
        [
            self.negative_profit,
            self.cost_per_km_variance,
            self.cost_per_hour_variance,
            self.downtime,
            self.fuel_share,
            self.incident,
            self.near_miss,
        ]
    }
}

/// Lowest score of each level; anything below `medium` is low.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLevelThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            critical: 75.0,
            high: 55.0,
            medium: 30.0,
        }
    }
}

pub fn default_metric_directions() -> BTreeMap<Metric, Direction> {
    Metric::ALL
        .iter()
        .map(|m| {
            let dir = match m {
                Metric::Revenue
                | Metric::Profit
                | Metric::ProfitMargin
                | Metric::Utilization => Direction::HigherIsBetter,
                _ => Direction::LowerIsBetter,
            };
            (*m, dir)
        })
        .collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_size: 5,
            labor_rate: 55.0,
            top_n: 10,
            default_owner: "Operations".to_string(),
            default_lead_days: 14,
            owner_by_dimension: BTreeMap::new(),
            metric_directions: default_metric_directions(),
            scoring_dimensions: vec![
                Dimension::Activity,
                Dimension::Contract,
                Dimension::Team,
                Dimension::Equipment,
            ],
            scored_metrics: vec![Metric::CostPerHour, Metric::CostPerKm, Metric::CostPerM3],
            target_tightening: 0.95,
            priority_thresholds: PriorityThresholds::default(),
            risk: RiskConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> CockpitResult<Self> {
        if !path.exists() {
            return Err(CockpitError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let mut cfg: EngineConfig = serde_json::from_str(&text)?;
        // a partial direction table overrides the defaults entry by entry
        let mut directions = default_metric_directions();
        directions.extend(std::mem::take(&mut cfg.metric_directions));
        cfg.metric_directions = directions;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CockpitResult<()> {
        if self.sample_size == 0 {
            return Err(CockpitError::InvalidConfig("sample_size must be > 0".into()));
        }
        if !(self.labor_rate >= 0.0) {
            return Err(CockpitError::InvalidConfig(format!(
                "labor_rate must be >= 0, got {}",
                self.labor_rate
            )));
        }
        if !(self.target_tightening > 0.0) {
            return Err(CockpitError::InvalidConfig(format!(
                "target_tightening must be > 0, got {}",
                self.target_tightening
            )));
        }
        if !(0..=MAX_LEAD_DAYS).contains(&self.default_lead_days) {
            return Err(CockpitError::InvalidConfig(format!(
                "default_lead_days must be within 0..={}, got {}",
                MAX_LEAD_DAYS, self.default_lead_days
            )));
        }
        let risk = &self.risk;
        let thresholds = [
            risk.variance_threshold,
            risk.downtime_threshold,
            risk.fuel_share_threshold,
        ];
        let weights = risk.weights.all();
        if thresholds.iter().chain(&weights).any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(CockpitError::InvalidConfig(
                "risk thresholds and weights must be finite and >= 0".into(),
            ));
        }
        let levels = &risk.levels;
        if !(levels.critical >= levels.high && levels.high >= levels.medium && levels.medium >= 0.0) {
            return Err(CockpitError::InvalidConfig(format!(
                "risk levels must satisfy critical >= high >= medium >= 0, got {} / {} / {}",
                levels.critical, levels.high, levels.medium
            )));
        }
        Ok(())
    }
}
