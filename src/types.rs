// Shared data model: input records, tagged ratios, grouping keys, variance
// and CAPA records, quality findings, and the formatted rows used for
// previews and CSV exports.
use crate::error::CockpitError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

/// Result of a division that may have a zero denominator.
///
/// Serialized as a plain number when defined and `null` (an empty CSV cell)
/// when undefined, so an undefined ratio is never confused with `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn of(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
            return Ratio::Undefined;
        }
        let v = numerator / denominator;
        if v.is_finite() {
            Ratio::Defined(v)
        } else {
            Ratio::Undefined
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(v),
            Ratio::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Ratio::Defined(_))
    }

    /// Arithmetic mean over the defined values only; undefined when none are.
    pub fn mean<I: IntoIterator<Item = Ratio>>(values: I) -> Ratio {
        let (sum, n) = values
            .into_iter()
            .filter_map(Ratio::value)
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n == 0 {
            Ratio::Undefined
        } else {
            Ratio::Defined(sum / n as f64)
        }
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Ratio {
        match self {
            Ratio::Defined(v) => Ratio::Defined(f(v)),
            Ratio::Undefined => Ratio::Undefined,
        }
    }
}

impl From<f64> for Ratio {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Ratio::Defined(v)
        } else {
            Ratio::Undefined
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Defined(v) => write!(f, "{}", v),
            Ratio::Undefined => f.write_str("undefined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Subsidiary,
    Activity,
    Contract,
    Team,
    #[serde(alias = "equipment_id")]
    Equipment,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Subsidiary,
        Dimension::Activity,
        Dimension::Contract,
        Dimension::Team,
        Dimension::Equipment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Subsidiary => "subsidiary",
            Dimension::Activity => "activity",
            Dimension::Contract => "contract",
            Dimension::Team => "team",
            Dimension::Equipment => "equipment",
        }
    }

    pub fn value_of<'a>(&self, r: &'a OperationRecord) -> &'a str {
        match self {
            Dimension::Subsidiary => &r.subsidiary,
            Dimension::Activity => &r.activity,
            Dimension::Contract => &r.contract,
            Dimension::Team => &r.team,
            Dimension::Equipment => &r.equipment_id,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subsidiary" => Ok(Dimension::Subsidiary),
            "activity" => Ok(Dimension::Activity),
            "contract" => Ok(Dimension::Contract),
            "team" => Ok(Dimension::Team),
            "equipment" | "equipment_id" => Ok(Dimension::Equipment),
            other => Err(CockpitError::UnknownDimension(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CostPerHour,
    CostPerKm,
    CostPerM3,
    TotalCost,
    Revenue,
    Profit,
    ProfitMargin,
    FuelShare,
    MaintenanceShare,
    LaborShare,
    Utilization,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::CostPerHour,
        Metric::CostPerKm,
        Metric::CostPerM3,
        Metric::TotalCost,
        Metric::Revenue,
        Metric::Profit,
        Metric::ProfitMargin,
        Metric::FuelShare,
        Metric::MaintenanceShare,
        Metric::LaborShare,
        Metric::Utilization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CostPerHour => "cost_per_hour",
            Metric::CostPerKm => "cost_per_km",
            Metric::CostPerM3 => "cost_per_m3",
            Metric::TotalCost => "total_cost",
            Metric::Revenue => "revenue",
            Metric::Profit => "profit",
            Metric::ProfitMargin => "profit_margin",
            Metric::FuelShare => "fuel_share",
            Metric::MaintenanceShare => "maintenance_share",
            Metric::LaborShare => "labor_share",
            Metric::Utilization => "utilization",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "margin" {
            return Ok(Metric::ProfitMargin);
        }
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or(CockpitError::UnknownMetric(s))
    }
}

/// Which way a metric moves when things get worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

impl Direction {
    /// `delta` is `actual - target`.
    pub fn is_unfavorable(&self, delta: f64) -> bool {
        match self {
            Direction::LowerIsBetter => delta > 0.0,
            Direction::HigherIsBetter => delta < 0.0,
        }
    }

    /// Move `value` to the better side by `factor` (0.95 asks for 5% better).
    pub fn tighten(&self, value: f64, factor: f64) -> f64 {
        let shrink = match self {
            Direction::LowerIsBetter => value >= 0.0,
            Direction::HigherIsBetter => value < 0.0,
        };
        if shrink {
            value * factor
        } else {
            value / factor
        }
    }
}

/// Tuple of (dimension, value) pairs identifying one aggregation group.
/// The empty key is the single global group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey(pub Vec<(Dimension, String)>);

impl GroupKey {
    pub fn of(record: &OperationRecord, dims: &[Dimension]) -> Self {
        GroupKey(
            dims.iter()
                .map(|d| (*d, d.value_of(record).to_string()))
                .collect(),
        )
    }

    pub fn single(&self) -> Option<(Dimension, &str)> {
        match self.0.as_slice() {
            [(d, v)] => Some((*d, v.as_str())),
            _ => None,
        }
    }

    pub fn dimension_label(&self) -> String {
        if self.0.is_empty() {
            return "all".to_string();
        }
        self.0
            .iter()
            .map(|(d, _)| d.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }

    pub fn key_label(&self) -> String {
        if self.0.is_empty() {
            return "*".to_string();
        }
        self.0
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub date: NaiveDate,
    pub subsidiary: String,
    pub activity: String,
    pub contract: String,
    pub team: String,
    pub equipment_id: String,
    pub hours_operated: f64,
    pub km_driven: f64,
    pub m3_moved: f64,
    pub revenue: f64,
    pub fuel_cost: f64,
    pub labor_cost: f64,
    pub maintenance_cost: f64,
    pub overhead_cost: f64,
    pub downtime_hours: f64,
    #[serde(default)]
    pub incident_count: u32,
    #[serde(default)]
    pub near_miss_count: u32,
}

impl OperationRecord {
    pub fn total_cost(&self) -> f64 {
        self.fuel_cost + self.labor_cost + self.maintenance_cost + self.overhead_cost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirEventType {
    Preventive,
    Corrective,
}

impl MirEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirEventType::Preventive => "preventive",
            MirEventType::Corrective => "corrective",
        }
    }
}

impl FromStr for MirEventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preventive" => Ok(MirEventType::Preventive),
            "corrective" => Ok(MirEventType::Corrective),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirEvent {
    pub equipment_id: String,
    pub event_date: NaiveDate,
    pub event_type: MirEventType,
    pub labor_hours: f64,
    pub parts_cost: f64,
    pub downtime_hours: f64,
    #[serde(default)]
    pub work_order_id: Option<String>,
    #[serde(default)]
    pub failure_mode: Option<String>,
}

/// Stored CAPA status. Overdue is never stored; see [`CapaAction::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapaStatus {
    Open,
    InProgress,
    Done,
}

impl CapaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapaStatus::Open => "open",
            CapaStatus::InProgress => "in_progress",
            CapaStatus::Done => "done",
        }
    }
}

impl fmt::Display for CapaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapaStatus {
    type Err = ();

    /// Accepts the ledger spellings used in uploads ("In progress", "Verified").
    /// An uploaded "overdue" is stored as open; overdue is recomputed from the due date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "open" | "overdue" => Ok(CapaStatus::Open),
            "in_progress" | "inprogress" => Ok(CapaStatus::InProgress),
            "done" | "verified" | "closed" => Ok(CapaStatus::Done),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Open,
    InProgress,
    Done,
    Overdue,
}

impl EffectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveStatus::Open => "open",
            EffectiveStatus::InProgress => "in_progress",
            EffectiveStatus::Done => "done",
            EffectiveStatus::Overdue => "overdue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            // the ledger template also carries "Critical"
            "high" | "critical" => Ok(Priority::High),
            _ => Err(()),
        }
    }
}

/// Identity of the variance an action was raised for, rendered as
/// `dimension:key:metric`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootCauseRef {
    pub dimension: Dimension,
    pub key: String,
    pub metric: Metric,
}

impl fmt::Display for RootCauseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.dimension, self.key, self.metric)
    }
}

impl FromStr for RootCauseRef {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || CockpitError::InvalidRootCause(s.to_string());
        let (dim, rest) = s.split_once(':').ok_or_else(bad)?;
        let (key, metric) = rest.rsplit_once(':').ok_or_else(bad)?;
        if key.is_empty() {
            return Err(bad());
        }
        Ok(RootCauseRef {
            dimension: dim.parse()?,
            key: key.to_string(),
            metric: metric.parse()?,
        })
    }
}

impl Serialize for RootCauseRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RootCauseRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapaAction {
    pub id: String,
    pub title: String,
    pub root_cause_ref: Option<RootCauseRef>,
    pub owner: String,
    pub due_date: NaiveDate,
    pub status: CapaStatus,
    pub priority: Option<Priority>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRate {
    pub dimension: Dimension,
    pub key: String,
    pub metric: Metric,
    pub target: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceFlag {
    Scored,
    /// Target exists but is zero.
    UndefinedTarget,
    /// No active target for this key while the dimension has targets for the metric.
    MissingTarget,
    /// The aggregated actual ratio has a zero denominator.
    UndefinedActual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceRecord {
    pub dimension: Dimension,
    pub key: String,
    pub metric: Metric,
    pub actual: Ratio,
    pub target: Option<f64>,
    pub absolute_delta: Ratio,
    pub relative_delta: Ratio,
    pub severity_score: f64,
    pub flag: VarianceFlag,
}

impl VarianceRecord {
    pub fn root_cause_ref(&self) -> RootCauseRef {
        RootCauseRef {
            dimension: self.dimension,
            key: self.key.clone(),
            metric: self.metric,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.flag == VarianceFlag::Scored
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Operations,
    Capa,
    Mir,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Operations => "operations",
            DatasetKind::Capa => "capa",
            DatasetKind::Mir => "mir",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRule {
    MissingColumn,
    ExtraColumn,
    TypeViolation,
    NullValue,
    NegativeValue,
    Duplicate,
    Inconsistent,
}

impl QualityRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityRule::MissingColumn => "missing_column",
            QualityRule::ExtraColumn => "extra_column",
            QualityRule::TypeViolation => "type_violation",
            QualityRule::NullValue => "null_value",
            QualityRule::NegativeValue => "negative_value",
            QualityRule::Duplicate => "duplicate",
            QualityRule::Inconsistent => "inconsistent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: QualityRule,
    pub severity: Severity,
    pub column: Option<String>,
    pub message: String,
    pub affected_row_count: usize,
    /// 1-based data row numbers (header excluded), first N only.
    pub sample_row_refs: Vec<usize>,
}

/// A row left out of aggregation, with every rule that excluded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedRow {
    pub row_ref: usize,
    pub rules: Vec<QualityRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub dataset: DatasetKind,
    pub total_rows: usize,
    pub accepted_rows: usize,
    /// A required column is missing: nothing from this dataset may be aggregated.
    pub blocking: bool,
    pub findings: Vec<Finding>,
    pub excluded: Vec<ExcludedRow>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    pub fn find(&self, rule: QualityRule, column: Option<&str>) -> Option<&Finding> {
        self.findings
            .iter()
            .find(|f| f.rule == rule && f.column.as_deref() == column)
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiReportRow {
    #[serde(rename = "Dimension")]
    #[tabled(rename = "Dimension")]
    pub dimension: String,
    #[serde(rename = "Key")]
    #[tabled(rename = "Key")]
    pub key: String,
    #[serde(rename = "Records")]
    #[tabled(rename = "Records")]
    pub records: usize,
    #[serde(rename = "Revenue")]
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[serde(rename = "TotalCost")]
    #[tabled(rename = "TotalCost")]
    pub total_cost: String,
    #[serde(rename = "Profit")]
    #[tabled(rename = "Profit")]
    pub profit: String,
    #[serde(rename = "Margin")]
    #[tabled(rename = "Margin")]
    pub margin: String,
    #[serde(rename = "CostPerHour")]
    #[tabled(rename = "CostPerHour")]
    pub cost_per_hour: String,
    #[serde(rename = "CostPerKm")]
    #[tabled(rename = "CostPerKm")]
    pub cost_per_km: String,
    #[serde(rename = "CostPerM3")]
    #[tabled(rename = "CostPerM3")]
    pub cost_per_m3: String,
    #[serde(rename = "Utilization")]
    #[tabled(rename = "Utilization")]
    pub utilization: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct VarianceReportRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Dimension")]
    #[tabled(rename = "Dimension")]
    pub dimension: String,
    #[serde(rename = "Key")]
    #[tabled(rename = "Key")]
    pub key: String,
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Actual")]
    #[tabled(rename = "Actual")]
    pub actual: String,
    #[serde(rename = "Target")]
    #[tabled(rename = "Target")]
    pub target: String,
    #[serde(rename = "Delta")]
    #[tabled(rename = "Delta")]
    pub absolute_delta: String,
    #[serde(rename = "DeltaPct")]
    #[tabled(rename = "DeltaPct")]
    pub relative_delta_pct: String,
    #[serde(rename = "Severity")]
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "Flag")]
    #[tabled(rename = "Flag")]
    pub flag: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ActionReportRow {
    #[serde(rename = "Id")]
    #[tabled(rename = "Id")]
    pub id: String,
    #[serde(rename = "Title")]
    #[tabled(rename = "Title")]
    pub title: String,
    #[serde(rename = "Owner")]
    #[tabled(rename = "Owner")]
    pub owner: String,
    #[serde(rename = "Priority")]
    #[tabled(rename = "Priority")]
    pub priority: String,
    #[serde(rename = "DueDate")]
    #[tabled(rename = "DueDate")]
    pub due_date: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MaintenanceReportRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Events")]
    #[tabled(rename = "Events")]
    pub events: usize,
    #[serde(rename = "DowntimeHours")]
    #[tabled(rename = "DowntimeHours")]
    pub downtime_hours: String,
    #[serde(rename = "MaintenanceCost")]
    #[tabled(rename = "MaintenanceCost")]
    pub maintenance_cost: String,
    #[serde(rename = "PreventiveRatio")]
    #[tabled(rename = "PreventiveRatio")]
    pub preventive_ratio: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RiskReportRow {
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: String,
    #[serde(rename = "Activity")]
    #[tabled(rename = "Activity")]
    pub activity: String,
    #[serde(rename = "Contract")]
    #[tabled(rename = "Contract")]
    pub contract: String,
    #[serde(rename = "Equipment")]
    #[tabled(rename = "Equipment")]
    pub equipment: String,
    #[serde(rename = "Level")]
    #[tabled(rename = "Level")]
    pub level: String,
    #[serde(rename = "Score")]
    #[tabled(rename = "Score")]
    pub score: String,
    #[serde(rename = "Profit")]
    #[tabled(rename = "Profit")]
    pub profit: String,
    #[serde(rename = "CostPerKm")]
    #[tabled(rename = "CostPerKm")]
    pub cost_per_km: String,
    #[serde(rename = "Reasons")]
    #[tabled(rename = "Reasons")]
    pub reasons: String,
    #[serde(rename = "RecommendedActions")]
    #[tabled(rename = "RecommendedActions")]
    pub recommended_actions: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct FindingReportRow {
    #[serde(rename = "Rule")]
    #[tabled(rename = "Rule")]
    pub rule: String,
    #[serde(rename = "Severity")]
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "Column")]
    #[tabled(rename = "Column")]
    pub column: String,
    #[serde(rename = "Rows")]
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[serde(rename = "Sample")]
    #[tabled(rename = "Sample")]
    pub sample: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct WeeklyReportRow {
    #[serde(rename = "WeekStart")]
    #[tabled(rename = "WeekStart")]
    pub week_start: String,
    #[serde(rename = "Records")]
    #[tabled(rename = "Records")]
    pub records: usize,
    #[serde(rename = "TotalCost")]
    #[tabled(rename = "TotalCost")]
    pub total_cost: String,
    #[serde(rename = "Km")]
    #[tabled(rename = "Km")]
    pub km_driven: String,
    #[serde(rename = "CostPerKm")]
    #[tabled(rename = "CostPerKm")]
    pub cost_per_km: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ScenarioReportRow {
    #[serde(rename = "Indicator")]
    #[tabled(rename = "Indicator")]
    pub indicator: String,
    #[serde(rename = "Base")]
    #[tabled(rename = "Base")]
    pub base: String,
    #[serde(rename = "Scenario")]
    #[tabled(rename = "Scenario")]
    pub scenario: String,
    #[serde(rename = "Delta")]
    #[tabled(rename = "Delta")]
    pub delta: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_zero_denominator_is_undefined() {
        assert_eq!(Ratio::of(50.0, 0.0), Ratio::Undefined);
        assert_eq!(Ratio::of(50.0, 10.0), Ratio::Defined(5.0));
    }

    #[test]
    fn ratio_mean_skips_undefined() {
        let m = Ratio::mean(vec![Ratio::Defined(2.0), Ratio::Undefined, Ratio::Defined(4.0)]);
        assert_eq!(m, Ratio::Defined(3.0));
        assert_eq!(Ratio::mean(vec![Ratio::Undefined]), Ratio::Undefined);
    }

    #[test]
    fn root_cause_ref_text_form() {
        let r: RootCauseRef = "contract:CTR:001:cost_per_km".parse().unwrap();
        assert_eq!(r.dimension, Dimension::Contract);
        assert_eq!(r.key, "CTR:001");
        assert_eq!(r.metric, Metric::CostPerKm);
        assert_eq!(r.to_string(), "contract:CTR:001:cost_per_km");
        assert!("contract:cost_per_km".parse::<RootCauseRef>().is_err());
    }

    #[test]
    fn status_parsing_accepts_ledger_spellings() {
        assert_eq!("In progress".parse::<CapaStatus>(), Ok(CapaStatus::InProgress));
        assert_eq!("Verified".parse::<CapaStatus>(), Ok(CapaStatus::Done));
        assert_eq!("overdue".parse::<CapaStatus>(), Ok(CapaStatus::Open));
        assert!("maybe".parse::<CapaStatus>().is_err());
    }

    #[test]
    fn direction_decides_unfavorable_side() {
        assert!(Direction::LowerIsBetter.is_unfavorable(1.0));
        assert!(!Direction::LowerIsBetter.is_unfavorable(-1.0));
        assert!(Direction::HigherIsBetter.is_unfavorable(-0.5));
    }
}
