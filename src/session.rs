// Session context and the end-to-end pipeline.
//
// The host owns a `Session` and passes it by reference into each stage;
// stages return fresh values and never keep references to it.
use crate::actions::{generate, merge_into_ledger, ActionDefaults, OpenActionIndex};
use crate::config::EngineConfig;
use crate::error::{CockpitError, CockpitResult};
use crate::kpi::{compute, summarize, weekly_cost_per_km, KpiSummary, MetricTable, OperationFilter, WeeklyPoint};
use crate::loader::{load_table, RawTable};
use crate::maintenance::{self, MaintenanceMetrics, MirGroupBy};
use crate::quality::{validate_as, Validated};
use crate::risk::{assess_all, level_counts, recommend, RiskAssessment, RiskLevel};
use crate::scenario::{self, ScenarioComparison, ScenarioParams};
use crate::targets::{derive_targets, read_targets, TargetSet};
use crate::types::{
    CapaAction, EffectiveStatus, MirEvent, OperationRecord, QualityReport, TargetRate,
    VarianceRecord,
};
use crate::variance::score_all;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

pub const OPERATIONS_FILE: &str = "operations.csv";
pub const TARGETS_FILE: &str = "targets.csv";
pub const CAPA_FILE: &str = "capa.csv";
pub const MIR_FILE: &str = "mir_events.csv";

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub operations: Option<Validated<OperationRecord>>,
    pub mir: Option<Validated<MirEvent>>,
    pub capa_report: Option<QualityReport>,
    /// Uploaded target rates; empty means "derive from history".
    pub targets: Vec<TargetRate>,
    pub targets_skipped: usize,
    /// CAPA actions, uploaded and generated. People may edit statuses between runs.
    pub ledger: Vec<CapaAction>,
    pub scenarios: Vec<ScenarioComparison>,
}

/// What a directory load found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub reports: Vec<QualityReport>,
    pub targets_loaded: usize,
    pub targets_skipped: usize,
    pub missing_files: Vec<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_operations(&mut self, table: &RawTable, cfg: &EngineConfig) -> &QualityReport {
        let validated = validate_as::<OperationRecord>(table, cfg.sample_size);
        if validated.is_blocked() {
            warn!("operations dataset blocked by missing columns");
        }
        &self.operations.insert(validated).report
    }

    pub fn load_mir(&mut self, table: &RawTable, cfg: &EngineConfig) -> &QualityReport {
        let validated = validate_as::<MirEvent>(table, cfg.sample_size);
        if validated.is_blocked() {
            warn!("mir dataset blocked by missing columns");
        }
        &self.mir.insert(validated).report
    }

    /// Replaces the ledger with the accepted rows of an uploaded CAPA file.
    pub fn load_capa(&mut self, table: &RawTable, cfg: &EngineConfig) -> &QualityReport {
        let validated = validate_as::<CapaAction>(table, cfg.sample_size);
        if validated.is_blocked() {
            warn!("capa dataset blocked by missing columns; ledger kept");
        } else {
            self.ledger = validated.records;
        }
        self.capa_report.insert(validated.report)
    }

    pub fn set_targets(&mut self, rates: Vec<TargetRate>, skipped: usize) {
        self.targets = rates;
        self.targets_skipped = skipped;
    }

    /// Load every known file in `dir`. Only `operations.csv` is mandatory.
    pub fn load_dir(&mut self, dir: &Path, cfg: &EngineConfig) -> CockpitResult<LoadSummary> {
        let mut summary = LoadSummary::default();

        let ops = load_table(&dir.join(OPERATIONS_FILE))?;
        summary.reports.push(self.load_operations(&ops, cfg).clone());

        let targets_path = dir.join(TARGETS_FILE);
        if targets_path.exists() {
            let (rates, skipped) = read_targets(File::open(&targets_path)?)?;
            summary.targets_loaded = rates.len();
            summary.targets_skipped = skipped;
            self.set_targets(rates, skipped);
        } else {
            self.set_targets(Vec::new(), 0);
            summary.missing_files.push(TARGETS_FILE.to_string());
        }

        match load_table(&dir.join(CAPA_FILE)) {
            Ok(t) => summary.reports.push(self.load_capa(&t, cfg).clone()),
            Err(CockpitError::FileNotFound(_)) => summary.missing_files.push(CAPA_FILE.to_string()),
            Err(e) => return Err(e),
        }
        match load_table(&dir.join(MIR_FILE)) {
            Ok(t) => summary.reports.push(self.load_mir(&t, cfg).clone()),
            Err(CockpitError::FileNotFound(_)) => summary.missing_files.push(MIR_FILE.to_string()),
            Err(e) => return Err(e),
        }

        info!(
            dir = %dir.display(),
            datasets = summary.reports.len(),
            missing = ?summary.missing_files,
            "session loaded"
        );
        Ok(summary)
    }

    /// Usable operations records, or none when the dataset is blocked.
    pub fn usable_operations(&self) -> CockpitResult<&[OperationRecord]> {
        let ops = self
            .operations
            .as_ref()
            .ok_or_else(|| CockpitError::MissingDataset("operations".into()))?;
        if ops.is_blocked() {
            return Ok(&[]);
        }
        Ok(&ops.records)
    }

    /// Merge generated proposals into the ledger.
    pub fn accept_proposals(&mut self, proposals: Vec<CapaAction>) -> usize {
        merge_into_ledger(&mut self.ledger, proposals)
    }

    /// Evaluate a scenario and keep it in the session's scenario library.
    pub fn run_scenario(&mut self, params: &ScenarioParams) -> CockpitResult<ScenarioComparison> {
        let cmp = scenario::run(self.usable_operations()?, params)?;
        self.scenarios.push(cmp.clone());
        Ok(cmp)
    }
}

/// Headline numbers of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub generated_at: NaiveDateTime,
    pub operations_used: usize,
    pub kpi: KpiSummary,
    pub targets_derived: bool,
    pub target_count: usize,
    pub target_conflicts: usize,
    pub variances: usize,
    pub unscored_variances: usize,
    pub proposals: usize,
    pub open_actions: usize,
    pub overdue_actions: usize,
    pub quality_errors: usize,
    pub quality_warnings: usize,
    /// Runs per risk level; levels with no run are absent.
    pub risk_levels: BTreeMap<RiskLevel, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CockpitOutput {
    pub kpi_tables: Vec<MetricTable>,
    pub weekly: Vec<WeeklyPoint>,
    pub targets: Vec<TargetRate>,
    pub variances: Vec<VarianceRecord>,
    pub proposals: Vec<CapaAction>,
    pub maintenance: Option<MaintenanceMetrics>,
    /// Riskiest runs first.
    pub recommendations: Vec<RiskAssessment>,
    pub summary: PipelineSummary,
}

/// validate (already done at load) -> compute -> score -> generate, plus the
/// maintenance summary.
///
/// Proposals are returned, not merged: the host decides whether to accept
/// them into the ledger.
pub fn run_pipeline(
    session: &Session,
    cfg: &EngineConfig,
    filter: &OperationFilter,
    now: NaiveDateTime,
) -> CockpitResult<CockpitOutput> {
    let all_ops = session.usable_operations()?;
    let ops = filter.apply(all_ops);

    let kpi_tables: Vec<MetricTable> = cfg
        .scoring_dimensions
        .iter()
        .map(|d| compute(&ops, &[*d]))
        .collect();

    let defaults = ActionDefaults::from_config(cfg);
    let targets_derived = session.targets.is_empty();
    let rates = if targets_derived {
        derive_targets(
            all_ops,
            &cfg.scoring_dimensions,
            &cfg.scored_metrics,
            cfg.target_tightening,
            |m| defaults.direction(m),
        )
    } else {
        session.targets.clone()
    };
    let target_set = TargetSet::from_rates(rates);

    let variances = score_all(&kpi_tables, &target_set, &cfg.scored_metrics);
    let risk = assess_all(&ops, &target_set, &cfg.risk);
    let recommendations = recommend(&risk, cfg.risk.top_n);

    let lookup = OpenActionIndex::from_actions(&session.ledger);
    let proposals = generate(&variances, cfg.top_n, &defaults, &lookup, now)?;

    let maintenance = session
        .mir
        .as_ref()
        .filter(|m| !m.is_blocked())
        .map(|m| maintenance::summarize(&m.records, MirGroupBy::Equipment, cfg.labor_rate));

    let reports: Vec<&QualityReport> = session
        .operations
        .iter()
        .map(|v| &v.report)
        .chain(session.mir.iter().map(|v| &v.report))
        .chain(session.capa_report.iter())
        .collect();

    let today = now.date();
    let summary = PipelineSummary {
        generated_at: now,
        operations_used: ops.len(),
        kpi: summarize(&ops),
        targets_derived,
        target_count: target_set.len(),
        target_conflicts: target_set.conflicts().len(),
        variances: variances.len(),
        unscored_variances: variances.iter().filter(|v| !v.is_scored()).count(),
        proposals: proposals.len(),
        open_actions: session
            .ledger
            .iter()
            .filter(|a| a.effective_status(today) != EffectiveStatus::Done)
            .count(),
        overdue_actions: session.ledger.iter().filter(|a| a.is_overdue(today)).count(),
        quality_errors: reports.iter().map(|r| r.error_count()).sum(),
        quality_warnings: reports.iter().map(|r| r.warning_count()).sum(),
        risk_levels: level_counts(&risk),
    };
    info!(
        operations = summary.operations_used,
        variances = summary.variances,
        proposals = summary.proposals,
        "pipeline finished"
    );

    Ok(CockpitOutput {
        kpi_tables,
        weekly: weekly_cost_per_km(&ops),
        targets: target_set.to_rates(),
        variances,
        proposals,
        maintenance,
        recommendations,
        summary,
    })
}
