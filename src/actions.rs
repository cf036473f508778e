// CAPA proposals from ranked variances, and the CAPA status lifecycle.
use crate::config::{EngineConfig, PriorityThresholds};
use crate::error::{CockpitError, CockpitResult};
use crate::types::{
    CapaAction, CapaStatus, Dimension, Direction, EffectiveStatus, Metric, RootCauseRef,
    VarianceRecord,
};
use crate::util::{format_number, format_signed};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Ownership, due date and priority rules applied to new proposals.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDefaults {
    pub default_owner: String,
    pub default_lead_days: i64,
    pub owner_by_dimension: BTreeMap<Dimension, String>,
    pub metric_directions: BTreeMap<Metric, Direction>,
    pub priority_thresholds: PriorityThresholds,
}

impl ActionDefaults {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            default_owner: cfg.default_owner.clone(),
            default_lead_days: cfg.default_lead_days,
            owner_by_dimension: cfg.owner_by_dimension.clone(),
            metric_directions: cfg.metric_directions.clone(),
            priority_thresholds: cfg.priority_thresholds,
        }
    }

    pub fn owner_for(&self, dimension: Dimension) -> &str {
        self.owner_by_dimension
            .get(&dimension)
            .map(String::as_str)
            .unwrap_or(&self.default_owner)
    }

    pub fn direction(&self, metric: Metric) -> Direction {
        self.metric_directions
            .get(&metric)
            .copied()
            .unwrap_or(Direction::LowerIsBetter)
    }

    /// Scored, and off target on the bad side for its metric.
    pub fn is_unfavorable(&self, v: &VarianceRecord) -> bool {
        v.is_scored()
            && v
                .absolute_delta
                .value()
                .is_some_and(|d| self.direction(v.metric).is_unfavorable(d))
    }
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Current state of the CAPA ledger as seen by the generator.
///
/// Read at call time, so a status changed by a person between two runs is
/// taken into account.
pub trait ActionLookup {
    /// An action for `root` exists and is not done.
    fn is_open(&self, root: &RootCauseRef) -> bool;

    /// Highest `AUTO-{yyyymmdd}-{nn}` sequence already used on `date`.
    fn last_sequence(&self, _date: NaiveDate) -> u32 {
        0
    }
}

/// Lookup built from a snapshot of the ledger.
#[derive(Debug, Clone, Default)]
pub struct OpenActionIndex {
    open: HashSet<RootCauseRef>,
    sequences: HashMap<NaiveDate, u32>,
}

impl OpenActionIndex {
    pub fn from_actions(actions: &[CapaAction]) -> Self {
        let mut index = OpenActionIndex::default();
        for a in actions {
            if a.status != CapaStatus::Done {
                if let Some(root) = &a.root_cause_ref {
                    index.open.insert(root.clone());
                }
            }
            if let Some((date, seq)) = parse_auto_id(&a.id) {
                let last = index.sequences.entry(date).or_insert(0);
                *last = (*last).max(seq);
            }
        }
        index
    }
}

impl ActionLookup for OpenActionIndex {
    fn is_open(&self, root: &RootCauseRef) -> bool {
        self.open.contains(root)
    }

    fn last_sequence(&self, date: NaiveDate) -> u32 {
        self.sequences.get(&date).copied().unwrap_or(0)
    }
}

pub fn auto_id(date: NaiveDate, seq: u32) -> String {
    format!("AUTO-{}-{:02}", date.format("%Y%m%d"), seq)
}

fn parse_auto_id(id: &str) -> Option<(NaiveDate, u32)> {
    let rest = id.strip_prefix("AUTO-")?;
    let (day, seq) = rest.split_once('-')?;
    let date = NaiveDate::parse_from_str(day, "%Y%m%d").ok()?;
    Some((date, seq.parse().ok()?))
}

fn title(v: &VarianceRecord, direction: Direction) -> String {
    let verb = match direction {
        Direction::LowerIsBetter => "Reduce",
        Direction::HigherIsBetter => "Improve",
    };
    let delta = v.absolute_delta.value().unwrap_or(0.0);
    let target = v.target.unwrap_or(0.0);
    format!(
        "{} {} on {} {} ({} vs target {})",
        verb,
        v.metric,
        v.dimension,
        v.key,
        format_signed(delta, 2),
        format_number(target, 2)
    )
}

/// Turn the worst unfavorable variances into open CAPA proposals.
///
/// `ranked` must already be in ranking order. The first `top_n` unfavorable
/// records are selected; any whose root cause already has an action that is
/// not done is skipped. The result depends only on the arguments.
///
/// Fails only when the lead time pushes the due date out of the calendar.
pub fn generate(
    ranked: &[VarianceRecord],
    top_n: usize,
    defaults: &ActionDefaults,
    lookup: &dyn ActionLookup,
    now: NaiveDateTime,
) -> CockpitResult<Vec<CapaAction>> {
    let today = now.date();
    let due_date = Duration::try_days(defaults.default_lead_days)
        .and_then(|lead| today.checked_add_signed(lead))
        .ok_or_else(|| {
            CockpitError::InvalidConfig(format!(
                "default_lead_days {} puts the due date out of range",
                defaults.default_lead_days
            ))
        })?;
    let mut seq = lookup.last_sequence(today);
    let mut seen: HashSet<RootCauseRef> = HashSet::new();
    let mut out = Vec::new();

    let selected = ranked
        .iter()
        .filter(|v| defaults.is_unfavorable(v))
        .take(top_n);
    for v in selected {
        let root = v.root_cause_ref();
        if lookup.is_open(&root) || !seen.insert(root.clone()) {
            debug!(root_cause = %root, "already tracked; no new action");
            continue;
        }
        seq += 1;
        out.push(CapaAction {
            id: auto_id(today, seq),
            title: title(v, defaults.direction(v.metric)),
            root_cause_ref: Some(root),
            owner: defaults.owner_for(v.dimension).to_string(),
            due_date,
            status: CapaStatus::Open,
            priority: Some(defaults.priority_thresholds.classify(v.severity_score)),
            created_at: now,
            updated_at: now,
        });
    }
    info!(proposed = out.len(), "capa proposals generated");
    Ok(out)
}

/// Append proposals whose id is not in the ledger yet. Returns how many were added.
pub fn merge_into_ledger(ledger: &mut Vec<CapaAction>, proposals: Vec<CapaAction>) -> usize {
    let known: HashSet<String> = ledger.iter().map(|a| a.id.clone()).collect();
    let before = ledger.len();
    ledger.extend(proposals.into_iter().filter(|p| !known.contains(&p.id)));
    ledger.len() - before
}

impl CapaAction {
    /// Forward-only moves: open -> in_progress -> done, or open -> done.
    pub fn transition(&mut self, to: CapaStatus, now: NaiveDateTime) -> CockpitResult<()> {
        let allowed = matches!(
            (self.status, to),
            (CapaStatus::Open, CapaStatus::InProgress)
                | (CapaStatus::Open, CapaStatus::Done)
                | (CapaStatus::InProgress, CapaStatus::Done)
        );
        if !allowed {
            return Err(CockpitError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn reopen(&mut self, now: NaiveDateTime) -> CockpitResult<()> {
        if self.status != CapaStatus::Done {
            return Err(CockpitError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: CapaStatus::Open.to_string(),
            });
        }
        self.status = CapaStatus::Open;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != CapaStatus::Done && self.due_date < today
    }

    pub fn effective_status(&self, today: NaiveDate) -> EffectiveStatus {
        if self.is_overdue(today) {
            return EffectiveStatus::Overdue;
        }
        match self.status {
            CapaStatus::Open => EffectiveStatus::Open,
            CapaStatus::InProgress => EffectiveStatus::InProgress,
            CapaStatus::Done => EffectiveStatus::Done,
        }
    }
}
