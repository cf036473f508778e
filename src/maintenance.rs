// Maintenance readiness KPIs from MIR events.
use crate::types::{MirEvent, MirEventType, Ratio};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirGroupBy {
    #[default]
    Equipment,
    EventType,
    All,
}

impl MirGroupBy {
    fn key_of(&self, e: &MirEvent) -> String {
        match self {
            MirGroupBy::Equipment => e.equipment_id.clone(),
            MirGroupBy::EventType => e.event_type.as_str().to_string(),
            MirGroupBy::All => "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceRow {
    pub group: String,
    pub event_count: usize,
    pub preventive_count: usize,
    pub corrective_count: usize,
    pub labor_hours: f64,
    pub parts_cost: f64,
    pub total_downtime_hours: f64,
    /// parts + labour hours at the configured rate
    pub total_maintenance_cost: f64,
    pub preventive_ratio: Ratio,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceMetrics {
    pub group_by: MirGroupBy,
    pub labor_rate: f64,
    /// Most downtime first.
    pub rows: Vec<MaintenanceRow>,
    pub totals: MaintenanceRow,
}

#[derive(Default)]
struct Acc {
    events: usize,
    preventive: usize,
    labor_hours: f64,
    parts_cost: f64,
    downtime: f64,
}

impl Acc {
    fn add(&mut self, e: &MirEvent) {
        self.events += 1;
        if e.event_type == MirEventType::Preventive {
            self.preventive += 1;
        }
        self.labor_hours += e.labor_hours;
        self.parts_cost += e.parts_cost;
        self.downtime += e.downtime_hours;
    }

    fn into_row(self, group: String, labor_rate: f64) -> MaintenanceRow {
        MaintenanceRow {
            group,
            event_count: self.events,
            preventive_count: self.preventive,
            corrective_count: self.events - self.preventive,
            labor_hours: self.labor_hours,
            parts_cost: self.parts_cost,
            total_downtime_hours: self.downtime,
            total_maintenance_cost: self.parts_cost + self.labor_hours * labor_rate,
            preventive_ratio: Ratio::of(self.preventive as f64, self.events as f64),
        }
    }
}

/// With no events the totals row has an undefined preventive ratio.
pub fn summarize(events: &[MirEvent], group_by: MirGroupBy, labor_rate: f64) -> MaintenanceMetrics {
    let mut groups: HashMap<String, Acc> = HashMap::new();
    let mut all = Acc::default();
    for e in events {
        groups.entry(group_by.key_of(e)).or_default().add(e);
        all.add(e);
    }

    let mut rows: Vec<MaintenanceRow> = groups
        .into_iter()
        .map(|(k, acc)| acc.into_row(k, labor_rate))
        .collect();
    rows.sort_by(|a, b| {
        b.total_downtime_hours
            .total_cmp(&a.total_downtime_hours)
            .then_with(|| a.group.cmp(&b.group))
    });

    debug!(events = events.len(), groups = rows.len(), "maintenance summarized");
    MaintenanceMetrics {
        group_by,
        labor_rate,
        rows,
        totals: all.into_row("*".to_string(), labor_rate),
    }
}
