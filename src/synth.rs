// Seeded demo data: operations runs, MIR events, a CAPA ledger and
// targets derived from the generated history.
//
// Same seed and start date always give the same datasets. Keys that the
// validator treats as natural keys are never repeated.
use crate::actions::ActionDefaults;
use crate::config::EngineConfig;
use crate::error::CockpitResult;
use crate::output::write_csv;
use crate::session::{CAPA_FILE, MIR_FILE, OPERATIONS_FILE, TARGETS_FILE};
use crate::targets::derive_targets;
use crate::types::{
    CapaAction, CapaStatus, Dimension, Metric, MirEvent, MirEventType, OperationRecord, Priority,
    RootCauseRef, TargetRate,
};
use chrono::{Duration, NaiveDate};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

const ACTIVITIES: [&str; 4] = [
    "transport_inter_usines",
    "transport_copeaux",
    "construction_chemins",
    "chargement",
];
const ACTIVITY_WEIGHTS: [u32; 4] = [42, 28, 18, 12];
const TEAMS: [&str; 3] = ["Équipe A", "Équipe B", "Équipe C"];
const OWNERS: [&str; 4] = ["Opérations", "Maintenance", "Approvisionnement", "Finances"];
const FAILURE_MODES: [&str; 6] = [
    "hydraulique",
    "freins",
    "pneus",
    "moteur",
    "électrique",
    "structure",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SynthParams {
    pub seed: u64,
    /// Day after the last generated operations day.
    pub today: NaiveDate,
    pub n_days: u32,
    pub n_equipment: u32,
    pub n_contracts: u32,
    pub n_mir_events: u32,
    pub n_capa: u32,
    pub subsidiary: String,
}

impl SynthParams {
    pub fn new(seed: u64, today: NaiveDate) -> Self {
        Self {
            seed,
            today,
            n_days: 90,
            n_equipment: 12,
            n_contracts: 6,
            n_mir_events: 220,
            n_capa: 12,
            subsidiary: "Bécar inc.".to_string(),
        }
    }

    pub fn equipment_ids(&self) -> Vec<String> {
        (1..=self.n_equipment).map(|i| format!("EQ-{:03}", i)).collect()
    }

    fn contracts(&self) -> Vec<String> {
        (1..=self.n_contracts).map(|i| format!("CTR-{:03}", i)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthData {
    pub operations: Vec<OperationRecord>,
    pub targets: Vec<TargetRate>,
    pub capa: Vec<CapaAction>,
    pub mir: Vec<MirEvent>,
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

/// Uniform draw around `mean`, clamped at `floor`.
fn around(rng: &mut StdRng, mean: f64, spread: f64, floor: f64) -> f64 {
    (mean + rng.gen_range(-spread..=spread)).max(floor)
}

pub fn generate_operations(p: &SynthParams) -> Vec<OperationRecord> {
    let mut rng = StdRng::seed_from_u64(p.seed);
    let equipment = p.equipment_ids();
    let contracts = p.contracts();
    let activity_dist = WeightedIndex::new(ACTIVITY_WEIGHTS).expect("static weights are positive");
    let start = p.today - Duration::days(i64::from(p.n_days));

    let mut used: HashSet<(NaiveDate, usize, usize)> = HashSet::new();
    let mut rows = Vec::new();
    for day in 0..p.n_days {
        let date = start + Duration::days(i64::from(day));
        let runs = rng.gen_range(6..16);
        for _ in 0..runs {
            let eq = rng.gen_range(0..equipment.len());
            let ctr = rng.gen_range(0..contracts.len());
            let activity = ACTIVITIES[activity_dist.sample(&mut rng)];
            let team = TEAMS[rng.gen_range(0..TEAMS.len())];
            // one run per equipment and contract per day
            if !used.insert((date, eq, ctr)) {
                continue;
            }

            let hours = round_to(around(&mut rng, 8.0, 3.0, 0.5), 2);
            let (km, m3) = match activity {
                "transport_inter_usines" | "transport_copeaux" => (
                    round_to(around(&mut rng, 180.0, 100.0, 5.0), 1),
                    round_to(around(&mut rng, 85.0, 40.0, 2.0), 1),
                ),
                "construction_chemins" => (
                    round_to(around(&mut rng, 12.0, 10.0, 0.0), 1),
                    round_to(around(&mut rng, 25.0, 16.0, 0.0), 1),
                ),
                _ => (
                    round_to(around(&mut rng, 6.0, 6.0, 0.0), 1),
                    round_to(around(&mut rng, 120.0, 60.0, 5.0), 1),
                ),
            };

            let fuel_factor = if km > 0.0 { km / 180.0 } else { 0.6 };
            let fuel = round_to(around(&mut rng, 210.0, 110.0, 0.0) * fuel_factor, 2);
            let labor = round_to(around(&mut rng, 52.0, 13.0, 0.0) * hours, 2);
            let maint = round_to(around(&mut rng, 65.0, 40.0, 0.0) * hours / 8.0, 2);
            let overhead = round_to(around(&mut rng, 45.0, 20.0, 0.0) * hours / 8.0, 2);
            let downtime = round_to(around(&mut rng, 0.6, 1.2, 0.0).min(hours * 0.6), 2);

            let revenue = match activity {
                "transport_inter_usines" | "transport_copeaux" => 2.2 * km + 4.0 * m3 + 18.0 * hours,
                "construction_chemins" => 55.0 * hours + 1.2 * m3,
                _ => 28.0 * hours + 2.8 * m3,
            };

            rows.push(OperationRecord {
                date,
                subsidiary: p.subsidiary.clone(),
                activity: activity.to_string(),
                contract: contracts[ctr].clone(),
                team: team.to_string(),
                equipment_id: equipment[eq].clone(),
                hours_operated: hours,
                km_driven: km,
                m3_moved: m3,
                revenue: round_to(revenue, 2),
                fuel_cost: fuel,
                labor_cost: labor,
                maintenance_cost: maint,
                overhead_cost: overhead,
                downtime_hours: downtime,
                incident_count: u32::from(rng.gen_bool(0.015)),
                near_miss_count: u32::from(rng.gen_bool(0.045)),
            });
        }
    }
    rows
}

pub fn generate_mir(p: &SynthParams, equipment_ids: &[String]) -> Vec<MirEvent> {
    let mut rng = StdRng::seed_from_u64(p.seed.wrapping_add(7));
    let start = p.today - Duration::days(180);
    let mut used: HashSet<(usize, i64, MirEventType)> = HashSet::new();
    let mut rows = Vec::new();
    if equipment_ids.is_empty() {
        return rows;
    }
    for i in 0..p.n_mir_events {
        let eq = rng.gen_range(0..equipment_ids.len());
        let offset = rng.gen_range(0..180);
        let event_type = if rng.gen_bool(0.55) {
            MirEventType::Preventive
        } else {
            MirEventType::Corrective
        };
        let labor_hours = round_to(around(&mut rng, 3.2, 2.6, 0.5), 2);
        let parts_cost = round_to(around(&mut rng, 220.0, 260.0, 0.0), 2);
        let downtime_mean = match event_type {
            MirEventType::Corrective => 1.4,
            MirEventType::Preventive => 0.8,
        };
        let downtime_hours = round_to(around(&mut rng, downtime_mean, 1.5, 0.0), 2);
        let failure_mode = match event_type {
            MirEventType::Corrective => FAILURE_MODES[rng.gen_range(0..FAILURE_MODES.len())],
            MirEventType::Preventive => "inspection",
        };
        if !used.insert((eq, offset, event_type)) {
            continue;
        }
        rows.push(MirEvent {
            equipment_id: equipment_ids[eq].clone(),
            event_date: start + Duration::days(offset),
            event_type,
            labor_hours,
            parts_cost,
            downtime_hours,
            work_order_id: Some(format!("WO-{:05}", i)),
            failure_mode: Some(failure_mode.to_string()),
        });
    }
    rows
}

/// A small hand-maintained ledger: actions raised on sampled operations runs.
pub fn generate_capa(p: &SynthParams, operations: &[OperationRecord]) -> Vec<CapaAction> {
    let mut rng = StdRng::seed_from_u64(p.seed.wrapping_add(11));
    let priority_dist = WeightedIndex::new([20u32, 45, 35]).expect("static weights are positive");
    let status_dist = WeightedIndex::new([55u32, 25, 20]).expect("static weights are positive");
    let priorities = [Priority::Low, Priority::Medium, Priority::High];
    let statuses = [CapaStatus::Open, CapaStatus::InProgress, CapaStatus::Done];

    let n = (p.n_capa as usize).min(operations.len());
    let sample = operations.choose_multiple(&mut rng, n).cloned().collect::<Vec<_>>();
    sample
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let created_at = r.date.and_hms_opt(8, 0, 0).expect("08:00 is a valid time");
            let due_date = r.date + Duration::days(rng.gen_range(7..30));
            CapaAction {
                id: format!("CAPA-{:04}", i + 1),
                title: format!("Review cost variance on {} / {}", r.contract, r.equipment_id),
                root_cause_ref: Some(RootCauseRef {
                    dimension: Dimension::Equipment,
                    key: r.equipment_id.clone(),
                    metric: Metric::CostPerKm,
                }),
                owner: OWNERS[rng.gen_range(0..OWNERS.len())].to_string(),
                due_date,
                status: statuses[status_dist.sample(&mut rng)],
                priority: Some(priorities[priority_dist.sample(&mut rng)]),
                created_at,
                updated_at: created_at,
            }
        })
        .collect()
}

pub fn generate_all(p: &SynthParams, cfg: &EngineConfig) -> SynthData {
    let operations = generate_operations(p);
    let defaults = ActionDefaults::from_config(cfg);
    let targets = derive_targets(
        &operations,
        &cfg.scoring_dimensions,
        &cfg.scored_metrics,
        cfg.target_tightening,
        |m| defaults.direction(m),
    );
    let mir = generate_mir(p, &p.equipment_ids());
    let capa = generate_capa(p, &operations);
    info!(
        seed = p.seed,
        operations = operations.len(),
        targets = targets.len(),
        mir = mir.len(),
        capa = capa.len(),
        "synthetic datasets generated"
    );
    SynthData {
        operations,
        targets,
        capa,
        mir,
    }
}

/// Write the four datasets under the file names the session loads.
pub fn write_dataset(dir: &Path, data: &SynthData) -> CockpitResult<()> {
    std::fs::create_dir_all(dir)?;
    write_csv(&dir.join(OPERATIONS_FILE), &data.operations)?;
    write_csv(&dir.join(TARGETS_FILE), &data.targets)?;
    write_csv(&dir.join(CAPA_FILE), &data.capa)?;
    write_csv(&dir.join(MIR_FILE), &data.mir)?;
    info!(dir = %dir.display(), "synthetic datasets written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SynthParams {
        let mut p = SynthParams::new(42, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        p.n_days = 20;
        p
    }

    #[test]
    fn same_seed_same_data() {
        let cfg = EngineConfig::default();
        assert_eq!(generate_all(&params(), &cfg), generate_all(&params(), &cfg));
        let mut other = params();
        other.seed = 43;
        assert_ne!(generate_operations(&params()), generate_operations(&other));
    }

    #[test]
    fn operations_respect_record_invariants() {
        let ops = generate_operations(&params());
        assert!(!ops.is_empty());
        let mut keys = HashSet::new();
        for r in &ops {
            assert!(r.hours_operated >= 0.5);
            assert!(r.km_driven >= 0.0 && r.m3_moved >= 0.0);
            assert!(r.fuel_cost >= 0.0 && r.labor_cost >= 0.0);
            assert!(r.downtime_hours <= r.hours_operated);
            assert!(r.date < params().today);
            assert!(keys.insert((r.date, r.equipment_id.clone(), r.contract.clone())));
        }
    }

    #[test]
    fn capa_ledger_references_generated_equipment() {
        let data = generate_all(&params(), &EngineConfig::default());
        assert_eq!(data.capa.len(), 12);
        let equipment = params().equipment_ids();
        for a in &data.capa {
            let root = a.root_cause_ref.as_ref().unwrap();
            assert!(equipment.contains(&root.key));
            assert!(a.due_date > a.created_at.date());
        }
        assert!(!data.targets.is_empty());
        assert!(data.mir.iter().all(|e| e.downtime_hours >= 0.0));
    }
}
