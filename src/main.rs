// Entry point and interactive menu of the cockpit host.
//
// - Option [1] writes a seeded demo dataset into the data directory.
// - Option [2] loads and validates the CSV files of the data directory.
// - Option [3] runs the pipeline, exports every table and previews them.
// - Option [4] evaluates a what-if scenario on the loaded operations.
// The loaded data lives in a `Session` owned by `main`.
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Parser;
use ops_cockpit::kpi::OperationFilter;
use ops_cockpit::scenario::ScenarioParams;
use ops_cockpit::synth::{self, SynthParams};
use ops_cockpit::types::QualityReport;
use ops_cockpit::{logging, output, reports, run_pipeline, util, CockpitResult, EngineConfig, Session};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ops-cockpit", about = "Operations KPI, variance and CAPA cockpit")]
struct Args {
    /// Directory holding operations.csv, targets.csv, capa.csv and mir_events.csv
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory receiving exports
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// JSON engine configuration; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed of the demo data generator
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Reference date (YYYY-MM-DD) for due dates and overdue checks
    #[arg(long, value_parser = parse_day)]
    today: Option<NaiveDate>,
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    util::parse_date_safe(Some(s)).ok_or_else(|| format!("not a date: {}", s))
}

struct Host {
    args: Args,
    cfg: EngineConfig,
    session: Session,
}

impl Host {
    fn now(&self) -> NaiveDateTime {
        let clock = Local::now().naive_local();
        match self.args.today {
            Some(day) => day.and_time(clock.time()),
            None => clock,
        }
    }
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

fn read_choice() -> String {
    read_line("Enter choice: ")
}

/// Empty input keeps `default`.
fn read_f64(label: &str, default: f64) -> f64 {
    loop {
        let raw = read_line(&format!("{} [{}]: ", label, default));
        if raw.is_empty() {
            return default;
        }
        match util::parse_f64_safe(Some(&raw)) {
            Some(v) => return v,
            None => println!("Please enter a number."),
        }
    }
}

fn prompt_back_to_menu() -> bool {
    loop {
        let resp = read_line("Back to menu (Y/N): ").to_uppercase();
        match resp.as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_quality(report: &QualityReport) {
    println!(
        "{}: {} rows, {} accepted, {} errors, {} warnings{}",
        report.dataset,
        util::format_int(report.total_rows as u64),
        util::format_int(report.accepted_rows as u64),
        report.error_count(),
        report.warning_count(),
        if report.blocking { " (BLOCKED)" } else { "" }
    );
    if !report.is_clean() {
        output::print_preview(&reports::finding_rows(report), 10);
    }
}

/// Option [1]
fn handle_generate(host: &Host) -> CockpitResult<()> {
    let params = SynthParams::new(host.args.seed, host.now().date());
    let data = synth::generate_all(&params, &host.cfg);
    synth::write_dataset(&host.args.data_dir, &data)?;
    println!(
        "Demo data written to {} ({} operations, {} targets, {} CAPA, {} MIR events)\n",
        host.args.data_dir.display(),
        util::format_int(data.operations.len() as u64),
        data.targets.len(),
        data.capa.len(),
        data.mir.len()
    );
    Ok(())
}

/// Option [2]
fn handle_load(host: &mut Host) -> CockpitResult<()> {
    let summary = host.session.load_dir(&host.args.data_dir, &host.cfg)?;
    println!("Processing datasets from {}...", host.args.data_dir.display());
    for r in &summary.reports {
        print_quality(r);
    }
    if summary.targets_loaded > 0 {
        println!(
            "targets: {} loaded, {} skipped",
            summary.targets_loaded, summary.targets_skipped
        );
    }
    if !summary.missing_files.is_empty() {
        println!(
            "Note: not found: {} (targets are derived from history when absent)",
            summary.missing_files.join(", ")
        );
    }
    println!();
    Ok(())
}

/// Option [3]
fn handle_pipeline(host: &mut Host) -> CockpitResult<()> {
    let now = host.now();
    let result = run_pipeline(&host.session, &host.cfg, &OperationFilter::default(), now)?;
    let out = &host.args.out_dir;
    std::fs::create_dir_all(out)?;

    println!("Running pipeline...");
    println!("Outputs saved to {}\n", out.display());

    for table in &result.kpi_tables {
        let rows = reports::kpi_rows(table);
        let label = table
            .dims
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join("_");
        let file = out.join(format!("kpi_by_{}.csv", label));
        output::write_csv(&file, &rows)?;
        output::preview_table(&format!("KPIs by {}", label), None, &rows, 3);
    }

    let weekly = reports::weekly_rows(&result.weekly);
    output::write_csv(&out.join("weekly_cost_per_km.csv"), &weekly)?;

    let variances = reports::variance_rows(&result.variances);
    output::write_csv(&out.join("variances.csv"), &variances)?;
    let note = if result.summary.targets_derived {
        "targets derived from historical medians"
    } else {
        "targets from targets.csv"
    };
    output::preview_table("Ranked variances", Some(note), &variances, 5);

    let proposals = reports::action_rows(&result.proposals, now.date());
    output::write_csv(&out.join("capa_proposals.csv"), &proposals)?;
    output::preview_table("CAPA proposals", None, &proposals, 5);

    let added = host.session.accept_proposals(result.proposals.clone());
    output::write_csv(&out.join("capa.csv"), &host.session.ledger)?;
    println!("{} actions added to the CAPA ledger\n", added);

    let risk = reports::risk_rows(&result.recommendations);
    output::write_csv(&out.join("recommendations.csv"), &risk)?;
    output::preview_table("Riskiest runs", Some("recommended follow-ups"), &risk, 5);

    if let Some(m) = &result.maintenance {
        let rows = reports::maintenance_rows(m);
        output::write_csv(&out.join("maintenance.csv"), &rows)?;
        output::preview_table("Maintenance by equipment", Some("most downtime first"), &rows, 5);
    }

    if let Some(ops) = &host.session.operations {
        output::write_json(&out.join("quality_operations.json"), &ops.report)?;
    }
    if let Some(mir) = &host.session.mir {
        output::write_json(&out.join("quality_mir.json"), &mir.report)?;
    }
    if let Some(capa) = &host.session.capa_report {
        output::write_json(&out.join("quality_capa.json"), capa)?;
    }
    output::write_json(&out.join("summary.json"), &result.summary)?;

    let s = &result.summary;
    println!("Summary (summary.json):");
    println!(
        "{{\"revenue\": {}, \"total_cost\": {}, \"profit\": {}, \"margin\": {}, \"overdue_actions\": {}}}\n",
        util::format_number(s.kpi.revenue, 2),
        util::format_number(s.kpi.total_cost, 2),
        util::format_number(s.kpi.profit, 2),
        util::format_pct(s.kpi.profit_margin, 1),
        s.overdue_actions
    );
    Ok(())
}

/// Option [4]
fn handle_scenario(host: &mut Host) -> CockpitResult<()> {
    let mut params = ScenarioParams::default();
    let name = read_line(&format!("Scenario name [{}]: ", params.name));
    if !name.is_empty() {
        params.name = name;
    }
    params.fuel = read_f64("Fuel multiplier", 1.0);
    params.maintenance = read_f64("Maintenance multiplier", 1.0);
    params.labor = read_f64("Labor multiplier", 1.0);
    params.overhead = read_f64("Overhead multiplier", 1.0);
    params.revenue = read_f64("Revenue multiplier", 1.0);
    params.volume = read_f64("Volume multiplier (km, m3)", 1.0);

    let cmp = host.session.run_scenario(&params)?;
    output::preview_table(
        &format!("Scenario: {}", cmp.params.name),
        Some("compared to base"),
        &reports::scenario_rows(&cmp),
        4,
    );
    let out = &host.args.out_dir;
    std::fs::create_dir_all(out)?;
    output::write_json(&out.join("scenarios.json"), &host.session.scenarios)?;
    Ok(())
}

fn report(result: CockpitResult<()>) {
    if let Err(e) = result {
        error!(error = %e, "operation failed");
        eprintln!("Error: {}\n", e);
    }
}

fn main() {
    logging::init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                std::process::exit(2);
            }
        },
        None => EngineConfig::default(),
    };
    info!(data_dir = %args.data_dir.display(), out_dir = %args.out_dir.display(), "cockpit started");

    let mut host = Host {
        args,
        cfg,
        session: Session::new(),
    };

    loop {
        println!("Select an option:");
        println!("[1] Generate demo data");
        println!("[2] Load & validate datasets");
        println!("[3] Run pipeline & export");
        println!("[4] What-if scenario");
        println!("[5] Exit\n");
        match read_choice().as_str() {
            "1" => report(handle_generate(&host)),
            "2" => report(handle_load(&mut host)),
            "3" => {
                println!();
                report(handle_pipeline(&mut host));
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "4" => report(handle_scenario(&mut host)),
            "5" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter 1 to 5.\n"),
        }
    }
}
