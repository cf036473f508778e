// Schema & quality validation for the three uploaded datasets.
//
// Every anomaly becomes a `Finding`; nothing here returns an error. A row
// that is left out of aggregation is always listed in `QualityReport::excluded`
// together with the rules that excluded it.
use crate::loader::RawTable;
use crate::types::{
    CapaAction, CapaStatus, DatasetKind, ExcludedRow, Finding, MirEvent, MirEventType,
    OperationRecord, Priority, QualityReport, QualityRule, RootCauseRef, Severity,
};
use crate::util::{parse_date_safe, parse_datetime_safe, parse_f64_safe, parse_u32_safe};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Date,
    DateTime,
    NonNegativeNumber,
    Number,
    Count,
    Enum(&'static [&'static str]),
    /// `dimension:key:metric` link to a variance.
    Reference,
    Identifier,
    Text,
}

impl ColumnType {
    fn violation_message(&self) -> String {
        match self {
            ColumnType::Date | ColumnType::DateTime => "unparsable date".to_string(),
            ColumnType::NonNegativeNumber | ColumnType::Number => "non-numeric value".to_string(),
            ColumnType::Count => "not a whole count".to_string(),
            ColumnType::Enum(values) => format!("value not in [{}]", values.join(", ")),
            ColumnType::Reference => {
                "malformed reference (expected dimension:key:metric)".to_string()
            }
            ColumnType::Identifier => "control characters in identifier".to_string(),
            ColumnType::Text => "invalid text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub required: bool,
}

const fn req(name: &'static str, ty: ColumnType) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        required: true,
    }
}

const fn opt(name: &'static str, ty: ColumnType) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        required: false,
    }
}

#[derive(Debug)]
pub struct Schema {
    pub kind: DatasetKind,
    pub columns: &'static [ColumnSpec],
    pub natural_key: &'static [&'static str],
}

impl Schema {
    pub fn column(&self, name: &str) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().filter(|c| c.required).map(|c| c.name)
    }
}

const STATUS_VALUES: &[&str] = &[
    "open",
    "in_progress",
    "inprogress",
    "done",
    "overdue",
    "verified",
    "closed",
];
const PRIORITY_VALUES: &[&str] = &["low", "medium", "high", "critical"];
const EVENT_TYPE_VALUES: &[&str] = &["preventive", "corrective"];

pub static OPERATIONS_SCHEMA: Schema = Schema {
    kind: DatasetKind::Operations,
    columns: &[
        req("date", ColumnType::Date),
        req("subsidiary", ColumnType::Text),
        req("activity", ColumnType::Text),
        req("contract", ColumnType::Identifier),
        req("team", ColumnType::Text),
        req("equipment_id", ColumnType::Identifier),
        req("hours_operated", ColumnType::NonNegativeNumber),
        req("km_driven", ColumnType::NonNegativeNumber),
        req("m3_moved", ColumnType::NonNegativeNumber),
        req("revenue", ColumnType::Number),
        req("fuel_cost", ColumnType::NonNegativeNumber),
        req("labor_cost", ColumnType::NonNegativeNumber),
        req("maintenance_cost", ColumnType::NonNegativeNumber),
        req("overhead_cost", ColumnType::NonNegativeNumber),
        req("downtime_hours", ColumnType::NonNegativeNumber),
        opt("incident_count", ColumnType::Count),
        opt("near_miss_count", ColumnType::Count),
    ],
    natural_key: &["date", "equipment_id", "contract"],
};

pub static CAPA_SCHEMA: Schema = Schema {
    kind: DatasetKind::Capa,
    columns: &[
        req("id", ColumnType::Identifier),
        req("title", ColumnType::Text),
        opt("root_cause_ref", ColumnType::Reference),
        req("owner", ColumnType::Text),
        req("due_date", ColumnType::Date),
        req("status", ColumnType::Enum(STATUS_VALUES)),
        opt("priority", ColumnType::Enum(PRIORITY_VALUES)),
        req("created_at", ColumnType::DateTime),
        opt("updated_at", ColumnType::DateTime),
    ],
    natural_key: &["id"],
};

pub static MIR_SCHEMA: Schema = Schema {
    kind: DatasetKind::Mir,
    columns: &[
        req("equipment_id", ColumnType::Identifier),
        req("event_date", ColumnType::Date),
        req("event_type", ColumnType::Enum(EVENT_TYPE_VALUES)),
        req("labor_hours", ColumnType::NonNegativeNumber),
        req("parts_cost", ColumnType::NonNegativeNumber),
        req("downtime_hours", ColumnType::NonNegativeNumber),
        opt("work_order_id", ColumnType::Identifier),
        opt("failure_mode", ColumnType::Text),
    ],
    natural_key: &["equipment_id", "event_date", "event_type"],
};

fn normalize_enum(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// Rule broken by a non-empty cell, if any.
fn check_cell(ty: ColumnType, value: &str) -> Option<QualityRule> {
    let type_violation = Some(QualityRule::TypeViolation);
    match ty {
        ColumnType::Date => parse_date_safe(Some(value)).map_or(type_violation, |_| None),
        ColumnType::DateTime => parse_datetime_safe(Some(value)).map_or(type_violation, |_| None),
        ColumnType::NonNegativeNumber => match parse_f64_safe(Some(value)) {
            None => type_violation,
            Some(v) if v < 0.0 => Some(QualityRule::NegativeValue),
            Some(_) => None,
        },
        ColumnType::Number => parse_f64_safe(Some(value)).map_or(type_violation, |_| None),
        ColumnType::Count => match parse_u32_safe(Some(value)) {
            Some(_) => None,
            None if parse_f64_safe(Some(value)).is_some_and(|v| v < 0.0) => {
                Some(QualityRule::NegativeValue)
            }
            None => type_violation,
        },
        ColumnType::Enum(values) => {
            let v = normalize_enum(value);
            if values.iter().any(|allowed| *allowed == v) {
                None
            } else {
                type_violation
            }
        }
        ColumnType::Reference => value.parse::<RootCauseRef>().map_or(type_violation, |_| None),
        ColumnType::Identifier => {
            if value.chars().any(char::is_control) {
                type_violation
            } else {
                None
            }
        }
        ColumnType::Text => None,
    }
}

/// Read access to one data row by canonical column name.
pub struct RowView<'a> {
    table: &'a RawTable,
    row: usize,
    columns: &'a HashMap<&'static str, usize>,
}

impl<'a> RowView<'a> {
    /// Non-empty cell value.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        let col = *self.columns.get(name)?;
        self.table.cell(self.row, col).filter(|s| !s.is_empty())
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        parse_f64_safe(self.get(name))
    }

    pub fn count(&self, name: &str) -> Option<u32> {
        parse_u32_safe(self.get(name))
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        parse_date_safe(self.get(name))
    }

    pub fn datetime(&self, name: &str) -> Option<NaiveDateTime> {
        parse_datetime_safe(self.get(name))
    }
}

/// A record type that can be read from a validated table row.
pub trait Dataset: Sized {
    fn schema() -> &'static Schema;

    /// Called only for rows whose cells all passed their column checks.
    fn from_row(row: &RowView<'_>) -> Option<Self>;

    /// Column values that identify a row; compared as a whole, never joined.
    fn natural_key(&self) -> Vec<String>;

    /// Cross-field problems that are reported but keep the row: (column, message).
    fn consistency_issues(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }
}

impl Dataset for OperationRecord {
    fn schema() -> &'static Schema {
        &OPERATIONS_SCHEMA
    }

    fn from_row(row: &RowView<'_>) -> Option<Self> {
        Some(OperationRecord {
            date: row.date("date")?,
            subsidiary: row.text("subsidiary")?,
            activity: row.text("activity")?,
            contract: row.text("contract")?,
            team: row.text("team")?,
            equipment_id: row.text("equipment_id")?,
            hours_operated: row.number("hours_operated")?,
            km_driven: row.number("km_driven")?,
            m3_moved: row.number("m3_moved")?,
            revenue: row.number("revenue")?,
            fuel_cost: row.number("fuel_cost")?,
            labor_cost: row.number("labor_cost")?,
            maintenance_cost: row.number("maintenance_cost")?,
            overhead_cost: row.number("overhead_cost")?,
            downtime_hours: row.number("downtime_hours")?,
            incident_count: row.count("incident_count").unwrap_or(0),
            near_miss_count: row.count("near_miss_count").unwrap_or(0),
        })
    }

    fn natural_key(&self) -> Vec<String> {
        vec![
            self.date.to_string(),
            self.equipment_id.clone(),
            self.contract.clone(),
        ]
    }

    fn consistency_issues(&self) -> Vec<(&'static str, &'static str)> {
        if self.downtime_hours > self.hours_operated {
            vec![("downtime_hours", "downtime greater than operated hours")]
        } else {
            Vec::new()
        }
    }
}

impl Dataset for CapaAction {
    fn schema() -> &'static Schema {
        &CAPA_SCHEMA
    }

    fn from_row(row: &RowView<'_>) -> Option<Self> {
        let created_at = row.datetime("created_at")?;
        let root_cause_ref = match row.get("root_cause_ref") {
            Some(v) => Some(v.parse::<RootCauseRef>().ok()?),
            None => None,
        };
        let priority = match row.get("priority") {
            Some(v) => Some(v.parse::<Priority>().ok()?),
            None => None,
        };
        Some(CapaAction {
            id: row.text("id")?,
            title: row.text("title")?,
            root_cause_ref,
            owner: row.text("owner")?,
            due_date: row.date("due_date")?,
            status: row.get("status")?.parse::<CapaStatus>().ok()?,
            priority,
            created_at,
            updated_at: row.datetime("updated_at").unwrap_or(created_at),
        })
    }

    fn natural_key(&self) -> Vec<String> {
        vec![self.id.clone()]
    }

    fn consistency_issues(&self) -> Vec<(&'static str, &'static str)> {
        if self.due_date < self.created_at.date() {
            vec![("due_date", "due date before creation date")]
        } else {
            Vec::new()
        }
    }
}

impl Dataset for MirEvent {
    fn schema() -> &'static Schema {
        &MIR_SCHEMA
    }

    fn from_row(row: &RowView<'_>) -> Option<Self> {
        Some(MirEvent {
            equipment_id: row.text("equipment_id")?,
            event_date: row.date("event_date")?,
            event_type: row.get("event_type")?.parse::<MirEventType>().ok()?,
            labor_hours: row.number("labor_hours")?,
            parts_cost: row.number("parts_cost")?,
            downtime_hours: row.number("downtime_hours")?,
            work_order_id: row.text("work_order_id"),
            failure_mode: row.text("failure_mode"),
        })
    }

    fn natural_key(&self) -> Vec<String> {
        vec![
            self.equipment_id.clone(),
            self.event_date.to_string(),
            self.event_type.as_str().to_string(),
        ]
    }
}

/// Typed rows that survived validation, with their 1-based source row numbers.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub records: Vec<T>,
    pub row_refs: Vec<usize>,
    pub report: QualityReport,
}

impl<T> Validated<T> {
    pub fn is_blocked(&self) -> bool {
        self.report.blocking
    }
}

fn severity_of(rule: QualityRule) -> Severity {
    match rule {
        QualityRule::MissingColumn
        | QualityRule::TypeViolation
        | QualityRule::NullValue
        | QualityRule::NegativeValue => Severity::Error,
        QualityRule::ExtraColumn | QualityRule::Duplicate | QualityRule::Inconsistent => {
            Severity::Warning
        }
    }
}

fn push_finding(
    findings: &mut Vec<Finding>,
    rule: QualityRule,
    column: Option<&str>,
    message: String,
    rows: &[usize],
    sample_size: usize,
) {
    if rows.is_empty() {
        return;
    }
    findings.push(Finding {
        rule,
        severity: severity_of(rule),
        column: column.map(str::to_string),
        message,
        affected_row_count: rows.len(),
        sample_row_refs: rows.iter().copied().take(sample_size).collect(),
    });
}

fn column_finding(rule: QualityRule, column: &str, message: String, rows: &[usize], sample_size: usize) -> Finding {
    Finding {
        rule,
        severity: severity_of(rule),
        column: Some(column.to_string()),
        message,
        affected_row_count: rows.len(),
        sample_row_refs: rows.iter().copied().take(sample_size).collect(),
    }
}

/// Validate `table` against the schema of `T` and extract the usable records.
pub fn validate_as<T: Dataset>(table: &RawTable, sample_size: usize) -> Validated<T> {
    let schema = T::schema();
    let total = table.len();
    let all_rows: Vec<usize> = (1..=total).collect();
    let mut findings = Vec::new();

    // --- column level ---
    let mut columns: HashMap<&'static str, usize> = HashMap::new();
    let mut extras = Vec::new();
    for (idx, header) in table.headers.iter().enumerate() {
        match schema.column(header) {
            Some(spec) if !columns.contains_key(spec.name) => {
                columns.insert(spec.name, idx);
            }
            Some(_) => extras.push(column_finding(
                QualityRule::ExtraColumn,
                header,
                format!("repeated column '{}' ignored", header),
                &[],
                sample_size,
            )),
            None => extras.push(column_finding(
                QualityRule::ExtraColumn,
                header,
                format!("unexpected column '{}' ignored", header),
                &[],
                sample_size,
            )),
        }
    }

    let missing: Vec<&'static str> = schema
        .required_columns()
        .filter(|name| !columns.contains_key(name))
        .collect();
    for name in &missing {
        findings.push(column_finding(
            QualityRule::MissingColumn,
            name,
            format!("required column '{}' is missing", name),
            &all_rows,
            sample_size,
        ));
    }
    findings.extend(extras);

    if !missing.is_empty() {
        warn!(dataset = %schema.kind, missing = ?missing, "dataset blocked by missing columns");
        let excluded = all_rows
            .iter()
            .map(|&row_ref| ExcludedRow {
                row_ref,
                rules: vec![QualityRule::MissingColumn],
            })
            .collect();
        return Validated {
            records: Vec::new(),
            row_refs: Vec::new(),
            report: QualityReport {
                dataset: schema.kind,
                total_rows: total,
                accepted_rows: 0,
                blocking: true,
                findings,
                excluded,
            },
        };
    }

    let mut row_rules: Vec<Vec<QualityRule>> = vec![Vec::new(); total];

    // --- rows whose bytes are not text ---
    let undecodable: HashSet<usize> = table
        .undecodable
        .iter()
        .copied()
        .filter(|&row| row < total)
        .collect();
    let mut undecodable_refs: Vec<usize> = undecodable.iter().map(|row| row + 1).collect();
    undecodable_refs.sort_unstable();
    for &row in &undecodable {
        row_rules[row].push(QualityRule::TypeViolation);
    }
    push_finding(
        &mut findings,
        QualityRule::TypeViolation,
        None,
        "row is not valid UTF-8".to_string(),
        &undecodable_refs,
        sample_size,
    );

    // --- cell level, in schema column order ---
    for spec in schema.columns {
        let Some(&col) = columns.get(spec.name) else {
            continue;
        };
        let mut by_rule: BTreeMap<QualityRule, Vec<usize>> = BTreeMap::new();
        for (row, rules) in row_rules.iter_mut().enumerate() {
            if undecodable.contains(&row) {
                continue;
            }
            let value = table.cell(row, col).unwrap_or("");
            let rule = if value.is_empty() {
                spec.required.then_some(QualityRule::NullValue)
            } else {
                check_cell(spec.ty, value)
            };
            if let Some(rule) = rule {
                rules.push(rule);
                by_rule.entry(rule).or_default().push(row + 1);
            }
        }
        for (rule, rows) in by_rule {
            let message = match rule {
                QualityRule::NullValue => "required value missing".to_string(),
                QualityRule::NegativeValue => "negative value".to_string(),
                _ => spec.ty.violation_message(),
            };
            push_finding(&mut findings, rule, Some(spec.name), message, &rows, sample_size);
        }
    }

    // --- typed rows and cross-field checks ---
    let mut candidates: Vec<(usize, T)> = Vec::new();
    let mut unreadable = Vec::new();
    for (row, rules) in row_rules.iter_mut().enumerate() {
        if !rules.is_empty() {
            continue;
        }
        let view = RowView {
            table,
            row,
            columns: &columns,
        };
        match T::from_row(&view) {
            Some(record) => candidates.push((row, record)),
            None => {
                rules.push(QualityRule::TypeViolation);
                unreadable.push(row + 1);
            }
        }
    }
    push_finding(
        &mut findings,
        QualityRule::TypeViolation,
        None,
        "row could not be read".to_string(),
        &unreadable,
        sample_size,
    );

    let mut inconsistent: BTreeMap<&'static str, (&'static str, Vec<usize>)> = BTreeMap::new();
    for (row, record) in &candidates {
        for (column, message) in record.consistency_issues() {
            inconsistent
                .entry(column)
                .or_insert_with(|| (message, Vec::new()))
                .1
                .push(row + 1);
        }
    }
    for (column, (message, rows)) in inconsistent {
        push_finding(
            &mut findings,
            QualityRule::Inconsistent,
            Some(column),
            message.to_string(),
            &rows,
            sample_size,
        );
    }

    // --- duplicate natural keys: first occurrence wins ---
    let mut first_by_key: HashMap<Vec<String>, usize> = HashMap::new();
    let mut flagged_first: HashSet<usize> = HashSet::new();
    let mut duplicate_rows = Vec::new();
    let mut dropped: HashSet<usize> = HashSet::new();
    for (i, (row, record)) in candidates.iter().enumerate() {
        let key = record.natural_key();
        match first_by_key.get(&key) {
            Some(&first) => {
                if flagged_first.insert(first) {
                    duplicate_rows.push(candidates[first].0 + 1);
                }
                duplicate_rows.push(row + 1);
                dropped.insert(i);
                row_rules[*row].push(QualityRule::Duplicate);
            }
            None => {
                first_by_key.insert(key, i);
            }
        }
    }
    duplicate_rows.sort_unstable();
    push_finding(
        &mut findings,
        QualityRule::Duplicate,
        None,
        format!("duplicate natural key ({})", schema.natural_key.join("+")),
        &duplicate_rows,
        sample_size,
    );

    let mut records = Vec::with_capacity(candidates.len());
    let mut row_refs = Vec::with_capacity(candidates.len());
    for (i, (row, record)) in candidates.into_iter().enumerate() {
        if !dropped.contains(&i) {
            row_refs.push(row + 1);
            records.push(record);
        }
    }

    let excluded: Vec<ExcludedRow> = row_rules
        .into_iter()
        .enumerate()
        .filter(|(_, rules)| !rules.is_empty())
        .map(|(row, mut rules)| {
            rules.sort();
            rules.dedup();
            ExcludedRow {
                row_ref: row + 1,
                rules,
            }
        })
        .collect();

    debug!(
        dataset = %schema.kind,
        total,
        accepted = records.len(),
        excluded = excluded.len(),
        findings = findings.len(),
        "dataset validated"
    );

    Validated {
        report: QualityReport {
            dataset: schema.kind,
            total_rows: total,
            accepted_rows: records.len(),
            blocking: false,
            findings,
            excluded,
        },
        records,
        row_refs,
    }
}

/// Quality report only, for any dataset kind.
pub fn validate(kind: DatasetKind, table: &RawTable, sample_size: usize) -> QualityReport {
    match kind {
        DatasetKind::Operations => validate_as::<OperationRecord>(table, sample_size).report,
        DatasetKind::Capa => validate_as::<CapaAction>(table, sample_size).report,
        DatasetKind::Mir => validate_as::<MirEvent>(table, sample_size).report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::read_table;

    const OPS_HEADER: &str = "date,subsidiary,activity,contract,team,equipment_id,hours_operated,km_driven,m3_moved,revenue,fuel_cost,labor_cost,maintenance_cost,overhead_cost,downtime_hours";

    fn ops_table(rows: &[&str]) -> RawTable {
        let mut text = String::from(OPS_HEADER);
        for r in rows {
            text.push('\n');
            text.push_str(r);
        }
        read_table(text.as_bytes()).unwrap()
    }

    fn ops_row(date: &str, eq: &str, contract: &str, hours: &str) -> String {
        format!("{date},Sub,chargement,{contract},A,{eq},{hours},10,5,100,10,20,10,10,1")
    }

    #[test]
    fn clean_dataset_has_no_findings() {
        let t = ops_table(&[
            &ops_row("2024-01-01", "EQ-1", "CTR-1", "8"),
            &ops_row("2024-01-02", "EQ-1", "CTR-1", "8"),
        ]);
        let v = validate_as::<OperationRecord>(&t, 5);
        assert!(v.report.is_clean());
        assert_eq!(v.records.len(), 2);
        assert_eq!(v.row_refs, vec![1, 2]);
        assert_eq!(v.records[0].total_cost(), 50.0);
    }

    #[test]
    fn duplicate_key_keeps_first_and_reports_both_rows() {
        let t = ops_table(&[
            &ops_row("2024-01-01", "EQ-1", "CTR-1", "8"),
            &ops_row("2024-01-01", "EQ-1", "CTR-1", "6"),
        ]);
        let v = validate_as::<OperationRecord>(&t, 5);
        let dup: Vec<_> = v
            .report
            .findings
            .iter()
            .filter(|f| f.rule == QualityRule::Duplicate)
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].severity, Severity::Warning);
        assert_eq!(dup[0].affected_row_count, 2);
        assert_eq!(v.records.len(), 1);
        assert_eq!(v.records[0].hours_operated, 8.0);
        assert_eq!(
            v.report.excluded,
            vec![ExcludedRow {
                row_ref: 2,
                rules: vec![QualityRule::Duplicate]
            }]
        );
    }

    #[test]
    fn duplicate_detection_uses_parsed_dates() {
        let t = ops_table(&[
            &ops_row("2024-01-01", "EQ-1", "CTR-1", "8"),
            &ops_row("2024/01/01", "EQ-1", "CTR-1", "8"),
        ]);
        let v = validate_as::<OperationRecord>(&t, 5);
        assert_eq!(v.records.len(), 1);
    }

    #[test]
    fn missing_required_column_blocks_dataset() {
        let t = read_table("date,subsidiary\n2024-01-01,S\n2024-01-02,S\n".as_bytes()).unwrap();
        let v = validate_as::<OperationRecord>(&t, 5);
        assert!(v.is_blocked());
        assert!(v.records.is_empty());
        let f = v.report.find(QualityRule::MissingColumn, Some("km_driven")).unwrap();
        assert_eq!(f.severity, Severity::Error);
        assert_eq!(f.affected_row_count, 2);
        assert_eq!(v.report.excluded.len(), 2);
    }

    #[test]
    fn extra_column_is_a_warning_only() {
        let t = read_table(
            format!("{},colour\n{},red\n", OPS_HEADER, ops_row("2024-01-01", "EQ-1", "C", "8"))
                .as_bytes(),
        )
        .unwrap();
        let v = validate_as::<OperationRecord>(&t, 5);
        let f = v.report.find(QualityRule::ExtraColumn, Some("colour")).unwrap();
        assert_eq!(f.severity, Severity::Warning);
        assert_eq!(v.records.len(), 1);
        assert!(v.report.excluded.is_empty());
    }

    #[test]
    fn type_violations_are_excluded_counted_and_sampled() {
        let mut rows: Vec<String> = (1..=7)
            .map(|d| ops_row(&format!("2024-01-{:02}", d), "EQ-1", "C", "lots"))
            .collect();
        rows.push(ops_row("not-a-date", "EQ-2", "C", "8"));
        rows.push(ops_row("2024-02-01", "EQ-3", "C", "8"));
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let v = validate_as::<OperationRecord>(&ops_table(&refs), 5);

        let hours = v.report.find(QualityRule::TypeViolation, Some("hours_operated")).unwrap();
        assert_eq!(hours.affected_row_count, 7);
        assert_eq!(hours.sample_row_refs, vec![1, 2, 3, 4, 5]);
        let date = v.report.find(QualityRule::TypeViolation, Some("date")).unwrap();
        assert_eq!(date.sample_row_refs, vec![8]);

        assert_eq!(v.records.len(), 1);
        assert_eq!(v.row_refs, vec![9]);
        assert_eq!(v.report.excluded.len(), 8);
    }

    #[test]
    fn nulls_and_negatives_are_errors() {
        let t = ops_table(&[
            "2024-01-01,Sub,chargement,C,A,,8,10,5,100,10,20,10,10,1",
            "2024-01-02,Sub,chargement,C,A,EQ-1,8,-10,5,100,10,20,10,10,1",
        ]);
        let v = validate_as::<OperationRecord>(&t, 5);
        let null = v.report.find(QualityRule::NullValue, Some("equipment_id")).unwrap();
        assert_eq!(null.sample_row_refs, vec![1]);
        let neg = v.report.find(QualityRule::NegativeValue, Some("km_driven")).unwrap();
        assert_eq!(neg.severity, Severity::Error);
        assert!(v.records.is_empty());
    }

    #[test]
    fn excessive_downtime_is_flagged_but_kept() {
        let t = ops_table(&["2024-01-01,Sub,chargement,C,A,EQ-1,1,10,5,100,10,20,10,10,3"]);
        let v = validate_as::<OperationRecord>(&t, 5);
        let f = v.report.find(QualityRule::Inconsistent, Some("downtime_hours")).unwrap();
        assert_eq!(f.severity, Severity::Warning);
        assert_eq!(v.records.len(), 1);
    }

    #[test]
    fn every_dropped_row_is_named() {
        let t = ops_table(&[
            &ops_row("2024-01-01", "EQ-1", "C", "x"),
            &ops_row("2024-01-02", "EQ-1", "C", "8"),
            &ops_row("2024-01-02", "EQ-1", "C", "8"),
            &ops_row("2024-01-03", "", "C", "8"),
        ]);
        let v = validate_as::<OperationRecord>(&t, 1);
        let kept: HashSet<usize> = v.row_refs.iter().copied().collect();
        let named: HashSet<usize> = v.report.excluded.iter().map(|e| e.row_ref).collect();
        for r in 1..=t.len() {
            assert!(kept.contains(&r) ^ named.contains(&r), "row {r}");
        }
    }

    #[test]
    fn capa_rows_parse_status_and_reference() {
        let t = read_table(
            "id,title,root_cause_ref,owner,due_date,status,created_at\n\
             CAPA-1,Fix,contract:CTR-1:cost_per_km,Ops,2024-02-01,In progress,2024-01-01\n\
             CAPA-2,Fix,nonsense,Ops,2024-02-01,open,2024-01-01\n\
             CAPA-3,Fix,,Ops,2024-02-01,someday,2024-01-01\n"
                .as_bytes(),
        )
        .unwrap();
        let v = validate_as::<CapaAction>(&t, 5);
        assert_eq!(v.records.len(), 1);
        assert_eq!(v.records[0].status, CapaStatus::InProgress);
        assert!(v.records[0].root_cause_ref.is_some());
        assert!(v.report.find(QualityRule::TypeViolation, Some("root_cause_ref")).is_some());
        assert!(v.report.find(QualityRule::TypeViolation, Some("status")).is_some());
    }

    #[test]
    fn decimal_comma_is_a_type_violation() {
        let t = ops_table(&[
            &ops_row("2024-01-01", "EQ-1", "C", "\"7,5\""),
            &ops_row("2024-01-02", "EQ-1", "C", "\"1,250\""),
        ]);
        let v = validate_as::<OperationRecord>(&t, 5);
        let f = v.report.find(QualityRule::TypeViolation, Some("hours_operated")).unwrap();
        assert_eq!(f.sample_row_refs, vec![1]);
        assert_eq!(v.records.len(), 1);
        assert_eq!(v.records[0].hours_operated, 1250.0);
    }

    #[test]
    fn separator_inside_a_key_value_does_not_merge_rows() {
        let t = ops_table(&[
            &ops_row("2024-01-01", "X|Y", "Z", "8"),
            &ops_row("2024-01-01", "X", "Y|Z", "8"),
        ]);
        let v = validate_as::<OperationRecord>(&t, 5);
        assert!(v.report.find(QualityRule::Duplicate, None).is_none());
        assert_eq!(v.records.len(), 2);
    }

    #[test]
    fn undecodable_row_is_reported_and_the_rest_kept() {
        let mut bytes = format!("{}\n{}\n", OPS_HEADER, ops_row("2024-01-01", "EQ-1", "C", "8"))
            .into_bytes();
        bytes.extend_from_slice(b"2024-01-02,Sub,chargement,C,A,EQ-\xff,8,10,5,100,10,20,10,10,1\n");
        let t = read_table(bytes.as_slice()).unwrap();
        let v = validate_as::<OperationRecord>(&t, 5);
        let f = v.report.find(QualityRule::TypeViolation, None).unwrap();
        assert_eq!(f.sample_row_refs, vec![2]);
        assert_eq!(f.severity, Severity::Error);
        assert_eq!(v.row_refs, vec![1]);
        assert_eq!(
            v.report.excluded,
            vec![ExcludedRow {
                row_ref: 2,
                rules: vec![QualityRule::TypeViolation]
            }]
        );
    }

    #[test]
    fn mir_duplicates_use_equipment_date_and_type() {
        let t = read_table(
            "equipment_id,event_date,event_type,labor_hours,parts_cost,downtime_hours\n\
             EQ-1,2024-01-01,preventive,2,100,1\n\
             EQ-1,2024-01-01,corrective,2,100,1\n\
             EQ-1,2024-01-01,Preventive,3,50,1\n\
             EQ-2,2024-01-01,inspection,3,50,1\n"
                .as_bytes(),
        )
        .unwrap();
        let report = validate(DatasetKind::Mir, &t, 5);
        assert_eq!(report.accepted_rows, 2);
        assert_eq!(
            report.find(QualityRule::Duplicate, None).unwrap().sample_row_refs,
            vec![1, 3]
        );
        assert!(report.find(QualityRule::TypeViolation, Some("event_type")).is_some());
    }
}
