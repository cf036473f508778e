use crate::error::{CockpitError, CockpitResult};
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// An untyped table: normalized headers and trimmed string cells.
///
/// Rows may be shorter than the header (flexible CSV); missing trailing
/// cells read as empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 0-based indices into `rows` of rows holding bytes that are not UTF-8.
    /// Their cells are lossy copies and must not be trusted.
    pub undecodable: Vec<usize>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers = headers.iter().map(|h| normalize_header(h)).collect();
        Self {
            headers,
            rows,
            undecodable: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
    }
}

// Common header spellings seen in field exports (English and French).
static HEADER_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("equip", "equipment_id"),
        ("equipment", "equipment_id"),
        ("equip_id", "equipment_id"),
        ("heure", "hours_operated"),
        ("hours", "hours_operated"),
        ("heures", "hours_operated"),
        ("km", "km_driven"),
        ("kilometres", "km_driven"),
        ("m3", "m3_moved"),
        ("volume_m3", "m3_moved"),
        ("revenus", "revenue"),
        ("fuel", "fuel_cost"),
        ("carburant", "fuel_cost"),
        ("main_oeuvre", "labor_cost"),
        ("labor", "labor_cost"),
        ("maintenance", "maintenance_cost"),
        ("overhead", "overhead_cost"),
        ("frais_fixes", "overhead_cost"),
        ("downtime", "downtime_hours"),
    ])
});

pub fn normalize_header(raw: &str) -> String {
    let key = raw.trim().trim_start_matches('\u{feff}').to_lowercase();
    match HEADER_SYNONYMS.get(key.as_str()) {
        Some(canonical) => canonical.to_string(),
        None => key,
    }
}

pub fn read_table<R: Read>(reader: R) -> CockpitResult<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| CockpitError::NotTabular(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CockpitError::NotTabular("no header row".to_string()));
    }

    let mut rows = Vec::new();
    let mut undecodable = Vec::new();
    for result in rdr.byte_records() {
        let record = result.map_err(|e| CockpitError::NotTabular(e.to_string()))?;
        let mut valid = true;
        let row: Vec<String> = record
            .iter()
            .map(|field| match std::str::from_utf8(field) {
                Ok(v) => v.trim().to_string(),
                Err(_) => {
                    valid = false;
                    String::from_utf8_lossy(field).trim().to_string()
                }
            })
            .collect();
        // fully blank lines are not data rows
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        if !valid {
            undecodable.push(rows.len());
        }
        rows.push(row);
    }

    let mut table = RawTable::new(headers, rows);
    table.undecodable = undecodable;
    debug!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        undecodable = table.undecodable.len(),
        "table read"
    );
    Ok(table)
}

pub fn load_table(path: &Path) -> CockpitResult<RawTable> {
    if !path.exists() {
        return Err(CockpitError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    read_table(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_normalized_through_synonyms() {
        let t = read_table("Date, Equip ,KM,Carburant\n2024-01-01,EQ-1,10,5\n".as_bytes()).unwrap();
        assert_eq!(t.headers, vec!["date", "equipment_id", "km_driven", "fuel_cost"]);
        assert_eq!(t.cell(0, 1), Some("EQ-1"));
    }

    #[test]
    fn capa_legacy_headers_are_not_renamed() {
        let t = read_table("capa_id,created_date\nCAPA-1,2024-01-01\n".as_bytes()).unwrap();
        assert_eq!(t.headers, vec!["capa_id", "created_date"]);
    }

    #[test]
    fn blank_lines_are_skipped_and_short_rows_kept() {
        let t = read_table("a,b,c\n1,2,3\n,,\n4,5\n".as_bytes()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(1, 2), None);
    }

    #[test]
    fn non_utf8_row_is_kept_and_marked() {
        let bytes: &[u8] = b"a,b\nx,1\n\xff\xfe,2\ny,3\n";
        let t = read_table(bytes).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.undecodable, vec![1]);
        assert_eq!(t.cell(0, 0), Some("x"));
        assert_eq!(t.cell(2, 1), Some("3"));
    }

    #[test]
    fn non_utf8_header_is_a_structural_error() {
        let bytes: &[u8] = b"a,\xffb\n1,2\n";
        match read_table(bytes) {
            Err(CockpitError::NotTabular(_)) => {}
            other => panic!("expected NotTabular, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            read_table("".as_bytes()),
            Err(CockpitError::NotTabular(_))
        ));
    }
}
