// CSV / JSON exports and markdown previews on stdout.
use crate::error::CockpitResult;
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> CockpitResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "csv written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> CockpitResult<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    debug!(path = %path.display(), "json written");
    Ok(())
}

/// Titled markdown preview of the first `max_rows` rows.
pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("\n{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    print_preview(rows, max_rows);
}

pub fn print_preview<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}\n", render_preview(rows, max_rows));
}

/// Markdown table of the first `max_rows` rows, with a footer counting the
/// rows left out.
pub fn render_preview<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    let shown: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    let mut text = Table::new(shown).with(Style::markdown()).to_string();
    let hidden = rows.len().saturating_sub(max_rows);
    if hidden > 0 {
        text.push_str(&format!("\n... {} more row(s) in the export", hidden));
    }
    text
}
