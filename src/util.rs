// Parsing and small numeric helpers.
//
// Cell parsers are forgiving about CSV export noise (spaces, thousands
// separators) but never guess: anything doubtful comes back as `None` and
// becomes a quality finding upstream.
use crate::types::Ratio;
use chrono::{NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Number cell to `f64`.
///
/// Whitespace around the value is ignored and `,` is accepted only as a
/// thousands separator between groups of three digits (`1,234.5`). A decimal
/// comma (`7,5`), units (`12km`) and `NaN`/`inf` are rejected, never guessed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() || s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !s.contains(',') {
        return s.parse::<f64>().ok();
    }
    if !has_thousands_groups(s) {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok()
}

/// `[sign]d{1,3}(,ddd)+[.fraction]`
fn has_thousands_groups(s: &str) -> bool {
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (int_part, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if fraction.contains(',') {
        return false;
    }
    let mut groups = int_part.split(',');
    let lead_ok = groups
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()) && g.chars().all(|c| c.is_ascii_digit()));
    lead_ok && groups.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

pub fn parse_u32_safe(s: Option<&str>) -> Option<u32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<u32>().ok()
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    // exports often carry a midnight time component
    let day = s.split(['T', ' ']).next().unwrap_or(s);
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(day, f).ok())
}

/// Full timestamp, or a bare date read as midnight.
pub fn parse_datetime_safe(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| parse_date_safe(Some(s)).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

pub fn median(mut v: Vec<f64>) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        Some(v[mid])
    } else {
        Some((v[mid - 1] + v[mid]) / 2.0)
    }
}

/// Median of the defined ratios only.
pub fn median_ratio<I: IntoIterator<Item = Ratio>>(values: I) -> Ratio {
    match median(values.into_iter().filter_map(Ratio::value).collect()) {
        Some(m) => Ratio::Defined(m),
        None => Ratio::Undefined,
    }
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with locale-aware thousands separators (`1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_signed(n: f64, decimals: usize) -> String {
    if n > 0.0 {
        format!("+{}", format_number(n, decimals))
    } else {
        format_number(n, decimals)
    }
}

pub fn format_ratio(r: Ratio, decimals: usize) -> String {
    match r {
        Ratio::Defined(v) => format_number(v, decimals),
        Ratio::Undefined => "undefined".to_string(),
    }
}

pub fn format_pct(r: Ratio, decimals: usize) -> String {
    match r {
        Ratio::Defined(v) => format!("{}%", format_signed(v * 100.0, decimals)),
        Ratio::Undefined => "undefined".to_string(),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_tolerate_separators_but_not_text() {
        assert_eq!(parse_f64_safe(Some(" 1,234.5 ")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("-12,345,678")), Some(-12345678.0));
        assert_eq!(parse_f64_safe(Some("7.5")), Some(7.5));
        assert_eq!(parse_f64_safe(Some("12km")), None);
        assert_eq!(parse_f64_safe(Some("NaN")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn decimal_comma_and_broken_groups_are_rejected() {
        assert_eq!(parse_f64_safe(Some("7,5")), None);
        assert_eq!(parse_f64_safe(Some("1,23")), None);
        assert_eq!(parse_f64_safe(Some("1234,567")), None);
        assert_eq!(parse_f64_safe(Some(",100")), None);
        assert_eq!(parse_f64_safe(Some("1,234,5.0")), None);
        assert_eq!(parse_f64_safe(Some("1.2,3")), None);
    }

    #[test]
    fn dates_accept_common_export_shapes() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date_safe(Some("2024-03-05")), Some(d));
        assert_eq!(parse_date_safe(Some("2024/03/05")), Some(d));
        assert_eq!(parse_date_safe(Some("2024-03-05 00:00:00")), Some(d));
        assert_eq!(parse_date_safe(Some("2024-02-30")), None);
        assert_eq!(parse_date_safe(Some("yesterday")), None);
    }

    #[test]
    fn median_handles_even_and_empty() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(vec![]), None);
        assert_eq!(
            median_ratio(vec![Ratio::Undefined, Ratio::Defined(7.0)]),
            Ratio::Defined(7.0)
        );
    }

    #[test]
    fn formatting() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-12.5, 1), "-12.5");
        assert_eq!(format_signed(1.0, 2), "+1.00");
        assert_eq!(format_pct(Ratio::Defined(0.25), 1), "+25.0%");
        assert_eq!(format_ratio(Ratio::Undefined, 2), "undefined");
    }
}
