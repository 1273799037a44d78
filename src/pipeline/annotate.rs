//! Reporting unit and reporting date of a table.
//!
//! Both are read from the text before the table first and from its cells
//! second. Dates are normalized to `YYYYMM`; year-end forms map to month 12.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"万元、亩|亿元、亩|亿元、%|万元|亿元|单位：人|次/年|亿|万|元").unwrap());

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{4}\s*年度)|(\d{4}\s*年末)|(\d{4}\s*年\s*\d{1,2}\s*月)|(\d{4}\s*年\s*\d{1,2}\s*-\s*\d{1,2}\s*月)|(\d{4}-\d{1,2})|(\d{6})",
    )
    .unwrap()
});

static RE_YEAR_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})年(?:末|度)$").unwrap());
static RE_YEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})年(\d{1,2})月$").unwrap());
static RE_YEAR_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})年\d{1,2}-(\d{1,2})月$").unwrap());
static RE_DASHED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").unwrap());
static RE_COMPACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})(\d{2})$").unwrap());
static RE_TRAILING_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})年$").unwrap());

/// Last unit mentioned in `text`. Any headcount unit collapses to `人`.
pub fn extract_unit(text: &str) -> Option<String> {
    let unit = RE_UNIT.find_iter(text).last()?.as_str();
    Some(if unit.contains('人') { "人" } else { unit }.to_string())
}

/// Latest reporting date in `text` as `YYYYMM`.
///
/// Recognises `2023年度`, `2023年末`, `2024年6月`, `2024年1-6月` (the end
/// month counts), `2024-06` and `202406`. Text with none of these but
/// ending in `2023年` yields `202312`.
pub fn extract_date(text: &str) -> Option<String> {
    let mut found = false;
    let mut latest: Option<String> = None;
    for caps in RE_DATE.captures_iter(text) {
        found = true;
        let Some(m) = caps.iter().skip(1).flatten().next() else {
            continue;
        };
        if let Some(date) = uniform_date(m.as_str()) {
            if latest.as_deref().map_or(true, |l| date.as_str() > l) {
                latest = Some(date);
            }
        }
    }
    if found {
        return latest;
    }
    RE_TRAILING_YEAR
        .captures(text)
        .map(|caps| format!("{}12", &caps[1]))
}

/// One matched date phrase as `YYYYMM`; `None` when the month is invalid.
fn uniform_date(phrase: &str) -> Option<String> {
    let phrase: String = phrase.chars().filter(|c| !c.is_whitespace()).collect();
    let (year, month) = if let Some(c) = RE_YEAR_END.captures(&phrase) {
        (c[1].to_string(), 12)
    } else if let Some(c) = RE_YEAR_MONTH.captures(&phrase) {
        (c[1].to_string(), c[2].parse().ok()?)
    } else if let Some(c) = RE_YEAR_RANGE.captures(&phrase) {
        (c[1].to_string(), c[2].parse().ok()?)
    } else if let Some(c) = RE_DASHED.captures(&phrase) {
        (c[1].to_string(), c[2].parse().ok()?)
    } else if let Some(c) = RE_COMPACT.captures(&phrase) {
        (c[1].to_string(), c[2].parse().ok()?)
    } else {
        return None;
    };
    (1..=12u32)
        .contains(&month)
        .then(|| format!("{year}{month:02}"))
}

/// First unit found in the cells, row by row.
pub fn unit_from_cells(data: &[Vec<String>]) -> Option<String> {
    data.iter().flatten().find_map(|cell| extract_unit(cell))
}

/// First date found in the cells, row by row.
pub fn date_from_cells(data: &[Vec<String>]) -> Option<String> {
    data.iter().flatten().find_map(|cell| extract_date(cell))
}
