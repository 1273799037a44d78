//! Build the [`TableDataSet`] from the resolved target tables.
//!
//! Every match gets a unit and a reporting date. The balance sheet and the
//! cash-flow statement are normalized; the balance sheet and the
//! interest-bearing debt table also keep a raw prospectus copy. When the
//! prospectus cash-flow table covers too few periods, both statements are
//! withheld so the consumer can take them from the data warehouse instead,
//! keeping the two consistent.

use crate::error::ItemError;
use crate::output::{Cell, TableContext, TableData, TableDataSet, TargetTableMatch};
use crate::pipeline::annotate::{date_from_cells, extract_date, extract_unit, unit_from_cells};
use crate::pipeline::normalize::{normalize, StatementKind};
use crate::targets::TargetTable;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Raw prospectus copy of the balance sheet.
pub const BALANCE_SHEET_RAW: &str = "资产负债表-募集";

/// Raw prospectus copy of the interest-bearing debt table.
pub const INTEREST_DEBT_RAW: &str = "有息负债-募集";

/// A cash-flow header narrower than this lacks a third period.
const MIN_CASH_FLOW_COLUMNS: usize = 4;

/// Assemble one entry per match, plus the raw copies.
pub fn build_table_data_set(
    matches: &[TargetTableMatch],
    contexts: &[TableContext],
) -> (TableDataSet, Vec<ItemError>) {
    let by_id: HashMap<&str, &TableContext> = contexts.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut set = TableDataSet::default();
    let mut failures = Vec::new();
    let mut withhold = false;

    for m in matches {
        let Some(ctx) = by_id.get(m.id.as_str()) else {
            warn!("Target {}: table {} not among the extracted tables", m.name, m.id);
            continue;
        };
        let mut table = annotated(&m.name, ctx);

        match TargetTable::from_name(&m.name) {
            Some(TargetTable::BalanceSheet) => {
                set.tables.insert(BALANCE_SHEET_RAW.to_string(), renamed(&table, BALANCE_SHEET_RAW));
                let n = normalize(StatementKind::BalanceSheet, &ctx.data, table.unit.as_deref());
                if let Some(reason) = n.fallback_reason {
                    failures.push(ItemError::NormalizationFailed {
                        table: m.name.clone(),
                        detail: reason,
                    });
                }
                table.unit = n.unit;
                table.data = n.rows;
                table.preceding_text = String::new();
                set.liability_totals.extend(n.liability_totals);
            }
            Some(TargetTable::InterestBearingDebt) => {
                set.tables.insert(INTEREST_DEBT_RAW.to_string(), renamed(&table, INTEREST_DEBT_RAW));
            }
            Some(TargetTable::CashFlow) => {
                let width = ctx.data.first().map_or(0, Vec::len);
                if width < MIN_CASH_FLOW_COLUMNS {
                    info!("Cash flow has {} header columns, withholding prospectus statements", width);
                    withhold = true;
                } else {
                    let n = normalize(StatementKind::CashFlow, &ctx.data, table.unit.as_deref());
                    if let Some(reason) = n.fallback_reason {
                        failures.push(ItemError::NormalizationFailed {
                            table: m.name.clone(),
                            detail: reason,
                        });
                    }
                    table.unit = n.unit;
                    table.data = n.rows;
                }
            }
            _ => {}
        }
        debug!(
            "Table {}: unit {:?}, date {:?}, {} rows",
            m.name,
            table.unit,
            table.date,
            table.data.len()
        );
        set.tables.insert(m.name.clone(), table);
    }

    if withhold {
        for target in [TargetTable::BalanceSheet, TargetTable::CashFlow] {
            set.tables.remove(target.name());
        }
        set.statements_withheld = true;
    }
    (set, failures)
}

/// A context as table data, with its unit and reporting date.
///
/// Both come from the preceding text first and the cells second. A unit
/// read from the text gains `、%` when the table has a share column.
fn annotated(name: &str, ctx: &TableContext) -> TableData {
    let mut unit = extract_unit(&ctx.preceding_text);
    if let Some(u) = unit.as_mut() {
        if !u.contains('%') && ctx.data.iter().flatten().any(|c| c.contains("占比")) {
            u.push_str("、%");
        }
    }
    TableData {
        name: name.to_string(),
        menu: ctx.menu.clone(),
        date: extract_date(&ctx.preceding_text).or_else(|| date_from_cells(&ctx.data)),
        unit: unit.or_else(|| unit_from_cells(&ctx.data)),
        preceding_text: ctx.preceding_text.clone(),
        data: ctx
            .data
            .iter()
            .map(|row| row.iter().map(|c| Cell::from(c.as_str())).collect())
            .collect(),
        raw: ctx.raw.clone(),
    }
}

fn renamed(table: &TableData, name: &str) -> TableData {
    TableData {
        name: name.to_string(),
        ..table.clone()
    }
}
