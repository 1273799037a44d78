//! Numeric normalization of the balance sheet and the cash-flow statement.
//!
//! Both statements are re-projected onto a fixed, ordered list of line
//! items, cleaned into numbers and converted to 亿. Normalization never
//! fails outward: any error degrades to the table as it came in, with the
//! reason kept in [`Normalized::fallback_reason`].

use crate::output::{Cell, LiabilityTotal};
use thiserror::Error;
use tracing::{debug, warn};

/// Unit every normalized statement is expressed in.
pub const CANONICAL_UNIT: &str = "亿";

/// Header of the label column after normalization.
const LABEL_HEADER: &str = "项目";

/// Liability total line of the balance sheet.
const LIABILITY_TOTAL: &str = "负债合计";

const ASSET_ITEMS: &[&str] = &[
    "货币资金",
    "结算备付金",
    "拆出资金",
    "应收保证金",
    "应收利息",
    "应收票据",
    "应收账款",
    "应收款项融资",
    "应收保费",
    "应收分保账款",
    "应收分保合同准备金",
    "应收出口退税",
    "应收补贴款",
    "内部应收款",
    "预付款项",
    "其他应收款",
    "存货",
    "买入返售金融资产",
    "交易性金融资产",
    "衍生金融资产",
    "一年内到期的非流动资产",
    "待处理流动资产损益",
    "其他流动资产",
    "流动资产合计",
    "发放贷款及垫款",
    "可供出售金融资产",
    "划分为持有待售的资产",
    "以公允价值计量且其变动计入其他综合收益的金融资产",
    "以摊余成本计量的金融资产",
    "债权投资",
    "其他债权投资",
    "其他权益工具投资",
    "其他非流动金融资产",
    "长期应收款",
    "长期股权投资",
    "待摊费用",
    "其他长期投资",
    "投资性房地产",
    "固定资产",
    "合同资产",
    "在建工程",
    "使用权资产",
    "工程物资",
    "生产性生物资产",
    "公益性生物资产",
    "油气资产",
    "无形资产",
    "开发支出",
    "商誉",
    "长期待摊费用",
    "股权分置流通权",
    "递延所得税资产",
    "其他非流动资产",
    "非流动资产合计",
    "资产总计",
];

const LIABILITY_ITEMS: &[&str] = &[
    "短期借款",
    "向中央银行借款",
    "吸收存款及同业存放",
    "拆入资金",
    "交易性金融负债",
    "衍生金融负债",
    "卖出回购金融资产款",
    "应付手续费及佣金",
    "应付票据",
    "应付账款",
    "预收款项",
    "合同负债",
    "应付职工薪酬",
    "应交税费",
    "应付利息",
    "应付股利",
    "其他应交款",
    "应付保证金",
    "内部应付款",
    "其他应付款",
    "预提费用",
    "预计流动负债",
    "应付分保账款",
    "保险合同准备金",
    "代理买卖证券款",
    "代理承销证券款",
    "国际票证结算",
    "国内票证结算",
    "一年内的递延收益",
    "应付短期债券",
    "一年内到期的非流动负债",
    "其他流动负债",
    "长期借款",
    "长期应付职工薪酬",
    "应付债券",
    "应付债券：优先股",
    "长期应付款",
    "预计非流动负债",
    "长期递延收益",
    "递延所得税负债",
    "其他非流动负债",
    "租赁负债",
    "担保责任赔偿准备金",
    "划分为持有待售的负债",
    LIABILITY_TOTAL,
];

const CASH_FLOW_ITEMS: &[&str] = &[
    "经营活动产生的现金流量净额",
    "投资活动产生的现金流量净额",
    "筹资活动产生的现金流量净额",
];

/// Total lines shown under their short name.
const DISPLAY_ALIASES: &[(&str, &str)] = &[("流动资产合计", "流动资产"), ("非流动资产合计", "非流动资产")];

/// Marker of a year-to-date column such as `2024年1-6月`.
const PARTIAL_YEAR_MARKER: &str = "年1-";

/// Statements with a fixed line-item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    BalanceSheet,
    CashFlow,
}

impl StatementKind {
    /// Line items kept, in output order.
    pub fn ontology(self) -> Vec<&'static str> {
        match self {
            StatementKind::BalanceSheet => ASSET_ITEMS.iter().chain(LIABILITY_ITEMS).copied().collect(),
            StatementKind::CashFlow => CASH_FLOW_ITEMS.to_vec(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("table has no rows")]
    EmptyTable,

    #[error("no known line items")]
    NoKnownItems,

    #[error("'{label}': cannot read '{value}' as a number")]
    BadNumber { label: String, value: String },
}

/// A statement after normalization, or the input when it degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub unit: Option<String>,
    /// Header row first.
    pub rows: Vec<Vec<Cell>>,
    /// Balance sheet only: the liability total of every period.
    pub liability_totals: Vec<LiabilityTotal>,
    pub fallback_reason: Option<String>,
}

/// Normalize a statement; degrades to the input on any error.
pub fn normalize(kind: StatementKind, data: &[Vec<String>], unit: Option<&str>) -> Normalized {
    let result = match kind {
        StatementKind::BalanceSheet => balance_sheet(data, unit),
        StatementKind::CashFlow => cash_flow(data, unit),
    };
    match result {
        Ok(normalized) => normalized,
        Err(e) => {
            warn!("{:?} normalization fell back to source data: {}", kind, e);
            Normalized {
                unit: unit.map(str::to_string),
                rows: data
                    .iter()
                    .map(|row| row.iter().map(|c| Cell::from(c.as_str())).collect())
                    .collect(),
                liability_totals: Vec::new(),
                fallback_reason: Some(e.to_string()),
            }
        }
    }
}

// ── Statements ───────────────────────────────────────────────────────────

fn balance_sheet(data: &[Vec<String>], unit: Option<&str>) -> Result<Normalized, NormalizeError> {
    let (header, rows) = prepare(data, StatementKind::BalanceSheet, |s| s)?;
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|mut row| {
            if let Some((_, short)) = DISPLAY_ALIASES.iter().find(|(long, _)| *long == row[0]) {
                row[0] = short.to_string();
            }
            row
        })
        .collect();
    let (header, rows) = drop_placeholder_columns(header, rows);

    let mut liability_totals = Vec::new();
    let mut output = Vec::new();
    for col in 1..header.len() {
        let mut kept = Vec::new();
        for row in &rows {
            let value = convert_unit(clean_number(&row[0], &row[col])?, unit);
            if value >= 1.0 {
                kept.push((row[0].as_str(), value));
            }
        }
        if let Some((_, amount)) = kept.iter().find(|(label, _)| *label == LIABILITY_TOTAL) {
            liability_totals.push(LiabilityTotal {
                amount: *amount,
                period: header[col].clone(),
            });
        }
        if col == 1 {
            output.push(vec![Cell::from(LABEL_HEADER), Cell::from(header[col].as_str())]);
            output.extend(
                kept.iter()
                    .map(|(label, value)| vec![Cell::from(*label), Cell::Number(*value)]),
            );
        }
    }
    debug!(
        "Balance sheet: {} line items, {} liability totals",
        output.len().saturating_sub(1),
        liability_totals.len()
    );

    Ok(Normalized {
        unit: output_unit(unit),
        rows: output,
        liability_totals,
        fallback_reason: None,
    })
}

fn cash_flow(data: &[Vec<String>], unit: Option<&str>) -> Result<Normalized, NormalizeError> {
    let (header, rows) = prepare(data, StatementKind::CashFlow, |s| s.replace("生产", "产生"))?;
    let (header, rows) = period_window(header, rows);
    let (header, rows) = drop_placeholder_columns(header, rows);

    let mut output = vec![header.iter().map(|h| Cell::from(h.as_str())).collect::<Vec<_>>()];
    for row in &rows {
        let mut out = vec![Cell::from(row[0].as_str())];
        for value in &row[1..] {
            out.push(Cell::Number(convert_unit(clean_number(&row[0], value)?, unit)));
        }
        output.push(out);
    }

    Ok(Normalized {
        unit: output_unit(unit),
        rows: output,
        liability_totals: Vec::new(),
        fallback_reason: None,
    })
}

/// Header and ontology rows in ontology order.
///
/// Cells are stripped of whitespace and passed through `fix`; rows whose
/// values are all placeholders are dropped; short rows are padded.
fn prepare(
    data: &[Vec<String>],
    kind: StatementKind,
    fix: impl Fn(String) -> String,
) -> Result<(Vec<String>, Vec<Vec<String>>), NormalizeError> {
    let clean = |cell: &String| fix(cell.chars().filter(|c| !c.is_whitespace()).collect());

    let (first, body) = data.split_first().ok_or(NormalizeError::EmptyTable)?;
    let mut header: Vec<String> = first.iter().map(&clean).collect();
    match header.first_mut() {
        Some(label) => *label = LABEL_HEADER.to_string(),
        None => return Err(NormalizeError::EmptyTable),
    }
    let width = header.len();

    let ontology = kind.ontology();
    let mut rows: Vec<(usize, Vec<String>)> = body
        .iter()
        .map(|row| {
            let mut row: Vec<String> = row.iter().take(width).map(&clean).collect();
            row.resize(width, String::new());
            row
        })
        .filter(|row| !row[1..].iter().all(|c| is_placeholder(c)))
        .filter_map(|row| ontology.iter().position(|item| *item == row[0]).map(|pos| (pos, row)))
        .collect();
    if rows.is_empty() {
        return Err(NormalizeError::NoKnownItems);
    }
    rows.sort_by_key(|(pos, _)| *pos);
    Ok((header, rows.into_iter().map(|(_, row)| row).collect()))
}

/// Keep the three most recent periods of a cash-flow statement.
///
/// Columns run newest first. A year-to-date column in second position is
/// dropped; otherwise, when the newest column is a full year, the oldest is
/// dropped; otherwise the first three periods are kept.
fn period_window(mut header: Vec<String>, mut rows: Vec<Vec<String>>) -> (Vec<String>, Vec<Vec<String>>) {
    let drop = if header.len() > 4 && header[2].contains(PARTIAL_YEAR_MARKER) {
        Some(2)
    } else if header.len() > 4 && !header[1].contains(PARTIAL_YEAR_MARKER) {
        Some(header.len() - 1)
    } else {
        None
    };
    match drop {
        Some(col) => {
            header.remove(col);
            for row in &mut rows {
                row.remove(col);
            }
        }
        None => {
            header.truncate(4);
            for row in &mut rows {
                row.truncate(4);
            }
        }
    }
    (header, rows)
}

/// Drop value columns holding nothing but placeholders.
fn drop_placeholder_columns(header: Vec<String>, rows: Vec<Vec<String>>) -> (Vec<String>, Vec<Vec<String>>) {
    let keep: Vec<bool> = (0..header.len())
        .map(|col| col == 0 || !rows.iter().all(|row| is_placeholder(&row[col])))
        .collect();
    let pick = |row: Vec<String>| -> Vec<String> {
        row.into_iter()
            .zip(&keep)
            .filter_map(|(cell, &k)| k.then_some(cell))
            .collect()
    };
    (pick(header), rows.into_iter().map(pick).collect())
}

// ── Cells ────────────────────────────────────────────────────────────────

fn is_placeholder(cell: &str) -> bool {
    matches!(cell, "" | "-" | "--" | "—" | "——")
}

/// Parse one amount cell.
///
/// Two dots mean the first is a mis-rendered thousands separator.
/// Placeholders read as zero, thousands separators are dropped and a
/// parenthesised amount is negative.
pub fn clean_number(label: &str, cell: &str) -> Result<f64, NormalizeError> {
    let mut text: String = cell.chars().filter(|c| !c.is_whitespace()).collect();
    if is_placeholder(&text) {
        return Ok(0.0);
    }
    if text.matches('.').count() == 2 {
        text = text.replacen('.', ",", 1);
    }
    let negative = (text.starts_with('(') && text.ends_with(')')) || (text.starts_with('（') && text.ends_with('）'));
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '，' | '(' | ')' | '（' | '）'))
        .collect();
    let value: f64 = digits.parse().map_err(|_| NormalizeError::BadNumber {
        label: label.to_string(),
        value: cell.to_string(),
    })?;
    Ok(if negative { -value } else { value })
}

/// Convert an amount in `unit` to 亿, rounded to two decimals. Amounts in an
/// unknown unit, or already in 亿, pass through.
pub fn convert_unit(value: f64, unit: Option<&str>) -> f64 {
    let divisor = match unit {
        Some(u) if u.contains('万') => 1e4,
        Some("元") => 1e8,
        _ => return value,
    };
    round2(value / divisor)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Unit label after conversion; an unknown source unit is kept.
fn output_unit(unit: Option<&str>) -> Option<String> {
    unit.map(|u| {
        if u.contains('万') || u.contains('亿') || u == "元" {
            CANONICAL_UNIT.to_string()
        } else {
            u.to_string()
        }
    })
}
