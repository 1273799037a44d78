//! Output types produced by a run.
//!
//! Everything here is plain data built once per document and handed to the
//! caller. [`ProcessOutput`] serialises to the JSON payload the report
//! assembler consumes.

use crate::document::{Block, RawTable};
use crate::error::ItemError;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

// ── Headings ─────────────────────────────────────────────────────────────

/// A paragraph the heading detector accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub paragraph_index: usize,
    pub content: String,
    pub is_first_level: bool,
}

/// One entry of the merged outline. Level 0 is the shallowest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub paragraph_index: usize,
    pub content: String,
    pub level: u32,
}

/// Breadcrumb of one outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadcrumbEntry {
    pub paragraph_index: usize,
    pub title: String,
    /// Ancestor titles joined root → leaf with `-`.
    pub path: String,
    /// Levels of every node on the chain, root first.
    pub chain_levels: Vec<u32>,
}

// ── Sections ─────────────────────────────────────────────────────────────

/// One paragraph or table filed under a breadcrumb path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionItem {
    pub paragraph_index: usize,
    #[serde(flatten)]
    pub block: Block,
}

/// Breadcrumb path → ordered items, in document order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    entries: Vec<(String, Vec<SectionItem>)>,
    index: HashMap<String, usize>,
}

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to the bucket for `path`, creating it on first use.
    pub fn push(&mut self, path: &str, item: SectionItem) {
        match self.index.get(path) {
            Some(&i) => self.entries[i].1.push(item),
            None => {
                self.index.insert(path.to_string(), self.entries.len());
                self.entries.push((path.to_string(), vec![item]));
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&[SectionItem]> {
        self.index.get(path).map(|&i| self.entries[i].1.as_slice())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SectionItem])> {
        self.entries.iter().map(|(p, items)| (p.as_str(), items.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text paragraphs of a section joined with newlines; tables are skipped.
    pub fn text(&self, path: &str) -> Option<String> {
        self.get(path).map(|items| {
            items
                .iter()
                .filter_map(|item| match &item.block {
                    Block::Text(t) => Some(t.as_str()),
                    Block::Table(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Sections whose path matches any `include` pattern and no `exclude`
    /// pattern, in document order.
    pub fn find_by_keywords(&self, include: &[Regex], exclude: &[Regex]) -> Vec<(&str, &[SectionItem])> {
        self.iter()
            .filter(|(path, _)| {
                include.iter().any(|re| re.is_match(path)) && !exclude.iter().any(|re| re.is_match(path))
            })
            .collect()
    }
}

impl Serialize for Sections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, items) in &self.entries {
            map.serialize_entry(path, items)?;
        }
        map.end()
    }
}

// ── Tables ───────────────────────────────────────────────────────────────

/// A body table with the heading it sits under and the text just before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableContext {
    pub id: String,
    pub menu: String,
    pub preceding_text: String,
    /// First rows as tab/newline separated text, for prompts.
    pub content: String,
    pub data: Vec<Vec<String>>,
    pub raw: RawTable,
    /// Body positions of every fragment merged into this context.
    pub paragraph_indices: Vec<usize>,
}

/// LLM description of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFeature {
    pub id: String,
    pub table_type: String,
    pub section: String,
    pub title: String,
    pub header: Vec<String>,
    pub keywords: Vec<String>,
    pub time_series: Vec<String>,
}

/// A target table bound to the context id the arbiter picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTableMatch {
    pub name: String,
    pub id: String,
}

/// A table cell after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

/// One resolved target table ready for the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub name: String,
    pub menu: String,
    /// Reporting date as `YYYYMM`.
    pub date: Option<String>,
    pub unit: Option<String>,
    pub preceding_text: String,
    pub data: Vec<Vec<Cell>>,
    #[serde(skip)]
    pub raw: RawTable,
}

/// Total liabilities of one reporting period, in 亿.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilityTotal {
    pub amount: f64,
    pub period: String,
}

/// Resolved target tables keyed by semantic name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDataSet {
    pub tables: BTreeMap<String, TableData>,
    pub liability_totals: Vec<LiabilityTotal>,
    /// Balance sheet and cash flow were dropped because the cash-flow table
    /// covers too few periods; the consumer should use warehouse data.
    pub statements_withheld: bool,
}

impl TableDataSet {
    pub fn get(&self, name: &str) -> Option<&TableData> {
        self.tables.get(name)
    }

    /// Total liabilities for the period whose label normalizes to `date`
    /// (`YYYYMM`).
    pub fn liability_total_at(&self, date: &str) -> Option<f64> {
        self.liability_totals
            .iter()
            .find(|t| crate::pipeline::annotate::extract_date(&t.period).as_deref() == Some(date))
            .map(|t| t.amount)
    }
}

// ── Run summary ──────────────────────────────────────────────────────────

/// Counters and timings of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    pub paragraphs: usize,
    pub tables: usize,
    pub titles: usize,
    pub sections: usize,
    pub table_contexts: usize,
    /// Contexts left after the keyword pre-filter.
    pub candidate_tables: usize,
    pub features_extracted: usize,
    pub targets_resolved: usize,
    pub llm_calls: usize,
    pub llm_failures: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_duration_ms: u64,
    pub title_duration_ms: u64,
    pub feature_duration_ms: u64,
    pub selection_duration_ms: u64,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    pub titles: Vec<Title>,
    pub outline: Vec<OutlineNode>,
    pub breadcrumbs: Vec<BreadcrumbEntry>,
    pub sections: Sections,
    pub table_contexts: Vec<TableContext>,
    pub features: Vec<TableFeature>,
    pub matches: Vec<TargetTableMatch>,
    pub table_data: TableDataSet,
    pub failures: Vec<ItemError>,
    pub stats: ProcessStats,
}

impl ProcessOutput {
    /// Table contexts filed under the given heading text.
    pub fn contexts_under<'a>(&'a self, menu: &'a str) -> impl Iterator<Item = &'a TableContext> + 'a {
        self.table_contexts.iter().filter(move |c| c.menu == menu)
    }
}

/// Structure of a document, gathered without any LLM call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub paragraphs: usize,
    pub tables: usize,
    pub styles: usize,
    pub numbering_definitions: usize,
    /// Paragraphs carrying a metadata outline level.
    pub outline_entries: usize,
    /// Texts of the first-level headings in order: front matter such as
    /// `目录` or `声明`, then the `第X节` / `第X章` chapters.
    pub first_level_titles: Vec<String>,
}
