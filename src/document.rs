//! Parsed document model.
//!
//! A [`Document`] is the ordered list of body paragraphs and tables of a
//! `.docx`, plus the two side channels the heading logic needs: style
//! definitions (`word/styles.xml`) and numbering definitions
//! (`word/numbering.xml`). Paragraph indices are the join key used by every
//! later stage, so the paragraph list is never reordered or mutated after
//! parsing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outline level meaning "not a heading".
pub const UNSET_LEVEL: u32 = 100;

/// Horizontal alignment of a paragraph (`w:jc`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Both,
    Other(String),
}

impl Alignment {
    /// Map a `w:jc/@w:val` value. `start`/`end` are the bidi-aware spellings.
    pub fn from_val(val: &str) -> Self {
        match val.to_ascii_lowercase().as_str() {
            "left" | "start" => Alignment::Left,
            "center" => Alignment::Center,
            "right" | "end" => Alignment::Right,
            "both" | "distribute" => Alignment::Both,
            other => Alignment::Other(other.to_string()),
        }
    }
}

/// Paragraph-level style hints as written in `w:pPr`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphStyle {
    pub style_id: Option<String>,
    pub outline_level: Option<u32>,
    pub numbering_id: Option<String>,
    pub numbering_level: Option<String>,
    pub alignment: Option<Alignment>,
}

/// Raw handle of a table: the source XML of each `<w:tr>`, in order.
///
/// Kept so a report writer can re-emit the table with its original
/// formatting. Merging two fragments appends the rows of the second.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub rows: Vec<String>,
}

impl RawTable {
    pub fn new(rows: Vec<String>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Splice the rows of a continuation fragment onto this table.
    pub fn append(&mut self, other: &RawTable) {
        self.rows.extend(other.rows.iter().cloned());
    }
}

/// A table as a grid of cell texts, merged cells already expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGrid {
    pub rows: Vec<Vec<String>>,
    pub raw: RawTable,
}

impl TableGrid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows,
            raw: RawTable::default(),
        }
    }

    pub fn with_raw(mut self, raw: RawTable) -> Self {
        self.raw = raw;
        self
    }

    /// Column count of the widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Content of one body block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Block {
    Text(String),
    Table(TableGrid),
}

/// One body block (paragraph or table) with its style hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub block: Block,
    pub style: ParagraphStyle,
}

impl Paragraph {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            block: Block::Text(content.into()),
            style: ParagraphStyle::default(),
        }
    }

    pub fn table(rows: Vec<Vec<String>>) -> Self {
        Self {
            block: Block::Table(TableGrid::new(rows)),
            style: ParagraphStyle::default(),
        }
    }

    pub fn with_style_id(mut self, id: impl Into<String>) -> Self {
        self.style.style_id = Some(id.into());
        self
    }

    pub fn with_outline_level(mut self, level: u32) -> Self {
        self.style.outline_level = Some(level);
        self
    }

    pub fn with_numbering(mut self, num_id: impl Into<String>, ilvl: impl Into<String>) -> Self {
        self.style.numbering_id = Some(num_id.into());
        self.style.numbering_level = Some(ilvl.into());
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.style.alignment = Some(alignment);
        self
    }

    /// Text content, or `None` for a table.
    pub fn as_text(&self) -> Option<&str> {
        match &self.block {
            Block::Text(t) => Some(t),
            Block::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableGrid> {
        match &self.block {
            Block::Table(t) => Some(t),
            Block::Text(_) => None,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self.block, Block::Table(_))
    }
}

/// One `w:style` entry as declared, before inheritance is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDefinition {
    /// `outlineLvl` found anywhere in the style, if any.
    pub outline_level: Option<u32>,
    pub numbering_id: Option<String>,
    pub numbering_level: Option<String>,
    pub based_on: Option<String>,
}

/// Style definitions keyed by style id.
pub type StyleTable = HashMap<String, StyleDefinition>;

/// Numbering definitions: `(numId, ilvl)` → level-text template (`%1、`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberingTable {
    templates: HashMap<(String, String), String>,
}

impl NumberingTable {
    pub fn insert(&mut self, num_id: impl Into<String>, ilvl: impl Into<String>, text: impl Into<String>) {
        self.templates.insert((num_id.into(), ilvl.into()), text.into());
    }

    pub fn template(&self, num_id: &str, ilvl: &str) -> Option<&str> {
        self.templates
            .get(&(num_id.to_string(), ilvl.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// A parsed prospectus.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub paragraphs: Vec<Paragraph>,
    pub styles: StyleTable,
    pub numbering: NumberingTable,
}

impl Document {
    pub fn new(paragraphs: Vec<Paragraph>) -> Self {
        Self {
            paragraphs,
            ..Default::default()
        }
    }

    pub fn table_count(&self) -> usize {
        self.paragraphs.iter().filter(|p| p.is_table()).count()
    }

    /// Text of paragraph `idx`, or `None` when out of range or a table.
    pub fn text_at(&self, idx: usize) -> Option<&str> {
        self.paragraphs.get(idx).and_then(Paragraph::as_text)
    }
}
