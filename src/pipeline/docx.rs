//! `.docx` reader: zip container → [`Document`].
//!
//! Reads three parts:
//!
//! * `word/document.xml`: body paragraphs and tables, in order (required)
//! * `word/styles.xml`  : style outline levels and inheritance (optional)
//! * `word/numbering.xml`: list level templates (optional)
//!
//! Paragraph text is the concatenation of its runs with surrounding
//! whitespace trimmed and inner spaces and tabs removed; empty paragraphs
//! are skipped. Table cells keep their text as written. Merged cells are
//! expanded: a horizontal span repeats its text across the spanned columns,
//! an empty vertical continuation copies the cell above it.

use crate::document::{
    Alignment, Block, Document, NumberingTable, Paragraph, ParagraphStyle, RawTable,
    StyleDefinition, StyleTable, TableGrid,
};
use crate::error::SplitError;
use roxmltree::Node;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, info};

const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const NUMBERING_PART: &str = "word/numbering.xml";

/// Read a `.docx` file from disk.
pub fn read_document(path: &Path) -> Result<Document, SplitError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SplitError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => SplitError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => SplitError::CorruptDocx {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;
    read_document_from(file, path)
}

/// Read a `.docx` from any seekable reader; `path` is only used in errors.
pub fn read_document_from<R: Read + Seek>(reader: R, path: &Path) -> Result<Document, SplitError> {
    let corrupt = |detail: String| SplitError::CorruptDocx {
        path: path.to_path_buf(),
        detail,
    };

    let mut zip = zip::ZipArchive::new(reader).map_err(|e| corrupt(e.to_string()))?;

    let body_xml = read_zip_text(&mut zip, DOCUMENT_PART)
        .map_err(corrupt)?
        .ok_or_else(|| SplitError::MissingPart {
            path: path.to_path_buf(),
            part: DOCUMENT_PART.to_string(),
        })?;
    let paragraphs = parse_body(&body_xml).map_err(corrupt)?;

    let styles = match read_zip_text(&mut zip, STYLES_PART).map_err(corrupt)? {
        Some(xml) => parse_styles(&xml).map_err(corrupt)?,
        None => StyleTable::new(),
    };
    let numbering = match read_zip_text(&mut zip, NUMBERING_PART).map_err(corrupt)? {
        Some(xml) => parse_numbering(&xml).map_err(corrupt)?,
        None => NumberingTable::default(),
    };

    let doc = Document {
        paragraphs,
        styles,
        numbering,
    };
    info!(
        "Parsed {}: {} blocks ({} tables), {} styles, {} numbering levels",
        path.display(),
        doc.paragraphs.len(),
        doc.table_count(),
        doc.styles.len(),
        doc.numbering.len()
    );
    Ok(doc)
}

fn read_zip_text<R: Read + Seek>(
    zip: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, String> {
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("{name}: {e}")),
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| format!("{name}: {e}"))?;
    Ok(Some(content))
}

// ── XML helpers ──────────────────────────────────────────────────────────

fn is_wml(node: Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

fn wml<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_wml(*n, name))
}

fn wml_val<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.attribute((WML_NS, "val"))
}

fn wml_attr<'a>(node: Node<'a, '_>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(wml_val)
}

/// First descendant (any depth) with the given local name.
fn wml_descendant<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| is_wml(*n, name))
}

/// Block-level children with structured-document-tag wrappers flattened.
fn block_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    let mut out = Vec::new();
    for child in node.children().filter(Node::is_element) {
        if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                out.extend(block_children(content));
            }
        } else {
            out.push(child);
        }
    }
    out
}

// ── Body ─────────────────────────────────────────────────────────────────

fn parse_body(xml: &str) -> Result<Vec<Paragraph>, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| format!("{DOCUMENT_PART}: {e}"))?;
    let body = doc
        .root_element()
        .children()
        .find(|n| is_wml(*n, "body"))
        .ok_or_else(|| format!("{DOCUMENT_PART}: no w:body element"))?;

    let mut paragraphs = Vec::new();
    for node in block_children(body) {
        if is_wml(node, "p") {
            let text = normalize_paragraph_text(&paragraph_text(node));
            if text.is_empty() {
                continue;
            }
            paragraphs.push(Paragraph {
                block: Block::Text(text),
                style: paragraph_style(node),
            });
        } else if is_wml(node, "tbl") {
            paragraphs.push(Paragraph {
                block: Block::Table(parse_table(node, xml)),
                style: ParagraphStyle::default(),
            });
        }
    }
    debug!("Body yielded {} blocks", paragraphs.len());
    Ok(paragraphs)
}

/// Raw run text of a paragraph: `w:t`, tabs and breaks of every run,
/// including runs inside hyperlinks, insertions and inline content controls.
fn paragraph_text(p: Node) -> String {
    let mut text = String::new();
    collect_run_text(p, &mut text);
    text
}

fn collect_run_text(node: Node, out: &mut String) {
    for child in node.children().filter(Node::is_element) {
        if is_wml(child, "r") {
            for part in child.children().filter(Node::is_element) {
                if is_wml(part, "t") {
                    out.push_str(part.text().unwrap_or_default());
                } else if is_wml(part, "tab") || is_wml(part, "ptab") {
                    out.push('\t');
                } else if is_wml(part, "br") || is_wml(part, "cr") {
                    out.push('\n');
                } else if is_wml(part, "noBreakHyphen") {
                    out.push('-');
                }
            }
        } else if is_wml(child, "hyperlink") || is_wml(child, "ins") || is_wml(child, "smartTag") {
            collect_run_text(child, out);
        } else if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                collect_run_text(content, out);
            }
        }
    }
}

fn normalize_paragraph_text(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != ' ' && *c != '\t').collect()
}

fn paragraph_style(p: Node) -> ParagraphStyle {
    let Some(ppr) = wml(p, "pPr") else {
        return ParagraphStyle::default();
    };
    let num_pr = wml(ppr, "numPr");
    ParagraphStyle {
        style_id: wml_attr(ppr, "pStyle").map(str::to_string),
        outline_level: wml_attr(ppr, "outlineLvl").and_then(|v| v.parse().ok()),
        numbering_id: num_pr.and_then(|n| wml_attr(n, "numId")).map(str::to_string),
        numbering_level: num_pr.and_then(|n| wml_attr(n, "ilvl")).map(str::to_string),
        alignment: wml_attr(ppr, "jc").map(Alignment::from_val),
    }
}

// ── Tables ───────────────────────────────────────────────────────────────

fn parse_table(tbl: Node, xml: &str) -> TableGrid {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut raw = Vec::new();
    // Text of the cell above, per grid column, for vertical continuations.
    let mut above: HashMap<usize, String> = HashMap::new();

    for tr in block_children(tbl).into_iter().filter(|n| is_wml(*n, "tr")) {
        raw.push(xml[tr.range()].to_string());

        let mut row = Vec::new();
        let mut grid_col = 0usize;
        for tc in block_children(tr).into_iter().filter(|n| is_wml(*n, "tc")) {
            let tc_pr = wml(tc, "tcPr");
            let span = tc_pr
                .and_then(|p| wml_attr(p, "gridSpan"))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            let v_merge = tc_pr.and_then(|p| wml(p, "vMerge")).is_some();

            let mut text = cell_text(tc);
            if v_merge && text.is_empty() {
                if let Some(prev) = above.get(&grid_col) {
                    text = prev.clone();
                }
            }
            for offset in 0..span {
                above.insert(grid_col + offset, text.clone());
                row.push(text.clone());
            }
            grid_col += span;
        }
        rows.push(row);
    }

    TableGrid {
        rows,
        raw: RawTable::new(raw),
    }
}

/// Cell text: the run text of each of its paragraphs, concatenated.
fn cell_text(tc: Node) -> String {
    block_children(tc)
        .into_iter()
        .filter(|n| is_wml(*n, "p"))
        .map(paragraph_text)
        .collect()
}

// ── Styles ───────────────────────────────────────────────────────────────

fn parse_styles(xml: &str) -> Result<StyleTable, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| format!("{STYLES_PART}: {e}"))?;
    let mut styles = StyleTable::new();
    for style in doc.root_element().children().filter(|n| is_wml(*n, "style")) {
        let Some(id) = style.attribute((WML_NS, "styleId")) else {
            continue;
        };
        let num_pr = wml_descendant(style, "numPr");
        styles.insert(
            id.to_string(),
            StyleDefinition {
                outline_level: wml_descendant(style, "outlineLvl")
                    .and_then(wml_val)
                    .and_then(|v| v.parse().ok()),
                numbering_id: num_pr.and_then(|n| wml_attr(n, "numId")).map(str::to_string),
                numbering_level: num_pr.and_then(|n| wml_attr(n, "ilvl")).map(str::to_string),
                based_on: wml_attr(style, "basedOn").map(str::to_string),
            },
        );
    }
    Ok(styles)
}

// ── Numbering ────────────────────────────────────────────────────────────

fn parse_numbering(xml: &str) -> Result<NumberingTable, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| format!("{NUMBERING_PART}: {e}"))?;
    let root = doc.root_element();

    let mut abstract_levels: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for abs in root.children().filter(|n| is_wml(*n, "abstractNum")) {
        let Some(abs_id) = abs.attribute((WML_NS, "abstractNumId")) else {
            continue;
        };
        let levels = abs
            .children()
            .filter(|n| is_wml(*n, "lvl"))
            .filter_map(|lvl| Some((lvl.attribute((WML_NS, "ilvl"))?, wml_attr(lvl, "lvlText")?)))
            .collect();
        abstract_levels.insert(abs_id, levels);
    }

    let mut table = NumberingTable::default();
    for num in root.children().filter(|n| is_wml(*n, "num")) {
        let Some(num_id) = num.attribute((WML_NS, "numId")) else {
            continue;
        };
        let Some(levels) = wml_attr(num, "abstractNumId").and_then(|a| abstract_levels.get(a)) else {
            continue;
        };
        for (ilvl, text) in levels {
            table.insert(num_id, *ilvl, *text);
        }
    }
    Ok(table)
}
