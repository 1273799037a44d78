//! Outline merge and breadcrumb navigation.
//!
//! The outline has two sources: paragraphs whose styles give them an
//! outline level (the "metadata outline") and paragraphs the heading
//! detector accepted. They are merged into one position-ordered list, the
//! front matter is folded into a synthetic root, and a stack walk turns the
//! list into a breadcrumb path per entry.

use crate::document::Document;
use crate::output::{BreadcrumbEntry, OutlineNode, Title};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Deepest level a styled paragraph may have to join the outline.
pub const OUTLINE_LEVEL_LIMIT: u32 = 10;

/// Level given to every detected heading the styles know nothing about,
/// first-level ones included.
pub const DETECTED_TITLE_LEVEL: u32 = 9;

/// Separator between titles in a breadcrumb path.
pub const PATH_SEPARATOR: &str = "-";

/// Merge the metadata outline with detected titles.
///
/// `levels` is aligned with `doc.paragraphs` (see
/// [`crate::pipeline::outline::paragraph_levels`]).
pub fn build_outline(
    doc: &Document,
    levels: &[Option<u32>],
    titles: &[Title],
    max_chars: usize,
    front_matter_title: &str,
) -> Vec<OutlineNode> {
    let mut outline: Vec<OutlineNode> = doc
        .paragraphs
        .iter()
        .zip(levels)
        .enumerate()
        .filter_map(|(idx, (p, level))| {
            let text = p.as_text()?;
            let level = (*level)?;
            (level < OUTLINE_LEVEL_LIMIT && text.chars().count() < max_chars).then(|| OutlineNode {
                paragraph_index: idx,
                content: text.to_string(),
                level,
            })
        })
        .collect();
    debug!("Metadata outline has {} entries", outline.len());

    let first_level: HashSet<usize> = titles
        .iter()
        .filter(|t| t.is_first_level)
        .map(|t| t.paragraph_index)
        .collect();
    normalize_levels(&mut outline, &first_level);

    let known: HashSet<usize> = outline.iter().map(|n| n.paragraph_index).collect();
    outline.extend(
        titles
            .iter()
            .filter(|t| !known.contains(&t.paragraph_index))
            .map(|t| OutlineNode {
                paragraph_index: t.paragraph_index,
                content: t.content.clone(),
                level: DETECTED_TITLE_LEVEL,
            }),
    );
    outline.sort_by_key(|n| n.paragraph_index);

    // Everything before the declaration page is cover and TOC.
    if let Some(pos) = outline.iter().position(|n| n.content.contains("声明")) {
        outline.drain(..pos);
    }

    outline.insert(
        0,
        OutlineNode {
            paragraph_index: 0,
            content: front_matter_title.to_string(),
            level: 0,
        },
    );
    outline
}

/// Force first-level titles to level 0, then demote every span between two
/// first-level titles that still holds a stray level-0 entry, so the stray
/// entry nests under its chapter.
fn normalize_levels(outline: &mut [OutlineNode], first_level: &HashSet<usize>) {
    for node in outline.iter_mut() {
        if first_level.contains(&node.paragraph_index) {
            node.level = 0;
        }
    }

    let boundaries: Vec<usize> = outline
        .iter()
        .enumerate()
        .filter(|(_, n)| first_level.contains(&n.paragraph_index))
        .map(|(i, _)| i)
        .collect();

    for (k, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(k + 1).copied().unwrap_or(outline.len());
        if outline[start + 1..end].iter().any(|n| n.level == 0) {
            debug!(
                "Demoting {} outline entries under '{}'",
                end - start - 1,
                outline[start].content
            );
            for node in outline[start + 1..end].iter_mut() {
                node.level += 1;
            }
        }
    }
}

/// Walk the outline with an ancestor stack.
///
/// A level-0 entry (or the first entry) resets the stack; a deeper entry is
/// pushed; otherwise entries at the same or deeper level are popped first.
pub fn breadcrumbs(outline: &[OutlineNode]) -> Vec<BreadcrumbEntry> {
    let mut chain: Vec<&OutlineNode> = Vec::new();
    let mut out = Vec::with_capacity(outline.len());

    for node in outline {
        match chain.last().map(|top| top.level) {
            None => chain = vec![node],
            Some(_) if node.level == 0 => chain = vec![node],
            Some(top_level) if node.level > top_level => chain.push(node),
            Some(_) => {
                while chain.last().is_some_and(|top| top.level >= node.level) {
                    chain.pop();
                }
                chain.push(node);
            }
        }
        out.push(BreadcrumbEntry {
            paragraph_index: node.paragraph_index,
            title: node.content.clone(),
            path: chain
                .iter()
                .map(|n| n.content.as_str())
                .collect::<Vec<_>>()
                .join(PATH_SEPARATOR),
            chain_levels: chain.iter().map(|n| n.level).collect(),
        });
    }
    out
}

/// Breadcrumb lookup by paragraph index; a later entry for the same index
/// wins.
pub fn breadcrumb_index(entries: &[BreadcrumbEntry]) -> HashMap<usize, &BreadcrumbEntry> {
    entries.iter().map(|e| (e.paragraph_index, e)).collect()
}
