//! Outline-level recovery from styles and numbering.
//!
//! Word stores heading depth in three places: a paragraph's own
//! `outlineLvl`, the `outlineLvl` of its style (possibly inherited through
//! `basedOn` chains), and list numbering. This module folds them into one
//! level per paragraph, [`UNSET_LEVEL`] meaning "not a heading".

use crate::document::{Document, StyleTable, UNSET_LEVEL};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Longest `basedOn` chain followed before giving up.
pub const MAX_STYLE_DEPTH: usize = 20;

/// Level assigned to paragraphs that carry list numbering.
pub const NUMBERED_LEVEL: u32 = 9;

/// A style after inheritance is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleOutlineInfo {
    pub resolved_outline_level: u32,
    pub numbering_id: Option<String>,
    pub numbering_level: Option<String>,
    pub based_on: Option<String>,
}

/// Resolve the outline level of every style.
///
/// A style's level is the minimum over its own declared level and every
/// ancestor's. Chains that revisit a style or run deeper than
/// [`MAX_STYLE_DEPTH`] resolve to [`UNSET_LEVEL`].
pub fn resolve_styles(styles: &StyleTable) -> HashMap<String, StyleOutlineInfo> {
    styles
        .iter()
        .map(|(id, def)| {
            (
                id.clone(),
                StyleOutlineInfo {
                    resolved_outline_level: resolve_level(styles, id),
                    numbering_id: def.numbering_id.clone(),
                    numbering_level: def.numbering_level.clone(),
                    based_on: def.based_on.clone(),
                },
            )
        })
        .collect()
}

/// Resolved level of a single style.
pub fn resolve_level(styles: &StyleTable, style_id: &str) -> u32 {
    let mut level = UNSET_LEVEL;
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = style_id;

    for _ in 0..=MAX_STYLE_DEPTH {
        if !visited.insert(current) {
            debug!("Style '{}': inheritance cycle through '{}'", style_id, current);
            return UNSET_LEVEL;
        }
        let Some(def) = styles.get(current) else {
            // A dangling parent contributes nothing.
            return level;
        };
        level = level.min(def.outline_level.unwrap_or(UNSET_LEVEL));
        match def.based_on.as_deref() {
            Some(parent) => current = parent,
            None => return level,
        }
    }

    debug!("Style '{}': inheritance deeper than {}", style_id, MAX_STYLE_DEPTH);
    UNSET_LEVEL
}

/// Per-paragraph outline levels, aligned with `Document::paragraphs`.
///
/// Tables get `None`. A text paragraph takes its own `outlineLvl` when
/// present, otherwise its style's resolved level; numbered paragraphs are
/// capped at [`NUMBERED_LEVEL`].
pub fn paragraph_levels(doc: &Document) -> Vec<Option<u32>> {
    let resolved = resolve_styles(&doc.styles);

    doc.paragraphs
        .iter()
        .map(|p| {
            if p.is_table() {
                return None;
            }
            let style = &p.style;
            let mut level = UNSET_LEVEL;
            if let Some(own) = style.outline_level {
                level = level.min(own);
            } else if let Some(info) = style.style_id.as_deref().and_then(|id| resolved.get(id)) {
                level = level.min(info.resolved_outline_level);
            }
            if let (Some(num_id), Some(ilvl)) = (&style.numbering_id, &style.numbering_level) {
                if doc.numbering.template(num_id, ilvl).is_some() {
                    level = level.min(NUMBERED_LEVEL);
                }
            }
            Some(level)
        })
        .collect()
}
