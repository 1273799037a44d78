//! Section splitting by breadcrumb path.

use crate::document::Document;
use crate::output::{BreadcrumbEntry, SectionItem, Sections};
use crate::pipeline::breadcrumb::breadcrumb_index;
use tracing::debug;

/// File every paragraph and table under the breadcrumb active at its
/// position.
///
/// The active breadcrumb changes on every paragraph index that carries one;
/// paragraphs before the first breadcrumb belong to no section.
pub fn split_sections(doc: &Document, breadcrumbs: &[BreadcrumbEntry]) -> Sections {
    let index = breadcrumb_index(breadcrumbs);
    let mut sections = Sections::new();
    let mut current: Option<&str> = None;
    let mut dropped = 0usize;

    for (idx, para) in doc.paragraphs.iter().enumerate() {
        if let Some(entry) = index.get(&idx) {
            current = Some(entry.path.as_str());
        }
        let Some(path) = current else {
            dropped += 1;
            continue;
        };
        sections.push(
            path,
            SectionItem {
                paragraph_index: idx,
                block: para.block.clone(),
            },
        );
    }

    debug!(
        "Split {} paragraphs into {} sections ({} before the first heading)",
        doc.paragraphs.len(),
        sections.len(),
        dropped
    );
    sections
}
