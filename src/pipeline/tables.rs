//! Table context extraction and the keyword pre-filter.
//!
//! One linear pass pairs every body table with the heading it sits under
//! and the last couple of text lines before it. A table met with no text
//! since the previous table is a continuation (a statement split over a
//! page break) and is merged into the previous context, subject to the
//! configured [`MergeGuard`](crate::config::MergeGuard).

use crate::config::SplitConfig;
use crate::document::{Document, TableGrid};
use crate::output::TableContext;
use crate::pipeline::title::is_page_furniture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// Preceding-text keywords of the financial tables worth describing.
pub const TABLE_KEYWORDS: &[&str] = &[
    "合并资产",
    "资产负债",
    "合并利润",
    "利润表",
    "损益",
    "合并现金",
    "现金流量",
    "外担保",
    "对外提供担保",
    "担保事项",
    "应收",
    "受限",
    "资产限制情况",
    "受到限制",
    "抵押",
    "质押",
    "有息",
    "信托",
    "委托贷款",
    "授信",
    "营业",
    "收入",
];

/// Preceding texts that mention a keyword but introduce a breakdown table.
static EXCLUDE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        "发行人受限货币资金",
        "营业成本具体构成情况如下",
        "经营性(其他应收|分类统计)",
        "政府补助的应收款项",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Menu marker of catch-all subsections.
const OTHER_MENU_MARKER: &str = "-其他";

/// Pair every table with its menu and preceding text.
///
/// `headings` are the detected heading texts in document order; the active
/// menu only advances when a paragraph equals the next expected heading.
/// Tables before the first heading are ignored.
pub fn extract_table_contexts(doc: &Document, headings: &[String], config: &SplitConfig) -> Vec<TableContext> {
    let window = config.preceding_window;
    let mut contexts: Vec<TableContext> = Vec::new();
    let mut recent: VecDeque<&str> = VecDeque::with_capacity(window + 1);
    let mut current_menu: Option<&str> = None;
    let mut pointer = 0usize;
    let mut merged = 0usize;

    for (idx, para) in doc.paragraphs.iter().enumerate() {
        match para.as_table() {
            None => {
                let Some(text) = para.as_text() else {
                    continue;
                };
                if headings.get(pointer).is_some_and(|h| h == text) {
                    current_menu = Some(text);
                    pointer = (pointer + 1).min(headings.len() - 1);
                    recent.clear();
                }
                if is_page_furniture(text) {
                    continue;
                }
                if text.starts_with("单位") && recent.back().is_some_and(|last| last.starts_with("单位")) {
                    continue;
                }
                recent.push_back(text);
                while recent.len() > window {
                    recent.pop_front();
                }
            }
            Some(grid) => {
                let Some(menu) = current_menu else {
                    debug!("Paragraph {}: table before the first heading, skipped", idx);
                    continue;
                };
                let continuation = recent.is_empty();
                let merge_into = contexts.last_mut().filter(|prev| {
                    continuation
                        && config.merge_guard.allows(
                            prev.data.len(),
                            prev.data.iter().map(Vec::len).max().unwrap_or(0),
                            grid.rows.len(),
                            grid.width(),
                        )
                });
                match merge_into {
                    Some(prev) => {
                        merge_fragment(prev, grid, idx, config.preview_rows);
                        merged += 1;
                    }
                    None => {
                        if continuation && !contexts.is_empty() {
                            debug!("Paragraph {}: merge refused by guard, new context", idx);
                        }
                        contexts.push(TableContext {
                            id: Uuid::new_v4().to_string(),
                            menu: menu.to_string(),
                            preceding_text: recent.iter().copied().collect::<Vec<_>>().join("\n"),
                            content: preview(&grid.rows, config.preview_rows),
                            data: grid.rows.clone(),
                            raw: grid.raw.clone(),
                            paragraph_indices: vec![idx],
                        });
                    }
                }
                recent.clear();
            }
        }
    }

    debug!(
        "Extracted {} table contexts ({} fragments merged)",
        contexts.len(),
        merged
    );
    contexts
}

fn merge_fragment(ctx: &mut TableContext, grid: &TableGrid, idx: usize, preview_rows: usize) {
    ctx.data.extend(grid.rows.iter().cloned());
    ctx.content = preview(&ctx.data, preview_rows);
    ctx.raw.append(&grid.raw);
    ctx.paragraph_indices.push(idx);
}

/// First `rows` rows, cells joined by tabs and rows by newlines.
fn preview(data: &[Vec<String>], rows: usize) -> String {
    data.iter()
        .take(rows)
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep contexts whose preceding text names a financial table.
///
/// Contexts under a catch-all "-其他" menu are dropped, as are preceding
/// texts matching an exclusion pattern.
pub fn filter_by_keywords(contexts: &[TableContext]) -> Vec<TableContext> {
    let kept: Vec<TableContext> = contexts
        .iter()
        .filter(|ctx| !ctx.menu.contains(OTHER_MENU_MARKER))
        .filter(|ctx| {
            TABLE_KEYWORDS.iter().any(|k| ctx.preceding_text.contains(k))
                && !EXCLUDE_PATTERNS.iter().any(|re| re.is_match(&ctx.preceding_text))
        })
        .cloned()
        .collect();
    debug!("Keyword filter kept {} of {} tables", kept.len(), contexts.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeGuard;
    use crate::document::{Paragraph, RawTable};

    fn rows(prefix: &str, n: usize) -> Vec<Vec<String>> {
        (0..n).map(|i| vec![format!("{prefix}{i}"), format!("{i}")]).collect()
    }

    fn raw_table(prefix: &str, n: usize) -> Paragraph {
        let grid = TableGrid::new(rows(prefix, n))
            .with_raw(RawTable::new((0..n).map(|i| format!("<w:tr>{prefix}{i}</w:tr>")).collect()));
        Paragraph {
            block: crate::document::Block::Table(grid),
            style: Default::default(),
        }
    }

    fn headings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn table_gets_menu_and_preceding_lines() {
        let doc = Document::new(vec![
            Paragraph::text("第一节 概况"),
            Paragraph::text("发行人近三年合并资产负债表如下："),
            Paragraph::text("单位：万元"),
            Paragraph::text("单位：万元"),
            Paragraph::table(rows("r", 2)),
        ]);
        let ctxs = extract_table_contexts(&doc, &headings(&["第一节 概况"]), &SplitConfig::default());
        assert_eq!(ctxs.len(), 1);
        assert_eq!(ctxs[0].menu, "第一节 概况");
        assert_eq!(ctxs[0].preceding_text, "发行人近三年合并资产负债表如下：\n单位：万元");
        assert_eq!(ctxs[0].content, "r0\t0\nr1\t1");
        assert_eq!(ctxs[0].paragraph_indices, vec![4]);
        assert!(Uuid::parse_str(&ctxs[0].id).is_ok());
    }

    #[test]
    fn captioned_tables_stay_apart_with_smallest_window() {
        let doc = Document::new(vec![
            Paragraph::text("第一节 概况"),
            Paragraph::text("合并资产负债表"),
            Paragraph::table(rows("a", 2)),
            Paragraph::text("合并现金流量表"),
            Paragraph::table(rows("b", 2)),
        ]);
        let config = SplitConfig::builder().preceding_window(1).build().unwrap();
        let ctxs = extract_table_contexts(&doc, &headings(&["第一节 概况"]), &config);
        let pretexts: Vec<_> = ctxs.iter().map(|c| c.preceding_text.as_str()).collect();
        assert_eq!(pretexts, vec!["合并资产负债表", "合并现金流量表"]);
    }

    #[test]
    fn page_furniture_is_not_preceding_text() {
        let doc = Document::new(vec![
            Paragraph::text("第一节 概况"),
            Paragraph::text("发行人有息负债情况"),
            Paragraph::text("12"),
            Paragraph::text("某某集团有限公司公开发行公司债券募集说明书"),
            Paragraph::table(rows("r", 1)),
        ]);
        let ctxs = extract_table_contexts(&doc, &headings(&["第一节 概况"]), &SplitConfig::default());
        assert_eq!(ctxs[0].preceding_text, "第一节 概况\n发行人有息负债情况");
    }

    #[test]
    fn table_before_first_heading_is_ignored() {
        let doc = Document::new(vec![
            Paragraph::table(rows("cover", 1)),
            Paragraph::text("第一节 概况"),
            Paragraph::table(rows("body", 1)),
        ]);
        let ctxs = extract_table_contexts(&doc, &headings(&["第一节 概况"]), &SplitConfig::default());
        assert_eq!(ctxs.len(), 1);
        assert_eq!(ctxs[0].data[0][0], "body0");
    }

    #[test]
    fn no_headings_means_no_contexts() {
        let doc = Document::new(vec![Paragraph::text("正文"), Paragraph::table(rows("r", 1))]);
        assert!(extract_table_contexts(&doc, &[], &SplitConfig::default()).is_empty());
    }

    #[test]
    fn menu_follows_heading_sequence() {
        let doc = Document::new(vec![
            Paragraph::text("第一节 概况"),
            Paragraph::text("表一"),
            Paragraph::table(rows("a", 1)),
            Paragraph::text("第二节 财务"),
            Paragraph::text("表二"),
            Paragraph::table(rows("b", 1)),
            // A repeat of an earlier heading does not move the menu back.
            Paragraph::text("第一节 概况"),
            Paragraph::table(rows("c", 1)),
        ]);
        let ctxs = extract_table_contexts(
            &doc,
            &headings(&["第一节 概况", "第二节 财务"]),
            &SplitConfig::default(),
        );
        let menus: Vec<_> = ctxs.iter().map(|c| c.menu.as_str()).collect();
        assert_eq!(menus, vec!["第一节 概况", "第二节 财务", "第二节 财务"]);
    }

    #[test]
    fn adjacent_fragments_merge_in_order() {
        let doc = Document::new(vec![
            Paragraph::text("第一节 概况"),
            Paragraph::text("合并资产负债表"),
            raw_table("a", 30),
            raw_table("b", 15),
            raw_table("c", 5),
        ]);
        let ctxs = extract_table_contexts(&doc, &headings(&["第一节 概况"]), &SplitConfig::default());
        assert_eq!(ctxs.len(), 1);

        let expected: Vec<Vec<String>> = [rows("a", 30), rows("b", 15), rows("c", 5)].concat();
        assert_eq!(ctxs[0].data, expected);
        assert_eq!(ctxs[0].raw.len(), 50);
        assert_eq!(ctxs[0].paragraph_indices, vec![2, 3, 4]);
        assert_eq!(ctxs[0].content.lines().count(), 40);
        assert_eq!(ctxs[0].content, preview(&expected, 40));
    }

    #[test]
    fn merge_is_associative() {
        let a = TableGrid::new(rows("a", 3)).with_raw(RawTable::new(vec!["a".into()]));
        let b = TableGrid::new(rows("b", 2)).with_raw(RawTable::new(vec!["b".into()]));
        let c = TableGrid::new(rows("c", 4)).with_raw(RawTable::new(vec!["c".into()]));
        let base = |g: &TableGrid| TableContext {
            id: "id-1".into(),
            menu: "m".into(),
            preceding_text: String::new(),
            content: preview(&g.rows, 40),
            data: g.rows.clone(),
            raw: g.raw.clone(),
            paragraph_indices: vec![0],
        };

        // (a + b) + c
        let mut left = base(&a);
        merge_fragment(&mut left, &b, 1, 40);
        merge_fragment(&mut left, &c, 2, 40);

        // a + (b + c)
        let mut bc = TableGrid::new(b.rows.clone()).with_raw(b.raw.clone());
        bc.rows.extend(c.rows.iter().cloned());
        bc.raw.append(&c.raw);
        let mut right = base(&a);
        merge_fragment(&mut right, &bc, 1, 40);

        assert_eq!(left.data, right.data);
        assert_eq!(left.raw, right.raw);
        assert_eq!(left.content, right.content);
    }

    #[test]
    fn guard_refuses_oversized_or_misaligned_merge() {
        let doc = Document::new(vec![
            Paragraph::text("第一节 概况"),
            Paragraph::text("合并现金流量表"),
            Paragraph::table(rows("a", 3)),
            Paragraph::table(rows("b", 3)),
            Paragraph::table(vec![vec!["x".into()]]),
        ]);
        let config = SplitConfig::builder()
            .merge_guard(MergeGuard {
                max_rows: Some(4),
                require_same_width: false,
            })
            .build()
            .unwrap();
        let ctxs = extract_table_contexts(&doc, &headings(&["第一节 概况"]), &config);
        assert_eq!(ctxs.len(), 2);
        assert_eq!(ctxs[1].preceding_text, "");
        assert_eq!(ctxs[1].data.len(), 4);

        let config = SplitConfig::builder()
            .merge_guard(MergeGuard {
                max_rows: None,
                require_same_width: true,
            })
            .build()
            .unwrap();
        let ctxs = extract_table_contexts(&doc, &headings(&["第一节 概况"]), &config);
        assert_eq!(ctxs.len(), 2);
        assert_eq!(ctxs[0].data.len(), 6);
    }

    fn ctx(menu: &str, pretext: &str) -> TableContext {
        TableContext {
            id: "abcd-1".into(),
            menu: menu.into(),
            preceding_text: pretext.into(),
            content: String::new(),
            data: vec![],
            raw: RawTable::default(),
            paragraph_indices: vec![],
        }
    }

    #[test]
    fn keyword_filter() {
        let ctxs = vec![
            ctx("第五节 财务会计信息", "发行人近三年合并资产负债表"),
            ctx("第五节 财务会计信息", "发行人近三年主要财务指标"),
            ctx("第四节 发行人基本情况-其他", "应收账款前五名"),
            ctx("第五节 财务会计信息", "截至报告期末，发行人受限货币资金情况如下"),
            ctx("第五节 财务会计信息", "营业成本具体构成情况如下"),
            ctx("第五节 财务会计信息", "经营性其他应收款明细"),
        ];
        let kept = filter_by_keywords(&ctxs);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].preceding_text, "发行人近三年合并资产负债表");
    }
}
