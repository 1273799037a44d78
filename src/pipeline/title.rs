//! Heading detection: a deterministic rule cascade with an LLM fallback.
//!
//! Chinese prospectuses number their headings with a small, fixed set of
//! prefixes (`第一节`, `一、`, `（一）`, `1、`, `1.`, `（1）`, `1）`). The
//! cascade rejects the shapes that look like headings but are not (table of
//! contents lines, labelled fields, captions, page furniture) and accepts
//! prefixed lines that end cleanly. Only what the rules cannot decide goes
//! to the model.

use crate::config::SplitConfig;
use crate::document::{Alignment, Document};
use crate::error::ItemError;
use crate::output::Title;
use crate::pipeline::llm::{parse_json_object, string_field, Completer};
use crate::prompts::title_prompt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

// ── Prefix vocabulary ────────────────────────────────────────────────────

/// Chinese numerals 一 … 二十九.
fn chinese_numerals() -> Vec<String> {
    const DIGITS: [&str; 10] = ["", "一", "二", "三", "四", "五", "六", "七", "八", "九"];
    (1..=29)
        .map(|n: usize| {
            let (tens, ones) = (n / 10, n % 10);
            let tens_part = match tens {
                0 => String::new(),
                1 => "十".to_string(),
                t => format!("{}十", DIGITS[t]),
            };
            format!("{tens_part}{}", DIGITS[ones])
        })
        .collect()
}

/// Front-matter headings that open a prospectus.
const FRONT_MATTER: [&str; 6] = ["募集说明书", "声明", "重大事项", "重要提示", "释义", "目录"];

/// Prefixes of first-level headings: front matter and `第N` chapters.
static FIRST_LEVEL_PREFIXES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut v: Vec<String> = FRONT_MATTER.iter().map(|s| s.to_string()).collect();
    v.extend(chinese_numerals().into_iter().map(|n| format!("第{n}")));
    v
});

/// Prefixes of deeper headings, shallowest style first.
static OTHER_LEVEL_PREFIXES: Lazy<Vec<String>> = Lazy::new(|| {
    let cn = chinese_numerals();
    let mut v = Vec::new();
    v.extend(cn.iter().map(|n| format!("{n}、")));
    v.extend(cn.iter().map(|n| format!("（{n}）")));
    v.extend((1..=29).map(|n| format!("{n}、")));
    v.extend((1..=29).map(|n| format!("{n}.")));
    v.extend((1..=29).map(|n| format!("（{n}）")));
    v.extend((1..=29).map(|n| format!("{n}）")));
    v
});

/// Every heading prefix, including half-width `(一)`.
static ALL_PREFIXES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut v = FIRST_LEVEL_PREFIXES.clone();
    v.extend(OTHER_LEVEL_PREFIXES.iter().cloned());
    v.extend(chinese_numerals().into_iter().map(|n| format!("({n})")));
    v
});

fn starts_with_any(text: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| text.starts_with(p.as_str()))
}

// ── Rules ────────────────────────────────────────────────────────────────

static RE_TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+$").unwrap());

static RE_INLINE_ENUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[①②③④⑤⑥a-zA-Z]\s?[\\.、）)]?").unwrap());

static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?!.;、？！。；/]+$").unwrap());

static RE_LABELED_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(名称|法定代表人|所属行业|实缴资本|注册资本|设立日期|统一社会信用代码|数据来源|住所|注册地址|办公地址|传真|邮政编码|联系|电话|负责人|联系人|包括|上述|如下|以下|下列|介绍|其中|借|贷|注|单位)+.*?[\\:：]+",
    )
    .unwrap()
});

static RE_TRAILING_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:：]\s*$").unwrap());

static RE_CAPTION_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[【】—]").unwrap());

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());

static RE_RUNNING_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r".{6,}募集说明书$").unwrap());

static RE_CLAUSE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[:,?!.;：，、？！。；/]+$").unwrap());

/// Headings of the intermediaries directory; detection stops there.
static RE_STOP_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"发行.*?有关机构").unwrap());

/// Why the cascade refused a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRule {
    TooLong,
    InlineEnumeration,
    SentenceEnding,
    LabeledField,
    CaptionMark,
    RightAligned,
    CenteredNonChapter,
    PageFurniture,
    TableOfContents,
}

/// Outcome of the rule cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerdict {
    Heading,
    Body(BodyRule),
    Undecided,
}

/// Header/footer lines: bare page numbers and the running title.
pub fn is_page_furniture(text: &str) -> bool {
    RE_PAGE_NUMBER.is_match(text) || RE_RUNNING_HEADER.is_match(text)
}

/// First-level heading: a front-matter or `第N` prefix, not a TOC line.
pub fn is_first_level_title(text: &str, max_chars: usize) -> bool {
    if text.chars().count() > max_chars {
        return false;
    }
    if starts_with_any(text, &ALL_PREFIXES) && RE_TRAILING_DIGITS.is_match(text) {
        return false;
    }
    starts_with_any(text, &FIRST_LEVEL_PREFIXES)
}

/// Run the deterministic cascade. Rules are tried in order; the first that
/// fires decides.
pub fn classify(text: &str, alignment: Option<&Alignment>, max_chars: usize) -> RuleVerdict {
    if text.chars().count() > max_chars {
        return RuleVerdict::Body(BodyRule::TooLong);
    }
    if RE_INLINE_ENUM.is_match(text) {
        return RuleVerdict::Body(BodyRule::InlineEnumeration);
    }
    if RE_SENTENCE_END.is_match(text) {
        return RuleVerdict::Body(BodyRule::SentenceEnding);
    }
    if RE_LABELED_FIELD.is_match(text) || RE_TRAILING_COLON.is_match(text) {
        return RuleVerdict::Body(BodyRule::LabeledField);
    }
    if RE_CAPTION_MARK.is_match(text) {
        return RuleVerdict::Body(BodyRule::CaptionMark);
    }
    match alignment {
        Some(Alignment::Right) => return RuleVerdict::Body(BodyRule::RightAligned),
        Some(Alignment::Center) if !is_first_level_title(text, max_chars) => {
            return RuleVerdict::Body(BodyRule::CenteredNonChapter)
        }
        _ => {}
    }
    if is_page_furniture(text) {
        return RuleVerdict::Body(BodyRule::PageFurniture);
    }
    if starts_with_any(text, &ALL_PREFIXES) {
        if RE_TRAILING_DIGITS.is_match(text) {
            return RuleVerdict::Body(BodyRule::TableOfContents);
        }
        if !RE_CLAUSE_END.is_match(text) {
            return RuleVerdict::Heading;
        }
    }
    RuleVerdict::Undecided
}

// ── Detector ─────────────────────────────────────────────────────────────

/// Result of a detection pass.
#[derive(Debug, Default)]
pub struct DetectedTitles {
    pub titles: Vec<Title>,
    pub failures: Vec<ItemError>,
}

/// Walk the document and collect headings.
///
/// First-level headings are taken as soon as they match. Everything else
/// goes through [`classify`]; undecided paragraphs are put to `completer`
/// (when given and enabled) with the texts of the two paragraphs before and
/// the one after as context. A failed or unparseable reply means "not a
/// heading". Detection stops at the heading of the intermediaries section.
pub async fn detect_titles(
    doc: &Document,
    completer: Option<&dyn Completer>,
    config: &SplitConfig,
) -> DetectedTitles {
    let mut out = DetectedTitles::default();
    let max_chars = config.title_max_chars;
    let mut llm_asked = 0usize;

    for (idx, para) in doc.paragraphs.iter().enumerate() {
        let Some(text) = para.as_text() else {
            continue;
        };

        if is_first_level_title(text, max_chars) {
            out.titles.push(Title {
                paragraph_index: idx,
                content: text.to_string(),
                is_first_level: true,
            });
            continue;
        }

        let is_title = match classify(text, para.style.alignment.as_ref(), max_chars) {
            RuleVerdict::Heading => true,
            RuleVerdict::Body(rule) => {
                debug!("Paragraph {}: body ({:?})", idx, rule);
                false
            }
            RuleVerdict::Undecided => match completer {
                Some(c) if config.llm_title_fallback => {
                    llm_asked += 1;
                    let context = context_window(doc, idx);
                    match ask_is_title(c, text, &context).await {
                        Ok(answer) => answer,
                        Err(detail) => {
                            warn!("Paragraph {}: heading fallback failed: {}", idx, detail);
                            out.failures.push(ItemError::TitleClassificationFailed {
                                paragraph: idx,
                                detail,
                            });
                            false
                        }
                    }
                }
                _ => false,
            },
        };

        if is_title {
            if RE_STOP_HEADING.is_match(text) {
                debug!("Paragraph {}: intermediaries heading, stopping detection", idx);
                break;
            }
            out.titles.push(Title {
                paragraph_index: idx,
                content: text.to_string(),
                is_first_level: false,
            });
        }
    }

    info!(
        "Detected {} headings ({} first-level, {} LLM checks)",
        out.titles.len(),
        out.titles.iter().filter(|t| t.is_first_level).count(),
        llm_asked
    );
    out
}

/// Texts of paragraphs `idx-2 ..= idx+1`, tables skipped.
fn context_window(doc: &Document, idx: usize) -> Vec<&str> {
    let start = idx.saturating_sub(2);
    let end = (idx + 2).min(doc.paragraphs.len());
    doc.paragraphs[start..end]
        .iter()
        .filter_map(|p| p.as_text())
        .collect()
}

async fn ask_is_title(completer: &dyn Completer, text: &str, context: &[&str]) -> Result<bool, String> {
    let reply = completer
        .complete(&title_prompt(text, context))
        .await
        .map_err(|e| e.to_string())?;
    let answer = parse_json_object(&reply)
        .and_then(|v| string_field(&v, &["结果", "result"]))
        .ok_or_else(|| format!("unparseable reply: {}", reply.chars().take(80).collect::<String>()))?;
    Ok(answer == "是")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Paragraph;
    use crate::pipeline::llm::testing::ScriptedCompleter;

    const MAX: usize = 50;

    #[test]
    fn numerals() {
        let n = chinese_numerals();
        assert_eq!(n.len(), 29);
        assert_eq!(n[0], "一");
        assert_eq!(n[9], "十");
        assert_eq!(n[10], "十一");
        assert_eq!(n[19], "二十");
        assert_eq!(n[28], "二十九");
    }

    #[test]
    fn first_level_chapter_heading() {
        assert!(is_first_level_title("第一节重大事项提示", MAX));
        assert!(is_first_level_title("第一节 重大事项提示", MAX));
        assert!(is_first_level_title("释义", MAX));
        assert!(!is_first_level_title("一、发行人概况", MAX));
    }

    #[test]
    fn first_level_rejects_toc_line() {
        assert!(!is_first_level_title("第二节 发行人基本情况....12", MAX));
        assert!(!is_first_level_title("目录1", MAX));
    }

    #[test]
    fn numbered_lead_in_with_colon_is_body() {
        assert_eq!(
            classify("1、本次发行的批准情况：", None, MAX),
            RuleVerdict::Body(BodyRule::LabeledField)
        );
    }

    #[test]
    fn toc_line_is_body() {
        assert_eq!(
            classify("第二节 发行人基本情况....12", None, MAX),
            RuleVerdict::Body(BodyRule::TableOfContents)
        );
        assert_eq!(
            classify("（三）发行人股权结构15", None, MAX),
            RuleVerdict::Body(BodyRule::TableOfContents)
        );
    }

    #[test]
    fn prefixed_clean_line_is_heading() {
        assert_eq!(classify("一、发行人概况", None, MAX), RuleVerdict::Heading);
        assert_eq!(classify("（二）有息负债情况", None, MAX), RuleVerdict::Heading);
        assert_eq!(classify("3.对外担保情况", None, MAX), RuleVerdict::Heading);
        assert_eq!(classify("(一)主要会计政策", None, MAX), RuleVerdict::Heading);
    }

    #[test]
    fn body_rules_in_order() {
        let long = "一".repeat(51);
        assert_eq!(classify(&long, None, MAX), RuleVerdict::Body(BodyRule::TooLong));
        assert_eq!(
            classify("①货币资金", None, MAX),
            RuleVerdict::Body(BodyRule::InlineEnumeration)
        );
        assert_eq!(
            classify("A股上市情况", None, MAX),
            RuleVerdict::Body(BodyRule::InlineEnumeration)
        );
        assert_eq!(
            classify("一、发行人概况。", None, MAX),
            RuleVerdict::Body(BodyRule::SentenceEnding)
        );
        assert_eq!(
            classify("注册地址：南京市", None, MAX),
            RuleVerdict::Body(BodyRule::LabeledField)
        );
        assert_eq!(
            classify("【发行人】", None, MAX),
            RuleVerdict::Body(BodyRule::CaptionMark)
        );
        assert_eq!(
            classify("二、风险因素", Some(&Alignment::Right), MAX),
            RuleVerdict::Body(BodyRule::RightAligned)
        );
        assert_eq!(
            classify("二、风险因素", Some(&Alignment::Center), MAX),
            RuleVerdict::Body(BodyRule::CenteredNonChapter)
        );
        assert_eq!(classify("12", None, MAX), RuleVerdict::Body(BodyRule::PageFurniture));
        assert_eq!(
            classify("某某集团有限公司公开发行公司债券募集说明书", None, MAX),
            RuleVerdict::Body(BodyRule::PageFurniture)
        );
    }

    #[test]
    fn unprefixed_line_is_undecided() {
        assert_eq!(classify("发行人主要财务数据", None, MAX), RuleVerdict::Undecided);
        assert_eq!(classify("一、发行人概况，", None, MAX), RuleVerdict::Undecided);
    }

    #[test]
    fn centered_chapter_passes_alignment_rule() {
        assert_eq!(
            classify("第三节 发行人基本情况", Some(&Alignment::Center), MAX),
            RuleVerdict::Heading
        );
    }

    fn doc(texts: &[&str]) -> Document {
        Document::new(texts.iter().map(|t| Paragraph::text(*t)).collect())
    }

    #[tokio::test]
    async fn detects_headings_without_llm() {
        let d = doc(&[
            "第一节 重大事项提示",
            "1、本次发行的批准情况：",
            "一、发行人概况",
            "发行人成立于2001年。",
        ]);
        let config = SplitConfig::builder().llm_title_fallback(false).build().unwrap();
        let out = detect_titles(&d, None, &config).await;
        assert_eq!(out.titles.len(), 2);
        assert!(out.titles[0].is_first_level);
        assert_eq!(out.titles[1].content, "一、发行人概况");
        assert!(!out.titles[1].is_first_level);
    }

    #[tokio::test]
    async fn llm_fallback_decides_undecided_lines() {
        let d = doc(&["第四节 财务会计信息", "发行人主要财务数据", "正文段落。", "其他说明"]);
        let completer = ScriptedCompleter::new()
            .on("【文本数据】\n发行人主要财务数据", &[r#"{"结果": "是"}"#])
            .on("【文本数据】\n其他说明", &["```json\n{\"结果\": \"否\"}\n```"]);
        let config = SplitConfig::default();
        let out = detect_titles(&d, Some(&completer), &config).await;
        let contents: Vec<_> = out.titles.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["第四节 财务会计信息", "发行人主要财务数据"]);
        assert_eq!(completer.prompt_count(), 2);
        assert!(out.failures.is_empty());
    }

    #[tokio::test]
    async fn unparseable_reply_is_not_a_heading_and_recorded() {
        let d = doc(&["发行人主要财务数据"]);
        let completer = ScriptedCompleter::new().on("是否为章节标题", &["我觉得是"]);
        let out = detect_titles(&d, Some(&completer), &SplitConfig::default()).await;
        assert!(out.titles.is_empty());
        assert_eq!(out.failures.len(), 1);
    }

    #[tokio::test]
    async fn detection_stops_at_intermediaries_heading() {
        let d = doc(&[
            "第一节 发行概况",
            "一、本次发行的基本情况",
            "二、本次发行的有关机构",
            "三、认购人承诺",
        ]);
        let config = SplitConfig::builder().llm_title_fallback(false).build().unwrap();
        let out = detect_titles(&d, None, &config).await;
        let contents: Vec<_> = out.titles.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["第一节 发行概况", "一、本次发行的基本情况"]);
    }

    #[test]
    fn context_window_skips_tables() {
        let d = Document::new(vec![
            Paragraph::text("a"),
            Paragraph::table(vec![]),
            Paragraph::text("c"),
            Paragraph::text("d"),
            Paragraph::text("e"),
        ]);
        assert_eq!(context_window(&d, 2), vec!["a", "c", "d"]);
        assert_eq!(context_window(&d, 0), vec!["a"]);
        assert_eq!(context_window(&d, 4), vec!["c", "d", "e"]);
    }
}
