//! Integration tests: build real `.docx` packages in a temp dir and run the
//! whole pipeline on them.
//!
//! The LLM is replaced by a deterministic [`Completer`] that answers from
//! the prompt text, so these tests need no network and no API key.

use async_trait::async_trait;
use prospectus_split::{
    inspect, process, process_to_file, Block, Cell, Completer, ItemError, LlmError, SplitConfig, SplitError,
    TargetTable,
};
use regex::Regex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Package helpers ──────────────────────────────────────────────────────────

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

fn p(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

fn p_styled(style: &str, text: &str) -> String {
    format!(r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#)
}

fn tbl(rows: &[&[&str]]) -> String {
    let rows: String = rows
        .iter()
        .map(|row| {
            let cells: String = row
                .iter()
                .map(|c| format!("<w:tc><w:p><w:r><w:t>{c}</w:t></w:r></w:p></w:tc>"))
                .collect();
            format!("<w:tr>{cells}</w:tr>")
        })
        .collect();
    format!("<w:tbl>{rows}</w:tbl>")
}

fn write_docx(dir: &Path, name: &str, body: &[String], styles: Option<&str>) -> PathBuf {
    let path = dir.join(name);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body>{}</w:body></w:document>"#,
        body.concat()
    )
    .unwrap();
    if let Some(styles) = styles {
        zip.start_file("word/styles.xml", SimpleFileOptions::default())
            .unwrap();
        write!(zip, r#"<w:styles xmlns:w="{W_NS}">{styles}</w:styles>"#).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn offline() -> SplitConfig {
    SplitConfig::builder()
        .llm_title_fallback(false)
        .extract_tables(false)
        .build()
        .unwrap()
}

// ── Scripted model ───────────────────────────────────────────────────────────

/// Answers heading questions with "no", types tables by their caption and
/// picks the first candidate id offered for a target.
#[derive(Default)]
struct CaptionModel {
    calls: AtomicUsize,
}

#[async_trait]
impl Completer for CaptionModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("【目标表】") {
            let re = Regex::new(r#""id":"([0-9a-f\-]{36})""#).unwrap();
            return match re.captures(prompt) {
                Some(c) => Ok(format!(r#"{{"id": "{}"}}"#, &c[1])),
                None => Ok(r#"{"id": "0"}"#.to_string()),
            };
        }
        if prompt.contains("【表格内容】") {
            let table_type = if prompt.contains("合并资产负债表") {
                "资产负债表"
            } else if prompt.contains("合并现金流量表") {
                "现金流"
            } else {
                "其他表"
            };
            return Ok(format!(
                r#"{{"表格类型": "{table_type}", "所属章节": "", "表格标题": "", "表头": [], "关键词": [], "时间序列": []}}"#
            ));
        }
        Ok(r#"{"结果": "否"}"#.to_string())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn table_stays_with_the_section_it_sits_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_docx(
        dir.path(),
        "small.docx",
        &[
            p("第一节 概况"),
            tbl(&[&["项目", "金额"], &["资产总计", "100"]]),
            p("第二节 结论"),
        ],
        None,
    );

    let out = process(path.to_str().unwrap(), &offline()).await.unwrap();

    // Inner spaces are dropped when paragraph text is read. Chapters the
    // styles don't mark sit under the front-matter root.
    assert_eq!(
        out.sections.paths().collect::<Vec<_>>(),
        vec!["募集信息-第一节概况", "募集信息-第二节结论"]
    );
    let in_first: Vec<_> = out.contexts_under("第一节概况").collect();
    assert_eq!(in_first.len(), 1);
    assert_eq!(in_first[0].data[1], vec!["资产总计".to_string(), "100".to_string()]);
    assert_eq!(out.contexts_under("第二节结论").count(), 0);

    let conclusion = out.sections.get("募集信息-第二节结论").unwrap();
    assert!(conclusion.iter().all(|item| matches!(item.block, Block::Text(_))));
    let overview = out.sections.get("募集信息-第一节概况").unwrap();
    assert!(overview.iter().any(|item| matches!(item.block, Block::Table(_))));
}

#[tokio::test]
async fn toc_lines_and_labelled_fields_are_not_headings() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_docx(
        dir.path(),
        "titles.docx",
        &[
            p("第二节 发行人基本情况....12"),
            p("第一节 重大事项提示"),
            p("1、本次发行的批准情况："),
            p("本次发行经董事会审议通过。"),
        ],
        None,
    );

    let out = process(path.to_str().unwrap(), &offline()).await.unwrap();
    let titles: Vec<_> = out.titles.iter().map(|t| (t.content.as_str(), t.is_first_level)).collect();
    assert_eq!(titles, vec![("第一节重大事项提示", true)]);
}

#[tokio::test]
async fn style_outline_and_detected_titles_nest() {
    let styles = r#"
        <w:style w:type="paragraph" w:styleId="Heading1"><w:pPr><w:outlineLvl w:val="0"/></w:pPr></w:style>
        <w:style w:type="paragraph" w:styleId="Heading2"><w:basedOn w:val="Body"/><w:pPr><w:outlineLvl w:val="1"/></w:pPr></w:style>
        <w:style w:type="paragraph" w:styleId="Body"/>
    "#;
    let dir = tempfile::tempdir().unwrap();
    let path = write_docx(
        dir.path(),
        "styled.docx",
        &[
            p("声明"),
            p("本公司全体董事承诺募集说明书不存在虚假记载。"),
            p_styled("Heading1", "第三节 发行人基本情况"),
            p_styled("Heading2", "一、发行人概况"),
            p("（一）基本信息"),
            p("发行人成立于2001年。"),
        ],
        Some(styles),
    );

    let out = process(path.to_str().unwrap(), &offline()).await.unwrap();
    let paths: Vec<_> = out.breadcrumbs.iter().map(|b| b.path.as_str()).collect();
    assert!(paths.contains(&"第三节发行人基本情况-一、发行人概况-（一）基本信息"), "{paths:?}");
    for crumb in &out.breadcrumbs {
        assert!(
            crumb.chain_levels.windows(2).all(|w| w[0] < w[1]),
            "chain not increasing: {crumb:?}"
        );
    }
    assert_eq!(
        out.sections.text("第三节发行人基本情况-一、发行人概况-（一）基本信息").as_deref(),
        Some("（一）基本信息\n发行人成立于2001年。")
    );
}

fn financial_body() -> Vec<String> {
    vec![
        p("声明"),
        p("第五节 财务会计信息"),
        p("一、合并资产负债表"),
        p("发行人近两年末合并资产负债表"),
        p("单位：万元"),
        tbl(&[
            &["项目", "2023年末", "2022年末"],
            &["货币资金", "50,000.00", "40,000.00"],
            &["负债合计", "300,000.00", "280,000.00"],
        ]),
        p("二、合并现金流量表"),
        p("发行人近三年合并现金流量表"),
        p("单位：万元"),
        tbl(&[
            &["项目", "2024年1-6月", "2023年度", "2022年度"],
            &["经营活动产生的现金流量净额", "10,000.00", "20,000.00", "(5,000.00)"],
        ]),
        p("三、股东情况"),
        p("发行人前五大股东情况如下："),
        tbl(&[&["股东", "持股比例"], &["某国资公司", "100%"]]),
    ]
}

#[tokio::test]
async fn statements_are_selected_and_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_docx(dir.path(), "financial.docx", &financial_body(), None);
    let model = Arc::new(CaptionModel::default());
    let config = SplitConfig::builder()
        .completer(model.clone())
        .targets(vec![TargetTable::BalanceSheet, TargetTable::CashFlow, TargetTable::IncomeStatement])
        .build()
        .unwrap();

    let out = process(path.to_str().unwrap(), &config).await.unwrap();

    assert!(out.failures.is_empty(), "{:?}", out.failures);
    assert_eq!(out.stats.table_contexts, 3);
    assert_eq!(out.stats.candidate_tables, 2);
    assert_eq!(out.matches.len(), 2);

    let bs = out.table_data.get("资产负债表").unwrap();
    assert_eq!(bs.menu, "一、合并资产负债表");
    assert_eq!(bs.unit.as_deref(), Some("亿"));
    assert_eq!(bs.date.as_deref(), Some("202312"));
    assert_eq!(bs.data[1], vec![Cell::from("货币资金"), Cell::Number(5.0)]);
    assert!(out.table_data.get("资产负债表-募集").is_some());
    assert_eq!(out.table_data.liability_total_at("202312"), Some(30.0));
    assert_eq!(out.table_data.liability_total_at("202212"), Some(28.0));

    let cf = out.table_data.get("现金流").unwrap();
    assert_eq!(cf.date.as_deref(), Some("202406"));
    assert_eq!(
        cf.data[1],
        vec![
            Cell::from("经营活动产生的现金流量净额"),
            Cell::Number(1.0),
            Cell::Number(2.0),
            Cell::Number(-0.5),
        ]
    );
    assert!(out.table_data.get("利润表").is_none());
    assert!(!out.table_data.statements_withheld);

    // Two captions go to the heading fallback, then two descriptions and
    // two arbitrations; the income statement has no candidate.
    assert_eq!(model.calls.load(Ordering::SeqCst), 6);
    assert_eq!(out.stats.llm_calls, 6);
}

#[tokio::test]
async fn payload_is_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_docx(dir.path(), "financial.docx", &financial_body(), None);
    let output = dir.path().join("out/financial.json");
    let config = SplitConfig::builder()
        .completer(Arc::new(CaptionModel::default()))
        .targets(vec![TargetTable::BalanceSheet])
        .build()
        .unwrap();

    let stats = process_to_file(input.to_str().unwrap(), &output, &config).await.unwrap();
    assert_eq!(stats.targets_resolved, 1);

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert!(json["sections"].get("募集信息-一、合并资产负债表").is_some());
    assert_eq!(json["table_data"]["tables"]["资产负债表"]["unit"], "亿");
    assert!(!output.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn inspect_needs_no_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_docx(dir.path(), "financial.docx", &financial_body(), None);
    let summary = inspect(path.to_str().unwrap()).await.unwrap();
    assert_eq!(summary.tables, 3);
    assert_eq!(summary.first_level_titles, vec!["声明", "第五节财务会计信息"]);
}

#[tokio::test]
async fn unusable_inputs_are_fatal() {
    let dir = tempfile::tempdir().unwrap();

    let legacy = dir.path().join("old.doc");
    std::fs::write(&legacy, [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]).unwrap();
    let err = process(legacy.to_str().unwrap(), &offline()).await.unwrap_err();
    assert!(matches!(err, SplitError::LegacyDoc { .. }));

    let not_word = dir.path().join("empty.docx");
    let mut zip = ZipWriter::new(File::create(&not_word).unwrap());
    zip.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"hello").unwrap();
    zip.finish().unwrap();
    let err = process(not_word.to_str().unwrap(), &offline()).await.unwrap_err();
    assert!(matches!(err, SplitError::MissingPart { .. }));
}

#[tokio::test]
async fn heading_fallback_errors_degrade_to_body_text() {
    struct Down;

    #[async_trait]
    impl Completer for Down {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::Api {
                message: "503 Service Unavailable".into(),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = write_docx(
        dir.path(),
        "down.docx",
        &[p("第一节 概况"), p("发行人主要财务数据"), p("第二节 结论")],
        None,
    );
    let config = SplitConfig::builder()
        .completer(Arc::new(Down))
        .extract_tables(false)
        .build()
        .unwrap();

    let out = process(path.to_str().unwrap(), &config).await.unwrap();
    assert_eq!(out.titles.len(), 2);
    assert!(matches!(
        out.failures.as_slice(),
        [ItemError::TitleClassificationFailed { paragraph: 1, .. }]
    ));
    assert_eq!(out.stats.llm_failures, 1);
}
