//! Whole-document entry points.
//!
//! [`process`] resolves the input, reads the `.docx` and hands the parsed
//! [`Document`] to [`process_document`], which runs every stage in order and
//! returns one [`ProcessOutput`]. Per-item failures never abort a run; they
//! are collected in [`ProcessOutput::failures`].

use crate::config::SplitConfig;
use crate::document::Document;
use crate::error::SplitError;
use crate::output::{DocumentSummary, ProcessOutput, ProcessStats, TableDataSet};
use crate::pipeline::llm::{Completer, MeteredCompleter, ProviderCompleter};
use crate::pipeline::{assemble, breadcrumb, docx, input, outline, sections, selector, tables, title};
use crate::progress::Stage;
use crate::targets::table_type_vocabulary;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Split a prospectus file or URL and select its target tables.
///
/// # Errors
/// Returns `Err(SplitError)` only for fatal errors: unreadable input, a
/// file that is not a `.docx`, or no LLM provider when one is needed.
pub async fn process(input_str: impl AsRef<str>, config: &SplitConfig) -> Result<ProcessOutput, SplitError> {
    let input_str = input_str.as_ref();
    info!("Starting run: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let doc = read_blocking(resolved.path()).await?;
    process_document(&doc, config).await
}

/// Run every stage on an already parsed document.
pub async fn process_document(doc: &Document, config: &SplitConfig) -> Result<ProcessOutput, SplitError> {
    let total_start = Instant::now();

    let metered = if config.needs_llm() {
        Some(MeteredCompleter::new(resolve_completer(config)?))
    } else {
        debug!("No LLM stage enabled, skipping provider resolution");
        None
    };
    let completer: Option<&dyn Completer> = metered.as_ref().map(|m| m as &dyn Completer);

    let mut stats = ProcessStats {
        paragraphs: doc.paragraphs.len(),
        tables: doc.table_count(),
        ..Default::default()
    };
    info!("Document has {} paragraphs, {} tables", stats.paragraphs, stats.tables);
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(stats.paragraphs, stats.tables);
    }
    let stage = |s: Stage| {
        debug!("Stage: {}", s.label());
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage(s);
        }
    };
    let mut failures = Vec::new();

    // ── Step 1: Headings ─────────────────────────────────────────────────
    stage(Stage::Headings);
    let title_start = Instant::now();
    let levels = outline::paragraph_levels(doc);
    let detected = title::detect_titles(doc, completer, config).await;
    failures.extend(detected.failures);
    let titles = detected.titles;
    stats.titles = titles.len();
    stats.title_duration_ms = title_start.elapsed().as_millis() as u64;
    info!("Detected {} headings in {}ms", stats.titles, stats.title_duration_ms);

    // ── Step 2: Outline and breadcrumbs ──────────────────────────────────
    let outline = breadcrumb::build_outline(
        doc,
        &levels,
        &titles,
        config.outline_max_chars,
        &config.front_matter_title,
    );
    let crumbs = breadcrumb::breadcrumbs(&outline);

    // ── Step 3: Sections ─────────────────────────────────────────────────
    stage(Stage::Sections);
    let sections = sections::split_sections(doc, &crumbs);
    stats.sections = sections.len();
    info!("Split into {} sections", stats.sections);

    // ── Step 4: Table contexts ───────────────────────────────────────────
    stage(Stage::TableContexts);
    let headings: Vec<String> = titles.iter().map(|t| t.content.clone()).collect();
    let table_contexts = tables::extract_table_contexts(doc, &headings, config);
    let candidates = if config.keyword_filter {
        tables::filter_by_keywords(&table_contexts)
    } else {
        table_contexts.clone()
    };
    stats.table_contexts = table_contexts.len();
    stats.candidate_tables = candidates.len();
    info!(
        "Collected {} table contexts, {} candidates",
        stats.table_contexts, stats.candidate_tables
    );

    let mut features = Vec::new();
    let mut matches = Vec::new();
    let mut table_data = TableDataSet::default();

    if let Some(completer) = completer.filter(|_| config.extract_tables && !config.targets.is_empty()) {
        // ── Step 5: Table features ───────────────────────────────────────
        stage(Stage::Features);
        let feature_start = Instant::now();
        let vocabulary = table_type_vocabulary(&config.targets);
        let (f, errs) = selector::generate_features(completer, &candidates, &vocabulary, config).await;
        features = f;
        failures.extend(errs);
        stats.features_extracted = features.iter().filter(|f| !f.table_type.is_empty()).count();
        stats.feature_duration_ms = feature_start.elapsed().as_millis() as u64;
        info!(
            "Described {}/{} tables in {}ms",
            stats.features_extracted,
            candidates.len(),
            stats.feature_duration_ms
        );

        // ── Step 6: Target selection ─────────────────────────────────────
        stage(Stage::Selection);
        let selection_start = Instant::now();
        let (m, errs) = selector::select_targets(completer, &features, &config.targets, config).await;
        matches = m;
        failures.extend(errs);
        stats.targets_resolved = matches.len();
        stats.selection_duration_ms = selection_start.elapsed().as_millis() as u64;
        info!(
            "Resolved {}/{} targets in {}ms",
            stats.targets_resolved,
            config.targets.len(),
            stats.selection_duration_ms
        );

        // ── Step 7: Table data ───────────────────────────────────────────
        stage(Stage::Normalization);
        let (set, errs) = assemble::build_table_data_set(&matches, &table_contexts);
        table_data = set;
        failures.extend(errs);
    }

    if let Some(ref m) = metered {
        let usage = m.usage();
        stats.llm_calls = m.calls();
        stats.llm_failures = m.failures();
        stats.input_tokens = usage.input_tokens;
        stats.output_tokens = usage.output_tokens;
    }
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Run complete: {} sections, {} targets, {} failures, {} LLM calls, {}ms total",
        stats.sections,
        stats.targets_resolved,
        failures.len(),
        stats.llm_calls,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(matches.len(), config.targets.len());
    }

    Ok(ProcessOutput {
        titles,
        outline,
        breadcrumbs: crumbs,
        sections,
        table_contexts,
        features,
        matches,
        table_data,
        failures,
        stats,
    })
}

/// Run and write the JSON payload directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn process_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &SplitConfig,
) -> Result<ProcessStats, SplitError> {
    let output = process(input_str, config).await?;
    let path = output_path.as_ref();
    let write_err = |e: std::io::Error| SplitError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let json = serde_json::to_vec_pretty(&output).map_err(|e| SplitError::Internal(format!("serialize output: {e}")))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(input_str: impl AsRef<str>, config: &SplitConfig) -> Result<ProcessOutput, SplitError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SplitError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(input_str, config))
}

/// Run on `.docx` bytes held in memory.
///
/// The bytes go to a managed temp file that is removed on return.
pub async fn process_from_bytes(bytes: &[u8], config: &SplitConfig) -> Result<ProcessOutput, SplitError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".docx")
        .tempfile()
        .map_err(|e| SplitError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| SplitError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    process(&path, config).await
}

/// Summarise document structure without converting anything.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentSummary, SplitError> {
    let defaults = SplitConfig::default();
    let resolved = input::resolve_input(input_str.as_ref(), defaults.download_timeout_secs).await?;
    let doc = read_blocking(resolved.path()).await?;
    Ok(summarize(&doc, defaults.title_max_chars))
}

fn summarize(doc: &Document, title_max_chars: usize) -> DocumentSummary {
    DocumentSummary {
        paragraphs: doc.paragraphs.len(),
        tables: doc.table_count(),
        styles: doc.styles.len(),
        numbering_definitions: doc.numbering.len(),
        outline_entries: outline::paragraph_levels(doc)
            .iter()
            .flatten()
            .filter(|&&level| level < breadcrumb::OUTLINE_LEVEL_LIMIT)
            .count(),
        first_level_titles: doc
            .paragraphs
            .iter()
            .filter_map(|p| p.as_text())
            .filter(|t| title::is_first_level_title(t, title_max_chars))
            .map(str::to_string)
            .collect(),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Zip inflation and XML parsing are CPU-bound; keep them off the runtime.
async fn read_blocking(path: &Path) -> Result<Document, SplitError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || docx::read_document(&path))
        .await
        .map_err(|e| SplitError::Internal(format!("document reader task failed: {e}")))?
}

/// The completion collaborator for this run.
///
/// A pre-built completer wins; otherwise an edgequake provider is resolved
/// and wrapped in a [`ProviderCompleter`].
fn resolve_completer(config: &SplitConfig) -> Result<Arc<dyn Completer>, SplitError> {
    if let Some(ref completer) = config.completer {
        return Ok(Arc::clone(completer));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(ProviderCompleter::new(provider, config)))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SplitError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| SplitError::ProviderNotConfigured {
        provider: provider_name.to_string(),
        hint: format!("{e}"),
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    checked before auto-detection so the model choice holds even when
///    several API keys are present.
/// 4. **OpenAI key** (`OPENAI_API_KEY`) with the configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &SplitConfig) -> Result<Arc<dyn LLMProvider>, SplitError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| SplitError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
            Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
            Error: {}",
            e
        ),
    })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Alignment, Paragraph};
    use crate::error::LlmError;
    use crate::pipeline::llm::testing::ScriptedCompleter;
    use crate::progress::SplitProgressCallback;
    use crate::targets::TargetTable;
    use std::sync::Mutex;

    fn prospectus() -> Document {
        let s = |t: &str| t.to_string();
        Document::new(vec![
            Paragraph::text("目录"),
            Paragraph::text("声明"),
            Paragraph::text("本募集说明书依据有关法律法规编制。"),
            Paragraph::text("第一节 发行概况"),
            Paragraph::text("本期债券发行总额不超过10亿元。"),
            Paragraph::text("第二节 财务会计信息"),
            Paragraph::text("发行人2023年末合并资产负债表").with_alignment(Alignment::Center),
            Paragraph::text("单位：万元"),
            Paragraph::table(vec![
                vec![s("项目"), s("2023年末"), s("2022年末")],
                vec![s("货币资金"), s("50,000.00"), s("40,000.00")],
                vec![s("负债合计"), s("300,000.00"), s("280,000.00")],
            ]),
        ])
    }

    fn offline() -> SplitConfig {
        SplitConfig::builder()
            .llm_title_fallback(false)
            .extract_tables(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn runs_without_llm_when_llm_stages_are_off() {
        let out = process_document(&prospectus(), &offline()).await.unwrap();
        assert!(out.titles.iter().any(|t| t.content == "第一节 发行概况" && t.is_first_level));
        assert_eq!(
            out.sections.paths().collect::<Vec<_>>(),
            vec![
                "募集信息",
                "募集信息-声明",
                "募集信息-第一节 发行概况",
                "募集信息-第二节 财务会计信息",
            ]
        );
        assert_eq!(
            out.sections.get("募集信息-第二节 财务会计信息").map(|i| i.len()),
            Some(4)
        );
        assert_eq!(out.table_contexts.len(), 1);
        assert_eq!(out.table_contexts[0].menu, "第二节 财务会计信息");
        assert!(out.features.is_empty());
        assert!(out.table_data.tables.is_empty());
        assert_eq!(out.stats.llm_calls, 0);
        assert_eq!(out.stats.tables, 1);
    }

    /// Describes every table as a balance sheet and picks the first
    /// candidate id listed in an arbitration prompt.
    struct Arbiter;

    #[async_trait::async_trait]
    impl Completer for Arbiter {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            if prompt.contains("【目标表】") {
                let re = regex::Regex::new(r#""id":"([0-9a-f\-]{36})""#).unwrap();
                let id = re.captures(prompt).map(|c| c[1].to_string()).unwrap_or_default();
                return Ok(format!(r#"{{"id": "{id}"}}"#));
            }
            Ok(r#"{"表格类型": "资产负债表", "所属章节": "第二节 财务会计信息", "表格标题": "合并资产负债表", "表头": ["项目", "2023年末"], "关键词": ["货币资金"], "时间序列": ["2023年末"]}"#.to_string())
        }
    }

    #[tokio::test]
    async fn balance_sheet_flows_through_every_stage() {
        let config = SplitConfig::builder()
            .llm_title_fallback(false)
            .targets(vec![TargetTable::BalanceSheet])
            .completer(Arc::new(Arbiter))
            .build()
            .unwrap();
        let out = process_document(&prospectus(), &config).await.unwrap();
        assert!(out.failures.is_empty(), "{:?}", out.failures);
        assert_eq!(out.features.len(), 1);
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.matches[0].id, out.table_contexts[0].id);

        let bs = out.table_data.get("资产负债表").unwrap();
        assert_eq!(bs.unit.as_deref(), Some("亿"));
        assert_eq!(bs.date.as_deref(), Some("202312"));
        assert_eq!(bs.data[1][1], crate::output::Cell::Number(5.0));
        assert!(out.table_data.get(assemble::BALANCE_SHEET_RAW).is_some());
        assert_eq!(out.table_data.liability_total_at("202312"), Some(30.0));

        assert_eq!(out.stats.candidate_tables, 1);
        assert_eq!(out.stats.features_extracted, 1);
        assert_eq!(out.stats.targets_resolved, 1);
        assert_eq!(out.stats.llm_calls, 2);
        assert_eq!(out.stats.llm_failures, 0);
    }

    #[tokio::test]
    async fn missing_arbitration_reply_leaves_target_open() {
        let completer = Arc::new(ScriptedCompleter::new().on(
            "【表格内容】",
            &[r#"{"表格类型": "资产负债表", "所属章节": "", "表格标题": "", "表头": [], "关键词": [], "时间序列": []}"#],
        ));
        let config = SplitConfig::builder()
            .llm_title_fallback(false)
            .targets(vec![TargetTable::BalanceSheet])
            .completer(completer.clone())
            .build()
            .unwrap();
        let out = process_document(&prospectus(), &config).await.unwrap();
        assert!(out.matches.is_empty());
        assert!(matches!(
            out.failures.as_slice(),
            [crate::error::ItemError::TargetUnresolved { attempts: 3, .. }]
        ));
        assert!(out.table_data.tables.is_empty());
        // One feature call, then three arbitration attempts.
        assert_eq!(completer.prompt_count(), 4);
        assert_eq!(out.stats.llm_failures, 3);
    }

    #[derive(Default)]
    struct Stages(Mutex<Vec<Stage>>);

    impl SplitProgressCallback for Stages {
        fn on_stage(&self, stage: Stage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let cb = Arc::new(Stages::default());
        let mut config = offline();
        config.progress_callback = Some(cb.clone());
        process_document(&prospectus(), &config).await.unwrap();
        assert_eq!(
            *cb.0.lock().unwrap(),
            vec![Stage::Headings, Stage::Sections, Stage::TableContexts]
        );
    }

    #[test]
    fn pre_built_completer_wins() {
        let completer: Arc<dyn Completer> = Arc::new(ScriptedCompleter::new());
        let config = SplitConfig::builder().completer(completer.clone()).build().unwrap();
        let resolved = resolve_completer(&config).unwrap();
        assert!(Arc::ptr_eq(&resolved, &completer));
    }

    #[test]
    fn summary_counts_structure() {
        let summary = summarize(&prospectus(), 50);
        assert_eq!(summary.paragraphs, 9);
        assert_eq!(summary.tables, 1);
        assert_eq!(
            summary.first_level_titles,
            vec!["目录", "声明", "第一节 发行概况", "第二节 财务会计信息"]
        );
        assert_eq!(summary.outline_entries, 0);
    }
}
