//! Configuration types for prospectus segmentation and table selection.
//!
//! All run behaviour is controlled through [`SplitConfig`], built via its
//! [`SplitConfigBuilder`]. The thresholds that used to be magic numbers
//! (fuzzy-match cut-off, attempt bound, preceding-text window) live here so
//! two runs can be diffed by their configs.

use crate::error::SplitError;
use crate::pipeline::llm::Completer;
use crate::progress::ProgressCallback;
use crate::targets::TargetTable;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for one prospectus run.
///
/// Built via [`SplitConfig::builder()`] or using [`SplitConfig::default()`].
///
/// # Example
/// ```rust
/// use prospectus_split::SplitConfig;
///
/// let config = SplitConfig::builder()
///     .concurrency(8)
///     .similarity_threshold(0.8)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SplitConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini", "qwen3-32b".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "ollama").
    /// If None along with `provider` and `completer`, the environment decides.
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-built completion collaborator. Takes precedence over everything
    /// else; tests and callers with their own client plug in here.
    pub completer: Option<Arc<dyn Completer>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// The replies are short JSON objects; a low temperature keeps them
    /// parseable.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 4096.
    pub max_tokens: usize,

    /// Attempts per table or target when the reply is malformed. Default: 3.
    ///
    /// The attempt number is written into the prompt on every try.
    pub max_attempts: u32,

    /// Transport retries per completion call on provider errors. Default: 2.
    pub transport_retries: u32,

    /// Initial transport retry delay in milliseconds (exponential). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Concurrent feature/arbitration calls. Default: 4.
    pub concurrency: usize,

    /// A table is a candidate for a target when the sequence-matching ratio
    /// between its declared type and the target name is strictly above this.
    /// Default: 0.8.
    pub similarity_threshold: f64,

    /// Longest text (in characters) that can still be a heading. Default: 50.
    pub title_max_chars: usize,

    /// Longest metadata-outline entry (in characters). Default: 80.
    pub outline_max_chars: usize,

    /// Lines of text kept as a table's preceding context. Default: 2.
    pub preceding_window: usize,

    /// Rows of a table rendered into prompts. Default: 40.
    pub preview_rows: usize,

    /// Ask the LLM about headings the rule cascade cannot decide. Default: true.
    ///
    /// When false those paragraphs are treated as body text.
    pub llm_title_fallback: bool,

    /// Drop tables whose preceding text names no financial statement before
    /// any LLM call. Default: true.
    pub keyword_filter: bool,

    /// Run table feature generation and target selection. Default: true.
    ///
    /// With this off and `llm_title_fallback` off the run needs no LLM.
    pub extract_tables: bool,

    /// Guard on merging caption-less consecutive tables.
    pub merge_guard: MergeGuard,

    /// Title of the synthetic section that holds the front matter.
    /// Default: "募集信息".
    pub front_matter_title: String,

    /// Target tables to resolve. Default: all of [`TargetTable::ALL`].
    pub targets: Vec<TargetTable>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            completer: None,
            temperature: 0.2,
            max_tokens: 4096,
            max_attempts: 3,
            transport_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            concurrency: 4,
            similarity_threshold: 0.8,
            title_max_chars: 50,
            outline_max_chars: 80,
            preceding_window: 2,
            preview_rows: 40,
            llm_title_fallback: true,
            keyword_filter: true,
            extract_tables: true,
            merge_guard: MergeGuard::default(),
            front_matter_title: "募集信息".to_string(),
            targets: TargetTable::ALL.to_vec(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SplitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("completer", &self.completer.as_ref().map(|_| "<dyn Completer>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("transport_retries", &self.transport_retries)
            .field("concurrency", &self.concurrency)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("llm_title_fallback", &self.llm_title_fallback)
            .field("keyword_filter", &self.keyword_filter)
            .field("extract_tables", &self.extract_tables)
            .field("merge_guard", &self.merge_guard)
            .field("targets", &self.targets)
            .finish()
    }
}

impl SplitConfig {
    /// Create a new builder for `SplitConfig`.
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when some stage of this run will call the LLM.
    pub fn needs_llm(&self) -> bool {
        self.llm_title_fallback || (self.extract_tables && !self.targets.is_empty())
    }
}

/// Builder for [`SplitConfig`].
#[derive(Debug)]
pub struct SplitConfigBuilder {
    config: SplitConfig,
}

impl SplitConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn completer(mut self, completer: Arc<dyn Completer>) -> Self {
        self.config.completer = Some(completer);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn transport_retries(mut self, n: u32) -> Self {
        self.config.transport_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn similarity_threshold(mut self, t: f64) -> Self {
        self.config.similarity_threshold = t;
        self
    }

    pub fn title_max_chars(mut self, n: usize) -> Self {
        self.config.title_max_chars = n;
        self
    }

    pub fn outline_max_chars(mut self, n: usize) -> Self {
        self.config.outline_max_chars = n;
        self
    }

    pub fn preceding_window(mut self, n: usize) -> Self {
        self.config.preceding_window = n;
        self
    }

    pub fn preview_rows(mut self, n: usize) -> Self {
        self.config.preview_rows = n.max(1);
        self
    }

    pub fn llm_title_fallback(mut self, v: bool) -> Self {
        self.config.llm_title_fallback = v;
        self
    }

    pub fn keyword_filter(mut self, v: bool) -> Self {
        self.config.keyword_filter = v;
        self
    }

    pub fn extract_tables(mut self, v: bool) -> Self {
        self.config.extract_tables = v;
        self
    }

    pub fn merge_guard(mut self, guard: MergeGuard) -> Self {
        self.config.merge_guard = guard;
        self
    }

    pub fn front_matter_title(mut self, title: impl Into<String>) -> Self {
        self.config.front_matter_title = title.into();
        self
    }

    pub fn targets(mut self, targets: Vec<TargetTable>) -> Self {
        self.config.targets = targets;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SplitConfig, SplitError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.similarity_threshold) {
            return Err(SplitError::InvalidConfig(format!(
                "Similarity threshold must be within 0–1, got {}",
                c.similarity_threshold
            )));
        }
        if c.max_attempts == 0 {
            return Err(SplitError::InvalidConfig("Max attempts must be ≥ 1".into()));
        }
        if c.concurrency == 0 {
            return Err(SplitError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.preceding_window == 0 {
            return Err(SplitError::InvalidConfig(
                "Preceding text window must be ≥ 1; with 0 every table would merge into the one before it".into(),
            ));
        }
        if c.title_max_chars == 0 {
            return Err(SplitError::InvalidConfig("Title length limit must be ≥ 1".into()));
        }
        if let Some(0) = c.merge_guard.max_rows {
            return Err(SplitError::InvalidConfig(
                "Merge row limit must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Merge guard ──────────────────────────────────────────────────────────

/// Limits on merging a caption-less table into the previous one.
///
/// The default allows every merge: a table met with no text since the last
/// table is treated as its continuation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeGuard {
    /// Refuse a merge that would grow the context beyond this many rows.
    pub max_rows: Option<usize>,
    /// Refuse a merge between fragments of different column counts.
    pub require_same_width: bool,
}

impl MergeGuard {
    /// Whether a fragment of `add_rows` × `add_width` may be appended to a
    /// context holding `rows` × `width`.
    pub fn allows(&self, rows: usize, width: usize, add_rows: usize, add_width: usize) -> bool {
        if let Some(max) = self.max_rows {
            if rows + add_rows > max {
                return false;
            }
        }
        !(self.require_same_width && width != add_width)
    }
}
