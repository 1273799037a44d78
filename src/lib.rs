//! # prospectus-split
//!
//! Segment Chinese bond-prospectus `.docx` files into titled sections and
//! pick out the financial tables a credit report needs.
//!
//! ## Why this crate?
//!
//! Prospectuses are long, loosely styled Word documents. Their outline
//! metadata is incomplete, headings are often plain paragraphs with a
//! numbering prefix, and the same statement may appear several times
//! (issuer, guarantor, breakdowns). This crate combines deterministic rules
//! with a small number of short LLM questions: is this paragraph a heading,
//! what is this table, and which of these candidate tables is the one we
//! want.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .docx
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Read       zip + XML → paragraphs, tables, styles, numbering
//!  ├─ 3. Headings   outline levels, rule cascade, LLM fallback
//!  ├─ 4. Sections   breadcrumb path → paragraphs and tables
//!  ├─ 5. Tables     menu + preceding text per table, fragments merged
//!  ├─ 6. Select     LLM feature per table, fuzzy filter, LLM arbitration
//!  └─ 7. Assemble   unit, date, statements normalized to 亿
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prospectus_split::{process, SplitConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = SplitConfig::default();
//!     let output = process("prospectus.docx", &config).await?;
//!     for (path, items) in output.sections.iter() {
//!         println!("{path}: {} items", items.len());
//!     }
//!     if let Some(bs) = output.table_data.get("资产负债表") {
//!         println!("balance sheet in {:?}, as of {:?}", bs.unit, bs.date);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Sections alone need no model at all:
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), prospectus_split::SplitError> {
//! let config = prospectus_split::SplitConfig::builder()
//!     .llm_title_fallback(false)
//!     .extract_tables(false)
//!     .build()?;
//! let output = prospectus_split::process("prospectus.docx", &config).await?;
//! # Ok(()) }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `prospectus-split` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod targets;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{MergeGuard, SplitConfig, SplitConfigBuilder};
pub use document::{Block, Document, Paragraph};
pub use error::{ItemError, LlmError, SplitError};
pub use output::{
    BreadcrumbEntry, Cell, DocumentSummary, OutlineNode, ProcessOutput, ProcessStats, Sections, TableContext,
    TableData, TableDataSet, TableFeature, TargetTableMatch, Title,
};
pub use pipeline::llm::{Completer, ProviderCompleter};
pub use process::{inspect, process, process_document, process_from_bytes, process_sync, process_to_file};
pub use progress::{NoopProgressCallback, ProgressCallback, SplitProgressCallback, Stage};
pub use targets::TargetTable;
