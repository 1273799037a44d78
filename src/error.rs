//! Error types for the prospectus-split library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`SplitError`]: **Fatal.** The run cannot proceed at all (missing
//!   input file, not a `.docx`, provider not configured). Returned as
//!   `Err(SplitError)` from the top-level `process*` functions.
//!
//! * [`ItemError`]: **Non-fatal.** One table, one target or one heading
//!   candidate failed, but the rest of the document is fine. Collected in
//!   [`crate::output::ProcessOutput::failures`] so callers can inspect
//!   partial success instead of losing the whole prospectus to one
//!   malformed LLM reply.
//!
//! * [`LlmError`]: A single completion call failed. Stages convert it into
//!   an [`ItemError`] (or a conservative default) at their own boundary.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the prospectus-split library.
///
/// Item-level failures use [`ItemError`] and are stored in
/// [`crate::output::ProcessOutput`] rather than propagated here.
#[derive(Debug, Error)]
pub enum SplitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a zip container.
    #[error("File is not a valid .docx: '{path}'\nFirst bytes: {magic:?}")]
    NotADocx { path: PathBuf, magic: [u8; 4] },

    /// The file is a legacy binary Word document.
    #[error("'{path}' is a legacy .doc file.\nConvert it first: soffice --headless --convert-to docx {path:?}")]
    LegacyDoc { path: PathBuf },

    // ── Document errors ───────────────────────────────────────────────────
    /// The zip container or one of its XML parts cannot be parsed.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocx { path: PathBuf, detail: String },

    /// A mandatory part is missing from the package.
    #[error("Document '{path}' has no '{part}' part; it is not a Word document.")]
    MissingPart { path: PathBuf, part: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single heading candidate, table or target.
///
/// The run continues; the affected item is omitted or degraded.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The LLM heading fallback failed; the paragraph was treated as body text.
    #[error("Paragraph {paragraph}: heading classification failed: {detail}")]
    TitleClassificationFailed { paragraph: usize, detail: String },

    /// No usable table type after every attempt; the partial feature is kept.
    #[error("Table {table_id}: feature extraction failed after {attempts} attempts: {detail}")]
    FeatureExtractionFailed {
        table_id: String,
        attempts: u32,
        detail: String,
    },

    /// Candidates existed but arbitration never produced a valid id.
    #[error("Target '{target}': no valid table id after {attempts} attempts: {detail}")]
    TargetUnresolved {
        target: String,
        attempts: u32,
        detail: String,
    },

    /// Numeric normalization failed; the raw table was kept.
    #[error("Table '{table}': normalization failed, raw values kept: {detail}")]
    NormalizationFailed { table: String, detail: String },
}

/// A failed completion call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// The provider returned an error on every transport attempt.
    #[error("LLM API error: {message}")]
    Api { message: String },

    /// The call did not finish within the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered with no content.
    #[error("LLM returned an empty reply")]
    EmptyReply,
}
