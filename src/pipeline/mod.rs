//! Pipeline stages for prospectus segmentation and table selection.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on an in-memory [`crate::document::Document`] without a file or
//! a model.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ docx ──▶ outline ──▶ title ──▶ breadcrumb ──▶ sections
//!                                             │
//!                                             └──▶ tables ──▶ selector ──▶ assemble
//!                                                              (LLM)     (annotate,
//!                                                                         normalize)
//! ```
//!
//! 1. [`input`]      : canonicalise the user-supplied path or URL to a local file
//! 2. [`docx`]       : unzip and parse body, styles and numbering
//! 3. [`outline`]    : resolved outline level per paragraph style
//! 4. [`title`]      : rule cascade, LLM fallback for undecided paragraphs
//! 5. [`breadcrumb`] : merge metadata outline and titles, one path per entry
//! 6. [`sections`]   : file every paragraph and table under its path
//! 7. [`tables`]     : table contexts with menu and preceding text
//! 8. [`selector`]   : LLM feature per table, fuzzy candidates via
//!    [`similarity`], LLM arbitration per target
//! 9. [`assemble`]   : unit and date via [`annotate`], statements via
//!    [`normalize`]
//!
//! [`llm`] holds the completion seam every LLM stage goes through.

pub mod annotate;
pub mod assemble;
pub mod breadcrumb;
pub mod docx;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod outline;
pub mod sections;
pub mod selector;
pub mod similarity;
pub mod tables;
pub mod title;
