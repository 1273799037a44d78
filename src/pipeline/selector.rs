//! Table features and target-table arbitration.
//!
//! Two LLM passes pick at most one physical table per target:
//!
//! 1. **Features**: every candidate table is described as a [`TableFeature`]
//!    whose type comes from a closed vocabulary (plus `其他表`).
//! 2. **Arbitration**: for each target, tables whose declared type is
//!    similar enough to the target name are offered to the model with the
//!    target's description; the model answers with one table id, or `"0"`
//!    when none fits.
//!
//! Prospectuses repeat each statement several times (different periods,
//! the guarantor's copy, partial cuts), so the cheap type filter narrows the
//! field before the arbitration call. Both passes fan out with
//! `buffered(concurrency)`, which keeps results in input order. A table or
//! target that exhausts its attempts is recorded as a non-fatal failure.

use crate::config::SplitConfig;
use crate::error::ItemError;
use crate::output::{TableContext, TableFeature, TargetTableMatch};
use crate::pipeline::llm::{list_field, parse_json_object, string_field, Completer};
use crate::pipeline::similarity::ratio;
use crate::prompts::{table_feature_prompt, target_table_prompt};
use crate::targets::TargetTable;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Id reply meaning "none of the candidates fits".
pub const NO_MATCH_ID: &str = "0";

static RE_TABLE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9\-]{4,}$").unwrap());

// ── Field labels ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    TableType,
    Section,
    Title,
    Header,
    Keywords,
    TimeSeries,
}

/// Reply/prompt label of every feature field, with the English key some
/// models answer with instead.
const FIELD_LABELS: &[(Field, &str, &str)] = &[
    (Field::TableType, "表格类型", "table_type"),
    (Field::Section, "所属章节", "section"),
    (Field::Title, "表格标题", "title"),
    (Field::Header, "表头", "header"),
    (Field::Keywords, "关键词", "keywords"),
    (Field::TimeSeries, "时间序列", "time_series"),
];

fn keys(field: Field) -> [&'static str; 2] {
    FIELD_LABELS
        .iter()
        .find(|(f, _, _)| *f == field)
        .map(|(_, zh, en)| [*zh, *en])
        .unwrap_or(["", ""])
}

fn label(field: Field) -> &'static str {
    keys(field)[0]
}

/// Read a feature out of a parsed reply; absent fields stay empty.
pub fn feature_from_reply(id: &str, value: &Value) -> TableFeature {
    let text = |field| string_field(value, &keys(field)).unwrap_or_default();
    let list = |field| list_field(value, &keys(field));
    TableFeature {
        id: id.to_string(),
        table_type: text(Field::TableType),
        section: text(Field::Section),
        title: text(Field::Title),
        header: list(Field::Header),
        keywords: list(Field::Keywords),
        time_series: list(Field::TimeSeries),
    }
}

/// A feature as shown to the arbiter: the id plus the labelled fields.
pub fn feature_to_prompt_value(feature: &TableFeature) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), Value::from(feature.id.as_str()));
    map.insert(label(Field::TableType).into(), Value::from(feature.table_type.as_str()));
    map.insert(label(Field::Section).into(), Value::from(feature.section.as_str()));
    map.insert(label(Field::Title).into(), Value::from(feature.title.as_str()));
    map.insert(label(Field::Header).into(), Value::from(feature.header.clone()));
    map.insert(label(Field::Keywords).into(), Value::from(feature.keywords.clone()));
    map.insert(label(Field::TimeSeries).into(), Value::from(feature.time_series.clone()));
    Value::Object(map)
}

// ── Features ─────────────────────────────────────────────────────────────

/// Describe every table, in input order.
///
/// Each table gets up to `max_attempts` requests; an attempt succeeds when
/// the reply parses and names a type. A table that never does keeps its id
/// and whatever fields the last parsed reply carried.
pub async fn generate_features(
    completer: &dyn Completer,
    contexts: &[TableContext],
    vocabulary: &[&str],
    config: &SplitConfig,
) -> (Vec<TableFeature>, Vec<ItemError>) {
    let total = contexts.len();
    let results: Vec<Result<TableFeature, (TableFeature, String)>> =
        stream::iter(contexts.iter().enumerate().map(|(index, ctx)| async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_table_start(index, total);
            }
            let result = describe_table(completer, ctx, vocabulary, config.max_attempts).await;
            if let Some(ref cb) = config.progress_callback {
                match &result {
                    Ok(feature) => cb.on_table_complete(index, total, &feature.table_type),
                    Err((_, detail)) => cb.on_table_error(index, total, detail),
                }
            }
            result
        }))
        .buffered(config.concurrency)
        .collect()
        .await;

    let mut features = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(feature) => features.push(feature),
            Err((feature, detail)) => {
                warn!("Table {}: no usable feature after {} attempts: {}", feature.id, config.max_attempts, detail);
                failures.push(ItemError::FeatureExtractionFailed {
                    table_id: feature.id.clone(),
                    attempts: config.max_attempts,
                    detail,
                });
                features.push(feature);
            }
        }
    }
    info!("Described {} tables ({} without a type)", total, failures.len());
    (features, failures)
}

async fn describe_table(
    completer: &dyn Completer,
    ctx: &TableContext,
    vocabulary: &[&str],
    max_attempts: u32,
) -> Result<TableFeature, (TableFeature, String)> {
    let mut feature = TableFeature {
        id: ctx.id.clone(),
        ..Default::default()
    };
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=max_attempts {
        let prompt = table_feature_prompt(ctx, vocabulary, attempt);
        match completer.complete(&prompt).await {
            Ok(reply) => match parse_json_object(&reply) {
                Some(value) => {
                    feature = feature_from_reply(&ctx.id, &value);
                    if !feature.table_type.is_empty() {
                        debug!("Table {}: '{}' (attempt {})", ctx.id, feature.table_type, attempt);
                        return Ok(feature);
                    }
                    last_error = "missing table type".to_string();
                }
                None => last_error = "reply is not a JSON object".to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
        debug!("Table {}: attempt {} failed: {}", ctx.id, attempt, last_error);
    }
    Err((feature, last_error))
}

// ── Arbitration ──────────────────────────────────────────────────────────

/// Features whose declared type scores above `threshold` against `name`.
pub fn candidates_for<'a>(name: &str, features: &'a [TableFeature], threshold: f64) -> Vec<&'a TableFeature> {
    features
        .iter()
        .filter(|f| ratio(name, &f.table_type) > threshold)
        .collect()
}

/// Bind each target to at most one table id, in target order.
///
/// Targets without candidates are skipped without a request. A reply is
/// accepted only when its id is well-formed and one of the candidates';
/// the `"0"` sentinel and anything else is retried up to `max_attempts`.
pub async fn select_targets(
    completer: &dyn Completer,
    features: &[TableFeature],
    targets: &[TargetTable],
    config: &SplitConfig,
) -> (Vec<TargetTableMatch>, Vec<ItemError>) {
    let results: Vec<Option<Result<TargetTableMatch, ItemError>>> =
        stream::iter(targets.iter().map(|&target| async move {
            let candidates = candidates_for(target.name(), features, config.similarity_threshold);
            let result = if candidates.is_empty() {
                debug!("Target {}: no candidate tables", target.name());
                None
            } else {
                Some(arbitrate(completer, target, &candidates, config.max_attempts).await)
            };
            if let Some(ref cb) = config.progress_callback {
                let id = match &result {
                    Some(Ok(m)) => Some(m.id.as_str()),
                    _ => None,
                };
                cb.on_target_resolved(target.name(), id);
            }
            result
        }))
        .buffered(config.concurrency)
        .collect()
        .await;

    let mut matches = Vec::new();
    let mut failures = Vec::new();
    for result in results.into_iter().flatten() {
        match result {
            Ok(m) => matches.push(m),
            Err(e) => failures.push(e),
        }
    }
    info!(
        "Resolved {} of {} targets ({} unresolved)",
        matches.len(),
        targets.len(),
        failures.len()
    );
    (matches, failures)
}

async fn arbitrate(
    completer: &dyn Completer,
    target: TargetTable,
    candidates: &[&TableFeature],
    max_attempts: u32,
) -> Result<TargetTableMatch, ItemError> {
    let listing: Vec<Value> = candidates.iter().map(|f| feature_to_prompt_value(f)).collect();
    let listing = Value::from(listing).to_string();
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=max_attempts {
        let prompt = target_table_prompt(target.description(), &listing, attempt);
        match completer.complete(&prompt).await {
            Ok(reply) => match parse_json_object(&reply).and_then(|v| string_field(&v, &["id"])) {
                Some(id) => match check_id(&id, candidates) {
                    Ok(()) => {
                        debug!(
                            "Target {}: table {} among {} candidates (attempt {})",
                            target.name(),
                            id,
                            candidates.len(),
                            attempt
                        );
                        return Ok(TargetTableMatch {
                            name: target.name().to_string(),
                            id,
                        });
                    }
                    Err(reason) => last_error = reason,
                },
                None => last_error = "reply has no id".to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
        debug!("Target {}: attempt {} rejected: {}", target.name(), attempt, last_error);
    }

    warn!("Target {}: unresolved after {} attempts: {}", target.name(), max_attempts, last_error);
    Err(ItemError::TargetUnresolved {
        target: target.name().to_string(),
        attempts: max_attempts,
        detail: last_error,
    })
}

fn check_id(id: &str, candidates: &[&TableFeature]) -> Result<(), String> {
    if id == NO_MATCH_ID {
        return Err("model found no fitting table".to_string());
    }
    if !RE_TABLE_ID.is_match(id) {
        return Err(format!("malformed id '{}'", id));
    }
    if !candidates.iter().any(|f| f.id == id) {
        return Err(format!("id '{}' not among candidates", id));
    }
    Ok(())
}
