//! Keyword/override category assignment.
//!
//! A manual override always wins. Otherwise the rules are walked in order and
//! the first keyword found in the record's name, description and topics
//! decides the category. First match, not best match.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use foldscape_shared::{Category, CategoryRules, Record};

/// Summary of one categorization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategorizeReport {
    /// Records that ended up with a category.
    pub categorized: usize,
    /// How many of those came from `overrides`.
    pub from_overrides: usize,
    /// Records no override or keyword matched, in collection order.
    pub uncategorized: Vec<String>,
    /// Record count per assigned category.
    pub breakdown: BTreeMap<Category, usize>,
}

/// Decide the category of a single record.
pub fn category_of(record: &Record, rules: &CategoryRules) -> Option<Category> {
    if let Some(category) = rules.overrides.get(&record.repo_id) {
        return Some(*category);
    }

    let haystack = search_text(record);

    rules.rules.iter().find_map(|rule| {
        rule.keywords
            .iter()
            .any(|keyword| haystack.contains(&keyword.to_lowercase()))
            .then_some(rule.category)
    })
}

/// Assign `classification.category` on every record.
///
/// Leaves `subcategory` and `layer` alone. Running it twice with the same
/// rules changes nothing the second time.
#[instrument(skip_all, fields(records = records.len(), rules = rules.rules.len()))]
pub fn categorize(records: &mut [Record], rules: &CategoryRules) -> CategorizeReport {
    let mut report = CategorizeReport::default();

    for record in records.iter_mut() {
        let category = category_of(record, rules);
        record.classification.category = category;

        match category {
            Some(category) => {
                report.categorized += 1;
                if rules.overrides.contains_key(&record.repo_id) {
                    report.from_overrides += 1;
                }
                *report.breakdown.entry(category).or_default() += 1;
                debug!(repo_id = %record.repo_id, %category, "categorized");
            }
            None => report.uncategorized.push(record.repo_id.clone()),
        }
    }

    info!(
        categorized = report.categorized,
        overrides = report.from_overrides,
        uncategorized = report.uncategorized.len(),
        "categorization complete"
    );

    report
}

/// Null out `classification.category` labels that are not a known category.
///
/// Runs on the raw document ahead of the input gate when the categorize stage
/// will reassign every category anyway. Returns the affected `repo_id`s.
pub fn clear_unknown_categories(document: &mut Value) -> Vec<String> {
    let entries: Vec<&mut Value> = match document {
        Value::Array(items) => items.iter_mut().collect(),
        Value::Object(map) => map.values_mut().collect(),
        _ => return Vec::new(),
    };

    let mut cleared = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let repo_id = entry
            .get("repo_id")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("repo_index_{index}"));
        let Some(category) = entry.pointer_mut("/classification/category") else {
            continue;
        };
        let known = match &*category {
            Value::Null => true,
            Value::String(label) => label.parse::<Category>().is_ok(),
            _ => false,
        };
        if !known {
            warn!(%repo_id, label = %category, "clearing unknown category label");
            *category = Value::Null;
            cleared.push(repo_id);
        }
    }
    cleared
}

/// `"{name} {description} {topics...}"`, lower-cased.
fn search_text(record: &Record) -> String {
    let metadata = &record.metadata;
    format!(
        "{} {} {}",
        metadata.name,
        metadata.description.as_deref().unwrap_or(""),
        metadata.topics.join(" ")
    )
    .to_lowercase()
}
