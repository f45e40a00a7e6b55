//! Structural validation of a record collection: the publish gate.
//!
//! Works on the raw JSON document rather than on typed [`Record`]s so that
//! every schema violation in a batch is reported, not just the first one a
//! deserializer would trip over. Only a broken document root is fatal.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use foldscape_shared::{
    CANONICAL_URL_PREFIX, Category, ExpressionSystem, FoldscapeError, GpuRequirement, Layer,
    Record, Result, document_records, json_type,
};

/// One schema violation, attributed to a record and a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralError {
    pub repo_id: String,
    pub field: String,
    pub message: String,
}

impl StructuralError {
    pub fn new(repo_id: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.repo_id, self.field, self.message)
    }
}

/// How much of the collection carries curated fields. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub total: usize,
    pub categorized: usize,
    pub with_gpu_requirement: usize,
    pub with_expression_systems: usize,
}

impl Coverage {
    /// Integer percentage of `count` over the collection size.
    pub fn percent(&self, count: usize) -> usize {
        if self.total == 0 {
            0
        } else {
            100 * count / self.total
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Number of records examined.
    pub record_count: usize,
    /// Every violation, in collection order.
    pub errors: Vec<StructuralError>,
    /// Non-fatal notes (e.g. an empty collection).
    pub warnings: Vec<String>,
    pub coverage: Coverage,
}

impl ValidationReport {
    /// True iff no structural error was found.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a whole store document.
pub fn validate_document(document: &Value) -> Result<ValidationReport> {
    let entries = document_records(document)?;
    Ok(validate_entries(&entries))
}

/// Validate typed records by checking their serialized form.
pub fn validate_records(records: &[Record]) -> Result<ValidationReport> {
    let document = serde_json::to_value(records).map_err(|e| {
        FoldscapeError::validation(format!("JSON serialization failed: {e}"))
    })?;
    validate_document(&document)
}

/// Validate a list of raw record values.
#[instrument(skip_all, fields(records = entries.len()))]
pub fn validate_entries(entries: &[&Value]) -> ValidationReport {
    let mut report = ValidationReport {
        record_count: entries.len(),
        ..Default::default()
    };

    if entries.is_empty() {
        warn!("no records in collection");
        report.warnings.push("no records in collection".to_string());
        return report;
    }

    let mut seen: HashSet<&str> = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        if let Some(repo_id) = entry.get("repo_id").and_then(Value::as_str) {
            if !repo_id.is_empty() && !seen.insert(repo_id) {
                report
                    .errors
                    .push(StructuralError::new(repo_id, "repo_id", "duplicate"));
            }
        }

        validate_entry(entry, index, &mut report.errors);
    }

    report.coverage = coverage(entries);

    info!(
        records = report.record_count,
        errors = report.errors.len(),
        categorized = report.coverage.categorized,
        "validation complete"
    );

    report
}

// ---------------------------------------------------------------------------
// Per-record checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Expect {
    String,
    Integer,
    /// Fits the signed 64-bit tracking counters.
    SignedInteger,
    Boolean,
    Array,
    StringList,
    Object,
}

impl Expect {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::SignedInteger => value.is_i64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Object => value.is_object(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer | Self::SignedInteger => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::StringList => "array of strings",
            Self::Object => "object",
        }
    }
}

const REQUIRED_TOP_LEVEL: &[(&str, Expect)] = &[
    ("repo_id", Expect::String),
    ("metadata", Expect::Object),
    ("tracking", Expect::Object),
];

const REQUIRED_METADATA: &[(&str, Expect)] = &[
    ("name", Expect::String),
    ("url", Expect::String),
    ("stars", Expect::Integer),
];

/// May be absent or null, but must have this type otherwise.
const OPTIONAL_METADATA: &[(&str, Expect)] = &[
    ("description", Expect::String),
    ("forks", Expect::Integer),
    ("last_updated", Expect::String),
    ("created_at", Expect::String),
    ("language", Expect::String),
    ("license", Expect::String),
    ("topics", Expect::StringList),
];

const OPTIONAL_TRACKING: &[(&str, Expect)] = &[
    ("star_velocity_7d", Expect::SignedInteger),
    ("star_velocity_30d", Expect::SignedInteger),
    ("trending", Expect::Boolean),
];

fn validate_entry(entry: &Value, index: usize, errors: &mut Vec<StructuralError>) {
    let fallback_id = format!("repo_index_{index}");

    let Some(record) = entry.as_object() else {
        errors.push(StructuralError::new(
            &fallback_id,
            "record",
            wrong_type(Expect::Object, entry),
        ));
        return;
    };

    let id = record
        .get("repo_id")
        .and_then(Value::as_str)
        .unwrap_or(fallback_id.as_str());

    check_required(record, REQUIRED_TOP_LEVEL, "", id, errors);

    if let Some(Value::Object(metadata)) = record.get("metadata") {
        validate_metadata(metadata, id, errors);
    }

    if let Some(Value::Object(tracking)) = record.get("tracking") {
        check_required(
            tracking,
            &[("first_tracked", Expect::String)],
            "tracking.",
            id,
            errors,
        );
        check_optional(tracking, OPTIONAL_TRACKING, "tracking.", id, errors);
    }

    match record.get("classification") {
        None | Some(Value::Null) => {}
        Some(Value::Object(classification)) => {
            check_label::<Category>(classification, "category", "classification.category", id, errors);
            check_optional(
                classification,
                &[("subcategory", Expect::String)],
                "classification.",
                id,
                errors,
            );
            check_label::<Layer>(classification, "layer", "classification.layer", id, errors);
        }
        Some(other) => errors.push(StructuralError::new(
            id,
            "classification",
            wrong_type(Expect::Object, other),
        )),
    }

    match record.get("domain_specific") {
        None | Some(Value::Null) => {}
        Some(Value::Object(domain)) => validate_domain(domain, id, errors),
        Some(other) => errors.push(StructuralError::new(
            id,
            "domain_specific",
            wrong_type(Expect::Object, other),
        )),
    }
}

fn validate_metadata(metadata: &Map<String, Value>, id: &str, errors: &mut Vec<StructuralError>) {
    check_required(metadata, REQUIRED_METADATA, "metadata.", id, errors);
    check_optional(metadata, OPTIONAL_METADATA, "metadata.", id, errors);

    for field in ["stars", "forks"] {
        if let Some(count) = metadata.get(field).and_then(Value::as_i64) {
            if count < 0 {
                errors.push(StructuralError::new(
                    id,
                    format!("metadata.{field}"),
                    "cannot be negative",
                ));
            }
        }
    }

    if let Some(url) = metadata.get("url").and_then(Value::as_str) {
        if !url.is_empty() && !url.starts_with(CANONICAL_URL_PREFIX) {
            errors.push(StructuralError::new(id, "metadata.url", "must be a GitHub URL"));
        }
    }
}

fn validate_domain(domain: &Map<String, Value>, id: &str, errors: &mut Vec<StructuralError>) {
    match domain.get("gpu_requirement") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.is_empty() => {}
        Some(_) => check_label::<GpuRequirement>(
            domain,
            "gpu_requirement",
            "domain_specific.gpu_requirement",
            id,
            errors,
        ),
    }

    match domain.get("expression_systems") {
        None | Some(Value::Null) => {}
        Some(Value::Array(systems)) => {
            for system in systems {
                if !is_label::<ExpressionSystem>(system) {
                    errors.push(StructuralError::new(
                        id,
                        "domain_specific.expression_systems",
                        format!("invalid value: {}", display_value(system)),
                    ));
                }
            }
        }
        Some(other) => errors.push(StructuralError::new(
            id,
            "domain_specific.expression_systems",
            wrong_type(Expect::Array, other),
        )),
    }
}

fn check_required(
    object: &Map<String, Value>,
    fields: &[(&str, Expect)],
    prefix: &str,
    id: &str,
    errors: &mut Vec<StructuralError>,
) {
    for &(field, expect) in fields {
        match object.get(field) {
            None => errors.push(StructuralError::new(
                id,
                format!("{prefix}{field}"),
                "missing required field",
            )),
            Some(value) if !expect.matches(value) => errors.push(StructuralError::new(
                id,
                format!("{prefix}{field}"),
                wrong_type(expect, value),
            )),
            Some(_) => {}
        }
    }
}

fn check_optional(
    object: &Map<String, Value>,
    fields: &[(&str, Expect)],
    prefix: &str,
    id: &str,
    errors: &mut Vec<StructuralError>,
) {
    for &(field, expect) in fields {
        match object.get(field) {
            None | Some(Value::Null) => {}
            Some(value) if !expect.matches(value) => errors.push(StructuralError::new(
                id,
                format!("{prefix}{field}"),
                wrong_type(expect, value),
            )),
            Some(_) => {}
        }
    }
}

/// A present, non-null value must be one of the enumeration's labels.
fn check_label<T: FromStr>(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    id: &str,
    errors: &mut Vec<StructuralError>,
) {
    match object.get(key) {
        None | Some(Value::Null) => {}
        Some(value) if is_label::<T>(value) => {}
        Some(value) => errors.push(StructuralError::new(
            id,
            path,
            format!("invalid value: {}", display_value(value)),
        )),
    }
}

fn is_label<T: FromStr>(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.parse::<T>().is_ok())
}

fn wrong_type(expect: Expect, got: &Value) -> String {
    format!("wrong type: expected {}, got {}", expect.name(), json_type(got))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

fn coverage(entries: &[&Value]) -> Coverage {
    let non_empty_str = |v: Option<&Value>| v.and_then(Value::as_str).is_some_and(|s| !s.is_empty());

    let mut coverage = Coverage {
        total: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        if non_empty_str(entry.pointer("/classification/category")) {
            coverage.categorized += 1;
        }
        if non_empty_str(entry.pointer("/domain_specific/gpu_requirement")) {
            coverage.with_gpu_requirement += 1;
        }
        if entry
            .pointer("/domain_specific/expression_systems")
            .and_then(Value::as_array)
            .is_some_and(|a| !a.is_empty())
        {
            coverage.with_expression_systems += 1;
        }
    }

    debug!(?coverage, "coverage computed");
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_record(repo_id: &str, stars: i64) -> Value {
        json!({
            "repo_id": repo_id,
            "metadata": {
                "name": repo_id.rsplit('/').next().unwrap_or(repo_id),
                "description": null,
                "url": format!("https://github.com/{repo_id}"),
                "stars": stars,
                "forks": 3,
                "last_updated": null,
                "topics": []
            },
            "classification": {"category": "Core Methods", "subcategory": null, "layer": null},
            "domain_specific": {"gpu_requirement": "CPU-only", "expression_systems": ["Yeast"]},
            "tracking": {"first_tracked": "2025-01-01T00:00:00"}
        })
    }

    fn fields_of(report: &ValidationReport) -> Vec<&str> {
        report.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn clean_collection_is_valid() {
        let doc = json!([valid_record("a/b", 120), valid_record("c/d", 0)]);
        let report = validate_document(&doc).expect("validate");
        assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);
        assert_eq!(report.record_count, 2);
    }

    #[test]
    fn single_duplicate_adds_exactly_one_error() {
        let doc = json!([valid_record("a/b", 1), valid_record("c/d", 2), valid_record("a/b", 3)]);
        let report = validate_document(&doc).expect("validate");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].repo_id, "a/b");
        assert_eq!(report.errors[0].field, "repo_id");
        assert_eq!(report.errors[0].message, "duplicate");
    }

    #[test]
    fn triple_occurrence_flags_second_and_third() {
        let doc = json!([valid_record("a/b", 1), valid_record("a/b", 2), valid_record("a/b", 3)]);
        let report = validate_document(&doc).expect("validate");
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn negative_stars_reported() {
        let doc = json!([valid_record("a/b", -1)]);
        let report = validate_document(&doc).expect("validate");
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].field, "metadata.stars");
        assert_eq!(report.errors[0].message, "cannot be negative");
    }

    #[test]
    fn negative_forks_reported() {
        let mut record = valid_record("a/b", 5);
        record["metadata"]["forks"] = json!(-2);
        let report = validate_document(&json!([record])).expect("validate");
        assert_eq!(fields_of(&report), vec!["metadata.forks"]);
    }

    #[test]
    fn missing_required_fields() {
        let doc = json!([{"metadata": {"name": "x"}}]);
        let report = validate_document(&doc).expect("validate");
        let fields = fields_of(&report);
        assert!(fields.contains(&"repo_id"));
        assert!(fields.contains(&"tracking"));
        assert!(fields.contains(&"metadata.url"));
        assert!(fields.contains(&"metadata.stars"));
        assert!(report.errors.iter().all(|e| e.repo_id == "repo_index_0"));
    }

    #[test]
    fn last_updated_may_be_absent_or_null() {
        let mut record = valid_record("a/b", 1);
        record["metadata"]
            .as_object_mut()
            .expect("metadata object")
            .remove("last_updated");
        let report = validate_document(&json!([record])).expect("validate");
        assert!(report.is_valid());
    }

    #[test]
    fn wrong_types_are_named() {
        let mut record = valid_record("a/b", 1);
        record["metadata"]["stars"] = json!("many");
        record["tracking"] = json!([]);
        let report = validate_document(&json!([record])).expect("validate");
        let messages: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        assert!(messages.contains(&"a/b -> tracking: wrong type: expected object, got array".to_string()));
        assert!(messages.contains(
            &"a/b -> metadata.stars: wrong type: expected integer, got string".to_string()
        ));
    }

    #[test]
    fn non_github_url_rejected() {
        let mut record = valid_record("a/b", 1);
        record["metadata"]["url"] = json!("https://gitlab.com/a/b");
        let report = validate_document(&json!([record])).expect("validate");
        assert_eq!(report.errors[0].message, "must be a GitHub URL");

        let mut empty_url = valid_record("c/d", 1);
        empty_url["metadata"]["url"] = json!("");
        assert!(validate_document(&json!([empty_url])).expect("validate").is_valid());
    }

    #[test]
    fn missing_first_tracked() {
        let mut record = valid_record("a/b", 1);
        record["tracking"] = json!({"trending": false});
        let report = validate_document(&json!([record])).expect("validate");
        assert_eq!(fields_of(&report), vec!["tracking.first_tracked"]);
    }

    #[test]
    fn unset_category_is_valid_unknown_is_not() {
        let mut unset = valid_record("a/b", 1);
        unset["classification"]["category"] = Value::Null;
        let mut unknown = valid_record("c/d", 1);
        unknown["classification"]["category"] = json!("Tools");

        let report = validate_document(&json!([unset, unknown])).expect("validate");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].to_string(), "c/d -> classification.category: invalid value: Tools");
    }

    #[test]
    fn layer_checked_against_enumeration() {
        let mut record = valid_record("a/b", 1);
        record["classification"]["layer"] = json!("Layer 9: Everything");
        let report = validate_document(&json!([record])).expect("validate");
        assert_eq!(fields_of(&report), vec!["classification.layer"]);
    }

    #[test]
    fn domain_enumerations_checked() {
        let mut record = valid_record("a/b", 1);
        record["domain_specific"] = json!({
            "gpu_requirement": "A100",
            "expression_systems": ["E.coli", "Tobacco", "Mouse"],
            "input_types": ["anything goes"]
        });
        let report = validate_document(&json!([record])).expect("validate");
        assert_eq!(
            fields_of(&report),
            vec![
                "domain_specific.gpu_requirement",
                "domain_specific.expression_systems",
                "domain_specific.expression_systems",
            ]
        );
    }

    #[test]
    fn blank_gpu_requirement_is_unset() {
        let mut record = valid_record("a/b", 1);
        record["domain_specific"]["gpu_requirement"] = json!("");
        assert!(validate_document(&json!([record])).expect("validate").is_valid());
    }

    #[test]
    fn id_keyed_map_is_accepted() {
        let doc = json!({"a/b": valid_record("a/b", 1), "c/d": valid_record("c/d", 2)});
        let report = validate_document(&doc).expect("validate");
        assert!(report.is_valid());
        assert_eq!(report.record_count, 2);
    }

    #[test]
    fn empty_collection_is_valid_with_warning() {
        let report = validate_document(&json!([])).expect("validate");
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn scalar_root_is_fatal() {
        let err = validate_document(&json!("repos")).unwrap_err();
        assert!(matches!(err, FoldscapeError::Parse { .. }));
    }

    #[test]
    fn non_object_entry_reported() {
        let report = validate_document(&json!([valid_record("a/b", 1), 42])).expect("validate");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].repo_id, "repo_index_1");
        assert_eq!(report.errors[0].field, "record");
    }

    #[test]
    fn coverage_never_affects_verdict() {
        let mut bare = valid_record("c/d", 1);
        bare["classification"] = Value::Null;
        bare["domain_specific"] = Value::Null;
        let report = validate_document(&json!([valid_record("a/b", 1), bare])).expect("validate");
        assert!(report.is_valid());
        assert_eq!(report.coverage.categorized, 1);
        assert_eq!(report.coverage.with_gpu_requirement, 1);
        assert_eq!(report.coverage.with_expression_systems, 1);
        assert_eq!(report.coverage.percent(report.coverage.categorized), 50);
    }

    #[test]
    fn optional_fields_are_typed_when_present() {
        let mut record = valid_record("a/b", 1);
        record["metadata"]["forks"] = json!("12");
        record["metadata"]["description"] = json!(42);
        record["metadata"]["topics"] = json!("alphafold");
        record["tracking"]["trending"] = json!("yes");
        record["classification"]["subcategory"] = json!(["x"]);
        let report = validate_document(&json!([record])).expect("validate");
        let mut fields = fields_of(&report);
        fields.sort_unstable();
        assert_eq!(
            fields,
            vec![
                "classification.subcategory",
                "metadata.description",
                "metadata.forks",
                "metadata.topics",
                "tracking.trending",
            ]
        );
    }

    #[test]
    fn topics_must_all_be_strings() {
        let mut record = valid_record("a/b", 1);
        record["metadata"]["topics"] = json!(["protein", 7]);
        let report = validate_document(&json!([record])).expect("validate");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            report.errors[0].message,
            "wrong type: expected array of strings, got array"
        );
    }

    #[test]
    fn nulls_in_optional_fields_are_valid_and_decode() {
        let mut record = valid_record("a/b", 1);
        for field in ["description", "forks", "created_at", "language", "license", "topics"] {
            record["metadata"][field] = Value::Null;
        }
        record["tracking"]["star_velocity_7d"] = Value::Null;
        record["tracking"]["trending"] = Value::Null;
        let document = json!([record]);
        assert!(validate_document(&document).expect("validate").is_valid());
        assert!(serde_json::from_value::<Vec<Record>>(document).is_ok());
    }

    #[test]
    fn gate_rejects_whatever_the_typed_model_cannot_decode() {
        let breakages: &[(&str, &str, Value)] = &[
            ("metadata", "forks", json!("12")),
            ("metadata", "forks", json!(1.5)),
            ("metadata", "description", json!(42)),
            ("metadata", "language", json!(false)),
            ("metadata", "license", json!({"key": "mit"})),
            ("metadata", "created_at", json!(20240101)),
            ("metadata", "topics", json!("alphafold")),
            ("classification", "subcategory", json!(3)),
            ("classification", "category", json!(1)),
            ("tracking", "star_velocity_7d", json!("20")),
            ("tracking", "star_velocity_30d", json!(u64::MAX)),
            ("tracking", "trending", json!(1)),
        ];
        for (section, field, value) in breakages {
            let mut record = valid_record("a/b", 1);
            record[*section][*field] = value.clone();
            let document = json!([record]);
            assert!(
                serde_json::from_value::<Vec<Record>>(document.clone()).is_err(),
                "{section}.{field} = {value} should not decode"
            );
            let report = validate_document(&document).expect("validate");
            assert!(
                !report.is_valid(),
                "{section}.{field} = {value} passed the gate"
            );
        }
    }

    #[test]
    fn typed_records_validate() {
        let records: Vec<Record> =
            serde_json::from_value(json!([valid_record("a/b", 7)])).expect("decode");
        let report = validate_records(&records).expect("validate");
        assert!(report.is_valid());
    }
}
