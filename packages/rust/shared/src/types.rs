//! Core domain types for the FoldScape catalog.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{FoldscapeError, Result};

/// Every `metadata.url` must start with this prefix when non-empty.
pub const CANONICAL_URL_PREFIX: &str = "https://github.com/";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Closed enumerations
// ---------------------------------------------------------------------------

/// Returned by `FromStr` on the closed enumerations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} label '{label}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

/// Top-level catalog category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Infrastructure")]
    Infrastructure,
    #[serde(rename = "Core Methods")]
    CoreMethods,
    #[serde(rename = "Applications")]
    Applications,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::Infrastructure, Self::CoreMethods, Self::Applications];

    /// Wire label, as stored in `classification.category`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "Infrastructure",
            Self::CoreMethods => "Core Methods",
            Self::Applications => "Applications",
        }
    }
}

/// Stack layer; mirrors [`Category`] one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    #[serde(rename = "Layer 1: Infrastructure")]
    Infrastructure,
    #[serde(rename = "Layer 2: Core Methods")]
    CoreMethods,
    #[serde(rename = "Layer 3: Applications")]
    Applications,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Self::Infrastructure, Self::CoreMethods, Self::Applications];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "Layer 1: Infrastructure",
            Self::CoreMethods => "Layer 2: Core Methods",
            Self::Applications => "Layer 3: Applications",
        }
    }
}

/// Minimum hardware needed to run a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuRequirement {
    #[serde(rename = "CPU-only")]
    CpuOnly,
    #[serde(rename = "<8GB")]
    Under8Gb,
    #[serde(rename = "8-24GB")]
    From8To24Gb,
    #[serde(rename = ">24GB")]
    Over24Gb,
    #[serde(rename = "Multi-GPU")]
    MultiGpu,
}

impl GpuRequirement {
    pub const ALL: [GpuRequirement; 5] = [
        Self::CpuOnly,
        Self::Under8Gb,
        Self::From8To24Gb,
        Self::Over24Gb,
        Self::MultiGpu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpuOnly => "CPU-only",
            Self::Under8Gb => "<8GB",
            Self::From8To24Gb => "8-24GB",
            Self::Over24Gb => ">24GB",
            Self::MultiGpu => "Multi-GPU",
        }
    }
}

/// Protein expression system a tool's designs were validated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionSystem {
    #[serde(rename = "E.coli")]
    EColi,
    #[serde(rename = "HEK293")]
    Hek293,
    #[serde(rename = "Yeast")]
    Yeast,
    #[serde(rename = "Cell-free")]
    CellFree,
    #[serde(rename = "Insect")]
    Insect,
    #[serde(rename = "CHO")]
    Cho,
}

impl ExpressionSystem {
    pub const ALL: [ExpressionSystem; 6] = [
        Self::EColi,
        Self::Hek293,
        Self::Yeast,
        Self::CellFree,
        Self::Insect,
        Self::Cho,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EColi => "E.coli",
            Self::Hek293 => "HEK293",
            Self::Yeast => "Yeast",
            Self::CellFree => "Cell-free",
            Self::Insect => "Insect",
            Self::Cho => "CHO",
        }
    }
}

/// Display and `FromStr` both go through the wire label.
macro_rules! label_conversions {
    ($ty:ty, $kind:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownLabel {
                        kind: $kind,
                        label: s.to_string(),
                    })
            }
        }
    };
}

label_conversions!(Category, "category");
label_conversions!(Layer, "layer");
label_conversions!(GpuRequirement, "gpu_requirement");
label_conversions!(ExpressionSystem, "expression system");

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One tracked repository: the unit of storage and validation.
///
/// Keys this model does not know about are kept in `extra` so a rewrite of
/// the store never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// `owner/name`; unique within a record set.
    pub repo_id: String,
    pub metadata: RepoMetadata,
    #[serde(default, deserialize_with = "null_as_default")]
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_specific: Option<DomainSpecific>,
    pub tracking: Tracking,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// A freshly collected record: unclassified, with `first_tracked` stamped.
    pub fn new(
        repo_id: impl Into<String>,
        metadata: RepoMetadata,
        first_tracked: DateTime<Utc>,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            metadata,
            classification: Classification::default(),
            domain_specific: None,
            tracking: Tracking::new(first_tracked),
            extra: Map::new(),
        }
    }
}

/// Repository facts as reported by the source host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    pub stars: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forks: u64,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    /// Order carries no meaning.
    #[serde(default, deserialize_with = "null_as_default")]
    pub topics: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RepoMetadata {
    pub fn new(name: impl Into<String>, url: impl Into<String>, stars: u64) -> Self {
        Self {
            name: name.into(),
            description: None,
            url: url.into(),
            stars,
            forks: 0,
            last_updated: None,
            created_at: None,
            language: None,
            license: None,
            topics: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Catalog placement. `None` means "not yet categorized".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default, deserialize_with = "optional_label")]
    pub category: Option<Category>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default, deserialize_with = "optional_label")]
    pub layer: Option<Layer>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Hand-curated domain facts. Only the two enumerated fields are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainSpecific {
    #[serde(default, deserialize_with = "optional_label")]
    pub gpu_requirement: Option<GpuRequirement>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expression_systems: Vec<ExpressionSystem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tracking fields. Everything except `first_tracked` is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracking {
    /// Stamped once by the collector; never rewritten downstream.
    pub first_tracked: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub star_velocity_7d: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub star_velocity_30d: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trending: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tracking {
    pub fn new(first_tracked: DateTime<Utc>) -> Self {
        Self {
            first_tracked: first_tracked.to_rfc3339(),
            star_velocity_7d: 0,
            star_velocity_30d: 0,
            trending: false,
            extra: Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot and companion types
// ---------------------------------------------------------------------------

/// The part of a historical snapshot entry the velocity engine needs.
///
/// `stars` is `None` when the snapshot entry had no usable star count; such
/// entries are treated as absent from history rather than as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarSample {
    pub repo_id: String,
    pub stars: Option<i64>,
}

impl StarSample {
    /// Lenient extraction from a raw snapshot entry. Entries without a string
    /// `repo_id` yield `None`.
    pub fn from_value(entry: &Value) -> Option<Self> {
        let repo_id = entry.get("repo_id")?.as_str()?.to_string();
        let stars = entry
            .get("metadata")
            .and_then(|m| m.get("stars"))
            .and_then(Value::as_i64);
        Some(Self { repo_id, stars })
    }
}

impl From<&Record> for StarSample {
    fn from(record: &Record) -> Self {
        Self {
            repo_id: record.repo_id.clone(),
            stars: i64::try_from(record.metadata.stars).ok(),
        }
    }
}

/// The `metadata.json` companion written next to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// ISO-8601 timestamp of the last store rewrite.
    pub collected_at: String,
    pub repo_count: usize,
    /// Hex SHA-256 of the store file as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Split a store or snapshot document into its record values.
///
/// The root may be an array of records or an object keyed by `repo_id`;
/// anything else is a parse error.
pub fn document_records(document: &Value) -> Result<Vec<&Value>> {
    match document {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(map) => Ok(map.values().collect()),
        other => Err(FoldscapeError::parse(format!(
            "root must be an array or object, got {}",
            json_type(other)
        ))),
    }
}

/// JSON type name as used in error messages.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse an optional enumerated label; `null` and `""` both mean unset.
fn optional_label<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = UnknownLabel>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector_shaped() -> Value {
        serde_json::json!({
            "repo_id": "aqlaboratory/openfold",
            "metadata": {
                "name": "openfold",
                "description": "Trainable, memory-efficient PyTorch reproduction of AlphaFold 2",
                "url": "https://github.com/aqlaboratory/openfold",
                "stars": 2900,
                "forks": 560,
                "last_updated": "2025-01-10T08:00:00+00:00",
                "created_at": "2021-09-01T12:00:00+00:00",
                "language": "Python",
                "license": "Apache License 2.0",
                "topics": ["protein-structure", "alphafold"]
            },
            "classification": {"category": null, "subcategory": null, "layer": null},
            "domain_specific": {
                "experimental_validation": null,
                "expression_systems": [],
                "gpu_requirement": null,
                "input_types": [],
                "output_formats": []
            },
            "tracking": {
                "first_tracked": "2025-01-12T09:30:00.123456",
                "star_velocity_7d": 0,
                "star_velocity_30d": 0,
                "trending": false
            },
            "academic": {"doi": "10.1101/2022.11.20.517210"}
        })
    }

    #[test]
    fn category_labels_roundtrip() {
        for category in Category::ALL {
            let parsed: Category = category.as_str().parse().expect("parse label");
            assert_eq!(parsed, category);
        }
        assert_eq!(Category::CoreMethods.to_string(), "Core Methods");
        assert!("core methods".parse::<Category>().is_err());
    }

    #[test]
    fn unknown_label_names_the_enumeration() {
        let err = "A100".parse::<GpuRequirement>().unwrap_err();
        assert_eq!(err.to_string(), "invalid gpu_requirement label 'A100'");
    }

    #[test]
    fn serde_uses_wire_labels() {
        let json = serde_json::to_string(&GpuRequirement::Under8Gb).expect("serialize");
        assert_eq!(json, "\"<8GB\"");
        let parsed: ExpressionSystem = serde_json::from_str("\"E.coli\"").expect("deserialize");
        assert_eq!(parsed, ExpressionSystem::EColi);
    }

    #[test]
    fn decodes_collector_output() {
        let record: Record = serde_json::from_value(collector_shaped()).expect("decode");
        assert_eq!(record.repo_id, "aqlaboratory/openfold");
        assert_eq!(record.metadata.stars, 2900);
        assert_eq!(record.classification.category, None);
        let domain = record.domain_specific.as_ref().expect("domain_specific");
        assert!(domain.expression_systems.is_empty());
        assert!(domain.extra.contains_key("input_types"));
    }

    #[test]
    fn unknown_fields_survive_rewrite() {
        let record: Record = serde_json::from_value(collector_shaped()).expect("decode");
        let back = serde_json::to_value(&record).expect("encode");
        assert_eq!(back["academic"]["doi"], "10.1101/2022.11.20.517210");
        assert_eq!(back["domain_specific"]["experimental_validation"], Value::Null);
        assert_eq!(back["tracking"]["first_tracked"], "2025-01-12T09:30:00.123456");
    }

    #[test]
    fn blank_and_null_labels_mean_unset() {
        let mut value = collector_shaped();
        value["classification"]["category"] = Value::String(String::new());
        value["domain_specific"]["expression_systems"] = Value::Null;
        let record: Record = serde_json::from_value(value).expect("decode");
        assert_eq!(record.classification.category, None);
        assert!(record.domain_specific.expect("domain").expression_systems.is_empty());
    }

    #[test]
    fn invalid_label_is_rejected_at_decode() {
        let mut value = collector_shaped();
        value["classification"]["category"] = Value::String("Tools".into());
        let err = serde_json::from_value::<Record>(value).unwrap_err();
        assert!(err.to_string().contains("invalid category label 'Tools'"));
    }

    #[test]
    fn negative_stars_cannot_be_decoded() {
        let mut value = collector_shaped();
        value["metadata"]["stars"] = serde_json::json!(-1);
        assert!(serde_json::from_value::<Record>(value).is_err());
    }

    #[test]
    fn star_sample_is_lenient() {
        let full = StarSample::from_value(&collector_shaped()).expect("sample");
        assert_eq!(full.stars, Some(2900));

        let no_stars = serde_json::json!({"repo_id": "a/b", "metadata": {"name": "b"}});
        let sample = StarSample::from_value(&no_stars).expect("sample");
        assert_eq!(sample.stars, None);

        assert!(StarSample::from_value(&serde_json::json!({"metadata": {}})).is_none());
    }

    #[test]
    fn document_roots() {
        let list = serde_json::json!([{"repo_id": "a/b"}]);
        assert_eq!(document_records(&list).expect("list").len(), 1);

        let map = serde_json::json!({"a/b": {"repo_id": "a/b"}, "c/d": {"repo_id": "c/d"}});
        assert_eq!(document_records(&map).expect("map").len(), 2);

        let err = document_records(&serde_json::json!(3)).unwrap_err();
        assert_eq!(err.to_string(), "parse error: root must be an array or object, got integer");
    }

    #[test]
    fn new_record_is_unclassified() {
        let record = Record::new(
            "a/b",
            RepoMetadata::new("b", "https://github.com/a/b", 5),
            Utc::now(),
        );
        assert_eq!(record.classification, Classification::default());
        assert!(!record.tracking.trending);
        assert!(record.tracking.first_tracked.contains('T'));
    }

    #[test]
    fn repos_fixture_decodes() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/repos.fixture.json")
            .expect("read fixture");
        let records: Vec<Record> = serde_json::from_str(&fixture).expect("decode fixture");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].classification.category, Some(Category::Applications));
    }
}
