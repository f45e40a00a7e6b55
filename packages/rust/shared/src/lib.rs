//! Shared types, error model, and configuration for FoldScape.
//!
//! This crate is the foundation depended on by all other FoldScape crates.
//! It provides:
//! - [`FoldscapeError`] — the unified error type
//! - The record schema ([`Record`], [`RepoMetadata`], [`Classification`],
//!   [`DomainSpecific`], [`Tracking`]) and its closed enumerations
//! - Configuration ([`AppConfig`], [`CategoryRules`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CategoryRule, CategoryRules, PathsConfig, VelocityConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{FoldscapeError, Result};
pub use types::{
    CANONICAL_URL_PREFIX, Category, Classification, CollectionMetadata, DomainSpecific,
    ExpressionSystem, GpuRequirement, Layer, Record, RepoMetadata, RunId, StarSample, Tracking,
    UnknownLabel, document_records, json_type,
};
