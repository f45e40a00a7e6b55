//! Catalog domain logic for FoldScape.
//!
//! The three record transformations ([`categorize`], [`velocity`],
//! [`validate`]) are pure, synchronous passes over an in-memory collection.
//! [`pipeline`] strings them together around the file store.

pub mod categorize;
pub mod pipeline;
pub mod validate;
pub mod velocity;
