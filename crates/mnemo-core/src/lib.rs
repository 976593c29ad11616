//! Core types and trait definitions for the mnemo knowledge graph.
//!
//! This crate is deliberately free of database and I/O dependencies.
//! Storage backends and the graph orchestrator depend on it; it depends on
//! nothing but serde.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod graph;
pub mod relation;
pub mod store;

pub use entity::{Entity, ObservationAdditions, ObservationBatch, ObservationDeletion};
pub use graph::{KnowledgeGraph, StoreStats};
pub use relation::Relation;
pub use store::GraphStore;
