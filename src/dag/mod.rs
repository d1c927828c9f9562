// src/dag/mod.rs

//! Node graph representation.
//!
//! [`graph`] holds the prerequisite map, its reverse adjacency and the
//! in-degree counters that decide when a node becomes ready.

pub mod graph;

pub use graph::GraphModel;
