//! Shared data structures used across the analysis and compiler modules.
//!
//! - [`BitSet`] - Dense bit vector for live sets and visited marks
//! - [`graph`] - Directed graphs and the ordering/reachability algorithms over them

mod bitset;

pub mod graph;

pub use bitset::BitSet;
