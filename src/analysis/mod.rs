//! Response analysis.
//!
//! Turns a stream of agent messages into a single aggregated result.

pub mod aggregator;

pub use aggregator::Aggregator;
