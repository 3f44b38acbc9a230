//! Report generation for console and JSON output.

pub mod generator;

pub use generator::*;
