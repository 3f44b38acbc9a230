//! Access to the external agent.
//!
//! This module defines the query-stream seam and the process-backed source
//! that drives the agent CLI.

pub mod process;
pub mod query;

pub use process::ProcessQuery;
pub use query::{MessageStream, QueryOptions, QueryRequest, QuerySource};
