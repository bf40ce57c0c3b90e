//! The round-based routing engine.
//!
//! This module implements the core query algorithm: rounds alternating
//! route scans and footpath relaxation, driven either for a single
//! departure time or swept across a departure-time window with dominance
//! filtering of the found alternatives.

mod config;
mod rank;
mod search;
mod state;

#[cfg(test)]
mod search_tests;

pub use config::RaptorParameters;
pub use rank::{deduplicate, filter_routes, remove_dominated};
pub use search::{InitialStop, RaptorEngine};
