//! Domain types for the transit router.
//!
//! This module contains the types that make up a routing result. Results
//! are built leg by leg by the planner and are plain data from the
//! caller's point of view; all times are seconds since midnight and all
//! costs are generalized-cost units (negated utility).

mod journey;
mod mode;

pub use journey::{PlanElements, RaptorRoute, RouteLeg, WalkMode};
pub use mode::Mode;
