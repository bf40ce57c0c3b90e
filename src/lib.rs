//! Round-based public transit router.
//!
//! Computes least-generalized-cost journeys on a precompiled transit
//! network, answering: "leaving around this time, how do I best get from
//! these access stops to these egress stops?"
//!
//! The engine is a RAPTOR variant that replaces time dominance with
//! generalized-cost dominance, so two departures of the same physical
//! route (identical travel cost, different waiting cost) stay
//! distinguishable. See [`planner::RaptorEngine`] for the two query entry
//! points and [`network::NetworkBuilder`] for assembling the flat network
//! representation the engine scans.

pub mod domain;
pub mod network;
pub mod planner;
