//! Network construction errors.
//!
//! These errors represent validation failures while assembling the flat
//! network representation. Queries themselves never fail with an error;
//! an unreachable destination simply yields no result.

/// Errors raised by [`super::NetworkBuilder`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// A transfer references a stop facility that was never declared.
    #[error("unknown stop facility: {0}")]
    UnknownStop(String),

    /// A route needs at least two stops to be rideable.
    #[error("route {0} needs at least two stops")]
    TooFewStops(String),

    /// A route without departures can never be boarded.
    #[error("route {0} has no departures")]
    NoDepartures(String),

    /// The minimal transfer time must be non-negative.
    #[error("minimal transfer time must be non-negative, got {0}")]
    NegativeTransferTime(f64),
}
