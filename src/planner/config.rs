//! Cost parameters for the routing engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::Mode;

/// Generalized-cost parameters of a query.
///
/// Marginal utilities follow the usual scoring convention: they are
/// utility per second and therefore negative for time spent travelling
/// or waiting. The engine negates them where a positive cost is needed.
///
/// # Examples
///
/// ```
/// use transit_raptor::domain::Mode;
/// use transit_raptor::planner::RaptorParameters;
///
/// let mut parameters = RaptorParameters::default();
/// parameters
///     .marginal_utility_of_travel_time_utl_s
///     .insert("rail".to_string(), -8.0 / 3600.0);
///
/// let rail = parameters.marginal_utility_of_travel_time(&Mode::new("rail"));
/// let bus = parameters.marginal_utility_of_travel_time(&Mode::new("bus"));
/// assert!(rail < bus);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaptorParameters {
    /// Marginal utility of waiting for a vehicle, per second.
    pub marginal_utility_of_waiting_pt_utl_s: f64,

    /// Factor converting travel time since the first boarding into an
    /// additional per-transfer cost.
    pub transfer_penalty_travel_time_to_cost_factor: f64,

    /// Per-mode marginal utility of in-vehicle time, per second.
    pub marginal_utility_of_travel_time_utl_s: HashMap<String, f64>,

    /// Fallback marginal utility of in-vehicle time for modes without an
    /// explicit entry.
    pub default_marginal_utility_of_travel_time_utl_s: f64,
}

impl RaptorParameters {
    /// Returns the marginal utility of in-vehicle time for `mode`,
    /// falling back to the default for unknown modes.
    pub fn marginal_utility_of_travel_time(&self, mode: &Mode) -> f64 {
        self.marginal_utility_of_travel_time_utl_s
            .get(mode.as_str())
            .copied()
            .unwrap_or(self.default_marginal_utility_of_travel_time_utl_s)
    }
}

impl Default for RaptorParameters {
    fn default() -> Self {
        Self {
            marginal_utility_of_waiting_pt_utl_s: -1.0 / 3600.0,
            transfer_penalty_travel_time_to_cost_factor: 0.0,
            marginal_utility_of_travel_time_utl_s: HashMap::new(),
            default_marginal_utility_of_travel_time_utl_s: -6.0 / 3600.0,
        }
    }
}
