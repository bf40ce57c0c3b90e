//! Routing result types.
//!
//! A [`RaptorRoute`] is an ordered sequence of legs: an access walk (or
//! host-provided plan elements), transit rides, interchange walks, and an
//! egress walk. The planner builds it leg by leg while walking the found
//! path chain forward.

use std::sync::Arc;

use super::Mode;

/// Pre-built legs supplied by the host for an access or egress leg.
///
/// When the host has already rendered the access sub-journey (for example
/// a routed walk to the first stop), the planner passes it through
/// verbatim as a [`RouteLeg::Plan`] leg instead of synthesizing a plain
/// walk.
pub type PlanElements = Arc<Vec<RouteLeg>>;

/// The flavour of a non-transit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// An interchange walk between two stop facilities.
    Transit,
    /// The walk from the origin to the first stop facility.
    Access,
    /// The walk from the last stop facility to the destination.
    Egress,
}

impl WalkMode {
    /// Returns the conventional mode string for this walk.
    pub fn as_str(self) -> &'static str {
        match self {
            WalkMode::Transit => "transit_walk",
            WalkMode::Access => "access_walk",
            WalkMode::Egress => "egress_walk",
        }
    }
}

/// One leg of a routing result.
///
/// Stop facilities are referenced by their index in the network the query
/// ran against; `None` marks the query origin or destination (outside the
/// network).
#[derive(Debug, Clone)]
pub enum RouteLeg {
    /// A ride on a transit vehicle.
    Pt {
        from_stop: Option<usize>,
        to_stop: Option<usize>,
        line: Arc<str>,
        route: Arc<str>,
        mode: Mode,
        dep_time: f64,
        travel_time: f64,
        distance: f64,
    },
    /// A walk (interchange, access or egress).
    Walk {
        from_stop: Option<usize>,
        to_stop: Option<usize>,
        mode: WalkMode,
        dep_time: f64,
        travel_time: f64,
        distance: f64,
    },
    /// Host-provided plan elements standing in for an access/egress leg.
    Plan {
        dep_time: f64,
        travel_time: f64,
        elements: PlanElements,
    },
}

impl RouteLeg {
    /// Returns the departure time of this leg.
    pub fn dep_time(&self) -> f64 {
        match self {
            RouteLeg::Pt { dep_time, .. }
            | RouteLeg::Walk { dep_time, .. }
            | RouteLeg::Plan { dep_time, .. } => *dep_time,
        }
    }

    /// Returns the travel time of this leg.
    pub fn travel_time(&self) -> f64 {
        match self {
            RouteLeg::Pt { travel_time, .. }
            | RouteLeg::Walk { travel_time, .. }
            | RouteLeg::Plan { travel_time, .. } => *travel_time,
        }
    }

    /// Returns true if this is a transit ride.
    pub fn is_pt(&self) -> bool {
        matches!(self, RouteLeg::Pt { .. })
    }
}

/// A complete routing result.
///
/// Legs are appended in travel order. An empty route with infinite
/// arrival cost means "no route found".
#[derive(Debug, Clone)]
pub struct RaptorRoute {
    arrival_cost: f64,
    legs: Vec<RouteLeg>,
    departure_time: f64,
    end_time: f64,
    transfer_count: usize,
}

impl RaptorRoute {
    /// Creates an empty route with the given total arrival cost.
    pub fn new(arrival_cost: f64) -> Self {
        Self {
            arrival_cost,
            legs: Vec::new(),
            departure_time: f64::NAN,
            end_time: f64::NAN,
            transfer_count: 0,
        }
    }

    /// Appends a transit ride.
    #[allow(clippy::too_many_arguments)]
    pub fn add_pt(
        &mut self,
        from_stop: Option<usize>,
        to_stop: Option<usize>,
        line: Arc<str>,
        route: Arc<str>,
        mode: Mode,
        dep_time: f64,
        travel_time: f64,
        distance: f64,
    ) {
        self.note_times(dep_time, travel_time);
        self.legs.push(RouteLeg::Pt {
            from_stop,
            to_stop,
            line,
            route,
            mode,
            dep_time,
            travel_time,
            distance,
        });
    }

    /// Appends a walk leg.
    pub fn add_non_pt(
        &mut self,
        from_stop: Option<usize>,
        to_stop: Option<usize>,
        dep_time: f64,
        travel_time: f64,
        distance: f64,
        mode: WalkMode,
    ) {
        self.note_times(dep_time, travel_time);
        if mode == WalkMode::Transit {
            self.transfer_count += 1;
        }
        self.legs.push(RouteLeg::Walk {
            from_stop,
            to_stop,
            mode,
            dep_time,
            travel_time,
            distance,
        });
    }

    /// Appends host-provided plan elements as one leg.
    pub fn add_plan_elements(&mut self, dep_time: f64, travel_time: f64, elements: PlanElements) {
        self.note_times(dep_time, travel_time);
        self.legs.push(RouteLeg::Plan {
            dep_time,
            travel_time,
            elements,
        });
    }

    fn note_times(&mut self, dep_time: f64, travel_time: f64) {
        if self.departure_time.is_nan() {
            self.departure_time = dep_time;
        }
        self.end_time = dep_time + travel_time;
    }

    /// The total generalized cost of arriving, including access and
    /// egress legs. Infinite when no route was found.
    pub fn arrival_cost(&self) -> f64 {
        self.arrival_cost
    }

    /// The legs of this route, in travel order.
    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    /// The number of transfers: interchange walks between two rides.
    /// Access and egress walks do not count.
    pub fn number_of_transfers(&self) -> usize {
        self.transfer_count
    }

    /// The departure time of the first leg. NaN for an empty route.
    pub fn departure_time(&self) -> f64 {
        self.departure_time
    }

    /// Total duration from first departure to final arrival. NaN for an
    /// empty route.
    pub fn travel_time(&self) -> f64 {
        self.end_time - self.departure_time
    }
}
