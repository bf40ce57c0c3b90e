//! Mutable per-query scratch state of the engine.

use std::rc::Rc;

use fixedbitset::FixedBitSet;

use crate::network::RouteStopIndex;

use super::search::InitialStop;

/// One node in the predecessor graph of a query.
///
/// Path elements are immutable once created and share their predecessor
/// chain; a chain always terminates at an access element
/// (`coming_from == None`, `initial_stop` set). At most two scratch slots
/// and any built results keep an element alive.
#[derive(Debug)]
pub(crate) struct PathElement {
    pub coming_from: Option<Rc<PathElement>>,
    /// The route stop this element arrives at; `None` only for the
    /// terminal element recording the egress leg.
    pub to_route_stop: Option<RouteStopIndex>,
    /// Boarding time of the first vehicle on the journey; `None` until a
    /// vehicle has been boarded.
    pub first_departure_time: Option<f64>,
    pub arrival_time: f64,
    pub arrival_travel_cost: f64,
    pub arrival_transfer_cost: f64,
    pub distance: f64,
    /// Number of transfer elements on the chain, not counting the access
    /// element.
    pub transfer_count: usize,
    pub is_transfer: bool,
    /// The access or egress leg, set on chain roots and terminals.
    pub initial_stop: Option<InitialStop>,
}

impl PathElement {
    /// Travel plus transfer cost of arriving here.
    pub fn total_cost(&self) -> f64 {
        self.arrival_travel_cost + self.arrival_transfer_cost
    }
}

/// The engine's scratch arrays, sized once from the network counts and
/// reset at the start of every query.
pub(crate) struct SearchState {
    pub arrival_path_per_route_stop: Vec<Option<Rc<PathElement>>>,
    pub egress_costs_per_route_stop: Vec<f64>,
    pub least_arrival_cost_at_route_stop: Vec<f64>,
    pub least_arrival_cost_at_stop: Vec<f64>,
    pub improved_route_stops: FixedBitSet,
    /// Scratch within route exploration only; carries nothing between
    /// rounds or queries.
    pub reached_route_stops: FixedBitSet,
    pub improved_stops: FixedBitSet,
    pub destination_route_stops: FixedBitSet,
    pub best_arrival_cost: f64,
    pub arrival_path_per_stop: Vec<Option<Rc<PathElement>>>,
    /// Staging slot so a transfer relaxed in this round cannot seed
    /// another transfer within the same round.
    pub tmp_arrival_path_per_stop: Vec<Option<Rc<PathElement>>>,
    pub tmp_improved_stops: FixedBitSet,
}

impl SearchState {
    pub fn new(count_route_stops: usize, count_stops: usize) -> Self {
        Self {
            arrival_path_per_route_stop: vec![None; count_route_stops],
            egress_costs_per_route_stop: vec![f64::INFINITY; count_route_stops],
            least_arrival_cost_at_route_stop: vec![f64::INFINITY; count_route_stops],
            least_arrival_cost_at_stop: vec![f64::INFINITY; count_stops],
            improved_route_stops: FixedBitSet::with_capacity(count_route_stops),
            reached_route_stops: FixedBitSet::with_capacity(count_route_stops),
            improved_stops: FixedBitSet::with_capacity(count_stops),
            destination_route_stops: FixedBitSet::with_capacity(count_route_stops),
            best_arrival_cost: f64::INFINITY,
            arrival_path_per_stop: vec![None; count_stops],
            tmp_arrival_path_per_stop: vec![None; count_stops],
            tmp_improved_stops: FixedBitSet::with_capacity(count_stops),
        }
    }

    /// Returns the state to its pristine form for the next query.
    pub fn reset(&mut self) {
        self.arrival_path_per_route_stop.fill(None);
        self.egress_costs_per_route_stop.fill(f64::INFINITY);
        self.arrival_path_per_stop.fill(None);
        self.tmp_arrival_path_per_stop.fill(None);
        self.least_arrival_cost_at_route_stop.fill(f64::INFINITY);
        self.least_arrival_cost_at_stop.fill(f64::INFINITY);
        self.improved_route_stops.clear();
        self.reached_route_stops.clear();
        self.improved_stops.clear();
        self.destination_route_stops.clear();
        self.tmp_improved_stops.clear();
        self.best_arrival_cost = f64::INFINITY;
    }
}
