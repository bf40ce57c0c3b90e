//! The flat, index-dense network representation the engine scans.
//!
//! All identifiers are small integers indexing flat arrays: route stops
//! of one route are contiguous and in travel order, the departures of one
//! route form a sorted segment, and the outgoing transfers of one route
//! stop are contiguous. The planner holds a shared handle and only ever
//! reads; building happens once up front via [`NetworkBuilder`].

mod builder;
mod error;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Mode;

pub use builder::NetworkBuilder;
pub use error::NetworkError;

/// Index of a route in [`TransitNetwork::routes`].
pub type RouteIndex = usize;
/// Index of a route stop in [`TransitNetwork::route_stops`].
pub type RouteStopIndex = usize;
/// Index of a stop facility in [`TransitNetwork::stop_facilities`].
pub type StopIndex = usize;

/// One transit route: a stop pattern with a set of departures.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// First entry of this route in `route_stops`.
    pub index_first_route_stop: usize,
    /// Number of stops along this route.
    pub count_route_stops: usize,
    /// First entry of this route in `departures`.
    pub index_first_departure: usize,
    /// Number of departures of this route.
    pub count_departures: usize,
}

/// One position in a route's stop sequence.
#[derive(Debug, Clone)]
pub struct RouteStopEntry {
    /// The route this stop belongs to.
    pub transit_route_index: RouteIndex,
    /// The stop facility visited at this position.
    pub stop_facility_index: StopIndex,
    /// Vehicle arrival at this stop, as an offset from the route start.
    pub arrival_offset: f64,
    /// Vehicle departure from this stop, as an offset from the route start.
    pub departure_offset: f64,
    /// Driven distance from the route start to this stop.
    pub distance_along_route: f64,
    /// First outgoing transfer of this route stop in `transfers`.
    pub index_first_transfer: usize,
    /// Number of outgoing transfers.
    pub count_transfers: usize,
    /// Transport mode of the route, carried here for cost lookup.
    pub mode: Mode,
    /// Line identifier, emitted verbatim into result legs.
    pub line: Arc<str>,
    /// Route identifier, emitted verbatim into result legs.
    pub route: Arc<str>,
}

/// A walking edge from one route stop to another.
#[derive(Debug, Clone)]
pub struct TransferEntry {
    /// The route stop this transfer leads to.
    pub to_route_stop: RouteStopIndex,
    /// Walking duration in seconds.
    pub transfer_time: f64,
    /// Generalized cost of the walk.
    pub transfer_cost: f64,
    /// Walking distance in meters.
    pub transfer_distance: f64,
}

/// A physical stop, shared by the route stops of all routes calling there.
#[derive(Debug, Clone)]
pub struct StopFacility {
    /// Host-side identifier of this stop.
    pub id: Arc<str>,
}

/// The read-only network snapshot shared by all engine instances.
#[derive(Debug)]
pub struct TransitNetwork {
    /// All routes.
    pub routes: Vec<RouteEntry>,
    /// All route stops, contiguous per route and in travel order.
    pub route_stops: Vec<RouteStopEntry>,
    /// Start-of-route departure times, ascending within each route segment.
    pub departures: Vec<f64>,
    /// All transfers, contiguous per originating route stop.
    pub transfers: Vec<TransferEntry>,
    /// All stop facilities.
    pub stop_facilities: Vec<StopFacility>,
    /// The route stops calling at each stop facility.
    pub route_stops_per_stop_facility: Vec<Vec<RouteStopIndex>>,
    /// Stop facility lookup by host identifier.
    pub stop_index_by_id: HashMap<Arc<str>, StopIndex>,
    /// Safety buffer subtracted when back-computing a departure time.
    pub minimal_transfer_time: f64,
}

impl TransitNetwork {
    /// Total number of route stops.
    pub fn count_route_stops(&self) -> usize {
        self.route_stops.len()
    }

    /// Total number of stop facilities.
    pub fn count_stops(&self) -> usize {
        self.stop_facilities.len()
    }

    /// Looks up a stop facility index by its host identifier.
    pub fn stop_index(&self, id: &str) -> Option<StopIndex> {
        self.stop_index_by_id.get(id).copied()
    }

    /// True if the given route stop is the last stop of its route, i.e.
    /// nothing can be reached by boarding there.
    pub fn is_last_stop_of_route(&self, route_stop_index: RouteStopIndex) -> bool {
        let route = &self.routes[self.route_stops[route_stop_index].transit_route_index];
        route_stop_index + 1 == route.index_first_route_stop + route.count_route_stops
    }
}
