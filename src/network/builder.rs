//! Assembly of the flat network representation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Mode;

use super::{
    NetworkError, RouteEntry, RouteIndex, RouteStopEntry, StopFacility, StopIndex, TransferEntry,
    TransitNetwork,
};

struct RouteSpec {
    line: Arc<str>,
    route: Arc<str>,
    mode: Mode,
    /// (facility, arrival offset, departure offset, distance along route)
    stops: Vec<(StopIndex, f64, f64, f64)>,
    departures: Vec<f64>,
}

struct TransferSpec {
    from_stop: StopIndex,
    to_stop: StopIndex,
    transfer_time: f64,
    transfer_cost: f64,
    transfer_distance: f64,
}

/// Builds a [`TransitNetwork`] from declared stops, routes and transfer
/// relations.
///
/// Routes are declared with per-stop offsets from the route start plus a
/// list of start-of-route departure times; transfers are declared between
/// stop facilities and expanded to route-stop pairs during [`build`],
/// which also lays out all flat arrays contiguously.
///
/// [`build`]: NetworkBuilder::build
///
/// # Examples
///
/// ```
/// use transit_raptor::network::NetworkBuilder;
///
/// let mut builder = NetworkBuilder::new();
/// builder
///     .add_route(
///         "L1",
///         "R1",
///         "bus",
///         &[("A", 0.0, 0.0, 0.0), ("B", 600.0, 600.0, 4000.0)],
///         &[28_800.0, 29_700.0],
///     )
///     .unwrap();
/// builder.add_transfer("B", "B", 60.0, 0.0, 0.0).unwrap();
/// let network = builder.build().unwrap();
///
/// assert_eq!(network.count_stops(), 2);
/// assert_eq!(network.routes[0].count_departures, 2);
/// ```
pub struct NetworkBuilder {
    stop_facilities: Vec<StopFacility>,
    stop_index_by_id: HashMap<Arc<str>, StopIndex>,
    routes: Vec<RouteSpec>,
    transfers: Vec<TransferSpec>,
    minimal_transfer_time: f64,
}

impl NetworkBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            stop_facilities: Vec::new(),
            stop_index_by_id: HashMap::new(),
            routes: Vec::new(),
            transfers: Vec::new(),
            minimal_transfer_time: 0.0,
        }
    }

    /// Sets the minimal transfer time used as a safety buffer when
    /// back-computing departure times.
    pub fn minimal_transfer_time(&mut self, seconds: f64) -> &mut Self {
        self.minimal_transfer_time = seconds;
        self
    }

    /// Declares a stop facility, returning its index. Declaring the same
    /// identifier twice returns the existing index.
    pub fn add_stop(&mut self, id: &str) -> StopIndex {
        if let Some(&index) = self.stop_index_by_id.get(id) {
            return index;
        }
        let id: Arc<str> = Arc::from(id);
        let index = self.stop_facilities.len();
        self.stop_facilities.push(StopFacility {
            id: Arc::clone(&id),
        });
        self.stop_index_by_id.insert(id, index);
        index
    }

    /// Declares a route.
    ///
    /// `stops` are `(facility id, arrival offset, departure offset,
    /// distance along route)` tuples in travel order; facilities are
    /// declared on the fly. `departures` are start-of-route times and are
    /// sorted by the builder.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than two stops or no departures are
    /// given.
    pub fn add_route(
        &mut self,
        line: &str,
        route: &str,
        mode: &str,
        stops: &[(&str, f64, f64, f64)],
        departures: &[f64],
    ) -> Result<RouteIndex, NetworkError> {
        let label = || format!("{line}/{route}");
        if stops.len() < 2 {
            return Err(NetworkError::TooFewStops(label()));
        }
        if departures.is_empty() {
            return Err(NetworkError::NoDepartures(label()));
        }

        let stops = stops
            .iter()
            .map(|&(id, arrival, departure, distance)| {
                (self.add_stop(id), arrival, departure, distance)
            })
            .collect();

        let mut departures = departures.to_vec();
        departures.sort_by(f64::total_cmp);

        let index = self.routes.len();
        self.routes.push(RouteSpec {
            line: Arc::from(line),
            route: Arc::from(route),
            mode: Mode::new(mode),
            stops,
            departures,
        });
        Ok(index)
    }

    /// Declares a transfer relation between two stop facilities.
    ///
    /// During [`build`](Self::build) the relation is expanded to a
    /// walking edge from every route stop at `from_stop` to every route
    /// stop at `to_stop`. Declaring a facility against itself makes
    /// same-stop interchanges between routes possible.
    ///
    /// # Errors
    ///
    /// Returns an error if either facility has not been declared.
    pub fn add_transfer(
        &mut self,
        from_stop: &str,
        to_stop: &str,
        transfer_time: f64,
        transfer_cost: f64,
        transfer_distance: f64,
    ) -> Result<(), NetworkError> {
        let from_stop = self
            .stop_index_by_id
            .get(from_stop)
            .copied()
            .ok_or_else(|| NetworkError::UnknownStop(from_stop.to_string()))?;
        let to_stop = self
            .stop_index_by_id
            .get(to_stop)
            .copied()
            .ok_or_else(|| NetworkError::UnknownStop(to_stop.to_string()))?;
        self.transfers.push(TransferSpec {
            from_stop,
            to_stop,
            transfer_time,
            transfer_cost,
            transfer_distance,
        });
        Ok(())
    }

    /// Lays out the flat arrays and produces the network.
    pub fn build(self) -> Result<TransitNetwork, NetworkError> {
        if self.minimal_transfer_time < 0.0 {
            return Err(NetworkError::NegativeTransferTime(
                self.minimal_transfer_time,
            ));
        }

        let mut routes = Vec::with_capacity(self.routes.len());
        let mut route_stops = Vec::new();
        let mut departures = Vec::new();

        for (route_index, spec) in self.routes.iter().enumerate() {
            routes.push(RouteEntry {
                index_first_route_stop: route_stops.len(),
                count_route_stops: spec.stops.len(),
                index_first_departure: departures.len(),
                count_departures: spec.departures.len(),
            });
            departures.extend_from_slice(&spec.departures);
            for &(facility, arrival_offset, departure_offset, distance_along_route) in &spec.stops {
                route_stops.push(RouteStopEntry {
                    transit_route_index: route_index,
                    stop_facility_index: facility,
                    arrival_offset,
                    departure_offset,
                    distance_along_route,
                    index_first_transfer: 0,
                    count_transfers: 0,
                    mode: spec.mode.clone(),
                    line: Arc::clone(&spec.line),
                    route: Arc::clone(&spec.route),
                });
            }
        }

        let mut route_stops_per_stop_facility = vec![Vec::new(); self.stop_facilities.len()];
        for (index, route_stop) in route_stops.iter().enumerate() {
            route_stops_per_stop_facility[route_stop.stop_facility_index].push(index);
        }

        // Expand facility-level transfer relations to route-stop edges,
        // keeping each route stop's outgoing edges contiguous.
        let mut transfers = Vec::new();
        for index in 0..route_stops.len() {
            let facility = route_stops[index].stop_facility_index;
            let first = transfers.len();
            for spec in self.transfers.iter().filter(|t| t.from_stop == facility) {
                for &to_route_stop in &route_stops_per_stop_facility[spec.to_stop] {
                    transfers.push(TransferEntry {
                        to_route_stop,
                        transfer_time: spec.transfer_time,
                        transfer_cost: spec.transfer_cost,
                        transfer_distance: spec.transfer_distance,
                    });
                }
            }
            route_stops[index].index_first_transfer = first;
            route_stops[index].count_transfers = transfers.len() - first;
        }

        Ok(TransitNetwork {
            routes,
            route_stops,
            departures,
            transfers,
            stop_facilities: self.stop_facilities,
            route_stops_per_stop_facility,
            stop_index_by_id: self.stop_index_by_id,
            minimal_transfer_time: self.minimal_transfer_time,
        })
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
