//! The round-based query engine.
//!
//! Implements the RAPTOR round structure (alternate scanning of routes
//! touched by improved route stops and relaxation of footpath transfers)
//! on top of generalized-cost dominance instead of the paper's arrival
//! time. Waiting for a vehicle costs utility, so two departures of the
//! same physical route stay distinguishable even though their travel
//! costs are identical.

use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::domain::{PlanElements, RaptorRoute, WalkMode};
use crate::network::{
    RouteEntry, RouteIndex, RouteStopEntry, RouteStopIndex, StopIndex, TransitNetwork,
};

use super::config::RaptorParameters;
use super::rank::filter_routes;
use super::state::{PathElement, SearchState};

/// Hard cap on the number of rounds of a query.
const MAX_TRANSFERS: usize = 20;
/// Extra rounds allowed once a first feasible arrival is known.
const MAX_TRANSFERS_AFTER_FIRST_ARRIVAL: usize = 2;

/// An access or egress leg: how the traveller reaches a stop facility
/// from the query origin, or leaves one towards the destination.
#[derive(Debug, Clone)]
pub struct InitialStop {
    /// The stop facility this leg connects to.
    pub stop: StopIndex,
    /// Duration of the leg in seconds.
    pub access_time: f64,
    /// Generalized cost of the leg.
    pub access_cost: f64,
    /// Distance of the leg in meters.
    pub distance: f64,
    /// Optional pre-built legs emitted verbatim instead of a plain walk.
    pub plan_elements: Option<PlanElements>,
}

impl InitialStop {
    /// Creates an access/egress leg without plan elements.
    pub fn new(stop: StopIndex, access_time: f64, access_cost: f64, distance: f64) -> Self {
        Self {
            stop,
            access_time,
            access_cost,
            distance,
            plan_elements: None,
        }
    }
}

/// One boardable departure at an access route stop, enumerated by the
/// window query.
struct DepartureAtRouteStop {
    route_stop_index: RouteStopIndex,
    departure_index: usize,
    /// Vehicle departure time at the access stop.
    dep_time: f64,
    /// Artificial cost making the cost ordering of candidates match the
    /// time ordering the round structure relies on. Subtracted again
    /// before a result is emitted.
    cost_offset: f64,
    access_stop: InitialStop,
}

/// The routing engine.
///
/// Holds a shared handle on the immutable network and an owned block of
/// scratch state sized from the network counts. One instance serves one
/// query at a time; spawn one engine per thread to parallelize, all
/// sharing the same [`TransitNetwork`].
pub struct RaptorEngine {
    data: Arc<TransitNetwork>,
    state: SearchState,
}

impl RaptorEngine {
    /// Creates an engine for the given network.
    pub fn new(data: Arc<TransitNetwork>) -> Self {
        let state = SearchState::new(data.count_route_stops(), data.count_stops());
        Self { data, state }
    }

    /// Computes the least-cost route for a single departure time.
    ///
    /// Returns an empty route with infinite [`arrival_cost`] when no
    /// destination stop is reachable.
    ///
    /// [`arrival_cost`]: RaptorRoute::arrival_cost
    #[instrument(skip_all, fields(dep_time = dep_time, access = access_stops.len(), egress = egress_stops.len()))]
    pub fn calc_least_cost_route(
        &mut self,
        dep_time: f64,
        access_stops: &[InitialStop],
        egress_stops: &[InitialStop],
        parameters: &RaptorParameters,
    ) -> RaptorRoute {
        self.state.reset();

        let destination_stops = self.mark_destinations(egress_stops);

        let data = Arc::clone(&self.data);
        for stop in access_stops {
            for &route_stop_index in &data.route_stops_per_stop_facility[stop.stop] {
                let arrival_time = dep_time + stop.access_time;
                let arrival_cost = stop.access_cost;
                let stop_facility_index = data.route_stops[route_stop_index].stop_facility_index;
                let pe = Rc::new(PathElement {
                    coming_from: None,
                    to_route_stop: Some(route_stop_index),
                    first_departure_time: None,
                    arrival_time,
                    arrival_travel_cost: arrival_cost,
                    arrival_transfer_cost: 0.0,
                    distance: stop.distance,
                    transfer_count: 0,
                    is_transfer: true,
                    initial_stop: Some(stop.clone()),
                });
                self.state.arrival_path_per_route_stop[route_stop_index] = Some(Rc::clone(&pe));
                self.state.arrival_path_per_stop[stop_facility_index] = Some(pe);
                self.state.least_arrival_cost_at_route_stop[route_stop_index] = arrival_cost;
                self.state.least_arrival_cost_at_stop[stop_facility_index] = arrival_cost;
                self.state.improved_route_stops.insert(route_stop_index);
            }
        }

        let mut allowed_transfers_left = MAX_TRANSFERS_AFTER_FIRST_ARRIVAL;
        for round in 0..=MAX_TRANSFERS {
            // The paper's first stage carries the previous round's
            // arrivals forward; reusing the arrays makes it a no-op.
            self.explore_routes(parameters);

            if self.find_least_cost_arrival(&destination_stops).is_some() {
                if allowed_transfers_left == 0 {
                    trace!(round, "transfer budget after first arrival exhausted");
                    break;
                }
                allowed_transfers_left -= 1;
            }

            if self.state.improved_stops.is_clear() {
                trace!(round, "no stop improved, stopping");
                break;
            }

            self.handle_transfers(true, parameters);

            if self.state.improved_route_stops.is_clear() {
                trace!(round, "no route stop improved, stopping");
                break;
            }
        }

        let least_cost_path = self.find_least_cost_arrival(&destination_stops);
        if least_cost_path.is_none() {
            debug!("no route found");
        }
        self.create_raptor_route(least_cost_path.as_ref(), dep_time, 0.0)
    }

    /// Computes a dominance-filtered set of alternatives whose boarding
    /// times at the access stops fall into the given departure window.
    ///
    /// Every feasible (access stop, route, departure) triple in the
    /// window seeds its own search; the runs share cost state so a
    /// candidate only contributes a result when it genuinely improves on
    /// what earlier candidates found.
    #[instrument(skip_all, fields(
        earliest = earliest_dep_time,
        desired = desired_dep_time,
        latest = latest_dep_time,
        access = access_stops.len(),
        egress = egress_stops.len(),
    ))]
    pub fn calc_routes(
        &mut self,
        earliest_dep_time: f64,
        desired_dep_time: f64,
        latest_dep_time: f64,
        access_stops: &[InitialStop],
        egress_stops: &[InitialStop],
        parameters: &RaptorParameters,
    ) -> Vec<RaptorRoute> {
        let mut found_routes: Vec<RaptorRoute> = Vec::new();
        let mut max_transfers = MAX_TRANSFERS;

        self.state.reset();

        let muw = parameters.marginal_utility_of_waiting_pt_utl_s;
        let data = Arc::clone(&self.data);

        // The paper's algorithm runs on time: starting with the latest
        // departure and working backwards, earlier boardings naturally
        // improve already visited stops. Costs break that, because two
        // departures of the same route cost the same. The cost offset
        // below restores the monotone behaviour: each candidate's access
        // cost is shifted by the waiting time relative to the earliest
        // possible time at its stop, and the shift is removed again
        // before the result is emitted.
        let mut candidates: Vec<DepartureAtRouteStop> = Vec::new();
        for access_stop in access_stops {
            let earliest_time_at_stop = earliest_dep_time + access_stop.access_time;
            let latest_time_at_stop = latest_dep_time + access_stop.access_time;
            for &route_stop_index in &data.route_stops_per_stop_facility[access_stop.stop] {
                if data.is_last_stop_of_route(route_stop_index) {
                    continue;
                }
                let route_stop = &data.route_stops[route_stop_index];
                let route = &data.routes[route_stop.transit_route_index];
                let dep_offset = route_stop.departure_offset;
                for departure_index in
                    route.index_first_departure..route.index_first_departure + route.count_departures
                {
                    let dep_time_at_stop = data.departures[departure_index] + dep_offset;
                    if dep_time_at_stop >= earliest_time_at_stop
                        && dep_time_at_stop <= latest_time_at_stop
                    {
                        let cost_offset = (dep_time_at_stop - earliest_time_at_stop) * muw;
                        candidates.push(DepartureAtRouteStop {
                            route_stop_index,
                            departure_index,
                            dep_time: dep_time_at_stop,
                            cost_offset,
                            access_stop: access_stop.clone(),
                        });
                    }
                }
            }
        }
        // Sort by artificial cost rather than time, biggest first; ties
        // fall back to the later departure.
        candidates.sort_by(|d1, d2| {
            let c1 = d1.cost_offset + d1.access_stop.access_cost;
            let c2 = d2.cost_offset + d2.access_stop.access_cost;
            c1.total_cmp(&c2)
                .then_with(|| d1.departure_index.cmp(&d2.departure_index))
                .reverse()
        });
        debug!(candidates = candidates.len(), "enumerated window departures");

        let destination_stops = self.mark_destinations(egress_stops);

        let mut last_found_best_path: Option<Rc<PathElement>> = None;

        for candidate in &candidates {
            self.state.improved_stops.clear();
            self.state.improved_route_stops.clear();
            self.state.best_arrival_cost = f64::INFINITY;
            {
                // Seed this candidate as the sole starting point; the
                // cost arrays of earlier candidates stay in place.
                let arrival_time = candidate.dep_time;
                let arrival_cost = candidate.access_stop.access_cost + candidate.cost_offset;
                let route_stop_index = candidate.route_stop_index;
                let stop_facility_index = data.route_stops[route_stop_index].stop_facility_index;
                let pe = Rc::new(PathElement {
                    coming_from: None,
                    to_route_stop: Some(route_stop_index),
                    first_departure_time: Some(candidate.dep_time),
                    arrival_time,
                    arrival_travel_cost: arrival_cost,
                    arrival_transfer_cost: 0.0,
                    distance: candidate.access_stop.distance,
                    transfer_count: 0,
                    is_transfer: true,
                    initial_stop: Some(candidate.access_stop.clone()),
                });
                self.state.arrival_path_per_route_stop[route_stop_index] = Some(Rc::clone(&pe));
                self.state.least_arrival_cost_at_route_stop[route_stop_index] = arrival_cost;
                self.state.arrival_path_per_stop[stop_facility_index] = Some(pe);
                self.state.least_arrival_cost_at_stop[stop_facility_index] = arrival_cost;
                self.state.improved_route_stops.insert(route_stop_index);
            }

            let mut round = 0;
            while round <= max_transfers {
                self.explore_routes(parameters);

                if let Some(least_cost_path) = self.find_least_cost_arrival(&destination_stops) {
                    let is_new = match &last_found_best_path {
                        None => true,
                        Some(last) => {
                            !opt_ptr_eq(&least_cost_path.coming_from, &last.coming_from)
                        }
                    };
                    if is_new {
                        last_found_best_path = Some(Rc::clone(&least_cost_path));

                        let dep_time = self.calculate_optimal_departure_time(&least_cost_path);
                        let route = self.create_raptor_route(
                            Some(&least_cost_path),
                            dep_time,
                            candidate.cost_offset,
                        );
                        debug!(
                            dep_time,
                            transfers = least_cost_path.transfer_count,
                            "found alternative"
                        );
                        found_routes.push(route);

                        let optimized_transfer_limit =
                            least_cost_path.transfer_count + MAX_TRANSFERS_AFTER_FIRST_ARRIVAL;
                        if optimized_transfer_limit < max_transfers {
                            max_transfers = optimized_transfer_limit;
                        }
                        if round == max_transfers {
                            break; // no use to handle transfers
                        }
                    }
                }

                if self.state.improved_stops.is_clear() {
                    break;
                }

                self.handle_transfers(false, parameters);

                if self.state.improved_route_stops.is_clear() {
                    break;
                }

                round += 1;
            }
        }

        let routes = filter_routes(found_routes);
        debug!(routes = routes.len(), "window query complete");
        routes
    }

    /// Marks every route stop at each egress facility as a destination,
    /// remembering the egress cost, and returns the per-facility egress
    /// legs (later declarations of the same facility win).
    fn mark_destinations(&mut self, egress_stops: &[InitialStop]) -> Vec<(StopIndex, InitialStop)> {
        let data = Arc::clone(&self.data);
        let mut destination_stops: Vec<(StopIndex, InitialStop)> = Vec::new();
        for egress_stop in egress_stops {
            match destination_stops
                .iter_mut()
                .find(|(stop, _)| *stop == egress_stop.stop)
            {
                Some(entry) => entry.1 = egress_stop.clone(),
                None => destination_stops.push((egress_stop.stop, egress_stop.clone())),
            }
            for &route_stop_index in &data.route_stops_per_stop_facility[egress_stop.stop] {
                self.state.destination_route_stops.insert(route_stop_index);
                self.state.egress_costs_per_route_stop[route_stop_index] =
                    egress_stop.access_cost;
            }
        }
        destination_stops
    }

    /// Scans every route touched by an improved route stop, walking the
    /// stop sequence downstream from the earliest improved position and
    /// updating arrivals. Populates `improved_stops`.
    fn explore_routes(&mut self, parameters: &RaptorParameters) {
        self.state.improved_stops.clear();
        self.state.reached_route_stops.clear();

        let transfer_penalty_factor = parameters.transfer_penalty_travel_time_to_cost_factor;
        let muw = parameters.marginal_utility_of_waiting_pt_utl_s;

        let data = Arc::clone(&self.data);
        let improved: Vec<RouteStopIndex> = self.state.improved_route_stops.ones().collect();

        let mut handled_route: Option<RouteIndex> = None;
        let mut pos = 0;
        while pos < improved.len() {
            let first_route_stop_index = improved[pos];
            pos += 1;

            let first_route_stop = &data.route_stops[first_route_stop_index];
            if handled_route == Some(first_route_stop.transit_route_index) {
                continue;
            }
            let route = &data.routes[first_route_stop.transit_route_index];

            // The earliest improved route stop of this route is where we
            // board; figure out which departure we can take.
            let mut boarding_pe = Rc::clone(
                self.state.arrival_path_per_route_stop[first_route_stop_index]
                    .as_ref()
                    .expect("improved route stop has an arrival path"),
            );
            let agent_first_arrival_time = boarding_pe.arrival_time;
            let Some(departure_index) =
                self.find_next_departure_index(route, first_route_stop, agent_first_arrival_time)
            else {
                continue;
            };

            let mut current_departure_time = data.departures[departure_index];
            let vehicle_arrival_time = current_departure_time + first_route_stop.arrival_offset;
            let mut current_agent_boarding_time = agent_first_arrival_time.max(vehicle_arrival_time);
            let waiting_time = current_agent_boarding_time - agent_first_arrival_time;
            let waiting_cost = -muw * waiting_time;
            let mut current_travel_cost_when_boarding =
                boarding_pe.arrival_travel_cost + waiting_cost;
            let current_transfer_cost_when_boarding = boarding_pe.arrival_transfer_cost;

            if current_travel_cost_when_boarding + current_transfer_cost_when_boarding
                > self.state.best_arrival_cost
            {
                continue;
            }
            handled_route = Some(first_route_stop.transit_route_index);

            let mut first_departure_time = boarding_pe
                .first_departure_time
                .unwrap_or(current_agent_boarding_time);
            let mut boarding_distance = first_route_stop.distance_along_route;
            // The mode cannot change along a route, so look the marginal
            // utility up once per scan.
            let mutt = parameters.marginal_utility_of_travel_time(&first_route_stop.mode);

            let route_end = route.index_first_route_stop + route.count_route_stops;
            let mut last_handled = first_route_stop_index;
            for to_route_stop_index in (first_route_stop_index + 1)..route_end {
                let to_route_stop = &data.route_stops[to_route_stop_index];
                let arrival_time = current_departure_time + to_route_stop.arrival_offset;
                let in_vehicle_time = arrival_time - current_agent_boarding_time;
                let in_vehicle_cost = in_vehicle_time * -mutt;
                let arrival_travel_cost = current_travel_cost_when_boarding + in_vehicle_cost;
                let arrival_transfer_cost = (arrival_time - first_departure_time)
                    * transfer_penalty_factor
                    * boarding_pe.transfer_count as f64;
                let total_arrival_cost = arrival_travel_cost + arrival_transfer_cost;
                let previous_arrival_cost =
                    self.state.least_arrival_cost_at_route_stop[to_route_stop_index];

                if total_arrival_cost <= previous_arrival_cost {
                    let distance = to_route_stop.distance_along_route - boarding_distance;
                    let pe = Rc::new(PathElement {
                        coming_from: Some(Rc::clone(&boarding_pe)),
                        to_route_stop: Some(to_route_stop_index),
                        first_departure_time: Some(first_departure_time),
                        arrival_time,
                        arrival_travel_cost,
                        arrival_transfer_cost,
                        distance,
                        transfer_count: boarding_pe.transfer_count,
                        is_transfer: false,
                        initial_stop: None,
                    });
                    self.state.arrival_path_per_route_stop[to_route_stop_index] =
                        Some(Rc::clone(&pe));
                    self.state.least_arrival_cost_at_route_stop[to_route_stop_index] =
                        total_arrival_cost;
                    let stop_facility_index = to_route_stop.stop_facility_index;
                    if total_arrival_cost <= self.state.least_arrival_cost_at_stop[stop_facility_index]
                    {
                        self.state.least_arrival_cost_at_stop[stop_facility_index] =
                            total_arrival_cost;
                        self.state.arrival_path_per_stop[stop_facility_index] = Some(pe);
                        self.state.improved_stops.insert(stop_facility_index);
                        self.check_for_best_arrival(to_route_stop_index, total_arrival_cost);
                    }
                } else {
                    // This stop is reachable with better cost from
                    // somewhere else. If boarding there is also cheaper
                    // than staying on the current vehicle, switch to that
                    // connection and continue scanning with it.
                    let alternative_boarding_pe =
                        self.state.arrival_path_per_route_stop[to_route_stop_index].clone();
                    if let Some(alternative_pe) = alternative_boarding_pe {
                        let alternative_arrival_time = alternative_pe.arrival_time;
                        if let Some(alternative_departure_index) = self.find_next_departure_index(
                            route,
                            to_route_stop,
                            alternative_arrival_time,
                        ) {
                            let alternative_departure_time =
                                data.departures[alternative_departure_index];
                            let alternative_vehicle_arrival_time =
                                alternative_departure_time + to_route_stop.arrival_offset;
                            let alternative_boarding_time =
                                alternative_arrival_time.max(alternative_vehicle_arrival_time);
                            let alternative_waiting_cost = -muw
                                * (alternative_boarding_time - alternative_arrival_time);
                            let alternative_travel_cost_when_boarding =
                                alternative_pe.arrival_travel_cost + alternative_waiting_cost;
                            let alternative_total_cost_when_boarding =
                                alternative_travel_cost_when_boarding
                                    + alternative_pe.arrival_transfer_cost;
                            if alternative_total_cost_when_boarding < total_arrival_cost {
                                current_departure_time = alternative_departure_time;
                                current_agent_boarding_time = alternative_boarding_time;
                                current_travel_cost_when_boarding =
                                    alternative_travel_cost_when_boarding;
                                boarding_pe = alternative_pe;
                                first_departure_time = boarding_pe
                                    .first_departure_time
                                    .unwrap_or(current_agent_boarding_time);
                                boarding_distance = to_route_stop.distance_along_route;
                            }
                        }
                    }
                }
                last_handled = to_route_stop_index;
            }

            // The inner loop walked the rest of the route, so the outer
            // iteration can skip every improved route stop it covered.
            while pos < improved.len() && improved[pos] <= last_handled {
                pos += 1;
            }
        }
    }

    /// Lowers the best known arrival cost if `route_stop_index` is a
    /// destination and arriving there plus its egress beats the current
    /// best.
    fn check_for_best_arrival(&mut self, route_stop_index: RouteStopIndex, arrival_cost: f64) {
        if self.state.destination_route_stops.contains(route_stop_index) {
            let total_cost = arrival_cost + self.state.egress_costs_per_route_stop[route_stop_index];
            if total_cost < self.state.best_arrival_cost {
                self.state.best_arrival_cost = total_cost;
            }
        }
    }

    /// Finds the first departure of `route` boardable at `route_stop` at
    /// or after `time`. Returns `None` when no later departure exists.
    fn find_next_departure_index(
        &self,
        route: &RouteEntry,
        route_stop: &RouteStopEntry,
        time: f64,
    ) -> Option<usize> {
        let dep_time_at_route_start = time - route_stop.departure_offset;
        let from_index = route.index_first_departure;
        let departures = &self.data.departures[from_index..from_index + route.count_departures];
        let pos = departures.partition_point(|&d| d < dep_time_at_route_start);
        if pos >= departures.len() {
            None
        } else {
            Some(from_index + pos)
        }
    }

    /// Relaxes the outgoing transfers of every stop improved by the route
    /// scan. `strict` selects the comparator: `<` for single-departure
    /// queries, `<=` for window queries where equal-cost ties must keep
    /// propagating.
    fn handle_transfers(&mut self, strict: bool, parameters: &RaptorParameters) {
        self.state.improved_route_stops.clear();
        self.state.tmp_improved_stops.clear();

        let transfer_penalty_factor = parameters.transfer_penalty_travel_time_to_cost_factor;

        let data = Arc::clone(&self.data);
        let improved: Vec<StopIndex> = self.state.improved_stops.ones().collect();
        for stop_index in improved {
            let from_pe = Rc::clone(
                self.state.arrival_path_per_stop[stop_index]
                    .as_ref()
                    .expect("improved stop has an arrival path"),
            );
            let arrival_time = from_pe.arrival_time;
            let arrival_travel_cost = from_pe.arrival_travel_cost;
            let arrival_transfer_cost = from_pe.arrival_transfer_cost;
            if arrival_travel_cost + arrival_transfer_cost > self.state.best_arrival_cost {
                continue;
            }
            // The route stop we arrived at with least cost at this stop.
            let from_route_stop = &data.route_stops[from_pe
                .to_route_stop
                .expect("stop arrival path ends at a route stop")];
            let first_departure_time = from_pe
                .first_departure_time
                .expect("transfers start from a ridden vehicle");

            let first_transfer_index = from_route_stop.index_first_transfer;
            let last_transfer_index = first_transfer_index + from_route_stop.count_transfers;
            for transfer in &data.transfers[first_transfer_index..last_transfer_index] {
                let to_route_stop_index = transfer.to_route_stop;
                let new_arrival_time = arrival_time + transfer.transfer_time;
                let new_arrival_travel_cost = arrival_travel_cost + transfer.transfer_cost;
                let new_arrival_transfer_cost = (new_arrival_time - first_departure_time)
                    * transfer_penalty_factor
                    * (from_pe.transfer_count + 1) as f64;
                let new_total_arrival_cost = new_arrival_travel_cost + new_arrival_transfer_cost;

                let previous_least_cost =
                    self.state.least_arrival_cost_at_route_stop[to_route_stop_index];
                let improves = if strict {
                    new_total_arrival_cost < previous_least_cost
                } else {
                    new_total_arrival_cost <= previous_least_cost
                };
                if improves {
                    let to_route_stop = &data.route_stops[to_route_stop_index];
                    let pe = Rc::new(PathElement {
                        coming_from: Some(Rc::clone(&from_pe)),
                        to_route_stop: Some(to_route_stop_index),
                        first_departure_time: from_pe.first_departure_time,
                        arrival_time: new_arrival_time,
                        arrival_travel_cost: new_arrival_travel_cost,
                        arrival_transfer_cost: new_arrival_transfer_cost,
                        distance: transfer.transfer_distance,
                        transfer_count: from_pe.transfer_count + 1,
                        is_transfer: true,
                        initial_stop: None,
                    });
                    self.state.arrival_path_per_route_stop[to_route_stop_index] =
                        Some(Rc::clone(&pe));
                    self.state.least_arrival_cost_at_route_stop[to_route_stop_index] =
                        new_total_arrival_cost;
                    self.state.improved_route_stops.insert(to_route_stop_index);

                    let to_stop_facility_index = to_route_stop.stop_facility_index;
                    let previous_stop_cost =
                        self.state.least_arrival_cost_at_stop[to_stop_facility_index];
                    let improves_stop = if strict {
                        new_total_arrival_cost < previous_stop_cost
                    } else {
                        new_total_arrival_cost <= previous_stop_cost
                    };
                    if improves_stop {
                        // Stage the path so a stop processed later in this
                        // round cannot relax onwards from it.
                        self.state.least_arrival_cost_at_stop[to_stop_facility_index] =
                            new_total_arrival_cost;
                        self.state.tmp_arrival_path_per_stop[to_stop_facility_index] = Some(pe);
                        self.state.tmp_improved_stops.insert(to_stop_facility_index);
                    }
                }
            }
        }

        // Parallel update: publish the staged paths only after every
        // improved stop of this round has been relaxed.
        let staged: Vec<StopIndex> = self.state.tmp_improved_stops.ones().collect();
        for stop_index in staged {
            self.state.arrival_path_per_stop[stop_index] =
                self.state.tmp_arrival_path_per_stop[stop_index].take();
        }
    }

    /// Picks the cheapest arrival over all destination facilities and
    /// wraps it in a terminal element recording the egress leg. Ties are
    /// broken towards fewer transfers.
    fn find_least_cost_arrival(
        &self,
        destination_stops: &[(StopIndex, InitialStop)],
    ) -> Option<Rc<PathElement>> {
        let mut least_cost = f64::INFINITY;
        let mut least_cost_path: Option<Rc<PathElement>> = None;

        for (stop_index, egress_stop) in destination_stops {
            if let Some(pe) = &self.state.arrival_path_per_stop[*stop_index] {
                let arrival_time = pe.arrival_time + egress_stop.access_time;
                let arrival_travel_cost = pe.arrival_travel_cost + egress_stop.access_cost;
                let total_cost = arrival_travel_cost + pe.arrival_transfer_cost;
                let better = total_cost < least_cost
                    || (total_cost == least_cost
                        && least_cost_path
                            .as_ref()
                            .is_some_and(|best| pe.transfer_count < best.transfer_count));
                if better {
                    least_cost = total_cost;
                    least_cost_path = Some(Rc::new(PathElement {
                        coming_from: Some(Rc::clone(pe)),
                        to_route_stop: None,
                        first_departure_time: pe.first_departure_time,
                        arrival_time,
                        arrival_travel_cost,
                        arrival_transfer_cost: pe.arrival_transfer_cost,
                        distance: egress_stop.distance,
                        transfer_count: pe.transfer_count,
                        is_transfer: true,
                        initial_stop: Some(egress_stop.clone()),
                    }));
                }
            }
        }
        least_cost_path
    }

    /// Back-computes the departure time to report for a found path: the
    /// boarding time at the first stop minus the minimal-transfer-time
    /// safety buffer and the access time, floored to a whole second.
    fn calculate_optimal_departure_time(&self, least_cost_path: &Rc<PathElement>) -> f64 {
        let mut first_pe = least_cost_path;
        while let Some(previous) = &first_pe.coming_from {
            first_pe = previous;
        }
        let mut dep_time = first_pe.arrival_time;
        dep_time -= self.data.minimal_transfer_time;
        let access_stop = first_pe
            .initial_stop
            .as_ref()
            .expect("path chains start at an access leg");
        dep_time -= access_stop.access_time;
        dep_time.floor()
    }

    /// Builds the result by walking the chain back to its root and
    /// emitting legs in forward order. `cost_offset` is removed from the
    /// reported arrival cost (window candidates carry an artificial
    /// offset in their cost state).
    fn create_raptor_route(
        &self,
        destination_path_element: Option<&Rc<PathElement>>,
        departure_time: f64,
        cost_offset: f64,
    ) -> RaptorRoute {
        let mut path_elements: Vec<Rc<PathElement>> = Vec::new();
        let mut arrival_cost = f64::INFINITY;
        if let Some(destination) = destination_path_element {
            arrival_cost = destination.total_cost() - cost_offset;
            let mut pe = Rc::clone(destination);
            loop {
                path_elements.push(Rc::clone(&pe));
                let previous = match &pe.coming_from {
                    Some(previous) => Rc::clone(previous),
                    None => break,
                };
                pe = previous;
            }
            path_elements.reverse();
        }

        let data = &self.data;
        let mut raptor_route = RaptorRoute::new(arrival_cost);
        let mut time = departure_time;
        let mut from_stop: Option<StopIndex> = None;
        let pe_count = path_elements.len();
        for (i, pe) in path_elements.iter().enumerate() {
            let to_stop = pe
                .to_route_stop
                .map(|route_stop| data.route_stops[route_stop].stop_facility_index);
            let travel_time = pe.arrival_time - time;

            let plan_elements = pe
                .initial_stop
                .as_ref()
                .and_then(|initial| initial.plan_elements.clone());
            if let Some(elements) = plan_elements {
                raptor_route.add_plan_elements(time, travel_time, elements);
            } else if pe.is_transfer {
                // No transfer leg when we stay at the same stop facility.
                let different_from_to =
                    from_stop.is_none() || to_stop.is_none() || from_stop != to_stop;
                if different_from_to {
                    if i + 2 == pe_count {
                        // The second-to-last element is a transfer; leave
                        // it out so it merges into the egress walk.
                        continue;
                    }
                    let mode = match (from_stop, to_stop) {
                        (None, Some(_)) => WalkMode::Access,
                        (Some(_), None) => WalkMode::Egress,
                        _ => WalkMode::Transit,
                    };
                    raptor_route.add_non_pt(from_stop, to_stop, time, travel_time, pe.distance, mode);
                }
            } else {
                let route_stop = &data.route_stops[pe
                    .to_route_stop
                    .expect("ride elements arrive at a route stop")];
                raptor_route.add_pt(
                    from_stop,
                    to_stop,
                    Arc::clone(&route_stop.line),
                    Arc::clone(&route_stop.route),
                    route_stop.mode.clone(),
                    time,
                    travel_time,
                    pe.distance,
                );
            }
            time = pe.arrival_time;
            from_stop = to_stop;
        }
        raptor_route
    }
}

/// Pointer equality of two optional shared path elements.
fn opt_ptr_eq(a: &Option<Rc<PathElement>>, b: &Option<Rc<PathElement>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
