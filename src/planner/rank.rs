//! Filtering of window-query alternatives.
//!
//! The window sweep can emit the same connection several times and
//! connections that are strictly worse than others. This module sorts the
//! found routes, drops exact duplicates and removes dominated
//! alternatives; the surviving set keeps the sort order.

use crate::domain::RaptorRoute;

/// Sorts, deduplicates and dominance-filters the routes found by a
/// window sweep.
pub fn filter_routes(mut all_routes: Vec<RaptorRoute>) -> Vec<RaptorRoute> {
    all_routes.sort_by(|r1, r2| {
        r1.number_of_transfers()
            .cmp(&r2.number_of_transfers())
            .then_with(|| r1.departure_time().total_cmp(&r2.departure_time()))
            .then_with(|| r1.travel_time().total_cmp(&r2.travel_time()))
    });
    remove_dominated(deduplicate(all_routes))
}

/// Drops routes whose (transfers, departure time, travel time) triple
/// equals that of the previous route. Expects the input sorted by that
/// triple, as [`filter_routes`] produces it.
pub fn deduplicate(routes: Vec<RaptorRoute>) -> Vec<RaptorRoute> {
    let mut unique_routes: Vec<RaptorRoute> = Vec::with_capacity(routes.len());
    for route in routes {
        let is_duplicate = unique_routes.last().is_some_and(|last| {
            last.number_of_transfers() == route.number_of_transfers()
                && last.departure_time() == route.departure_time()
                && last.travel_time() == route.travel_time()
        });
        if !is_duplicate {
            unique_routes.push(route);
        }
    }
    unique_routes
}

/// Removes every route that is dominated by another: a route dominates
/// when it has no more transfers, departs no earlier and arrives no
/// later. Exact ties in all three never occur here because
/// [`deduplicate`] ran first.
pub fn remove_dominated(routes: Vec<RaptorRoute>) -> Vec<RaptorRoute> {
    let dominated: Vec<bool> = routes
        .iter()
        .enumerate()
        .map(|(i, r1)| {
            let arrival1 = r1.departure_time() + r1.travel_time();
            routes.iter().enumerate().any(|(j, r2)| {
                let arrival2 = r2.departure_time() + r2.travel_time();
                j != i
                    && r2.number_of_transfers() <= r1.number_of_transfers()
                    && r2.departure_time() >= r1.departure_time()
                    && arrival2 <= arrival1
            })
        })
        .collect();

    routes
        .into_iter()
        .zip(dominated)
        .filter_map(|(route, is_dominated)| (!is_dominated).then_some(route))
        .collect()
}
