//! Route post-processing after the swarm stops.

use crate::spatial::{length_2d, Xy};

/// Greedy waypoint removal followed by targeted reinsertion.
///
/// `route` is the full polyline. `is_clear` decides whether a segment avoids
/// every footprint and buffer.
pub fn refine_route<F>(route: &[Xy], is_clear: F) -> Vec<Xy>
where
    F: Fn(Xy, Xy) -> bool,
{
    let pruned = drop_redundant(route, &is_clear);
    reinsert_for_collisions(pruned, route, &is_clear)
}

/// Skip each interior point whose bypass chord is clear. Every segment this
/// creates has been checked, so pruning never makes a route less safe.
pub fn drop_redundant<F>(route: &[Xy], is_clear: &F) -> Vec<Xy>
where
    F: Fn(Xy, Xy) -> bool,
{
    if route.len() <= 2 {
        return route.to_vec();
    }

    let mut kept = vec![route[0]];
    for i in 1..route.len() - 1 {
        let prev = kept[kept.len() - 1];
        if is_clear(prev, route[i + 1]) {
            continue;
        }
        kept.push(route[i]);
    }
    kept.push(route[route.len() - 1]);
    kept
}

/// For each colliding segment, insert the original waypoint that makes both
/// halves clear with the least added length. Segments no candidate can fix
/// stay as they are.
pub fn reinsert_for_collisions<F>(mut route: Vec<Xy>, original: &[Xy], is_clear: &F) -> Vec<Xy>
where
    F: Fn(Xy, Xy) -> bool,
{
    let mut i = 0;
    while i + 1 < route.len() {
        let (a, b) = (route[i], route[i + 1]);
        if is_clear(a, b) {
            i += 1;
            continue;
        }

        let base = length_2d(a, b);
        let best = original
            .iter()
            .copied()
            .filter(|candidate| !route.contains(candidate))
            .filter(|candidate| is_clear(a, *candidate) && is_clear(*candidate, b))
            .map(|candidate| (candidate, length_2d(a, candidate) + length_2d(candidate, b) - base))
            .min_by(|x, y| x.1.total_cmp(&y.1));

        match best {
            Some((candidate, _)) => {
                route.insert(i + 1, candidate);
                i += 2;
            }
            None => i += 1,
        }
    }
    route
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Blocks any segment crossing the vertical wall x = 0, |y| < 50.
    fn wall_clear(a: Xy, b: Xy) -> bool {
        if (a.0 < 0.0) == (b.0 < 0.0) {
            return true;
        }
        let t = -a.0 / (b.0 - a.0);
        let y = a.1 + t * (b.1 - a.1);
        y.abs() >= 50.0
    }

    #[test]
    fn unblocked_route_collapses_to_endpoints() {
        let route = [(0.0, 100.0), (10.0, 120.0), (20.0, 90.0), (30.0, 100.0)];
        let refined = refine_route(&route, |_, _| true);
        assert_eq!(refined, vec![(0.0, 100.0), (30.0, 100.0)]);
    }

    #[test]
    fn keeps_the_waypoint_that_clears_the_wall() {
        let route = [(-100.0, 0.0), (-50.0, 10.0), (0.0, 80.0), (50.0, 10.0), (100.0, 0.0)];
        let refined = refine_route(&route, wall_clear);
        assert_eq!(refined, vec![(-100.0, 0.0), (0.0, 80.0), (100.0, 0.0)]);
        for pair in refined.windows(2) {
            assert!(wall_clear(pair[0], pair[1]));
        }
    }

    #[test]
    fn reinsertion_picks_the_cheapest_bypass() {
        let original = [(-100.0, 0.0), (0.0, 300.0), (0.0, -60.0), (100.0, 0.0)];
        let blocked = vec![(-100.0, 0.0), (100.0, 0.0)];
        let fixed = reinsert_for_collisions(blocked, &original, &wall_clear);
        assert_eq!(fixed, vec![(-100.0, 0.0), (0.0, -60.0), (100.0, 0.0)]);
    }
}
