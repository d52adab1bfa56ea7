//! Bounded multi-source BFS over the interaction graph.

use std::collections::HashMap;

use exposure_cache::InteractionQueryCache;
use exposure_core::incubation::exposure_window_at;
use exposure_store::{Store, StoreError};

use crate::path::{merge_dedup, Path, PathStep};

/// Maximum hop depth traversed from the reporter.
pub const MAX_HOPS: u32 = 10;

/// Everything discovered about one reached user (never includes the
/// reporter itself).
#[derive(Clone, Debug)]
pub struct ReachedUser {
    pub hop_depth: u32,
    /// All minimum-length paths from the reporter to this user.
    pub paths: Vec<Path>,
    /// The interaction date used to compute this user's own outgoing
    /// window. The date of the edge that first reached them.
    pub interaction_date: i64,
}

/// Run the traversal starting from `reporter_hashed_id` (an `H_I(uid)` hex
/// string) at the given test date, returning every other user reached
/// within [`MAX_HOPS`].
pub fn propagate(
    store: &dyn Store,
    cache: &mut InteractionQueryCache,
    reporter_hashed_id: &str,
    test_date_ms: i64,
    incubation_days: u32,
    now_ms: i64,
) -> Result<HashMap<String, ReachedUser>, StoreError> {
    let mut visited_depth: HashMap<String, u32> = HashMap::new();
    let mut paths_to: HashMap<String, Vec<Path>> = HashMap::new();
    let mut interaction_date: HashMap<String, i64> = HashMap::new();

    visited_depth.insert(reporter_hashed_id.to_string(), 0);
    interaction_date.insert(reporter_hashed_id.to_string(), test_date_ms);
    paths_to.insert(
        reporter_hashed_id.to_string(),
        vec![vec![PathStep {
            hashed_id: reporter_hashed_id.to_string(),
            recorded_at: test_date_ms,
        }]],
    );

    let mut frontier = vec![reporter_hashed_id.to_string()];

    for hop in 0..MAX_HOPS {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier: Vec<String> = Vec::new();
        let mut newly_reached_this_hop: std::collections::HashSet<String> = std::collections::HashSet::new();

        for u in &frontier {
            let u_date = *interaction_date.get(u).expect("frontier member has an interaction date");
            let (window_start, window_end) = exposure_window_at(u_date, incubation_days, now_ms);
            let u_paths = paths_to.get(u).cloned().unwrap_or_default();

            let candidates = cache.query(store, u, window_start, window_end)?;
            tracing::debug!(
                hop,
                partner = %u,
                candidates = candidates.len(),
                "expanding frontier node"
            );

            for interaction in candidates {
                let v = interaction.owner_id.clone();
                if v == reporter_hashed_id {
                    continue;
                }

                if let Some(&existing_depth) = visited_depth.get(&v) {
                    if existing_depth < hop + 1 {
                        continue; // a strictly shorter path already reached v
                    }
                    if existing_depth == hop + 1 {
                        let new_paths: Vec<Path> = u_paths
                            .iter()
                            .map(|p| {
                                let mut extended = p.clone();
                                extended.push(PathStep {
                                    hashed_id: v.clone(),
                                    recorded_at: interaction.recorded_at,
                                });
                                extended
                            })
                            .collect();
                        let entry = paths_to.entry(v.clone()).or_default();
                        merge_dedup(entry, new_paths);
                        continue;
                    }
                    // existing_depth > hop + 1 cannot happen under BFS order.
                }

                // First time reaching v, at this hop.
                visited_depth.insert(v.clone(), hop + 1);
                interaction_date.insert(v.clone(), interaction.recorded_at);
                let new_paths: Vec<Path> = u_paths
                    .iter()
                    .map(|p| {
                        let mut extended = p.clone();
                        extended.push(PathStep {
                            hashed_id: v.clone(),
                            recorded_at: interaction.recorded_at,
                        });
                        extended
                    })
                    .collect();
                let entry = paths_to.entry(v.clone()).or_default();
                merge_dedup(entry, new_paths);

                if newly_reached_this_hop.insert(v.clone()) {
                    next_frontier.push(v);
                }
            }
        }

        frontier = next_frontier;
    }

    visited_depth.remove(reporter_hashed_id);
    paths_to.remove(reporter_hashed_id);

    let mut reached = HashMap::new();
    for (uid, depth) in visited_depth {
        let paths = paths_to.remove(&uid).unwrap_or_default();
        let date = *interaction_date.get(&uid).unwrap_or(&test_date_ms);
        reached.insert(
            uid,
            ReachedUser {
                hop_depth: depth,
                paths,
                interaction_date: date,
            },
        );
    }
    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::types::Interaction;
    use exposure_store::MemStore;

    fn edge(store: &MemStore, owner: &str, partner: &str, recorded_at: i64) {
        store
            .put_interaction(&Interaction {
                owner_id: owner.to_string(),
                partner_anonymous_id: partner.to_string(),
                partner_username_snapshot: None,
                recorded_at,
            })
            .unwrap();
    }

    #[test]
    fn direct_contact_is_reached_at_depth_one() {
        let store = MemStore::new();
        edge(&store, "bob", "reporter", 100);
        let mut cache = InteractionQueryCache::new();
        let reached = propagate(store.as_ref(), &mut cache, "reporter", 100, 30, 1_000_000).unwrap();
        assert_eq!(reached.get("bob").unwrap().hop_depth, 1);
    }

    #[test]
    fn reporter_never_appears_in_its_own_results() {
        let store = MemStore::new();
        edge(&store, "bob", "reporter", 100);
        let mut cache = InteractionQueryCache::new();
        let reached = propagate(store.as_ref(), &mut cache, "reporter", 100, 30, 1_000_000).unwrap();
        assert!(!reached.contains_key("reporter"));
    }

    #[test]
    fn chain_hop_depth_is_shortest_path_length() {
        // reporter -> bob -> carol, and also a direct reporter -> carol edge
        // recorded within window: carol must end up at depth 1, not 2.
        let store = MemStore::new();
        edge(&store, "bob", "reporter", 100);
        edge(&store, "carol", "bob", 100);
        edge(&store, "carol", "reporter", 100);
        let mut cache = InteractionQueryCache::new();
        let reached = propagate(store.as_ref(), &mut cache, "reporter", 100, 30, 1_000_000).unwrap();
        assert_eq!(reached.get("carol").unwrap().hop_depth, 1);
    }

    #[test]
    fn unidirectional_discovery_means_no_edge_without_a_recorded_interaction() {
        // reporter recorded an interaction with bob (bob is the partner),
        // but bob never recorded one back, so bob -> anyone is not discoverable.
        let store = MemStore::new();
        edge(&store, "reporter", "bob", 100); // reporter is owner, bob is partner: edge bob -> reporter
        let mut cache = InteractionQueryCache::new();
        let reached = propagate(store.as_ref(), &mut cache, "reporter", 100, 30, 1_000_000).unwrap();
        assert!(reached.is_empty());
    }

    #[test]
    fn group_event_paths_are_deduped_by_canonical_key() {
        // A group event: reporter met bob and carol; dave recorded meeting
        // both bob and carol, reaching dave via two orderings of the same
        // pair at the same depth.
        let store = MemStore::new();
        edge(&store, "bob", "reporter", 100);
        edge(&store, "carol", "reporter", 100);
        edge(&store, "dave", "bob", 100);
        edge(&store, "dave", "carol", 100);
        let mut cache = InteractionQueryCache::new();
        let reached = propagate(store.as_ref(), &mut cache, "reporter", 100, 30, 1_000_000).unwrap();
        let dave = reached.get("dave").unwrap();
        assert_eq!(dave.hop_depth, 2);
        assert_eq!(dave.paths.len(), 2); // via bob, via carol: not a group-collapse case
    }

    #[test]
    fn frontier_stops_expanding_beyond_max_hops() {
        let store = MemStore::new();
        let mut prev = "reporter".to_string();
        for i in 0..(MAX_HOPS + 3) {
            let next = format!("user-{i}");
            edge(&store, &next, &prev, 100);
            prev = next;
        }
        let mut cache = InteractionQueryCache::new();
        let reached = propagate(store.as_ref(), &mut cache, "reporter", 100, 365, 10_000_000).unwrap();
        assert!(reached.values().all(|r| r.hop_depth <= MAX_HOPS));
        assert_eq!(reached.len() as u32, MAX_HOPS);
    }
}
