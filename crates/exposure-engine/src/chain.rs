//! Chain-visualization construction and in-place node mutation.
//!
//! Two concerns live here because they share a representation: turning a
//! [`propagate::Path`] into the `chainPath`/`chainPaths`/`chainData` triple
//! a fresh notification is built from, and finding-and-mutating a single
//! node inside an *existing* notification when a downstream status update
//! propagates back through it.

use exposure_cache::UserLookupCache;
use exposure_core::hashing::{hash_chain, HashDigest};
use exposure_core::types::{ChainNode, ChainVisualization, Notification, Sti, TestStatus};
use exposure_store::{Store, StoreError};
use exposure_propagate::path::Path;

/// `H_C(H_I(uid))` for every step of `path`, in order.
pub fn chain_path_hashes(path: &Path) -> Vec<String> {
    path.iter()
        .map(|step| {
            let h_i = HashDigest::from_hex(&step.hashed_id)
                .unwrap_or_else(|| panic!("malformed H_I hex in path step: {}", step.hashed_id));
            hash_chain(h_i).to_hex()
        })
        .collect()
}

/// Build the node list for one path, resolving usernames from the store
/// (via the function-scoped lookup cache) and marking node 0 `POSITIVE`
/// (the reporter) and the last node `isCurrentUser`.
fn build_nodes(
    store: &dyn Store,
    cache: &mut UserLookupCache,
    path: &Path,
) -> Result<Vec<ChainNode>, StoreError> {
    let last = path.len().saturating_sub(1);
    let mut nodes = Vec::with_capacity(path.len());
    for (i, step) in path.iter().enumerate() {
        let username = cache
            .get_by_hashed_interaction_id(store, &step.hashed_id)?
            .and_then(|u| u.username);
        nodes.push(ChainNode {
            username,
            test_status: if i == 0 { TestStatus::Positive } else { TestStatus::Unknown },
            date: Some(step.recorded_at),
            is_current_user: i == last,
            tested_positive_for: None,
        });
    }
    Ok(nodes)
}

/// Build the full [`ChainVisualization`] for a reached user: `nodes` from
/// the representative (first) path, `paths` populated only when more than
/// one minimum-length path survived group-event dedup.
pub fn build_chain_visualization(
    store: &dyn Store,
    cache: &mut UserLookupCache,
    paths: &[Path],
) -> Result<ChainVisualization, StoreError> {
    let representative = paths.first().expect("a reached user always has at least one path");
    let nodes = build_nodes(store, cache, representative)?;
    let paths = if paths.len() > 1 {
        let mut all = Vec::with_capacity(paths.len());
        for p in paths {
            all.push(build_nodes(store, cache, p)?);
        }
        Some(all)
    } else {
        None
    };
    Ok(ChainVisualization { nodes, paths })
}

/// Find `target_chain_hash` (an `H_C(H_I(uid))` value) inside a
/// notification's primary path and every alternate path, and set its node
/// to `new_status` (and, if given, `tested_positive_for`).
///
/// Returns the node's index in the *primary* `chainPath`, if it appears
/// there. Callers use this to decide whether the owner of that node is an
/// intermediary (`0 < index < length - 1`), per the "only push to
/// intermediaries" rule in both the positive- and negative-update
/// propagators.
pub fn update_node_status(
    notification: &mut Notification,
    target_chain_hash: &str,
    new_status: TestStatus,
    tested_positive_for: Option<&[Sti]>,
) -> Option<usize> {
    let primary_index = notification.chain_path.iter().position(|h| h == target_chain_hash);
    if let Some(pos) = primary_index {
        if let Some(node) = notification.chain_data.nodes.get_mut(pos) {
            node.test_status = new_status;
            if let Some(tpf) = tested_positive_for {
                node.tested_positive_for = Some(tpf.to_vec());
            }
        }
    }

    if let (Some(chain_paths), Some(path_nodes)) =
        (notification.chain_paths.as_ref(), notification.chain_data.paths.as_mut())
    {
        for (path_idx, hashes) in chain_paths.iter().enumerate() {
            let Some(pos) = hashes.iter().position(|h| h == target_chain_hash) else {
                continue;
            };
            if let Some(nodes) = path_nodes.get_mut(path_idx) {
                if let Some(node) = nodes.get_mut(pos) {
                    node.test_status = new_status;
                    if let Some(tpf) = tested_positive_for {
                        node.tested_positive_for = Some(tpf.to_vec());
                    }
                }
            }
        }
    }

    primary_index
}

/// Whether a node at `index` in a `chainPath` of length `len` is a strict
/// intermediary: neither the reporter (index 0) nor the recipient
/// (index `len - 1`).
pub fn is_intermediary(index: usize, len: usize) -> bool {
    index > 0 && index + 1 < len
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::types::{NotificationKind, PrivacyLevel};
    use exposure_propagate::path::PathStep;

    fn step(id: &str, at: i64) -> PathStep {
        PathStep {
            hashed_id: exposure_core::hashing::hash_interaction(id).to_hex(),
            recorded_at: at,
        }
    }

    fn sample_notification(chain_path: Vec<String>) -> Notification {
        let len = chain_path.len();
        Notification {
            recipient_id: "recipient".into(),
            kind: NotificationKind::Exposure,
            sti_type: Some(vec![Sti::Hiv]),
            exposure_date: Some(0),
            chain_data: ChainVisualization {
                nodes: (0..len)
                    .map(|i| ChainNode {
                        username: None,
                        test_status: TestStatus::Unknown,
                        date: Some(0),
                        is_current_user: i == len - 1,
                        tested_positive_for: None,
                    })
                    .collect(),
                paths: None,
            },
            chain_path,
            chain_paths: None,
            hop_depth: (len.saturating_sub(1)) as u32,
            is_read: false,
            received_at: 0,
            updated_at: 0,
            report_id: "r1".into(),
            deleted_at: None,
        }
    }

    #[test]
    fn chain_path_hashes_are_over_the_h_i_value_not_the_raw_uid() {
        let path = vec![step("a", 0), step("b", 100)];
        let hashes = chain_path_hashes(&path);
        assert_eq!(hashes.len(), 2);
        assert_ne!(hashes[0], path[0].hashed_id);
    }

    #[test]
    fn update_node_status_mutates_the_matching_index() {
        let target = chain_path_hashes(&[step("b", 0)])[0].clone();
        let mut n = sample_notification(vec!["h-a".into(), target.clone(), "h-c".into()]);
        let idx = update_node_status(&mut n, &target, TestStatus::Negative, None);
        assert_eq!(idx, Some(1));
        assert_eq!(n.chain_data.nodes[1].test_status, TestStatus::Negative);
        assert!(is_intermediary(1, n.chain_path.len()));
    }

    #[test]
    fn unmatched_hash_leaves_notification_untouched() {
        let mut n = sample_notification(vec!["h-a".into(), "h-b".into()]);
        let idx = update_node_status(&mut n, "not-present", TestStatus::Negative, None);
        assert_eq!(idx, None);
        assert_eq!(n.chain_data.nodes[0].test_status, TestStatus::Unknown);
    }

    #[test]
    fn recipient_index_is_never_an_intermediary() {
        assert!(!is_intermediary(1, 2));
    }

    #[test]
    fn privacy_projection_matrix_matches_core() {
        assert!(PrivacyLevel::Full.includes_sti() && PrivacyLevel::Full.includes_date());
    }
}
