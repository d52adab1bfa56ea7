//! Path representation and canonicalization for group-event dedup.

/// One node along a discovered path: its `H_I` id and the interaction date
/// that placed it there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathStep {
    pub hashed_id: String,
    pub recorded_at: i64,
}

pub type Path = Vec<PathStep>;

/// `(first, sorted(middle), last)`. Paths equal under this key came from
/// the same group event (A met B, C, D in any order) and collapse to one
/// stored path.
pub fn canonical_key(path: &Path) -> (String, Vec<String>, String) {
    let first = path.first().map(|s| s.hashed_id.clone()).unwrap_or_default();
    let last = path.last().map(|s| s.hashed_id.clone()).unwrap_or_default();
    let mut middle: Vec<String> = if path.len() > 2 {
        path[1..path.len() - 1].iter().map(|s| s.hashed_id.clone()).collect()
    } else {
        Vec::new()
    };
    middle.sort();
    (first, middle, last)
}

/// Append `candidates` to `existing`, deduping by [`canonical_key`] and
/// keeping the first-seen representative ordering for each key.
pub fn merge_dedup(existing: &mut Vec<Path>, candidates: Vec<Path>) {
    use std::collections::HashSet;
    let mut seen: HashSet<(String, Vec<String>, String)> = existing.iter().map(canonical_key).collect();
    for path in candidates {
        let key = canonical_key(&path);
        if seen.insert(key) {
            existing.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> PathStep {
        PathStep {
            hashed_id: id.to_string(),
            recorded_at: 0,
        }
    }

    #[test]
    fn reordered_middles_share_a_canonical_key() {
        let p1 = vec![step("r"), step("b"), step("c"), step("v")];
        let p2 = vec![step("r"), step("c"), step("b"), step("v")];
        assert_eq!(canonical_key(&p1), canonical_key(&p2));
    }

    #[test]
    fn merge_dedup_keeps_first_representative() {
        let mut existing = vec![vec![step("r"), step("b"), step("c"), step("v")]];
        let candidates = vec![vec![step("r"), step("c"), step("b"), step("v")]];
        merge_dedup(&mut existing, candidates);
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0][1].hashed_id, "b");
    }

    #[test]
    fn distinct_group_paths_both_retained() {
        let mut existing = vec![vec![step("r"), step("a")]];
        let candidates = vec![vec![step("r"), step("z"), step("a")]];
        merge_dedup(&mut existing, candidates);
        assert_eq!(existing.len(), 2);
    }
}
