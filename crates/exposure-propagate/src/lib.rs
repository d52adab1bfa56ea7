//! Chain Propagator (C8): bounded multi-source BFS over the
//! unidirectionally-discovered interaction graph, with per-hop rolling
//! incubation windows and multi-path group-event dedup.
//!
//! # Modules
//!
//! - [`bfs`]: the traversal itself ([`bfs::propagate`])
//! - [`path`]: path representation and canonicalization

pub mod bfs;
pub mod path;

pub use bfs::{propagate, ReachedUser, MAX_HOPS};
pub use path::{canonical_key, merge_dedup, Path, PathStep};
