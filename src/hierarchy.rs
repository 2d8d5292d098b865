//! Expansion of a tag into its inheritance subtree.
//!
//! `inherited_from` has no cycle constraint in the database, so the walk is an
//! explicit frontier loop guarded by a visited set. Each pass costs one query
//! for the whole frontier, and the number of passes is bounded by the number
//! of distinct tags reachable from the start.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use itertools::Itertools;
use log::{debug, trace};
use sea_orm::ConnectionTrait;

use crate::error::Result;
use crate::store;

/// Returns `canonical_id` together with every tag that inherits from it,
/// directly or transitively.
pub async fn expand_hierarchy<C: ConnectionTrait>(
    db: &C,
    canonical_id: i32,
) -> Result<BTreeSet<i32>> {
    let mut visited = BTreeSet::from([canonical_id]);
    let mut frontier = vec![canonical_id];
    let mut passes = 0usize;

    while !frontier.is_empty() {
        passes += 1;
        let discovered = store::child_ids(db, &frontier).await?;

        // only ids seen for the first time go into the next pass
        frontier = discovered
            .into_iter()
            .filter(|id| visited.insert(*id))
            .collect_vec();
        trace!("Hierarchy of {canonical_id}: pass {passes} found {} new", frontier.len());
    }

    debug!(
        "Expanded tag {canonical_id} into {} tags in {passes} passes",
        visited.len()
    );
    Ok(visited)
}

/// Time-bounded cache in front of [`expand_hierarchy`].
///
/// An entry is served for at most `ttl` after it was computed, so a re-parented
/// tag is reflected within that window even without an explicit
/// [`invalidate`](Self::invalidate). A zero TTL disables caching.
pub struct HierarchyCache {
    ttl: Duration,
    entries: DashMap<i32, (Instant, Arc<BTreeSet<i32>>)>,
}

impl HierarchyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub async fn expand<C: ConnectionTrait>(
        &self,
        db: &C,
        canonical_id: i32,
    ) -> Result<Arc<BTreeSet<i32>>> {
        if !self.is_enabled() {
            return Ok(Arc::new(expand_hierarchy(db, canonical_id).await?));
        }

        if let Some(entry) = self.entries.get(&canonical_id) {
            let (computed_at, ids) = entry.value();
            if computed_at.elapsed() < self.ttl {
                trace!("Hierarchy cache hit for {canonical_id}");
                return Ok(Arc::clone(ids));
            }
        }

        let ids = Arc::new(expand_hierarchy(db, canonical_id).await?);
        self.entries
            .insert(canonical_id, (Instant::now(), Arc::clone(&ids)));
        Ok(ids)
    }

    /// Drops the cached subtree rooted at `tag_id`.
    ///
    /// Ancestors of `tag_id` still hold it in their cached sets until their
    /// TTL runs out; use [`clear`](Self::clear) after a re-parent if that
    /// window is too long.
    pub fn invalidate(&self, tag_id: i32) {
        self.entries.remove(&tag_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
