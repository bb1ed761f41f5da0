use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use followermaze_core::UserId;

/// Who follows whom.
///
/// Maps a followee to the set of users following it. A followee is only
/// present while it has at least one follower, so an unknown user and a user
/// with no followers look the same. Every operation holds the followee's
/// shard lock for its whole read-modify-write.
#[derive(Clone, Default)]
pub struct FollowerGraph {
    followers: Arc<DashMap<UserId, HashSet<UserId>>>,
}

impl FollowerGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `follower` follow `followee`. Returns false if the edge already existed.
    pub fn add_follower(&self, followee: UserId, follower: UserId) -> bool {
        let added = self.followers.entry(followee).or_default().insert(follower);
        if added {
            debug!(followee = %followee, follower = %follower, "Follower added");
        }
        added
    }

    /// Remove the edge if present, pruning `followee` once its set is empty.
    /// Returns false if there was no such edge.
    pub fn remove_follower(&self, followee: UserId, follower: UserId) -> bool {
        match self.followers.entry(followee) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&follower);
                if entry.get().is_empty() {
                    entry.remove();
                    debug!(followee = %followee, "Followee has no more followers, removed");
                }
                if removed {
                    debug!(followee = %followee, follower = %follower, "Follower removed");
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Snapshot of the current followers of `followee`; empty if unknown
    #[must_use]
    pub fn followers_of(&self, followee: UserId) -> HashSet<UserId> {
        self.followers
            .get(&followee)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_following(&self, follower: UserId, followee: UserId) -> bool {
        self.followers
            .get(&followee)
            .is_some_and(|set| set.contains(&follower))
    }

    /// Get the number of followers of a user
    #[must_use]
    pub fn follower_count(&self, followee: UserId) -> usize {
        self.followers.get(&followee).map_or(0, |set| set.len())
    }

    /// Get the number of users with at least one follower
    #[must_use]
    pub fn followee_count(&self) -> usize {
        self.followers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_follower() {
        let graph = FollowerGraph::new();

        assert!(graph.add_follower(UserId(2), UserId(1)));
        assert!(graph.is_following(UserId(1), UserId(2)));
        assert!(!graph.is_following(UserId(2), UserId(1)));
        assert_eq!(graph.followers_of(UserId(2)), HashSet::from([UserId(1)]));
    }

    #[test]
    fn test_add_follower_is_idempotent() {
        let graph = FollowerGraph::new();

        assert!(graph.add_follower(UserId(2), UserId(1)));
        let once = graph.followers_of(UserId(2));
        assert!(!graph.add_follower(UserId(2), UserId(1)));

        assert_eq!(graph.followers_of(UserId(2)), once);
        assert_eq!(graph.follower_count(UserId(2)), 1);
    }

    #[test]
    fn test_remove_absent_edge_is_noop() {
        let graph = FollowerGraph::new();
        graph.add_follower(UserId(2), UserId(1));

        assert!(!graph.remove_follower(UserId(2), UserId(3)));
        assert!(!graph.remove_follower(UserId(9), UserId(1)));
        assert_eq!(graph.followers_of(UserId(2)), HashSet::from([UserId(1)]));
        assert_eq!(graph.followee_count(), 1);
    }

    #[test]
    fn test_last_removal_prunes_followee() {
        let graph = FollowerGraph::new();
        graph.add_follower(UserId(2), UserId(1));
        graph.add_follower(UserId(2), UserId(3));

        assert!(graph.remove_follower(UserId(2), UserId(1)));
        assert_eq!(graph.followee_count(), 1);

        assert!(graph.remove_follower(UserId(2), UserId(3)));
        assert_eq!(graph.followee_count(), 0);
        assert!(graph.followers_of(UserId(2)).is_empty());
    }

    #[test]
    fn test_unknown_followee_has_no_followers() {
        let graph = FollowerGraph::new();

        assert!(graph.followers_of(UserId(42)).is_empty());
        assert_eq!(graph.follower_count(UserId(42)), 0);
    }

    #[test]
    fn test_concurrent_mutation() {
        let graph = FollowerGraph::new();
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let graph = graph.clone();
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        let follower = UserId(worker * 1000 + i);
                        graph.add_follower(UserId(1), follower);
                        if i % 2 == 0 {
                            graph.remove_follower(UserId(1), follower);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(graph.follower_count(UserId(1)), 8 * 50);
    }
}
