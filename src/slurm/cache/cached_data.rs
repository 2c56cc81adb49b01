use crate::slurm::object::Resource;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Position of one remote read in the order reads were started.
///
/// Taken before the read is issued, so a slow read that started earlier
/// never overwrites the result of one that started later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Observation {
    pub seq: u64,
    pub at: DateTime<Utc>,
}

/// One cached object
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub object: Resource,
    pub last_update: DateTime<Utc>,
    pub observed: u64, // Observation::seq of the read that produced `object`
}

impl CacheEntry {
    #[must_use]
    pub const fn new(object: Resource, observation: Observation) -> Self {
        Self {
            object,
            last_update: observation.at,
            observed: observation.seq,
        }
    }

    /// True if `observation` started before the read that produced this entry
    #[must_use]
    pub const fn is_newer_than(&self, observation: Observation) -> bool {
        observation.seq < self.observed
    }

    pub fn update(&mut self, object: Resource, observation: Observation) {
        self.object = object;
        self.last_update = observation.at;
        self.observed = observation.seq;
    }

    /// Time since the cached value last changed
    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.last_update).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slurm::resources::Node;

    fn observation(seq: u64) -> Observation {
        Observation { seq, at: Utc::now() }
    }

    #[test]
    fn test_entry_ordering() {
        let entry = CacheEntry::new(Node::default().into(), observation(5));
        assert!(entry.is_newer_than(observation(4)));
        assert!(!entry.is_newer_than(observation(5)));
        assert!(!entry.is_newer_than(observation(6)));
    }

    #[test]
    fn test_entry_update() {
        let mut entry = CacheEntry::new(Node::default().into(), observation(1));
        let node = Node {
            name: "n1".to_string(),
            ..Node::default()
        };
        let later = observation(2);
        entry.update(node.clone().into(), later);
        assert_eq!(entry.observed, 2);
        assert_eq!(entry.last_update, later.at);
        assert_eq!(entry.object, node.into());
        assert!(entry.age() < Duration::from_secs(60));
    }
}
