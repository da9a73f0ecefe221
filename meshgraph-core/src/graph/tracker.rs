//! Staleness Tracker
//!
//! Every derived node records the versions of its dependencies at the moment
//! it last computed successfully. The node is stale exactly when that
//! snapshot differs from the versions its dependencies report now.

use smallvec::SmallVec;

use super::dependency::Dependencies;
use super::port::PortId;

/// The version of one dependency as seen by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservedVersion {
    pub port: PortId,
    pub version: u64,
    /// Whether the dependency's last computation had failed. A dependency
    /// that fails (or recovers) without a version change still counts as a
    /// change for its consumers.
    pub failed: bool,
}

/// Ordered (port, version) pairs, one per dependency edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSnapshot {
    entries: SmallVec<[ObservedVersion; 4]>,
}

impl VersionSnapshot {
    /// Read the current version of every edge in `deps`. Never forces
    /// computation.
    pub fn capture(deps: &Dependencies) -> Self {
        deps.iter()
            .map(|edge| ObservedVersion {
                port: edge.port(),
                version: edge.node().version(),
                failed: edge.node().failed(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObservedVersion> {
        self.entries.iter()
    }

    /// The recorded version of `port`, if it is a dependency.
    pub fn version_of(&self, port: PortId) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.port == port)
            .map(|entry| entry.version)
    }
}

impl FromIterator<ObservedVersion> for VersionSnapshot {
    fn from_iter<I: IntoIterator<Item = ObservedVersion>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A node's own version plus the snapshot it was computed against.
#[derive(Debug, Clone, Default)]
pub struct StalenessTracker {
    version: u64,
    snapshot: Option<VersionSnapshot>,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful recomputations so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_computed(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&VersionSnapshot> {
        self.snapshot.as_ref()
    }

    /// True if nothing was ever recorded, or `current` differs from the
    /// recorded snapshot. A node with no dependencies records an empty
    /// snapshot and is never outdated afterwards.
    pub fn outdated(&self, current: &VersionSnapshot) -> bool {
        match &self.snapshot {
            None => true,
            Some(recorded) => recorded != current,
        }
    }

    /// Replace the snapshot and bump the version. Returns the new version.
    pub fn record(&mut self, current: VersionSnapshot) -> u64 {
        self.snapshot = Some(current);
        self.version += 1;
        self.version
    }
}
