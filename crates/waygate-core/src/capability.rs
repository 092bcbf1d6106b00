//! Capability sets for tool gating.
//!
//! Agents declare a capability set at registration; every tool carries a
//! required set. A tool is visible to an agent when the required set is a
//! subset of the declared set. Capability names are plain strings
//! (`"base"`, `"interactive"`, `"admin"`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An ordered set of capability names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    /// Create an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Build a set from capability names.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Add a capability name.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    /// Whether the set contains a capability.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Whether every capability in `self` is present in `other`.
    ///
    /// The empty set is satisfied by anything.
    #[must_use]
    pub fn satisfied_by(&self, other: &CapabilitySet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of capabilities in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over capability names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(String::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_names(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_satisfied_by_anything() {
        let empty = CapabilitySet::new();
        assert!(empty.satisfied_by(&CapabilitySet::new()));
        assert!(empty.satisfied_by(&CapabilitySet::from_names(["base"])));
    }

    #[test]
    fn subset_check() {
        let required = CapabilitySet::from_names(["base"]);
        let declared = CapabilitySet::from_names(["base", "interactive"]);
        assert!(required.satisfied_by(&declared));
        assert!(!declared.satisfied_by(&required));
    }

    #[test]
    fn disjoint_sets_do_not_satisfy() {
        let required = CapabilitySet::from_names(["admin"]);
        let declared = CapabilitySet::from_names(["base"]);
        assert!(!required.satisfied_by(&declared));
    }

    #[test]
    fn display_is_sorted() {
        let set = CapabilitySet::from_names(["interactive", "base"]);
        assert_eq!(set.to_string(), "{base, interactive}");
    }
}
