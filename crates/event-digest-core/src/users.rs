//! Case-normalized username identities and the set used to dedupe them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A case-insensitive actor identity, stored in lowercase canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Canonicalize `raw` into a username.
    ///
    /// Canonical form is the lowercased login, nothing else. Returns `None`
    /// for an empty or all-whitespace identity.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(raw.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deduplicated set of canonical usernames.
///
/// Iteration is in sorted order. Cloning yields an independent set, so a
/// baseline taken right after the roster loads is unaffected by later adds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsernameSet {
    members: BTreeSet<Username>,
}

impl UsernameSet {
    /// Create a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a username. Returns `true` if it was not already present.
    pub fn add(&mut self, username: Username) -> bool {
        self.members.insert(username)
    }

    /// Canonicalize and insert a raw identity; blank identities are ignored.
    pub fn add_raw(&mut self, raw: &str) -> bool {
        Username::new(raw).is_some_and(|u| self.add(u))
    }

    /// Returns true if the set contains the username.
    #[must_use]
    pub fn contains(&self, username: &Username) -> bool {
        self.members.contains(username)
    }

    /// Members of `self` that are absent from `other`. Neither operand is
    /// modified.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            members: self.members.difference(&other.members).cloned().collect(),
        }
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Username> {
        self.members.iter()
    }
}

impl Extend<Username> for UsernameSet {
    fn extend<I: IntoIterator<Item = Username>>(&mut self, iter: I) {
        self.members.extend(iter);
    }
}

impl FromIterator<Username> for UsernameSet {
    fn from_iter<I: IntoIterator<Item = Username>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a UsernameSet {
    type Item = &'a Username;
    type IntoIter = std::collections::btree_set::Iter<'a, Username>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(names: &[&str]) -> UsernameSet {
        names.iter().filter_map(|n| Username::new(n)).collect()
    }

    #[test]
    fn username_is_lowercased() {
        let u = Username::new("OctoCat").unwrap();
        assert_eq!(u.as_str(), "octocat");
    }

    #[test]
    fn blank_username_is_rejected() {
        assert!(Username::new("").is_none());
        assert!(Username::new("   ").is_none());
    }

    #[test]
    fn canonical_form_only_lowercases() {
        let u = Username::new(" Bob\t").unwrap();
        assert_eq!(u.as_str(), " bob\t");
        assert_ne!(u, Username::new("bob").unwrap());
    }

    #[test]
    fn add_collapses_case_variants() {
        let mut set = UsernameSet::new();
        assert!(set.add_raw("Alice"));
        assert!(!set.add_raw("alice"));
        assert!(!set.add_raw("ALICE"));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&Username::new("alice").unwrap()));
    }

    #[test]
    fn add_raw_ignores_blank() {
        let mut set = UsernameSet::new();
        assert!(!set.add_raw(""));
        assert!(set.is_empty());
    }

    #[test]
    fn clone_is_independent() {
        let mut all = set_of(&["alice"]);
        let baseline = all.clone();
        all.add_raw("bob");

        assert_eq!(all.len(), 2);
        assert_eq!(baseline.len(), 1);
        assert!(!baseline.contains(&Username::new("bob").unwrap()));
    }

    #[test]
    fn difference_returns_only_new_members() {
        let all = set_of(&["alice", "bob", "carol"]);
        let baseline = set_of(&["bob", "dave"]);

        let new = all.difference(&baseline);
        let names: Vec<&str> = new.iter().map(Username::as_str).collect();
        assert_eq!(names, vec!["alice", "carol"]);

        // operands untouched
        assert_eq!(all.len(), 3);
        assert_eq!(baseline.len(), 2);
    }

    #[test]
    fn difference_with_self_is_empty() {
        let all = set_of(&["alice", "bob"]);
        assert!(all.difference(&all).is_empty());
    }

    #[test]
    fn serializes_as_plain_strings() {
        let set = set_of(&["Bob", "alice"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"members":["alice","bob"]}"#);
    }
}
