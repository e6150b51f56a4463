//! Semantic set comparison of desired and actual collections.
//!
//! Members are compared by a key rather than by value, so fields the external
//! system assigns (ids) never cause spurious changes. A set is a membership
//! test over keys: duplicates collapse to presence and order is irrelevant.

use std::collections::BTreeMap;

use alert_model::Condition;

/// An element of a [`MemberSet`].
pub trait SetMember: Clone {
    /// The semantic identity used for comparison.
    type Key: Ord + Clone;

    /// Returns the key of this element.
    fn key(&self) -> Self::Key;
}

impl SetMember for Condition {
    type Key = String;

    fn key(&self) -> String {
        self.identity_key()
    }
}

/// Policy ids linked to a channel.
impl SetMember for i64 {
    type Key = Self;

    fn key(&self) -> Self {
        *self
    }
}

/// A collection keyed by semantic identity.
///
/// Every inserted element is kept so that duplicates present externally can
/// all be removed when their key is no longer desired.
#[derive(Debug, Clone)]
pub struct MemberSet<T: SetMember> {
    members: BTreeMap<T::Key, Vec<T>>,
}

/// Conditions compared by [`Condition::identity_key`].
pub type ConditionSet = MemberSet<Condition>;

impl<T: SetMember> Default for MemberSet<T> {
    fn default() -> Self {
        Self {
            members: BTreeMap::new(),
        }
    }
}

impl<T: SetMember> MemberSet<T> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element.
    pub fn insert(&mut self, member: T) {
        self.members.entry(member.key()).or_default().push(member);
    }

    /// Returns true if an element with the same key is present.
    #[must_use]
    pub fn contains(&self, member: &T) -> bool {
        self.members.contains_key(&member.key())
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over every element, duplicates included.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.members.values().flatten()
    }
}

impl<T: SetMember> FromIterator<T> for MemberSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for member in iter {
            set.insert(member);
        }
        set
    }
}

impl<T: SetMember> PartialEq for MemberSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self.members.keys().eq(other.members.keys())
    }
}

/// The changes turning an actual set into a desired one.
#[derive(Debug, Clone)]
pub struct SetDiff<T> {
    /// Actual elements with no desired counterpart, duplicates included.
    pub to_delete: Vec<T>,
    /// Desired elements with no actual counterpart, one per key.
    pub to_create: Vec<T>,
}

impl<T> SetDiff<T> {
    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }
}

/// Computes what to delete from `actual` and create from `desired`.
///
/// Elements present on both sides are left alone, including any extra actual
/// copies of a desired key. A changed element appears as one delete and one
/// create.
#[must_use]
pub fn diff<T: SetMember>(desired: &MemberSet<T>, actual: &MemberSet<T>) -> SetDiff<T> {
    let to_delete = actual
        .members
        .iter()
        .filter(|(key, _)| !desired.members.contains_key(key))
        .flat_map(|(_, copies)| copies.iter().cloned())
        .collect();

    let to_create = desired
        .members
        .iter()
        .filter(|(key, _)| !actual.members.contains_key(key))
        .filter_map(|(_, copies)| copies.first().cloned())
        .collect();

    SetDiff {
        to_delete,
        to_create,
    }
}
