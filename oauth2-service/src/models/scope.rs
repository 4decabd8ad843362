//! Scope set shared by applications, profiles, codes and tokens.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Always present on a resolved scope.
pub const DEFAULT_SCOPE: &str = "default";
/// Present when the token subject is the application itself.
pub const APPLICATION_SCOPE: &str = "application";
/// Present when the token subject is a human user.
pub const USER_SCOPE: &str = "user";
/// Present when the user owns the application.
pub const APPLICATION_OWNER_SCOPE: &str = "application_owner";
/// Present when the user owns the application's project.
pub const PROJECT_OWNER_SCOPE: &str = "project_owner";

/// Markers the engine appends itself. Callers can never request them.
pub const VIRTUAL_SCOPES: [&str; 5] = [
    DEFAULT_SCOPE,
    APPLICATION_SCOPE,
    USER_SCOPE,
    APPLICATION_OWNER_SCOPE,
    PROJECT_OWNER_SCOPE,
];

pub fn is_virtual(entry: &str) -> bool {
    VIRTUAL_SCOPES.contains(&entry)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("scope entries must not be empty")]
    Empty,

    #[error("scope entry '{0}' contains whitespace")]
    Whitespace(String),
}

/// Deduplicated, insertion-ordered set of scope strings.
///
/// Stored as an array, transmitted as a space-joined string. Entries are
/// validated on the way in so a stored set never needs coercion later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a set from individual entries, dropping duplicates.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry)?;
        }
        Ok(set)
    }

    /// Parse the space-joined wire form. Empty input yields an empty set.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::new();
        for entry in raw.split_whitespace() {
            set.push_valid(entry);
        }
        set
    }

    /// Insert an entry. Returns `false` when it was already present.
    pub fn insert<S: Into<String>>(&mut self, entry: S) -> Result<bool, ScopeError> {
        let entry = entry.into();
        if entry.is_empty() {
            return Err(ScopeError::Empty);
        }
        if entry.chars().any(char::is_whitespace) {
            return Err(ScopeError::Whitespace(entry));
        }
        Ok(self.push_valid(&entry))
    }

    fn push_valid(&mut self, entry: &str) -> bool {
        if self.contains(entry) {
            return false;
        }
        self.0.push(entry.to_string());
        true
    }

    pub(crate) fn push_marker(&mut self, marker: &'static str) {
        self.push_valid(marker);
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.iter().any(|e| e == entry)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.iter().all(|entry| other.contains(entry))
    }

    /// Entries of `self` also present in `other`, in `self`'s order.
    pub fn intersection(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet(
            self.0
                .iter()
                .filter(|entry| other.contains(entry))
                .cloned()
                .collect(),
        )
    }

    /// Copy of the set with every engine-appended marker removed.
    pub fn without_virtual(&self) -> ScopeSet {
        ScopeSet(
            self.0
                .iter()
                .filter(|entry| !is_virtual(entry))
                .cloned()
                .collect(),
        )
    }

    pub fn to_wire(&self) -> String {
        self.0.join(" ")
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl TryFrom<Vec<String>> for ScopeSet {
    type Error = ScopeError;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_entries(entries)
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(set: ScopeSet) -> Self {
        set.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deduplicates_and_keeps_order() {
        let set = ScopeSet::parse("read  write read admin");
        assert_eq!(set.to_wire(), "read write admin");
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_parse_empty() {
        assert!(ScopeSet::parse("   ").is_empty());
    }

    #[test]
    fn test_insert_rejects_invalid_entries() {
        let mut set = ScopeSet::new();
        assert_eq!(set.insert(""), Err(ScopeError::Empty));
        assert_eq!(
            set.insert("read write"),
            Err(ScopeError::Whitespace("read write".to_string()))
        );
        assert_eq!(set.insert("read"), Ok(true));
        assert_eq!(set.insert("read"), Ok(false));
    }

    #[test]
    fn test_intersection_keeps_left_order() {
        let left = ScopeSet::parse("c a b");
        let right = ScopeSet::parse("a b c d");
        assert_eq!(left.intersection(&right).to_wire(), "c a b");
        assert_eq!(right.intersection(&left).to_wire(), "a b c");
    }

    #[test]
    fn test_subset() {
        let small = ScopeSet::parse("a");
        let big = ScopeSet::parse("a b");
        assert!(small.is_subset(&big));
        assert!(!big.is_subset(&small));
        assert!(ScopeSet::new().is_subset(&small));
    }

    #[test]
    fn test_without_virtual() {
        let set = ScopeSet::parse("default read user project_owner");
        assert_eq!(set.without_virtual().to_wire(), "read");
    }

    #[test]
    fn test_serde_validates_entries() {
        let parsed: Result<ScopeSet, _> = serde_json::from_str(r#"["read", "read", "write"]"#);
        assert_eq!(parsed.map(|s| s.to_wire()).ok(), Some("read write".to_string()));

        let invalid: Result<ScopeSet, _> = serde_json::from_str(r#"["read write"]"#);
        assert!(invalid.is_err());
    }
}
