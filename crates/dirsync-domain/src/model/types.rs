//! Core types for the group hierarchy.

use std::collections::BTreeSet;

/// Scope used when a caller passes a blank scope name.
pub const DEFAULT_SCOPE: &str = "DEFAULT";

/// Literal the directory uses for an unset reference.
pub const NULL_MARKER: &str = "null";

/// Canonical form of a name, DN or scope key: trimmed and upper-cased.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

/// Returns true for blank values and the `null` marker.
pub fn is_absent(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NULL_MARKER)
}

/// How parent references of a scope are encoded in the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentStrategy {
    /// Parent links are full DNs; the closest ancestor in the DN tree wins.
    #[default]
    ByDn,
    /// Parent links are plain attribute values; the first declared one wins.
    ByAttribute,
}

/// Resolution settings for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSettings {
    pub parent_strategy: ParentStrategy,
    /// Names of groups that represent organizational structure units.
    pub structure_units: Vec<String>,
    /// Suffix appended to a group name to derive its manager group.
    pub manager_suffix: Option<String>,
}

impl ScopeSettings {
    pub fn with_strategy(mut self, strategy: ParentStrategy) -> Self {
        self.parent_strategy = strategy;
        self
    }

    pub fn with_structure_units<I, S>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.structure_units = units.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_manager_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.manager_suffix = Some(suffix.into());
        self
    }

    /// Whether `name` is configured as a structure unit (case-insensitive).
    pub fn is_structure_unit(&self, name: &str) -> bool {
        let name = name.trim();
        self.structure_units
            .iter()
            .any(|unit| unit.trim().eq_ignore_ascii_case(name))
    }
}

/// A group after parent resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub dn: String,
    pub scope: String,
    /// The single parent used for hierarchy traversal.
    pub main_parent: Option<String>,
    /// Remaining parent references; never contains `main_parent`.
    pub other_parents: BTreeSet<String>,
    pub members: BTreeSet<String>,
    pub description: Option<String>,
    pub is_structure_unit: bool,
    pub manager_group_name: Option<String>,
}

impl GroupEntry {
    pub fn new(name: impl Into<String>, dn: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dn: dn.into(),
            scope: scope.into(),
            ..Default::default()
        }
    }

    /// Whether `reference` names this group by name or DN.
    pub fn matches(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.name.trim().eq_ignore_ascii_case(reference)
            || (!self.dn.trim().is_empty() && self.dn.trim().eq_ignore_ascii_case(reference))
    }
}
