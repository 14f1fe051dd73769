//! Main-parent resolution for groups with several candidate parents.
//!
//! A group may nominally belong to several parent groups. Hierarchy traversal
//! needs exactly one, the *main parent*. Two strategies exist, selected per
//! scope through [`ParentStrategy`]:
//!
//! - **By DN**: candidates are DNs. A candidate is an eligible ancestor when
//!   its path (minus its leaf) is a suffix of the subject's path. The candidate
//!   agreeing on the most trailing segments wins; ties keep the first one seen.
//! - **By attribute**: candidates are plain values; the first declared one wins.
//!
//! Blank values and the `null` marker are discarded before ranking. Ambiguity
//! is never an error: it is logged and the tie-break rule applies.

mod dn;

#[cfg(test)]
mod resolver_proptest;

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::directory::RawEntry;
use crate::model::{is_absent, normalize_key, GroupEntry, ParentStrategy, ScopeSettings};

use dn::{split_dn, tails_match};

/// Outcome of parent resolution for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentResolution {
    pub main_parent: Option<String>,
    /// Accepted candidates other than the main parent.
    pub other_parents: BTreeSet<String>,
}

impl ParentResolution {
    /// Accepted candidates are compared by normalized key; the first spelling
    /// seen is kept and the main parent is dropped from the rest.
    fn finish(main_parent: Option<String>, accepted: Vec<&str>) -> Self {
        let mut seen: HashSet<String> = main_parent.iter().map(|m| normalize_key(m)).collect();
        let other_parents = accepted
            .into_iter()
            .filter(|parent| seen.insert(normalize_key(parent)))
            .map(str::to_string)
            .collect();
        Self {
            main_parent,
            other_parents,
        }
    }
}

/// Why a DN candidate was not eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// Deeper than the subject, so it cannot be an ancestor.
    Below,
    /// Shares no common path with the subject.
    OutsideTree,
    /// The subject's own DN.
    SelfReference,
}

/// Resolves parents with the given strategy.
pub fn resolve_parents(
    strategy: ParentStrategy,
    subject_dn: &str,
    candidates: &[String],
) -> ParentResolution {
    match strategy {
        ParentStrategy::ByDn => resolve_by_dn(subject_dn, candidates),
        ParentStrategy::ByAttribute => resolve_by_attribute(subject_dn, candidates),
    }
}

/// Picks the closest ancestor in the DN tree.
pub fn resolve_by_dn(subject_dn: &str, candidates: &[String]) -> ParentResolution {
    let subject = split_dn(subject_dn);

    let mut accepted: Vec<&str> = Vec::new();
    let mut rejected: Vec<(&str, Rejection)> = Vec::new();
    let mut best: Option<(&str, usize)> = None;

    for candidate in candidates.iter().filter(|c| !is_absent(c)) {
        let candidate = candidate.trim();
        let segments = split_dn(candidate);

        if candidate.eq_ignore_ascii_case(subject_dn.trim()) {
            rejected.push((candidate, Rejection::SelfReference));
            continue;
        }

        if segments.len() > subject.len() {
            debug!(
                subject = %subject_dn,
                candidate = %candidate,
                "Parent candidate lies below the subject, ignoring"
            );
            rejected.push((candidate, Rejection::Below));
            continue;
        }

        // Leaf component of the shorter path is excluded from the comparison.
        let depth = segments.len().min(subject.len()).saturating_sub(1);
        if depth == 0 || !tails_match(&segments, &subject, depth) {
            rejected.push((candidate, Rejection::OutsideTree));
            continue;
        }

        accepted.push(candidate);
        if best.map_or(true, |(_, weight)| depth > weight) {
            best = Some((candidate, depth));
        }
    }

    let main_parent = best.map(|(dn, _)| dn.to_string());
    if main_parent.is_none() && !rejected.is_empty() {
        warn!(
            subject = %subject_dn,
            rejected = ?rejected,
            "No parent candidate shares the subject's DN tree"
        );
    }

    ParentResolution::finish(main_parent, accepted)
}

/// Picks the first declared parent.
pub fn resolve_by_attribute(subject: &str, candidates: &[String]) -> ParentResolution {
    let present: Vec<&str> = candidates
        .iter()
        .filter(|c| !is_absent(c))
        .map(|c| c.trim())
        .collect();

    if present.len() > 1 {
        debug!(
            subject = %subject,
            candidates = ?present,
            "Group declares several parents, using the first one"
        );
    }

    let main_parent = present.first().map(|first| first.to_string());
    ParentResolution::finish(main_parent, present)
}

/// Turns a raw directory entry into a resolved [`GroupEntry`].
pub fn resolve_entry(raw: &RawEntry, scope: &str, settings: &ScopeSettings) -> GroupEntry {
    let subject = match settings.parent_strategy {
        ParentStrategy::ByDn => raw.dn.as_str(),
        ParentStrategy::ByAttribute => raw.name.as_str(),
    };
    let resolution = resolve_parents(settings.parent_strategy, subject, &raw.parents);

    let members = raw
        .members
        .iter()
        .filter(|m| !is_absent(m))
        .map(|m| m.trim().to_string())
        .collect();

    let name = raw.name.trim().to_string();
    let manager_group_name = raw
        .manager_group
        .as_deref()
        .filter(|m| !is_absent(m))
        .map(|m| m.trim().to_string())
        .or_else(|| {
            settings
                .manager_suffix
                .as_deref()
                .filter(|suffix| !suffix.trim().is_empty())
                .map(|suffix| format!("{name}{}", suffix.trim()))
        });

    GroupEntry {
        is_structure_unit: settings.is_structure_unit(&name),
        name,
        dn: raw.dn.trim().to_string(),
        scope: scope.to_string(),
        main_parent: resolution.main_parent,
        other_parents: resolution.other_parents,
        members,
        description: raw.description.clone().filter(|d| !is_absent(d)),
        manager_group_name,
    }
}
