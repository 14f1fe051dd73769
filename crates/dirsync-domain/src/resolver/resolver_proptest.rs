//! Property-based tests for parent resolution.

use proptest::prelude::*;

use super::{resolve_by_attribute, resolve_by_dn};

/// Strategy for DN-like strings under `DC=corp`.
fn dn_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z]{1,6}", 0..4).prop_map(|ous| {
        let mut segments: Vec<String> = vec!["CN=g".to_string()];
        segments.extend(ous.into_iter().map(|ou| format!("OU={ou}")));
        segments.push("DC=corp".to_string());
        segments.join(",")
    })
}

fn candidate_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        dn_strategy(),
        Just("null".to_string()),
        Just(String::new()),
        "[A-Za-z]{1,8}",
    ]
}

proptest! {
    #[test]
    fn test_by_dn_main_parent_never_in_other_parents(
        subject in dn_strategy(),
        candidates in prop::collection::vec(candidate_strategy(), 0..8)
    ) {
        let resolution = resolve_by_dn(&subject, &candidates);
        if let Some(main) = &resolution.main_parent {
            prop_assert!(!resolution.other_parents.iter().any(|p| p.eq_ignore_ascii_case(main)));
            prop_assert!(candidates.iter().any(|c| c.trim() == main));
        }
        prop_assert!(!resolution
            .other_parents
            .iter()
            .any(|p| p.eq_ignore_ascii_case("null") || p.is_empty()));
    }

    #[test]
    fn test_by_attribute_main_parent_never_in_other_parents(
        candidates in prop::collection::vec(candidate_strategy(), 0..8)
    ) {
        let resolution = resolve_by_attribute("subject", &candidates);
        if let Some(main) = &resolution.main_parent {
            prop_assert!(!resolution.other_parents.iter().any(|p| p.eq_ignore_ascii_case(main)));
        }
        let has_present = candidates
            .iter()
            .any(|c| !c.trim().is_empty() && !c.trim().eq_ignore_ascii_case("null"));
        prop_assert_eq!(resolution.main_parent.is_some(), has_present);
    }
}
