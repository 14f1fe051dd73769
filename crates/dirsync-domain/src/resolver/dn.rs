//! Distinguished-name segment handling.

/// Splits a DN into its comma separated segments.
///
/// Backslash escapes are kept inside the segment they belong to, so
/// `CN=Smith\, John,DC=corp` yields two segments. Segments are trimmed and
/// empty segments are dropped.
pub(crate) fn split_dn(dn: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in dn.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                escaped = true;
            }
            ',' => {
                push_segment(&mut segments, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_segment(&mut segments, &current);

    segments
}

fn push_segment(segments: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}

/// Compares the last `k` segments of both lists, case-insensitively.
pub(crate) fn tails_match(a: &[String], b: &[String], k: usize) -> bool {
    if k > a.len() || k > b.len() {
        return false;
    }
    a[a.len() - k..]
        .iter()
        .zip(&b[b.len() - k..])
        .all(|(x, y)| x.eq_ignore_ascii_case(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_dn() {
        assert_eq!(
            split_dn("CN=Ops, OU=Ops ,DC=corp"),
            vec!["CN=Ops", "OU=Ops", "DC=corp"]
        );
    }

    #[test]
    fn test_split_keeps_escaped_commas() {
        assert_eq!(
            split_dn(r"CN=Smith\, John,DC=corp"),
            vec![r"CN=Smith\, John", "DC=corp"]
        );
    }

    #[test]
    fn test_split_drops_empty_segments() {
        assert_eq!(split_dn("CN=a,,DC=corp,"), vec!["CN=a", "DC=corp"]);
        assert!(split_dn("   ").is_empty());
    }

    #[test]
    fn test_tails_match() {
        let a = split_dn("CN=x,OU=Ops,DC=corp");
        let b = split_dn("CN=y,ou=ops,dc=CORP");
        assert!(tails_match(&a, &b, 2));
        assert!(!tails_match(&a, &b, 3));
        assert!(!tails_match(&a, &b, 4));
        assert!(tails_match(&a, &b, 0));
    }
}
