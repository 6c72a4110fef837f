//! Surrogate key generation.

/// Builds the surrogate key for the `ordinal`-th member (1-based) of a
/// dimension.
///
/// Two-letter prefixes get a two-digit zero-padded ordinal (`PR01`,
/// `TM12`). Three-letter prefixes get the bare ordinal (`TEC1`, `VEL7`).
/// Longer prefixes are cut to their first three characters. The result is a
/// pure function of its inputs, so fact stages can recompute keys without
/// reading the dimension stage's state.
pub fn surrogate_key(prefix: &str, ordinal: usize) -> String {
    match prefix.chars().count() {
        2 => format!("{prefix}{ordinal:02}"),
        3 => format!("{prefix}{ordinal}"),
        _ => {
            let short: String = prefix.chars().take(3).collect();
            format!("{short}{ordinal}")
        }
    }
}

/// Generates keys `1..=count` for a prefix, in order.
pub fn key_sequence(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|ordinal| surrogate_key(prefix, ordinal)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_two_letter_prefix_is_zero_padded() {
        assert_eq!(surrogate_key("PR", 1), "PR01");
        assert_eq!(surrogate_key("PR", 24), "PR24");
        assert_eq!(surrogate_key("TM", 7), "TM07");
        assert_eq!(surrogate_key("TM", 120), "TM120");
    }

    #[test]
    fn test_three_letter_prefix_is_unpadded() {
        assert_eq!(surrogate_key("TEC", 1), "TEC1");
        assert_eq!(surrogate_key("VEL", 12), "VEL12");
        assert_eq!(surrogate_key("SRV", 6), "SRV6");
    }

    #[test]
    fn test_long_prefix_is_truncated() {
        assert_eq!(surrogate_key("SERV", 3), "SER3");
    }

    #[test]
    fn test_keys_are_stable_and_unique() {
        let first = key_sequence("TM", 40);
        let second = key_sequence("TM", 40);
        assert_eq!(first, second);
        let unique: HashSet<_> = first.iter().collect();
        assert_eq!(unique.len(), 40);
    }
}
