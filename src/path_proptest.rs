//! Property-based tests for path manipulation functions.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{encode_repository_id, is_under, normalize_path, parent_path};
    use crate::uid::RepositoryItemUid;
    use proptest::prelude::*;

    // ============================================================================
    // normalize_path property tests
    // ============================================================================

    proptest! {
        /// Property: a normalized path is absolute and has no empty or dot segments
        #[test]
        fn normalize_path_output_is_canonical(input in "[a-z./]{0,40}") {
            if let Ok(result) = normalize_path(&input) {
                prop_assert!(result.starts_with('/'));
                if result != "/" {
                    prop_assert!(!result.ends_with('/'));
                    for segment in result[1..].split('/') {
                        prop_assert!(!segment.is_empty());
                        prop_assert_ne!(segment, ".");
                        prop_assert_ne!(segment, "..");
                    }
                }
            }
        }

        /// Property: normalize_path is idempotent
        #[test]
        fn normalize_path_is_idempotent(input in "[a-zA-Z0-9_./-]{0,40}") {
            if let Ok(once) = normalize_path(&input) {
                let twice = normalize_path(&once).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        /// Property: paths without ".." always normalize
        #[test]
        fn normalize_path_accepts_dotdot_free_input(input in "[a-zA-Z0-9_/]{0,40}") {
            prop_assert!(normalize_path(&input).is_ok());
        }

        /// Property: every normalized path lies under its parent
        #[test]
        fn normalized_path_is_under_parent(input in "[a-z]{1,5}(/[a-z]{1,5}){0,4}") {
            let path = normalize_path(&input).unwrap();
            let parent = parent_path(&path).unwrap();
            prop_assert!(is_under(&path, &parent));
        }
    }

    // ============================================================================
    // RepositoryItemUid property tests
    // ============================================================================

    proptest! {
        /// Property: UIDs built from equivalent spellings are equal
        #[test]
        fn uid_equality_follows_normalization(segments in prop::collection::vec("[a-z0-9]{1,6}", 1..5)) {
            let plain = segments.join("/");
            let noisy = format!("//{}/./", segments.join("//"));
            let a = RepositoryItemUid::new("repo", &plain).unwrap();
            let b = RepositoryItemUid::new("repo", &noisy).unwrap();
            prop_assert_eq!(a, b);
        }

        /// Property: UIDs in different repositories are never equal
        #[test]
        fn uid_repository_distinguishes(path in "[a-z]{1,8}") {
            let a = RepositoryItemUid::new("one", &path).unwrap();
            let b = RepositoryItemUid::new("two", &path).unwrap();
            prop_assert_ne!(a, b);
        }
    }

    // ============================================================================
    // encode_repository_id property tests
    // ============================================================================

    proptest! {
        /// Property: encode_repository_id never produces filesystem-unsafe characters
        #[test]
        fn encode_repository_id_never_produces_unsafe_chars(input in ".*") {
            let result = encode_repository_id(&input);
            let unsafe_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
            for ch in unsafe_chars {
                prop_assert!(
                    !result.contains(ch),
                    "encode_repository_id produced unsafe character '{}' from input '{}'",
                    ch,
                    input
                );
            }
        }

        /// Property: encode_repository_id preserves alphanumeric characters
        #[test]
        fn encode_repository_id_preserves_alphanumeric(input in "[a-zA-Z0-9]+") {
            let result = encode_repository_id(&input);
            prop_assert_eq!(result, input);
        }
    }
}
