//! Typed domain separators for content hashing.
//!
//! Every hash computed by the workspace selects a domain via [`HashDomain`],
//! so a skeleton digest can never collide with a datapoint key or a sample
//! seed even when the hashed bytes coincide.

/// Declares `HashDomain` enum, `as_bytes()`, `ALL`, and `Display` from one list.
macro_rules! define_hash_domains {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $bytes:expr
        ),+ $(,)?
    ) => {
        /// Typed domain separator for [`super::hash::canonical_hash`].
        ///
        /// Every variant maps to a unique, null-terminated byte string used as
        /// a SHA-256 prefix.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum HashDomain {
            $(
                $(#[$meta])*
                $variant,
            )+
        }

        impl HashDomain {
            /// The raw domain-separator bytes (null-terminated).
            #[must_use]
            pub const fn as_bytes(&self) -> &'static [u8] {
                match self {
                    $( Self::$variant => $bytes, )+
                }
            }

            /// All domain variants in declaration order.
            pub const ALL: &[HashDomain] = &[
                $( Self::$variant, )+
            ];
        }

        impl core::fmt::Display for HashDomain {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $( Self::$variant => write!(f, stringify!($variant)), )+
                }
            }
        }
    };
}

define_hash_domains! {
    // -----------------------------------------------------------------------
    // Model
    // -----------------------------------------------------------------------

    /// Skeleton identity (operator names and bound objects, in order).
    Skeleton => b"SIEVE::SKELETON::V1\0",

    /// Continuous state identity bytes.
    WorldState => b"SIEVE::WORLD_STATE::V1\0",

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Per-node sample sub-seed derivation.
    SampleSeed => b"SIEVE::SAMPLE_SEED::V1\0",

    /// Search configuration digest.
    SearchConfig => b"SIEVE::SEARCH_CONFIG::V1\0",

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    /// Labeled feasibility datapoint key (dedup across stage replays).
    FeasibilityDatapoint => b"SIEVE::FEASIBILITY_DATAPOINT::V1\0",

    /// Persisted dataset blob.
    DatasetSnapshot => b"SIEVE::DATASET_SNAPSHOT::V1\0",

    /// Persisted classifier blob.
    ClassifierSnapshot => b"SIEVE::CLASSIFIER_SNAPSHOT::V1\0",
}
