//! Partitioning schemes: how records of a dataset are assigned to partitions.
//!
//! Key functions, custom partitioners and aggregators are opaque to the
//! planner. They are compared by identity (their registered name) only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a key-extraction function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyFn(String);

impl KeyFn {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to an aggregator/combiner. Passed through, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatorRef(String);

impl AggregatorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeFamily {
    Unpartitioned,
    Hash,
    Range,
    Custom,
}

/// Rule mapping records to partition indices, without the partition count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PartitionScheme {
    /// No known placement rule (round-robin, source splits, element-wise output).
    Unpartitioned,
    Hash {
        key: KeyFn,
    },
    /// Sorted upper bounds; `bounds.len() + 1` partitions.
    Range {
        key: KeyFn,
        bounds: Vec<String>,
    },
    Custom {
        name: String,
        key: KeyFn,
    },
}

impl PartitionScheme {
    pub fn family(&self) -> SchemeFamily {
        match self {
            PartitionScheme::Unpartitioned => SchemeFamily::Unpartitioned,
            PartitionScheme::Hash { .. } => SchemeFamily::Hash,
            PartitionScheme::Range { .. } => SchemeFamily::Range,
            PartitionScheme::Custom { .. } => SchemeFamily::Custom,
        }
    }

    pub fn key(&self) -> Option<&KeyFn> {
        match self {
            PartitionScheme::Unpartitioned => None,
            PartitionScheme::Hash { key }
            | PartitionScheme::Range { key, .. }
            | PartitionScheme::Custom { key, .. } => Some(key),
        }
    }

    /// True when records with equal keys are guaranteed to share a partition.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, PartitionScheme::Unpartitioned)
    }

    /// Same family, same key function and same scheme parameters.
    /// An unpartitioned scheme is compatible with nothing, itself included.
    pub fn compatible_with(&self, other: &PartitionScheme) -> bool {
        self.is_keyed() && self == other
    }

    /// Partition count implied by the scheme itself, if any.
    pub fn implied_partitions(&self) -> Option<usize> {
        match self {
            PartitionScheme::Range { bounds, .. } => Some(bounds.len() + 1),
            _ => None,
        }
    }
}

/// A scheme plus the partition count it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partitioning {
    pub scheme: PartitionScheme,
    pub partitions: usize,
}

impl Partitioning {
    pub fn unpartitioned(partitions: usize) -> Self {
        Self {
            scheme: PartitionScheme::Unpartitioned,
            partitions,
        }
    }

    pub fn hash(key: impl Into<String>, partitions: usize) -> Self {
        Self {
            scheme: PartitionScheme::Hash {
                key: KeyFn::new(key),
            },
            partitions,
        }
    }

    pub fn range(key: impl Into<String>, bounds: Vec<String>) -> Self {
        let partitions = bounds.len() + 1;
        Self {
            scheme: PartitionScheme::Range {
                key: KeyFn::new(key),
                bounds,
            },
            partitions,
        }
    }

    pub fn custom(name: impl Into<String>, key: impl Into<String>, partitions: usize) -> Self {
        Self {
            scheme: PartitionScheme::Custom {
                name: name.into(),
                key: KeyFn::new(key),
            },
            partitions,
        }
    }

    pub fn family(&self) -> SchemeFamily {
        self.scheme.family()
    }

    pub fn is_keyed(&self) -> bool {
        self.scheme.is_keyed()
    }

    /// True when data laid out by `self` already satisfies `required`.
    pub fn satisfies(&self, required: &Partitioning) -> bool {
        self.scheme.compatible_with(&required.scheme) && self.partitions == required.partitions
    }
}

impl fmt::Display for Partitioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            PartitionScheme::Unpartitioned => write!(f, "unpartitioned({})", self.partitions),
            PartitionScheme::Hash { key } => write!(f, "hash({key}, {})", self.partitions),
            PartitionScheme::Range { key, .. } => write!(f, "range({key}, {})", self.partitions),
            PartitionScheme::Custom { name, key } => {
                write!(f, "custom({name}, {key}, {})", self.partitions)
            }
        }
    }
}

/// The partitioning a wide operation needs its input arranged in.
/// `partitions` is the explicitly requested count, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRequirement {
    pub scheme: PartitionScheme,
    pub partitions: Option<usize>,
}

impl PartitionRequirement {
    pub fn hash(key: KeyFn, partitions: Option<usize>) -> Self {
        Self {
            scheme: PartitionScheme::Hash { key },
            partitions,
        }
    }

    /// Redistribution without a key (round-robin repartition).
    pub fn unkeyed(partitions: Option<usize>) -> Self {
        Self {
            scheme: PartitionScheme::Unpartitioned,
            partitions,
        }
    }

    pub fn range(key: KeyFn, bounds: Vec<String>) -> Self {
        Self {
            scheme: PartitionScheme::Range { key, bounds },
            partitions: None,
        }
    }

    pub fn custom(name: impl Into<String>, key: KeyFn, partitions: usize) -> Self {
        Self {
            scheme: PartitionScheme::Custom {
                name: name.into(),
                key,
            },
            partitions: Some(partitions),
        }
    }

    /// Count fixed by the requirement itself (explicit or implied by range bounds).
    pub fn explicit_partitions(&self) -> Option<usize> {
        self.scheme.implied_partitions().or(self.partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_hash_scheme_and_count_satisfies() {
        let a = Partitioning::hash("word", 8);
        assert!(a.satisfies(&Partitioning::hash("word", 8)));
        assert!(!a.satisfies(&Partitioning::hash("word", 4)));
        assert!(!a.satisfies(&Partitioning::hash("user", 8)));
    }

    #[test]
    fn unpartitioned_never_satisfies() {
        let a = Partitioning::unpartitioned(8);
        assert!(!a.satisfies(&Partitioning::unpartitioned(8)));
        assert!(!a.satisfies(&Partitioning::hash("k", 8)));
    }

    #[test]
    fn family_mismatch_does_not_satisfy() {
        let hashed = Partitioning::hash("k", 3);
        let ranged = Partitioning::range("k", vec!["m".into(), "t".into()]);
        assert_eq!(ranged.partitions, 3);
        assert!(!hashed.satisfies(&ranged));
        assert!(!ranged.satisfies(&hashed));
    }

    #[test]
    fn custom_partitioners_compare_by_name() {
        let a = Partitioning::custom("geo", "k", 4);
        assert!(a.satisfies(&Partitioning::custom("geo", "k", 4)));
        assert!(!a.satisfies(&Partitioning::custom("tenant", "k", 4)));
    }

    #[test]
    fn range_requirement_implies_count() {
        let req = PartitionRequirement::range(KeyFn::new("ts"), vec!["a".into()]);
        assert_eq!(req.explicit_partitions(), Some(2));
        assert_eq!(PartitionRequirement::hash(KeyFn::new("k"), None).explicit_partitions(), None);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(Partitioning::hash("word", 8).to_string(), "hash(word, 8)");
        assert_eq!(Partitioning::unpartitioned(2).to_string(), "unpartitioned(2)");
    }
}
