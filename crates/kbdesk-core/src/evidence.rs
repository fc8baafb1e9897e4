//! Per-version evidence index.
//!
//! An [`EvidenceIndex`] is built once from the ordered sources of a single
//! [`AnswerVersion`] and never mutated afterwards. A new version always gets
//! a new index, so a source number looked up in one version can never
//! resolve against another version's sources.

use std::collections::HashMap;

use crate::models::{AnswerVersion, EvidenceSource};

/// Ordered evidence sources of one answer version, addressable by number.
#[derive(Debug, Clone, Default)]
pub struct EvidenceIndex {
    sources: Vec<EvidenceSource>,
    positions: HashMap<u32, usize>,
}

impl EvidenceIndex {
    /// Build an index over `sources`, preserving their order.
    ///
    /// If a source number repeats, lookups resolve to its first occurrence.
    pub fn new(sources: Vec<EvidenceSource>) -> Self {
        let mut positions = HashMap::with_capacity(sources.len());
        for (pos, source) in sources.iter().enumerate() {
            positions.entry(source.source_no).or_insert(pos);
        }
        Self { sources, positions }
    }

    pub fn for_version(version: &AnswerVersion) -> Self {
        Self::new(version.sources.clone())
    }

    pub fn lookup(&self, source_no: u32) -> Option<&EvidenceSource> {
        self.positions
            .get(&source_no)
            .and_then(|&pos| self.sources.get(pos))
    }

    pub fn contains(&self, source_no: u32) -> bool {
        self.positions.contains_key(&source_no)
    }

    /// Number of the first source, which is selected by default.
    pub fn default_source_no(&self) -> Option<u32> {
        self.sources.first().map(|s| s.source_no)
    }

    /// All sources in their original order.
    pub fn all(&self) -> &[EvidenceSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
