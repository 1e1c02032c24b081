//! Append-only node storage shared between snapshots.
//!
//! Nodes live in segments of doubling size. Each snapshot holds the shared
//! segment list plus its own length, and only sees slots below that length.
//! Appending fills the next slot in place; the segment list itself is copied
//! only when a new segment opens, so an append costs O(1) amortized.

use std::sync::{Arc, OnceLock};

use stagecut_core::error::{Error, Result};

use crate::node::DatasetNode;

/// Capacity of the first segment. Segment `i` holds `BASE << i` slots.
const BASE: usize = 64;

type Segment = Arc<[OnceLock<Arc<DatasetNode>>]>;

#[derive(Clone, Default)]
pub(crate) struct NodeArena {
    segments: Arc<Vec<Segment>>,
    len: usize,
}

/// `(segment, offset)` of a node index.
fn locate(index: usize) -> (usize, usize) {
    let bucket = index / BASE + 1;
    let segment = (usize::BITS - 1 - bucket.leading_zeros()) as usize;
    let offset = index - BASE * ((1 << segment) - 1);
    (segment, offset)
}

impl NodeArena {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Arc<DatasetNode>> {
        if index >= self.len {
            return None;
        }
        let (segment, offset) = locate(index);
        self.segments.get(segment)?.get(offset)?.get()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<DatasetNode>> {
        (0..self.len).filter_map(move |index| self.get(index))
    }

    /// A new arena one node longer. `self` keeps its length, so older
    /// snapshots never see the node. Appends must be serialized by the caller
    /// and always start from the latest arena.
    pub(crate) fn append(&self, node: DatasetNode) -> Result<NodeArena> {
        let (segment, offset) = locate(self.len);
        let segments = if segment < self.segments.len() {
            Arc::clone(&self.segments)
        } else {
            let mut grown = Vec::with_capacity(segment + 1);
            grown.extend(self.segments.iter().cloned());
            grown.push((0..BASE << segment).map(|_| OnceLock::new()).collect::<Segment>());
            Arc::new(grown)
        };

        let slot = segments
            .get(segment)
            .and_then(|s| s.get(offset))
            .ok_or_else(|| Error::Invariant(format!("no slot for node {}", self.len)))?;
        slot.set(Arc::new(node)).map_err(|_| {
            Error::Invariant(format!("slot for node {} already filled", self.len))
        })?;

        Ok(NodeArena {
            segments,
            len: self.len + 1,
        })
    }
}

impl std::fmt::Debug for NodeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeArena")
            .field("len", &self.len)
            .field("segments", &self.segments.len())
            .finish()
    }
}
