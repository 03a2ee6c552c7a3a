use super::node::NodeId;
use crate::constants::NODE_ID_BITS;
use std::fmt;

/// A half-open interval `[min, max)` of the identifier space.
///
/// Every range produced by the routing tree is an aligned power of two, so it
/// is stored as its lower bound plus the number of leading bits shared by all
/// of its identifiers. The root range has depth 0 and `max = 2^160`, which does
/// not fit in a `NodeId`; [`BucketRange::last`] gives the inclusive upper bound
/// instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketRange {
    min: NodeId,
    depth: usize,
}

impl BucketRange {
    /// The whole space `[0, 2^160)`.
    pub fn full() -> Self {
        Self {
            min: NodeId::MIN,
            depth: 0,
        }
    }

    /// The range of identifiers sharing the first `depth` bits of `prefix`.
    pub fn from_prefix(prefix: NodeId, depth: usize) -> Self {
        let depth = depth.min(NODE_ID_BITS);
        Self {
            min: prefix.truncate(depth),
            depth,
        }
    }

    pub fn min(&self) -> NodeId {
        self.min
    }

    /// Largest identifier inside the range (`max - 1`).
    pub fn last(&self) -> NodeId {
        self.min.fill_below(self.depth)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        id.truncate(self.depth) == self.min
    }

    /// A range of depth 160 holds a single identifier.
    pub fn can_split(&self) -> bool {
        self.depth < NODE_ID_BITS
    }

    /// Halves the range at its midpoint `(min + max) / 2`.
    ///
    /// Returns `None` for single-identifier ranges.
    pub fn split(&self) -> Option<(BucketRange, BucketRange)> {
        if !self.can_split() {
            return None;
        }

        let depth = self.depth + 1;
        let left = BucketRange {
            min: self.min,
            depth,
        };
        let right = BucketRange {
            min: self.min.with_bit(self.depth),
            depth,
        };
        Some((left, right))
    }
}

impl fmt::Debug for BucketRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] /{}", self.min, self.last(), self.depth)
    }
}
