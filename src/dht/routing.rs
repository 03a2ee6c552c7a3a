//! The bucket tree.
//!
//! The identifier space starts as a single leaf bucket. A full leaf whose
//! range contains our own id is split at its midpoint; any other full leaf
//! rejects new contacts. Resolution therefore stays fine around our id and
//! coarse everywhere else, which bounds the table to roughly
//! `bucket_size * 160` contacts.
//!
//! Every tree node has its own lock. Descent holds at most one lock at a time
//! and the child pair of an interior node never changes once published, so
//! operations on different buckets do not contend. A full traversal
//! ([`RoutingTable::iter`]) only sees each bucket consistently with itself:
//! inserts into buckets it has not reached yet may or may not be observed.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::error::DhtError;
use super::node::{Node, NodeId};
use super::range::BucketRange;
use crate::constants::{K, MAX_TREE_DEPTH};

/// What [`RoutingTable::insert`] did with a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The contact was new and now occupies a bucket slot.
    Added,
    /// A contact with the same id was already present; its `last_seen` was
    /// refreshed and its stored address kept.
    Updated,
}

#[derive(Debug, Default)]
struct Bucket {
    nodes: BTreeMap<NodeId, Node>,
}

enum NodeState {
    Leaf(Bucket),
    Interior {
        left: Arc<TreeNode>,
        right: Arc<TreeNode>,
    },
}

struct TreeNode {
    range: BucketRange,
    state: RwLock<NodeState>,
}

impl TreeNode {
    fn leaf(range: BucketRange, nodes: BTreeMap<NodeId, Node>) -> Arc<Self> {
        Arc::new(Self {
            range,
            state: RwLock::new(NodeState::Leaf(Bucket { nodes })),
        })
    }
}

/// Chooses the child of an interior node whose range holds `id`.
fn route<'a>(
    left: &'a Arc<TreeNode>,
    right: &'a Arc<TreeNode>,
    id: &NodeId,
) -> Result<&'a Arc<TreeNode>, DhtError> {
    if left.range.contains(id) {
        Ok(left)
    } else if right.range.contains(id) {
        Ok(right)
    } else {
        Err(DhtError::BrokenPartitionInvariant)
    }
}

/// The child of `tree_node` towards `id`, or `None` if it is a leaf.
fn descend(tree_node: &TreeNode, id: &NodeId) -> Result<Option<Arc<TreeNode>>, DhtError> {
    match &*tree_node.state.read() {
        NodeState::Leaf(_) => Ok(None),
        NodeState::Interior { left, right } => route(left, right, id).map(|c| Some(Arc::clone(c))),
    }
}

/// Smallest distance from `target` to any identifier in `range`.
fn lower_bound(range: &BucketRange, target: &NodeId) -> NodeId {
    range.min().distance(target).truncate(range.depth())
}

/// Contents of one leaf bucket at the moment it was read.
#[derive(Debug, Clone)]
pub struct LeafSnapshot {
    pub range: BucketRange,
    pub nodes: Vec<Node>,
}

/// Kademlia routing table organised as a binary tree of buckets.
pub struct RoutingTable {
    our_id: NodeId,
    bucket_size: usize,
    max_depth: usize,
    root: Arc<TreeNode>,
}

impl RoutingTable {
    pub fn new(our_id: NodeId) -> Self {
        Self::with_limits(our_id, K, MAX_TREE_DEPTH)
    }

    /// `bucket_size` is raised to at least 1 and `max_depth` capped at 160.
    pub fn with_limits(our_id: NodeId, bucket_size: usize, max_depth: usize) -> Self {
        Self {
            our_id,
            bucket_size: bucket_size.max(1),
            max_depth: max_depth.min(MAX_TREE_DEPTH),
            root: TreeNode::leaf(BucketRange::full(), BTreeMap::new()),
        }
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Adds a contact, splitting the bucket around our own id when needed.
    ///
    /// A contact already present only has its `last_seen` refreshed: it keeps
    /// its stored address and never takes a second slot. Use
    /// [`set_addr`](Self::set_addr) to move a contact.
    ///
    /// Returns [`DhtError::BucketFull`] when the target bucket is full and
    /// does not cover our id, and [`DhtError::DepthLimit`] when it does but
    /// has reached the maximum depth.
    pub fn insert(&self, node: Node) -> Result<InsertOutcome, DhtError> {
        if !self.root.range.contains(&node.id) {
            return Err(DhtError::OutOfRange);
        }

        let mut current = Arc::clone(&self.root);
        loop {
            if let Some(child) = descend(&current, &node.id)? {
                current = child;
                continue;
            }

            let mut state = current.state.write();
            let range = current.range;
            let split = match &mut *state {
                NodeState::Leaf(bucket) => {
                    if let Some(existing) = bucket.nodes.get_mut(&node.id) {
                        existing.touch();
                        trace!("Refreshed {} in bucket {:?}", node.id, range);
                        return Ok(InsertOutcome::Updated);
                    }

                    if bucket.nodes.len() < self.bucket_size {
                        trace!("Added {} to bucket {:?}", node.id, range);
                        bucket.nodes.insert(node.id, node);
                        return Ok(InsertOutcome::Added);
                    }

                    if !range.contains(&self.our_id) {
                        return Err(DhtError::BucketFull);
                    }
                    if range.depth() >= self.max_depth {
                        return Err(DhtError::DepthLimit(range.depth()));
                    }

                    Self::split(range, &bucket.nodes)?
                }
                // Split by another writer since we looked.
                NodeState::Interior { .. } => continue,
            };

            *state = split;
            drop(state);
            debug!("Split bucket {:?}", range);
        }
    }

    /// Builds the interior node that replaces a full leaf.
    ///
    /// The leaf is left untouched; both children are complete before the
    /// caller publishes the result, so no reader ever sees a half-split bucket.
    fn split(range: BucketRange, nodes: &BTreeMap<NodeId, Node>) -> Result<NodeState, DhtError> {
        let (left_range, right_range) = range.split().ok_or(DhtError::DepthLimit(range.depth()))?;

        let (left_nodes, right_nodes): (BTreeMap<_, _>, BTreeMap<_, _>) = nodes
            .iter()
            .map(|(id, node)| (*id, node.clone()))
            .partition(|(id, _)| left_range.contains(id));

        if !right_nodes.keys().all(|id| right_range.contains(id)) {
            return Err(DhtError::BrokenPartitionInvariant);
        }

        Ok(NodeState::Interior {
            left: TreeNode::leaf(left_range, left_nodes),
            right: TreeNode::leaf(right_range, right_nodes),
        })
    }

    /// Moves a known contact to a new address. Returns `false` if unknown.
    ///
    /// [`insert`](Self::insert) never changes the address of a stored contact.
    pub fn set_addr(&self, id: &NodeId, addr: SocketAddr) -> bool {
        self.with_bucket(id, |bucket| match bucket.nodes.get_mut(id) {
            Some(node) => {
                node.addr = addr;
                node.touch();
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    /// Runs `f` on the leaf bucket holding `id` under that bucket's write lock.
    fn with_bucket<R>(&self, id: &NodeId, f: impl FnOnce(&mut Bucket) -> R) -> Result<R, DhtError> {
        let mut current = Arc::clone(&self.root);
        loop {
            if let Some(child) = descend(&current, id)? {
                current = child;
                continue;
            }

            let mut state = current.state.write();
            if let NodeState::Leaf(bucket) = &mut *state {
                return Ok(f(bucket));
            }
        }
    }

    pub fn find(&self, id: &NodeId) -> Option<Node> {
        let mut current = Arc::clone(&self.root);
        loop {
            let state = current.state.read();
            let child = match &*state {
                NodeState::Leaf(bucket) => return bucket.nodes.get(id).cloned(),
                NodeState::Interior { left, right } => Arc::clone(route(left, right, id).ok()?),
            };
            drop(state);
            current = child;
        }
    }

    /// Removes a contact. Buckets never merge back, so the freed slot stays
    /// in the same bucket.
    pub fn remove(&self, id: &NodeId) -> Option<Node> {
        self.with_bucket(id, |bucket| bucket.nodes.remove(id))
            .ok()
            .flatten()
    }

    /// Refreshes `last_seen` of a known contact. Returns `false` if unknown.
    pub fn touch(&self, id: &NodeId) -> bool {
        self.with_bucket(id, |bucket| match bucket.nodes.get_mut(id) {
            Some(node) => {
                node.touch();
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    /// Up to `k` contacts ordered by XOR distance to `target`.
    ///
    /// If the nearest contact is `target` itself only that contact is
    /// returned. Subtrees that cannot beat the current k-th best distance are
    /// never visited.
    pub fn closest(&self, target: &NodeId, k: usize) -> Vec<Node> {
        if k == 0 {
            return Vec::new();
        }

        let mut frontier = BinaryHeap::new();
        frontier.push(Frontier {
            bound: lower_bound(&self.root.range, target),
            node: Arc::clone(&self.root),
        });
        let capacity = k.min(self.bucket_size.saturating_mul(MAX_TREE_DEPTH + 1));
        let mut best: BinaryHeap<Candidate> = BinaryHeap::with_capacity(capacity.saturating_add(1));

        while let Some(Frontier { bound, node }) = frontier.pop() {
            if best.len() == k && best.peek().is_some_and(|worst| bound >= worst.distance) {
                break;
            }

            let state = node.state.read();
            match &*state {
                NodeState::Leaf(bucket) => {
                    for n in bucket.nodes.values() {
                        best.push(Candidate {
                            distance: n.id.distance(target),
                            node: n.clone(),
                        });
                        if best.len() > k {
                            best.pop();
                        }
                    }
                }
                NodeState::Interior { left, right } => {
                    for child in [left, right] {
                        frontier.push(Frontier {
                            bound: lower_bound(&child.range, target),
                            node: Arc::clone(child),
                        });
                    }
                }
            }
        }

        let mut nodes: Vec<Node> = best.into_sorted_vec().into_iter().map(|c| c.node).collect();
        if nodes.first().is_some_and(|n| n.id == *target) {
            nodes.truncate(1);
        }
        nodes
    }

    /// Lazily walks every contact in ascending id order.
    ///
    /// Each call starts a fresh walk. See the module docs for the consistency
    /// this offers under concurrent inserts.
    pub fn iter(&self) -> Iter {
        Iter {
            stack: vec![Arc::clone(&self.root)],
            current: Vec::new().into_iter(),
        }
    }

    pub fn all_nodes(&self) -> Vec<Node> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.leaves().iter().map(|leaf| leaf.nodes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Every leaf bucket in range order.
    pub fn leaves(&self) -> Vec<LeafSnapshot> {
        let mut leaves = Vec::new();
        let mut stack = vec![Arc::clone(&self.root)];

        while let Some(tree_node) = stack.pop() {
            let state = tree_node.state.read();
            match &*state {
                NodeState::Leaf(bucket) => leaves.push(LeafSnapshot {
                    range: tree_node.range,
                    nodes: bucket.nodes.values().cloned().collect(),
                }),
                NodeState::Interior { left, right } => {
                    stack.push(Arc::clone(right));
                    stack.push(Arc::clone(left));
                }
            }
        }

        leaves
    }

    /// Depth of the deepest bucket.
    pub fn depth(&self) -> usize {
        self.leaves()
            .iter()
            .map(|leaf| leaf.range.depth())
            .max()
            .unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a RoutingTable {
    type Item = Node;
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        self.iter()
    }
}

/// Iterator returned by [`RoutingTable::iter`].
pub struct Iter {
    stack: Vec<Arc<TreeNode>>,
    current: std::vec::IntoIter<Node>,
}

impl Iterator for Iter {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        loop {
            if let Some(node) = self.current.next() {
                return Some(node);
            }

            let tree_node = self.stack.pop()?;
            let state = tree_node.state.read();
            match &*state {
                NodeState::Leaf(bucket) => {
                    self.current = bucket.nodes.values().cloned().collect::<Vec<_>>().into_iter();
                }
                NodeState::Interior { left, right } => {
                    self.stack.push(Arc::clone(right));
                    self.stack.push(Arc::clone(left));
                }
            }
        }
    }
}

/// Unvisited subtree, ordered so the heap pops the smallest bound first.
struct Frontier {
    bound: NodeId,
    node: Arc<TreeNode>,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.bound == other.bound
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other.bound.cmp(&self.bound)
    }
}

/// Result entry, ordered by distance then id so the heap top is the worst.
struct Candidate {
    distance: NodeId,
    node: Node,
}

impl Candidate {
    fn key(&self) -> (NodeId, NodeId) {
        (self.distance, self.node.id)
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
