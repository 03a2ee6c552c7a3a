use super::error::DhtError;
use crate::constants::{COMPACT_NODE_LEN, NODE_ID_BITS, NODE_ID_LEN};
use rand::Rng as _;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::BitXor;
use std::time::Instant;

/// A 160-bit node identifier.
///
/// Stored big-endian, so the derived `Ord` is the order of the identifiers
/// read as unsigned integers. XOR distances are themselves `NodeId`s and
/// compare the same way.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl NodeId {
    pub const MIN: NodeId = NodeId([0u8; NODE_ID_LEN]);
    pub const MAX: NodeId = NodeId([0xFF; NODE_ID_LEN]);

    pub fn generate() -> Self {
        let mut id = [0u8; NODE_ID_LEN];
        rand::rng().fill(&mut id);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        let id: [u8; NODE_ID_LEN] = bytes
            .try_into()
            .map_err(|_| DhtError::InvalidLength(bytes.len()))?;
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// The identifier as it appears on the wire.
    pub fn compact(&self) -> [u8; NODE_ID_LEN] {
        self.0
    }

    pub fn distance(&self, other: &NodeId) -> NodeId {
        *self ^ *other
    }

    /// Bit `i`, counted from the most significant bit.
    pub fn bit(&self, i: usize) -> bool {
        debug_assert!(i < NODE_ID_BITS);
        self.0[i / 8] & (0x80 >> (i % 8)) != 0
    }

    pub fn leading_zeros(&self) -> usize {
        self.0
            .iter()
            .position(|&b| b != 0)
            .map(|i| i * 8 + self.0[i].leading_zeros() as usize)
            .unwrap_or(NODE_ID_BITS)
    }

    pub(crate) fn with_bit(mut self, i: usize) -> Self {
        self.0[i / 8] |= 0x80 >> (i % 8);
        self
    }

    /// Keeps the `depth` most significant bits and clears the rest.
    pub(crate) fn truncate(mut self, depth: usize) -> Self {
        for (i, byte) in self.0.iter_mut().enumerate() {
            let kept = depth.saturating_sub(i * 8).min(8);
            *byte &= !(0xFFu8.checked_shr(kept as u32).unwrap_or(0));
        }
        self
    }

    /// Sets every bit below the `depth` most significant ones.
    pub(crate) fn fill_below(mut self, depth: usize) -> Self {
        for (i, byte) in self.0.iter_mut().enumerate() {
            let kept = depth.saturating_sub(i * 8).min(8);
            *byte |= 0xFFu8.checked_shr(kept as u32).unwrap_or(0);
        }
        self
    }
}

impl BitXor for NodeId {
    type Output = NodeId;

    fn bitxor(self, rhs: NodeId) -> NodeId {
        let mut out = [0u8; NODE_ID_LEN];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(rhs.0.iter())) {
            *o = a ^ b;
        }
        NodeId(out)
    }
}

impl TryFrom<&[u8]> for NodeId {
    type Error = DhtError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A contact in the routing table.
///
/// Two nodes are equal when their identifiers are equal; the address and
/// liveness timestamp do not take part in comparisons.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddr,
    pub last_seen: Instant,
}

impl Node {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Same identifier and same address.
    pub fn same_contact(&self, other: &Node) -> bool {
        self.id == other.id && self.addr == other.addr
    }

    pub fn from_compact(data: &[u8]) -> Option<Self> {
        if data.len() != COMPACT_NODE_LEN {
            return None;
        }

        let id = NodeId::from_bytes(&data[..NODE_ID_LEN]).ok()?;
        let ip = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let port = u16::from_be_bytes([data[24], data[25]]);

        Some(Self::new(id, SocketAddr::new(IpAddr::V4(ip), port)))
    }

    /// 26-byte compact contact. IPv6 contacts have no compact form.
    pub fn to_compact(&self) -> Option<[u8; COMPACT_NODE_LEN]> {
        let SocketAddr::V4(v4) = self.addr else {
            return None;
        };

        let mut compact = [0u8; COMPACT_NODE_LEN];
        compact[..NODE_ID_LEN].copy_from_slice(&self.id.0);
        compact[20..24].copy_from_slice(&v4.ip().octets());
        compact[24..26].copy_from_slice(&v4.port().to_be_bytes());
        Some(compact)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Concatenates the compact form of every IPv4 node; IPv6 nodes are skipped.
pub fn encode_compact_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Vec<u8> {
    nodes
        .into_iter()
        .filter_map(Node::to_compact)
        .flatten()
        .collect()
}

pub fn decode_compact_nodes(data: &[u8]) -> Result<Vec<Node>, DhtError> {
    if data.len() % COMPACT_NODE_LEN != 0 {
        return Err(DhtError::InvalidMessage(format!(
            "compact node list length {} is not a multiple of {}",
            data.len(),
            COMPACT_NODE_LEN
        )));
    }

    Ok(data
        .chunks_exact(COMPACT_NODE_LEN)
        .filter_map(Node::from_compact)
        .collect())
}
