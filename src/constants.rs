//! Protocol constants and tuning parameters.
//!
//! Defaults for the routing tree, the token manager and the KRPC server loop.
//! Everything here can be overridden through [`DhtConfig`](crate::dht::DhtConfig).

use std::time::Duration;

// ============================================================================
// Identifiers
// ============================================================================

/// Length of a node identifier in bytes (160 bits).
pub const NODE_ID_LEN: usize = 20;

/// Number of bits in a node identifier.
pub const NODE_ID_BITS: usize = NODE_ID_LEN * 8;

/// Length of a compact node contact: 20-byte id, 4-byte IPv4, 2-byte port.
pub const COMPACT_NODE_LEN: usize = NODE_ID_LEN + 6;

// ============================================================================
// Routing tree
// ============================================================================

/// Bucket capacity (Kademlia `k`).
pub const K: usize = 8;

/// Deepest level a bucket may be split to. A leaf at depth 160 covers a
/// single identifier, so splitting past it is never useful.
pub const MAX_TREE_DEPTH: usize = NODE_ID_BITS;

/// Number of contacts returned in a `find_node` / `get_peers` reply.
pub const CLOSEST_NODES: usize = K;

// ============================================================================
// Tokens
// ============================================================================

/// Default token width in bytes. Two bytes allow 65536 live tokens before the
/// counter wraps onto a value that may still be in use.
pub const DEFAULT_TOKEN_WIDTH: usize = 2;

/// Widest supported token, limited by the `u64` counter.
pub const MAX_TOKEN_WIDTH: usize = 8;

/// How long an issued token stays valid if it is never released.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// How often the server loop drops expired tokens.
pub const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Network
// ============================================================================

/// Default DHT listen port.
pub const DEFAULT_PORT: u16 = 6881;

/// Maximum UDP datagram we accept.
pub const MAX_DATAGRAM: usize = 65535;

// ============================================================================
// KRPC error codes (BEP-5)
// ============================================================================

/// Generic error.
pub const KRPC_GENERIC_ERROR: i64 = 201;

/// Server error.
pub const KRPC_SERVER_ERROR: i64 = 202;

/// Protocol error: malformed packet, invalid arguments or bad token.
pub const KRPC_PROTOCOL_ERROR: i64 = 203;

/// Method unknown.
pub const KRPC_METHOD_UNKNOWN: i64 = 204;
