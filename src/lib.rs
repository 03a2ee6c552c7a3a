//! kadroute - Kademlia routing for BitTorrent DHT nodes
//!
//! This library provides the routing core of a [BEP-5] DHT node: a
//! self-splitting bucket tree over the 160-bit identifier space, the token
//! scheme that authorizes `announce_peer`, and the KRPC glue needed to serve
//! them over UDP.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`dht`] - Routing tree, tokens, router, KRPC messages and server
//! - [`constants`] - Protocol constants and defaults
//!
//! [BEP-5]: http://bittorrent.org/beps/bep_0005.html

pub mod bencode;
pub mod constants;
pub mod dht;

pub use bencode::{decode, encode, BencodeError, Value};
pub use dht::{
    DhtConfig, DhtError, DhtMessage, DhtServer, Dispatcher, Node, NodeId, Router, RoutingTable,
    TokenManager,
};
