//! Distributed Hash Table routing (BEP-5).
//!
//! The [`RoutingTable`] and [`TokenManager`] hold all shared state. A
//! [`Router`] owns one of each, a [`Dispatcher`] maps KRPC methods onto the
//! router, and [`DhtServer`] moves datagrams between a UDP socket and the
//! dispatcher.
//!
//! ```
//! use kadroute::dht::{Node, NodeId, RoutingTable};
//! use std::net::SocketAddr;
//!
//! let table = RoutingTable::new(NodeId::generate());
//! let addr: SocketAddr = "10.0.0.1:6881".parse().unwrap();
//! let peer = Node::new(NodeId([0x11; 20]), addr);
//!
//! table.insert(peer).unwrap();
//! let closest = table.closest(&NodeId([0x10; 20]), 8);
//! assert_eq!(closest.len(), 1);
//! ```

mod config;
mod dispatch;
mod error;
mod message;
mod node;
mod observer;
mod range;
mod router;
mod routing;
mod server;
mod token;

pub use config::DhtConfig;
pub use dispatch::{Dispatcher, QueryContext, QueryHandler};
pub use error::DhtError;
pub use message::{DhtMessage, DhtQuery, DhtResponse, MessageBody, TransactionId};
pub use node::{decode_compact_nodes, encode_compact_nodes, Node, NodeId};
pub use observer::{Announce, DhtObserver, SubscriptionId, Subscribers};
pub use range::BucketRange;
pub use router::Router;
pub use routing::{InsertOutcome, Iter, LeafSnapshot, RoutingTable};
pub use server::DhtServer;
pub use token::TokenManager;
