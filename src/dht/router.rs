use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use super::config::DhtConfig;
use super::error::DhtError;
use super::node::{Node, NodeId};
use super::observer::{Announce, Subscribers};
use super::routing::{InsertOutcome, Iter, RoutingTable};
use super::token::TokenManager;
use crate::constants::TOKEN_LIFETIME;

/// Owns the routing table and the token manager of one DHT node.
///
/// The router knows nothing about the wire format; the
/// [`Dispatcher`](super::Dispatcher) turns decoded messages into calls on it.
/// All methods take `&self` and are safe to call from several threads.
pub struct Router {
    our_id: NodeId,
    routing_table: RoutingTable,
    tokens: TokenManager,
    token_lifetime: Duration,
    subscribers: Subscribers,
}

impl Router {
    pub fn new(config: &DhtConfig) -> Result<Self, DhtError> {
        let our_id = config.node_id.unwrap_or_else(NodeId::generate);
        let routing_table = RoutingTable::with_limits(our_id, config.bucket_size, config.max_depth);
        let tokens = TokenManager::new(config.token_width)?;

        info!(
            "DHT router {} (bucket size {}, max depth {}, {}-byte tokens)",
            our_id,
            routing_table.bucket_size(),
            routing_table.max_depth(),
            tokens.width()
        );

        Ok(Self {
            our_id,
            routing_table,
            tokens,
            token_lifetime: config.token_lifetime,
            subscribers: Subscribers::new(),
        })
    }

    /// A router with default limits and the given id.
    pub fn with_id(our_id: NodeId) -> Self {
        Self {
            our_id,
            routing_table: RoutingTable::new(our_id),
            tokens: TokenManager::default(),
            token_lifetime: TOKEN_LIFETIME,
            subscribers: Subscribers::new(),
        }
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    /// Inserts or refreshes the contact that sent us a message.
    ///
    /// A known id keeps its stored address whatever address this message
    /// came from.
    pub fn bump_node(&self, raw_id: &[u8], addr: SocketAddr) -> Result<InsertOutcome, DhtError> {
        let id = NodeId::from_bytes(raw_id)?;
        self.insert_node(Node::new(id, addr))
    }

    pub fn insert_node(&self, node: Node) -> Result<InsertOutcome, DhtError> {
        let outcome = self.routing_table.insert(node.clone())?;
        match outcome {
            InsertOutcome::Added => self.subscribers.notify(|o| o.node_added(&node)),
            InsertOutcome::Updated => {
                let stored = self.routing_table.find(&node.id).unwrap_or(node);
                self.subscribers.notify(|o| o.node_updated(&stored));
            }
        }
        Ok(outcome)
    }

    /// Moves a known contact to `addr`. Returns `false` if the id is unknown.
    pub fn set_node_addr(&self, id: &NodeId, addr: SocketAddr) -> bool {
        self.routing_table.set_addr(id, addr)
    }

    pub fn find_node(&self, id: &NodeId) -> Option<Node> {
        self.routing_table.find(id)
    }

    pub fn closest(&self, target: &NodeId, k: usize) -> Vec<Node> {
        self.routing_table.closest(target, k)
    }

    pub fn all_nodes(&self) -> Iter {
        self.routing_table.iter()
    }

    pub fn obtain_token(&self, node: &Node) -> Result<Bytes, DhtError> {
        self.tokens.obtain(node)
    }

    pub fn check_token(&self, token: &[u8], node: &Node) -> Result<bool, DhtError> {
        self.tokens.check(token, node)
    }

    pub fn verify_token(&self, token: &[u8], node: &Node) -> Result<(), DhtError> {
        self.tokens.verify(token, node)
    }

    pub fn release_token(&self, token: &[u8]) -> Result<Node, DhtError> {
        self.tokens.release(token)
    }

    /// Validates and consumes an announce token, then notifies observers.
    ///
    /// A token presented by the wrong contact is left in place so the
    /// legitimate holder can still use it.
    pub fn accept_announce(
        &self,
        token: &[u8],
        node: &Node,
        info_hash: [u8; 20],
        peer: SocketAddr,
    ) -> Result<(), DhtError> {
        self.tokens.verify(token, node)?;
        self.tokens.release(token)?;

        let announce = Announce {
            info_hash,
            node_id: node.id,
            peer,
        };
        self.subscribers.notify(|o| o.announce_accepted(&announce));
        Ok(())
    }

    pub fn purge_expired_tokens(&self) -> usize {
        let purged = self.tokens.purge_expired(self.token_lifetime);
        if purged > 0 {
            debug!("Purged {} expired tokens", purged);
        }
        purged
    }
}
