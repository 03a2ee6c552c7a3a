use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::node::NodeId;
use crate::constants::{
    DEFAULT_PORT, DEFAULT_TOKEN_WIDTH, K, MAX_TREE_DEPTH, TOKEN_LIFETIME, TOKEN_PURGE_INTERVAL,
};

/// Settings for a [`Router`](super::Router) and its [`DhtServer`](super::DhtServer).
///
/// ```
/// use kadroute::dht::DhtConfig;
/// use std::time::Duration;
///
/// let config = DhtConfig::default()
///     .with_port(0)
///     .with_token_width(4)
///     .with_token_lifetime(Duration::from_secs(300));
/// assert_eq!(config.bucket_size, 8);
/// ```
#[derive(Debug, Clone)]
pub struct DhtConfig {
    pub bind_addr: SocketAddr,
    /// Our node id; a random one is generated when `None`.
    pub node_id: Option<NodeId>,
    pub bucket_size: usize,
    pub max_depth: usize,
    pub token_width: usize,
    pub token_lifetime: Duration,
    pub token_purge_interval: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            node_id: None,
            bucket_size: K,
            max_depth: MAX_TREE_DEPTH,
            token_width: DEFAULT_TOKEN_WIDTH,
            token_lifetime: TOKEN_LIFETIME,
            token_purge_interval: TOKEN_PURGE_INTERVAL,
        }
    }
}

impl DhtConfig {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn with_node_id(mut self, id: NodeId) -> Self {
        self.node_id = Some(id);
        self
    }

    pub fn with_bucket_size(mut self, size: usize) -> Self {
        self.bucket_size = size;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_token_width(mut self, width: usize) -> Self {
        self.token_width = width;
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_token_purge_interval(mut self, interval: Duration) -> Self {
        self.token_purge_interval = interval;
        self
    }
}
