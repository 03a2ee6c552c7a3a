use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use super::config::DhtConfig;
use super::dispatch::Dispatcher;
use super::error::DhtError;
use super::message::DhtMessage;
use super::router::Router;
use crate::bencode::{decode, Value};
use crate::constants::{KRPC_PROTOCOL_ERROR, MAX_DATAGRAM};

/// UDP front end for a [`Router`].
///
/// The server answers incoming queries and feeds responses into the routing
/// table. It does not originate lookups and keeps no transaction state.
///
/// # Examples
///
/// ```no_run
/// use kadroute::dht::{DhtConfig, DhtServer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let server = DhtServer::bind(DhtConfig::default()).await?;
/// println!("listening on {}", server.local_addr()?);
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct DhtServer {
    socket: Arc<UdpSocket>,
    router: Arc<Router>,
    dispatcher: Arc<Dispatcher>,
    token_purge_interval: Duration,
}

impl DhtServer {
    pub async fn bind(config: DhtConfig) -> Result<Self, DhtError> {
        Self::with_dispatcher(config, Dispatcher::with_default_handlers()).await
    }

    pub async fn with_dispatcher(
        config: DhtConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, DhtError> {
        let router = Router::new(&config)?;
        let socket = UdpSocket::bind(config.bind_addr).await?;

        info!(
            "DHT server bound to {} with id {}",
            socket.local_addr()?,
            router.our_id()
        );

        Ok(Self {
            socket: Arc::new(socket),
            router: Arc::new(router),
            dispatcher: Arc::new(dispatcher),
            token_purge_interval: config.token_purge_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub async fn send(&self, msg: &DhtMessage, addr: SocketAddr) -> Result<(), DhtError> {
        self.socket.send_to(&msg.encode(), addr).await?;
        Ok(())
    }

    /// Serves until the socket fails.
    pub async fn run(&self) -> Result<(), DhtError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut purge_interval = tokio::time::interval(self.token_purge_interval);
        purge_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        purge_interval.tick().await;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    let (n, from) = result?;
                    if let Some(reply) = self.handle_datagram(&buf[..n], from) {
                        if let Err(e) = self.send(&reply, from).await {
                            warn!("Failed to reply to {}: {}", from, e);
                        }
                    }
                }
                _ = purge_interval.tick() => {
                    self.router.purge_expired_tokens();
                }
            }
        }
    }

    fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Option<DhtMessage> {
        match DhtMessage::parse(data) {
            Ok(msg) => {
                trace!("DHT message from {}: {:?}", from, msg.body);
                self.dispatcher.dispatch(&self.router, msg, from)
            }
            Err(e) => {
                debug!("Failed to parse DHT message from {}: {}", from, e);
                malformed_query_reply(data, &e)
            }
        }
    }
}

/// A protocol error reply for a query we could not parse, provided it was at
/// least a dictionary naming itself a query and carrying a transaction id.
fn malformed_query_reply(data: &[u8], e: &DhtError) -> Option<DhtMessage> {
    let value = decode(data).ok()?;
    if value.get(b"y").and_then(Value::as_str) != Some("q") {
        return None;
    }
    let tid = value.get(b"t").and_then(Value::as_bytes)?.clone();
    Some(DhtMessage::error(tid, KRPC_PROTOCOL_ERROR, e.to_string()))
}
