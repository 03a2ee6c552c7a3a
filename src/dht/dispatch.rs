//! Query handler table.
//!
//! A [`Dispatcher`] is built once at startup and maps KRPC method names to
//! handlers. Handlers receive the [`Router`] explicitly through
//! [`QueryContext`]; there is no global router.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{debug, error, trace};

use super::error::DhtError;
use super::message::{DhtMessage, DhtQuery, DhtResponse, MessageBody};
use super::node::{Node, NodeId};
use super::router::Router;
use crate::constants::{
    CLOSEST_NODES, KRPC_GENERIC_ERROR, KRPC_METHOD_UNKNOWN, KRPC_PROTOCOL_ERROR,
    KRPC_SERVER_ERROR,
};

/// Everything a query handler gets to see.
pub struct QueryContext<'a> {
    pub router: &'a Router,
    /// The querying contact: its claimed id at the source address.
    pub sender: Node,
    pub query: &'a DhtQuery,
}

pub type QueryHandler =
    Box<dyn Fn(&QueryContext<'_>) -> Result<DhtResponse, DhtError> + Send + Sync>;

pub struct Dispatcher {
    handlers: HashMap<String, QueryHandler>,
}

impl Dispatcher {
    /// A dispatcher with no handlers; every query gets "Method Unknown".
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// `ping`, `find_node`, `get_peers` and `announce_peer`.
    pub fn with_default_handlers() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register("ping", handle_ping);
        dispatcher.register("find_node", handle_find_node);
        dispatcher.register("get_peers", handle_get_peers);
        dispatcher.register("announce_peer", handle_announce_peer);
        dispatcher
    }

    /// Installs `handler` for `method`, replacing any previous one.
    pub fn register<F>(&mut self, method: &str, handler: F)
    where
        F: Fn(&QueryContext<'_>) -> Result<DhtResponse, DhtError> + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Box::new(handler));
    }

    pub fn handles(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Processes one inbound message and returns the reply to send, if any.
    ///
    /// The sender of every query or response is bumped in the routing table
    /// first. Responses and errors never produce a reply.
    pub fn dispatch(&self, router: &Router, msg: DhtMessage, from: SocketAddr) -> Option<DhtMessage> {
        let tid = msg.transaction_id;

        match msg.body {
            MessageBody::Query { sender, query } => {
                let sender = Node::new(sender, from);
                if let Err(e) = bump(router, sender.clone()) {
                    return Some(DhtMessage::error(tid, KRPC_SERVER_ERROR, e.to_string()));
                }

                let Some(handler) = self.handlers.get(query.name()) else {
                    debug!("Unknown method '{}' from {}", query.name(), from);
                    return Some(DhtMessage::error(tid, KRPC_METHOD_UNKNOWN, "Method Unknown"));
                };

                let ctx = QueryContext {
                    router,
                    sender,
                    query: &query,
                };
                let reply = match handler(&ctx) {
                    Ok(response) => DhtMessage::response(tid, response),
                    Err(e) => {
                        let (code, message) = krpc_error(&e);
                        debug!("Query '{}' from {} failed: {}", query.name(), from, e);
                        DhtMessage::error(tid, code, message)
                    }
                };
                Some(reply)
            }
            MessageBody::Response(response) => {
                // Contacts we were told about are only hearsay, so they never
                // refresh an entry we already have.
                let _ = bump(router, Node::new(response.id, from));
                for node in response.nodes.unwrap_or_default() {
                    if router.find_node(&node.id).is_none() {
                        let _ = bump(router, node);
                    }
                }
                None
            }
            MessageBody::Error { code, message } => {
                debug!("KRPC error {} from {}: {}", code, from, message);
                None
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}

/// Inserts a contact, treating a full bucket as a normal outcome.
fn bump(router: &Router, node: Node) -> Result<(), DhtError> {
    match router.insert_node(node) {
        Ok(_) => Ok(()),
        Err(e) if e.is_internal() => {
            error!("Routing table corrupted: {}", e);
            Err(e)
        }
        Err(e) => {
            trace!("Contact not stored: {}", e);
            Ok(())
        }
    }
}

fn krpc_error(e: &DhtError) -> (i64, String) {
    match e {
        DhtError::UnknownToken | DhtError::TokenMismatch => {
            (KRPC_PROTOCOL_ERROR, "Invalid token".to_string())
        }
        DhtError::InvalidMessage(_) | DhtError::InvalidLength(_) | DhtError::Bencode(_) => {
            (KRPC_PROTOCOL_ERROR, e.to_string())
        }
        e if e.is_internal() => (KRPC_SERVER_ERROR, "Server Error".to_string()),
        e => (KRPC_GENERIC_ERROR, e.to_string()),
    }
}

fn handle_ping(ctx: &QueryContext<'_>) -> Result<DhtResponse, DhtError> {
    Ok(DhtResponse::new(*ctx.router.our_id()))
}

fn handle_find_node(ctx: &QueryContext<'_>) -> Result<DhtResponse, DhtError> {
    let DhtQuery::FindNode { target } = ctx.query else {
        return Err(DhtError::InvalidMessage("expected find_node".into()));
    };

    let nodes = ctx.router.closest(target, CLOSEST_NODES);
    Ok(DhtResponse::new(*ctx.router.our_id()).with_nodes(nodes))
}

fn handle_get_peers(ctx: &QueryContext<'_>) -> Result<DhtResponse, DhtError> {
    let DhtQuery::GetPeers { info_hash } = ctx.query else {
        return Err(DhtError::InvalidMessage("expected get_peers".into()));
    };

    let token = ctx.router.obtain_token(&ctx.sender)?;
    let nodes = ctx.router.closest(&NodeId(*info_hash), CLOSEST_NODES);
    Ok(DhtResponse::new(*ctx.router.our_id())
        .with_token(token)
        .with_nodes(nodes))
}

fn handle_announce_peer(ctx: &QueryContext<'_>) -> Result<DhtResponse, DhtError> {
    let DhtQuery::AnnouncePeer {
        info_hash,
        port,
        token,
        implied_port,
    } = ctx.query
    else {
        return Err(DhtError::InvalidMessage("expected announce_peer".into()));
    };

    let peer_port = if *implied_port {
        ctx.sender.addr.port()
    } else {
        *port
    };
    let peer = SocketAddr::new(ctx.sender.addr.ip(), peer_port);

    ctx.router
        .accept_announce(token, &ctx.sender, *info_hash, peer)?;
    debug!("Accepted announce of {} from {}", peer, ctx.sender.id);

    Ok(DhtResponse::new(*ctx.router.our_id()))
}
