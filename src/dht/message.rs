//! KRPC messages (BEP-5).
//!
//! Parsing validates every field the DHT relies on: a query without `id`, a
//! `find_node` without `target` or an `announce_peer` without `token` is
//! rejected with [`DhtError::InvalidMessage`] before any handler runs.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::DhtError;
use super::node::{decode_compact_nodes, encode_compact_nodes, Node, NodeId};
use crate::bencode::{decode, encode, Value};

pub type TransactionId = Bytes;

type Dict = BTreeMap<Bytes, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum DhtQuery {
    Ping,
    FindNode {
        target: NodeId,
    },
    GetPeers {
        info_hash: [u8; 20],
    },
    AnnouncePeer {
        info_hash: [u8; 20],
        port: u16,
        token: Bytes,
        implied_port: bool,
    },
    /// A method we do not implement; the arguments are kept as received.
    Other {
        name: String,
        args: Dict,
    },
}

impl DhtQuery {
    pub fn name(&self) -> &str {
        match self {
            DhtQuery::Ping => "ping",
            DhtQuery::FindNode { .. } => "find_node",
            DhtQuery::GetPeers { .. } => "get_peers",
            DhtQuery::AnnouncePeer { .. } => "announce_peer",
            DhtQuery::Other { name, .. } => name.as_str(),
        }
    }
}

/// The `r` dictionary of a reply. Which keys are present depends on the query
/// being answered, which only the sender of that query knows.
#[derive(Debug, Clone, PartialEq)]
pub struct DhtResponse {
    pub id: NodeId,
    pub nodes: Option<Vec<Node>>,
    pub token: Option<Bytes>,
}

impl DhtResponse {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            nodes: None,
            token: None,
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn with_token(mut self, token: Bytes) -> Self {
        self.token = Some(token);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Query { sender: NodeId, query: DhtQuery },
    Response(DhtResponse),
    Error { code: i64, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DhtMessage {
    pub transaction_id: TransactionId,
    pub body: MessageBody,
}

impl DhtMessage {
    pub fn query(transaction_id: TransactionId, sender: NodeId, query: DhtQuery) -> Self {
        Self {
            transaction_id,
            body: MessageBody::Query { sender, query },
        }
    }

    pub fn response(transaction_id: TransactionId, response: DhtResponse) -> Self {
        Self {
            transaction_id,
            body: MessageBody::Response(response),
        }
    }

    pub fn error(transaction_id: TransactionId, code: i64, message: impl Into<String>) -> Self {
        Self {
            transaction_id,
            body: MessageBody::Error {
                code,
                message: message.into(),
            },
        }
    }

    /// Id of the contact that sent this message, if the message carries one.
    pub fn sender_id(&self) -> Option<NodeId> {
        match &self.body {
            MessageBody::Query { sender, .. } => Some(*sender),
            MessageBody::Response(response) => Some(response.id),
            MessageBody::Error { .. } => None,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, DhtError> {
        let value = decode(data)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| DhtError::InvalidMessage("expected dict".into()))?;

        let transaction_id = required_bytes(dict, "t")?.clone();
        let msg_type = required(dict, "y")?
            .as_str()
            .ok_or_else(|| invalid("y", "string"))?;

        let body = match msg_type {
            "q" => parse_query(dict)?,
            "r" => MessageBody::Response(parse_response(required_dict(dict, "r")?)?),
            "e" => parse_error(dict)?,
            other => {
                return Err(DhtError::InvalidMessage(format!(
                    "unknown message type: {}",
                    other
                )))
            }
        };

        Ok(Self {
            transaction_id,
            body,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dict = Dict::new();
        dict.insert(key("t"), Value::Bytes(self.transaction_id.clone()));

        match &self.body {
            MessageBody::Query { sender, query } => {
                dict.insert(key("y"), Value::string("q"));
                dict.insert(key("q"), Value::string(query.name()));
                dict.insert(key("a"), Value::Dict(encode_args(sender, query)));
            }
            MessageBody::Response(response) => {
                let mut r = Dict::new();
                r.insert(key("id"), Value::bytes(response.id.as_bytes()));
                if let Some(nodes) = &response.nodes {
                    r.insert(key("nodes"), Value::Bytes(encode_compact_nodes(nodes).into()));
                }
                if let Some(token) = &response.token {
                    r.insert(key("token"), Value::Bytes(token.clone()));
                }
                dict.insert(key("y"), Value::string("r"));
                dict.insert(key("r"), Value::Dict(r));
            }
            MessageBody::Error { code, message } => {
                dict.insert(key("y"), Value::string("e"));
                dict.insert(
                    key("e"),
                    Value::List(vec![Value::Integer(*code), Value::string(message)]),
                );
            }
        }

        encode(&Value::Dict(dict))
    }
}

fn parse_query(dict: &Dict) -> Result<MessageBody, DhtError> {
    let name = required(dict, "q")?
        .as_str()
        .ok_or_else(|| invalid("q", "string"))?;
    let args = required_dict(dict, "a")?;
    let sender = required_id(args, "id")?;

    let query = match name {
        "ping" => DhtQuery::Ping,
        "find_node" => DhtQuery::FindNode {
            target: required_id(args, "target")?,
        },
        "get_peers" => DhtQuery::GetPeers {
            info_hash: required_hash(args, "info_hash")?,
        },
        "announce_peer" => {
            let port = required(args, "port")?
                .as_integer()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| invalid("port", "integer in 0..=65535"))?;
            let implied_port = args
                .get(b"implied_port".as_slice())
                .and_then(Value::as_integer)
                .is_some_and(|v| v != 0);

            DhtQuery::AnnouncePeer {
                info_hash: required_hash(args, "info_hash")?,
                port,
                token: required_bytes(args, "token")?.clone(),
                implied_port,
            }
        }
        other => DhtQuery::Other {
            name: other.to_string(),
            args: args.clone(),
        },
    };

    Ok(MessageBody::Query { sender, query })
}

fn parse_response(r: &Dict) -> Result<DhtResponse, DhtError> {
    let id = required_id(r, "id")?;

    let nodes = match r.get(b"nodes".as_slice()) {
        Some(value) => {
            let data = value.as_bytes().ok_or_else(|| invalid("nodes", "string"))?;
            Some(decode_compact_nodes(data)?)
        }
        None => None,
    };

    let token = match r.get(b"token".as_slice()) {
        Some(value) => Some(value.as_bytes().ok_or_else(|| invalid("token", "string"))?.clone()),
        None => None,
    };

    Ok(DhtResponse { id, nodes, token })
}

fn parse_error(dict: &Dict) -> Result<MessageBody, DhtError> {
    let list = required(dict, "e")?
        .as_list()
        .ok_or_else(|| invalid("e", "list"))?;

    let code = list
        .first()
        .and_then(Value::as_integer)
        .ok_or_else(|| invalid("e", "[code, message]"))?;
    let message = list
        .get(1)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(MessageBody::Error { code, message })
}

fn encode_args(sender: &NodeId, query: &DhtQuery) -> Dict {
    let mut args = match query {
        DhtQuery::Other { args, .. } => args.clone(),
        _ => Dict::new(),
    };
    args.insert(key("id"), Value::bytes(sender.as_bytes()));

    match query {
        DhtQuery::Ping | DhtQuery::Other { .. } => {}
        DhtQuery::FindNode { target } => {
            args.insert(key("target"), Value::bytes(target.as_bytes()));
        }
        DhtQuery::GetPeers { info_hash } => {
            args.insert(key("info_hash"), Value::bytes(info_hash));
        }
        DhtQuery::AnnouncePeer {
            info_hash,
            port,
            token,
            implied_port,
        } => {
            args.insert(key("info_hash"), Value::bytes(info_hash));
            args.insert(key("port"), Value::Integer(i64::from(*port)));
            args.insert(key("token"), Value::Bytes(token.clone()));
            if *implied_port {
                args.insert(key("implied_port"), Value::Integer(1));
            }
        }
    }

    args
}

fn key(k: &'static str) -> Bytes {
    Bytes::from_static(k.as_bytes())
}

fn invalid(field: &str, expected: &str) -> DhtError {
    DhtError::InvalidMessage(format!("field '{}' must be a {}", field, expected))
}

fn required<'a>(dict: &'a Dict, field: &str) -> Result<&'a Value, DhtError> {
    dict.get(field.as_bytes())
        .ok_or_else(|| DhtError::InvalidMessage(format!("missing field '{}'", field)))
}

fn required_bytes<'a>(dict: &'a Dict, field: &str) -> Result<&'a Bytes, DhtError> {
    required(dict, field)?
        .as_bytes()
        .ok_or_else(|| invalid(field, "string"))
}

fn required_dict<'a>(dict: &'a Dict, field: &str) -> Result<&'a Dict, DhtError> {
    required(dict, field)?
        .as_dict()
        .ok_or_else(|| invalid(field, "dict"))
}

fn required_id(dict: &Dict, field: &str) -> Result<NodeId, DhtError> {
    NodeId::from_bytes(required_bytes(dict, field)?)
        .map_err(|_| invalid(field, "20-byte string"))
}

fn required_hash(dict: &Dict, field: &str) -> Result<[u8; 20], DhtError> {
    required_id(dict, field).map(|id| id.0)
}
