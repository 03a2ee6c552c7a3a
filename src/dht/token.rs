//! Announce tokens.
//!
//! A `get_peers` reply carries a token bound to the requesting contact; the
//! contact must present it again in `announce_peer`. Tokens are a fixed-width
//! big-endian counter. With a width of `w` bytes only `2^(8w)` tokens can be
//! live at once: when the counter wraps onto a value that has not been
//! released or purged yet, [`TokenManager::obtain`] fails with
//! [`DhtError::TokenSpaceExhausted`] instead of handing out a duplicate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng as _;
use tracing::{trace, warn};

use super::error::DhtError;
use super::node::Node;
use crate::constants::{DEFAULT_TOKEN_WIDTH, MAX_TOKEN_WIDTH};

struct IssuedToken {
    node: Node,
    issued_at: Instant,
}

pub struct TokenManager {
    width: usize,
    mask: u64,
    counter: AtomicU64,
    issued: DashMap<u64, IssuedToken>,
}

impl TokenManager {
    pub fn new(width: usize) -> Result<Self, DhtError> {
        if width == 0 || width > MAX_TOKEN_WIDTH {
            return Err(DhtError::InvalidTokenWidth(width));
        }
        Ok(Self::build(width))
    }

    fn build(width: usize) -> Self {
        let mask = u64::MAX >> (64 - 8 * width as u32);
        let start = rand::rng().random::<u64>() & mask;

        Self {
            width,
            mask,
            counter: AtomicU64::new(start),
            issued: DashMap::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of distinct tokens the configured width can express.
    pub fn capacity(&self) -> u128 {
        u128::from(self.mask) + 1
    }

    /// Number of live tokens.
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    pub fn obtain(&self, node: &Node) -> Result<Bytes, DhtError> {
        let value = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1) & self.mask;

        // The entry guard locks a shard; don't touch the map again while it is held.
        match self.issued.entry(value) {
            Entry::Occupied(_) => {
                warn!("Token counter wrapped onto live token {:#x}", value);
                Err(DhtError::TokenSpaceExhausted)
            }
            Entry::Vacant(slot) => {
                slot.insert(IssuedToken {
                    node: node.clone(),
                    issued_at: Instant::now(),
                });
                trace!("Issued token {:#x} to {}", value, node.id);
                Ok(self.encode(value))
            }
        }
    }

    /// Whether `token` was issued to `node` (same id and address).
    ///
    /// Does not consume the token.
    pub fn check(&self, token: &[u8], node: &Node) -> Result<bool, DhtError> {
        let value = self.decode(token)?;
        self.issued
            .get(&value)
            .map(|issued| issued.node.same_contact(node))
            .ok_or(DhtError::UnknownToken)
    }

    /// Like [`check`](Self::check), but a token issued to someone else is an
    /// error.
    pub fn verify(&self, token: &[u8], node: &Node) -> Result<(), DhtError> {
        if self.check(token, node)? {
            Ok(())
        } else {
            Err(DhtError::TokenMismatch)
        }
    }

    /// Invalidates a token and returns the contact it was issued to.
    pub fn release(&self, token: &[u8]) -> Result<Node, DhtError> {
        let value = self.decode(token)?;
        self.issued
            .remove(&value)
            .map(|(_, issued)| issued.node)
            .ok_or(DhtError::UnknownToken)
    }

    /// Drops tokens issued more than `max_age` ago. Returns how many were dropped.
    pub fn purge_expired(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        self.issued.retain(|_, issued| {
            let keep = issued.issued_at.elapsed() < max_age;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn encode(&self, value: u64) -> Bytes {
        let bytes = value.to_be_bytes();
        Bytes::copy_from_slice(&bytes[bytes.len() - self.width..])
    }

    fn decode(&self, token: &[u8]) -> Result<u64, DhtError> {
        if token.len() != self.width {
            return Err(DhtError::UnknownToken);
        }
        Ok(token.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::build(DEFAULT_TOKEN_WIDTH)
    }
}
