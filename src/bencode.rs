//! Bencode encoding and decoding ([BEP-3]).
//!
//! KRPC messages are bencoded dictionaries. This module only implements what
//! the DHT needs: the four bencode types, a strict decoder and a canonical
//! encoder.
//!
//! ```
//! use kadroute::bencode::{decode, encode, Value};
//!
//! let value = decode(b"d1:t2:aa1:y1:qe").unwrap();
//! assert_eq!(value.get(b"y").and_then(Value::as_str), Some("q"));
//! assert_eq!(encode(&value), b"d1:t2:aa1:y1:qe");
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;

#[cfg(test)]
mod tests;
