use bytes::Bytes;

use super::*;

#[test]
fn test_decode_scalars() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-7e").unwrap(), Value::Integer(-7));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
    assert_eq!(
        decode(b"4:spam").unwrap(),
        Value::Bytes(Bytes::from_static(b"spam"))
    );
    assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Bytes::new()));
}

#[test]
fn test_decode_rejects_non_canonical_integers() {
    assert!(matches!(decode(b"i-0e"), Err(BencodeError::InvalidInteger(0))));
    assert!(matches!(decode(b"i03e"), Err(BencodeError::InvalidInteger(0))));
    assert!(matches!(decode(b"ie"), Err(BencodeError::InvalidInteger(0))));
    assert!(matches!(decode(b"i-e"), Err(BencodeError::InvalidInteger(0))));
    assert!(matches!(decode(b"i+5e"), Err(BencodeError::InvalidInteger(0))));
    assert!(matches!(decode(b"li1ei+0ee"), Err(BencodeError::InvalidInteger(4))));
    assert!(matches!(decode(b"i12"), Err(BencodeError::UnexpectedEof(_))));
}

#[test]
fn test_decode_krpc_query() {
    let value = decode(b"d1:ad2:id20:abcdefghij0123456789e1:q4:ping1:t2:aa1:y1:qe").unwrap();

    assert_eq!(value.get(b"q").and_then(Value::as_str), Some("ping"));
    assert_eq!(value.get(b"t").and_then(Value::as_str), Some("aa"));
    let id = value
        .get(b"a")
        .and_then(|a| a.get(b"id"))
        .and_then(Value::as_bytes)
        .unwrap();
    assert_eq!(id.as_ref(), b"abcdefghij0123456789");
}

#[test]
fn test_decode_errors() {
    assert!(matches!(decode(b""), Err(BencodeError::UnexpectedEof(0))));
    assert!(matches!(decode(b"5:abc"), Err(BencodeError::UnexpectedEof(_))));
    assert!(matches!(decode(b"i1ei2e"), Err(BencodeError::TrailingData)));
    assert!(matches!(decode(b"li1e"), Err(BencodeError::UnexpectedEof(_))));
    assert!(matches!(decode(b"di1ei2ee"), Err(BencodeError::NonStringKey(1))));
    assert!(matches!(
        decode(b"x"),
        Err(BencodeError::UnexpectedByte { byte: b'x', offset: 0 })
    ));
}

#[test]
fn test_decode_nesting_limit() {
    let mut deep = vec![b'l'; 40];
    deep.extend(vec![b'e'; 40]);
    assert!(matches!(decode(&deep), Err(BencodeError::NestingTooDeep)));
}

#[test]
fn test_encode_sorts_dict_keys() {
    let mut dict = std::collections::BTreeMap::new();
    dict.insert(Bytes::from_static(b"y"), Value::string("r"));
    dict.insert(Bytes::from_static(b"t"), Value::string("aa"));
    dict.insert(Bytes::from_static(b"r"), Value::List(vec![Value::Integer(1)]));

    assert_eq!(encode(&Value::Dict(dict)), b"d1:rli1ee1:t2:aa1:y1:re");
}
