//! Canonical encoding of a `(namespace, key, value)` triple.
//!
//! Every field is length-prefixed so that no two distinct triples (in particular, triples in
//! different namespaces) share an encoding:
//!
//! ```text
//! +--------+-----------+---------+-----+-----------+-------+
//! | ns_len | namespace | key_len | key | value_len | value |
//! +--------+-----------+---------+-----+-----------+-------+
//! | u16 LE |  ns_len   | u32 LE  |     |  u32 LE   |       |
//! +--------+-----------+---------+-----+-----------+-------+
//! ```
//!
//! A triple with an empty key or an empty value has no encoding (and contributes nothing
//! to the accumulator).

use bytes::BufMut;

/// Length of the encoding of a triple with the given field lengths.
pub const fn encoded_len(namespace: usize, key: usize, value: usize) -> usize {
    2 + namespace + 4 + key + 4 + value
}

/// Append the encoding of `(namespace, key, value)` to `buf`.
///
/// Returns `false` (and leaves `buf` untouched) if `key` or `value` is empty.
///
/// # Panics
///
/// Panics if `namespace` is longer than `u16::MAX` bytes or `key`/`value` is longer
/// than `u32::MAX` bytes.
pub fn serialize_into(buf: &mut Vec<u8>, namespace: &[u8], key: &[u8], value: &[u8]) -> bool {
    if key.is_empty() || value.is_empty() {
        return false;
    }
    let Ok(namespace_len) = u16::try_from(namespace.len()) else {
        panic!("namespace length overflow: {}", namespace.len());
    };
    let Ok(key_len) = u32::try_from(key.len()) else {
        panic!("key length overflow: {}", key.len());
    };
    let Ok(value_len) = u32::try_from(value.len()) else {
        panic!("value length overflow: {}", value.len());
    };

    buf.reserve(encoded_len(namespace.len(), key.len(), value.len()));
    buf.put_u16_le(namespace_len);
    buf.put_slice(namespace);
    buf.put_u32_le(key_len);
    buf.put_slice(key);
    buf.put_u32_le(value_len);
    buf.put_slice(value);
    true
}

/// Encode `(namespace, key, value)`, or `None` if `key` or `value` is empty.
///
/// # Panics
///
/// See [serialize_into].
pub fn serialize(namespace: &[u8], key: &[u8], value: &[u8]) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    serialize_into(&mut buf, namespace, key, value).then_some(buf)
}
