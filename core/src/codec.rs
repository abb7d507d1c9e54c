//! Deterministic encoder & hasher (component C1).
//!
//! Defines one canonical byte layout per hashable type so that every honest
//! replica produces byte-identical output for the same logical value:
//! unsigned integers are big-endian with leading zero bytes stripped,
//! byte strings and lists are length-prefixed, and lists recurse. The hash
//! of a value is the Keccak-256 digest of its canonical encoding.
//!
//! [`merkle_root`] computes the root of a binary hash tree over a sequence
//! `[v0, v1, …]`, each leaf keyed by the canonical encoding of its index and
//! valued by the canonical encoding of the item. The empty sequence hashes
//! to the fixed [`EMPTY_ROOT`] constant.

use crate::Hash;
use num_bigint::BigUint;
use sha3::{Digest, Keccak256};

/// A value with exactly one canonical byte encoding.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);
}

fn encode_len_prefixed(tag: u8, payload: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Byte-string tag: a raw, opaque octet sequence (addresses, hashes, data).
const TAG_BYTES: u8 = 0x00;
/// List tag: a recursively-encoded, ordered sequence of values.
const TAG_LIST: u8 = 0x01;
/// Unsigned-integer tag: big-endian, leading zero bytes stripped.
const TAG_UINT: u8 = 0x02;

impl Encode for [u8] {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_len_prefixed(TAG_BYTES, self, out);
    }
}

impl Encode for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out)
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out)
    }
}

macro_rules! impl_encode_uint {
    ($($t:ty),*) => {
        $(impl Encode for $t {
            fn encode(&self, out: &mut Vec<u8>) {
                let be = self.to_be_bytes();
                let stripped = match be.iter().position(|&b| b != 0) {
                    Some(i) => &be[i..],
                    None => &be[be.len() - 1..],
                };
                encode_len_prefixed(TAG_UINT, stripped, out);
            }
        })*
    };
}
impl_encode_uint!(u8, u16, u32, u64, u128);

impl Encode for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        (*self as u8).encode(out)
    }
}

impl Encode for BigUint {
    fn encode(&self, out: &mut Vec<u8>) {
        let be = self.to_bytes_be();
        let stripped: &[u8] = if be.iter().all(|&b| b == 0) { &[] } else { &be };
        encode_len_prefixed(TAG_UINT, stripped, out);
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Some(v) => v.encode(out),
            None => encode_len_prefixed(TAG_BYTES, &[], out),
        }
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        for item in self {
            item.encode(&mut payload);
        }
        encode_len_prefixed(TAG_LIST, &payload, out);
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out)
    }
}

impl Encode for str {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_bytes().encode(out)
    }
}

impl Encode for String {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_bytes().encode(out)
    }
}

/// A list of heterogeneous fields, encoded as a single canonical list. Used
/// by header/transaction encoding where fields have different types.
pub struct Fields<'a>(pub Vec<Box<dyn Fn(&mut Vec<u8>) + 'a>>);

/// Encodes `value` into its canonical byte representation.
pub fn encode_to_vec<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.encode(&mut out);
    out
}

/// Keccak-256 digest of arbitrary bytes.
pub fn keccak256(bytes: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Keccak-256 of `value`'s canonical encoding.
pub fn hash_encoded<T: Encode + ?Sized>(value: &T) -> Hash {
    keccak256(&encode_to_vec(value))
}

/// Fixed root for an empty sequence: the hash of the canonical encoding of
/// an empty list.
pub fn empty_root() -> Hash {
    let empty: Vec<u8> = Vec::new();
    hash_encoded(&empty.as_slice() as &[u8])
}

/// Root of the binary hash tree over `items`, each leaf keyed by the
/// canonical encoding of its index and valued by the canonical encoding of
/// the item itself. Returns [`empty_root`] for an empty sequence.
pub fn merkle_root<T: Encode>(items: &[T]) -> Hash {
    if items.is_empty() {
        return empty_root();
    }
    let mut level: Vec<Hash> = items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let mut leaf = Vec::new();
            (i as u64).encode(&mut leaf);
            v.encode(&mut leaf);
            keccak256(&leaf)
        })
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(&pair[0]);
            buf.extend_from_slice(pair.get(1).unwrap_or(&pair[0]));
            next.push(keccak256(&buf));
        }
        level = next;
    }
    level[0]
}
