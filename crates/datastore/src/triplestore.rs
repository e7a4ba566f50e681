// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The triple-to-key codec.
//!
//! A subject and predicate combine into one ordered byte key:
//!
//! `subject ‖ predicate ‖ 0xFF ‖ subject_len ‖ predicate_len ‖ subject_type ‖ predicate_type`
//!
//! with the lengths as little-endian u64. The sentinel terminates the key so
//! that one subject+predicate concatenation that is a prefix of another still
//! decodes unambiguously; the fixed-width trailer makes decoding from the
//! back possible without a scan.

use std::mem::size_of;

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::const_assert_eq;

use tristore_types::{Blob, DataType};

pub const SENTINEL: u8 = 0xFF;

/// Subject reserved for persisted histograms; not available to callers.
pub const HISTOGRAM_SUBJECT: &[u8] = b"HISTOGRAM";

/// sentinel + two u64 lengths + two type bytes
pub const KEY_TRAILER_LENGTH: usize = 1 + 2 * size_of::<u64>() + 2;
const_assert_eq!(KEY_TRAILER_LENGTH, 19);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("key of {len} bytes cannot hold the {KEY_TRAILER_LENGTH}-byte trailer")]
    Truncated { len: usize },
    #[error("expected 0xFF sentinel at offset {offset}")]
    BadSentinel { offset: usize },
}

/// Combines a subject and a predicate into a key.
pub fn sp_to_key(subject: &Blob, predicate: &Blob) -> Bytes {
    let mut key =
        BytesMut::with_capacity(subject.len() + predicate.len() + KEY_TRAILER_LENGTH);
    key.put_slice(subject.data());
    key.put_slice(predicate.data());
    key.put_u8(SENTINEL);
    key.put_u64_le(subject.len() as u64);
    key.put_u64_le(predicate.len() as u64);
    key.put_u8(subject.data_type().as_u8());
    key.put_u8(predicate.data_type().as_u8());
    key.freeze()
}

/// Splits a key back into its subject and predicate.
///
/// With `copy` the returned blobs own fresh storage; without it they are
/// views into `key`'s buffer (subject at the base, predicate right after).
pub fn key_to_sp(key: &Bytes, copy: bool) -> Result<(Blob, Blob), CodecError> {
    let len = key.len();
    if len < KEY_TRAILER_LENGTH {
        return Err(CodecError::Truncated { len });
    }

    let predicate_type = DataType::from_u8_lossy(key[len - 1]);
    let subject_type = DataType::from_u8_lossy(key[len - 2]);
    let predicate_len = read_u64_le(&key[len - 10..len - 2]) as usize;
    let subject_len = read_u64_le(&key[len - 18..len - 10]) as usize;

    if subject_len + predicate_len + KEY_TRAILER_LENGTH != len {
        return Err(CodecError::Truncated { len });
    }
    let sentinel_offset = subject_len + predicate_len;
    if key[sentinel_offset] != SENTINEL {
        return Err(CodecError::BadSentinel {
            offset: sentinel_offset,
        });
    }

    let subject = if copy {
        Blob::copy_from(&key[..subject_len], subject_type)
    } else {
        Blob::new(key.slice(..subject_len), subject_type)
    };
    let predicate = if copy {
        Blob::copy_from(&key[subject_len..sentinel_offset], predicate_type)
    } else {
        Blob::new(key.slice(subject_len..sentinel_offset), predicate_type)
    };

    Ok((subject, predicate))
}

/// The seek prefix shared by every key with this subject and predicate.
pub fn scan_prefix(subject: &[u8], predicate: &[u8]) -> Bytes {
    let mut prefix = BytesMut::with_capacity(subject.len() + predicate.len() + 1);
    prefix.put_slice(subject);
    prefix.put_slice(predicate);
    prefix.put_u8(SENTINEL);
    prefix.freeze()
}

/// Forms the stored value: object bytes followed by the object type byte.
pub fn append_type(object: &[u8], data_type: DataType) -> Bytes {
    let mut value = BytesMut::with_capacity(object.len() + 1);
    value.put_slice(object);
    value.put_u8(data_type.as_u8());
    value.freeze()
}

/// Inverse of [`append_type`]: strips the trailing type byte and reports the
/// stored (discovered) type.
pub fn strip_type(value: &[u8]) -> Result<(Bytes, DataType), CodecError> {
    let Some((type_byte, object)) = value.split_last() else {
        return Err(CodecError::Truncated { len: 0 });
    };
    Ok((
        Bytes::copy_from_slice(object),
        DataType::from_u8_lossy(*type_byte),
    ))
}

fn read_u64_le(raw: &[u8]) -> u64 {
    u64::from_le_bytes(raw.try_into().expect("8-byte slice"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(data: &'static str) -> Blob {
        Blob::from(data)
    }

    #[test]
    fn round_trip_copy() {
        let subject = blob("sub0");
        let predicate = blob("pred0");
        let key = sp_to_key(&subject, &predicate);
        assert_eq!(key.len(), 4 + 5 + KEY_TRAILER_LENGTH);

        let (sub, pred) = key_to_sp(&key, true).unwrap();
        assert_eq!(sub, subject);
        assert_eq!(pred, predicate);
        assert_ne!(sub.as_ptr(), key.as_ptr());
    }

    #[test]
    fn round_trip_reference_points_into_key() {
        let subject = blob("sub0");
        let predicate = blob("pred0");
        let key = sp_to_key(&subject, &predicate);

        let (sub, pred) = key_to_sp(&key, false).unwrap();
        assert_eq!(sub, subject);
        assert_eq!(pred, predicate);
        assert_eq!(sub.as_ptr(), key.as_ptr());
        assert_eq!(pred.as_ptr() as usize, key.as_ptr() as usize + sub.len());
    }

    #[test]
    fn prefix_subject_predicate_pairs_stay_distinct() {
        // "ab" + "c" and "a" + "bc" share the byte prefix but not the key
        let key_a = sp_to_key(&blob("ab"), &blob("c"));
        let key_b = sp_to_key(&blob("a"), &blob("bc"));
        assert_ne!(key_a, key_b);

        let (sub_a, _) = key_to_sp(&key_a, true).unwrap();
        let (sub_b, _) = key_to_sp(&key_b, true).unwrap();
        assert_eq!(sub_a.data(), b"ab");
        assert_eq!(sub_b.data(), b"a");
    }

    #[test]
    fn truncated_key_is_rejected() {
        assert_eq!(
            key_to_sp(&Bytes::from_static(b"short"), true),
            Err(CodecError::Truncated { len: 5 })
        );
    }

    #[test]
    fn missing_sentinel_is_rejected() {
        let key = sp_to_key(&blob("sub"), &blob("pred"));
        let mut corrupted = key.to_vec();
        corrupted[7] = 0x00; // the sentinel position for 3+4 byte parts
        assert_eq!(
            key_to_sp(&Bytes::from(corrupted), true),
            Err(CodecError::BadSentinel { offset: 7 })
        );
    }

    #[test]
    fn type_append_strip_are_inverses() {
        let value = append_type(b"object0", DataType::Float64);
        let (object, discovered) = strip_type(&value).unwrap();
        assert_eq!(object.as_ref(), b"object0");
        assert_eq!(discovered, DataType::Float64);

        assert!(strip_type(b"").is_err());
    }

    #[test]
    fn keys_order_by_subject_then_predicate() {
        let keys = [
            sp_to_key(&blob("sub0"), &blob("pred0")),
            sp_to_key(&blob("sub0"), &blob("pred1")),
            sp_to_key(&blob("sub1"), &blob("pred0")),
        ];
        let mut sorted = keys.to_vec();
        sorted.sort();
        assert_eq!(sorted, keys);
    }
}
