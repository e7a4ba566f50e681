// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Type-specific encode/decode callbacks applied on the way into and out of
//! an engine.
//!
//! The only built-in transform is the order-preserving float encoding: IEEE
//! floats do not sort bytewise (negatives sort after positives, and negative
//! magnitudes sort backwards), so FLOAT32/FLOAT64 values are mapped onto
//! big-endian unsigned keys whose lexicographic order equals numeric order.

use bytes::Bytes;

use tristore_types::{Blob, DataType};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("{data_type:?} value must be {expected} bytes, found {found}")]
    BadWidth {
        data_type: DataType,
        expected: usize,
        found: usize,
    },
}

/// Per-type transform callbacks owned by a datastore.
#[derive(Debug, Clone, Copy)]
pub struct Callbacks {
    /// Store floats in their order-preserving encoding.
    pub ordered_floats: bool,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            ordered_floats: true,
        }
    }
}

impl Callbacks {
    /// Identity transforms only.
    pub fn passthrough() -> Self {
        Self {
            ordered_floats: false,
        }
    }

    /// Encodes a blob's bytes for storage. Identity for non-float types
    /// (zero-copy, the returned buffer shares the blob's storage).
    pub fn encode(&self, blob: &Blob) -> Result<Bytes, TransformError> {
        match blob.data_type() {
            DataType::Float32 if self.ordered_floats => {
                let raw = fixed::<4>(blob.data(), blob.data_type())?;
                Ok(Bytes::copy_from_slice(&order_encode_f32(f32::from_le_bytes(raw))))
            }
            DataType::Float64 if self.ordered_floats => {
                let raw = fixed::<8>(blob.data(), blob.data_type())?;
                Ok(Bytes::copy_from_slice(&order_encode_f64(f64::from_le_bytes(raw))))
            }
            _ => Ok(blob.bytes().clone()),
        }
    }

    /// Inverse of [`Callbacks::encode`].
    pub fn decode(&self, data_type: DataType, data: &[u8]) -> Result<Bytes, TransformError> {
        match data_type {
            DataType::Float32 if self.ordered_floats => {
                let raw = fixed::<4>(data, data_type)?;
                Ok(Bytes::copy_from_slice(
                    &order_decode_f32(raw).to_le_bytes(),
                ))
            }
            DataType::Float64 if self.ordered_floats => {
                let raw = fixed::<8>(data, data_type)?;
                Ok(Bytes::copy_from_slice(
                    &order_decode_f64(raw).to_le_bytes(),
                ))
            }
            _ => Ok(Bytes::copy_from_slice(data)),
        }
    }
}

fn fixed<const N: usize>(data: &[u8], data_type: DataType) -> Result<[u8; N], TransformError> {
    data.try_into().map_err(|_| TransformError::BadWidth {
        data_type,
        expected: N,
        found: data.len(),
    })
}

const SIGN64: u64 = 1 << 63;
const SIGN32: u32 = 1 << 31;

fn order_encode_f64(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let mapped = if bits & SIGN64 != 0 { !bits } else { bits | SIGN64 };
    mapped.to_be_bytes()
}

fn order_decode_f64(raw: [u8; 8]) -> f64 {
    let mapped = u64::from_be_bytes(raw);
    let bits = if mapped & SIGN64 != 0 {
        mapped & !SIGN64
    } else {
        !mapped
    };
    f64::from_bits(bits)
}

fn order_encode_f32(value: f32) -> [u8; 4] {
    let bits = value.to_bits();
    let mapped = if bits & SIGN32 != 0 { !bits } else { bits | SIGN32 };
    mapped.to_be_bytes()
}

fn order_decode_f32(raw: [u8; 4]) -> f32 {
    let mapped = u32::from_be_bytes(raw);
    let bits = if mapped & SIGN32 != 0 {
        mapped & !SIGN32
    } else {
        !mapped
    };
    f32::from_bits(bits)
}
