// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// The closed set of data types a [`crate::Blob`] can carry.
///
/// The discriminant is the byte stored on disk and on the wire, so variants
/// must never be renumbered.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum_macros::FromRepr,
    strum_macros::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum DataType {
    Int32 = 0,
    Int64 = 1,
    Size = 2,
    Float32 = 3,
    Float64 = 4,
    Byte = 5,
    Pointer = 6,
    #[default]
    Invalid = 7,
}

impl DataType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Falls back to [`DataType::Invalid`] for unknown bytes.
    pub fn from_u8_lossy(value: u8) -> Self {
        Self::from_repr(value).unwrap_or_default()
    }

    /// Types whose object values feed the per-predicate histograms.
    pub const fn is_histogrammed(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_repr() {
        for byte in 0..=7u8 {
            let dt = DataType::from_repr(byte).unwrap();
            assert_eq!(dt.as_u8(), byte);
        }
        assert_eq!(DataType::from_u8_lossy(200), DataType::Invalid);
    }
}
