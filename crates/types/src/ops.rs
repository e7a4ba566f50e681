// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Seek semantics of an ordered-scan (`GetOp`) request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::FromRepr,
    strum_macros::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum GetOpCode {
    /// Exact key, single row; a miss is an error.
    Eq = 0,
    /// Seek to the exact key, walk forward. The seek point is included when present.
    Next = 1,
    /// Seek to the exact key, walk backward. The seek point is included when present.
    Prev = 2,
    /// Start of the datastore, walk forward.
    First = 3,
    /// End of the datastore, walk backward.
    Last = 4,
    /// Smallest key at or above the subject+predicate prefix, walk forward
    /// while keys still start with the prefix.
    Lowest = 5,
    /// Largest key within the subject+predicate prefix, walk backward while
    /// keys still start with the prefix.
    Highest = 6,
}

impl GetOpCode {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// `First` and `Last` ignore the request's subject and predicate.
    pub const fn needs_key(self) -> bool {
        !matches!(self, GetOpCode::First | GetOpCode::Last)
    }
}
