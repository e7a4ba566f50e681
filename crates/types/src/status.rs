// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Per-slot outcome of a bulk operation.
///
/// `Unset` is internal staging only; it marks slots that were batched but not
/// yet committed and must never appear in a result handed to a caller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::FromRepr,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum Status {
    #[display(fmt = "success")]
    Success = 0,
    #[display(fmt = "error")]
    Error = 1,
    #[display(fmt = "unset")]
    Unset = 2,
}

impl Status {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Success)
    }
}
