// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Globally unique id of a single datastore.
///
/// Placement splits an id into the owning range-server rank and the local
/// index on that rank: `rank = id / datastores_per_server`,
/// `offset = id % datastores_per_server`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
#[display(fmt = "ds-{}", _0)]
pub struct DatastoreId(u32);

impl DatastoreId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn from_rank_offset(rank: u32, offset: u32, datastores_per_server: u32) -> Self {
        Self(rank * datastores_per_server + offset)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn rank(self, datastores_per_server: u32) -> u32 {
        self.0 / datastores_per_server
    }

    pub const fn offset(self, datastores_per_server: u32) -> u32 {
        self.0 % datastores_per_server
    }
}
