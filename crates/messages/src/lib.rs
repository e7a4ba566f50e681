// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Bulk request/response packets exchanged between clients and range
//! servers, plus their wire framing.
//!
//! Every packet is a header `{direction, op, src, dst, count}` followed by
//! `count` operation-specific slots; all integers are little-endian and all
//! byte strings are length-prefixed. [`Packer`] and [`Unpacker`] implement
//! the framing; a frame that fails to unpack is dropped by the receiving
//! range server without a response.

use tristore_types::Blob;

mod packer;
pub mod request;
pub mod response;
mod unpacker;

pub use packer::Packer;
pub use unpacker::{UnpackError, Unpacker};

pub use request::BulkRequest;
pub use response::BulkResponse;

/// Which way a bulk packet is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::FromRepr)]
#[repr(u8)]
pub enum Direction {
    Request = 0,
    Response = 1,
}

/// Operation kind carried by a bulk packet.
///
/// `Sync` never crosses the wire (syncing is a local range-server concern)
/// but shares this enum so result nodes can name their originating kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::FromRepr, strum_macros::IntoStaticStr,
)]
#[repr(u8)]
pub enum OpKind {
    Put = 0,
    Get = 1,
    GetOp = 2,
    Delete = 3,
    Sync = 4,
    Histogram = 5,
}

/// Source and destination range-server ranks of a bulk packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub src: u32,
    pub dst: u32,
}

impl Header {
    pub fn new(src: u32, dst: u32) -> Self {
        Self { src, dst }
    }
}

/// A batched operation towards a single destination, bounded by
/// `max_slots` (`max_ops_per_send`).
#[derive(Debug, Clone)]
pub struct Bulk<S> {
    pub header: Header,
    pub max_slots: usize,
    pub slots: Vec<S>,
}

impl<S> Bulk<S> {
    pub fn with_capacity(src: u32, dst: u32, max_slots: usize) -> Self {
        Self {
            header: Header::new(src, dst),
            max_slots,
            slots: Vec::with_capacity(max_slots),
        }
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_slots
    }

    /// Hands the slot back when the packet is at capacity.
    pub fn try_push(&mut self, slot: S) -> Result<(), S> {
        if self.is_full() {
            return Err(slot);
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Fraction of the packet in use when it was handed to the transport.
    pub fn fill_ratio(&self) -> f64 {
        if self.max_slots == 0 {
            return 0.0;
        }
        self.slots.len() as f64 / self.max_slots as f64
    }
}

pub(crate) fn blob_addr(blob: &Blob) -> u64 {
    blob.as_ptr() as u64
}
