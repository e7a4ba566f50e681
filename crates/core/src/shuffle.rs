// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The shuffler: groups drained queue entries into per-destination bulk
//! packets.
//!
//! Slots destined for this rank land in the local packet; everything else
//! goes into one packet per remote rank, capped at
//! `max_destinations_per_batch` open destinations. A slot that does not fit
//! is handed back so the driver can flush the current batch and retry.

use std::collections::HashMap;

use tristore_messages::Bulk;

pub(crate) struct ShuffleContext {
    pub rank: u32,
    pub max_ops_per_send: usize,
    pub max_destinations_per_batch: usize,
}

/// One shuffle batch of a single slot type: the local packet plus the open
/// remote packets.
pub(crate) struct Batch<S> {
    pub local: Bulk<S>,
    pub remote: HashMap<u32, Bulk<S>>,
}

impl<S> Batch<S> {
    pub fn new(ctx: &ShuffleContext) -> Self {
        Self {
            local: Bulk::with_capacity(ctx.rank, ctx.rank, ctx.max_ops_per_send),
            remote: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.values().all(Bulk::is_empty)
    }

    /// Every non-empty packet of this batch, local one first.
    pub fn into_packets(self) -> Vec<Bulk<S>> {
        let mut packets = Vec::with_capacity(1 + self.remote.len());
        if !self.local.is_empty() {
            packets.push(self.local);
        }
        packets.extend(self.remote.into_values().filter(|bulk| !bulk.is_empty()));
        packets
    }
}

/// Routes one slot into the batch. `Err` hands the slot back: the batch is
/// out of space (full packet, or too many destinations) and must be flushed
/// before the slot can be placed.
pub(crate) fn place<S>(
    ctx: &ShuffleContext,
    batch: &mut Batch<S>,
    dst_rank: u32,
    slot: S,
) -> Result<(), S> {
    if dst_rank == ctx.rank {
        return batch.local.try_push(slot);
    }

    if !batch.remote.contains_key(&dst_rank) {
        if batch.remote.len() >= ctx.max_destinations_per_batch {
            return Err(slot);
        }
        batch.remote.insert(
            dst_rank,
            Bulk::with_capacity(ctx.rank, dst_rank, ctx.max_ops_per_send),
        );
    }
    batch
        .remote
        .get_mut(&dst_rank)
        .expect("destination packet exists")
        .try_push(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ShuffleContext {
        ShuffleContext {
            rank: 0,
            max_ops_per_send: 2,
            max_destinations_per_batch: 2,
        }
    }

    #[test]
    fn local_and_remote_slots_are_split() {
        let ctx = ctx();
        let mut batch: Batch<u32> = Batch::new(&ctx);
        place(&ctx, &mut batch, 0, 1).unwrap();
        place(&ctx, &mut batch, 1, 2).unwrap();
        place(&ctx, &mut batch, 1, 3).unwrap();

        assert_eq!(batch.local.slots, vec![1]);
        assert_eq!(batch.remote[&1].slots, vec![2, 3]);
    }

    #[test]
    fn full_packet_hands_the_slot_back() {
        let ctx = ctx();
        let mut batch: Batch<u32> = Batch::new(&ctx);
        place(&ctx, &mut batch, 1, 1).unwrap();
        place(&ctx, &mut batch, 1, 2).unwrap();
        assert_eq!(place(&ctx, &mut batch, 1, 3), Err(3));
        // order inside the packet is submission order
        assert_eq!(batch.remote[&1].slots, vec![1, 2]);
    }

    #[test]
    fn destination_budget_is_enforced() {
        let ctx = ctx();
        let mut batch: Batch<u32> = Batch::new(&ctx);
        place(&ctx, &mut batch, 1, 1).unwrap();
        place(&ctx, &mut batch, 2, 2).unwrap();
        // a third destination does not fit into this batch
        assert_eq!(place(&ctx, &mut batch, 3, 3), Err(3));
        // but the local packet always accepts
        place(&ctx, &mut batch, 0, 4).unwrap();
    }

    #[test]
    fn into_packets_skips_empty_ones() {
        let ctx = ctx();
        let mut batch: Batch<u32> = Batch::new(&ctx);
        assert!(batch.is_empty());
        place(&ctx, &mut batch, 1, 9).unwrap();
        let packets = batch.into_packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header.dst, 1);
    }
}
