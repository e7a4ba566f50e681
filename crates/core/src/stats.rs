// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Packet statistics of one handle: how full each bulk packet was when it
//! was handed to the transport, kept per operation kind.

use parking_lot::Mutex;

use tristore_messages::OpKind;

/// One sent packet: its destination rank and the fraction of its slot
/// capacity in use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filled {
    pub dst: u32,
    pub percent: f64,
}

#[derive(Debug, Default)]
pub struct OpStats {
    filled: Mutex<Vec<Filled>>,
}

impl OpStats {
    pub(crate) fn record(&self, dst: u32, percent: f64) {
        self.filled.lock().push(Filled { dst, percent });
    }

    /// Snapshot of everything recorded so far.
    pub fn filled(&self) -> Vec<Filled> {
        self.filled.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.filled.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filled.lock().is_empty()
    }
}

/// Fill statistics per operation kind.
#[derive(Debug, Default)]
pub struct PacketStats {
    pub bput: OpStats,
    pub bget: OpStats,
    pub bgetop: OpStats,
    pub bdelete: OpStats,
    pub bhistogram: OpStats,
}

impl PacketStats {
    pub(crate) fn record(&self, kind: OpKind, dst: u32, percent: f64) {
        match kind {
            OpKind::Put => self.bput.record(dst, percent),
            OpKind::Get => self.bget.record(dst, percent),
            OpKind::GetOp => self.bgetop.record(dst, percent),
            OpKind::Delete => self.bdelete.record(dst, percent),
            OpKind::Histogram => self.bhistogram.record(dst, percent),
            OpKind::Sync => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_kind() {
        let stats = PacketStats::default();
        stats.record(OpKind::Put, 3, 0.5);
        stats.record(OpKind::Put, 1, 1.0);
        stats.record(OpKind::Delete, 0, 0.25);

        assert_eq!(stats.bput.len(), 2);
        assert_eq!(stats.bput.filled()[0], Filled { dst: 3, percent: 0.5 });
        assert_eq!(stats.bdelete.len(), 1);
        assert!(stats.bget.is_empty());
    }
}
