// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The unsent queues: one mutex-guarded FIFO per operation kind. The
//! queues own their triples from enqueue until a flush drains them.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use tristore_types::{Blob, DataType, DatastoreId, GetOpCode};

#[derive(Debug)]
pub(crate) struct PutData {
    pub subject: Blob,
    pub predicate: Blob,
    pub object: Blob,
}

#[derive(Debug)]
pub(crate) struct GetData {
    pub subject: Blob,
    pub predicate: Blob,
    pub object_type: DataType,
}

#[derive(Debug)]
pub(crate) struct GetOpData {
    pub subject: Blob,
    pub predicate: Blob,
    pub object_type: DataType,
    pub num_recs: u64,
    pub op: GetOpCode,
}

#[derive(Debug)]
pub(crate) struct DeleteData {
    pub subject: Blob,
    pub predicate: Blob,
}

#[derive(Debug)]
pub(crate) struct HistogramData {
    pub id: DatastoreId,
    pub name: Blob,
}

/// A FIFO of user-submitted single operations awaiting a flush.
#[derive(Debug)]
pub(crate) struct Unsent<T> {
    entries: Mutex<VecDeque<T>>,
}

impl<T> Default for Unsent<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Unsent<T> {
    /// Appends and reports the new depth.
    pub fn push(&self, item: T) -> usize {
        let mut entries = self.entries.lock();
        entries.push_back(item);
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drains the whole queue, transferring ownership to the caller.
    pub fn take_all(&self) -> VecDeque<T> {
        std::mem::take(&mut *self.entries.lock())
    }
}

/// The per-kind queues plus the condition the background put worker waits
/// on.
#[derive(Debug, Default)]
pub(crate) struct Queues {
    pub puts: Unsent<PutData>,
    pub gets: Unsent<GetData>,
    pub getops: Unsent<GetOpData>,
    pub deletes: Unsent<DeleteData>,
    pub histograms: Unsent<HistogramData>,
    pub put_signal: Notify,
}
