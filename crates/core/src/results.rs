// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The result set handed back by the flush drivers: an ordered, appendable
//! sequence of per-operation outcomes with a single forward cursor.

use std::collections::VecDeque;

use tristore_types::{Blob, DatastoreId, Status};

/// Outcome of one submitted operation (or one scan row).
///
/// `datastore` is `None` when the operation never reached a datastore, e.g.
/// when the placement function rejected the triple.
#[derive(Debug)]
pub enum ResultNode {
    Put {
        status: Status,
        datastore: Option<DatastoreId>,
        subject: Blob,
        predicate: Blob,
    },
    Get {
        status: Status,
        datastore: Option<DatastoreId>,
        subject: Blob,
        predicate: Blob,
        /// Decoded object, typed with the stored type.
        object: Option<Blob>,
    },
    GetOp {
        status: Status,
        datastore: Option<DatastoreId>,
        subject: Blob,
        predicate: Blob,
        object: Option<Blob>,
    },
    Delete {
        status: Status,
        datastore: Option<DatastoreId>,
        subject: Blob,
        predicate: Blob,
    },
    Sync {
        status: Status,
        datastore: Option<DatastoreId>,
    },
    Histogram {
        status: Status,
        datastore: Option<DatastoreId>,
        buckets: Vec<f64>,
        counts: Vec<u64>,
    },
}

impl ResultNode {
    pub fn status(&self) -> Status {
        match self {
            ResultNode::Put { status, .. }
            | ResultNode::Get { status, .. }
            | ResultNode::GetOp { status, .. }
            | ResultNode::Delete { status, .. }
            | ResultNode::Sync { status, .. }
            | ResultNode::Histogram { status, .. } => *status,
        }
    }

    pub fn datastore(&self) -> Option<DatastoreId> {
        match self {
            ResultNode::Put { datastore, .. }
            | ResultNode::Get { datastore, .. }
            | ResultNode::GetOp { datastore, .. }
            | ResultNode::Delete { datastore, .. }
            | ResultNode::Sync { datastore, .. }
            | ResultNode::Histogram { datastore, .. } => *datastore,
        }
    }
}

/// A linked sequence of [`ResultNode`]s plus one cursor.
///
/// Iteration is forward-only: `go_to_head`, then `current`/`next` while
/// `valid`. Appending another set moves its nodes (the other set ends up
/// empty) and invalidates the cursor, so callers must re-seek to head.
#[derive(Debug, Default)]
pub struct ResultSet {
    nodes: VecDeque<ResultNode>,
    cursor: Option<usize>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: ResultNode) {
        self.nodes.push_back(node);
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Moves every node of `other` into `self`, leaving `other` empty.
    /// Appending an empty set is a no-op. Both cursors are invalidated.
    pub fn append(&mut self, other: &mut ResultSet) {
        self.nodes.append(&mut other.nodes);
        self.cursor = None;
        other.cursor = None;
    }

    pub fn go_to_head(&mut self) {
        self.cursor = if self.nodes.is_empty() { None } else { Some(0) };
    }

    pub fn valid(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor < self.nodes.len())
    }

    /// Advances the cursor; reports whether it still points at a node.
    pub fn next(&mut self) -> bool {
        if let Some(cursor) = self.cursor {
            self.cursor = Some(cursor + 1);
        }
        self.valid()
    }

    pub fn current(&self) -> Option<&ResultNode> {
        self.nodes.get(self.cursor?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultNode> {
        self.nodes.iter()
    }
}
