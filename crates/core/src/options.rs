// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

/// The options bundle a handle is opened with.
///
/// Reading these from a file or the environment is a collaborator's job;
/// this is only the closed set of knobs the core understands.
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[builder(default)]
pub struct Options {
    /// Log verbosity hint, e.g. a tracing filter directive. The core never
    /// installs a subscriber itself.
    pub debug_level: String,

    /// Client portion of the client:server ratio. Together with
    /// `server_ratio` this decides which ranks host range servers:
    /// rank `r` is a server iff `r % client_ratio < server_ratio`.
    pub client_ratio: u32,
    /// Server portion of the client:server ratio.
    pub server_ratio: u32,

    /// Local datastore adapters per server rank.
    pub datastores_per_server: u32,

    pub datastore: DatastoreOptions,
    pub transport: TransportOptions,

    /// Explicit subset of datastore ids this client talks to; empty means
    /// all of them.
    pub endpoint_group: Vec<u32>,

    /// Named built-in placement function (see [`crate::hash`]).
    pub hash: String,

    /// Bulk packet capacity bound.
    pub max_ops_per_send: usize,
    /// How many per-destination packets one shuffle batch may hold before
    /// the driver has to flush.
    pub max_destinations_per_batch: usize,

    pub histogram: HistogramOptions,

    /// Queue depth at which the background put worker starts draining;
    /// zero disables the worker.
    pub start_async_puts_at: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug_level: "info".to_owned(),
            client_ratio: 1,
            server_ratio: 1,
            datastores_per_server: 1,
            datastore: DatastoreOptions::default(),
            transport: TransportOptions::default(),
            endpoint_group: Vec::new(),
            hash: "my_rank".to_owned(),
            max_ops_per_send: 128,
            max_destinations_per_batch: 32,
            histogram: HistogramOptions::default(),
            start_async_puts_at: 0,
        }
    }
}

impl Options {
    /// Whether `rank` hosts range-server datastores under this ratio.
    pub fn is_range_server(&self, rank: u32) -> bool {
        if self.client_ratio == 0 {
            return true;
        }
        rank % self.client_ratio < self.server_ratio
    }
}

/// Which engine backs each datastore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatastoreOptions {
    /// The persistent log-structured store. Datastore paths are formed as
    /// `{prefix}/ds-{rank}-{offset}{postfix}`.
    Persistent {
        prefix: String,
        postfix: String,
        create_if_missing: bool,
    },
    /// The in-memory ordered map.
    InMemory,
    /// Stores nothing, reads nothing.
    Null,
}

impl Default for DatastoreOptions {
    fn default() -> Self {
        DatastoreOptions::InMemory
    }
}

/// Which transport carries remote bulk packets. The same-rank path never
/// touches the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportOptions {
    /// In-process channel mesh between the ranks of one process group.
    Mesh { listeners: usize },
    /// Every remote send fails; single-rank deployments only.
    Null,
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions::Null
    }
}

impl TransportOptions {
    pub fn listeners(&self) -> usize {
        match self {
            TransportOptions::Mesh { listeners } => (*listeners).max(1),
            TransportOptions::Null => 0,
        }
    }
}

/// Bucketing parameters for the per-predicate histograms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramOptions {
    /// Values cached before buckets are generated.
    pub first_n: usize,
    /// Named built-in bucket generator (see [`tristore_histogram::builtin`]).
    pub bucket_gen: String,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            first_n: 10,
            bucket_gen: "uniform10".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_decides_server_ranks() {
        let mut options = Options::default();
        assert!(options.is_range_server(0));
        assert!(options.is_range_server(7));

        options.client_ratio = 3;
        options.server_ratio = 1;
        assert!(options.is_range_server(0));
        assert!(!options.is_range_server(1));
        assert!(!options.is_range_server(2));
        assert!(options.is_range_server(3));
    }

    #[test]
    fn builder_fills_defaults() {
        let options = OptionsBuilder::default()
            .max_ops_per_send(4usize)
            .hash("sum_mod_datastores".to_owned())
            .build()
            .unwrap();
        assert_eq!(options.max_ops_per_send, 4);
        assert_eq!(options.datastores_per_server, 1);
    }
}
