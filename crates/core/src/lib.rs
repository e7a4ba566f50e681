// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The client-side middleware of the tristore triple store.
//!
//! A [`TripleStore`] handle queues single `(subject, predicate, object)`
//! operations, shuffles them into per-destination bulk packets on flush,
//! routes them to the owning range servers (short-circuiting the local
//! rank) and hands back a [`ResultSet`] of per-operation outcomes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use tristore_datastore::{
    Config as DatastoreConfig, Datastore, DatastoreError, Engine, MemoryEngine, NullEngine,
    RocksDbEngine, HISTOGRAM_SUBJECT,
};

mod async_put;
mod flush;
pub mod hash;
mod metric_definitions;
pub mod options;
mod queue;
mod range_server;
pub mod results;
mod shuffle;
pub mod stats;
pub mod transport;

pub use hash::{HashContext, HashFn, Hasher};
pub use metric_definitions::*;
pub use options::{
    DatastoreOptions, HistogramOptions, Options, OptionsBuilder, TransportOptions,
};
pub use range_server::RangeServer;
pub use results::{ResultNode, ResultSet};
pub use stats::{Filled, OpStats, PacketStats};
pub use transport::{AnyTransport, Mesh, MeshEndpoint, NullTransport, Transport, TransportError};

// the vocabulary types, for callers that only depend on this crate
pub use tristore_types::{Blob, DataType, DatastoreId, GetOpCode, Status};

use async_put::{AsyncPutShared, DrainCommand};
use queue::{DeleteData, GetData, GetOpData, HistogramData, PutData, Queues};

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error(transparent)]
    Datastore(#[from] DatastoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("subject {HISTOGRAM_SUBJECT:?} is reserved for persisted histograms")]
    ReservedSubject,
    #[error("the handle is closed")]
    Closed,
}

/// Shared state of one handle; the flush drivers and the background put
/// worker run against this.
pub(crate) struct Inner {
    pub(crate) options: Options,
    pub(crate) rank: u32,
    pub(crate) world_size: u32,
    pub(crate) hasher: RwLock<Hasher>,
    pub(crate) queues: Queues,
    pub(crate) transport: AnyTransport,
    pub(crate) local_server: Option<Arc<tokio::sync::Mutex<RangeServer>>>,
    pub(crate) hist_config: tristore_histogram::Config,
    pub(crate) packet_stats: PacketStats,
    pub(crate) running: AtomicBool,
}

struct AsyncPutRuntime {
    shared: Arc<AsyncPutShared>,
    commands: mpsc::Sender<DrainCommand>,
    handle: JoinHandle<()>,
}

/// Everything with a lifetime beyond the shared state: listener workers,
/// the shutdown signal and the background put worker.
struct Runtime {
    listeners: Vec<JoinHandle<()>>,
    drain_signal: Option<drain::Signal>,
    async_put: Option<AsyncPutRuntime>,
}

pub struct TripleStore {
    inner: Arc<Inner>,
    runtime: Runtime,
}

impl TripleStore {
    /// Opens a single-rank handle: rank 0 of a world of one. All traffic
    /// takes the local dispatch path.
    pub async fn open(options: Options) -> Result<TripleStore, OpenError> {
        let transport = match &options.transport {
            TransportOptions::Null => AnyTransport::Null(NullTransport),
            TransportOptions::Mesh { .. } => {
                let endpoint = Mesh::create(1, 64).pop().expect("one endpoint");
                AnyTransport::Mesh(endpoint)
            }
        };
        Self::open_with_transport(options, 0, 1, transport).await
    }

    /// Opens one rank of a process group. The bootstrap communicator that
    /// assigns ranks is a collaborator; tests use [`Mesh::create`].
    pub async fn open_with_transport(
        options: Options,
        rank: u32,
        world_size: u32,
        transport: AnyTransport,
    ) -> Result<TripleStore, OpenError> {
        metric_definitions::describe_metrics();

        if world_size == 0 || rank >= world_size {
            return Err(OpenError::BadArgument(format!(
                "rank {rank} outside world of {world_size}"
            )));
        }
        if options.datastores_per_server == 0 {
            return Err(OpenError::BadArgument(
                "datastores_per_server must be at least 1".to_owned(),
            ));
        }
        if options.max_ops_per_send == 0 {
            return Err(OpenError::BadArgument(
                "max_ops_per_send must be at least 1".to_owned(),
            ));
        }
        if options.server_ratio == 0 || options.server_ratio > options.client_ratio {
            return Err(OpenError::BadArgument(format!(
                "unusable client:server ratio {}:{}",
                options.client_ratio, options.server_ratio
            )));
        }
        let hasher = Hasher::by_name(&options.hash)
            .ok_or_else(|| OpenError::BadArgument(format!("unknown hash \"{}\"", options.hash)))?;
        let bucket_gen = tristore_histogram::builtin(&options.histogram.bucket_gen).ok_or_else(
            || {
                OpenError::BadArgument(format!(
                    "unknown bucket generator \"{}\"",
                    options.histogram.bucket_gen
                ))
            },
        )?;
        let hist_config =
            tristore_histogram::Config::new(options.histogram.first_n, bucket_gen);

        let local_server = if options.is_range_server(rank) {
            let datastores = build_datastores(&options, rank, &hist_config)?;
            Some(Arc::new(tokio::sync::Mutex::new(RangeServer::new(
                rank, datastores,
            ))))
        } else {
            None
        };

        let inner = Arc::new(Inner {
            rank,
            world_size,
            hasher: RwLock::new(hasher),
            queues: Queues::default(),
            transport,
            local_server,
            hist_config,
            packet_stats: PacketStats::default(),
            running: AtomicBool::new(true),
            options,
        });

        let (drain_signal, watch) = drain::channel();

        let mut listeners = Vec::new();
        if let Some(server) = &inner.local_server {
            if let Some(receiver) = inner.transport.take_incoming() {
                listeners = range_server::spawn_listeners(
                    Arc::clone(server),
                    receiver,
                    inner.options.transport.listeners(),
                    watch.clone(),
                );
            }
        }

        let async_put = if inner.options.start_async_puts_at > 0 {
            let shared = Arc::new(AsyncPutShared::default());
            let (commands, command_rx) = mpsc::channel(8);
            let handle = async_put::spawn(
                Arc::clone(&inner),
                Arc::clone(&shared),
                command_rx,
                watch.clone(),
            );
            Some(AsyncPutRuntime {
                shared,
                commands,
                handle,
            })
        } else {
            None
        };

        // only the workers may hold watches, or shutdown never drains
        drop(watch);

        debug!(rank, world_size, "tristore handle open");
        Ok(TripleStore {
            inner,
            runtime: Runtime {
                listeners,
                drain_signal: Some(drain_signal),
                async_put,
            },
        })
    }

    pub fn rank(&self) -> u32 {
        self.inner.rank
    }

    pub fn world_size(&self) -> u32 {
        self.inner.world_size
    }

    pub fn datastores_per_server(&self) -> u32 {
        self.inner.datastores_per_server()
    }

    pub fn total_datastores(&self) -> u32 {
        self.inner.total_datastores()
    }

    pub fn is_range_server(&self) -> bool {
        self.inner.local_server.is_some()
    }

    pub fn hash_name(&self) -> String {
        self.inner.hasher.read().name().to_owned()
    }

    /// How full each bulk packet was when it left this handle.
    pub fn packet_stats(&self) -> &PacketStats {
        &self.inner.packet_stats
    }

    fn ensure_running(&self) -> Result<(), ClientError> {
        if self.inner.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClientError::Closed)
        }
    }

    fn check_subject(subject: &Blob) -> Result<(), ClientError> {
        if subject.data() == HISTOGRAM_SUBJECT {
            return Err(ClientError::ReservedSubject);
        }
        Ok(())
    }

    /// Queues one triple for storage. With the background put worker
    /// enabled, crossing the configured queue depth signals it to start
    /// draining.
    pub fn put(&self, subject: Blob, predicate: Blob, object: Blob) -> Result<(), ClientError> {
        self.ensure_running()?;
        Self::check_subject(&subject)?;
        counter!(CLIENT_OPS_ENQUEUED).increment(1);
        let depth = self.inner.queues.puts.push(PutData {
            subject,
            predicate,
            object,
        });
        if self.runtime.async_put.is_some() && depth >= self.inner.options.start_async_puts_at {
            self.inner.queues.put_signal.notify_one();
        }
        Ok(())
    }

    pub fn bput(
        &self,
        triples: impl IntoIterator<Item = (Blob, Blob, Blob)>,
    ) -> Result<(), ClientError> {
        for (subject, predicate, object) in triples {
            self.put(subject, predicate, object)?;
        }
        Ok(())
    }

    /// Typed convenience: stores a FLOAT32 object.
    pub fn put_f32(&self, subject: Blob, predicate: Blob, value: f32) -> Result<(), ClientError> {
        self.put(subject, predicate, Blob::from_f32(value))
    }

    /// Typed convenience: stores a FLOAT64 object.
    pub fn put_f64(&self, subject: Blob, predicate: Blob, value: f64) -> Result<(), ClientError> {
        self.put(subject, predicate, Blob::from_f64(value))
    }

    /// Queues one point read.
    pub fn get(
        &self,
        subject: Blob,
        predicate: Blob,
        object_type: DataType,
    ) -> Result<(), ClientError> {
        self.ensure_running()?;
        counter!(CLIENT_OPS_ENQUEUED).increment(1);
        self.inner.queues.gets.push(GetData {
            subject,
            predicate,
            object_type,
        });
        Ok(())
    }

    pub fn bget(
        &self,
        reads: impl IntoIterator<Item = (Blob, Blob, DataType)>,
    ) -> Result<(), ClientError> {
        for (subject, predicate, object_type) in reads {
            self.get(subject, predicate, object_type)?;
        }
        Ok(())
    }

    /// Typed convenience: queues a read expecting a FLOAT32 object.
    pub fn get_f32(&self, subject: Blob, predicate: Blob) -> Result<(), ClientError> {
        self.get(subject, predicate, DataType::Float32)
    }

    /// Typed convenience: queues a read expecting a FLOAT64 object.
    pub fn get_f64(&self, subject: Blob, predicate: Blob) -> Result<(), ClientError> {
        self.get(subject, predicate, DataType::Float64)
    }

    /// Queues one ordered scan producing up to `num_recs` rows.
    pub fn getop(
        &self,
        subject: Blob,
        predicate: Blob,
        object_type: DataType,
        num_recs: u64,
        op: GetOpCode,
    ) -> Result<(), ClientError> {
        self.ensure_running()?;
        counter!(CLIENT_OPS_ENQUEUED).increment(1);
        self.inner.queues.getops.push(GetOpData {
            subject,
            predicate,
            object_type,
            num_recs,
            op,
        });
        Ok(())
    }

    pub fn bgetop(
        &self,
        scans: impl IntoIterator<Item = (Blob, Blob, DataType, u64, GetOpCode)>,
    ) -> Result<(), ClientError> {
        for (subject, predicate, object_type, num_recs, op) in scans {
            self.getop(subject, predicate, object_type, num_recs, op)?;
        }
        Ok(())
    }

    /// Queues one removal.
    pub fn delete(&self, subject: Blob, predicate: Blob) -> Result<(), ClientError> {
        self.ensure_running()?;
        Self::check_subject(&subject)?;
        counter!(CLIENT_OPS_ENQUEUED).increment(1);
        self.inner.queues.deletes.push(DeleteData { subject, predicate });
        Ok(())
    }

    pub fn bdelete(
        &self,
        pairs: impl IntoIterator<Item = (Blob, Blob)>,
    ) -> Result<(), ClientError> {
        for (subject, predicate) in pairs {
            self.delete(subject, predicate)?;
        }
        Ok(())
    }

    /// Queues one histogram fetch from an explicit datastore.
    pub fn histogram(&self, datastore: DatastoreId, name: Blob) -> Result<(), ClientError> {
        self.ensure_running()?;
        counter!(CLIENT_OPS_ENQUEUED).increment(1);
        self.inner.queues.histograms.push(HistogramData {
            id: datastore,
            name,
        });
        Ok(())
    }

    pub fn bhistogram(
        &self,
        requests: impl IntoIterator<Item = (DatastoreId, Blob)>,
    ) -> Result<(), ClientError> {
        for (datastore, name) in requests {
            self.histogram(datastore, name)?;
        }
        Ok(())
    }

    /// Flushes queued puts. With the background worker enabled this forces
    /// a drain-to-empty, waits for the acknowledgement and collects the
    /// accumulated results.
    pub async fn flush_puts(&self) -> ResultSet {
        if let Some(async_put) = &self.runtime.async_put {
            let (reply, done) = tokio::sync::oneshot::channel();
            if async_put.commands.send(DrainCommand { reply }).await.is_ok() {
                let _ = done.await;
            }
            let mut results = ResultSet::new();
            results.append(&mut async_put.shared.results.lock());
            // anything enqueued after the worker's drain
            let mut late = self.inner.queues.puts.take_all();
            if !late.is_empty() {
                results.append(&mut self.inner.drain_puts(&mut late).await);
            }
            return results;
        }
        self.inner.flush_puts().await
    }

    pub async fn flush_gets(&self) -> ResultSet {
        self.inner.flush_gets().await
    }

    pub async fn flush_getops(&self) -> ResultSet {
        self.inner.flush_getops().await
    }

    pub async fn flush_deletes(&self) -> ResultSet {
        self.inner.flush_deletes().await
    }

    pub async fn flush_histograms(&self) -> ResultSet {
        self.inner.flush_histograms().await
    }

    /// Flushes every queue, ordered so a later GET observes a PUT submitted
    /// in the same epoch: PUT → GET → GETOP → DELETE → HISTOGRAM.
    pub async fn flush(&self) -> ResultSet {
        let mut results = self.flush_puts().await;
        results.append(&mut self.flush_gets().await);
        results.append(&mut self.flush_getops().await);
        results.append(&mut self.flush_deletes().await);
        results.append(&mut self.flush_histograms().await);
        results
    }

    /// Flush, then sync every local datastore, fenced between two
    /// process-wide barriers so all peers observe a consistent sync point.
    /// One Sync result per local datastore.
    pub async fn sync(&self) -> ResultSet {
        let mut results = self.flush().await;
        self.inner.transport.barrier().await;
        if let Some(server) = &self.inner.local_server {
            for (id, status) in server.lock().await.sync_all() {
                results.push(ResultNode::Sync {
                    status,
                    datastore: Some(id),
                });
            }
        }
        self.inner.transport.barrier().await;
        results
    }

    /// Swaps the placement function. Every queue is flushed under the old
    /// placement first, then the local datastores are reopened; one Sync
    /// result per reopened datastore is appended.
    pub async fn change_hash(&self, hasher: Hasher) -> ResultSet {
        let mut results = self.flush().await;
        self.inner.transport.barrier().await;
        *self.inner.hasher.write() = hasher;
        if let Some(server) = &self.inner.local_server {
            for (id, status) in server.lock().await.reopen_all() {
                results.push(ResultNode::Sync {
                    status,
                    datastore: Some(id),
                });
            }
        }
        self.inner.transport.barrier().await;
        results
    }

    /// Shuts the handle down: stops the background put worker, drains the
    /// listener workers and closes every local datastore. Queued but
    /// unflushed operations are discarded.
    pub async fn close(mut self) {
        self.inner.running.store(false, Ordering::Release);

        if let Some(async_put) = self.runtime.async_put.take() {
            drop(async_put.commands);
            let _ = async_put.handle.await;
        }
        if let Some(signal) = self.runtime.drain_signal.take() {
            signal.drain().await;
        }
        for handle in self.runtime.listeners.drain(..) {
            let _ = handle.await;
        }
        if let Some(server) = &self.inner.local_server {
            server.lock().await.close_all();
        }
        debug!(rank = self.inner.rank, "tristore handle closed");
    }
}

fn build_datastores(
    options: &Options,
    rank: u32,
    hist_config: &tristore_histogram::Config,
) -> Result<Vec<Datastore>, OpenError> {
    let per = options.datastores_per_server;
    let mut stores = Vec::with_capacity(per as usize);
    for offset in 0..per {
        let id = DatastoreId::from_rank_offset(rank, offset, per);
        let mut config = DatastoreConfig::new(rank, id);
        config.histograms = hist_config.clone();

        let (engine, name) = match &options.datastore {
            DatastoreOptions::Persistent {
                prefix,
                postfix,
                create_if_missing,
            } => {
                std::fs::create_dir_all(prefix)?;
                (
                    Engine::RocksDb(RocksDbEngine::new(*create_if_missing)),
                    format!("{prefix}/ds-{rank}-{offset}{postfix}"),
                )
            }
            DatastoreOptions::InMemory => (Engine::Memory(MemoryEngine::new()), String::new()),
            DatastoreOptions::Null => (Engine::Null(NullEngine::default()), String::new()),
        };

        let mut datastore = Datastore::new(config, engine);
        datastore.open(&name)?;
        stores.push(datastore);
    }
    Ok(stores)
}
