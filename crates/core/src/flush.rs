// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The flush driver: drains one unsent queue at a time, shuffles the
//! entries into per-destination bulk packets, pushes every packet through
//! the local dispatch path or the transport, and assembles the responses
//! into a result set.
//!
//! Within one queue, submission order is preserved per destination. The
//! packets of one batch are dispatched concurrently; no ordering is
//! guaranteed across destinations.

use std::collections::VecDeque;

use metrics::{counter, histogram};
use tracing::{debug, warn};

use tristore_histogram::Histogram;
use tristore_messages::request::{
    BulkRequest, DeleteSlot, GetOpSlot, GetSlot, HistogramSlot, PutSlot,
};
use tristore_messages::response::BulkResponse;
use tristore_messages::Bulk;
use tristore_types::{DatastoreId, Status};

use crate::hash::HashContext;
use crate::metric_definitions::{
    CLIENT_PACKETS_SENT, CLIENT_PACKET_FILL_RATIO, CLIENT_TRIPLES_DROPPED,
};
use crate::queue::{DeleteData, GetData, GetOpData, HistogramData, PutData};
use crate::results::{ResultNode, ResultSet};
use crate::shuffle::{self, Batch, ShuffleContext};
use crate::transport::{Transport, TransportError};
use crate::Inner;

impl Inner {
    pub(crate) fn datastores_per_server(&self) -> u32 {
        self.options.datastores_per_server.max(1)
    }

    pub(crate) fn total_datastores(&self) -> u32 {
        self.world_size * self.datastores_per_server()
    }

    fn shuffle_ctx(&self) -> ShuffleContext {
        ShuffleContext {
            rank: self.rank,
            max_ops_per_send: self.options.max_ops_per_send.max(1),
            max_destinations_per_batch: self.options.max_destinations_per_batch.max(1),
        }
    }

    fn hash_triple(&self, subject: &[u8], predicate: &[u8]) -> i64 {
        let hasher = self.hasher.read();
        hasher.hash(&HashContext {
            rank: self.rank,
            world_size: self.world_size,
            datastores_per_server: self.datastores_per_server(),
            total_datastores: self.total_datastores(),
            subject,
            predicate,
        })
    }

    /// Placement outcome for one triple: the datastore id, or `None` when
    /// the hash rejected it (negative, out of range, or outside the
    /// configured endpoint group).
    fn place_triple(&self, subject: &[u8], predicate: &[u8]) -> Option<DatastoreId> {
        let raw = self.hash_triple(subject, predicate);
        self.accept_id(raw)
    }

    fn accept_id(&self, raw: i64) -> Option<DatastoreId> {
        if raw < 0 || raw >= self.total_datastores() as i64 {
            warn!(id = raw, "placement rejected a triple");
            counter!(CLIENT_TRIPLES_DROPPED).increment(1);
            return None;
        }
        let id = raw as u32;
        if !self.options.endpoint_group.is_empty() && !self.options.endpoint_group.contains(&id) {
            warn!(id, "placement outside the endpoint group");
            counter!(CLIENT_TRIPLES_DROPPED).increment(1);
            return None;
        }
        Some(DatastoreId::new(id))
    }

    /// Sends one packet: local dispatch for this rank, transport otherwise.
    async fn send_one(&self, request: &BulkRequest) -> Result<BulkResponse, TransportError> {
        let dst = request.header().dst;
        let kind: &'static str = request.kind().into();
        counter!(CLIENT_PACKETS_SENT, "op" => kind).increment(1);
        histogram!(CLIENT_PACKET_FILL_RATIO, "op" => kind).record(request.fill_ratio());
        self.packet_stats.record(request.kind(), dst, request.fill_ratio());
        if dst == self.rank {
            match &self.local_server {
                Some(server) => Ok(server.lock().await.handle(request)),
                None => Err(TransportError::NoRoute(dst)),
            }
        } else {
            self.transport.send_bulk(dst, request).await
        }
    }

    /// Dispatches every packet of a batch concurrently.
    async fn dispatch<S>(
        &self,
        batch: Batch<S>,
        wrap: impl Fn(Bulk<S>) -> BulkRequest,
    ) -> Vec<(BulkRequest, Result<BulkResponse, TransportError>)> {
        if batch.is_empty() {
            return Vec::new();
        }
        let sends = batch.into_packets().into_iter().map(wrap).map(|request| async move {
            let outcome = self.send_one(&request).await;
            (request, outcome)
        });
        futures::future::join_all(sends).await
    }

    pub(crate) async fn flush_puts(&self) -> ResultSet {
        let mut queue = self.queues.puts.take_all();
        self.drain_puts(&mut queue).await
    }

    pub(crate) async fn drain_puts(&self, queue: &mut VecDeque<PutData>) -> ResultSet {
        let per = self.datastores_per_server();
        let ctx = self.shuffle_ctx();
        let mut results = ResultSet::new();

        while !queue.is_empty() {
            let mut batch = Batch::new(&ctx);
            while let Some(item) = queue.pop_front() {
                let Some(id) = self.place_triple(item.subject.data(), item.predicate.data())
                else {
                    results.push(ResultNode::Put {
                        status: Status::Error,
                        datastore: None,
                        subject: item.subject,
                        predicate: item.predicate,
                    });
                    continue;
                };
                let slot =
                    PutSlot::new(id.offset(per), item.subject, item.predicate, item.object);
                if let Err(slot) = shuffle::place(&ctx, &mut batch, id.rank(per), slot) {
                    queue.push_front(PutData {
                        subject: slot.subject,
                        predicate: slot.predicate,
                        object: slot.object,
                    });
                    break;
                }
            }
            for (request, outcome) in self.dispatch(batch, BulkRequest::Put).await {
                self.assemble_put(request, outcome, &mut results);
            }
        }
        results
    }

    pub(crate) async fn flush_gets(&self) -> ResultSet {
        let per = self.datastores_per_server();
        let ctx = self.shuffle_ctx();
        let mut queue = self.queues.gets.take_all();
        let mut results = ResultSet::new();

        while !queue.is_empty() {
            let mut batch = Batch::new(&ctx);
            while let Some(item) = queue.pop_front() {
                let Some(id) = self.place_triple(item.subject.data(), item.predicate.data())
                else {
                    results.push(ResultNode::Get {
                        status: Status::Error,
                        datastore: None,
                        subject: item.subject,
                        predicate: item.predicate,
                        object: None,
                    });
                    continue;
                };
                let slot = GetSlot::new(
                    id.offset(per),
                    item.subject,
                    item.predicate,
                    item.object_type,
                );
                if let Err(slot) = shuffle::place(&ctx, &mut batch, id.rank(per), slot) {
                    queue.push_front(GetData {
                        subject: slot.subject,
                        predicate: slot.predicate,
                        object_type: slot.object_type,
                    });
                    break;
                }
            }
            for (request, outcome) in self.dispatch(batch, BulkRequest::Get).await {
                self.assemble_get(request, outcome, &mut results);
            }
        }
        results
    }

    pub(crate) async fn flush_getops(&self) -> ResultSet {
        let per = self.datastores_per_server();
        let ctx = self.shuffle_ctx();
        let mut queue = self.queues.getops.take_all();
        let mut results = ResultSet::new();

        while !queue.is_empty() {
            let mut batch = Batch::new(&ctx);
            while let Some(item) = queue.pop_front() {
                let Some(id) = self.place_triple(item.subject.data(), item.predicate.data())
                else {
                    results.push(ResultNode::GetOp {
                        status: Status::Error,
                        datastore: None,
                        subject: item.subject,
                        predicate: item.predicate,
                        object: None,
                    });
                    continue;
                };
                let slot = GetOpSlot::new(
                    id.offset(per),
                    item.op,
                    item.subject,
                    item.predicate,
                    item.object_type,
                    item.num_recs,
                );
                if let Err(slot) = shuffle::place(&ctx, &mut batch, id.rank(per), slot) {
                    queue.push_front(GetOpData {
                        subject: slot.subject,
                        predicate: slot.predicate,
                        object_type: slot.object_type,
                        num_recs: slot.num_recs,
                        op: slot.op,
                    });
                    break;
                }
            }
            for (request, outcome) in self.dispatch(batch, BulkRequest::GetOp).await {
                self.assemble_getop(request, outcome, &mut results);
            }
        }
        results
    }

    pub(crate) async fn flush_deletes(&self) -> ResultSet {
        let per = self.datastores_per_server();
        let ctx = self.shuffle_ctx();
        let mut queue = self.queues.deletes.take_all();
        let mut results = ResultSet::new();

        while !queue.is_empty() {
            let mut batch = Batch::new(&ctx);
            while let Some(item) = queue.pop_front() {
                let Some(id) = self.place_triple(item.subject.data(), item.predicate.data())
                else {
                    results.push(ResultNode::Delete {
                        status: Status::Error,
                        datastore: None,
                        subject: item.subject,
                        predicate: item.predicate,
                    });
                    continue;
                };
                let slot = DeleteSlot::new(id.offset(per), item.subject, item.predicate);
                if let Err(slot) = shuffle::place(&ctx, &mut batch, id.rank(per), slot) {
                    queue.push_front(DeleteData {
                        subject: slot.subject,
                        predicate: slot.predicate,
                    });
                    break;
                }
            }
            for (request, outcome) in self.dispatch(batch, BulkRequest::Delete).await {
                self.assemble_delete(request, outcome, &mut results);
            }
        }
        results
    }

    pub(crate) async fn flush_histograms(&self) -> ResultSet {
        let per = self.datastores_per_server();
        let ctx = self.shuffle_ctx();
        let mut queue = self.queues.histograms.take_all();
        let mut results = ResultSet::new();

        while !queue.is_empty() {
            let mut batch = Batch::new(&ctx);
            while let Some(item) = queue.pop_front() {
                if self.accept_id(item.id.raw() as i64).is_none() {
                    results.push(ResultNode::Histogram {
                        status: Status::Error,
                        datastore: None,
                        buckets: Vec::new(),
                        counts: Vec::new(),
                    });
                    continue;
                }
                let slot = HistogramSlot::new(item.id.offset(per), item.name);
                if let Err(slot) = shuffle::place(&ctx, &mut batch, item.id.rank(per), slot) {
                    queue.push_front(HistogramData {
                        id: item.id,
                        name: slot.name,
                    });
                    break;
                }
            }
            for (request, outcome) in self.dispatch(batch, BulkRequest::Histogram).await {
                self.assemble_histogram(request, outcome, &mut results);
            }
        }
        results
    }

    fn assemble_put(
        &self,
        request: BulkRequest,
        outcome: Result<BulkResponse, TransportError>,
        results: &mut ResultSet,
    ) {
        let per = self.datastores_per_server();
        let BulkRequest::Put(req) = request else {
            return;
        };
        let dst = req.header.dst;
        match outcome {
            Ok(BulkResponse::Put(res)) if res.slots.len() == req.slots.len() => {
                for (slot, rslot) in req.slots.iter().zip(&res.slots) {
                    debug_assert!(rslot.subject.matches(&slot.subject));
                    results.push(ResultNode::Put {
                        status: rslot.status,
                        datastore: Some(DatastoreId::from_rank_offset(dst, rslot.ds_offset, per)),
                        subject: slot.subject.clone(),
                        predicate: slot.predicate.clone(),
                    });
                }
            }
            outcome => {
                log_failed_packet(dst, &outcome);
                for slot in &req.slots {
                    results.push(ResultNode::Put {
                        status: Status::Error,
                        datastore: None,
                        subject: slot.subject.clone(),
                        predicate: slot.predicate.clone(),
                    });
                }
            }
        }
    }

    fn assemble_get(
        &self,
        request: BulkRequest,
        outcome: Result<BulkResponse, TransportError>,
        results: &mut ResultSet,
    ) {
        let per = self.datastores_per_server();
        let BulkRequest::Get(req) = request else {
            return;
        };
        let dst = req.header.dst;
        match outcome {
            Ok(BulkResponse::Get(res)) if res.slots.len() == req.slots.len() => {
                for (slot, rslot) in req.slots.iter().zip(res.slots) {
                    results.push(ResultNode::Get {
                        status: rslot.status,
                        datastore: Some(DatastoreId::from_rank_offset(dst, rslot.ds_offset, per)),
                        subject: slot.subject.clone(),
                        predicate: slot.predicate.clone(),
                        object: rslot.object,
                    });
                }
            }
            outcome => {
                log_failed_packet(dst, &outcome);
                for slot in &req.slots {
                    results.push(ResultNode::Get {
                        status: Status::Error,
                        datastore: None,
                        subject: slot.subject.clone(),
                        predicate: slot.predicate.clone(),
                        object: None,
                    });
                }
            }
        }
    }

    fn assemble_getop(
        &self,
        request: BulkRequest,
        outcome: Result<BulkResponse, TransportError>,
        results: &mut ResultSet,
    ) {
        let per = self.datastores_per_server();
        let BulkRequest::GetOp(req) = request else {
            return;
        };
        let dst = req.header.dst;
        match outcome {
            Ok(BulkResponse::GetOp(res)) if res.slots.len() == req.slots.len() => {
                for (slot, rslot) in req.slots.iter().zip(res.slots) {
                    let datastore =
                        Some(DatastoreId::from_rank_offset(dst, rslot.ds_offset, per));
                    if rslot.status.is_ok() && !rslot.records.is_empty() {
                        for record in rslot.records {
                            results.push(ResultNode::GetOp {
                                status: Status::Success,
                                datastore,
                                subject: record.subject,
                                predicate: record.predicate,
                                object: Some(record.object),
                            });
                        }
                    } else {
                        results.push(ResultNode::GetOp {
                            status: rslot.status,
                            datastore,
                            subject: slot.subject.clone(),
                            predicate: slot.predicate.clone(),
                            object: None,
                        });
                    }
                }
            }
            outcome => {
                log_failed_packet(dst, &outcome);
                for slot in &req.slots {
                    results.push(ResultNode::GetOp {
                        status: Status::Error,
                        datastore: None,
                        subject: slot.subject.clone(),
                        predicate: slot.predicate.clone(),
                        object: None,
                    });
                }
            }
        }
    }

    fn assemble_delete(
        &self,
        request: BulkRequest,
        outcome: Result<BulkResponse, TransportError>,
        results: &mut ResultSet,
    ) {
        let per = self.datastores_per_server();
        let BulkRequest::Delete(req) = request else {
            return;
        };
        let dst = req.header.dst;
        match outcome {
            Ok(BulkResponse::Delete(res)) if res.slots.len() == req.slots.len() => {
                for (slot, rslot) in req.slots.iter().zip(&res.slots) {
                    debug_assert!(rslot.subject.matches(&slot.subject));
                    results.push(ResultNode::Delete {
                        status: rslot.status,
                        datastore: Some(DatastoreId::from_rank_offset(dst, rslot.ds_offset, per)),
                        subject: slot.subject.clone(),
                        predicate: slot.predicate.clone(),
                    });
                }
            }
            outcome => {
                log_failed_packet(dst, &outcome);
                for slot in &req.slots {
                    results.push(ResultNode::Delete {
                        status: Status::Error,
                        datastore: None,
                        subject: slot.subject.clone(),
                        predicate: slot.predicate.clone(),
                    });
                }
            }
        }
    }

    fn assemble_histogram(
        &self,
        request: BulkRequest,
        outcome: Result<BulkResponse, TransportError>,
        results: &mut ResultSet,
    ) {
        let per = self.datastores_per_server();
        let BulkRequest::Histogram(req) = request else {
            return;
        };
        let dst = req.header.dst;
        match outcome {
            Ok(BulkResponse::Histogram(res)) if res.slots.len() == req.slots.len() => {
                for rslot in res.slots {
                    let datastore =
                        Some(DatastoreId::from_rank_offset(dst, rslot.ds_offset, per));
                    let node = match rslot.histogram {
                        Some(mut packed) if rslot.status.is_ok() => {
                            match Histogram::unpack(&mut packed, &self.hist_config) {
                                Ok(hist) => {
                                    let (buckets, counts) = hist.get();
                                    ResultNode::Histogram {
                                        status: Status::Success,
                                        datastore,
                                        buckets: buckets.to_vec(),
                                        counts: counts.to_vec(),
                                    }
                                }
                                Err(error) => {
                                    debug!(%error, "malformed histogram in response");
                                    ResultNode::Histogram {
                                        status: Status::Error,
                                        datastore,
                                        buckets: Vec::new(),
                                        counts: Vec::new(),
                                    }
                                }
                            }
                        }
                        _ => ResultNode::Histogram {
                            status: rslot.status,
                            datastore,
                            buckets: Vec::new(),
                            counts: Vec::new(),
                        },
                    };
                    results.push(node);
                }
            }
            outcome => {
                log_failed_packet(dst, &outcome);
                for _ in &req.slots {
                    results.push(ResultNode::Histogram {
                        status: Status::Error,
                        datastore: None,
                        buckets: Vec::new(),
                        counts: Vec::new(),
                    });
                }
            }
        }
    }
}

fn log_failed_packet(dst: u32, outcome: &Result<BulkResponse, TransportError>) {
    match outcome {
        Err(error) => warn!(dst, %error, "bulk packet failed; stamping every slot as error"),
        Ok(_) => warn!(dst, "bulk response does not match the request; stamping errors"),
    }
}
