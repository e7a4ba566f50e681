// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The range-server loop: dispatches bulk requests onto the rank's local
//! datastore adapters and produces bulk responses.
//!
//! Slots of one packet may target different local datastores; they are
//! grouped by `ds_offset`, dispatched per adapter (so the persistent
//! backend still sees one batched write per datastore) and the responses
//! are reassembled in the original slot order.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tristore_datastore::Datastore;
use tristore_messages::request::BulkRequest;
use tristore_messages::response::{
    BulkResponse, DeleteResponseSlot, GetOpResponseSlot, GetResponseSlot, HistogramResponseSlot,
    PutResponseSlot,
};
use tristore_messages::{Bulk, Header, Packer, Unpacker};
use tristore_types::{BlobRef, DatastoreId, Status};

use crate::metric_definitions::{SERVER_MALFORMED_FRAMES, SERVER_REQUESTS_HANDLED};
use crate::transport::Envelope;

pub struct RangeServer {
    rank: u32,
    datastores: Vec<Datastore>,
}

impl RangeServer {
    pub fn new(rank: u32, datastores: Vec<Datastore>) -> Self {
        Self { rank, datastores }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn datastore_count(&self) -> usize {
        self.datastores.len()
    }

    pub fn datastores(&self) -> &[Datastore] {
        &self.datastores
    }

    /// Handles one bulk request and produces its response.
    pub fn handle(&mut self, request: &BulkRequest) -> BulkResponse {
        counter!(SERVER_REQUESTS_HANDLED).increment(1);
        let reply = Header::new(self.rank, request.header().src);
        match request {
            BulkRequest::Put(bulk) => BulkResponse::Put(self.dispatch(
                reply,
                &bulk.slots,
                |ds, slots| ds.bput(slots),
                |slot| PutResponseSlot {
                    ds_offset: slot.ds_offset,
                    status: Status::Error,
                    subject: BlobRef::of(&slot.subject),
                    predicate: BlobRef::of(&slot.predicate),
                },
            )),
            BulkRequest::Get(bulk) => BulkResponse::Get(self.dispatch(
                reply,
                &bulk.slots,
                |ds, slots| ds.bget(slots),
                |slot| GetResponseSlot {
                    ds_offset: slot.ds_offset,
                    status: Status::Error,
                    subject: BlobRef::of(&slot.subject),
                    predicate: BlobRef::of(&slot.predicate),
                    object: None,
                },
            )),
            BulkRequest::GetOp(bulk) => BulkResponse::GetOp(self.dispatch(
                reply,
                &bulk.slots,
                |ds, slots| ds.bgetop(slots),
                |slot| GetOpResponseSlot {
                    ds_offset: slot.ds_offset,
                    status: Status::Error,
                    records: Vec::new(),
                },
            )),
            BulkRequest::Delete(bulk) => BulkResponse::Delete(self.dispatch(
                reply,
                &bulk.slots,
                |ds, slots| ds.bdelete(slots),
                |slot| DeleteResponseSlot {
                    ds_offset: slot.ds_offset,
                    status: Status::Error,
                    subject: BlobRef::of(&slot.subject),
                    predicate: BlobRef::of(&slot.predicate),
                },
            )),
            BulkRequest::Histogram(bulk) => BulkResponse::Histogram(self.dispatch(
                reply,
                &bulk.slots,
                |ds, slots| ds.bhistogram(slots),
                |slot| HistogramResponseSlot {
                    ds_offset: slot.ds_offset,
                    status: Status::Error,
                    histogram: None,
                },
            )),
        }
    }

    /// Groups slots by local datastore, runs each group through `run`, and
    /// reassembles the per-slot responses in request order. Slots with an
    /// offset this rank does not own get `reject`ed.
    fn dispatch<S, R>(
        &mut self,
        reply: Header,
        slots: &[S],
        mut run: impl FnMut(&mut Datastore, &[S]) -> Vec<R>,
        mut reject: impl FnMut(&S) -> R,
    ) -> Bulk<R>
    where
        S: Clone + SlotOffset,
    {
        let mut grouped: Vec<Vec<usize>> = vec![Vec::new(); self.datastores.len()];
        let mut rejected = Vec::new();
        for (index, slot) in slots.iter().enumerate() {
            match grouped.get_mut(slot.ds_offset() as usize) {
                Some(group) => group.push(index),
                None => rejected.push(index),
            }
        }

        let mut out: Vec<Option<R>> = slots.iter().map(|_| None).collect();
        for (offset, indices) in grouped.iter().enumerate() {
            if indices.is_empty() {
                continue;
            }
            let group: Vec<S> = indices.iter().map(|index| slots[*index].clone()).collect();
            let responses = run(&mut self.datastores[offset], &group);
            debug_assert_eq!(responses.len(), group.len());
            for (index, response) in indices.iter().zip(responses) {
                out[*index] = Some(response);
            }
        }
        for index in rejected {
            warn!(
                rank = self.rank,
                slot = index,
                "bulk slot targets a datastore offset this rank does not own"
            );
            out[index] = Some(reject(&slots[index]));
        }

        Bulk {
            header: reply,
            max_slots: slots.len(),
            slots: out
                .into_iter()
                .map(|slot| slot.expect("every slot answered"))
                .collect(),
        }
    }

    /// Syncs every local datastore; one status per datastore.
    pub fn sync_all(&mut self) -> Vec<(DatastoreId, Status)> {
        self.datastores
            .iter_mut()
            .map(|ds| (ds.id(), ds.sync()))
            .collect()
    }

    /// Closes and reopens every local datastore under its recorded name.
    /// Used when the placement function changes.
    pub fn reopen_all(&mut self) -> Vec<(DatastoreId, Status)> {
        self.datastores
            .iter_mut()
            .map(|ds| {
                let name = ds.name().to_owned();
                ds.close();
                let status = match ds.open(&name) {
                    Ok(()) => Status::Success,
                    Err(error) => {
                        warn!(datastore = %ds.id(), %error, "reopen failed");
                        Status::Error
                    }
                };
                (ds.id(), status)
            })
            .collect()
    }

    pub fn close_all(&mut self) {
        for ds in &mut self.datastores {
            ds.close();
        }
    }
}

/// Request slots know which local datastore they target.
pub trait SlotOffset {
    fn ds_offset(&self) -> u32;
}

macro_rules! impl_slot_offset {
    ($($slot:ty),* $(,)?) => {
        $(impl SlotOffset for $slot {
            fn ds_offset(&self) -> u32 {
                self.ds_offset
            }
        })*
    };
}

impl_slot_offset!(
    tristore_messages::request::PutSlot,
    tristore_messages::request::GetSlot,
    tristore_messages::request::GetOpSlot,
    tristore_messages::request::DeleteSlot,
    tristore_messages::request::HistogramSlot,
);

/// Spawns the listener workers of one range server. Each worker pulls
/// framed requests off the shared transport channel, dispatches them on the
/// (serialized) server and replies. A malformed frame is dropped without a
/// response; the sender observes that as a transport failure.
pub(crate) fn spawn_listeners(
    server: Arc<tokio::sync::Mutex<RangeServer>>,
    receiver: mpsc::Receiver<Envelope>,
    listeners: usize,
    watch: drain::Watch,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
    (0..listeners.max(1))
        .map(|worker| {
            let server = Arc::clone(&server);
            let receiver = Arc::clone(&receiver);
            let watch = watch.clone();
            tokio::spawn(async move {
                let signaled = watch.signaled();
                tokio::pin!(signaled);
                loop {
                    let envelope = {
                        let mut receiver = receiver.lock().await;
                        tokio::select! {
                            envelope = receiver.recv() => match envelope {
                                Some(envelope) => envelope,
                                None => break,
                            },
                            _ = &mut signaled => break,
                        }
                    };

                    let request = match Unpacker::request(envelope.frame) {
                        Ok(request) => request,
                        Err(error) => {
                            counter!(SERVER_MALFORMED_FRAMES).increment(1);
                            warn!(worker, %error, "dropping malformed request frame");
                            continue;
                        }
                    };
                    let response = server.lock().await.handle(&request);
                    let frame = Packer::response(&response);
                    let _ = envelope.reply.send(frame);
                }
                debug!(worker, "listener stopped");
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tristore_datastore::{Config, Engine, MemoryEngine};
    use tristore_messages::request::{BPut, GetSlot, PutSlot};
    use tristore_types::{Blob, DataType};

    fn server(datastores: u32) -> RangeServer {
        let stores = (0..datastores)
            .map(|offset| {
                let id = DatastoreId::from_rank_offset(0, offset, datastores);
                let mut ds =
                    Datastore::new(Config::new(0, id), Engine::Memory(MemoryEngine::new()));
                ds.open("").unwrap();
                ds
            })
            .collect();
        RangeServer::new(0, stores)
    }

    #[test]
    fn slots_route_to_their_datastore_offset() {
        let mut server = server(2);

        let mut bulk = BPut::with_capacity(0, 0, 4);
        bulk.try_push(PutSlot::new(0, Blob::from("a"), Blob::from("p"), Blob::from("v0")))
            .unwrap();
        bulk.try_push(PutSlot::new(1, Blob::from("b"), Blob::from("p"), Blob::from("v1")))
            .unwrap();
        bulk.try_push(PutSlot::new(0, Blob::from("c"), Blob::from("p"), Blob::from("v2")))
            .unwrap();

        let response = server.handle(&BulkRequest::Put(bulk));
        let BulkResponse::Put(response) = response else {
            panic!("wrong kind");
        };
        assert_eq!(response.slots.len(), 3);
        assert!(response.slots.iter().all(|slot| slot.status.is_ok()));
        // responses stay in request order
        assert_eq!(response.slots[1].ds_offset, 1);

        // each key landed on its own datastore
        let mut get = Bulk::with_capacity(0, 0, 2);
        get.try_push(GetSlot::new(0, Blob::from("b"), Blob::from("p"), DataType::Byte))
            .unwrap();
        get.try_push(GetSlot::new(1, Blob::from("b"), Blob::from("p"), DataType::Byte))
            .unwrap();
        let BulkResponse::Get(found) = server.handle(&BulkRequest::Get(get)) else {
            panic!("wrong kind");
        };
        assert_eq!(found.slots[0].status, Status::Error);
        assert!(found.slots[1].status.is_ok());
    }

    #[test]
    fn out_of_range_offset_is_rejected_per_slot() {
        let mut server = server(1);

        let mut bulk = BPut::with_capacity(0, 0, 2);
        bulk.try_push(PutSlot::new(0, Blob::from("a"), Blob::from("p"), Blob::from("v")))
            .unwrap();
        bulk.try_push(PutSlot::new(9, Blob::from("b"), Blob::from("p"), Blob::from("v")))
            .unwrap();

        let BulkResponse::Put(response) = server.handle(&BulkRequest::Put(bulk)) else {
            panic!("wrong kind");
        };
        assert!(response.slots[0].status.is_ok());
        assert_eq!(response.slots[1].status, Status::Error);
    }

    #[test]
    fn sync_reports_one_status_per_datastore() {
        let mut server = server(3);
        let statuses = server.sync_all();
        assert_eq!(statuses.len(), 3);
        assert!(statuses.iter().all(|(_, status)| status.is_ok()));
    }

    #[tokio::test]
    async fn listeners_drop_malformed_frames_and_keep_serving() {
        use bytes::Bytes;

        let server = Arc::new(tokio::sync::Mutex::new(server(1)));
        let (tx, rx) = mpsc::channel(4);
        let (signal, watch) = drain::channel();
        let handles = spawn_listeners(server, rx, 2, watch.clone());
        drop(watch);

        // garbage frame: no response, the sender sees a closed reply channel
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        tx.send(Envelope {
            frame: Bytes::from_static(&[0xAB, 0xCD, 0xEF]),
            reply: reply_tx,
        })
        .await
        .unwrap();
        assert!(reply_rx.await.is_err());

        // the worker is still alive and serves the next valid frame
        let mut bulk = BPut::with_capacity(0, 0, 1);
        bulk.try_push(PutSlot::new(0, Blob::from("a"), Blob::from("p"), Blob::from("v")))
            .unwrap();
        let frame = Packer::request(&BulkRequest::Put(bulk));
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        tx.send(Envelope {
            frame,
            reply: reply_tx,
        })
        .await
        .unwrap();
        let response = Unpacker::response(reply_rx.await.unwrap()).unwrap();
        assert_eq!(response.count(), 1);

        drop(tx);
        signal.drain().await;
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
