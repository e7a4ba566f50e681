// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The in-process mesh transport: every rank of one process group gets an
//! endpoint wired to every other rank over bounded channels. Requests and
//! responses travel fully serialized, so the wire framing is exercised
//! exactly as it would be on a real network transport.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Barrier};

use tristore_messages::{BulkRequest, BulkResponse, Packer, Unpacker};

use super::TransportError;

/// One framed request in flight, with the channel its response goes back
/// on. Dropping the reply sender (e.g. for a malformed frame) surfaces as a
/// transport failure on the sending side.
pub(crate) struct Envelope {
    pub frame: Bytes,
    pub reply: oneshot::Sender<Bytes>,
}

/// Builds the endpoints of an in-process process group.
pub struct Mesh;

impl Mesh {
    pub fn create(world_size: u32, channel_capacity: usize) -> Vec<MeshEndpoint> {
        let mut senders = Vec::with_capacity(world_size as usize);
        let mut receivers = Vec::with_capacity(world_size as usize);
        for _ in 0..world_size {
            let (tx, rx) = mpsc::channel(channel_capacity.max(1));
            senders.push(tx);
            receivers.push(rx);
        }
        let barrier = Arc::new(Barrier::new(world_size as usize));

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| MeshEndpoint {
                rank: rank as u32,
                peers: senders.clone(),
                incoming: Mutex::new(Some(receiver)),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

/// One rank's connection to the mesh.
#[derive(Debug)]
pub struct MeshEndpoint {
    rank: u32,
    peers: Vec<mpsc::Sender<Envelope>>,
    incoming: Mutex<Option<mpsc::Receiver<Envelope>>>,
    barrier: Arc<Barrier>,
}

impl MeshEndpoint {
    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.peers.len() as u32
    }

    pub(crate) fn take_incoming(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.incoming.lock().take()
    }

    pub(crate) async fn send_bulk(
        &self,
        dst: u32,
        request: &BulkRequest,
    ) -> Result<BulkResponse, TransportError> {
        let sender = self
            .peers
            .get(dst as usize)
            .ok_or(TransportError::NoRoute(dst))?;

        let frame = Packer::request(request);
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Envelope {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::Closed(dst))?;

        let response_frame = reply_rx.await.map_err(|_| TransportError::Closed(dst))?;
        Ok(Unpacker::response(response_frame)?)
    }

    pub(crate) async fn barrier(&self) {
        self.barrier.wait().await;
    }
}
