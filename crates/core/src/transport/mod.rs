// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The transport contract the core consumes.
//!
//! A transport ships one bulk request to a remote range server and yields
//! its bulk response; the same-rank case never reaches it (the flush driver
//! short-circuits into the local range-server loop). `barrier` is the
//! process-group-wide fence used by `sync`.

use std::future::Future;

use tristore_messages::{BulkRequest, BulkResponse, UnpackError};

mod mesh;
mod null;

pub use mesh::{Mesh, MeshEndpoint};
pub use null::NullTransport;

pub(crate) use mesh::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no route to rank {0}")]
    NoRoute(u32),
    #[error("connection to rank {0} closed")]
    Closed(u32),
    #[error("malformed response frame: {0}")]
    Frame(#[from] UnpackError),
}

/// Blocking (from the caller's standpoint) bulk send plus the collective
/// barrier. Cancellation mid-request is not supported; timeouts are the
/// transport's concern.
pub trait Transport: Send + Sync + 'static {
    fn send_bulk(
        &self,
        dst: u32,
        request: &BulkRequest,
    ) -> impl Future<Output = Result<BulkResponse, TransportError>> + Send;

    fn barrier(&self) -> impl Future<Output = ()> + Send;
}

/// The closed set of transports the options bundle can select.
#[derive(Debug)]
pub enum AnyTransport {
    Mesh(MeshEndpoint),
    Null(NullTransport),
}

impl AnyTransport {
    /// The listener-side receive channel, if this transport has one. Can
    /// only be taken once; the range-server listeners own it afterwards.
    pub(crate) fn take_incoming(&self) -> Option<tokio::sync::mpsc::Receiver<Envelope>> {
        match self {
            AnyTransport::Mesh(endpoint) => endpoint.take_incoming(),
            AnyTransport::Null(_) => None,
        }
    }
}

impl Transport for AnyTransport {
    async fn send_bulk(
        &self,
        dst: u32,
        request: &BulkRequest,
    ) -> Result<BulkResponse, TransportError> {
        match self {
            AnyTransport::Mesh(endpoint) => endpoint.send_bulk(dst, request).await,
            AnyTransport::Null(null) => null.send_bulk(dst, request).await,
        }
    }

    async fn barrier(&self) {
        match self {
            AnyTransport::Mesh(endpoint) => endpoint.barrier().await,
            AnyTransport::Null(null) => null.barrier().await,
        }
    }
}
