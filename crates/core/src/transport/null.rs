// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tristore_messages::{BulkRequest, BulkResponse};

use super::TransportError;

/// A transport with no remote peers: every send fails and every slot of the
/// affected packet surfaces as an error result. The local (same-rank) path
/// never reaches a transport, so single-rank deployments run fine on this.
#[derive(Debug, Default)]
pub struct NullTransport;

impl NullTransport {
    pub(crate) async fn send_bulk(
        &self,
        dst: u32,
        _request: &BulkRequest,
    ) -> Result<BulkResponse, TransportError> {
        Err(TransportError::NoRoute(dst))
    }

    pub(crate) async fn barrier(&self) {}
}
