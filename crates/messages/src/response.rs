// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::Bytes;
use tristore_types::{Blob, BlobRef, Status};

use crate::{Bulk, Header, OpKind};

/// Outcome of one stored triple; echoes the originating request buffers.
#[derive(Debug)]
pub struct PutResponseSlot {
    pub ds_offset: u32,
    pub status: Status,
    pub subject: BlobRef,
    pub predicate: BlobRef,
}

/// Outcome of one point read. `object` holds the decoded value (typed with
/// the *stored* type) on success.
#[derive(Debug)]
pub struct GetResponseSlot {
    pub ds_offset: u32,
    pub status: Status,
    pub subject: BlobRef,
    pub predicate: BlobRef,
    pub object: Option<Blob>,
}

/// One row produced by an ordered scan; all blobs are owning.
#[derive(Debug)]
pub struct GetOpRecord {
    pub subject: Blob,
    pub predicate: Blob,
    pub object: Blob,
}

/// Outcome of one ordered scan. An errored slot carries no records.
#[derive(Debug)]
pub struct GetOpResponseSlot {
    pub ds_offset: u32,
    pub status: Status,
    pub records: Vec<GetOpRecord>,
}

#[derive(Debug)]
pub struct DeleteResponseSlot {
    pub ds_offset: u32,
    pub status: Status,
    pub subject: BlobRef,
    pub predicate: BlobRef,
}

/// Outcome of one histogram fetch; `histogram` holds the packed form on
/// success, decoded by the caller into bucket/count vectors.
#[derive(Debug)]
pub struct HistogramResponseSlot {
    pub ds_offset: u32,
    pub status: Status,
    pub histogram: Option<Bytes>,
}

pub type BPutResponse = Bulk<PutResponseSlot>;
pub type BGetResponse = Bulk<GetResponseSlot>;
pub type BGetOpResponse = Bulk<GetOpResponseSlot>;
pub type BDeleteResponse = Bulk<DeleteResponseSlot>;
pub type BHistogramResponse = Bulk<HistogramResponseSlot>;

/// A bulk response of any kind, travelling back to the requesting rank.
#[derive(Debug)]
pub enum BulkResponse {
    Put(BPutResponse),
    Get(BGetResponse),
    GetOp(BGetOpResponse),
    Delete(BDeleteResponse),
    Histogram(BHistogramResponse),
}

impl BulkResponse {
    pub fn kind(&self) -> OpKind {
        match self {
            BulkResponse::Put(_) => OpKind::Put,
            BulkResponse::Get(_) => OpKind::Get,
            BulkResponse::GetOp(_) => OpKind::GetOp,
            BulkResponse::Delete(_) => OpKind::Delete,
            BulkResponse::Histogram(_) => OpKind::Histogram,
        }
    }

    pub fn header(&self) -> Header {
        match self {
            BulkResponse::Put(bulk) => bulk.header,
            BulkResponse::Get(bulk) => bulk.header,
            BulkResponse::GetOp(bulk) => bulk.header,
            BulkResponse::Delete(bulk) => bulk.header,
            BulkResponse::Histogram(bulk) => bulk.header,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            BulkResponse::Put(bulk) => bulk.count(),
            BulkResponse::Get(bulk) => bulk.count(),
            BulkResponse::GetOp(bulk) => bulk.count(),
            BulkResponse::Delete(bulk) => bulk.count(),
            BulkResponse::Histogram(bulk) => bulk.count(),
        }
    }
}
