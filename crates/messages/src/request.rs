// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tristore_types::{Blob, DataType, GetOpCode};

use crate::{blob_addr, Bulk, Header, OpKind};

/// One triple to store. The `*_addr` fields capture the client-side buffer
/// addresses at enqueue time so the response can echo them; after transport
/// they are correlation tokens only.
#[derive(Debug, Clone)]
pub struct PutSlot {
    pub ds_offset: u32,
    pub subject: Blob,
    pub subject_addr: u64,
    pub predicate: Blob,
    pub predicate_addr: u64,
    pub object: Blob,
}

impl PutSlot {
    pub fn new(ds_offset: u32, subject: Blob, predicate: Blob, object: Blob) -> Self {
        Self {
            ds_offset,
            subject_addr: blob_addr(&subject),
            subject,
            predicate_addr: blob_addr(&predicate),
            predicate,
            object,
        }
    }
}

/// One point read.
#[derive(Debug, Clone)]
pub struct GetSlot {
    pub ds_offset: u32,
    pub subject: Blob,
    pub subject_addr: u64,
    pub predicate: Blob,
    pub predicate_addr: u64,
    pub object_type: DataType,
}

impl GetSlot {
    pub fn new(ds_offset: u32, subject: Blob, predicate: Blob, object_type: DataType) -> Self {
        Self {
            ds_offset,
            subject_addr: blob_addr(&subject),
            subject,
            predicate_addr: blob_addr(&predicate),
            predicate,
            object_type,
        }
    }
}

/// One ordered scan producing up to `num_recs` rows.
#[derive(Debug, Clone)]
pub struct GetOpSlot {
    pub ds_offset: u32,
    pub op: GetOpCode,
    pub subject: Blob,
    pub predicate: Blob,
    pub object_type: DataType,
    pub num_recs: u64,
}

impl GetOpSlot {
    pub fn new(
        ds_offset: u32,
        op: GetOpCode,
        subject: Blob,
        predicate: Blob,
        object_type: DataType,
        num_recs: u64,
    ) -> Self {
        Self {
            ds_offset,
            op,
            subject,
            predicate,
            object_type,
            num_recs,
        }
    }
}

/// One key removal.
#[derive(Debug, Clone)]
pub struct DeleteSlot {
    pub ds_offset: u32,
    pub subject: Blob,
    pub subject_addr: u64,
    pub predicate: Blob,
    pub predicate_addr: u64,
}

impl DeleteSlot {
    pub fn new(ds_offset: u32, subject: Blob, predicate: Blob) -> Self {
        Self {
            ds_offset,
            subject_addr: blob_addr(&subject),
            subject,
            predicate_addr: blob_addr(&predicate),
            predicate,
        }
    }
}

/// One histogram fetch by name.
#[derive(Debug, Clone)]
pub struct HistogramSlot {
    pub ds_offset: u32,
    pub name: Blob,
}

impl HistogramSlot {
    pub fn new(ds_offset: u32, name: Blob) -> Self {
        Self { ds_offset, name }
    }
}

pub type BPut = Bulk<PutSlot>;
pub type BGet = Bulk<GetSlot>;
pub type BGetOp = Bulk<GetOpSlot>;
pub type BDelete = Bulk<DeleteSlot>;
pub type BHistogram = Bulk<HistogramSlot>;

/// A bulk request of any kind, addressed to a single range server.
#[derive(Debug, Clone)]
pub enum BulkRequest {
    Put(BPut),
    Get(BGet),
    GetOp(BGetOp),
    Delete(BDelete),
    Histogram(BHistogram),
}

impl BulkRequest {
    pub fn kind(&self) -> OpKind {
        match self {
            BulkRequest::Put(_) => OpKind::Put,
            BulkRequest::Get(_) => OpKind::Get,
            BulkRequest::GetOp(_) => OpKind::GetOp,
            BulkRequest::Delete(_) => OpKind::Delete,
            BulkRequest::Histogram(_) => OpKind::Histogram,
        }
    }

    pub fn header(&self) -> Header {
        match self {
            BulkRequest::Put(bulk) => bulk.header,
            BulkRequest::Get(bulk) => bulk.header,
            BulkRequest::GetOp(bulk) => bulk.header,
            BulkRequest::Delete(bulk) => bulk.header,
            BulkRequest::Histogram(bulk) => bulk.header,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            BulkRequest::Put(bulk) => bulk.count(),
            BulkRequest::Get(bulk) => bulk.count(),
            BulkRequest::GetOp(bulk) => bulk.count(),
            BulkRequest::Delete(bulk) => bulk.count(),
            BulkRequest::Histogram(bulk) => bulk.count(),
        }
    }

    pub fn fill_ratio(&self) -> f64 {
        match self {
            BulkRequest::Put(bulk) => bulk.fill_ratio(),
            BulkRequest::Get(bulk) => bulk.fill_ratio(),
            BulkRequest::GetOp(bulk) => bulk.fill_ratio(),
            BulkRequest::Delete(bulk) => bulk.fill_ratio(),
            BulkRequest::Histogram(bulk) => bulk.fill_ratio(),
        }
    }
}
