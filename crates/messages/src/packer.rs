// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::{BufMut, Bytes, BytesMut};
use tristore_types::{Blob, Status};

use crate::request::{
    BDelete, BGet, BGetOp, BHistogram, BPut, BulkRequest, DeleteSlot, GetOpSlot, GetSlot,
    HistogramSlot, PutSlot,
};
use crate::response::{
    BDeleteResponse, BGetOpResponse, BGetResponse, BHistogramResponse, BPutResponse, BulkResponse,
    DeleteResponseSlot, GetOpResponseSlot, GetResponseSlot, HistogramResponseSlot, PutResponseSlot,
};
use crate::{Direction, Header, OpKind};

/// Serializes bulk packets into the wire framing. The inverse lives in
/// [`crate::Unpacker`].
pub struct Packer;

impl Packer {
    pub fn request(request: &BulkRequest) -> Bytes {
        let mut buf = BytesMut::new();
        match request {
            BulkRequest::Put(bulk) => pack_put(&mut buf, bulk),
            BulkRequest::Get(bulk) => pack_get(&mut buf, bulk),
            BulkRequest::GetOp(bulk) => pack_getop(&mut buf, bulk),
            BulkRequest::Delete(bulk) => pack_delete(&mut buf, bulk),
            BulkRequest::Histogram(bulk) => pack_histogram(&mut buf, bulk),
        }
        buf.freeze()
    }

    pub fn response(response: &BulkResponse) -> Bytes {
        let mut buf = BytesMut::new();
        match response {
            BulkResponse::Put(bulk) => pack_put_response(&mut buf, bulk),
            BulkResponse::Get(bulk) => pack_get_response(&mut buf, bulk),
            BulkResponse::GetOp(bulk) => pack_getop_response(&mut buf, bulk),
            BulkResponse::Delete(bulk) => pack_delete_response(&mut buf, bulk),
            BulkResponse::Histogram(bulk) => pack_histogram_response(&mut buf, bulk),
        }
        buf.freeze()
    }
}

fn pack_header(
    buf: &mut BytesMut,
    direction: Direction,
    op: OpKind,
    header: Header,
    count: usize,
) {
    buf.put_u8(direction as u8);
    buf.put_u8(op as u8);
    buf.put_i32_le(header.src as i32);
    buf.put_i32_le(header.dst as i32);
    buf.put_u64_le(count as u64);
}

fn pack_put(buf: &mut BytesMut, bulk: &BPut) {
    pack_header(buf, Direction::Request, OpKind::Put, bulk.header, bulk.count());
    for slot in &bulk.slots {
        pack_put_slot(buf, slot);
    }
}

fn pack_put_slot(buf: &mut BytesMut, slot: &PutSlot) {
    buf.put_u32_le(slot.ds_offset);
    slot.subject.pack(buf, true);
    buf.put_u64_le(slot.subject_addr);
    slot.predicate.pack(buf, true);
    buf.put_u64_le(slot.predicate_addr);
    slot.object.pack(buf, true);
}

fn pack_get(buf: &mut BytesMut, bulk: &BGet) {
    pack_header(buf, Direction::Request, OpKind::Get, bulk.header, bulk.count());
    for slot in &bulk.slots {
        pack_get_slot(buf, slot);
    }
}

fn pack_get_slot(buf: &mut BytesMut, slot: &GetSlot) {
    buf.put_u32_le(slot.ds_offset);
    slot.subject.pack(buf, true);
    buf.put_u64_le(slot.subject_addr);
    slot.predicate.pack(buf, true);
    buf.put_u64_le(slot.predicate_addr);
    buf.put_u8(slot.object_type.as_u8());
}

fn pack_getop(buf: &mut BytesMut, bulk: &BGetOp) {
    pack_header(buf, Direction::Request, OpKind::GetOp, bulk.header, bulk.count());
    for slot in &bulk.slots {
        pack_getop_slot(buf, slot);
    }
}

fn pack_getop_slot(buf: &mut BytesMut, slot: &GetOpSlot) {
    buf.put_u32_le(slot.ds_offset);
    buf.put_u8(slot.op.as_u8());
    if slot.op.needs_key() {
        slot.subject.pack(buf, true);
        slot.predicate.pack(buf, true);
    }
    buf.put_u8(slot.object_type.as_u8());
    buf.put_u64_le(slot.num_recs);
}

fn pack_delete(buf: &mut BytesMut, bulk: &BDelete) {
    pack_header(
        buf,
        Direction::Request,
        OpKind::Delete,
        bulk.header,
        bulk.count(),
    );
    for slot in &bulk.slots {
        pack_delete_slot(buf, slot);
    }
}

fn pack_delete_slot(buf: &mut BytesMut, slot: &DeleteSlot) {
    buf.put_u32_le(slot.ds_offset);
    slot.subject.pack(buf, true);
    buf.put_u64_le(slot.subject_addr);
    slot.predicate.pack(buf, true);
    buf.put_u64_le(slot.predicate_addr);
}

fn pack_histogram(buf: &mut BytesMut, bulk: &BHistogram) {
    pack_header(
        buf,
        Direction::Request,
        OpKind::Histogram,
        bulk.header,
        bulk.count(),
    );
    for slot in &bulk.slots {
        pack_histogram_slot(buf, slot);
    }
}

fn pack_histogram_slot(buf: &mut BytesMut, slot: &HistogramSlot) {
    buf.put_u32_le(slot.ds_offset);
    slot.name.pack(buf, false);
}

fn pack_put_response(buf: &mut BytesMut, bulk: &BPutResponse) {
    pack_header(buf, Direction::Response, OpKind::Put, bulk.header, bulk.count());
    for slot in &bulk.slots {
        pack_put_response_slot(buf, slot);
    }
}

fn pack_put_response_slot(buf: &mut BytesMut, slot: &PutResponseSlot) {
    buf.put_u32_le(slot.ds_offset);
    buf.put_u8(slot.status.as_u8());
    slot.subject.pack(buf);
    slot.predicate.pack(buf);
}

fn pack_get_response(buf: &mut BytesMut, bulk: &BGetResponse) {
    pack_header(buf, Direction::Response, OpKind::Get, bulk.header, bulk.count());
    for slot in &bulk.slots {
        pack_get_response_slot(buf, slot);
    }
}

fn pack_get_response_slot(buf: &mut BytesMut, slot: &GetResponseSlot) {
    buf.put_u32_le(slot.ds_offset);
    buf.put_u8(slot.status.as_u8());
    slot.subject.pack(buf);
    slot.predicate.pack(buf);
    if slot.status == Status::Success {
        let empty = Blob::empty();
        let object = slot.object.as_ref().unwrap_or(&empty);
        object.pack(buf, true);
    }
}

fn pack_getop_response(buf: &mut BytesMut, bulk: &BGetOpResponse) {
    pack_header(
        buf,
        Direction::Response,
        OpKind::GetOp,
        bulk.header,
        bulk.count(),
    );
    for slot in &bulk.slots {
        pack_getop_response_slot(buf, slot);
    }
}

fn pack_getop_response_slot(buf: &mut BytesMut, slot: &GetOpResponseSlot) {
    buf.put_u32_le(slot.ds_offset);
    buf.put_u8(slot.status.as_u8());
    buf.put_u64_le(slot.records.len() as u64);
    for record in &slot.records {
        record.subject.pack(buf, true);
        record.predicate.pack(buf, true);
        record.object.pack(buf, true);
    }
}

fn pack_delete_response(buf: &mut BytesMut, bulk: &BDeleteResponse) {
    pack_header(
        buf,
        Direction::Response,
        OpKind::Delete,
        bulk.header,
        bulk.count(),
    );
    for slot in &bulk.slots {
        pack_delete_response_slot(buf, slot);
    }
}

fn pack_delete_response_slot(buf: &mut BytesMut, slot: &DeleteResponseSlot) {
    buf.put_u32_le(slot.ds_offset);
    buf.put_u8(slot.status.as_u8());
    slot.subject.pack(buf);
    slot.predicate.pack(buf);
}

fn pack_histogram_response(buf: &mut BytesMut, bulk: &BHistogramResponse) {
    pack_header(
        buf,
        Direction::Response,
        OpKind::Histogram,
        bulk.header,
        bulk.count(),
    );
    for slot in &bulk.slots {
        pack_histogram_response_slot(buf, slot);
    }
}

fn pack_histogram_response_slot(buf: &mut BytesMut, slot: &HistogramResponseSlot) {
    buf.put_u32_le(slot.ds_offset);
    buf.put_u8(slot.status.as_u8());
    if slot.status == Status::Success {
        let packed = slot.histogram.as_deref().unwrap_or_default();
        buf.put_u64_le(packed.len() as u64);
        buf.put_slice(packed);
    }
}
