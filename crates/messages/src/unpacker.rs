// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::mem::size_of;

use bytes::{Buf, Bytes};
use tristore_types::{Blob, BlobRef, DataType, GetOpCode, Status};

use crate::request::{
    BulkRequest, DeleteSlot, GetOpSlot, GetSlot, HistogramSlot, PutSlot,
};
use crate::response::{
    BulkResponse, DeleteResponseSlot, GetOpRecord, GetOpResponseSlot, GetResponseSlot,
    HistogramResponseSlot, PutResponseSlot,
};
use crate::{Bulk, Direction, Header, OpKind};

#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error(transparent)]
    Blob(#[from] tristore_types::UnpackError),
    #[error("frame truncated: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown direction byte {0}")]
    BadDirection(u8),
    #[error("expected direction {expected:?}, found {found:?}")]
    WrongDirection { expected: Direction, found: Direction },
    #[error("unknown op byte {0}")]
    BadOp(u8),
    #[error("unknown status byte {0}")]
    BadStatus(u8),
    #[error("unknown get-op byte {0}")]
    BadGetOp(u8),
}

type Result<T> = std::result::Result<T, UnpackError>;

/// Deserializes bulk packets from the wire framing. A failure here is how a
/// range server decides to drop a malformed frame.
pub struct Unpacker;

impl Unpacker {
    pub fn request(frame: Bytes) -> Result<BulkRequest> {
        let mut buf = frame;
        let (op, header, count) = unpack_header(&mut buf, Direction::Request)?;
        match op {
            OpKind::Put => {
                let mut bulk: Bulk<PutSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_put_slot(&mut buf)?);
                }
                Ok(BulkRequest::Put(bulk))
            }
            OpKind::Get => {
                let mut bulk: Bulk<GetSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_get_slot(&mut buf)?);
                }
                Ok(BulkRequest::Get(bulk))
            }
            OpKind::GetOp => {
                let mut bulk: Bulk<GetOpSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_getop_slot(&mut buf)?);
                }
                Ok(BulkRequest::GetOp(bulk))
            }
            OpKind::Delete => {
                let mut bulk: Bulk<DeleteSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_delete_slot(&mut buf)?);
                }
                Ok(BulkRequest::Delete(bulk))
            }
            OpKind::Histogram => {
                let mut bulk: Bulk<HistogramSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_histogram_slot(&mut buf)?);
                }
                Ok(BulkRequest::Histogram(bulk))
            }
            OpKind::Sync => Err(UnpackError::BadOp(OpKind::Sync as u8)),
        }
    }

    pub fn response(frame: Bytes) -> Result<BulkResponse> {
        let mut buf = frame;
        let (op, header, count) = unpack_header(&mut buf, Direction::Response)?;
        match op {
            OpKind::Put => {
                let mut bulk: Bulk<PutResponseSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_put_response_slot(&mut buf)?);
                }
                Ok(BulkResponse::Put(bulk))
            }
            OpKind::Get => {
                let mut bulk: Bulk<GetResponseSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_get_response_slot(&mut buf)?);
                }
                Ok(BulkResponse::Get(bulk))
            }
            OpKind::GetOp => {
                let mut bulk: Bulk<GetOpResponseSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_getop_response_slot(&mut buf)?);
                }
                Ok(BulkResponse::GetOp(bulk))
            }
            OpKind::Delete => {
                let mut bulk: Bulk<DeleteResponseSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_delete_response_slot(&mut buf)?);
                }
                Ok(BulkResponse::Delete(bulk))
            }
            OpKind::Histogram => {
                let mut bulk: Bulk<HistogramResponseSlot> = bulk_for(header, count);
                for _ in 0..count {
                    bulk.slots.push(unpack_histogram_response_slot(&mut buf)?);
                }
                Ok(BulkResponse::Histogram(bulk))
            }
            OpKind::Sync => Err(UnpackError::BadOp(OpKind::Sync as u8)),
        }
    }
}

fn bulk_for<S>(header: Header, count: usize) -> Bulk<S> {
    Bulk {
        header,
        max_slots: count,
        slots: Vec::new(),
    }
}

fn unpack_header(buf: &mut Bytes, expected: Direction) -> Result<(OpKind, Header, usize)> {
    let direction_byte = get_u8(buf)?;
    let direction =
        Direction::from_repr(direction_byte).ok_or(UnpackError::BadDirection(direction_byte))?;
    if direction != expected {
        return Err(UnpackError::WrongDirection {
            expected,
            found: direction,
        });
    }
    let op_byte = get_u8(buf)?;
    let op = OpKind::from_repr(op_byte).ok_or(UnpackError::BadOp(op_byte))?;
    let src = get_i32(buf)? as u32;
    let dst = get_i32(buf)? as u32;
    let count = get_u64(buf)? as usize;
    Ok((op, Header::new(src, dst), count))
}

fn unpack_put_slot(buf: &mut Bytes) -> Result<PutSlot> {
    let ds_offset = get_u32(buf)?;
    let subject = Blob::unpack(buf, true)?;
    let subject_addr = get_u64(buf)?;
    let predicate = Blob::unpack(buf, true)?;
    let predicate_addr = get_u64(buf)?;
    let object = Blob::unpack(buf, true)?;
    Ok(PutSlot {
        ds_offset,
        subject,
        subject_addr,
        predicate,
        predicate_addr,
        object,
    })
}

fn unpack_get_slot(buf: &mut Bytes) -> Result<GetSlot> {
    let ds_offset = get_u32(buf)?;
    let subject = Blob::unpack(buf, true)?;
    let subject_addr = get_u64(buf)?;
    let predicate = Blob::unpack(buf, true)?;
    let predicate_addr = get_u64(buf)?;
    let object_type = DataType::from_u8_lossy(get_u8(buf)?);
    Ok(GetSlot {
        ds_offset,
        subject,
        subject_addr,
        predicate,
        predicate_addr,
        object_type,
    })
}

fn unpack_getop_slot(buf: &mut Bytes) -> Result<GetOpSlot> {
    let ds_offset = get_u32(buf)?;
    let op_byte = get_u8(buf)?;
    let op = GetOpCode::from_repr(op_byte).ok_or(UnpackError::BadGetOp(op_byte))?;
    let (subject, predicate) = if op.needs_key() {
        (Blob::unpack(buf, true)?, Blob::unpack(buf, true)?)
    } else {
        (Blob::empty(), Blob::empty())
    };
    let object_type = DataType::from_u8_lossy(get_u8(buf)?);
    let num_recs = get_u64(buf)?;
    Ok(GetOpSlot {
        ds_offset,
        op,
        subject,
        predicate,
        object_type,
        num_recs,
    })
}

fn unpack_delete_slot(buf: &mut Bytes) -> Result<DeleteSlot> {
    let ds_offset = get_u32(buf)?;
    let subject = Blob::unpack(buf, true)?;
    let subject_addr = get_u64(buf)?;
    let predicate = Blob::unpack(buf, true)?;
    let predicate_addr = get_u64(buf)?;
    Ok(DeleteSlot {
        ds_offset,
        subject,
        subject_addr,
        predicate,
        predicate_addr,
    })
}

fn unpack_histogram_slot(buf: &mut Bytes) -> Result<HistogramSlot> {
    let ds_offset = get_u32(buf)?;
    let name = Blob::unpack(buf, false)?;
    Ok(HistogramSlot { ds_offset, name })
}

fn unpack_put_response_slot(buf: &mut Bytes) -> Result<PutResponseSlot> {
    let ds_offset = get_u32(buf)?;
    let status = get_status(buf)?;
    let subject = BlobRef::unpack(buf)?;
    let predicate = BlobRef::unpack(buf)?;
    Ok(PutResponseSlot {
        ds_offset,
        status,
        subject,
        predicate,
    })
}

fn unpack_get_response_slot(buf: &mut Bytes) -> Result<GetResponseSlot> {
    let ds_offset = get_u32(buf)?;
    let status = get_status(buf)?;
    let subject = BlobRef::unpack(buf)?;
    let predicate = BlobRef::unpack(buf)?;
    let object = if status == Status::Success {
        Some(Blob::unpack(buf, true)?)
    } else {
        None
    };
    Ok(GetResponseSlot {
        ds_offset,
        status,
        subject,
        predicate,
        object,
    })
}

fn unpack_getop_response_slot(buf: &mut Bytes) -> Result<GetOpResponseSlot> {
    let ds_offset = get_u32(buf)?;
    let status = get_status(buf)?;
    let num_recs = get_u64(buf)? as usize;
    let mut records = Vec::new();
    for _ in 0..num_recs {
        let subject = Blob::unpack(buf, true)?;
        let predicate = Blob::unpack(buf, true)?;
        let object = Blob::unpack(buf, true)?;
        records.push(GetOpRecord {
            subject,
            predicate,
            object,
        });
    }
    Ok(GetOpResponseSlot {
        ds_offset,
        status,
        records,
    })
}

fn unpack_delete_response_slot(buf: &mut Bytes) -> Result<DeleteResponseSlot> {
    let ds_offset = get_u32(buf)?;
    let status = get_status(buf)?;
    let subject = BlobRef::unpack(buf)?;
    let predicate = BlobRef::unpack(buf)?;
    Ok(DeleteResponseSlot {
        ds_offset,
        status,
        subject,
        predicate,
    })
}

fn unpack_histogram_response_slot(buf: &mut Bytes) -> Result<HistogramResponseSlot> {
    let ds_offset = get_u32(buf)?;
    let status = get_status(buf)?;
    let histogram = if status == Status::Success {
        let len = get_u64(buf)? as usize;
        ensure(buf, len)?;
        Some(buf.copy_to_bytes(len))
    } else {
        None
    };
    Ok(HistogramResponseSlot {
        ds_offset,
        status,
        histogram,
    })
}

fn ensure(buf: &Bytes, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(UnpackError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn get_u8(buf: &mut Bytes) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut Bytes) -> Result<u32> {
    ensure(buf, size_of::<u32>())?;
    Ok(buf.get_u32_le())
}

fn get_i32(buf: &mut Bytes) -> Result<i32> {
    ensure(buf, size_of::<i32>())?;
    Ok(buf.get_i32_le())
}

fn get_u64(buf: &mut Bytes) -> Result<u64> {
    ensure(buf, size_of::<u64>())?;
    Ok(buf.get_u64_le())
}

fn get_status(buf: &mut Bytes) -> Result<Status> {
    let byte = get_u8(buf)?;
    Status::from_repr(byte).ok_or(UnpackError::BadStatus(byte))
}
