// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::mem::size_of;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::DataType;

/// A byte buffer tagged with a [`DataType`].
///
/// Backed by [`Bytes`], so a cloned `Blob` is a *reference* to the same
/// underlying storage (same base pointer, no copy) while
/// [`Blob::copy_from`] and [`Blob::unpack`] always produce freshly owned
/// storage. [`Blob::take`] transfers the buffer out and leaves the source
/// empty.
#[derive(Clone, Default)]
pub struct Blob {
    data: Bytes,
    data_type: DataType,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>, data_type: DataType) -> Self {
        Self {
            data: data.into(),
            data_type,
        }
    }

    /// An owning blob holding a copy of `data`.
    pub fn copy_from(data: &[u8], data_type: DataType) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            data_type,
        }
    }

    pub const fn empty() -> Self {
        Self {
            data: Bytes::new(),
            data_type: DataType::Invalid,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base address of the buffer. Only meaningful for pointer-identity
    /// checks and for the in-process `*_ref` framing; never dereferenced
    /// after crossing a transport.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Moves the buffer out, leaving this blob empty and untyped.
    pub fn take(&mut self) -> Blob {
        std::mem::take(self)
    }

    pub fn from_i32(value: i32) -> Self {
        Self::copy_from(&value.to_le_bytes(), DataType::Int32)
    }

    pub fn from_i64(value: i64) -> Self {
        Self::copy_from(&value.to_le_bytes(), DataType::Int64)
    }

    pub fn from_size(value: u64) -> Self {
        Self::copy_from(&value.to_le_bytes(), DataType::Size)
    }

    pub fn from_f32(value: f32) -> Self {
        Self::copy_from(&value.to_le_bytes(), DataType::Float32)
    }

    pub fn from_f64(value: f64) -> Self {
        Self::copy_from(&value.to_le_bytes(), DataType::Float64)
    }

    pub fn as_i32(&self) -> Option<i32> {
        if self.data_type != DataType::Int32 {
            return None;
        }
        Some(i32::from_le_bytes(self.data.as_ref().try_into().ok()?))
    }

    pub fn as_i64(&self) -> Option<i64> {
        if self.data_type != DataType::Int64 {
            return None;
        }
        Some(i64::from_le_bytes(self.data.as_ref().try_into().ok()?))
    }

    pub fn as_size(&self) -> Option<u64> {
        if self.data_type != DataType::Size {
            return None;
        }
        Some(u64::from_le_bytes(self.data.as_ref().try_into().ok()?))
    }

    pub fn as_f32(&self) -> Option<f32> {
        if self.data_type != DataType::Float32 {
            return None;
        }
        Some(f32::from_le_bytes(self.data.as_ref().try_into().ok()?))
    }

    pub fn as_f64(&self) -> Option<f64> {
        if self.data_type != DataType::Float64 {
            return None;
        }
        Some(f64::from_le_bytes(self.data.as_ref().try_into().ok()?))
    }

    pub const fn pack_size(len: usize, include_type: bool) -> usize {
        size_of::<u64>() + len + include_type as usize
    }

    pub fn packed_len(&self, include_type: bool) -> usize {
        Self::pack_size(self.data.len(), include_type)
    }

    /// `u64 len ‖ bytes [‖ u8 type]`, integers little-endian.
    pub fn pack(&self, buf: &mut BytesMut, include_type: bool) {
        buf.reserve(self.packed_len(include_type));
        buf.put_u64_le(self.data.len() as u64);
        buf.put_slice(&self.data);
        if include_type {
            buf.put_u8(self.data_type.as_u8());
        }
    }

    /// Inverse of [`Blob::pack`]; always allocates owning storage.
    pub fn unpack(buf: &mut impl Buf, include_type: bool) -> Result<Blob, UnpackError> {
        let len = get_u64_le(buf)? as usize;
        if buf.remaining() < len {
            return Err(UnpackError::Truncated {
                needed: len,
                remaining: buf.remaining(),
            });
        }
        let data = buf.copy_to_bytes(len);
        let data_type = if include_type {
            DataType::from_u8_lossy(get_u8(buf)?)
        } else {
            DataType::Byte
        };
        Ok(Blob { data, data_type })
    }

    /// Serializes the buffer's address instead of its contents:
    /// `u64 addr ‖ u64 len ‖ u8 type`. Used for echoing the originating
    /// request buffers back through in-process responses.
    pub fn pack_ref(&self, buf: &mut BytesMut) {
        BlobRef::of(self).pack(buf);
    }

    pub fn unpack_ref(buf: &mut impl Buf) -> Result<BlobRef, UnpackError> {
        BlobRef::unpack(buf)
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        if self.data_type != other.data_type || self.data.len() != other.data.len() {
            return false;
        }
        // same backing buffer short-circuits the memcmp
        if self.data.as_ptr() == other.data.as_ptr() {
            return true;
        }
        self.data == other.data
    }
}

impl Eq for Blob {}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("type", &self.data_type)
            .field("len", &self.data.len())
            .field("data", &String::from_utf8_lossy(&self.data))
            .finish()
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.data_type.into();
        write!(f, "{} [{} bytes] {}", name, self.len(), String::from_utf8_lossy(&self.data))
    }
}

impl From<&'static str> for Blob {
    fn from(value: &'static str) -> Self {
        Blob::new(Bytes::from_static(value.as_bytes()), DataType::Byte)
    }
}

impl From<Vec<u8>> for Blob {
    fn from(value: Vec<u8>) -> Self {
        Blob::new(value, DataType::Byte)
    }
}

/// The serialized form of a reference to a blob living in another owner's
/// memory. The address is an opaque correlation token once it has crossed a
/// transport; responses are matched to request slots positionally and the
/// token is only checked, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRef {
    pub addr: u64,
    pub len: u64,
    pub data_type: DataType,
}

impl BlobRef {
    pub const SERIALIZED_LENGTH: usize = 2 * size_of::<u64>() + 1;

    pub fn of(blob: &Blob) -> Self {
        Self {
            addr: blob.as_ptr() as u64,
            len: blob.len() as u64,
            data_type: blob.data_type(),
        }
    }

    /// Whether `blob` is plausibly the buffer this reference was taken from.
    pub fn matches(&self, blob: &Blob) -> bool {
        self.len == blob.len() as u64 && self.data_type == blob.data_type()
    }

    pub fn pack(&self, buf: &mut BytesMut) {
        buf.reserve(Self::SERIALIZED_LENGTH);
        buf.put_u64_le(self.addr);
        buf.put_u64_le(self.len);
        buf.put_u8(self.data_type.as_u8());
    }

    pub fn unpack(buf: &mut impl Buf) -> Result<Self, UnpackError> {
        let addr = get_u64_le(buf)?;
        let len = get_u64_le(buf)?;
        let data_type = DataType::from_u8_lossy(get_u8(buf)?);
        Ok(Self {
            addr,
            len,
            data_type,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnpackError {
    #[error("buffer truncated: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
}

pub(crate) fn get_u8(buf: &mut impl Buf) -> Result<u8, UnpackError> {
    if buf.remaining() < 1 {
        return Err(UnpackError::Truncated {
            needed: 1,
            remaining: 0,
        });
    }
    Ok(buf.get_u8())
}

pub(crate) fn get_u64_le(buf: &mut impl Buf) -> Result<u64, UnpackError> {
    if buf.remaining() < size_of::<u64>() {
        return Err(UnpackError::Truncated {
            needed: size_of::<u64>(),
            remaining: buf.remaining(),
        });
    }
    Ok(buf.get_u64_le())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_with_type() {
        let blob = Blob::copy_from(b"object0", DataType::Byte);
        let mut buf = BytesMut::new();
        blob.pack(&mut buf, true);
        assert_eq!(buf.len(), blob.packed_len(true));

        let mut frame = buf.freeze();
        let restored = Blob::unpack(&mut frame, true).unwrap();
        assert_eq!(restored, blob);
        assert_eq!(restored.data_type(), DataType::Byte);
        // unpack allocates its own storage
        assert_ne!(restored.as_ptr(), blob.as_ptr());
    }

    #[test]
    fn pack_unpack_without_type() {
        let blob = Blob::copy_from(&42i64.to_le_bytes(), DataType::Int64);
        let mut buf = BytesMut::new();
        blob.pack(&mut buf, false);

        let mut frame = buf.freeze();
        let restored = Blob::unpack(&mut frame, false).unwrap();
        assert_eq!(restored.data(), blob.data());
        assert_eq!(restored.data_type(), DataType::Byte);
    }

    #[test]
    fn unpack_truncated() {
        let blob = Blob::copy_from(b"subject", DataType::Byte);
        let mut buf = BytesMut::new();
        blob.pack(&mut buf, true);

        let mut frame = buf.freeze().slice(..4);
        assert!(matches!(
            Blob::unpack(&mut frame, true),
            Err(UnpackError::Truncated { .. })
        ));
    }

    #[test]
    fn clone_references_same_bytes() {
        let blob = Blob::copy_from(b"shared", DataType::Byte);
        let copy = blob.clone();
        assert_eq!(copy.as_ptr(), blob.as_ptr());
        assert_eq!(copy, blob);
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut blob = Blob::copy_from(b"moved", DataType::Byte);
        let taken = blob.take();
        assert_eq!(taken.data(), b"moved");
        assert!(blob.is_empty());
        assert_eq!(blob.data_type(), DataType::Invalid);
    }

    #[test]
    fn equality_ignores_ownership() {
        let owned = Blob::copy_from(b"same", DataType::Byte);
        let other = Blob::copy_from(b"same", DataType::Byte);
        assert_eq!(owned, other);

        let typed = Blob::copy_from(b"same", DataType::Int32);
        assert_ne!(owned, typed);
    }

    #[test]
    fn typed_constructors_round_trip() {
        assert_eq!(Blob::from_i32(-7).as_i32(), Some(-7));
        assert_eq!(Blob::from_i64(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(Blob::from_size(99).as_size(), Some(99));
        assert_eq!(Blob::from_f32(2.5).as_f32(), Some(2.5));
        assert_eq!(Blob::from_f64(-0.125).as_f64(), Some(-0.125));

        // the accessor checks the tag, not just the width
        assert_eq!(Blob::from_f64(1.0).as_i64(), None);
        assert_eq!(Blob::from("text").as_i32(), None);
    }

    #[test]
    fn blob_ref_round_trip() {
        let blob = Blob::copy_from(b"origin", DataType::Byte);
        let mut buf = BytesMut::new();
        blob.pack_ref(&mut buf);
        assert_eq!(buf.len(), BlobRef::SERIALIZED_LENGTH);

        let mut frame = buf.freeze();
        let reference = Blob::unpack_ref(&mut frame).unwrap();
        assert_eq!(reference.addr, blob.as_ptr() as u64);
        assert!(reference.matches(&blob));
    }
}
