// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The datastore adapter: the range-server-side engine that executes bulk
//! operations against one ordered key/value backend.
//!
//! An adapter owns its engine, the per-type transform callbacks, the
//! per-predicate histogram table and an event log of every bulk operation.
//! The owning range server serializes all calls, so nothing in here locks.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, warn};

use tristore_histogram::{Histogram, HistogramError};
use tristore_messages::request::{DeleteSlot, GetOpSlot, GetSlot, HistogramSlot, PutSlot};
use tristore_messages::response::{
    DeleteResponseSlot, GetOpRecord, GetOpResponseSlot, GetResponseSlot, HistogramResponseSlot,
    PutResponseSlot,
};
use tristore_types::{Blob, BlobRef, DataType, DatastoreId, GetOpCode, Status};

pub mod engine;
mod stats;
pub mod transform;
pub mod triplestore;

pub use engine::{BatchOp, Engine, EngineError, MemoryEngine, NullEngine, RocksDbEngine};
pub use stats::{Event, Stats};
pub use transform::{Callbacks, TransformError};
pub use triplestore::{
    append_type, key_to_sp, scan_prefix, sp_to_key, strip_type, CodecError, HISTOGRAM_SUBJECT,
};

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Histogram(#[from] HistogramError),
    #[error("no value stored under the requested key in datastore {0}")]
    NotFound(DatastoreId),
    #[error("scan {op:?} found nothing to seek to in datastore {id}")]
    EmptySeek { id: DatastoreId, op: GetOpCode },
    #[error("subject {HISTOGRAM_SUBJECT:?} is reserved for persisted histograms")]
    ReservedSubject,
}

/// Construction-time parameters of a datastore adapter.
#[derive(Debug, Clone)]
pub struct Config {
    pub rank: u32,
    pub id: DatastoreId,
    pub histograms: tristore_histogram::Config,
    pub transforms: Callbacks,
    /// Histogram names to load back from the engine right after open.
    pub preload_histograms: Vec<Bytes>,
}

impl Config {
    pub fn new(rank: u32, id: DatastoreId) -> Self {
        Self {
            rank,
            id,
            histograms: tristore_histogram::Config::default(),
            transforms: Callbacks::default(),
            preload_histograms: Vec::new(),
        }
    }
}

/// A bulk operation dispatched to one datastore; slices borrow the owning
/// bulk packet.
#[derive(Debug)]
pub enum Operation<'a> {
    Put(&'a [PutSlot]),
    Get(&'a [GetSlot]),
    GetOp(&'a [GetOpSlot]),
    Delete(&'a [DeleteSlot]),
    Histogram(&'a [HistogramSlot]),
    Sync,
}

#[derive(Debug)]
pub enum OperationResponse {
    Put(Vec<PutResponseSlot>),
    Get(Vec<GetResponseSlot>),
    GetOp(Vec<GetOpResponseSlot>),
    Delete(Vec<DeleteResponseSlot>),
    Histogram(Vec<HistogramResponseSlot>),
    Sync(Status),
}

pub struct Datastore {
    rank: u32,
    id: DatastoreId,
    name: String,
    engine: Engine,
    callbacks: Callbacks,
    hist_config: tristore_histogram::Config,
    preload_histograms: Vec<Bytes>,
    hists: HashMap<Bytes, Histogram>,
    stats: Stats,
}

impl Datastore {
    pub fn new(config: Config, engine: Engine) -> Self {
        Self {
            rank: config.rank,
            id: config.id,
            name: String::new(),
            engine,
            callbacks: config.transforms,
            hist_config: config.histograms,
            preload_histograms: config.preload_histograms,
            hists: HashMap::new(),
            stats: Stats::default(),
        }
    }

    pub fn id(&self) -> DatastoreId {
        self.id
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn histogram(&self, name: &[u8]) -> Option<&Histogram> {
        self.hists.get(name)
    }

    /// Created → Usable. A failed open leaves the adapter as it was.
    pub fn open(&mut self, name: &str) -> Result<(), DatastoreError> {
        self.engine.open(name)?;
        self.name = name.to_owned();
        if !self.preload_histograms.is_empty() {
            let names = self.preload_histograms.clone();
            let found = self.read_histograms(&names);
            debug!(
                datastore = %self.id,
                requested = names.len(),
                found,
                "loaded persisted histograms"
            );
        }
        Ok(())
    }

    /// Usable → Closed. Persists the histogram table first so a reopened
    /// datastore can load it back.
    pub fn close(&mut self) {
        if self.engine.usable() {
            let _ = self.write_histograms();
            self.engine.close();
        }
    }

    pub fn usable(&self) -> bool {
        self.engine.usable()
    }

    pub fn sync(&mut self) -> Status {
        match self.engine.sync() {
            Ok(()) => Status::Success,
            Err(error) => {
                warn!(datastore = %self.id, %error, "sync failed");
                Status::Error
            }
        }
    }

    /// Dispatches a bulk operation by kind.
    pub fn operate(&mut self, operation: Operation<'_>) -> OperationResponse {
        match operation {
            Operation::Put(slots) => OperationResponse::Put(self.bput(slots)),
            Operation::Get(slots) => OperationResponse::Get(self.bget(slots)),
            Operation::GetOp(slots) => OperationResponse::GetOp(self.bgetop(slots)),
            Operation::Delete(slots) => OperationResponse::Delete(self.bdelete(slots)),
            Operation::Histogram(slots) => OperationResponse::Histogram(self.bhistogram(slots)),
            Operation::Sync => OperationResponse::Sync(self.sync()),
        }
    }

    /// Bulk store. Slots that encode cleanly go into one engine batch; a
    /// failed batch write stamps every staged slot as an error. Numeric
    /// objects of committed slots feed the per-predicate histograms.
    pub fn bput(&mut self, slots: &[PutSlot]) -> Vec<PutResponseSlot> {
        let start = Instant::now();
        let mut size = 0usize;

        let mut responses = Vec::with_capacity(slots.len());
        let mut batch = Vec::new();
        for slot in slots {
            let status = match self.encode_put(slot) {
                Ok((key, value)) => {
                    size += key.len() + value.len();
                    batch.push(BatchOp::Put { key, value });
                    Status::Unset
                }
                Err(error) => {
                    debug!(datastore = %self.id, %error, "put slot rejected");
                    Status::Error
                }
            };
            responses.push(PutResponseSlot {
                ds_offset: slot.ds_offset,
                status,
                subject: request_ref(&slot.subject, slot.subject_addr),
                predicate: request_ref(&slot.predicate, slot.predicate_addr),
            });
        }

        let committed = match self.engine.write(batch) {
            Ok(()) => Status::Success,
            Err(error) => {
                warn!(datastore = %self.id, %error, "put batch failed");
                Status::Error
            }
        };
        for response in &mut responses {
            if response.status == Status::Unset {
                response.status = committed;
            }
        }

        if committed.is_ok() {
            for (slot, response) in slots.iter().zip(&responses) {
                if response.status.is_ok() {
                    self.record_sample(slot);
                }
            }
        }

        self.stats.puts.push(Event {
            count: slots.len(),
            size,
            start,
            end: Instant::now(),
        });
        responses
    }

    /// Bulk point read. The stored type wins over the requested one; a
    /// mismatch is logged and the discovered type is returned.
    pub fn bget(&mut self, slots: &[GetSlot]) -> Vec<GetResponseSlot> {
        let start = Instant::now();
        let mut size = 0usize;

        let mut responses = Vec::with_capacity(slots.len());
        for slot in slots {
            let (status, object) = match self.read_object(slot, &mut size) {
                Ok(Some(object)) => (Status::Success, Some(object)),
                Ok(None) => (Status::Error, None),
                Err(error) => {
                    debug!(datastore = %self.id, %error, "get slot failed");
                    (Status::Error, None)
                }
            };
            responses.push(GetResponseSlot {
                ds_offset: slot.ds_offset,
                status,
                subject: request_ref(&slot.subject, slot.subject_addr),
                predicate: request_ref(&slot.predicate, slot.predicate_addr),
                object,
            });
        }

        self.stats.gets.push(Event {
            count: slots.len(),
            size,
            start,
            end: Instant::now(),
        });
        responses
    }

    /// Ordered scans. Each slot produces up to `num_recs` rows; any failure
    /// aborts that slot's row emission and leaves its rows empty.
    pub fn bgetop(&mut self, slots: &[GetOpSlot]) -> Vec<GetOpResponseSlot> {
        let mut responses = Vec::with_capacity(slots.len());
        for slot in slots {
            let start = Instant::now();
            let mut size = 0usize;
            let (status, records) = match self.scan(slot, &mut size) {
                Ok(records) => (Status::Success, records),
                Err(error) => {
                    debug!(datastore = %self.id, op = ?slot.op, %error, "scan failed");
                    (Status::Error, Vec::new())
                }
            };
            self.stats.getops.push(Event {
                count: records.len(),
                size,
                start,
                end: Instant::now(),
            });
            responses.push(GetOpResponseSlot {
                ds_offset: slot.ds_offset,
                status,
                records,
            });
        }
        responses
    }

    /// Bulk delete. Deleting an absent key is success; only a failed batch
    /// commit (or a slot that fails to encode) reports an error.
    pub fn bdelete(&mut self, slots: &[DeleteSlot]) -> Vec<DeleteResponseSlot> {
        let start = Instant::now();
        let mut size = 0usize;

        let mut responses = Vec::with_capacity(slots.len());
        let mut batch = Vec::new();
        for slot in slots {
            let status = match self.encode_key(&slot.subject, &slot.predicate) {
                Ok(key) => {
                    size += key.len();
                    batch.push(BatchOp::Delete { key });
                    Status::Unset
                }
                Err(error) => {
                    debug!(datastore = %self.id, %error, "delete slot rejected");
                    Status::Error
                }
            };
            responses.push(DeleteResponseSlot {
                ds_offset: slot.ds_offset,
                status,
                subject: request_ref(&slot.subject, slot.subject_addr),
                predicate: request_ref(&slot.predicate, slot.predicate_addr),
            });
        }

        let committed = match self.engine.write(batch) {
            Ok(()) => Status::Success,
            Err(error) => {
                warn!(datastore = %self.id, %error, "delete batch failed");
                Status::Error
            }
        };
        for response in &mut responses {
            if response.status == Status::Unset {
                response.status = committed;
            }
        }

        self.stats.deletes.push(Event {
            count: slots.len(),
            size,
            start,
            end: Instant::now(),
        });
        responses
    }

    /// Serves the in-memory histogram table by name.
    pub fn bhistogram(&mut self, slots: &[HistogramSlot]) -> Vec<HistogramResponseSlot> {
        slots
            .iter()
            .map(|slot| match self.hists.get(slot.name.data()) {
                Some(hist) => HistogramResponseSlot {
                    ds_offset: slot.ds_offset,
                    status: Status::Success,
                    histogram: Some(hist.packed()),
                },
                None => HistogramResponseSlot {
                    ds_offset: slot.ds_offset,
                    status: Status::Error,
                    histogram: None,
                },
            })
            .collect()
    }

    /// Persists every histogram under the reserved subject, one key per
    /// name. Buckets are finalized first so short runs persist a usable
    /// shape.
    pub fn write_histograms(&mut self) -> Status {
        let mut batch = Vec::with_capacity(self.hists.len());
        for hist in self.hists.values_mut() {
            if let Err(error) = hist.finalize() {
                warn!(datastore = %self.id, %error, "histogram finalize failed");
                return Status::Error;
            }
            let key = sp_to_key(
                &Blob::new(Bytes::from_static(HISTOGRAM_SUBJECT), DataType::Byte),
                &Blob::new(hist.name().clone(), DataType::Byte),
            );
            batch.push(BatchOp::Put {
                key,
                value: hist.packed(),
            });
        }
        match self.engine.write(batch) {
            Ok(()) => Status::Success,
            Err(error) => {
                warn!(datastore = %self.id, %error, "histogram write failed");
                Status::Error
            }
        }
    }

    /// Loads back the named histograms, overwriting in-memory instances.
    /// Absent names are silently skipped; returns how many were found.
    pub fn read_histograms(&mut self, names: &[Bytes]) -> usize {
        let mut found = 0;
        for name in names {
            let key = sp_to_key(
                &Blob::new(Bytes::from_static(HISTOGRAM_SUBJECT), DataType::Byte),
                &Blob::new(name.clone(), DataType::Byte),
            );
            let packed = match self.engine.get(&key) {
                Ok(Some(packed)) => packed,
                Ok(None) => continue,
                Err(error) => {
                    warn!(datastore = %self.id, %error, "histogram read failed");
                    continue;
                }
            };
            let mut buf = packed;
            match Histogram::unpack(&mut buf, &self.hist_config) {
                Ok(hist) => {
                    self.hists.insert(name.clone(), hist);
                    found += 1;
                }
                Err(error) => {
                    warn!(datastore = %self.id, %error, "persisted histogram is malformed");
                }
            }
        }
        found
    }

    fn encode_key(&self, subject: &Blob, predicate: &Blob) -> Result<Bytes, DatastoreError> {
        if subject.data() == HISTOGRAM_SUBJECT {
            return Err(DatastoreError::ReservedSubject);
        }
        let subject_bytes = self.callbacks.encode(subject)?;
        let predicate_bytes = self.callbacks.encode(predicate)?;
        Ok(sp_to_key(
            &Blob::new(subject_bytes, subject.data_type()),
            &Blob::new(predicate_bytes, predicate.data_type()),
        ))
    }

    fn encode_put(&self, slot: &PutSlot) -> Result<(Bytes, Bytes), DatastoreError> {
        let key = self.encode_key(&slot.subject, &slot.predicate)?;
        let object_bytes = self.callbacks.encode(&slot.object)?;
        let value = append_type(&object_bytes, slot.object.data_type());
        Ok((key, value))
    }

    fn read_object(
        &self,
        slot: &GetSlot,
        size: &mut usize,
    ) -> Result<Option<Blob>, DatastoreError> {
        let key = self.encode_key(&slot.subject, &slot.predicate)?;
        let Some(value) = self.engine.get(&key)? else {
            return Ok(None);
        };
        *size += key.len() + value.len();

        let (object_bytes, discovered) = strip_type(&value)?;
        if discovered != slot.object_type {
            warn!(
                datastore = %self.id,
                requested = ?slot.object_type,
                stored = ?discovered,
                "stored object type does not match the requested type; using the stored type"
            );
        }
        let decoded = self.callbacks.decode(discovered, &object_bytes)?;
        Ok(Some(Blob::new(decoded, discovered)))
    }

    fn scan(&self, slot: &GetOpSlot, size: &mut usize) -> Result<Vec<GetOpRecord>, DatastoreError> {
        if slot.op == GetOpCode::Eq {
            let key = self.encode_key(&slot.subject, &slot.predicate)?;
            let Some(value) = self.engine.get(&key)? else {
                return Err(DatastoreError::NotFound(self.id));
            };
            *size += key.len() + value.len();
            let record = self.scan_record(&Bytes::copy_from_slice(&key), &value, slot)?;
            return Ok(vec![record]);
        }

        let mut prefix_bound: Option<Bytes> = None;
        let mut iter = self.engine.iter()?;
        let forward = match slot.op {
            GetOpCode::Next => {
                let key = self.encode_key(&slot.subject, &slot.predicate)?;
                iter.seek(&key);
                true
            }
            GetOpCode::Prev => {
                let key = self.encode_key(&slot.subject, &slot.predicate)?;
                iter.seek_for_prev(&key);
                false
            }
            GetOpCode::First => {
                iter.seek_to_first();
                true
            }
            GetOpCode::Last => {
                iter.seek_to_last();
                false
            }
            GetOpCode::Lowest => {
                let prefix = self.encoded_prefix(slot)?;
                iter.seek(&prefix);
                prefix_bound = Some(prefix);
                true
            }
            GetOpCode::Highest => {
                let prefix = self.encoded_prefix(slot)?;
                match prefix_successor(&prefix) {
                    Some(upper) => {
                        // the successor is guaranteed past every prefixed key
                        iter.seek(&upper);
                        if iter.valid() {
                            iter.prev();
                        } else {
                            iter.seek_to_last();
                        }
                    }
                    None => iter.seek_to_last(),
                }
                prefix_bound = Some(prefix);
                false
            }
            GetOpCode::Eq => unreachable!("handled above"),
        };

        if !iter.valid() {
            iter.status()?;
            return Err(DatastoreError::EmptySeek {
                id: self.id,
                op: slot.op,
            });
        }

        let mut records = Vec::new();
        while records.len() < slot.num_recs as usize && iter.valid() {
            let Some(raw_key) = iter.key() else {
                break;
            };
            if let Some(prefix) = &prefix_bound {
                if !raw_key.starts_with(prefix) {
                    break;
                }
            }
            let key = Bytes::copy_from_slice(raw_key);
            let value = iter.value().unwrap_or_default().to_vec();

            if is_reserved_key(&key) {
                // persisted histograms never surface through scans
                step(&mut iter, forward);
                continue;
            }

            *size += key.len() + value.len();
            records.push(self.scan_record(&key, &value, slot)?);
            step(&mut iter, forward);
        }
        iter.status()?;
        Ok(records)
    }

    fn scan_record(
        &self,
        key: &Bytes,
        value: &[u8],
        slot: &GetOpSlot,
    ) -> Result<GetOpRecord, DatastoreError> {
        let (subject_enc, predicate_enc) = key_to_sp(key, false)?;
        let subject_bytes = self
            .callbacks
            .decode(subject_enc.data_type(), subject_enc.data())?;
        let predicate_bytes = self
            .callbacks
            .decode(predicate_enc.data_type(), predicate_enc.data())?;

        let (object_bytes, discovered) = strip_type(value)?;
        if discovered != slot.object_type {
            warn!(
                datastore = %self.id,
                requested = ?slot.object_type,
                stored = ?discovered,
                "stored object type does not match the requested type; using the stored type"
            );
        }
        let object_decoded = self.callbacks.decode(discovered, &object_bytes)?;

        Ok(GetOpRecord {
            subject: Blob::new(subject_bytes, subject_enc.data_type()),
            predicate: Blob::new(predicate_bytes, predicate_enc.data_type()),
            object: Blob::new(object_decoded, discovered),
        })
    }

    fn encoded_prefix(&self, slot: &GetOpSlot) -> Result<Bytes, DatastoreError> {
        let subject_bytes = self.callbacks.encode(&slot.subject)?;
        let predicate_bytes = self.callbacks.encode(&slot.predicate)?;
        Ok(scan_prefix(&subject_bytes, &predicate_bytes))
    }

    /// Feeds a committed numeric object into the histogram named by the
    /// predicate bytes, creating it on first use.
    fn record_sample(&mut self, slot: &PutSlot) {
        if !slot.object.data_type().is_histogrammed() {
            return;
        }
        let Some(value) = numeric_value(&slot.object) else {
            return;
        };
        let name = slot.predicate.bytes().clone();
        let hist = self
            .hists
            .entry(name.clone())
            .or_insert_with(|| Histogram::new(name, &self.hist_config));
        if let Err(error) = hist.insert(value) {
            warn!(datastore = %self.id, %error, "histogram insert failed");
        }
    }
}

impl Drop for Datastore {
    fn drop(&mut self) {
        self.close();
    }
}

fn request_ref(blob: &Blob, addr: u64) -> BlobRef {
    BlobRef {
        addr,
        len: blob.len() as u64,
        data_type: blob.data_type(),
    }
}

fn numeric_value(object: &Blob) -> Option<f64> {
    match object.data_type() {
        DataType::Float32 => object
            .data()
            .try_into()
            .ok()
            .map(|raw| f32::from_le_bytes(raw) as f64),
        DataType::Float64 => object.data().try_into().ok().map(f64::from_le_bytes),
        _ => None,
    }
}

fn is_reserved_key(key: &Bytes) -> bool {
    match key_to_sp(key, false) {
        Ok((subject, _)) => subject.data() == HISTOGRAM_SUBJECT,
        Err(_) => false,
    }
}

fn step(iter: &mut engine::EngineIter<'_>, forward: bool) {
    if forward {
        iter.next();
    } else {
        iter.prev();
    }
}

/// The smallest byte string strictly greater than every string starting
/// with `prefix`, if one exists.
fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let mut out = prefix.to_vec();
    loop {
        match out.last().copied() {
            None => return None,
            Some(u8::MAX) => {
                out.pop();
            }
            Some(byte) => {
                *out.last_mut().expect("just checked") = byte + 1;
                return Some(Bytes::from(out));
            }
        }
    }
}
