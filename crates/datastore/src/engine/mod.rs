// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The ordered byte-keyed engines a datastore can sit on.
//!
//! The closed set of backends is chosen at open time: the persistent
//! log-structured store (RocksDB), the in-memory ordered map, and the null
//! engine that stores nothing. All of them expose the same point-read,
//! batched-write and bidirectional-iterator surface.

use bytes::Bytes;

mod memory;
mod rocks;

pub use memory::{MemoryEngine, MemoryIter};
pub use rocks::RocksDbEngine;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not open")]
    NotOpen,
    #[error(transparent)]
    RocksDb(#[from] rocksdb::Error),
}

/// One entry of a batched write. The batch commits atomically on the
/// persistent engine.
#[derive(Debug)]
pub enum BatchOp {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

#[derive(Debug)]
pub enum Engine {
    RocksDb(RocksDbEngine),
    Memory(MemoryEngine),
    Null(NullEngine),
}

impl Engine {
    pub fn open(&mut self, name: &str) -> Result<(), EngineError> {
        match self {
            Engine::RocksDb(engine) => engine.open(name),
            Engine::Memory(engine) => engine.open(),
            Engine::Null(engine) => engine.open(),
        }
    }

    pub fn close(&mut self) {
        match self {
            Engine::RocksDb(engine) => engine.close(),
            Engine::Memory(engine) => engine.close(),
            Engine::Null(engine) => engine.close(),
        }
    }

    pub fn usable(&self) -> bool {
        match self {
            Engine::RocksDb(engine) => engine.usable(),
            Engine::Memory(engine) => engine.usable(),
            Engine::Null(engine) => engine.usable(),
        }
    }

    pub fn sync(&mut self) -> Result<(), EngineError> {
        match self {
            Engine::RocksDb(engine) => engine.sync(),
            Engine::Memory(_) | Engine::Null(_) => Ok(()),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, EngineError> {
        match self {
            Engine::RocksDb(engine) => engine.get(key),
            Engine::Memory(engine) => engine.get(key),
            Engine::Null(engine) => engine.get(key),
        }
    }

    pub fn write(&mut self, batch: Vec<BatchOp>) -> Result<(), EngineError> {
        match self {
            Engine::RocksDb(engine) => engine.write(batch),
            Engine::Memory(engine) => engine.write(batch),
            Engine::Null(engine) => engine.write(batch),
        }
    }

    pub fn iter(&self) -> Result<EngineIter<'_>, EngineError> {
        match self {
            Engine::RocksDb(engine) => Ok(EngineIter::RocksDb(engine.iter()?)),
            Engine::Memory(engine) => Ok(EngineIter::Memory(engine.iter()?)),
            Engine::Null(engine) => {
                if !engine.usable() {
                    return Err(EngineError::NotOpen);
                }
                Ok(EngineIter::Null)
            }
        }
    }
}

/// A bidirectional cursor over an engine's ordered key space, modelled on
/// the raw RocksDB iterator: position with one of the seeks, then step with
/// `next`/`prev` while `valid`.
pub enum EngineIter<'a> {
    RocksDb(rocksdb::DBRawIterator<'a>),
    Memory(MemoryIter<'a>),
    Null,
}

impl EngineIter<'_> {
    /// Positions at the first key at or after `key`.
    pub fn seek(&mut self, key: &[u8]) {
        match self {
            EngineIter::RocksDb(iter) => iter.seek(key),
            EngineIter::Memory(iter) => iter.seek(key),
            EngineIter::Null => {}
        }
    }

    /// Positions at the last key at or before `key`.
    pub fn seek_for_prev(&mut self, key: &[u8]) {
        match self {
            EngineIter::RocksDb(iter) => iter.seek_for_prev(key),
            EngineIter::Memory(iter) => iter.seek_for_prev(key),
            EngineIter::Null => {}
        }
    }

    pub fn seek_to_first(&mut self) {
        match self {
            EngineIter::RocksDb(iter) => iter.seek_to_first(),
            EngineIter::Memory(iter) => iter.seek_to_first(),
            EngineIter::Null => {}
        }
    }

    pub fn seek_to_last(&mut self) {
        match self {
            EngineIter::RocksDb(iter) => iter.seek_to_last(),
            EngineIter::Memory(iter) => iter.seek_to_last(),
            EngineIter::Null => {}
        }
    }

    pub fn next(&mut self) {
        match self {
            EngineIter::RocksDb(iter) => iter.next(),
            EngineIter::Memory(iter) => iter.next(),
            EngineIter::Null => {}
        }
    }

    pub fn prev(&mut self) {
        match self {
            EngineIter::RocksDb(iter) => iter.prev(),
            EngineIter::Memory(iter) => iter.prev(),
            EngineIter::Null => {}
        }
    }

    pub fn valid(&self) -> bool {
        match self {
            EngineIter::RocksDb(iter) => iter.valid(),
            EngineIter::Memory(iter) => iter.valid(),
            EngineIter::Null => false,
        }
    }

    pub fn key(&self) -> Option<&[u8]> {
        match self {
            EngineIter::RocksDb(iter) => iter.key(),
            EngineIter::Memory(iter) => iter.key(),
            EngineIter::Null => None,
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        match self {
            EngineIter::RocksDb(iter) => iter.value(),
            EngineIter::Memory(iter) => iter.value(),
            EngineIter::Null => None,
        }
    }

    pub fn status(&self) -> Result<(), EngineError> {
        match self {
            EngineIter::RocksDb(iter) => iter.status().map_err(EngineError::from),
            EngineIter::Memory(_) | EngineIter::Null => Ok(()),
        }
    }
}

/// Accepts every write and stores nothing; every read misses.
#[derive(Debug, Default)]
pub struct NullEngine {
    open: bool,
}

impl NullEngine {
    pub fn open(&mut self) -> Result<(), EngineError> {
        self.open = true;
        Ok(())
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn usable(&self) -> bool {
        self.open
    }

    pub fn get(&self, _key: &[u8]) -> Result<Option<Bytes>, EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        Ok(None)
    }

    pub fn write(&mut self, _batch: Vec<BatchOp>) -> Result<(), EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        Ok(())
    }
}
