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
use rocksdb::{BlockBasedOptions, DBRawIterator, WriteBatch, WriteOptions, DB};
use tracing::debug;

use super::{BatchOp, EngineError};

/// The persistent log-structured engine.
///
/// One flat key space per datastore; the default column family is enough
/// since keys carry their own trailer instead of a table prefix.
#[derive(Debug, Default)]
pub struct RocksDbEngine {
    create_if_missing: bool,
    name: String,
    db: Option<DB>,
}

impl RocksDbEngine {
    pub fn new(create_if_missing: bool) -> Self {
        Self {
            create_if_missing,
            name: String::new(),
            db: None,
        }
    }

    pub fn open(&mut self, name: &str) -> Result<(), EngineError> {
        let db = DB::open(&db_options(self.create_if_missing), name)?;
        self.name = name.to_owned();
        self.db = Some(db);
        debug!(name, "opened rocksdb datastore");
        Ok(())
    }

    pub fn close(&mut self) {
        self.db = None;
    }

    pub fn usable(&self) -> bool {
        self.db.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn db(&self) -> Result<&DB, EngineError> {
        self.db.as_ref().ok_or(EngineError::NotOpen)
    }

    /// An empty synchronous write forces everything queued in front of it
    /// onto disc.
    pub fn sync(&mut self) -> Result<(), EngineError> {
        let mut options = WriteOptions::default();
        options.set_sync(true);
        self.db()?.write_opt(WriteBatch::default(), &options)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, EngineError> {
        let value = self.db()?.get_pinned(key)?;
        Ok(value.map(|pinned| Bytes::copy_from_slice(&pinned)))
    }

    pub fn write(&mut self, ops: Vec<BatchOp>) -> Result<(), EngineError> {
        let db = self.db()?;
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.put(key, value),
                BatchOp::Delete { key } => batch.delete(key),
            }
        }
        db.write(batch)?;
        Ok(())
    }

    pub fn iter(&self) -> Result<DBRawIterator<'_>, EngineError> {
        Ok(self.db()?.raw_iterator())
    }
}

fn db_options(create_if_missing: bool) -> rocksdb::Options {
    let mut options = rocksdb::Options::default();
    options.create_if_missing(create_if_missing);
    // Point reads always carry the complete subject+predicate key, so
    // whole-key bloom filters apply. Scans seek in total order across the
    // flat key space; no prefix extractor is configured.
    let mut block_options = BlockBasedOptions::default();
    block_options.set_bloom_filter(10.0, false);
    options.set_block_based_table_factory(&block_options);
    options
}
