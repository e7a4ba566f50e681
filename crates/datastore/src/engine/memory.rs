// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;

use super::{BatchOp, EngineError};

/// The in-memory ordered engine: a plain `BTreeMap` over raw keys. Contents
/// do not survive a close.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    open: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) -> Result<(), EngineError> {
        self.map.clear();
        self.open = true;
        Ok(())
    }

    pub fn close(&mut self) {
        self.open = false;
        self.map.clear();
    }

    pub fn usable(&self) -> bool {
        self.open
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        Ok(self.map.get(key).map(|value| Bytes::copy_from_slice(value)))
    }

    pub fn write(&mut self, batch: Vec<BatchOp>) -> Result<(), EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        for op in batch {
            match op {
                BatchOp::Put { key, value } => {
                    self.map.insert(key.to_vec(), value.to_vec());
                }
                BatchOp::Delete { key } => {
                    self.map.remove(key.as_ref());
                }
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> Result<MemoryIter<'_>, EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        Ok(MemoryIter {
            map: &self.map,
            current: None,
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Cursor over the in-memory map, mirroring the raw RocksDB iterator
/// contract: stepping off either end invalidates the cursor.
pub struct MemoryIter<'a> {
    map: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    current: Option<(&'a Vec<u8>, &'a Vec<u8>)>,
}

impl<'a> MemoryIter<'a> {
    pub fn seek(&mut self, key: &[u8]) {
        self.current = self
            .map
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next();
    }

    pub fn seek_for_prev(&mut self, key: &[u8]) {
        self.current = self
            .map
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back();
    }

    pub fn seek_to_first(&mut self) {
        self.current = self.map.iter().next();
    }

    pub fn seek_to_last(&mut self) {
        self.current = self.map.iter().next_back();
    }

    pub fn next(&mut self) {
        self.current = self.current.take().and_then(|(key, _)| {
            self.map
                .range::<[u8], _>((Bound::Excluded(key.as_slice()), Bound::Unbounded))
                .next()
        });
    }

    pub fn prev(&mut self) {
        self.current = self.current.take().and_then(|(key, _)| {
            self.map
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key.as_slice())))
                .next_back()
        });
    }

    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.map(|(key, _)| key.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.map(|(_, value)| value.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(keys: &[&[u8]]) -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        engine.open().unwrap();
        let batch = keys
            .iter()
            .map(|key| BatchOp::Put {
                key: Bytes::copy_from_slice(key),
                value: Bytes::from_static(b"v"),
            })
            .collect();
        engine.write(batch).unwrap();
        engine
    }

    #[test]
    fn seek_lands_on_first_key_at_or_after() {
        let engine = engine_with(&[b"b", b"d", b"f"]);
        let mut iter = engine.iter().unwrap();

        iter.seek(b"d");
        assert_eq!(iter.key(), Some(&b"d"[..]));
        iter.seek(b"c");
        assert_eq!(iter.key(), Some(&b"d"[..]));
        iter.seek(b"g");
        assert!(!iter.valid());
    }

    #[test]
    fn seek_for_prev_lands_on_last_key_at_or_before() {
        let engine = engine_with(&[b"b", b"d", b"f"]);
        let mut iter = engine.iter().unwrap();

        iter.seek_for_prev(b"d");
        assert_eq!(iter.key(), Some(&b"d"[..]));
        iter.seek_for_prev(b"e");
        assert_eq!(iter.key(), Some(&b"d"[..]));
        iter.seek_for_prev(b"a");
        assert!(!iter.valid());
    }

    #[test]
    fn stepping_walks_in_both_directions() {
        let engine = engine_with(&[b"b", b"d", b"f"]);
        let mut iter = engine.iter().unwrap();

        iter.seek_to_first();
        assert_eq!(iter.key(), Some(&b"b"[..]));
        iter.next();
        assert_eq!(iter.key(), Some(&b"d"[..]));
        iter.prev();
        assert_eq!(iter.key(), Some(&b"b"[..]));
        iter.prev();
        assert!(!iter.valid());

        iter.seek_to_last();
        assert_eq!(iter.key(), Some(&b"f"[..]));
        iter.next();
        assert!(!iter.valid());
    }

    #[test]
    fn deletes_remove_keys() {
        let mut engine = engine_with(&[b"b", b"d"]);
        engine
            .write(vec![BatchOp::Delete {
                key: Bytes::from_static(b"b"),
            }])
            .unwrap();
        assert!(engine.get(b"b").unwrap().is_none());
        assert!(engine.get(b"d").unwrap().is_some());
        // deleting a missing key is not an error
        engine
            .write(vec![BatchOp::Delete {
                key: Bytes::from_static(b"zz"),
            }])
            .unwrap();
    }

    #[test]
    fn close_discards_contents() {
        let mut engine = engine_with(&[b"b"]);
        engine.close();
        assert!(!engine.usable());
        engine.open().unwrap();
        assert!(engine.get(b"b").unwrap().is_none());
    }
}
