// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Per-datastore numeric histograms with deferred bucket generation.
//!
//! A histogram caches its first `first_n` values; once the cache fills (or
//! [`Histogram::finalize`] fires) a pluggable [`BucketGenerator`] turns the
//! cache into left-edge buckets and the cache is drained into the counts.
//! Buckets are left edges: a value lands in the bucket with the largest edge
//! at or below it, the last bucket is unbounded above, and values below the
//! first edge are dropped into a separate (non-persisted) counter.

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

mod generator;

pub use generator::{builtin, log2, log10, uniform, Fixed, Logarithmic, Uniform};

/// Produces the left edges of the buckets from the cached first values.
///
/// The returned edges must be strictly increasing and non-empty; the
/// histogram checks both and refuses the generation otherwise.
pub trait BucketGenerator: Send + Sync {
    fn generate(&self, cache: &[f64]) -> Vec<f64>;
}

/// Bucketing parameters shared by every histogram of a datastore.
#[derive(Clone)]
pub struct Config {
    pub first_n: usize,
    pub generator: Arc<dyn BucketGenerator>,
}

impl Config {
    pub fn new(first_n: usize, generator: Arc<dyn BucketGenerator>) -> Self {
        Self { first_n, generator }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_n: 10,
            generator: uniform(10),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("first_n", &self.first_n)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HistogramError {
    #[error("bucket generator returned no edges")]
    EmptyBuckets,
    #[error("bucket generator edges are not strictly increasing")]
    UnorderedBuckets,
    #[error("packed histogram truncated: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("packed histogram has {counts} counts for {buckets} buckets")]
    CountMismatch { buckets: usize, counts: usize },
}

pub struct Histogram {
    name: Bytes,
    first_n: usize,
    generator: Arc<dyn BucketGenerator>,
    cache: Vec<f64>,
    buckets: Vec<f64>,
    counts: Vec<u64>,
    total: u64,
    dropped: u64,
}

impl Histogram {
    pub fn new(name: impl Into<Bytes>, config: &Config) -> Self {
        Self {
            name: name.into(),
            first_n: config.first_n,
            generator: Arc::clone(&config.generator),
            cache: Vec::with_capacity(config.first_n),
            buckets: Vec::new(),
            counts: Vec::new(),
            total: 0,
            dropped: 0,
        }
    }

    pub fn name(&self) -> &Bytes {
        &self.name
    }

    pub fn first_n(&self) -> usize {
        self.first_n
    }

    /// Left edges and per-bucket counts. Empty until generation fires.
    pub fn get(&self) -> (&[f64], &[u64]) {
        (&self.buckets, &self.counts)
    }

    pub fn cache(&self) -> &[f64] {
        &self.cache
    }

    /// Values retained by the buckets (inserts minus dropped).
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn insert(&mut self, value: f64) -> Result<(), HistogramError> {
        if self.buckets.is_empty() {
            self.cache.push(value);
            self.total += 1;
            if self.cache.len() >= self.first_n {
                self.generate()?;
            }
            return Ok(());
        }
        if self.count(value) {
            self.total += 1;
        } else {
            self.dropped += 1;
        }
        Ok(())
    }

    /// Forces bucket generation from whatever is cached. A no-op once the
    /// buckets exist.
    pub fn finalize(&mut self) -> Result<(), HistogramError> {
        if self.buckets.is_empty() {
            self.generate()?;
        }
        Ok(())
    }

    /// Removes all data points, buckets and counters.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.buckets.clear();
        self.counts.clear();
        self.total = 0;
        self.dropped = 0;
    }

    fn generate(&mut self) -> Result<(), HistogramError> {
        let edges = self.generator.generate(&self.cache);
        if edges.is_empty() {
            return Err(HistogramError::EmptyBuckets);
        }
        if !edges.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(HistogramError::UnorderedBuckets);
        }
        self.buckets = edges;
        self.counts = vec![0; self.buckets.len()];
        for value in std::mem::take(&mut self.cache) {
            if !self.count(value) {
                self.dropped += 1;
                self.total -= 1;
            }
        }
        Ok(())
    }

    /// Returns false when the value falls below the first edge (or is NaN).
    fn count(&mut self, value: f64) -> bool {
        let idx = self.buckets.partition_point(|edge| *edge <= value);
        if idx == 0 {
            return false;
        }
        self.counts[idx - 1] += 1;
        true
    }

    pub fn packed_len(&self) -> usize {
        size_of::<u64>()
            + self.name.len()
            + 3 * size_of::<u64>()
            + self.cache.len() * size_of::<f64>()
            + self.buckets.len() * (size_of::<f64>() + size_of::<u64>())
            + size_of::<u64>()
    }

    /// `name ‖ first_n ‖ cache ‖ buckets ‖ counts ‖ total`, every integer and
    /// float little-endian, every vector length-prefixed. The drop counter is
    /// deliberately not persisted.
    pub fn pack(&self, buf: &mut BytesMut) {
        buf.reserve(self.packed_len());
        buf.put_u64_le(self.name.len() as u64);
        buf.put_slice(&self.name);
        buf.put_u64_le(self.first_n as u64);
        buf.put_u64_le(self.cache.len() as u64);
        for value in &self.cache {
            buf.put_f64_le(*value);
        }
        buf.put_u64_le(self.buckets.len() as u64);
        for edge in &self.buckets {
            buf.put_f64_le(*edge);
        }
        for count in &self.counts {
            buf.put_u64_le(*count);
        }
        buf.put_u64_le(self.total);
    }

    pub fn packed(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.packed_len());
        self.pack(&mut buf);
        buf.freeze()
    }

    /// Inverse of [`Histogram::pack`]. The generator is not serialized;
    /// `config` supplies the one used for any further cache-driven
    /// generation.
    pub fn unpack(buf: &mut impl Buf, config: &Config) -> Result<Self, HistogramError> {
        let name_len = get_u64(buf)? as usize;
        ensure(buf, name_len)?;
        let name = buf.copy_to_bytes(name_len);
        let first_n = get_u64(buf)? as usize;

        let cache_len = get_u64(buf)? as usize;
        ensure(buf, cache_len * size_of::<f64>())?;
        let mut cache = Vec::with_capacity(cache_len);
        for _ in 0..cache_len {
            cache.push(buf.get_f64_le());
        }

        let bucket_count = get_u64(buf)? as usize;
        ensure(buf, bucket_count * (size_of::<f64>() + size_of::<u64>()))?;
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            buckets.push(buf.get_f64_le());
        }
        let mut counts = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            counts.push(buf.get_u64_le());
        }
        if buckets.len() != counts.len() {
            return Err(HistogramError::CountMismatch {
                buckets: buckets.len(),
                counts: counts.len(),
            });
        }
        let total = get_u64(buf)?;

        Ok(Self {
            name,
            first_n,
            generator: Arc::clone(&config.generator),
            cache,
            buckets,
            counts,
            total,
            dropped: 0,
        })
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("name", &String::from_utf8_lossy(&self.name))
            .field("first_n", &self.first_n)
            .field("cached", &self.cache.len())
            .field("buckets", &self.buckets)
            .field("counts", &self.counts)
            .field("total", &self.total)
            .finish()
    }
}

fn ensure(buf: &impl Buf, needed: usize) -> Result<(), HistogramError> {
    if buf.remaining() < needed {
        return Err(HistogramError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn get_u64(buf: &mut impl Buf) -> Result<u64, HistogramError> {
    ensure(buf, size_of::<u64>())?;
    Ok(buf.get_u64_le())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(first_n: usize, generator: Arc<dyn BucketGenerator>) -> Config {
        Config::new(first_n, generator)
    }

    #[test]
    fn buckets_generate_after_first_n() {
        let count = 10usize;
        let mut hist = Histogram::new(
            Bytes::from_static(b"evens"),
            &config(count - 1, Arc::new(Fixed::new(vec![0.0]))),
        );
        for i in 0..count {
            hist.insert((2 * i) as f64).unwrap();
        }

        let (buckets, counts) = hist.get();
        assert_eq!(buckets, &[0.0]);
        assert_eq!(counts, &[count as u64]);
        assert_eq!(hist.total(), count as u64);
    }

    #[test]
    fn values_below_first_edge_are_dropped() {
        let mut hist = Histogram::new(
            Bytes::from_static(b"drops"),
            &config(2, Arc::new(Fixed::new(vec![10.0, 20.0]))),
        );
        hist.insert(15.0).unwrap();
        hist.insert(25.0).unwrap();
        // generation has fired; this one falls below the first edge
        hist.insert(3.0).unwrap();

        let (buckets, counts) = hist.get();
        assert_eq!(buckets, &[10.0, 20.0]);
        assert_eq!(counts, &[1, 1]);
        assert_eq!(hist.total(), 2);
        assert_eq!(hist.dropped(), 1);
    }

    #[test]
    fn count_conservation() {
        let cfg = config(4, uniform(10));
        let mut hist = Histogram::new(Bytes::from_static(b"cons"), &cfg);
        let values = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 5.3, 5.8];
        for v in values {
            hist.insert(v).unwrap();
        }
        let (_, counts) = hist.get();
        let sum: u64 = counts.iter().sum();
        assert_eq!(sum + hist.dropped(), values.len() as u64);
        assert_eq!(sum, hist.total());
    }

    #[test]
    fn pack_unpack_round_trip() {
        let cfg = config(3, uniform(10));
        let mut hist = Histogram::new(Bytes::from_static(b"rt"), &cfg);
        for v in [1.0, 2.0, 3.0, 4.0, 2.5] {
            hist.insert(v).unwrap();
        }

        let mut packed = hist.packed();
        let restored = Histogram::unpack(&mut packed, &cfg).unwrap();
        assert_eq!(restored.name(), hist.name());
        assert_eq!(restored.first_n(), hist.first_n());
        assert_eq!(restored.get(), hist.get());
        assert_eq!(restored.cache(), hist.cache());
        assert_eq!(restored.total(), hist.total());
    }

    #[test]
    fn pack_unpack_before_generation_keeps_cache() {
        let cfg = config(10, uniform(10));
        let mut hist = Histogram::new(Bytes::from_static(b"cache"), &cfg);
        hist.insert(1.0).unwrap();
        hist.insert(2.0).unwrap();

        let mut packed = hist.packed();
        let mut restored = Histogram::unpack(&mut packed, &cfg).unwrap();
        assert_eq!(restored.cache(), &[1.0, 2.0]);
        assert_eq!(restored.get().0.len(), 0);

        // the cache keeps feeding generation after the round trip
        for v in [3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0] {
            restored.insert(v).unwrap();
        }
        assert!(!restored.get().0.is_empty());
        assert_eq!(restored.total(), 10);
    }

    #[test]
    fn unordered_generator_is_rejected() {
        let mut hist = Histogram::new(
            Bytes::from_static(b"bad"),
            &config(1, Arc::new(Fixed::new(vec![5.0, 5.0]))),
        );
        assert_eq!(
            hist.insert(1.0).unwrap_err(),
            HistogramError::UnorderedBuckets
        );
    }

    #[test]
    fn finalize_generates_from_partial_cache() {
        let cfg = config(100, Arc::new(Fixed::new(vec![0.0])));
        let mut hist = Histogram::new(Bytes::from_static(b"fin"), &cfg);
        hist.insert(1.0).unwrap();
        hist.insert(2.0).unwrap();
        hist.finalize().unwrap();
        assert_eq!(hist.get(), (&[0.0][..], &[2u64][..]));
    }

    #[test]
    fn clear_resets_everything() {
        let cfg = config(1, uniform(10));
        let mut hist = Histogram::new(Bytes::from_static(b"clr"), &cfg);
        hist.insert(1.0).unwrap();
        hist.insert(2.0).unwrap();
        hist.clear();
        assert_eq!(hist.total(), 0);
        assert!(hist.get().0.is_empty());
        assert!(hist.cache().is_empty());
    }

    #[test]
    fn truncated_unpack_fails() {
        let cfg = config(1, uniform(10));
        let mut hist = Histogram::new(Bytes::from_static(b"trunc"), &cfg);
        hist.insert(1.0).unwrap();
        let packed = hist.packed();
        let mut short = packed.slice(..packed.len() - 4);
        assert!(matches!(
            Histogram::unpack(&mut short, &cfg),
            Err(HistogramError::Truncated { .. })
        ));
    }
}
