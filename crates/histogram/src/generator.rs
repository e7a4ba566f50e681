// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use crate::BucketGenerator;

/// Evenly spaced left edges over the `[min, max]` range of the cache.
#[derive(Debug, Clone, Copy)]
pub struct Uniform {
    pub buckets: usize,
}

impl BucketGenerator for Uniform {
    fn generate(&self, cache: &[f64]) -> Vec<f64> {
        let n = self.buckets.max(1);
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in cache.iter().filter(|v| !v.is_nan()) {
            min = min.min(*value);
            max = max.max(*value);
        }
        if !min.is_finite() || !max.is_finite() {
            return vec![0.0];
        }
        if min == max || n == 1 {
            return vec![min];
        }
        let width = (max - min) / n as f64;
        (0..n).map(|i| min + width * i as f64).collect()
    }
}

/// Left edges at `0, 1, base, base², …` until the cache maximum is covered.
#[derive(Debug, Clone, Copy)]
pub struct Logarithmic {
    pub base: f64,
}

impl BucketGenerator for Logarithmic {
    fn generate(&self, cache: &[f64]) -> Vec<f64> {
        let max = cache
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);
        let mut edges = vec![0.0, 1.0];
        let mut edge = self.base;
        while edge <= max {
            edges.push(edge);
            edge *= self.base;
        }
        edges
    }
}

/// Fixed edges regardless of the cache; the "custom function with opaque
/// arguments" escape hatch for callers with a known value domain.
#[derive(Debug, Clone)]
pub struct Fixed {
    edges: Vec<f64>,
}

impl Fixed {
    pub fn new(edges: Vec<f64>) -> Self {
        Self { edges }
    }
}

impl BucketGenerator for Fixed {
    fn generate(&self, _cache: &[f64]) -> Vec<f64> {
        self.edges.clone()
    }
}

pub fn uniform(buckets: usize) -> Arc<dyn BucketGenerator> {
    Arc::new(Uniform { buckets })
}

pub fn log2() -> Arc<dyn BucketGenerator> {
    Arc::new(Logarithmic { base: 2.0 })
}

pub fn log10() -> Arc<dyn BucketGenerator> {
    Arc::new(Logarithmic { base: 10.0 })
}

/// Resolves the named built-in generators accepted by the options bundle.
pub fn builtin(name: &str) -> Option<Arc<dyn BucketGenerator>> {
    match name {
        "uniform10" => Some(uniform(10)),
        "uniform100" => Some(uniform(100)),
        "uniform1000" => Some(uniform(1000)),
        "log2" => Some(log2()),
        "log10" => Some(log10()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_covers_cache_range() {
        let edges = Uniform { buckets: 10 }.generate(&[0.0, 100.0, 42.0]);
        assert_eq!(edges.len(), 10);
        assert_eq!(edges[0], 0.0);
        assert!(edges.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(edges[9] < 100.0);
    }

    #[test]
    fn uniform_degenerate_cache() {
        assert_eq!(Uniform { buckets: 10 }.generate(&[]), vec![0.0]);
        assert_eq!(Uniform { buckets: 10 }.generate(&[7.0, 7.0]), vec![7.0]);
    }

    #[test]
    fn logarithmic_covers_max() {
        let edges = Logarithmic { base: 2.0 }.generate(&[5.0]);
        assert_eq!(edges, vec![0.0, 1.0, 2.0, 4.0]);
        assert!(edges.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn builtin_names_resolve() {
        for name in ["uniform10", "uniform100", "uniform1000", "log2", "log10"] {
            assert!(builtin(name).is_some(), "{name} should resolve");
        }
        assert!(builtin("bogus").is_none());
    }
}
