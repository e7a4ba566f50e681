// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Placement: mapping a subject/predicate pair onto a datastore id.
//!
//! A placement function is pure and deterministic; a negative return is an
//! error and the triple is dropped with an error result. The id splits into
//! `(rank, offset)` via `datastores_per_server`.

use std::fmt;
use std::sync::Arc;

/// Everything a placement function may consult.
pub struct HashContext<'a> {
    pub rank: u32,
    pub world_size: u32,
    pub datastores_per_server: u32,
    pub total_datastores: u32,
    pub subject: &'a [u8],
    pub predicate: &'a [u8],
}

pub type HashFn = Arc<dyn Fn(&HashContext<'_>) -> i64 + Send + Sync>;

/// A named placement function; either one of the built-ins or a caller
/// supplied closure (the opaque-argument escape hatch: captures).
#[derive(Clone)]
pub struct Hasher {
    name: String,
    func: HashFn,
}

impl Hasher {
    pub fn custom(name: impl Into<String>, func: HashFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    /// Resolves the named built-ins accepted by the options bundle.
    pub fn by_name(name: &str) -> Option<Self> {
        let func: HashFn = match name {
            "rank_zero" => Arc::new(|_ctx: &HashContext<'_>| 0),
            "my_rank" => Arc::new(|ctx: &HashContext<'_>| {
                (ctx.rank * ctx.datastores_per_server) as i64
            }),
            "rank_mod_datastores" => {
                Arc::new(|ctx: &HashContext<'_>| (ctx.rank % ctx.total_datastores.max(1)) as i64)
            }
            "sum_mod_datastores" => Arc::new(|ctx: &HashContext<'_>| {
                let sum: u64 = ctx
                    .subject
                    .iter()
                    .chain(ctx.predicate.iter())
                    .map(|byte| *byte as u64)
                    .sum();
                (sum % ctx.total_datastores.max(1) as u64) as i64
            }),
            "left" => Arc::new(|ctx: &HashContext<'_>| {
                ((ctx.rank as i64 - 1) % ctx.world_size as i64) * ctx.datastores_per_server as i64
            }),
            "right" => Arc::new(|ctx: &HashContext<'_>| {
                ((ctx.rank as i64 + 1) % ctx.world_size as i64) * ctx.datastores_per_server as i64
            }),
            _ => return None,
        };
        Some(Self {
            name: name.to_owned(),
            func,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self, ctx: &HashContext<'_>) -> i64 {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(rank: u32, subject: &'a [u8], predicate: &'a [u8]) -> HashContext<'a> {
        HashContext {
            rank,
            world_size: 4,
            datastores_per_server: 2,
            total_datastores: 8,
            subject,
            predicate,
        }
    }

    #[test]
    fn builtins_are_deterministic() {
        let hasher = Hasher::by_name("sum_mod_datastores").unwrap();
        let a = hasher.hash(&ctx(0, b"sub0", b"pred0"));
        let b = hasher.hash(&ctx(3, b"sub0", b"pred0"));
        assert_eq!(a, b);
        assert!((0..8).contains(&a));
    }

    #[test]
    fn my_rank_targets_the_first_local_datastore() {
        let hasher = Hasher::by_name("my_rank").unwrap();
        assert_eq!(hasher.hash(&ctx(3, b"s", b"p")), 6);
    }

    #[test]
    fn left_of_rank_zero_is_negative() {
        let hasher = Hasher::by_name("left").unwrap();
        assert!(hasher.hash(&ctx(0, b"s", b"p")) < 0);
        assert_eq!(hasher.hash(&ctx(2, b"s", b"p")), 2);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(Hasher::by_name("bogus").is_none());
    }

    #[test]
    fn custom_function_can_reject() {
        let hasher = Hasher::custom("always-fail", Arc::new(|_| -1));
        assert_eq!(hasher.hash(&ctx(0, b"s", b"p")), -1);
    }
}
