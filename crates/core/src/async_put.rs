// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The background put worker: a task owning the asynchronous drain of the
//! put queue. It wakes when the queue crosses the configured threshold and
//! pushes batches through the regular flush path; results accumulate under
//! their own lock until the caller's next `flush_puts` picks them up. The
//! force-flush handshake is a oneshot reply per drain command.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::results::ResultSet;
use crate::Inner;

/// Results the worker has produced but no caller has collected yet.
#[derive(Debug, Default)]
pub(crate) struct AsyncPutShared {
    pub results: Mutex<ResultSet>,
}

/// Forces a drain-to-empty; the reply fires once the queue has been fully
/// processed.
pub(crate) struct DrainCommand {
    pub reply: oneshot::Sender<()>,
}

pub(crate) fn spawn(
    inner: Arc<Inner>,
    shared: Arc<AsyncPutShared>,
    mut commands: mpsc::Receiver<DrainCommand>,
    watch: drain::Watch,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signaled = watch.signaled();
        tokio::pin!(signaled);
        loop {
            tokio::select! {
                _ = inner.queues.put_signal.notified() => {
                    if inner.queues.puts.len() >= inner.options.start_async_puts_at.max(1) {
                        drain(&inner, &shared).await;
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(DrainCommand { reply }) => {
                            drain(&inner, &shared).await;
                            let _ = reply.send(());
                        }
                        None => break,
                    }
                }
                _ = &mut signaled => break,
            }
        }
        debug!("background put worker stopped");
    })
}

async fn drain(inner: &Arc<Inner>, shared: &Arc<AsyncPutShared>) {
    let mut queue = inner.queues.puts.take_all();
    if queue.is_empty() {
        return;
    }
    let mut results = inner.drain_puts(&mut queue).await;
    shared.results.lock().append(&mut results);
}
