// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Optional to have but adds description/help message to the metrics
/// emitted to the metrics' sink.
use metrics::{describe_counter, describe_histogram, Unit};

pub const CLIENT_OPS_ENQUEUED: &str = "tristore.client.ops_enqueued.total";
pub const CLIENT_PACKETS_SENT: &str = "tristore.client.packets_sent.total";
pub const CLIENT_TRIPLES_DROPPED: &str = "tristore.client.triples_dropped.total";
pub const CLIENT_PACKET_FILL_RATIO: &str = "tristore.client.packet_fill_ratio";
pub const SERVER_REQUESTS_HANDLED: &str = "tristore.server.requests_handled.total";
pub const SERVER_MALFORMED_FRAMES: &str = "tristore.server.malformed_frames.total";

pub(crate) fn describe_metrics() {
    describe_counter!(
        CLIENT_OPS_ENQUEUED,
        Unit::Count,
        "Single operations submitted into the unsent queues"
    );
    describe_counter!(
        CLIENT_PACKETS_SENT,
        Unit::Count,
        "Bulk packets handed to the transport or the local range server"
    );
    describe_counter!(
        CLIENT_TRIPLES_DROPPED,
        Unit::Count,
        "Triples dropped because the placement function rejected them"
    );
    describe_histogram!(
        CLIENT_PACKET_FILL_RATIO,
        Unit::Percent,
        "Fraction of each bulk packet in use when it was sent"
    );
    describe_counter!(
        SERVER_REQUESTS_HANDLED,
        Unit::Count,
        "Bulk requests dispatched by the range-server loop"
    );
    describe_counter!(
        SERVER_MALFORMED_FRAMES,
        Unit::Count,
        "Request frames dropped because they failed to unpack"
    );
}
