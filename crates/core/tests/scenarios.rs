// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! End-to-end scenarios against a full handle: queue → shuffle → dispatch →
//! datastore → result set.

use std::sync::Arc;

use test_log::test;

use tristore_core::{
    Blob, DataType, DatastoreId, GetOpCode, Hasher, Mesh, Options, OptionsBuilder, ResultNode,
    Status, TransportOptions, TripleStore,
};

fn blob(data: &'static str) -> Blob {
    Blob::from(data)
}

async fn open_default() -> TripleStore {
    TripleStore::open(Options::default()).await.unwrap()
}

fn nodes_of(results: &tristore_core::ResultSet) -> Vec<&ResultNode> {
    results.iter().collect()
}

#[test(tokio::test)]
async fn put_flush_get() {
    let store = open_default().await;

    store
        .put(blob("sub0"), blob("pred0"), blob("object0"))
        .unwrap();
    store
        .put(blob("sub1"), blob("pred1"), blob("object1"))
        .unwrap();
    let results = store.flush().await;
    assert_eq!(results.size(), 2);
    assert!(results.iter().all(|node| node.status().is_ok()));

    store.get(blob("sub0"), blob("pred0"), DataType::Byte).unwrap();
    store.get(blob("sub2"), blob("pred2"), DataType::Byte).unwrap();
    let results = store.flush_gets().await;

    let nodes = nodes_of(&results);
    assert_eq!(nodes.len(), 2);
    let ResultNode::Get { status, object, .. } = nodes[0] else {
        panic!("expected a get result");
    };
    assert!(status.is_ok());
    assert_eq!(object.as_ref().unwrap().data(), b"object0");
    assert_eq!(nodes[1].status(), Status::Error);

    store.close().await;
}

#[test(tokio::test)]
async fn bput_bdelete_bget() {
    let store = open_default().await;

    store
        .bput([
            (blob("sub0"), blob("pred0"), blob("object0")),
            (blob("sub1"), blob("pred1"), blob("object1")),
        ])
        .unwrap();
    store.flush().await;

    store
        .bdelete([
            (blob("sub0"), blob("pred0")),
            (blob("sub1"), blob("pred1")),
            (blob("sub3"), blob("pred3")),
        ])
        .unwrap();
    let deletes = store.flush_deletes().await;
    assert_eq!(deletes.size(), 3);
    // deleting a non-existent key still reports success
    assert!(deletes.iter().all(|node| node.status().is_ok()));

    store
        .bget([
            (blob("sub0"), blob("pred0"), DataType::Byte),
            (blob("sub1"), blob("pred1"), DataType::Byte),
            (blob("sub3"), blob("pred3"), DataType::Byte),
        ])
        .unwrap();
    let gets = store.flush_gets().await;
    assert_eq!(gets.size(), 3);
    assert!(gets.iter().all(|node| node.status() == Status::Error));

    store.close().await;
}

#[test(tokio::test)]
async fn getop_scans_in_key_order() {
    let store = open_default().await;

    store
        .put(blob("sub0"), blob("pred0"), blob("object0"))
        .unwrap();
    store
        .put(blob("sub1"), blob("pred1"), blob("object1"))
        .unwrap();
    store.flush().await;

    // FIRST asks for three rows but only two triples exist
    store
        .getop(blob(""), blob(""), DataType::Byte, 3, GetOpCode::First)
        .unwrap();
    let results = store.flush_getops().await;
    let nodes = nodes_of(&results);
    assert_eq!(nodes.len(), 2);
    let subjects: Vec<&[u8]> = nodes
        .iter()
        .map(|node| match node {
            ResultNode::GetOp { subject, .. } => subject.data(),
            _ => panic!("expected getop results"),
        })
        .collect();
    assert_eq!(subjects, vec![&b"sub0"[..], &b"sub1"[..]]);

    // PREV from the last key returns exactly that row
    store
        .getop(blob("sub1"), blob("pred1"), DataType::Byte, 1, GetOpCode::Prev)
        .unwrap();
    let results = store.flush_getops().await;
    let nodes = nodes_of(&results);
    assert_eq!(nodes.len(), 1);
    let ResultNode::GetOp {
        status,
        subject,
        predicate,
        object,
        ..
    } = nodes[0]
    else {
        panic!("expected a getop result");
    };
    assert!(status.is_ok());
    assert_eq!(subject.data(), b"sub1");
    assert_eq!(predicate.data(), b"pred1");
    assert_eq!(object.as_ref().unwrap().data(), b"object1");

    store.close().await;
}

#[test(tokio::test)]
async fn scan_ordering_matches_encoded_keys() {
    let store = open_default().await;

    for i in 0..5u32 {
        let subject = Blob::copy_from(format!("sub{i}").as_bytes(), DataType::Byte);
        let object = Blob::copy_from(format!("object{i}").as_bytes(), DataType::Byte);
        store.put(subject, blob("pred"), object).unwrap();
    }
    store.flush().await;

    store
        .getop(blob("sub0"), blob("pred"), DataType::Byte, 3, GetOpCode::Next)
        .unwrap();
    let ascending = store.flush_getops().await;
    let subjects: Vec<Vec<u8>> = ascending
        .iter()
        .map(|node| match node {
            ResultNode::GetOp { subject, .. } => subject.data().to_vec(),
            _ => panic!("expected getop results"),
        })
        .collect();
    assert_eq!(subjects, vec![b"sub0".to_vec(), b"sub1".to_vec(), b"sub2".to_vec()]);

    store
        .getop(blob("sub4"), blob("pred"), DataType::Byte, 3, GetOpCode::Prev)
        .unwrap();
    let descending = store.flush_getops().await;
    let subjects: Vec<Vec<u8>> = descending
        .iter()
        .map(|node| match node {
            ResultNode::GetOp { subject, .. } => subject.data().to_vec(),
            _ => panic!("expected getop results"),
        })
        .collect();
    assert_eq!(subjects, vec![b"sub4".to_vec(), b"sub3".to_vec(), b"sub2".to_vec()]);

    store.close().await;
}

#[test(tokio::test)]
async fn flush_orders_puts_before_gets() {
    let store = open_default().await;

    // both queued before a single flush; the PUT epoch completes first
    store
        .put(blob("sub0"), blob("pred0"), blob("object0"))
        .unwrap();
    store.get(blob("sub0"), blob("pred0"), DataType::Byte).unwrap();

    let results = store.flush().await;
    assert_eq!(results.size(), 2);
    let nodes = nodes_of(&results);
    assert!(matches!(nodes[0], ResultNode::Put { status, .. } if status.is_ok()));
    let ResultNode::Get { status, object, .. } = nodes[1] else {
        panic!("expected a get result");
    };
    assert!(status.is_ok());
    assert_eq!(object.as_ref().unwrap().data(), b"object0");

    store.close().await;
}

#[test(tokio::test)]
async fn transport_failure_stamps_every_remote_slot() {
    // two ranks but no transport: remote packets fail, local ones commit
    let options = OptionsBuilder::default()
        .hash("sum_mod_datastores".to_owned())
        .build()
        .unwrap();
    let store = TripleStore::open_with_transport(
        options,
        0,
        2,
        tristore_core::AnyTransport::Null(tristore_core::NullTransport),
    )
    .await
    .unwrap();

    for i in 0..8u32 {
        let subject = Blob::copy_from(format!("sub{i}").as_bytes(), DataType::Byte);
        store.put(subject, blob("pred"), blob("obj")).unwrap();
    }
    let results = store.flush_puts().await;
    assert_eq!(results.size(), 8);
    let local_ok = results
        .iter()
        .filter(|node| node.status().is_ok() && node.datastore() == Some(DatastoreId::new(0)))
        .count();
    let remote_failed = results
        .iter()
        .filter(|node| node.status() == Status::Error && node.datastore().is_none())
        .count();
    assert!(local_ok > 0);
    assert!(remote_failed > 0);
    assert_eq!(local_ok + remote_failed, 8);

    // fill statistics saw the put packets
    assert!(!store.packet_stats().bput.is_empty());

    store.close().await;
}

#[test(tokio::test)]
async fn histograms_flow_back_to_the_client() {
    let store = open_default().await;

    for i in 0..16 {
        let value = (i as f64).to_le_bytes();
        store
            .put(
                blob("sensor"),
                blob("temperature"),
                Blob::copy_from(&value, DataType::Float64),
            )
            .unwrap();
    }
    store.flush().await;

    store
        .histogram(DatastoreId::new(0), blob("temperature"))
        .unwrap();
    store
        .histogram(DatastoreId::new(0), blob("absent"))
        .unwrap();
    let results = store.flush_histograms().await;
    let nodes = nodes_of(&results);
    assert_eq!(nodes.len(), 2);
    let ResultNode::Histogram {
        status,
        buckets,
        counts,
        ..
    } = nodes[0]
    else {
        panic!("expected a histogram result");
    };
    assert!(status.is_ok());
    assert!(!buckets.is_empty());
    assert_eq!(counts.iter().sum::<u64>(), 16);
    assert_eq!(nodes[1].status(), Status::Error);

    store.close().await;
}

#[test(tokio::test)]
async fn typed_floats_round_trip_through_the_ordered_encoding() {
    let store = open_default().await;

    store.put_f64(blob("sensor"), blob("min"), -273.15).unwrap();
    store.put_f32(blob("sensor"), blob("max"), 451.0).unwrap();
    store.flush().await;

    store.get_f64(blob("sensor"), blob("min")).unwrap();
    store.get_f32(blob("sensor"), blob("max")).unwrap();
    let results = store.flush_gets().await;

    let nodes = nodes_of(&results);
    let ResultNode::Get { object, .. } = nodes[0] else {
        panic!("expected a get result");
    };
    assert_eq!(object.as_ref().unwrap().as_f64(), Some(-273.15));
    let ResultNode::Get { object, .. } = nodes[1] else {
        panic!("expected a get result");
    };
    assert_eq!(object.as_ref().unwrap().as_f32(), Some(451.0));

    store.close().await;
}

#[test(tokio::test)]
async fn rejected_placement_drops_the_triple() {
    let store = open_default().await;
    store
        .change_hash(Hasher::custom("always-fail", Arc::new(|_| -1)))
        .await;

    store.put(blob("sub"), blob("pred"), blob("obj")).unwrap();
    let results = store.flush_puts().await;
    assert_eq!(results.size(), 1);
    let node = results.iter().next().unwrap();
    assert_eq!(node.status(), Status::Error);
    assert!(node.datastore().is_none());

    // the triple was dropped, not requeued
    assert!(store.flush_puts().await.is_empty());

    store.close().await;
}

#[test(tokio::test)]
async fn reserved_subject_never_reaches_a_queue() {
    let store = open_default().await;
    let err = store
        .put(blob("HISTOGRAM"), blob("pred"), blob("obj"))
        .unwrap_err();
    assert_eq!(err, tristore_core::ClientError::ReservedSubject);
    assert!(store.flush_puts().await.is_empty());
    store.close().await;
}

#[test(tokio::test)]
async fn queue_preserves_submission_order() {
    let store = open_default().await;
    for i in 0..32u32 {
        let subject = Blob::copy_from(format!("sub{i:03}").as_bytes(), DataType::Byte);
        store.put(subject, blob("pred"), blob("obj")).unwrap();
    }
    let results = store.flush_puts().await;

    let subjects: Vec<Vec<u8>> = results
        .iter()
        .map(|node| match node {
            ResultNode::Put { subject, .. } => subject.data().to_vec(),
            _ => panic!("expected put results"),
        })
        .collect();
    let mut sorted = subjects.clone();
    sorted.sort();
    assert_eq!(subjects, sorted);

    store.close().await;
}

#[test(tokio::test)]
async fn result_set_cursor_walks_everything() {
    let store = open_default().await;
    store.put(blob("sub0"), blob("pred0"), blob("o")).unwrap();
    store.put(blob("sub1"), blob("pred1"), blob("o")).unwrap();

    let mut results = store.sync().await;
    // two puts plus one sync result for the single local datastore
    assert_eq!(results.size(), 3);

    let mut seen = 0;
    results.go_to_head();
    while results.valid() {
        seen += 1;
        results.next();
    }
    assert_eq!(seen, 3);

    store.close().await;
}

#[test(tokio::test)]
async fn background_put_worker_drains_on_flush() {
    let options = OptionsBuilder::default()
        .start_async_puts_at(2usize)
        .build()
        .unwrap();
    let store = TripleStore::open(options).await.unwrap();

    for i in 0..8u32 {
        let subject = Blob::copy_from(format!("sub{i}").as_bytes(), DataType::Byte);
        store.put(subject, blob("pred"), blob("obj")).unwrap();
    }
    let results = store.flush_puts().await;
    assert_eq!(results.size(), 8);
    assert!(results.iter().all(|node| node.status().is_ok()));

    store.get(blob("sub3"), blob("pred"), DataType::Byte).unwrap();
    let gets = store.flush_gets().await;
    assert!(gets.iter().all(|node| node.status().is_ok()));

    store.close().await;
}

#[test(tokio::test)]
async fn change_hash_reopens_datastores() {
    let store = open_default().await;
    assert_eq!(store.hash_name(), "my_rank");

    let results = store
        .change_hash(Hasher::by_name("rank_zero").unwrap())
        .await;
    assert_eq!(store.hash_name(), "rank_zero");
    // one reopen status per local datastore
    assert_eq!(results.size(), 1);
    assert!(results.iter().all(|node| node.status().is_ok()));

    store.close().await;
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn two_ranks_over_the_mesh() {
    let mut endpoints = Mesh::create(2, 64);
    let make_options = || {
        OptionsBuilder::default()
            .transport(TransportOptions::Mesh { listeners: 2 })
            .hash("sum_mod_datastores".to_owned())
            .build()
            .unwrap()
    };

    let second = endpoints.pop().unwrap();
    let first = endpoints.pop().unwrap();
    let store_a = TripleStore::open_with_transport(
        make_options(),
        0,
        2,
        tristore_core::AnyTransport::Mesh(first),
    )
    .await
    .unwrap();
    let store_b = TripleStore::open_with_transport(
        make_options(),
        1,
        2,
        tristore_core::AnyTransport::Mesh(second),
    )
    .await
    .unwrap();

    // enough triples that both ranks own some of them
    for i in 0..32u32 {
        let subject = Blob::copy_from(format!("sub{i}").as_bytes(), DataType::Byte);
        store_a.put(subject, blob("pred"), blob("payload")).unwrap();
    }
    let results = store_a.flush_puts().await;
    assert_eq!(results.size(), 32);
    assert!(results.iter().all(|node| node.status().is_ok()));
    let remote_hits = results
        .iter()
        .filter(|node| node.datastore() == Some(DatastoreId::new(1)))
        .count();
    assert!(remote_hits > 0, "placement never chose the remote rank");

    // reads from the other rank observe the same triples
    for i in 0..32u32 {
        let subject = Blob::copy_from(format!("sub{i}").as_bytes(), DataType::Byte);
        store_b.get(subject, blob("pred"), DataType::Byte).unwrap();
    }
    let gets = store_b.flush_gets().await;
    assert_eq!(gets.size(), 32);
    assert!(gets.iter().all(|node| node.status().is_ok()));

    // sync is collective: both ranks must enter the barrier
    let (sync_a, sync_b) = tokio::join!(store_a.sync(), store_b.sync());
    assert!(sync_a.iter().all(|node| node.status().is_ok()));
    assert!(sync_b.iter().all(|node| node.status().is_ok()));

    tokio::join!(store_a.close(), store_b.close());
}

#[test(tokio::test)]
async fn persistent_backend_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let options = OptionsBuilder::default()
        .datastore(tristore_core::DatastoreOptions::Persistent {
            prefix: dir.path().to_str().unwrap().to_owned(),
            postfix: String::new(),
            create_if_missing: true,
        })
        .build()?;
    let store = TripleStore::open(options).await?;

    store.put(blob("sub0"), blob("pred0"), blob("object0"))?;
    let results = store.sync().await;
    assert!(results.iter().all(|node| node.status().is_ok()));

    store.get(blob("sub0"), blob("pred0"), DataType::Byte)?;
    let gets = store.flush_gets().await;
    let node = gets.iter().next().unwrap();
    let ResultNode::Get { object, .. } = node else {
        panic!("expected a get result");
    };
    assert_eq!(object.as_ref().unwrap().data(), b"object0");

    store.close().await;
    Ok(())
}
