// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::thread;

use bytes::{Bytes, BytesMut};
use rstest::{fixture, rstest};

use mqstore::{
    setup_local_tracing, AddMessageRequest, BlockPool, BlockPoolOptions, ChunkPool, ErrorCode,
    GetMessageRequest, GroupOptions, MessageBatch, MessageBatchBuilder, MessageConverter,
    MessageDeque, MessageGroup, ReadMetrics, ReaderRegistry, RecoverMessage, RecoverSnapshot,
    TopicMode, WireFormat, WireMessage, WriteMetrics,
};

#[fixture]
#[once]
fn setup() {
    let _ = setup_local_tracing();
}

fn block_pool(block_size: usize, max_block_count: usize) -> Arc<BlockPool> {
    BlockPool::new(BlockPoolOptions {
        block_size,
        min_block_count: 0,
        max_block_count,
    })
}

fn new_group(topic_mode: TopicMode, read_not_committed: bool) -> MessageGroup {
    let options = GroupOptions {
        read_not_committed,
        ..Default::default()
    };
    MessageGroup::init(
        3,
        block_pool(128, 4096),
        ChunkPool::new(16, 1024),
        None,
        topic_mode,
        &options,
    )
    .unwrap()
}

fn produce_batch(format: WireFormat, count: usize, len: usize) -> MessageBatch {
    let mut builder = MessageBatchBuilder::new(format);
    for i in 0..count {
        let data = vec![i as u8; len];
        builder.append(&WireMessage::new(data).with_payload(i as u16, 0));
    }
    builder.build()
}

fn replicated_batch(ids: std::ops::Range<i64>) -> MessageBatch {
    let mut builder = MessageBatchBuilder::new(WireFormat::Tagged);
    for id in ids {
        let data = format!("replica-{id}");
        builder.append(&WireMessage::new(data).with_id(id, 10_000 + id));
    }
    builder.build()
}

#[rstest]
fn test_views_over_committed_prefix(_setup: ()) {
    let pool = block_pool(64, 64);
    let mut converter = MessageConverter::new(pool);
    let mut deque = MessageDeque::new(ChunkPool::new(4, 64));
    for id in 0..10 {
        let record = converter
            .encode(&WireMessage::new("payload").with_id(id, id))
            .unwrap();
        deque.push_back(record).unwrap();
    }
    deque.set_committed_msg_id(5);
    assert_eq!(deque.create_view(false).len(), 6);
    assert_eq!(deque.create_view(true).len(), 10);
}

#[rstest]
fn test_empty_deque_view(_setup: ()) {
    let deque = MessageDeque::new(ChunkPool::new(4, 4));
    let view = deque.create_view(true);
    assert_eq!(view.last_msg_id(), -1);
    assert_eq!(view.next_msg_id_after_last(), 0);
}

#[rstest]
fn test_overlapping_replicated_batch_rejected(_setup: ()) {
    let group = new_group(TopicMode::Normal, true);
    let mut metrics = WriteMetrics::default();
    let accepted = group.add_message(
        &AddMessageRequest::replicated(replicated_batch(0..10)),
        &mut metrics,
    );
    assert!(accepted.error_code.is_ok());
    assert_eq!(accepted.accepted_count, 10);

    let rejected = group.add_message(
        &AddMessageRequest::replicated(replicated_batch(8..12)),
        &mut metrics,
    );
    assert_eq!(rejected.error_code, ErrorCode::RequestInvalid);
    assert_eq!(group.last_received_id(), 9);
    assert_eq!(metrics.accepted_count, 10);
}

#[rstest]
fn test_single_message_over_budget_still_returned(_setup: ()) {
    let group = new_group(TopicMode::Normal, true);
    group.add_message(
        &AddMessageRequest::new(produce_batch(WireFormat::Flat, 10, 32)),
        &mut WriteMetrics::default(),
    );
    let request = GetMessageRequest::new(0, 10, 1);
    let response = group.get_message(&request, None, &mut ReadMetrics::default());
    assert_eq!(response.message_count, 1);
    assert_eq!(response.next_id, 1);
}

#[rstest]
fn test_recycle_keeps_newest_committed(_setup: ()) {
    let group = new_group(TopicMode::Normal, true);
    group.add_message(
        &AddMessageRequest::new(produce_batch(WireFormat::Flat, 10, 4)),
        &mut WriteMetrics::default(),
    );
    group.set_committed_id(5);
    let stats = group.try_recycle(u64::MAX);
    assert_eq!(stats.count, 5);
    assert_eq!(group.message_count(), 5);
    assert_eq!(group.committed_id(), 5);
    assert_eq!(group.data_size(), 20);
}

#[rstest]
fn test_message_id_validity(_setup: ()) {
    let empty = new_group(TopicMode::Normal, true);
    assert!(empty.message_id_valid(0, 42));
    assert!(!empty.message_id_valid(3, 42));

    let group = new_group(TopicMode::Normal, true);
    let request = AddMessageRequest::replicated(replicated_batch(0..4));
    group.add_message(&request, &mut WriteMetrics::default());
    group.set_committed_id(3);
    group.try_recycle(u64::MAX);
    // only id 3 is left, id 4 is the next one expected
    assert!(group.message_id_valid(3, 10_003));
    assert!(!group.message_id_valid(3, 10_004));
    assert!(group.message_id_valid(4, 10_004));
    assert!(!group.message_id_valid(4, 10_003));
    assert!(!group.message_id_valid(2, 10_002));
}

#[rstest]
#[case(WireFormat::Tagged)]
#[case(WireFormat::Flat)]
fn test_round_trip_through_group(_setup: (), #[case] format: WireFormat) {
    // small blocks force payloads across block boundaries
    let group = MessageGroup::init(
        1,
        block_pool(16, 1024),
        ChunkPool::new(8, 64),
        None,
        TopicMode::Normal,
        &GroupOptions::default(),
    )
    .unwrap();

    let mut merged_payload = BytesMut::new();
    merged_payload.extend_from_slice(&5u16.to_le_bytes());
    merged_payload.extend_from_slice(&[9u8; 40]);
    let payload = merged_payload.freeze();
    let mut merged = WireMessage::new(payload).with_payload(7, 0b100);
    merged.is_merged = true;
    merged.is_compress = true;
    let plain = WireMessage::new(Bytes::from_static(b"a plain message longer than one block"));

    let mut builder = MessageBatchBuilder::new(format);
    builder.append(&merged).append(&plain);
    let request = AddMessageRequest::new(builder.build());
    let produced = group.add_message(&request, &mut WriteMetrics::default());
    assert_eq!(produced.accepted_total_count, 6);
    group.set_committed_id(1);

    let request = GetMessageRequest::new(0, 10, 4096).with_format(format);
    let response = group.get_message(&request, None, &mut ReadMetrics::default());
    assert_eq!(response.total_count, 6);
    let messages = response.messages.to_messages().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].data, merged.data);
    assert!(messages[0].is_merged && messages[0].is_compress);
    assert_eq!((messages[0].payload, messages[0].mask_payload), (7, 0b100));
    assert_eq!(messages[1].data, plain.data);
    assert_eq!(messages[1].msg_id, 1);
}

#[rstest]
fn test_recover_then_continue(_setup: ()) {
    let snapshot = RecoverSnapshot {
        messages: (100..105)
            .map(|id| RecoverMessage {
                msg_id: id,
                timestamp: id * 10,
                payload: 0,
                data: Bytes::from(format!("persisted-{id}")),
            })
            .collect(),
    };
    let group = MessageGroup::init(
        4,
        block_pool(64, 64),
        ChunkPool::new(4, 64),
        Some(&snapshot),
        TopicMode::Normal,
        &GroupOptions::default(),
    )
    .unwrap();
    assert_eq!(group.committed_id(), 104);

    let response = group.add_message(
        &AddMessageRequest::new(produce_batch(WireFormat::Flat, 2, 4)).with_timestamps(),
        &mut WriteMetrics::default(),
    );
    assert_eq!(response.first_accepted_id, 105);
    assert!(response.timestamps[0] > 1040);
    assert_eq!(group.max_message_id(), 104);
}

#[rstest]
fn test_concurrent_produce_and_consume(_setup: ()) {
    const PRODUCERS: usize = 4;
    const BATCHES: usize = 50;
    const BATCH_SIZE: usize = 10;
    let total = (PRODUCERS * BATCHES * BATCH_SIZE) as i64;
    let group = new_group(TopicMode::Normal, true);

    thread::scope(|s| {
        for _ in 0..PRODUCERS {
            s.spawn(|| {
                let mut metrics = WriteMetrics::default();
                for _ in 0..BATCHES {
                    let batch = produce_batch(WireFormat::Flat, BATCH_SIZE, 8);
                    let request = AddMessageRequest::new(batch);
                    let response = group.add_message(&request, &mut metrics);
                    assert!(response.error_code.is_ok());
                }
            });
        }
        s.spawn(|| {
            let mut next_id = 0;
            let mut metrics = ReadMetrics::default();
            while next_id < total {
                let request = GetMessageRequest::new(next_id, 64, 4096);
                let response = group.get_message(&request, None, &mut metrics);
                let ids: Vec<i64> = response
                    .messages
                    .iter()
                    .map(|msg| msg.unwrap().msg_id)
                    .collect();
                for (offset, id) in ids.iter().enumerate() {
                    assert_eq!(*id, next_id + offset as i64);
                }
                if response.message_count > 0 {
                    next_id = response.next_id;
                } else {
                    thread::yield_now();
                }
            }
            assert_eq!(metrics.read_count as i64, total);
        });
    });

    assert_eq!(group.message_count() as i64, total);
    assert_eq!(group.last_received_id(), total - 1);
}

#[rstest]
fn test_fast_recycle_hand_off(_setup: ()) {
    let pool = block_pool(32, 256);
    let group = MessageGroup::init(
        5,
        Arc::clone(&pool),
        ChunkPool::new(8, 64),
        None,
        TopicMode::Normal,
        &GroupOptions::default(),
    )
    .unwrap();
    group.add_message(
        &AddMessageRequest::new(produce_batch(WireFormat::Flat, 64, 32)),
        &mut WriteMetrics::default(),
    );
    group.set_committed_id(63);
    let used_before = pool.used_block_count();

    let stolen = group.steal_committed_blocks(0.5).unwrap();
    assert_eq!(stolen.count(), 32);
    // stolen payloads are owned by the caller, the lock is free for writers
    let produced = thread::scope(|s| {
        s.spawn(|| {
            group.add_message(
                &AddMessageRequest::new(produce_batch(WireFormat::Flat, 4, 32)),
                &mut WriteMetrics::default(),
            )
        })
        .join()
        .unwrap()
    });
    assert_eq!(produced.accepted_count, 4);
    assert_eq!(pool.used_block_count(), used_before + 4);

    let stats = thread::spawn(move || stolen.release()).join().unwrap();
    assert_eq!(stats.count, 32);
    group.finish_fast_recycle(&stats);
    assert_eq!(pool.used_block_count(), used_before + 4 - 32);
    assert_eq!(group.data_size(), 36 * 32);
}

#[rstest]
fn test_recycle_by_slowest_reader(_setup: ()) {
    let group = new_group(TopicMode::Normal, true);
    group.add_message(
        &AddMessageRequest::new(produce_batch(WireFormat::Flat, 20, 4)),
        &mut WriteMetrics::default(),
    );
    group.set_committed_id(19);

    let readers = ReaderRegistry::new();
    let fast = readers.register(1);
    let slow = readers.register(2);
    let mut metrics = ReadMetrics::default();
    let request = GetMessageRequest::new(0, 15, 4096);
    group.get_message(&request, Some(&fast), &mut metrics);
    let request = GetMessageRequest::new(0, 6, 4096);
    group.get_message(&request, Some(&slow), &mut metrics);

    let stats = group.try_recycle_by_readers(&readers);
    assert_eq!(stats.count, 6);
    assert_eq!(group.min_message_id_by_time(0).msg_id, 6);

    readers.unregister(2);
    let stats = group.try_recycle_by_readers(&readers);
    assert_eq!(stats.count, 9);
}
