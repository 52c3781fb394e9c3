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

//! Opening a partition's group, optionally from a durable snapshot.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{GroupInner, GroupOptions, MessageGroup, TopicMode};
use crate::deque::MessageDeque;
use crate::message::MessageConverter;
use crate::pool::{BlockPool, ChunkPool};
use crate::protocol::WireMessage;
use crate::utils::TimestampAllocator;
use crate::{AppError, AppResult};

/// A message as persisted by the durable log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverMessage {
    pub msg_id: i64,
    pub timestamp: i64,
    pub payload: u16,
    pub data: Bytes,
}

/// Messages to replay into memory when a partition is reopened. All of them
/// are treated as committed.
#[derive(Debug, Clone, Default)]
pub struct RecoverSnapshot {
    pub messages: Vec<RecoverMessage>,
}

impl MessageGroup {
    /// Builds the group for `partition_id`, replaying `recover` if given.
    ///
    /// # Errors
    ///
    /// - `Busy` if the metadata or block pool cannot hold the snapshot
    /// - `InvalidValue` if snapshot ids are not contiguous or timestamps go back
    ///
    /// Either aborts the whole recovery.
    pub fn init(
        partition_id: u32,
        block_pool: Arc<BlockPool>,
        chunk_pool: Arc<ChunkPool>,
        recover: Option<&RecoverSnapshot>,
        topic_mode: TopicMode,
        options: &GroupOptions,
    ) -> AppResult<Self> {
        let mut inner = GroupInner {
            deque: MessageDeque::new(chunk_pool),
            ts_allocator: TimestampAllocator::new(options.timestamp_offset),
            converter: MessageConverter::new(Arc::clone(&block_pool)),
        };
        if let Some(snapshot) = recover {
            Self::replay(partition_id, &mut inner, snapshot)?;
        }

        let read_not_committed =
            Self::can_read_not_committed_msg(options.read_not_committed, topic_mode);
        debug!(
            "partition {} opened, mode {:?}, read not committed {}",
            partition_id, topic_mode, read_not_committed
        );
        Ok(MessageGroup {
            partition_id,
            block_pool,
            inner: RwLock::new(inner),
            topic_mode,
            read_not_committed,
            reserve_lookback_us: options.reserve_lookback_us,
        })
    }

    fn replay(
        partition_id: u32,
        inner: &mut GroupInner,
        snapshot: &RecoverSnapshot,
    ) -> AppResult<()> {
        let Some(last) = snapshot.messages.last() else {
            return Ok(());
        };
        if !inner.deque.reserve(snapshot.messages.len()) {
            return Err(AppError::Busy(format!(
                "no metadata room to recover {} messages of partition {}",
                snapshot.messages.len(),
                partition_id
            )));
        }

        let mut previous: Option<&RecoverMessage> = None;
        for msg in &snapshot.messages {
            if let Some(prev) = previous {
                if msg.msg_id != prev.msg_id + 1 || msg.timestamp < prev.timestamp {
                    return Err(AppError::InvalidValue(format!(
                        "recover message {}@{} does not follow {}@{}",
                        msg.msg_id, msg.timestamp, prev.msg_id, prev.timestamp
                    )));
                }
            }
            let wire = WireMessage::new(msg.data.clone())
                .with_id(msg.msg_id, msg.timestamp)
                .with_payload(msg.payload, 0);
            let record = inner.converter.encode(&wire)?;
            inner.deque.push_back(record)?;
            previous = Some(msg);
        }
        inner.deque.set_committed_msg_id(last.msg_id);

        info!(
            "partition {} recovered {} messages, last id {}",
            partition_id,
            snapshot.messages.len(),
            last.msg_id
        );
        Ok(())
    }
}
