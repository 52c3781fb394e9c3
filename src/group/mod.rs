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

//! Per-partition message group.
//!
//! A [`MessageGroup`] owns the partition's [`MessageDeque`], its timestamp
//! allocator and the converter's write cursor, all behind one reader-writer
//! lock:
//! - writer: produce, commit, the logical recycle paths and the two critical
//!   sections of the fast recycle
//! - reader: consume and every accessor
//!
//! The impl is split by concern: loading in `group_load`, produce in
//! `group_write`, consume and lookups in `group_read`, reclamation in
//! `group_recycle`.
mod group_load;
mod group_read;
mod group_recycle;
mod group_write;
mod reader;

use std::sync::Arc;

use parking_lot::RwLock;

pub use group_load::{RecoverMessage, RecoverSnapshot};
pub use group_read::{GetMessageRequest, GetMessageResponse, MinIdByTime};
pub use group_write::{AddMessageRequest, AddMessageResponse};
pub use reader::{ReaderId, ReaderInfo, ReaderRegistry};

use crate::deque::MessageDeque;
use crate::message::MessageConverter;
use crate::pool::BlockPool;
use crate::utils::TimestampAllocator;

/// How the topic a partition belongs to is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TopicMode {
    #[default]
    Normal,
    /// consumers only ever see committed messages
    Security,
    /// no durable copy exists
    MemoryOnly,
    /// the durable copy is best effort, memory is authoritative
    MemoryPreferred,
}

/// Per-partition knobs, usually built from the `[group]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOptions {
    pub read_not_committed: bool,
    pub timestamp_offset: i64,
    /// Time window of recent writes the block pool should keep headroom for
    /// after a recycle, in microseconds.
    pub reserve_lookback_us: i64,
}

impl Default for GroupOptions {
    fn default() -> Self {
        GroupOptions {
            read_not_committed: false,
            timestamp_offset: 0,
            reserve_lookback_us: 1_000_000,
        }
    }
}

/// Oldest and newest timestamps currently retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecycleInfo {
    pub oldest_timestamp: i64,
    pub newest_timestamp: i64,
}

#[derive(Debug)]
struct GroupInner {
    deque: MessageDeque,
    ts_allocator: TimestampAllocator,
    converter: MessageConverter,
}

#[derive(Debug)]
pub struct MessageGroup {
    partition_id: u32,
    block_pool: Arc<BlockPool>,
    inner: RwLock<GroupInner>,
    topic_mode: TopicMode,
    read_not_committed: bool,
    reserve_lookback_us: i64,
}

impl MessageGroup {
    /// Whether consumers of a `topic_mode` partition may see uncommitted messages.
    pub fn can_read_not_committed_msg(requested: bool, topic_mode: TopicMode) -> bool {
        match topic_mode {
            TopicMode::Security => false,
            TopicMode::MemoryOnly | TopicMode::MemoryPreferred => true,
            TopicMode::Normal => requested,
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn topic_mode(&self) -> TopicMode {
        self.topic_mode
    }

    pub fn read_not_committed(&self) -> bool {
        self.read_not_committed
    }

    pub fn block_pool(&self) -> &Arc<BlockPool> {
        &self.block_pool
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::{BlockPoolOptions, ChunkPool};
    use crate::protocol::{MessageBatch, MessageBatchBuilder, WireFormat, WireMessage};

    pub(crate) fn block_pool(block_size: usize, max_blocks: usize) -> Arc<BlockPool> {
        BlockPool::new(BlockPoolOptions {
            block_size,
            min_block_count: 0,
            max_block_count: max_blocks,
        })
    }

    pub(crate) fn group_with(
        pool: Arc<BlockPool>,
        topic_mode: TopicMode,
        read_not_committed: bool,
    ) -> MessageGroup {
        let options = GroupOptions {
            read_not_committed,
            ..Default::default()
        };
        MessageGroup::init(7, pool, ChunkPool::new(8, 1024), None, topic_mode, &options)
            .unwrap()
    }

    pub(crate) fn group() -> MessageGroup {
        group_with(block_pool(256, 1024), TopicMode::Normal, true)
    }

    /// `count` messages of `len` bytes, payload tag = position in the batch.
    pub(crate) fn batch(format: WireFormat, count: usize, len: usize) -> MessageBatch {
        let mut builder = MessageBatchBuilder::new(format);
        for i in 0..count {
            let data = vec![b'a' + (i % 26) as u8; len];
            builder.append(&WireMessage::new(data).with_payload(i as u16, 0));
        }
        builder.build()
    }

    /// Replicated messages with ids `from..to` and timestamp `1000 + id`.
    pub(crate) fn replicated_batch(from: i64, to: i64) -> MessageBatch {
        let mut builder = MessageBatchBuilder::new(WireFormat::Flat);
        for id in from..to {
            let data = format!("msg-{id}");
            builder.append(&WireMessage::new(data).with_id(id, 1000 + id));
        }
        builder.build()
    }

    #[test]
    fn test_read_not_committed_policy() {
        assert!(!MessageGroup::can_read_not_committed_msg(true, TopicMode::Security));
        assert!(MessageGroup::can_read_not_committed_msg(false, TopicMode::MemoryOnly));
        assert!(MessageGroup::can_read_not_committed_msg(false, TopicMode::MemoryPreferred));
        assert!(MessageGroup::can_read_not_committed_msg(true, TopicMode::Normal));
        assert!(!MessageGroup::can_read_not_committed_msg(false, TopicMode::Normal));
    }
}
