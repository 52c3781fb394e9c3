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

//! Ordered in-memory buffer of one partition's messages.
//!
//! # Ordering
//!
//! Messages are appended at the back and reclaimed from the front. Ids of
//! neighbouring messages differ by exactly one and timestamps never decrease;
//! the caller assigns both before `push_back`.
//!
//! # Commit tracking
//!
//! `committed_index` counts the contiguous prefix known to be durably
//! committed. It only moves forward through [`MessageDeque::set_committed_msg_id`]
//! and only moves back when committed messages are reclaimed.
//!
//! # Reclamation
//!
//! - logical: [`MessageDeque::recycle`] pops message by message
//! - physical: [`MessageDeque::steal_block`] detaches whole metadata chunks
//!
//! Both always leave the most recently committed message in place.

mod chunked_queue;
mod recycle;
mod view;

use std::sync::Arc;

use tracing::warn;

pub use chunked_queue::{ChunkedQueue, StolenChunks};
pub use recycle::{RecycleStats, StolenBlocks};
pub use view::View;

use crate::message::{MemoryMessage, MEMORY_MESSAGE_META_SIZE};
use crate::pool::ChunkPool;
use crate::{AppError, AppResult};

/// Id reported when nothing has ever been received or committed.
pub const NO_MSG_ID: i64 = -1;
/// Timestamp reported when nothing has ever been accepted.
pub const NO_TIMESTAMP: i64 = -1;

#[derive(Debug)]
pub struct MessageDeque {
    queue: ChunkedQueue<MemoryMessage>,
    committed_index: usize,
    last_committed_id: i64,
    data_size: u64,
    meta_size: u64,
    left_to_be_committed_data_size: u64,
    last_accepted_timestamp: i64,
}

impl MessageDeque {
    pub fn new(chunk_pool: Arc<ChunkPool>) -> Self {
        MessageDeque {
            queue: ChunkedQueue::new(chunk_pool),
            committed_index: 0,
            last_committed_id: NO_MSG_ID,
            data_size: 0,
            meta_size: 0,
            left_to_be_committed_data_size: 0,
            last_accepted_timestamp: NO_TIMESTAMP,
        }
    }

    /// Pre-allocates metadata room for `count` more messages.
    /// `false` means the metadata pool is exhausted and the caller should back off.
    pub fn reserve(&mut self, count: usize) -> bool {
        self.queue.reserve(count)
    }

    pub fn push_back(&mut self, msg: MemoryMessage) -> AppResult<()> {
        let len = msg.len() as u64;
        let msg_id = msg.msg_id();
        let timestamp = msg.timestamp();
        let fully_committed = self.committed_index == self.queue.len();

        self.queue.push_back(msg).map_err(|msg| {
            AppError::Busy(format!("no metadata chunk for message {}", msg.msg_id()))
        })?;

        self.data_size += len;
        self.meta_size += MEMORY_MESSAGE_META_SIZE;
        self.last_accepted_timestamp = timestamp;
        if fully_committed && msg_id <= self.last_committed_id {
            // commit already announced for this id
            self.committed_index += 1;
        } else {
            self.left_to_be_committed_data_size += len;
        }
        Ok(())
    }

    pub fn front(&self) -> Option<&MemoryMessage> {
        self.queue.front()
    }

    pub fn back(&self) -> Option<&MemoryMessage> {
        self.queue.back()
    }

    pub fn get(&self, index: usize) -> Option<&MemoryMessage> {
        self.queue.get(index)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Removes the oldest message. Only meaningful once it is committed; the
    /// recycle paths check that before popping.
    pub fn pop_front(&mut self) -> Option<MemoryMessage> {
        let msg = self.queue.pop_front()?;
        let len = msg.len() as u64;
        self.data_size -= len;
        self.meta_size -= MEMORY_MESSAGE_META_SIZE;
        if self.committed_index > 0 {
            self.committed_index -= 1;
        } else {
            self.left_to_be_committed_data_size -= len;
        }
        Some(msg)
    }

    /// Marks every message with id `<= msg_id` as committed and returns the
    /// payload bytes that became committed by this call.
    ///
    /// A smaller id than the current commit point is ignored.
    pub fn set_committed_msg_id(&mut self, msg_id: i64) -> u64 {
        if msg_id < self.last_committed_id {
            warn!(
                "ignore commit regression from {} to {}",
                self.last_committed_id, msg_id
            );
            return 0;
        }
        self.last_committed_id = msg_id;

        let mut committed_bytes = 0;
        while let Some(msg) = self.queue.get(self.committed_index) {
            if msg.msg_id() > msg_id {
                break;
            }
            committed_bytes += msg.len() as u64;
            self.committed_index += 1;
        }
        self.left_to_be_committed_data_size -= committed_bytes;
        committed_bytes
    }

    pub fn committed_msg_id(&self) -> i64 {
        self.last_committed_id
    }

    pub fn committed_index(&self) -> usize {
        self.committed_index
    }

    /// Timestamp of the newest committed message still retained.
    pub fn committed_timestamp(&self) -> i64 {
        self.committed_index
            .checked_sub(1)
            .and_then(|index| self.queue.get(index))
            .map_or(NO_TIMESTAMP, |msg| msg.timestamp())
    }

    /// A window over everything, or only over the committed prefix.
    pub fn create_view(&self, include_uncommitted: bool) -> View<'_> {
        let len = if include_uncommitted {
            self.queue.len()
        } else {
            self.committed_index
        };
        View::new(self, len)
    }

    pub fn last_msg_id(&self) -> i64 {
        self.back().map_or(NO_MSG_ID, |msg| msg.msg_id())
    }

    pub fn last_accepted_timestamp(&self) -> i64 {
        self.last_accepted_timestamp
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn meta_size(&self) -> u64 {
        self.meta_size
    }

    pub fn left_to_be_committed_data_size(&self) -> u64 {
        self.left_to_be_committed_data_size
    }

    /// Messages that fit in already acquired metadata chunks.
    pub fn remain_meta_count(&self) -> usize {
        self.queue.free_slots()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryMessage> {
        self.queue.iter()
    }
}
