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

use tracing::trace;

use super::{MessageDeque, StolenChunks};
use crate::message::{MemoryMessage, MEMORY_MESSAGE_META_SIZE};

/// Metadata chunks detached by [`MessageDeque::steal_block`].
///
/// The messages inside still own their payload blocks. Whoever holds this
/// value is the only path to them, so it can be released without any lock.
#[derive(Debug)]
pub struct StolenBlocks {
    chunks: StolenChunks<MemoryMessage>,
}

/// Outcome of a reclamation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecycleStats {
    pub bytes: u64,
    pub count: usize,
}

impl StolenBlocks {
    pub fn start_offset(&self) -> usize {
        self.chunks.start_offset()
    }

    pub fn count(&self) -> usize {
        self.chunks.count()
    }

    pub fn block_count(&self) -> usize {
        self.chunks.chunk_count()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Destroys the stolen messages, dropping their payload blocks, and
    /// returns the payload bytes and message count reclaimed.
    pub fn release(self) -> RecycleStats {
        let mut stats = RecycleStats::default();
        self.chunks.release(|msg| {
            stats.bytes += msg.len() as u64;
            stats.count += 1;
        });
        stats
    }
}

impl MessageDeque {
    /// Pops committed messages from the front while `predicate` holds.
    ///
    /// The predicate sees the front message and the payload bytes removed so
    /// far. The most recently committed message is never removed.
    pub fn recycle<F>(&mut self, mut predicate: F) -> RecycleStats
    where
        F: FnMut(&MemoryMessage, u64) -> bool,
    {
        let mut stats = RecycleStats::default();
        while self.len() > 1 && self.committed_index > 1 {
            let Some(front) = self.front() else {
                break;
            };
            if front.msg_id() > self.last_committed_id - 1 || !predicate(front, stats.bytes) {
                break;
            }
            if let Some(msg) = self.pop_front() {
                stats.bytes += msg.len() as u64;
                stats.count += 1;
            }
        }
        if stats.count > 0 {
            trace!(
                "recycled {} messages, {} bytes, {} left",
                stats.count,
                stats.bytes,
                self.len()
            );
        }
        stats
    }

    /// Removes committed messages older than `timestamp`.
    pub fn recycle_by_timestamp(&mut self, timestamp: i64) -> RecycleStats {
        self.recycle(|msg, _| msg.timestamp() < timestamp)
    }

    /// Removes committed messages until about `target_bytes` of payload are freed,
    /// never going over the target.
    pub fn recycle_by_size(&mut self, target_bytes: u64) -> RecycleStats {
        self.recycle(|msg, removed| removed + msg.len() as u64 <= target_bytes)
    }

    /// Detaches whole metadata chunks holding at most `count` committed messages.
    ///
    /// Payload bytes of the stolen messages are unknown until they are
    /// released; report them back through [`MessageDeque::release_stolen_data_size`].
    pub fn steal_block(&mut self, count: usize) -> StolenBlocks {
        let limit = count.min(self.committed_index.saturating_sub(1));
        let chunks = self.queue.steal_front_chunks(limit);
        let stolen = chunks.count();
        self.committed_index -= stolen;
        self.meta_size -= stolen as u64 * MEMORY_MESSAGE_META_SIZE;
        trace!(
            "steal {} messages in {} chunks, start offset {}",
            stolen,
            chunks.chunk_count(),
            chunks.start_offset()
        );
        StolenBlocks { chunks }
    }

    /// Accounts payload bytes freed by releasing [`StolenBlocks`].
    pub fn release_stolen_data_size(&mut self, bytes: u64) {
        self.data_size = self.data_size.saturating_sub(bytes);
    }
}
