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

//! Memory reclamation.
//!
//! Two strategies:
//! - logical ([`MessageGroup::try_recycle`], [`MessageGroup::try_recycle_by_reader_info`]):
//!   pops committed messages one by one under the writer lock
//! - physical ([`MessageGroup::try_recycle_fast`]): steals whole metadata chunks
//!   under the lock, destroys them unlocked, then relocks for the counters
//!
//! Each pass ends by telling the block pool how many free blocks to keep around
//! for the writes that will follow.

use tracing::debug;

use super::{MessageGroup, ReaderRegistry};
use crate::deque::{MessageDeque, RecycleStats, StolenBlocks};

impl MessageGroup {
    /// Worth recycling: there is something committed at the front and the
    /// block pool is above three quarters of its minimum.
    pub fn can_recycle(&self) -> bool {
        let inner = self.inner.read();
        if inner.deque.create_view(true).is_empty() {
            return false;
        }
        if self.block_pool.used_block_count() * 4 <= self.block_pool.min_block_count() * 3 {
            return false;
        }
        inner.deque.committed_index() > 0
    }

    /// Frees committed messages from the front up to `target_bytes` of payload.
    pub fn try_recycle(&self, target_bytes: u64) -> RecycleStats {
        let (stats, reserve) = {
            let mut inner = self.inner.write();
            let stats = inner.deque.recycle_by_size(target_bytes);
            (stats, self.reserve_block_hint(&inner.deque))
        };
        self.apply_reserve_hint(reserve, &stats);
        stats
    }

    /// Frees committed messages older than `min_timestamp`, the oldest
    /// position any reader still needs.
    pub fn try_recycle_by_reader_info(&self, min_timestamp: i64) -> RecycleStats {
        let (stats, reserve) = {
            let mut inner = self.inner.write();
            let stats = inner.deque.recycle_by_timestamp(min_timestamp);
            (stats, self.reserve_block_hint(&inner.deque))
        };
        self.apply_reserve_hint(reserve, &stats);
        stats
    }

    /// Recycles by timestamp up to the slowest registered reader. Nothing is
    /// freed while no reader is registered.
    pub fn try_recycle_by_readers(&self, readers: &ReaderRegistry) -> RecycleStats {
        match readers.min_read_timestamp() {
            Some(min_timestamp) => self.try_recycle_by_reader_info(min_timestamp),
            None => RecycleStats::default(),
        }
    }

    /// Frees about `fraction` of the retained messages in whole metadata chunks.
    pub fn try_recycle_fast(&self, fraction: f64) -> RecycleStats {
        let Some(stolen) = self.steal_committed_blocks(fraction) else {
            return RecycleStats::default();
        };
        // payload blocks are dropped here, outside the lock
        let stats = stolen.release();
        self.finish_fast_recycle(&stats);
        stats
    }

    /// First critical section of the fast recycle: detaches the chunks
    /// holding `fraction` of the window, provided they are all committed.
    pub fn steal_committed_blocks(&self, fraction: f64) -> Option<StolenBlocks> {
        let mut inner = self.inner.write();
        let view_len = inner.deque.create_view(true).len();
        let count = (view_len as f64 * fraction.clamp(0.0, 1.0)) as usize;
        if count == 0 || count > inner.deque.committed_index() {
            return None;
        }
        let stolen = inner.deque.steal_block(count);
        (!stolen.is_empty()).then_some(stolen)
    }

    /// Second critical section of the fast recycle: accounts the payload
    /// bytes released from stolen blocks and refreshes the pool reserve.
    pub fn finish_fast_recycle(&self, stats: &RecycleStats) {
        let reserve = {
            let mut inner = self.inner.write();
            inner.deque.release_stolen_data_size(stats.bytes);
            self.reserve_block_hint(&inner.deque)
        };
        self.apply_reserve_hint(reserve, stats);
    }

    /// Blocks to keep in reserve: the share of the retained time span covered
    /// by the lookback window, applied to the blocks in use.
    fn reserve_block_hint(&self, deque: &MessageDeque) -> usize {
        let used = self.block_pool.used_block_count();
        let (Some(oldest), Some(newest)) = (deque.front(), deque.back()) else {
            return 0;
        };
        let span = newest.timestamp() - oldest.timestamp();
        let ratio = if span <= 0 {
            1.0
        } else {
            (self.reserve_lookback_us.max(0) as f64 / span as f64).min(1.0)
        };
        (ratio * used as f64).ceil() as usize
    }

    fn apply_reserve_hint(&self, reserve: usize, stats: &RecycleStats) {
        self.block_pool.set_reserve_block_count(reserve);
        let released = self.block_pool.free_unused_blocks();
        debug!(
            "partition {} recycled {} messages, {} bytes, reserve {} blocks, released {}",
            self.partition_id, stats.count, stats.bytes, reserve, released
        );
    }
}
