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

use std::collections::VecDeque;
use std::sync::Arc;

use crate::pool::{ChunkLease, ChunkPool};

/// A fixed-capacity run of slots. Slots are filled once and consumed from the
/// front; a consumed slot is never reused, so every chunk except the tail has
/// `consumed + entries.len() == capacity`.
#[derive(Debug)]
struct Chunk<T> {
    lease: ChunkLease,
    entries: VecDeque<T>,
    consumed: usize,
}

/// FIFO queue stored in pool-accounted chunks with O(1) push, pop and indexing.
#[derive(Debug)]
pub struct ChunkedQueue<T> {
    pool: Arc<ChunkPool>,
    per_chunk: usize,
    chunks: VecDeque<Chunk<T>>,
    spare: Vec<ChunkLease>,
    len: usize,
}

/// Whole chunks taken off the front of a [`ChunkedQueue`], owned by the caller.
#[derive(Debug)]
pub struct StolenChunks<T> {
    start_offset: usize,
    chunks: Vec<(ChunkLease, VecDeque<T>)>,
    count: usize,
}

impl<T> Chunk<T> {
    fn new(lease: ChunkLease, capacity: usize) -> Self {
        Chunk {
            lease,
            entries: VecDeque::with_capacity(capacity),
            consumed: 0,
        }
    }

    fn used_slots(&self) -> usize {
        self.consumed + self.entries.len()
    }
}

impl<T> ChunkedQueue<T> {
    pub fn new(pool: Arc<ChunkPool>) -> Self {
        let per_chunk = pool.records_per_chunk();
        ChunkedQueue {
            pool,
            per_chunk,
            chunks: VecDeque::new(),
            spare: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn records_per_chunk(&self) -> usize {
        self.per_chunk
    }

    /// Slots that can be filled without asking the pool for another chunk.
    pub fn free_slots(&self) -> usize {
        let tail_free = self
            .chunks
            .back()
            .map(|chunk| self.per_chunk - chunk.used_slots())
            .unwrap_or(0);
        tail_free + self.spare.len() * self.per_chunk
    }

    /// Makes room for `additional` more pushes. Returns false when the pool
    /// cannot supply enough chunks; chunks acquired so far are kept.
    pub fn reserve(&mut self, additional: usize) -> bool {
        while self.free_slots() < additional {
            match self.pool.try_acquire() {
                Some(lease) => self.spare.push(lease),
                None => return false,
            }
        }
        true
    }

    /// Appends `item`, handing it back if no chunk is available.
    pub fn push_back(&mut self, item: T) -> Result<(), T> {
        let tail_full = self
            .chunks
            .back()
            .map_or(true, |chunk| chunk.used_slots() >= self.per_chunk);
        if tail_full {
            let lease = match self.spare.pop().or_else(|| self.pool.try_acquire()) {
                Some(lease) => lease,
                None => return Err(item),
            };
            self.chunks.push_back(Chunk::new(lease, self.per_chunk));
        }
        if let Some(tail) = self.chunks.back_mut() {
            tail.entries.push_back(item);
            self.len += 1;
        }
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let front = self.chunks.front_mut()?;
        let item = front.entries.pop_front()?;
        front.consumed += 1;
        self.len -= 1;
        if front.entries.is_empty() && front.consumed >= self.per_chunk {
            if let Some(chunk) = self.chunks.pop_front() {
                // keep one chunk around for the next push
                if self.spare.is_empty() {
                    self.spare.push(chunk.lease);
                }
            }
        }
        Some(item)
    }

    pub fn front(&self) -> Option<&T> {
        self.chunks.front().and_then(|chunk| chunk.entries.front())
    }

    pub fn back(&self) -> Option<&T> {
        self.chunks.back().and_then(|chunk| chunk.entries.back())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let front = self.chunks.front()?;
        let slot = front.consumed + index;
        let chunk = self.chunks.get(slot / self.per_chunk)?;
        let within = (slot % self.per_chunk).checked_sub(chunk.consumed)?;
        chunk.entries.get(within)
    }

    /// Detaches whole chunks from the front while their entries add up to at
    /// most `max_count`. The tail chunk is never taken.
    pub fn steal_front_chunks(&mut self, max_count: usize) -> StolenChunks<T> {
        let start_offset = self.chunks.front().map_or(0, |chunk| chunk.consumed);
        let mut stolen = Vec::new();
        let mut count = 0;
        while self.chunks.len() > 1 {
            let entries = self.chunks.front().map_or(0, |chunk| chunk.entries.len());
            if count + entries > max_count {
                break;
            }
            if let Some(chunk) = self.chunks.pop_front() {
                count += entries;
                stolen.push((chunk.lease, chunk.entries));
            }
        }
        self.len -= count;
        StolenChunks {
            start_offset,
            chunks: stolen,
            count,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|chunk| chunk.entries.iter())
    }
}

impl<T> StolenChunks<T> {
    /// Slot of the first live entry within the first stolen chunk.
    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Destroys every entry, handing each to `on_entry` first, then gives the chunks back.
    pub fn release(self, mut on_entry: impl FnMut(T)) {
        for (lease, entries) in self.chunks {
            entries.into_iter().for_each(&mut on_entry);
            drop(lease);
        }
    }
}
