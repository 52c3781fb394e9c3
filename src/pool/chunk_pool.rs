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

use crossbeam::atomic::AtomicCell;

/// Accounting pool for the fixed-size metadata chunks backing message deques.
///
/// Chunk storage itself lives with the deque; this pool only bounds how many
/// chunks all partitions together may hold, so that `reserve` can push back.
#[derive(Debug)]
pub struct ChunkPool {
    records_per_chunk: usize,
    max_chunks: usize,
    used_chunks: AtomicCell<usize>,
}

/// One acquired chunk. Dropping the lease hands the chunk back.
#[derive(Debug)]
pub struct ChunkLease {
    pool: Arc<ChunkPool>,
}

impl ChunkPool {
    pub fn new(records_per_chunk: usize, max_chunks: usize) -> Arc<Self> {
        Arc::new(ChunkPool {
            records_per_chunk: records_per_chunk.max(1),
            max_chunks,
            used_chunks: AtomicCell::new(0),
        })
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<ChunkLease> {
        let mut used = self.used_chunks.load();
        loop {
            if used >= self.max_chunks {
                return None;
            }
            match self.used_chunks.compare_exchange(used, used + 1) {
                Ok(_) => {
                    return Some(ChunkLease {
                        pool: Arc::clone(self),
                    })
                }
                Err(current) => used = current,
            }
        }
    }

    pub fn records_per_chunk(&self) -> usize {
        self.records_per_chunk
    }

    pub fn used_chunks(&self) -> usize {
        self.used_chunks.load()
    }

    pub fn available_chunks(&self) -> usize {
        self.max_chunks.saturating_sub(self.used_chunks.load())
    }
}

impl Drop for ChunkLease {
    fn drop(&mut self) {
        let mut used = self.pool.used_chunks.load();
        loop {
            match self
                .pool
                .used_chunks
                .compare_exchange(used, used.saturating_sub(1))
            {
                Ok(_) => break,
                Err(current) => used = current,
            }
        }
    }
}
