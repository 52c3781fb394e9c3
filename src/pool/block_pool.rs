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

//! Fixed-size payload block pool.
//!
//! Blocks are handed out as reference-counted [`BlockPtr`]s. Several message
//! records may point into the same block, and a payload that does not fit the
//! rest of a block continues in the block linked through [`Block::next`].
//! When the last handle to a block goes away its buffer goes back to the
//! pool's free list; [`BlockPool::free_unused_blocks`] trims that list down to
//! the reserve hint.

use std::sync::Arc;

use bytes::BytesMut;
use crossbeam::atomic::AtomicCell;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

pub type BlockPtr = Arc<Block>;

#[derive(Debug, Clone, Copy)]
pub struct BlockPoolOptions {
    pub block_size: usize,
    pub min_block_count: usize,
    pub max_block_count: usize,
}

#[derive(Debug)]
pub struct BlockPool {
    block_size: usize,
    min_block_count: usize,
    max_block_count: usize,
    used_block_count: AtomicCell<usize>,
    reserve_block_count: AtomicCell<usize>,
    free_list: Mutex<Vec<Box<[u8]>>>,
}

pub struct Block {
    data: RwLock<Box<[u8]>>,
    next: OnceCell<BlockPtr>,
    pool: Arc<BlockPool>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("capacity", &self.capacity())
            .field("has_next", &self.next.get().is_some())
            .finish()
    }
}

impl BlockPool {
    pub fn new(options: BlockPoolOptions) -> Arc<Self> {
        Arc::new(BlockPool {
            block_size: options.block_size,
            min_block_count: options.min_block_count,
            max_block_count: options.max_block_count,
            used_block_count: AtomicCell::new(0),
            reserve_block_count: AtomicCell::new(0),
            free_list: Mutex::new(Vec::new()),
        })
    }

    /// Hands out a zero-offset block, or `None` once `max_block_count` blocks are in use.
    pub fn allocate(self: &Arc<Self>) -> Option<BlockPtr> {
        let mut used = self.used_block_count.load();
        loop {
            if used >= self.max_block_count {
                trace!(
                    "block pool exhausted: used {} max {}",
                    used, self.max_block_count
                );
                return None;
            }
            match self.used_block_count.compare_exchange(used, used + 1) {
                Ok(_) => break,
                Err(current) => used = current,
            }
        }

        let buffer = self
            .free_list
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.block_size].into_boxed_slice());

        Some(Arc::new(Block {
            data: RwLock::new(buffer),
            next: OnceCell::new(),
            pool: Arc::clone(self),
        }))
    }

    /// Gives a handle back. The block itself returns to the pool once no
    /// other handle or chain link refers to it.
    pub fn free(&self, block: BlockPtr) {
        drop(block);
    }

    fn release(&self, buffer: Box<[u8]>) {
        self.free_list.lock().push(buffer);
        let mut used = self.used_block_count.load();
        loop {
            match self
                .used_block_count
                .compare_exchange(used, used.saturating_sub(1))
            {
                Ok(_) => break,
                Err(current) => used = current,
            }
        }
    }

    /// Drops cached free buffers beyond the reserve hint.
    pub fn free_unused_blocks(&self) -> usize {
        let reserve = self.reserve_block_count.load();
        let mut free_list = self.free_list.lock();
        let before = free_list.len();
        if before > reserve {
            free_list.truncate(reserve);
            free_list.shrink_to_fit();
        }
        let released = before - free_list.len();
        if released > 0 {
            trace!("block pool released {} cached blocks", released);
        }
        released
    }

    pub fn set_reserve_block_count(&self, count: usize) {
        self.reserve_block_count.store(count);
    }

    pub fn reserve_block_count(&self) -> usize {
        self.reserve_block_count.load()
    }

    pub fn used_block_count(&self) -> usize {
        self.used_block_count.load()
    }

    pub fn min_block_count(&self) -> usize {
        self.min_block_count
    }

    pub fn max_block_count(&self) -> usize {
        self.max_block_count
    }

    pub fn free_block_count(&self) -> usize {
        self.free_list.lock().len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Block {
    pub fn capacity(&self) -> usize {
        self.data.read().len()
    }

    /// Copies as much of `src` as fits at `offset` and returns the number of bytes written.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> usize {
        let mut data = self.data.write();
        if offset >= data.len() {
            return 0;
        }
        let n = src.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(&src[..n]);
        n
    }

    /// Appends up to `len` bytes starting at `offset` to `dst` and returns the number copied.
    pub fn read_at(&self, offset: usize, len: usize, dst: &mut BytesMut) -> usize {
        let data = self.data.read();
        if offset >= data.len() {
            return 0;
        }
        let n = len.min(data.len() - offset);
        dst.extend_from_slice(&data[offset..offset + n]);
        n
    }

    pub fn next(&self) -> Option<&BlockPtr> {
        self.next.get()
    }

    /// Links `next` after this block. A block is linked at most once; returns
    /// the block that ends up linked.
    pub fn link(&self, next: BlockPtr) -> &BlockPtr {
        self.next.get_or_init(|| next)
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        let buffer = std::mem::take(self.data.get_mut());
        self.pool.release(buffer);

        // unlink the tail iteratively so long chains never recurse
        let mut next = self.next.take();
        while let Some(block) = next {
            match Arc::try_unwrap(block) {
                Ok(mut block) => next = block.next.take(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max: usize) -> Arc<BlockPool> {
        BlockPool::new(BlockPoolOptions {
            block_size: 16,
            min_block_count: 2,
            max_block_count: max,
        })
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let pool = pool(2);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert!(pool.allocate().is_none());
        assert_eq!(pool.used_block_count(), 2);

        pool.free(a);
        assert_eq!(pool.used_block_count(), 1);
        assert_eq!(pool.free_block_count(), 1);
        assert!(pool.allocate().is_some());
        drop(b);
    }

    #[test]
    fn test_block_shared_until_last_handle() {
        let pool = pool(4);
        let block = pool.allocate().unwrap();
        let other = Arc::clone(&block);
        drop(block);
        assert_eq!(pool.used_block_count(), 1);
        drop(other);
        assert_eq!(pool.used_block_count(), 0);
    }

    #[test]
    fn test_write_read_across_chain() {
        let pool = pool(4);
        let first = pool.allocate().unwrap();
        let second = pool.allocate().unwrap();
        first.link(second);

        let payload: Vec<u8> = (0..24u8).collect();
        let written = first.write_at(4, &payload);
        assert_eq!(written, 12);
        let rest = first.next().unwrap().write_at(0, &payload[written..]);
        assert_eq!(rest, 12);

        let mut out = BytesMut::new();
        let n = first.read_at(4, 24, &mut out);
        first.next().unwrap().read_at(0, 24 - n, &mut out);
        assert_eq!(&out[..], &payload[..]);
    }

    #[test]
    fn test_long_chain_drop_returns_every_block() {
        let pool = BlockPool::new(BlockPoolOptions {
            block_size: 8,
            min_block_count: 0,
            max_block_count: 100_000,
        });
        let head = pool.allocate().unwrap();
        let mut tail = Arc::clone(&head);
        for _ in 0..50_000 {
            let next = pool.allocate().unwrap();
            tail = Arc::clone(tail.link(next));
        }
        drop(tail);
        drop(head);
        assert_eq!(pool.used_block_count(), 0);
    }

    #[test]
    fn test_free_unused_respects_reserve() {
        let pool = pool(8);
        let blocks: Vec<_> = (0..6).map(|_| pool.allocate().unwrap()).collect();
        drop(blocks);
        assert_eq!(pool.free_block_count(), 6);

        pool.set_reserve_block_count(2);
        assert_eq!(pool.free_unused_blocks(), 4);
        assert_eq!(pool.free_block_count(), 2);
    }
}
