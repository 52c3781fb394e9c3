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
use dashmap::DashMap;
use tracing::trace;

use crate::deque::{NO_MSG_ID, NO_TIMESTAMP};

pub type ReaderId = u64;

/// Read progress of one consumer, updated without locking by every read.
#[derive(Debug)]
pub struct ReaderInfo {
    reader_id: ReaderId,
    last_read_id: AtomicCell<i64>,
    last_read_timestamp: AtomicCell<i64>,
}

impl ReaderInfo {
    pub fn new(reader_id: ReaderId) -> Self {
        ReaderInfo {
            reader_id,
            last_read_id: AtomicCell::new(NO_MSG_ID),
            last_read_timestamp: AtomicCell::new(NO_TIMESTAMP),
        }
    }

    pub fn reader_id(&self) -> ReaderId {
        self.reader_id
    }

    /// Next id this reader will ask for.
    pub fn last_read_id(&self) -> i64 {
        self.last_read_id.load()
    }

    /// Everything older than this has been read.
    pub fn last_read_timestamp(&self) -> i64 {
        self.last_read_timestamp.load()
    }

    pub fn advance(&self, next_id: i64, next_timestamp: i64) {
        self.last_read_id.store(next_id);
        self.last_read_timestamp.store(next_timestamp);
    }
}

/// Readers attached to a partition.
#[derive(Debug, Default)]
pub struct ReaderRegistry {
    readers: DashMap<ReaderId, Arc<ReaderInfo>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reader's progress record, creating it on first use.
    pub fn register(&self, reader_id: ReaderId) -> Arc<ReaderInfo> {
        let reader = self
            .readers
            .entry(reader_id)
            .or_insert_with(|| Arc::new(ReaderInfo::new(reader_id)));
        Arc::clone(reader.value())
    }

    pub fn unregister(&self, reader_id: ReaderId) -> Option<Arc<ReaderInfo>> {
        let removed = self.readers.remove(&reader_id).map(|(_, reader)| reader);
        if removed.is_some() {
            trace!("reader {} unregistered", reader_id);
        }
        removed
    }

    pub fn get(&self, reader_id: ReaderId) -> Option<Arc<ReaderInfo>> {
        self.readers
            .get(&reader_id)
            .map(|reader| Arc::clone(reader.value()))
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Position of the slowest reader, `None` without readers. A reader that
    /// has not read anything yet pins everything.
    pub fn min_read_timestamp(&self) -> Option<i64> {
        self.readers
            .iter()
            .map(|reader| reader.value().last_read_timestamp())
            .min()
    }
}
