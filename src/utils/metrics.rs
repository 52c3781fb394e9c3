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

use tracing::debug;

/// Counters filled by one produce call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteMetrics {
    pub accepted_count: u64,
    /// Logical messages, counting every member of a merged bundle.
    pub accepted_total_count: u64,
    pub accepted_bytes: u64,
    pub compressed_count: u64,
    /// Union of the mask tags seen, a compact summary for consumer filters.
    pub mask_union: u16,
}

/// Counters filled by one consume call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadMetrics {
    pub read_count: u64,
    pub read_total_count: u64,
    pub read_bytes: u64,
    pub filtered_count: u64,
}

impl WriteMetrics {
    pub fn merge(&mut self, other: &WriteMetrics) {
        self.accepted_count += other.accepted_count;
        self.accepted_total_count += other.accepted_total_count;
        self.accepted_bytes += other.accepted_bytes;
        self.compressed_count += other.compressed_count;
        self.mask_union |= other.mask_union;
    }

    pub fn report(&self, partition_id: u32) {
        debug!(
            partition_id,
            accepted = self.accepted_count,
            total = self.accepted_total_count,
            bytes = self.accepted_bytes,
            compressed = self.compressed_count,
            mask_union = self.mask_union,
            "write metrics"
        );
    }
}

impl ReadMetrics {
    pub fn merge(&mut self, other: &ReadMetrics) {
        self.read_count += other.read_count;
        self.read_total_count += other.read_total_count;
        self.read_bytes += other.read_bytes;
        self.filtered_count += other.filtered_count;
    }

    pub fn report(&self, partition_id: u32) {
        debug!(
            partition_id,
            read = self.read_count,
            total = self.read_total_count,
            bytes = self.read_bytes,
            filtered = self.filtered_count,
            "read metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates() {
        let mut total = WriteMetrics::default();
        let batch = WriteMetrics {
            accepted_count: 2,
            accepted_total_count: 5,
            accepted_bytes: 64,
            compressed_count: 1,
            mask_union: 0b01,
        };
        total.merge(&batch);
        total.merge(&WriteMetrics {
            mask_union: 0b10,
            ..batch
        });
        assert_eq!(total.accepted_count, 4);
        assert_eq!(total.accepted_total_count, 10);
        assert_eq!(total.mask_union, 0b11);

        let mut read = ReadMetrics::default();
        read.merge(&ReadMetrics {
            read_count: 3,
            read_total_count: 3,
            read_bytes: 30,
            filtered_count: 1,
        });
        assert_eq!(read.read_bytes, 30);
    }
}
