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

use chrono::Utc;

/// Hands out message timestamps in microseconds.
///
/// The wall clock is shifted by a fixed offset so that several brokers with
/// skewed clocks can be lined up. Successive timestamps are strictly
/// increasing even if the clock stalls or steps back.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampAllocator {
    offset_us: i64,
}

impl TimestampAllocator {
    pub fn new(offset_us: i64) -> Self {
        TimestampAllocator { offset_us }
    }

    pub fn offset(&self) -> i64 {
        self.offset_us
    }

    pub fn current_timestamp(&self) -> i64 {
        Utc::now().timestamp_micros().saturating_add(self.offset_us)
    }

    /// Next timestamp strictly greater than `previous`.
    pub fn next_msg_timestamp(&self, previous: i64) -> i64 {
        self.current_timestamp().max(previous.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let allocator = TimestampAllocator::new(0);
        let mut previous = allocator.current_timestamp();
        for _ in 0..1000 {
            let next = allocator.next_msg_timestamp(previous);
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_previous_in_the_future() {
        let allocator = TimestampAllocator::new(0);
        let future = allocator.current_timestamp() + 60_000_000;
        assert_eq!(allocator.next_msg_timestamp(future), future + 1);
    }

    #[test]
    fn test_offset_shifts_clock() {
        let plain = TimestampAllocator::new(0);
        let shifted = TimestampAllocator::new(3_600_000_000);
        let skew = shifted.current_timestamp() - plain.current_timestamp();
        assert!(skew >= 3_600_000_000 - 1_000_000);
    }
}
