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

use super::{MessageDeque, NO_MSG_ID, NO_TIMESTAMP};
use crate::message::MemoryMessage;

/// Read-only window over the first `len` messages of a [`MessageDeque`].
///
/// The window borrows the deque, so it stays position-stable for as long as
/// it lives: nothing can be pushed or reclaimed underneath it.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    deque: &'a MessageDeque,
    len: usize,
}

impl<'a> View<'a> {
    pub(super) fn new(deque: &'a MessageDeque, len: usize) -> Self {
        View {
            deque,
            len: len.min(deque.len()),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&'a MemoryMessage> {
        if index >= self.len {
            return None;
        }
        self.deque.get(index)
    }

    pub fn front(&self) -> Option<&'a MemoryMessage> {
        self.get(0)
    }

    pub fn back(&self) -> Option<&'a MemoryMessage> {
        self.len.checked_sub(1).and_then(|index| self.get(index))
    }

    /// Oldest retained id, whether or not it falls inside the window.
    pub fn first_msg_id(&self) -> i64 {
        self.deque.front().map_or(NO_MSG_ID, |msg| msg.msg_id())
    }

    /// Id of the last message in the window. An empty window over a
    /// non-empty deque reports the id just before the oldest retained one.
    pub fn last_msg_id(&self) -> i64 {
        match self.back() {
            Some(msg) => msg.msg_id(),
            None => self
                .deque
                .front()
                .map_or(NO_MSG_ID, |msg| msg.msg_id() - 1),
        }
    }

    pub fn next_msg_id_after_last(&self) -> i64 {
        self.last_msg_id() + 1
    }

    pub fn first_timestamp(&self) -> i64 {
        self.front().map_or(NO_TIMESTAMP, |msg| msg.timestamp())
    }

    pub fn last_timestamp(&self) -> i64 {
        self.back().map_or(NO_TIMESTAMP, |msg| msg.timestamp())
    }

    /// Index of the first message with timestamp `>= timestamp`, or `len()`.
    pub fn lower_bound(&self, timestamp: i64) -> usize {
        self.partition_point(|msg| msg.timestamp() < timestamp)
    }

    /// Index of the first message with timestamp `> timestamp`, or `len()`.
    pub fn upper_bound(&self, timestamp: i64) -> usize {
        self.partition_point(|msg| msg.timestamp() <= timestamp)
    }

    /// Position of `msg_id` inside the window. Ids are contiguous, so this is
    /// plain arithmetic against the front.
    pub fn index_of(&self, msg_id: i64) -> Option<usize> {
        let first = self.front()?.msg_id();
        let index = usize::try_from(msg_id.checked_sub(first)?).ok()?;
        (index < self.len).then_some(index)
    }

    /// Index `msg_id` has or would have, clamped to `[0, len()]`.
    pub fn position_of(&self, msg_id: i64) -> usize {
        let Some(first) = self.front().map(|msg| msg.msg_id()) else {
            return 0;
        };
        if msg_id <= first {
            return 0;
        }
        msg_id
            .checked_sub(first)
            .and_then(|distance| usize::try_from(distance).ok())
            .map_or(self.len, |index| index.min(self.len))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a MemoryMessage> + 'a {
        self.deque.iter().take(self.len)
    }

    fn partition_point<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&MemoryMessage) -> bool,
    {
        let (mut low, mut high) = (0, self.len);
        while low < high {
            let mid = low + (high - low) / 2;
            match self.get(mid) {
                Some(msg) if pred(msg) => low = mid + 1,
                _ => high = mid,
            }
        }
        low
    }
}

#[cfg(test)]
mod tests {
    use crate::deque::tests::Fixture;

    #[test]
    fn test_committed_and_full_windows() {
        let mut f = Fixture::new(4);
        f.push_range(0, 10, 2);
        f.deque.set_committed_msg_id(5);

        let committed = f.deque.create_view(false);
        assert_eq!(committed.len(), 6);
        assert_eq!(committed.last_msg_id(), 5);
        assert_eq!(committed.last_timestamp(), 50);
        assert!(committed.get(6).is_none());

        let full = f.deque.create_view(true);
        assert_eq!(full.len(), 10);
        assert_eq!(full.next_msg_id_after_last(), 10);
        assert_eq!(full.iter().count(), 10);
    }

    #[test]
    fn test_empty_window_over_retained_messages() {
        let mut f = Fixture::new(4);
        f.push_range(20, 25, 1);
        let view = f.deque.create_view(false);
        assert!(view.is_empty());
        assert_eq!(view.first_msg_id(), 20);
        assert_eq!(view.last_msg_id(), 19);
        assert_eq!(view.next_msg_id_after_last(), 20);
    }

    #[test]
    fn test_timestamp_bounds() {
        let mut f = Fixture::new(4);
        // timestamps 0, 10, ..., 90
        f.push_range(0, 10, 1);
        let view = f.deque.create_view(true);
        assert_eq!(view.lower_bound(-5), 0);
        assert_eq!(view.lower_bound(30), 3);
        assert_eq!(view.lower_bound(31), 4);
        assert_eq!(view.upper_bound(30), 4);
        assert_eq!(view.lower_bound(1000), 10);
        assert_eq!(view.upper_bound(90), 10);
    }

    #[test]
    fn test_index_of() {
        let mut f = Fixture::new(4);
        f.push_range(7, 12, 1);
        let view = f.deque.create_view(true);
        assert_eq!(view.index_of(7), Some(0));
        assert_eq!(view.index_of(11), Some(4));
        assert_eq!(view.index_of(12), None);
        assert_eq!(view.index_of(6), None);
        assert_eq!(view.index_of(i64::MAX), None);
        assert_eq!(view.index_of(i64::MIN), None);
    }

    #[test]
    fn test_position_of_clamps() {
        let mut f = Fixture::new(4);
        f.push_range(-5, 3, 1);
        let view = f.deque.create_view(true);
        assert_eq!(view.position_of(-5), 0);
        assert_eq!(view.position_of(0), 5);
        assert_eq!(view.position_of(i64::MIN), 0);
        assert_eq!(view.position_of(i64::MAX), 8);
        assert_eq!(f.deque.create_view(false).position_of(1), 0);
    }
}
