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

//! Consume path and read-only lookups.

use bytes::BytesMut;
use tracing::{trace, warn};

use super::{MessageGroup, ReaderInfo, RecycleInfo, TopicMode};
use crate::deque::{View, NO_MSG_ID, NO_TIMESTAMP};
use crate::message::MessageConverter;
use crate::protocol::{MessageBatch, MessageBatchBuilder, WireFormat};
use crate::utils::{PayloadFilter, ReadMetrics};
use crate::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMessageRequest {
    pub start_id: i64,
    pub count: u32,
    /// Byte budget for the payloads returned. The first matching message is
    /// returned even if it alone is over budget.
    pub max_total_bytes: u64,
    pub filter: Option<PayloadFilter>,
    /// Overrides the partition's committed-only preference for this request.
    pub read_committed_only: Option<bool>,
    pub format: WireFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMessageResponse {
    pub error_code: ErrorCode,
    pub messages: MessageBatch,
    pub message_count: u32,
    pub total_count: u64,
    /// Where the next read should start.
    pub next_id: i64,
    pub next_timestamp: i64,
    pub max_id: i64,
    pub max_timestamp: i64,
}

/// Result of a time based id lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinIdByTime {
    pub error_code: ErrorCode,
    pub msg_id: i64,
    /// The id found is the oldest retained one; anything older lives only in
    /// durable storage.
    pub is_oldest: bool,
}

impl GetMessageRequest {
    pub fn new(start_id: i64, count: u32, max_total_bytes: u64) -> Self {
        GetMessageRequest {
            start_id,
            count,
            max_total_bytes,
            filter: None,
            read_committed_only: None,
            format: WireFormat::default(),
        }
    }

    pub fn with_filter(mut self, filter: PayloadFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    pub fn committed_only(mut self, committed_only: bool) -> Self {
        self.read_committed_only = Some(committed_only);
        self
    }
}

impl GetMessageResponse {
    fn empty(format: WireFormat, view: &View<'_>) -> Self {
        GetMessageResponse {
            error_code: ErrorCode::None,
            messages: MessageBatch::empty(format),
            message_count: 0,
            total_count: 0,
            next_id: view.next_msg_id_after_last(),
            next_timestamp: NO_TIMESTAMP,
            max_id: view.last_msg_id(),
            max_timestamp: view.last_timestamp(),
        }
    }
}

impl MessageGroup {
    /// Reads messages starting at `request.start_id`.
    ///
    /// `next_id`/`next_timestamp` in the response name the first message not
    /// returned, or one past the end of the window when everything was read.
    /// A `reader` is advanced to that watermark.
    pub fn get_message(
        &self,
        request: &GetMessageRequest,
        reader: Option<&ReaderInfo>,
        metrics: &mut ReadMetrics,
    ) -> GetMessageResponse {
        let read_not_committed = match request.read_committed_only {
            Some(committed_only) => {
                Self::can_read_not_committed_msg(!committed_only, self.topic_mode)
            }
            None => self.read_not_committed,
        };

        let inner = self.inner.read();
        let view = inner.deque.create_view(read_not_committed);
        let mut response = GetMessageResponse::empty(request.format, &view);

        if view.is_empty() {
            response.error_code = ErrorCode::NoData;
            return response;
        }

        let first_id = view.first_msg_id();
        let start = if request.start_id < first_id {
            // memory-only partitions have nothing older to fall back to
            if self.topic_mode != TopicMode::MemoryOnly {
                response.error_code = ErrorCode::NoDataInMem;
                response.next_id = first_id;
                response.next_timestamp = view.first_timestamp();
                return response;
            }
            0
        } else {
            view.position_of(request.start_id)
        };

        let filter = request.filter.filter(|filter| !filter.is_pass_all());
        let mut builder = MessageBatchBuilder::new(request.format);
        let mut scratch = BytesMut::new();
        let mut bytes = 0u64;
        let mut next_index = view.len();
        for index in start..view.len() {
            let Some(msg) = view.get(index) else {
                break;
            };
            if response.message_count >= request.count {
                next_index = index;
                break;
            }
            if let Some(filter) = &filter {
                if !filter.matches_message(msg) {
                    metrics.filtered_count += 1;
                    continue;
                }
            }
            let len = msg.len() as u64;
            if response.message_count > 0 && bytes + len > request.max_total_bytes {
                next_index = index;
                break;
            }
            match MessageConverter::decode(msg, &mut scratch) {
                Ok((wire, sub_count)) => {
                    builder.append(&wire);
                    bytes += len;
                    response.message_count += 1;
                    response.total_count += sub_count as u64;
                }
                Err(e) => {
                    warn!(
                        "partition {} decode message {}: {}",
                        self.partition_id,
                        msg.msg_id(),
                        e
                    );
                    response.error_code = ErrorCode::from(&e);
                    next_index = index;
                    break;
                }
            }
        }

        match view.get(next_index) {
            Some(next) => {
                response.next_id = next.msg_id();
                response.next_timestamp = next.timestamp();
            }
            None => {
                response.next_id = view.next_msg_id_after_last();
                response.next_timestamp = view.last_timestamp().saturating_add(1);
            }
        }
        drop(inner);

        response.messages = builder.build();
        if let Some(reader) = reader {
            reader.advance(response.next_id, response.next_timestamp);
        }
        metrics.read_count += response.message_count as u64;
        metrics.read_total_count += response.total_count;
        metrics.read_bytes += bytes;
        trace!(
            "partition {} read {} messages from {}, next {}",
            self.partition_id, response.message_count, request.start_id, response.next_id
        );
        response
    }

    /// Newest id a consumer of this partition can currently see.
    pub fn max_message_id(&self) -> i64 {
        let inner = self.inner.read();
        let view = inner.deque.create_view(self.read_not_committed);
        view.last_msg_id()
    }

    /// Oldest id with a timestamp at or after `timestamp`.
    pub fn min_message_id_by_time(&self, timestamp: i64) -> MinIdByTime {
        let inner = self.inner.read();
        let view = inner.deque.create_view(self.read_not_committed);
        if view.is_empty() {
            return MinIdByTime {
                error_code: ErrorCode::NoData,
                msg_id: view.next_msg_id_after_last(),
                is_oldest: false,
            };
        }
        if timestamp > view.last_timestamp() {
            return MinIdByTime {
                error_code: ErrorCode::TimestampTooLatest,
                msg_id: view.next_msg_id_after_last(),
                is_oldest: false,
            };
        }
        let index = view.lower_bound(timestamp);
        MinIdByTime {
            error_code: ErrorCode::None,
            msg_id: view.get(index).map_or(NO_MSG_ID, |msg| msg.msg_id()),
            is_oldest: index == 0,
        }
    }

    /// Id of the last message with timestamp `<= timestamp`. A timestamp
    /// older than everything retained gives the id just before the oldest.
    pub fn find_message_id(&self, timestamp: i64) -> i64 {
        let inner = self.inner.read();
        let view = inner.deque.create_view(self.read_not_committed);
        if view.is_empty() {
            return NO_MSG_ID;
        }
        match view.upper_bound(timestamp).checked_sub(1) {
            Some(index) => view.get(index).map_or(NO_MSG_ID, |msg| msg.msg_id()),
            None => view.first_msg_id() - 1,
        }
    }

    /// Whether any retained message with id in `[id_from, id_to]` has a
    /// payload tag in `[payload_from, payload_to]`.
    pub fn has_msg_in_range(
        &self,
        payload_from: u16,
        payload_to: u16,
        id_from: i64,
        id_to: i64,
    ) -> bool {
        let inner = self.inner.read();
        let view = inner.deque.create_view(true);
        if view.is_empty() || id_from > id_to {
            return false;
        }
        let from = view.position_of(id_from);
        let to = view.position_of(id_to.saturating_add(1));
        let filter = PayloadFilter::range(payload_from, payload_to);
        (from..to)
            .filter_map(|index| view.get(index))
            .any(|msg| filter.matches_message(msg))
    }

    /// Whether `msg_id` stamped `timestamp` is consistent with what this
    /// partition holds. An empty partition only accepts id 0; the id right
    /// after the newest one is accepted with any timestamp newer than it.
    pub fn message_id_valid(&self, msg_id: i64, timestamp: i64) -> bool {
        let inner = self.inner.read();
        let view = inner.deque.create_view(true);
        if view.is_empty() {
            return msg_id == 0;
        }
        if let Some(index) = view.index_of(msg_id) {
            return view.get(index).map(|msg| msg.timestamp()) == Some(timestamp);
        }
        msg_id == view.next_msg_id_after_last() && timestamp > view.last_timestamp()
    }

    pub fn committed_id(&self) -> i64 {
        self.inner.read().deque.committed_msg_id()
    }

    pub fn committed_timestamp(&self) -> i64 {
        self.inner.read().deque.committed_timestamp()
    }

    pub fn remain_meta_count(&self) -> usize {
        self.inner.read().deque.remain_meta_count()
    }

    /// Free bytes in the block currently being written.
    pub fn remain_data_size(&self) -> usize {
        self.inner.read().converter.remain_data_size()
    }

    pub fn data_size(&self) -> u64 {
        self.inner.read().deque.data_size()
    }

    pub fn meta_size(&self) -> u64 {
        self.inner.read().deque.meta_size()
    }

    pub fn message_count(&self) -> usize {
        self.inner.read().deque.len()
    }

    pub fn left_to_be_committed_data_size(&self) -> u64 {
        self.inner.read().deque.left_to_be_committed_data_size()
    }

    pub fn last_received_id(&self) -> i64 {
        self.inner.read().deque.last_msg_id()
    }

    pub fn recycle_info(&self) -> RecycleInfo {
        let inner = self.inner.read();
        RecycleInfo {
            oldest_timestamp: inner
                .deque
                .front()
                .map_or(NO_TIMESTAMP, |msg| msg.timestamp()),
            newest_timestamp: inner
                .deque
                .back()
                .map_or(NO_TIMESTAMP, |msg| msg.timestamp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use super::*;
    use crate::group::tests::{batch, block_pool, group, group_with, replicated_batch};
    use crate::group::{AddMessageRequest, GroupOptions, RecoverMessage, RecoverSnapshot};
    use crate::message::MIN_MSG_ID;
    use crate::pool::ChunkPool;
    use crate::utils::WriteMetrics;

    fn filled(count: usize, len: usize) -> MessageGroup {
        let group = group();
        let request = AddMessageRequest::new(batch(WireFormat::Flat, count, len));
        group.add_message(&request, &mut WriteMetrics::default());
        group
    }

    fn replicated(topic_mode: TopicMode, read_not_committed: bool) -> MessageGroup {
        let group = group_with(block_pool(256, 256), topic_mode, read_not_committed);
        let request = AddMessageRequest::replicated(replicated_batch(0, 10));
        group.add_message(&request, &mut WriteMetrics::default());
        group
    }

    #[test]
    fn test_empty_partition_has_no_data() {
        let group = group();
        let request = GetMessageRequest::new(0, 10, 1024);
        let response = group.get_message(&request, None, &mut ReadMetrics::default());
        assert_eq!(response.error_code, ErrorCode::NoData);
        assert_eq!(response.next_id, 0);
        assert_eq!(response.max_id, -1);
    }

    #[test]
    fn test_first_message_always_returned() {
        let group = filled(10, 8);
        let mut metrics = ReadMetrics::default();
        let response = group.get_message(&GetMessageRequest::new(0, 10, 1), None, &mut metrics);
        assert!(response.error_code.is_ok());
        assert_eq!(response.message_count, 1);
        assert_eq!(response.next_id, 1);
        assert_eq!(metrics.read_bytes, 8);
    }

    #[rstest]
    #[case(WireFormat::Tagged)]
    #[case(WireFormat::Flat)]
    fn test_read_in_request_format(#[case] format: WireFormat) {
        let group = filled(10, 4);
        let request = GetMessageRequest::new(3, 4, 1024).with_format(format);
        let response = group.get_message(&request, None, &mut ReadMetrics::default());
        assert_eq!(response.messages.format(), format);
        let messages = response.messages.to_messages().unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.msg_id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
        assert_eq!(response.next_id, 7);
        assert_eq!(response.max_id, 9);
    }

    #[test]
    fn test_whole_view_consumed_points_past_end() {
        let group = filled(5, 4);
        let request = GetMessageRequest::new(2, 100, 1024);
        let response = group.get_message(&request, None, &mut ReadMetrics::default());
        assert_eq!(response.message_count, 3);
        assert_eq!(response.next_id, 5);
        assert_eq!(response.next_timestamp, response.max_timestamp + 1);
    }

    #[test]
    fn test_committed_only_window() {
        let group = replicated(TopicMode::Normal, false);
        group.set_committed_id(4);
        let mut metrics = ReadMetrics::default();
        let response = group.get_message(&GetMessageRequest::new(0, 100, 4096), None, &mut metrics);
        assert_eq!(response.message_count, 5);
        assert_eq!(response.max_id, 4);

        let request = GetMessageRequest::new(0, 100, 4096).committed_only(false);
        let response = group.get_message(&request, None, &mut metrics);
        assert_eq!(response.message_count, 10);
    }

    #[test]
    fn test_older_than_memory() {
        let group = replicated(TopicMode::Normal, true);
        group.set_committed_id(9);
        group.try_recycle(u64::MAX);
        let request = GetMessageRequest::new(0, 10, 4096);
        let response = group.get_message(&request, None, &mut ReadMetrics::default());
        assert_eq!(response.error_code, ErrorCode::NoDataInMem);
        assert_eq!(response.next_id, 9);

        let memory_only = replicated(TopicMode::MemoryOnly, true);
        memory_only.set_committed_id(9);
        memory_only.try_recycle(u64::MAX);
        let response = memory_only.get_message(&request, None, &mut ReadMetrics::default());
        assert!(response.error_code.is_ok());
        assert_eq!(response.message_count, 1);
    }

    #[test]
    fn test_filter_skips_and_advances() {
        // payload tag is the position in the batch
        let group = filled(10, 4);
        let mut metrics = ReadMetrics::default();
        let request = GetMessageRequest::new(0, 2, 4096).with_filter(PayloadFilter::range(6, 9));
        let response = group.get_message(&request, None, &mut metrics);
        let ids: Vec<i64> = response
            .messages
            .iter()
            .map(|m| m.unwrap().msg_id)
            .collect();
        assert_eq!(ids, vec![6, 7]);
        assert_eq!(response.next_id, 8);
        assert_eq!(metrics.filtered_count, 6);
    }

    #[test]
    fn test_reader_follows_watermark() {
        let group = filled(6, 4);
        let reader = ReaderInfo::new(1);
        let request = GetMessageRequest::new(0, 4, 4096);
        group.get_message(&request, Some(&reader), &mut ReadMetrics::default());
        assert_eq!(reader.last_read_id(), 4);
    }

    #[test]
    fn test_time_lookups() {
        // timestamps are 1000 + id
        let group = replicated(TopicMode::Normal, true);
        assert_eq!(group.max_message_id(), 9);

        let found = group.min_message_id_by_time(1003);
        assert_eq!(found.msg_id, 3);
        assert!(!found.is_oldest);
        let oldest = group.min_message_id_by_time(0);
        assert_eq!(oldest.msg_id, 0);
        assert!(oldest.is_oldest);
        let too_new = group.min_message_id_by_time(5000);
        assert_eq!(too_new.error_code, ErrorCode::TimestampTooLatest);

        assert_eq!(group.find_message_id(1004), 4);
        assert_eq!(group.find_message_id(99_999), 9);
        assert_eq!(group.find_message_id(10), -1);
    }

    #[test]
    fn test_has_msg_in_range() {
        let group = filled(10, 4);
        assert!(group.has_msg_in_range(3, 3, 0, 9));
        assert!(!group.has_msg_in_range(3, 3, 4, 9));
        assert!(group.has_msg_in_range(0, 100, 8, 50));
        assert!(!group.has_msg_in_range(0, 100, 20, 30));
    }

    #[test]
    fn test_message_id_valid() {
        let empty = group();
        assert!(empty.message_id_valid(0, 123));
        assert!(!empty.message_id_valid(1, 123));

        let group = replicated(TopicMode::Normal, true);
        assert!(group.message_id_valid(1, 1001));
        assert!(!group.message_id_valid(1, 1002));
        assert!(group.message_id_valid(10, 1010));
        assert!(!group.message_id_valid(11, 2000));
    }

    #[test]
    fn test_next_id_needs_newer_timestamp() {
        // newest retained is id 9 at 1009
        let group = replicated(TopicMode::Normal, true);
        assert!(!group.message_id_valid(10, 1009));
        assert!(!group.message_id_valid(10, 1008));
        assert!(group.message_id_valid(10, 1010));
    }

    #[test]
    fn test_extreme_ids_do_not_overflow() {
        let snapshot = RecoverSnapshot {
            messages: (0..4)
                .map(|k| RecoverMessage {
                    msg_id: MIN_MSG_ID + k,
                    timestamp: 100 + k,
                    payload: 0,
                    data: Bytes::from_static(b"low"),
                })
                .collect(),
        };
        let group = MessageGroup::init(
            3,
            block_pool(64, 64),
            ChunkPool::new(4, 16),
            Some(&snapshot),
            TopicMode::Normal,
            &GroupOptions::default(),
        )
        .unwrap();

        let request = GetMessageRequest::new(i64::MAX, 10, 4096);
        let response = group.get_message(&request, None, &mut ReadMetrics::default());
        assert!(response.error_code.is_ok());
        assert_eq!(response.message_count, 0);
        assert_eq!(response.next_id, MIN_MSG_ID + 4);

        assert!(group.has_msg_in_range(0, 0, i64::MIN, i64::MAX));
        assert!(!group.has_msg_in_range(0, 0, i64::MAX - 1, i64::MAX));
        assert!(!group.message_id_valid(i64::MAX, 100));
        assert!(group.message_id_valid(MIN_MSG_ID + 2, 102));
    }

    #[test]
    fn test_remain_accessors() {
        // 256-byte blocks, 8 records per metadata chunk
        let group = filled(3, 10);
        assert_eq!(group.remain_data_size(), 226);
        assert_eq!(group.remain_meta_count(), 5);
    }

    #[test]
    fn test_min_id_by_time_on_empty_group() {
        let found = group().min_message_id_by_time(0);
        assert_eq!(found.error_code, ErrorCode::NoData);
        assert_eq!(found.msg_id, 0);
        assert!(!found.is_oldest);
    }

    #[test]
    fn test_recycle_info() {
        let group = replicated(TopicMode::Normal, true);
        let info = group.recycle_info();
        assert_eq!(info.oldest_timestamp, 1000);
        assert_eq!(info.newest_timestamp, 1009);
    }
}
