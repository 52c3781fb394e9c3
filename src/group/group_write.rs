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

//! Produce path.

use tracing::{debug, warn};

use super::MessageGroup;
use crate::deque::{MessageDeque, NO_MSG_ID};
use crate::protocol::MessageBatch;
use crate::utils::WriteMetrics;
use crate::{AppError, AppResult, ErrorCode};

#[derive(Debug, Clone)]
pub struct AddMessageRequest {
    pub batch: MessageBatch,
    /// Ids and timestamps come from the batch instead of being assigned here.
    pub replication: bool,
    /// Echo every assigned timestamp back in the response.
    pub fill_timestamps: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddMessageResponse {
    pub error_code: ErrorCode,
    pub accepted_count: u32,
    /// Logical messages accepted, counting each member of a merged bundle.
    pub accepted_total_count: u64,
    pub first_accepted_id: i64,
    pub timestamps: Vec<i64>,
}

impl AddMessageRequest {
    pub fn new(batch: MessageBatch) -> Self {
        AddMessageRequest {
            batch,
            replication: false,
            fill_timestamps: false,
        }
    }

    pub fn replicated(batch: MessageBatch) -> Self {
        AddMessageRequest {
            replication: true,
            ..Self::new(batch)
        }
    }

    pub fn with_timestamps(mut self) -> Self {
        self.fill_timestamps = true;
        self
    }
}

impl Default for AddMessageResponse {
    fn default() -> Self {
        AddMessageResponse {
            error_code: ErrorCode::None,
            accepted_count: 0,
            accepted_total_count: 0,
            first_accepted_id: NO_MSG_ID,
            timestamps: Vec::new(),
        }
    }
}

impl MessageGroup {
    /// Appends the messages of a batch in order.
    ///
    /// A batch stops at the first message that cannot be stored; everything
    /// before it stays accepted and the response carries the failure code. A
    /// replicated batch is validated as a whole first and either fully
    /// rejected or processed like any other batch.
    pub fn add_message(
        &self,
        request: &AddMessageRequest,
        metrics: &mut WriteMetrics,
    ) -> AddMessageResponse {
        let mut response = AddMessageResponse::default();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if request.replication {
            if let Err(e) = Self::validate_replicated(&inner.deque, &request.batch) {
                warn!(
                    "partition {} reject replicated batch: {}",
                    self.partition_id, e
                );
                response.error_code = ErrorCode::from(&e);
                return response;
            }
        }

        let mut last_id = inner.deque.last_msg_id();
        let mut last_timestamp = inner.deque.last_accepted_timestamp();
        for item in &request.batch {
            let mut wire = match item {
                Ok(wire) => wire,
                Err(e) => {
                    response.error_code = ErrorCode::from(&e);
                    debug!(
                        "partition {} stop batch on bad message: {}",
                        self.partition_id, e
                    );
                    break;
                }
            };
            if !inner.deque.reserve(1) {
                response.error_code = ErrorCode::Busy;
                break;
            }
            if !request.replication {
                wire.msg_id = last_id + 1;
                wire.timestamp = inner.ts_allocator.next_msg_timestamp(last_timestamp);
            }
            let record = match inner.converter.encode(&wire) {
                Ok(record) => record,
                Err(e) => {
                    response.error_code = ErrorCode::from(&e);
                    break;
                }
            };

            let sub_count = record.msg_count() as u64;
            let is_compress = record.is_compress();
            if let Err(e) = inner.deque.push_back(record) {
                response.error_code = ErrorCode::from(&e);
                break;
            }
            last_id = wire.msg_id;
            last_timestamp = wire.timestamp;

            if response.accepted_count == 0 {
                response.first_accepted_id = wire.msg_id;
            }
            response.accepted_count += 1;
            response.accepted_total_count += sub_count;
            if request.fill_timestamps {
                response.timestamps.push(wire.timestamp);
            }

            metrics.accepted_count += 1;
            metrics.accepted_total_count += sub_count;
            metrics.accepted_bytes += wire.len() as u64;
            if is_compress {
                metrics.compressed_count += 1;
            }
            metrics.mask_union |= wire.mask_payload;
        }

        if !response.error_code.is_ok() {
            debug!(
                "partition {} accepted {} messages before {}",
                self.partition_id, response.accepted_count, response.error_code
            );
        }
        response
    }

    /// Checks that a replicated batch continues this partition: every id is
    /// the previous one plus one and every timestamp is strictly newer.
    pub fn check_replication_request(&self, batch: &MessageBatch) -> AppResult<()> {
        let inner = self.inner.read();
        Self::validate_replicated(&inner.deque, batch)
    }

    fn validate_replicated(deque: &MessageDeque, batch: &MessageBatch) -> AppResult<()> {
        let mut prev_id = deque.last_msg_id();
        let mut prev_timestamp = deque.last_accepted_timestamp();
        for item in batch {
            let msg = item?;
            if msg.msg_id != prev_id + 1 {
                return Err(AppError::InvalidRequest(format!(
                    "replicated id {} does not follow {}",
                    msg.msg_id, prev_id
                )));
            }
            if msg.timestamp <= prev_timestamp {
                return Err(AppError::InvalidRequest(format!(
                    "replicated timestamp {} of id {} is not after {}",
                    msg.timestamp, msg.msg_id, prev_timestamp
                )));
            }
            prev_id = msg.msg_id;
            prev_timestamp = msg.timestamp;
        }
        Ok(())
    }

    /// Marks everything up to `msg_id` durably committed and returns the
    /// payload bytes that became committed.
    pub fn set_committed_id(&self, msg_id: i64) -> u64 {
        self.inner.write().deque.set_committed_msg_id(msg_id)
    }
}
