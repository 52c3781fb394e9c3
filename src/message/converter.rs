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

use bytes::BytesMut;
use tracing::{debug, trace};

use super::MemoryMessage;
use crate::pool::{BlockPool, BlockPtr};
use crate::protocol::{merged_count, WireMessage};
use crate::{AppError, AppResult};

/// Moves messages between wire form and pool-backed [`MemoryMessage`] records.
///
/// Payload bytes are appended to the current block; a payload that runs past
/// the end of a block continues in the block linked after it.
#[derive(Debug)]
pub struct MessageConverter {
    pool: Arc<BlockPool>,
    last_block: Option<BlockPtr>,
    write_pos: usize,
}

impl MessageConverter {
    pub fn new(pool: Arc<BlockPool>) -> Self {
        MessageConverter {
            pool,
            last_block: None,
            write_pos: 0,
        }
    }

    /// Copies the payload into pool blocks and fills in the record metadata from `wire`.
    ///
    /// On `Busy` the write cursor is rewound to where this message began. Blocks
    /// already linked for it stay linked and are picked up by the next call.
    pub fn encode(&mut self, wire: &WireMessage) -> AppResult<MemoryMessage> {
        let (start_block, start_pos) = self.ensure_writable()?;

        let data = &wire.data[..];
        let mut block = Arc::clone(&start_block);
        let mut pos = start_pos;
        let mut written = 0;
        while written < data.len() {
            if pos >= block.capacity() {
                match self.next_block(&block) {
                    Some(next) => {
                        block = next;
                        pos = 0;
                    }
                    None => {
                        debug!(
                            "block pool exhausted after {} of {} bytes, rewind write cursor",
                            written,
                            data.len()
                        );
                        self.last_block = Some(start_block);
                        self.write_pos = start_pos;
                        return Err(AppError::Busy(format!(
                            "no free block for message of {} bytes",
                            data.len()
                        )));
                    }
                }
            }
            let n = block.write_at(pos, &data[written..]);
            pos += n;
            written += n;
        }
        self.last_block = Some(block);
        self.write_pos = pos;

        let mut record = MemoryMessage::default();
        record.set_msg_id(wire.msg_id)?;
        record.set_timestamp(wire.timestamp);
        record.set_len(data.len() as u32);
        record.set_offset(start_pos as u32);
        record.set_msg_count(wire.sub_message_count());
        record.set_payload(wire.payload);
        record.set_mask_payload(wire.mask_payload);
        record.set_flags(wire.flags());
        record.set_block(start_block);
        Ok(record)
    }

    /// Copies the record's payload out of its block chain.
    ///
    /// Returns the wire message and its logical sub-message count. The payload
    /// is split off `scratch`, so one scratch buffer can serve a whole response.
    pub fn decode(record: &MemoryMessage, scratch: &mut BytesMut) -> AppResult<(WireMessage, u32)> {
        let len = record.len() as usize;
        scratch.reserve(len);

        let mut remaining = len;
        if remaining > 0 {
            let mut block = record.block().ok_or_else(|| {
                AppError::IllegalStateError(format!("message {} has no block", record.msg_id()))
            })?;
            let mut pos = record.offset() as usize;
            loop {
                remaining -= block.read_at(pos, remaining, scratch);
                if remaining == 0 {
                    break;
                }
                block = block.next().ok_or_else(|| {
                    AppError::CorruptMessage(format!(
                        "block chain of message {} ends {} bytes early",
                        record.msg_id(),
                        remaining
                    ))
                })?;
                pos = 0;
            }
        }

        let mut wire = WireMessage {
            msg_id: record.msg_id(),
            timestamp: record.timestamp(),
            payload: record.payload(),
            mask_payload: record.mask_payload(),
            data: scratch.split().freeze(),
            ..Default::default()
        };
        wire.set_flags(record.flags());
        let count = if wire.is_merged {
            merged_count(&wire.data)
        } else {
            1
        };
        trace!("decode message {} count {}", wire.msg_id, count);
        Ok((wire, count))
    }

    /// Free bytes left in the block currently written into.
    pub fn remain_data_size(&self) -> usize {
        self.last_block
            .as_ref()
            .map(|block| block.capacity().saturating_sub(self.write_pos))
            .unwrap_or(0)
    }

    fn ensure_writable(&mut self) -> AppResult<(BlockPtr, usize)> {
        let current = match &self.last_block {
            Some(block) if self.write_pos < block.capacity() => {
                return Ok((Arc::clone(block), self.write_pos))
            }
            Some(block) => self.next_block(block),
            None => self.pool.allocate(),
        };
        let block = current.ok_or_else(|| AppError::Busy("no free block".to_string()))?;
        self.last_block = Some(Arc::clone(&block));
        self.write_pos = 0;
        Ok((block, 0))
    }

    fn next_block(&self, block: &BlockPtr) -> Option<BlockPtr> {
        if let Some(next) = block.next() {
            return Some(Arc::clone(next));
        }
        let next = self.pool.allocate()?;
        Some(Arc::clone(block.link(next)))
    }
}
