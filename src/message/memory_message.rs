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

//! Compact per-message record kept in the deque.
//!
//! Two machine words carry the bit-packed fields:
//!
//! ```text
//! id_len:       | msg id (48, two's complement) | len extend (1) | inline len (15) |
//! offset_count: | sub-message count (32)         | offset in first block (32)      |
//! ```
//!
//! Lengths that do not fit the inline field are kept in `len_ext`.

use crate::pool::BlockPtr;
use crate::protocol::constants::{FLAG_COMPRESS, FLAG_MERGED};
use crate::{AppError, AppResult};

const LEN_INLINE_BITS: u32 = 15;
const LEN_INLINE_MASK: u64 = (1 << LEN_INLINE_BITS) - 1;
const LEN_EXTEND_BIT: u64 = 1 << LEN_INLINE_BITS;
const MSG_ID_SHIFT: u32 = 16;
const OFFSET_MASK: u64 = 0xffff_ffff;
const COUNT_SHIFT: u32 = 32;

pub const MSG_ID_BITS: u32 = 48;
pub const MAX_MSG_ID: i64 = (1 << (MSG_ID_BITS - 1)) - 1;
pub const MIN_MSG_ID: i64 = -(1 << (MSG_ID_BITS - 1));
pub const MAX_INLINE_LEN: u32 = LEN_INLINE_MASK as u32;

pub struct MemoryMessage {
    id_len: u64,
    offset_count: u64,
    timestamp: i64,
    len_ext: u32,
    payload: u16,
    mask_payload: u16,
    flags: u8,
    block: Option<BlockPtr>,
}

/// Bytes of metadata accounted per retained message.
pub const MEMORY_MESSAGE_META_SIZE: u64 = std::mem::size_of::<MemoryMessage>() as u64;

impl std::fmt::Debug for MemoryMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMessage")
            .field("msg_id", &self.msg_id())
            .field("timestamp", &self.timestamp)
            .field("len", &self.len())
            .field("offset", &self.offset())
            .field("msg_count", &self.msg_count())
            .field("payload", &self.payload)
            .field("mask_payload", &self.mask_payload)
            .field("flags", &self.flags)
            .finish()
    }
}

impl Default for MemoryMessage {
    fn default() -> Self {
        MemoryMessage {
            id_len: 0,
            offset_count: 1 << COUNT_SHIFT,
            timestamp: 0,
            len_ext: 0,
            payload: 0,
            mask_payload: 0,
            flags: 0,
            block: None,
        }
    }
}

impl MemoryMessage {
    pub fn msg_id(&self) -> i64 {
        // arithmetic shift restores the sign of the 48-bit id
        (self.id_len as i64) >> MSG_ID_SHIFT
    }

    pub fn set_msg_id(&mut self, msg_id: i64) -> AppResult<()> {
        if !(MIN_MSG_ID..=MAX_MSG_ID).contains(&msg_id) {
            return Err(AppError::InvalidValue(format!(
                "msg id {} does not fit in {} bits",
                msg_id, MSG_ID_BITS
            )));
        }
        let len_bits = self.id_len & (LEN_EXTEND_BIT | LEN_INLINE_MASK);
        self.id_len = ((msg_id as u64) << MSG_ID_SHIFT) | len_bits;
        Ok(())
    }

    pub fn len(&self) -> u32 {
        if self.id_len & LEN_EXTEND_BIT != 0 {
            self.len_ext
        } else {
            (self.id_len & LEN_INLINE_MASK) as u32
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_len_extended(&self) -> bool {
        self.id_len & LEN_EXTEND_BIT != 0
    }

    pub fn set_len(&mut self, len: u32) {
        let id_bits = self.id_len & !(LEN_EXTEND_BIT | LEN_INLINE_MASK);
        if len <= MAX_INLINE_LEN {
            self.id_len = id_bits | len as u64;
            self.len_ext = 0;
        } else {
            self.id_len = id_bits | LEN_EXTEND_BIT;
            self.len_ext = len;
        }
    }

    pub fn offset(&self) -> u32 {
        (self.offset_count & OFFSET_MASK) as u32
    }

    pub fn set_offset(&mut self, offset: u32) {
        self.offset_count = (self.offset_count & !OFFSET_MASK) | offset as u64;
    }

    /// Logical message count; greater than one only for merged bundles.
    pub fn msg_count(&self) -> u32 {
        (self.offset_count >> COUNT_SHIFT) as u32
    }

    pub fn set_msg_count(&mut self, count: u32) {
        self.offset_count = ((count as u64) << COUNT_SHIFT) | (self.offset_count & OFFSET_MASK);
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn payload(&self) -> u16 {
        self.payload
    }

    pub fn set_payload(&mut self, payload: u16) {
        self.payload = payload;
    }

    pub fn mask_payload(&self) -> u16 {
        self.mask_payload
    }

    pub fn set_mask_payload(&mut self, mask_payload: u16) {
        self.mask_payload = mask_payload;
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }

    pub fn is_compress(&self) -> bool {
        self.flags & FLAG_COMPRESS != 0
    }

    pub fn is_merged(&self) -> bool {
        self.flags & FLAG_MERGED != 0
    }

    pub fn block(&self) -> Option<&BlockPtr> {
        self.block.as_ref()
    }

    pub fn set_block(&mut self, block: BlockPtr) {
        self.block = Some(block);
    }
}
