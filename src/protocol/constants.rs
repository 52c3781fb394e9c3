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

//! Wire Format Constants
//!
//! Offsets and lengths for the flat message layout and the field tags of the
//! tagged layout.
//!
//! # Flat Message Format
//!
//! Every message is a fixed big-endian header followed by its payload:
//! - Message id (8 bytes)
//! - Timestamp (8 bytes)
//! - Payload tag (2 bytes)
//! - Mask payload (2 bytes)
//! - Flags (1 byte)
//! - Data length (4 bytes)
//! - CRC32C of the data (4 bytes)
//! - Data (variable length)
//!
//! # Tagged Message Format
//!
//! Every message is a varint length followed by `(tag, value)` pairs. Integer
//! values are zig-zag varints, the data field is a varint length plus bytes.

pub const MSG_ID_OFFSET: usize = 0;
pub const MSG_ID_LENGTH: usize = 8;
pub const TIMESTAMP_OFFSET: usize = MSG_ID_OFFSET + MSG_ID_LENGTH;
pub const TIMESTAMP_LENGTH: usize = 8;
pub const PAYLOAD_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_LENGTH;
pub const PAYLOAD_LENGTH: usize = 2;
pub const MASK_PAYLOAD_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_LENGTH;
pub const MASK_PAYLOAD_LENGTH: usize = 2;
pub const FLAGS_OFFSET: usize = MASK_PAYLOAD_OFFSET + MASK_PAYLOAD_LENGTH;
pub const FLAGS_LENGTH: usize = 1;
pub const DATA_LEN_OFFSET: usize = FLAGS_OFFSET + FLAGS_LENGTH;
pub const DATA_LEN_LENGTH: usize = 4;
pub const CRC_OFFSET: usize = DATA_LEN_OFFSET + DATA_LEN_LENGTH;
pub const CRC_LENGTH: usize = 4;
pub const FLAT_HEADER_SIZE: usize = CRC_OFFSET + CRC_LENGTH;

pub const FLAG_COMPRESS: u8 = 0x01;
pub const FLAG_MERGED: u8 = 0x02;

pub const TAG_MSG_ID: u32 = 1;
pub const TAG_TIMESTAMP: u32 = 2;
pub const TAG_PAYLOAD: u32 = 3;
pub const TAG_MASK_PAYLOAD: u32 = 4;
pub const TAG_FLAGS: u32 = 5;
pub const TAG_DATA: u32 = 6;

/// Bytes at the head of a merged payload holding the little-endian sub-message count.
pub const MERGED_COUNT_LENGTH: usize = 2;
