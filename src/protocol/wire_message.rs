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

use bytes::Bytes;

use super::constants::{FLAG_COMPRESS, FLAG_MERGED, MERGED_COUNT_LENGTH};

/// Request/response encodings a client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    /// Self-describing varint fields.
    #[default]
    Tagged,
    /// Fixed header layout, payload sliced without copying.
    Flat,
}

/// One message as it travels over the wire, independent of the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WireMessage {
    pub msg_id: i64,
    pub timestamp: i64,
    pub payload: u16,
    pub mask_payload: u16,
    pub is_compress: bool,
    pub is_merged: bool,
    pub data: Bytes,
}

impl WireMessage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        WireMessage {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, msg_id: i64, timestamp: i64) -> Self {
        self.msg_id = msg_id;
        self.timestamp = timestamp;
        self
    }

    pub fn with_payload(mut self, payload: u16, mask_payload: u16) -> Self {
        self.payload = payload;
        self.mask_payload = mask_payload;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.is_compress {
            flags |= FLAG_COMPRESS;
        }
        if self.is_merged {
            flags |= FLAG_MERGED;
        }
        flags
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.is_compress = flags & FLAG_COMPRESS != 0;
        self.is_merged = flags & FLAG_MERGED != 0;
    }

    /// Logical message count: 1, or the count prefix of a merged bundle.
    pub fn sub_message_count(&self) -> u32 {
        if self.is_merged {
            merged_count(&self.data)
        } else {
            1
        }
    }
}

/// Reads the little-endian sub-message count at the head of a merged payload.
/// A payload too short to carry the prefix counts as a single message.
pub fn merged_count(data: &[u8]) -> u32 {
    if data.len() < MERGED_COUNT_LENGTH {
        return 1;
    }
    u16::from_le_bytes([data[0], data[1]]) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_round_trip() {
        let mut msg = WireMessage::new("abc");
        msg.is_merged = true;
        let flags = msg.flags();
        let mut other = WireMessage::default();
        other.set_flags(flags);
        assert!(other.is_merged);
        assert!(!other.is_compress);
    }

    #[test]
    fn test_sub_message_count() {
        let mut bundle = vec![3u8, 0];
        bundle.extend_from_slice(b"xyz");
        let mut msg = WireMessage::new(bundle);
        assert_eq!(msg.sub_message_count(), 1);
        msg.is_merged = true;
        assert_eq!(msg.sub_message_count(), 3);

        assert_eq!(merged_count(&[7]), 1);
    }
}
