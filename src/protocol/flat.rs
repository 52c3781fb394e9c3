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

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use super::WireMessage;
use crate::{AppError, AppResult};

/// Writes one message in the flat layout.
pub fn encode_flat(msg: &WireMessage, buffer: &mut BytesMut) {
    buffer.reserve(FLAT_HEADER_SIZE + msg.data.len());
    buffer.put_i64(msg.msg_id);
    buffer.put_i64(msg.timestamp);
    buffer.put_u16(msg.payload);
    buffer.put_u16(msg.mask_payload);
    buffer.put_u8(msg.flags());
    buffer.put_u32(msg.data.len() as u32);
    buffer.put_u32(crc32c::crc32c(&msg.data));
    buffer.put_slice(&msg.data);
}

/// Reads the message starting at `position`; returns it with the position of the next one.
///
/// The payload is a slice of `buffer`, nothing is copied.
pub fn decode_flat(buffer: &Bytes, position: usize) -> AppResult<(WireMessage, usize)> {
    let remaining = buffer.len().saturating_sub(position);
    if remaining < FLAT_HEADER_SIZE {
        return Err(AppError::MalformedProtocol(format!(
            "flat message header needs {} bytes, only {} left",
            FLAT_HEADER_SIZE, remaining
        )));
    }

    let mut cursor = &buffer[position..position + FLAT_HEADER_SIZE];
    let msg_id = cursor.get_i64();
    let timestamp = cursor.get_i64();
    let payload = cursor.get_u16();
    let mask_payload = cursor.get_u16();
    let flags = cursor.get_u8();
    let data_len = cursor.get_u32() as usize;
    let crc = cursor.get_u32();

    let data_start = position + FLAT_HEADER_SIZE;
    if remaining - FLAT_HEADER_SIZE < data_len {
        return Err(AppError::MalformedProtocol(format!(
            "flat message {} declares {} data bytes, only {} left",
            msg_id,
            data_len,
            remaining - FLAT_HEADER_SIZE
        )));
    }
    let data = buffer.slice(data_start..data_start + data_len);
    let compute_crc = crc32c::crc32c(&data);
    if compute_crc != crc {
        return Err(AppError::CorruptMessage(format!(
            "CRC mismatch on message {}: expected {}, but found {}",
            msg_id, compute_crc, crc
        )));
    }

    let mut msg = WireMessage {
        msg_id,
        timestamp,
        payload,
        mask_payload,
        data,
        ..Default::default()
    };
    msg.set_flags(flags);
    Ok((msg, data_start + data_len))
}
