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

use bytes::{BufMut, Bytes, BytesMut};
use integer_encoding::VarInt;

use super::constants::*;
use super::WireMessage;
use crate::{AppError, AppResult};

/// Writes one message in the tagged layout.
pub fn encode_tagged(msg: &WireMessage, buffer: &mut BytesMut) {
    let body_size = TAG_MSG_ID.required_space()
        + msg.msg_id.required_space()
        + TAG_TIMESTAMP.required_space()
        + msg.timestamp.required_space()
        + TAG_PAYLOAD.required_space()
        + (msg.payload as u32).required_space()
        + TAG_MASK_PAYLOAD.required_space()
        + (msg.mask_payload as u32).required_space()
        + TAG_FLAGS.required_space()
        + (msg.flags() as u32).required_space()
        + TAG_DATA.required_space()
        + (msg.data.len() as u32).required_space()
        + msg.data.len();

    buffer.reserve(body_size + (body_size as u32).required_space());
    buffer.put_slice(&(body_size as u32).encode_var_vec());

    put_field(buffer, TAG_MSG_ID, &msg.msg_id.encode_var_vec());
    put_field(buffer, TAG_TIMESTAMP, &msg.timestamp.encode_var_vec());
    put_field(buffer, TAG_PAYLOAD, &(msg.payload as u32).encode_var_vec());
    put_field(
        buffer,
        TAG_MASK_PAYLOAD,
        &(msg.mask_payload as u32).encode_var_vec(),
    );
    put_field(buffer, TAG_FLAGS, &(msg.flags() as u32).encode_var_vec());

    buffer.put_slice(&TAG_DATA.encode_var_vec());
    buffer.put_slice(&(msg.data.len() as u32).encode_var_vec());
    buffer.put_slice(&msg.data);
}

fn put_field(buffer: &mut BytesMut, tag: u32, value: &[u8]) {
    buffer.put_slice(&tag.encode_var_vec());
    buffer.put_slice(value);
}

/// Reads the message starting at `position`; returns it with the position of the next one.
pub fn decode_tagged(buffer: &Bytes, position: usize) -> AppResult<(WireMessage, usize)> {
    let (record_len, read) = read_var::<u32>(&buffer[position..], "record length")?;
    let start = position + read;
    let end = start + record_len as usize;
    if end > buffer.len() {
        return Err(AppError::MalformedProtocol(format!(
            "tagged record declares {} bytes, only {} left",
            record_len,
            buffer.len() - start
        )));
    }

    let mut msg = WireMessage::default();
    let mut cursor = start;
    while cursor < end {
        let (tag, read) = read_var::<u32>(&buffer[cursor..end], "field tag")?;
        cursor += read;
        let field = &buffer[cursor..end];
        match tag {
            TAG_MSG_ID => {
                let (value, read) = read_var::<i64>(field, "msg id")?;
                msg.msg_id = value;
                cursor += read;
            }
            TAG_TIMESTAMP => {
                let (value, read) = read_var::<i64>(field, "timestamp")?;
                msg.timestamp = value;
                cursor += read;
            }
            TAG_PAYLOAD => {
                let (value, read) = read_var::<u32>(field, "payload")?;
                msg.payload = narrow_u16(value, "payload")?;
                cursor += read;
            }
            TAG_MASK_PAYLOAD => {
                let (value, read) = read_var::<u32>(field, "mask payload")?;
                msg.mask_payload = narrow_u16(value, "mask payload")?;
                cursor += read;
            }
            TAG_FLAGS => {
                let (value, read) = read_var::<u32>(field, "flags")?;
                msg.set_flags(value as u8);
                cursor += read;
            }
            TAG_DATA => {
                let (data_len, read) = read_var::<u32>(field, "data length")?;
                cursor += read;
                let data_end = cursor + data_len as usize;
                if data_end > end {
                    return Err(AppError::MalformedProtocol(format!(
                        "data field of {} bytes overruns record",
                        data_len
                    )));
                }
                msg.data = buffer.slice(cursor..data_end);
                cursor = data_end;
            }
            unknown => {
                return Err(AppError::MalformedProtocol(format!(
                    "unknown field tag {}",
                    unknown
                )))
            }
        }
    }
    Ok((msg, end))
}

fn read_var<T: VarInt>(buf: &[u8], what: &str) -> AppResult<(T, usize)> {
    T::decode_var(buf)
        .ok_or_else(|| AppError::MalformedProtocol(format!("truncated varint reading {}", what)))
}

fn narrow_u16(value: u32, what: &str) -> AppResult<u16> {
    u16::try_from(value)
        .map_err(|_| AppError::MalformedProtocol(format!("{} {} out of range", what, value)))
}
