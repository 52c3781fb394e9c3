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

use bytes::{Bytes, BytesMut};

use super::flat::{decode_flat, encode_flat};
use super::tagged::{decode_tagged, encode_tagged};
use super::{WireFormat, WireMessage};
use crate::AppResult;

/// A batch of encoded wire messages, as carried by a produce request or a fetch response.
#[derive(Clone, PartialEq, Eq)]
pub struct MessageBatch {
    format: WireFormat,
    buffer: Bytes,
}

impl std::fmt::Debug for MessageBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBatch")
            .field("format", &self.format)
            .field("buffer length", &self.buffer.len())
            .finish()
    }
}

impl MessageBatch {
    pub fn new(format: WireFormat, buffer: Bytes) -> Self {
        MessageBatch { format, buffer }
    }

    pub fn empty(format: WireFormat) -> Self {
        MessageBatch {
            format,
            buffer: Bytes::new(),
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn iter(&self) -> BatchIter {
        BatchIter {
            format: self.format,
            buffer: self.buffer.clone(),
            position: 0,
        }
    }

    /// Decodes every message; fails on the first malformed one.
    pub fn to_messages(&self) -> AppResult<Vec<WireMessage>> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a MessageBatch {
    type Item = AppResult<WireMessage>;
    type IntoIter = BatchIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazily decodes the messages of a batch. After a decode error the iterator is exhausted.
#[derive(Debug)]
pub struct BatchIter {
    format: WireFormat,
    buffer: Bytes,
    position: usize,
}

impl BatchIter {
    pub fn has_next(&self) -> bool {
        self.position < self.buffer.len()
    }
}

impl Iterator for BatchIter {
    type Item = AppResult<WireMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        let decoded = match self.format {
            WireFormat::Tagged => decode_tagged(&self.buffer, self.position),
            WireFormat::Flat => decode_flat(&self.buffer, self.position),
        };
        match decoded {
            Ok((msg, next_position)) => {
                self.position = next_position;
                Some(Ok(msg))
            }
            Err(e) => {
                self.position = self.buffer.len();
                Some(Err(e))
            }
        }
    }
}

/// Builds a [`MessageBatch`] in either wire format.
#[derive(Debug)]
pub struct MessageBatchBuilder {
    format: WireFormat,
    buffer: BytesMut,
    count: usize,
}

impl MessageBatchBuilder {
    pub fn new(format: WireFormat) -> Self {
        MessageBatchBuilder {
            format,
            buffer: BytesMut::new(),
            count: 0,
        }
    }

    pub fn append(&mut self, msg: &WireMessage) -> &mut Self {
        match self.format {
            WireFormat::Tagged => encode_tagged(msg, &mut self.buffer),
            WireFormat::Flat => encode_flat(msg, &mut self.buffer),
        }
        self.count += 1;
        self
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn build(self) -> MessageBatch {
        MessageBatch::new(self.format, self.buffer.freeze())
    }
}
