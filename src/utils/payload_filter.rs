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

use crate::message::MemoryMessage;

/// Consumer-side selection on the small payload tags carried by each message.
///
/// A message passes when its `payload` lies in `[from, to]` and, if a mask is
/// set, its `mask_payload` shares at least one bit with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadFilter {
    pub from: u16,
    pub to: u16,
    pub mask: u16,
}

impl PayloadFilter {
    pub fn range(from: u16, to: u16) -> Self {
        PayloadFilter { from, to, mask: 0 }
    }

    pub fn with_mask(mut self, mask: u16) -> Self {
        self.mask = mask;
        self
    }

    pub fn matches(&self, payload: u16, mask_payload: u16) -> bool {
        (self.from..=self.to).contains(&payload)
            && (self.mask == 0 || self.mask & mask_payload != 0)
    }

    pub fn matches_message(&self, msg: &MemoryMessage) -> bool {
        self.matches(msg.payload(), msg.mask_payload())
    }

    /// Whether the filter passes everything and can be skipped.
    pub fn is_pass_all(&self) -> bool {
        self.from == 0 && self.to == u16::MAX && self.mask == 0
    }
}

impl Default for PayloadFilter {
    fn default() -> Self {
        PayloadFilter::range(0, u16::MAX)
    }
}
