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

//! Wire encodings exchanged with producers and consumers.
//!
//! Two encodings are supported and a response is always written in the format
//! its request used:
//! - [`WireFormat::Tagged`]: self-describing varint fields
//! - [`WireFormat::Flat`]: fixed header, payload sliced zero-copy

mod batch;
pub mod constants;
mod flat;
mod tagged;
mod wire_message;

pub use batch::{BatchIter, MessageBatch, MessageBatchBuilder};
pub use wire_message::{merged_count, WireFormat, WireMessage};
