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

//! In-memory message store of one broker partition.
//!
//! - [`pool`]: shared payload blocks and metadata chunks
//! - [`message`]: the compact in-memory record and its wire converter
//! - [`deque`]: the ordered buffer with commit tracking and reclamation
//! - [`group`]: the locked per-partition facade implementing produce and consume
//! - [`protocol`]: the two wire encodings
pub mod deque;
pub mod group;
pub mod message;
pub mod pool;
pub mod protocol;
pub mod service;
pub mod utils;

pub use deque::{MessageDeque, RecycleStats, View};
pub use group::{
    AddMessageRequest, AddMessageResponse, GetMessageRequest, GetMessageResponse, GroupOptions,
    MessageGroup, MinIdByTime, ReaderInfo, ReaderRegistry, RecoverMessage, RecoverSnapshot,
    RecycleInfo, TopicMode,
};
pub use message::{MemoryMessage, MessageConverter};
pub use pool::{BlockPool, BlockPoolOptions, ChunkPool};
pub use protocol::{MessageBatch, MessageBatchBuilder, WireFormat, WireMessage};
pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, ErrorCode,
    StoreConfig, GLOBAL_CONFIG,
};
pub use utils::{PayloadFilter, ReadMetrics, TimestampAllocator, WriteMetrics};
