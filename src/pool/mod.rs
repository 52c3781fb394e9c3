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

//! Memory pools shared by every partition of a broker process.
//!
//! - [`BlockPool`] hands out fixed-size payload blocks.
//! - [`ChunkPool`] bounds the metadata chunks that back message deques.

mod block_pool;
mod chunk_pool;

pub use block_pool::{Block, BlockPool, BlockPoolOptions, BlockPtr};
pub use chunk_pool::{ChunkLease, ChunkPool};
