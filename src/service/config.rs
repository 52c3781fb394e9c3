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

use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};
use crate::group::GroupOptions;
use crate::pool::BlockPoolOptions;

pub static GLOBAL_CONFIG: OnceCell<StoreConfig> = OnceCell::new();

/// Returns the process-wide config.
///
/// # Panics
///
/// Panics if called before `GLOBAL_CONFIG` is set, which only the binary does at startup.
pub fn global_config() -> &'static StoreConfig {
    GLOBAL_CONFIG
        .get()
        .expect("global config is not initialized")
}

/// Represents the configuration for the shared payload block pool.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BlockPoolConfig {
    /// Size in bytes of one payload block.
    pub block_size: usize,
    /// Blocks the pool tries to keep around; recycling only kicks in above this.
    pub min_block_count: usize,
    /// Hard cap on blocks handed out at once.
    pub max_block_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetaPoolConfig {
    /// Number of message records stored in one metadata chunk.
    pub records_per_chunk: usize,
    pub max_chunks: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupConfig {
    pub read_not_committed: bool,
    /// Microseconds added to the wall clock by the timestamp allocator.
    pub timestamp_offset: i64,
    /// Lookback window, in microseconds, used to size the block reserve after recycling.
    pub reserve_lookback_us: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BenchConfig {
    pub producer_threads: usize,
    pub consumer_threads: usize,
    pub messages_per_producer: usize,
    pub batch_size: usize,
    pub payload_size: usize,
    pub read_batch_count: u32,
    pub read_max_bytes: u64,
    pub recycle_interval_ms: u64,
}

impl Default for BlockPoolConfig {
    fn default() -> Self {
        Self {
            block_size: 64 * 1024,
            min_block_count: 64,
            max_block_count: 4096,
        }
    }
}

impl Default for MetaPoolConfig {
    fn default() -> Self {
        Self {
            records_per_chunk: 1024,
            max_chunks: 4096,
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            read_not_committed: false,
            timestamp_offset: 0,
            reserve_lookback_us: 1_000_000,
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            producer_threads: 2,
            consumer_threads: 2,
            messages_per_producer: 100_000,
            batch_size: 32,
            payload_size: 256,
            read_batch_count: 64,
            read_max_bytes: 1024 * 1024,
            recycle_interval_ms: 10,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub block_pool: BlockPoolConfig,
    #[serde(default)]
    pub meta_pool: MetaPoolConfig,
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub bench: BenchConfig,
}

impl StoreConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<StoreConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let store_config: StoreConfig = config.try_deserialize()?;
        store_config.validate()?;

        Ok(store_config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.block_pool.block_size == 0 {
            return Err(AppError::InvalidValue(
                "block_pool.block_size must be positive".to_string(),
            ));
        }
        if self.block_pool.min_block_count > self.block_pool.max_block_count {
            return Err(AppError::InvalidValue(format!(
                "block_pool.min_block_count {} exceeds max_block_count {}",
                self.block_pool.min_block_count, self.block_pool.max_block_count
            )));
        }
        if self.meta_pool.records_per_chunk == 0 {
            return Err(AppError::InvalidValue(
                "meta_pool.records_per_chunk must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn block_pool_options(&self) -> BlockPoolOptions {
        BlockPoolOptions {
            block_size: self.block_pool.block_size,
            min_block_count: self.block_pool.min_block_count,
            max_block_count: self.block_pool.max_block_count,
        }
    }

    pub fn group_options(&self) -> GroupOptions {
        GroupOptions {
            read_not_committed: self.group.read_not_committed,
            timestamp_offset: self.group.timestamp_offset,
            reserve_lookback_us: self.group.reserve_lookback_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[block_pool]
block_size = 4096
min_block_count = 8
max_block_count = 128

[meta_pool]
records_per_chunk = 64
max_chunks = 32

[group]
read_not_committed = true
timestamp_offset = 5
reserve_lookback_us = 2000000
"#
        )
        .unwrap();

        let config = StoreConfig::set_up_config(file.path()).unwrap();
        assert_eq!(config.block_pool.block_size, 4096);
        assert_eq!(config.meta_pool.records_per_chunk, 64);
        assert!(config.group.read_not_committed);
        // missing section falls back to defaults
        assert_eq!(config.bench.batch_size, BenchConfig::default().batch_size);

        let options = config.group_options();
        assert_eq!(options.reserve_lookback_us, 2_000_000);
        assert_eq!(config.block_pool_options().max_block_count, 128);
    }

    #[test]
    fn test_reject_inconsistent_pool() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[block_pool]
block_size = 4096
min_block_count = 256
max_block_count = 128
"#
        )
        .unwrap();

        let result = StoreConfig::set_up_config(file.path());
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
    }
}
