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

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use clap::Parser;
use crossbeam::atomic::AtomicCell;
use dotenv::dotenv;
use tracing::{debug, info, warn};

use mqstore::service::{setup_local_tracing, setup_tracing, BenchConfig, TracingGuard};
use mqstore::{
    global_config, AddMessageRequest, AppError, AppResult, BlockPool, ChunkPool, ErrorCode,
    GetMessageRequest, MessageBatchBuilder, MessageGroup, ReadMetrics, ReaderInfo, ReaderRegistry,
    StoreConfig, TopicMode, WireFormat, WireMessage, WriteMetrics, GLOBAL_CONFIG,
};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: debug, vv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
    /// Run a produce/consume/commit/recycle workload against one partition
    Bench {
        /// also write logs to hourly files in this directory
        #[arg(long)]
        log_dir: Option<String>,
    },
}

/// Completion counters shared by the bench threads.
#[derive(Default)]
struct Progress {
    producers_done: AtomicCell<usize>,
    consumers_done: AtomicCell<usize>,
}

const DEFAULT_CONFIG_FILE: &str = "conf.toml";
const MAX_BUSY_RETRIES: usize = 10_000;

fn main() -> AppResult<()> {
    dotenv().ok();
    let commandline = CommandLine::parse();
    if std::env::var_os("RUST_LOG").is_none() {
        let level = match commandline.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }

    let _guard: Option<TracingGuard> = match &commandline.command {
        Some(Command::Bench {
            log_dir: Some(log_dir),
        }) => Some(setup_tracing(log_dir)?),
        _ => {
            setup_local_tracing()?;
            None
        }
    };

    let store_config = load_config(commandline.conf.as_deref())?;
    GLOBAL_CONFIG
        .set(store_config)
        .map_err(|_| AppError::IllegalStateError("global config already set".to_string()))?;

    match commandline.command {
        Some(Command::PrintConfig) => {
            println!("{:#?}", global_config());
            Ok(())
        }
        Some(Command::Bench { .. }) | None => run_bench(global_config()),
    }
}

fn load_config(conf: Option<&str>) -> AppResult<StoreConfig> {
    let path = conf.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
    if conf.is_none() && !path.exists() {
        info!("no {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
        return Ok(StoreConfig::default());
    }
    StoreConfig::set_up_config(path)
}

fn run_bench(config: &StoreConfig) -> AppResult<()> {
    let bench = &config.bench;
    let block_pool = BlockPool::new(config.block_pool_options());
    let chunk_pool = ChunkPool::new(
        config.meta_pool.records_per_chunk,
        config.meta_pool.max_chunks,
    );
    let group = MessageGroup::init(
        0,
        Arc::clone(&block_pool),
        chunk_pool,
        None,
        TopicMode::Normal,
        &config.group_options(),
    )?;
    let readers = ReaderRegistry::new();
    let progress = Progress::default();
    let started = Instant::now();

    let (written, read) = thread::scope(|s| -> AppResult<(WriteMetrics, ReadMetrics)> {
        let group = &group;
        let readers = &readers;
        let progress = &progress;

        let mut producers = Vec::with_capacity(bench.producer_threads);
        for id in 0..bench.producer_threads {
            let handle = thread::Builder::new()
                .name(format!("producer-{id}"))
                .spawn_scoped(s, move || {
                    let metrics = produce(group, bench);
                    progress.producers_done.fetch_add(1);
                    metrics
                })?;
            producers.push(handle);
        }

        let mut consumers = Vec::with_capacity(bench.consumer_threads);
        for id in 0..bench.consumer_threads {
            let reader = readers.register(id as u64);
            let handle = thread::Builder::new()
                .name(format!("consumer-{id}"))
                .spawn_scoped(s, move || {
                    let metrics = consume(group, bench, &reader, progress);
                    progress.consumers_done.fetch_add(1);
                    metrics
                })?;
            consumers.push(handle);
        }

        thread::Builder::new()
            .name("committer".to_string())
            .spawn_scoped(s, move || commit(group, bench, progress))?;
        thread::Builder::new()
            .name("recycler".to_string())
            .spawn_scoped(s, move || recycle(group, readers, bench, progress))?;

        let mut written = WriteMetrics::default();
        for handle in producers {
            let metrics = handle
                .join()
                .map_err(|_| AppError::IllegalStateError("producer thread panicked".to_string()))?;
            written.merge(&metrics);
        }
        let mut read = ReadMetrics::default();
        for handle in consumers {
            let metrics = handle
                .join()
                .map_err(|_| AppError::IllegalStateError("consumer thread panicked".to_string()))?;
            read.merge(&metrics);
        }
        Ok((written, read))
    })?;

    let elapsed = started.elapsed();
    written.report(group.partition_id());
    read.report(group.partition_id());
    info!(
        "bench finished in {:?}: wrote {} messages ({:.0}/s), read {} across {} consumers",
        elapsed,
        written.accepted_count,
        written.accepted_count as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        read.read_count,
        bench.consumer_threads
    );
    info!(
        "partition holds {} messages, {} payload bytes; pool uses {} blocks, caches {}",
        group.message_count(),
        group.data_size(),
        block_pool.used_block_count(),
        block_pool.free_block_count()
    );
    Ok(())
}

fn produce(group: &MessageGroup, bench: &BenchConfig) -> WriteMetrics {
    let mut metrics = WriteMetrics::default();
    let payload = Bytes::from(vec![b'x'; bench.payload_size]);
    let mut sent = 0;
    let mut busy_retries = 0;
    while sent < bench.messages_per_producer {
        let remaining = bench.messages_per_producer - sent;
        let count = bench.batch_size.max(1).min(remaining);
        let mut builder = MessageBatchBuilder::new(WireFormat::Flat);
        for i in 0..count {
            let tag = (i % 16) as u16;
            let msg = WireMessage::new(payload.clone());
            builder.append(&msg.with_payload(tag, 1 << tag));
        }
        let response = group.add_message(&AddMessageRequest::new(builder.build()), &mut metrics);
        sent += response.accepted_count as usize;
        match response.error_code {
            ErrorCode::None => busy_retries = 0,
            ErrorCode::Busy if busy_retries < MAX_BUSY_RETRIES => {
                busy_retries += 1;
                thread::sleep(Duration::from_millis(1));
            }
            code => {
                warn!("producer gives up after {} messages: {}", sent, code);
                break;
            }
        }
    }
    metrics
}

fn consume(
    group: &MessageGroup,
    bench: &BenchConfig,
    reader: &ReaderInfo,
    progress: &Progress,
) -> ReadMetrics {
    let mut metrics = ReadMetrics::default();
    let mut next_id = 0;
    loop {
        let producing = progress.producers_done.load() < bench.producer_threads;
        let request = GetMessageRequest::new(next_id, bench.read_batch_count, bench.read_max_bytes)
            .with_format(WireFormat::Tagged);
        let response = group.get_message(&request, Some(reader), &mut metrics);
        match response.error_code {
            ErrorCode::None if response.message_count > 0 => next_id = response.next_id,
            ErrorCode::None | ErrorCode::NoData => {
                if !producing && next_id > group.last_received_id() {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            ErrorCode::NoDataInMem => {
                debug!(
                    "reader {} fell behind, skip {} to {}",
                    reader.reader_id(),
                    next_id,
                    response.next_id
                );
                next_id = response.next_id;
            }
            code => {
                warn!(
                    "reader {} stops at {}: {}",
                    reader.reader_id(),
                    next_id,
                    code
                );
                break;
            }
        }
    }
    metrics
}

fn commit(group: &MessageGroup, bench: &BenchConfig, progress: &Progress) {
    loop {
        let producing = progress.producers_done.load() < bench.producer_threads;
        let last = group.last_received_id();
        if last > group.committed_id() {
            group.set_committed_id(last);
        } else if !producing {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn recycle(
    group: &MessageGroup,
    readers: &ReaderRegistry,
    bench: &BenchConfig,
    progress: &Progress,
) {
    let interval = Duration::from_millis(bench.recycle_interval_ms);
    let mut round = 0u64;
    loop {
        let finished = progress.producers_done.load() >= bench.producer_threads
            && progress.consumers_done.load() >= bench.consumer_threads;
        if group.can_recycle() {
            let stats = if round % 2 == 0 {
                group.try_recycle_by_readers(readers)
            } else {
                group.try_recycle_fast(0.25)
            };
            round += 1;
            debug!("recycle round {} freed {} messages", round, stats.count);
        }
        if finished {
            break;
        }
        thread::sleep(interval);
    }
}
