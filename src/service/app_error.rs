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

use std::fmt::{Display, Formatter};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("malformed protocol : {0}")]
    MalformedProtocol(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("tracing init error: {0}")]
    TracingInitError(String),

    /// store errors
    #[error("resource busy: {0}")]
    Busy(String),

    #[error("corrupt message: {0}")]
    CorruptMessage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result code carried by every produce/consume response.
///
/// Nothing below the partition boundary is fatal: the caller decides whether to
/// retry (`Busy`), fall back to durable storage (`NoDataInMem`) or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    #[default]
    None,
    /// block or slot reservation exhausted
    Busy,
    /// malformed input, the whole batch was rejected
    RequestInvalid,
    /// the buffer is empty
    NoData,
    /// requested id is older than anything retained in memory
    NoDataInMem,
    /// a time lookup is newer than every retained message
    TimestampTooLatest,
}

impl ErrorCode {
    pub fn is_ok(&self) -> bool {
        *self == ErrorCode::None
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::None => "NONE",
            ErrorCode::Busy => "BUSY",
            ErrorCode::RequestInvalid => "REQUEST_INVALID",
            ErrorCode::NoData => "NO_DATA",
            ErrorCode::NoDataInMem => "NO_DATA_IN_MEM",
            ErrorCode::TimestampTooLatest => "TIMESTAMP_TOO_LATEST",
        };
        f.write_str(s)
    }
}

impl From<&AppError> for ErrorCode {
    fn from(value: &AppError) -> Self {
        match value {
            AppError::Busy(_) => ErrorCode::Busy,
            AppError::InvalidRequest(_)
            | AppError::MalformedProtocol(_)
            | AppError::CorruptMessage(_)
            | AppError::InvalidValue(_) => ErrorCode::RequestInvalid,
            // anything else surfaces as a retryable condition to the caller
            _ => ErrorCode::Busy,
        }
    }
}
