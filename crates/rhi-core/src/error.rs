// Copyright 2025 eraflo
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

//! Defines the hierarchy of error types for the render hardware interface.
//!
//! Creation functions surface failures as [`RhiError`]. Binding, draw and dispatch
//! functions have no error channel: a violated precondition there is a programming
//! error and panics.

use thiserror::Error;

/// An error reported by the native graphics API behind a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// A descriptor pool cannot satisfy another set allocation.
    ///
    /// This is the one native failure the RHI recovers from internally, by
    /// growing the pool and retrying.
    #[error("descriptor pool is out of memory")]
    OutOfPoolMemory,
    /// The device ran out of memory for the requested object.
    #[error("native device is out of memory")]
    OutOfMemory,
    /// A native handle was unknown to the device or already destroyed.
    #[error("native handle is invalid or was destroyed")]
    InvalidHandle,
    /// The native API rejected the arguments of a call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The native API does not implement the requested operation.
    #[error("operation not supported by the native device: {0}")]
    Unsupported(String),
    /// The device was removed or reset.
    #[error("native device was lost")]
    DeviceLost,
}

/// An error raised while loading or validating [`DeviceSettings`](crate::api::DeviceSettings).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file '{path}': {source}")]
    Io {
        /// The path that failed to load.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings text is not valid RON for [`DeviceSettings`](crate::api::DeviceSettings).
    #[error("failed to parse settings: {0}")]
    Parse(String),
    /// A field holds a value outside of its accepted range.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// The error type of every fallible RHI operation.
#[derive(Debug, Error)]
pub enum RhiError {
    /// The native API failed.
    #[error(transparent)]
    Native(#[from] NativeError),
    /// The active backend or adapter does not support the request.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A descriptor violates one of its invariants.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    /// A subresource view index does not exist on the resource.
    #[error("subresource index {index} is out of range ({count} explicit views)")]
    InvalidSubresource {
        /// The requested index (`-1` is the default view).
        index: i32,
        /// How many explicit views the resource holds.
        count: usize,
    },
    /// A handle is empty or was not created by this device.
    #[error("handle is invalid or belongs to another device")]
    InvalidHandle,
    /// The device settings are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
