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

//! # RHI Core
//!
//! Backend-agnostic contracts of the render hardware interface.
//!
//! This crate defines everything a caller and a backend agree upon: resource
//! descriptors and the opaque handles returned for them, the [`GraphicsDevice`]
//! façade trait through which all creation, binding and submission happens, and
//! the [`NativeDevice`] seam that concrete backends are written against. It holds
//! no GPU state of its own.

#![warn(missing_docs)]

pub mod api;
pub mod error;
pub mod hash;
pub mod native;
pub mod traits;

pub use api::*;
pub use error::{ConfigError, NativeError, RhiError};
pub use traits::{GraphicsDevice, NativeDevice};
