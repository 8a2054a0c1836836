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

//! Public data types of the render hardware interface.
//!
//! Everything in this module is plain data: descriptors that describe what to
//! create, and opaque handles returned by a [`GraphicsDevice`](crate::GraphicsDevice).
//! A handle carries a backend payload the caller never inspects; cloning a handle
//! shares it, and the native objects behind it are released through deferred
//! destruction once the last clone is dropped.

mod buffer;
mod caps;
mod common;
mod descriptor_table;
mod format;
mod pipeline;
mod query;
mod raytracing;
mod render_pass;
mod resource;
mod sampler;
mod settings;
mod shader;
mod texture;

pub use self::buffer::*;
pub use self::caps::*;
pub use self::common::*;
pub use self::descriptor_table::*;
pub use self::format::*;
pub use self::pipeline::*;
pub use self::query::*;
pub use self::raytracing::*;
pub use self::render_pass::*;
pub use self::resource::*;
pub use self::sampler::*;
pub use self::settings::*;
pub use self::shader::*;
pub use self::texture::*;
