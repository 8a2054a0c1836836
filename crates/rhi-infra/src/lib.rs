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

//! # RHI Infra
//!
//! Concrete backends of the render hardware interface.
//!
//! [`Device`] implements [`rhi_core::GraphicsDevice`] on top of any
//! [`rhi_core::NativeDevice`], with one of three binding strategies chosen by
//! [`rhi_core::DeviceSettings::backend`]: immediate flat slots (DX11 style), a
//! ring of shader-visible descriptor heap space (DX12 style), or descriptor sets
//! drawn from per-frame pools (Vulkan style). [`SoftDevice`] is a CPU
//! implementation of the native seam used for headless runs and tests.

pub mod graphics;

pub use graphics::deferred::DeferredDestroyQueue;
pub use graphics::device::{create_device, Device};
pub use graphics::pipeline_cache::PipelineCache;
pub use graphics::soft::{ConstantBufferSnapshot, DrawRecord, ExecutionMode, NativeStats, SoftDevice};
pub use graphics::transient::LinearAllocator;
