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

//! GPU queries.

use super::BackendPayload;

/// What a query measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GpuQueryKind {
    /// Signals when the GPU reaches the end marker.
    #[default]
    Event,
    /// Number of samples that passed depth and stencil tests.
    Occlusion,
    /// Whether any sample passed.
    OcclusionBinary,
    /// A GPU timestamp.
    Timestamp,
    /// Whether timestamps in a range are reliable, and their frequency.
    TimestampDisjoint,
}

/// Describes a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GpuQueryDesc {
    /// What the query measures.
    pub kind: GpuQueryKind,
}

/// A handle to a query.
#[derive(Debug, Clone, Default)]
pub struct GpuQuery {
    /// The description the query was created from.
    pub desc: GpuQueryDesc,
    /// The backend payload.
    pub internal: Option<BackendPayload>,
}

/// The result of a resolved query. Only the fields matching its kind are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuQueryResult {
    /// Event queries: signaled. Binary occlusion: any sample passed.
    pub result_passed: bool,
    /// Occlusion queries: passed samples.
    pub result_passed_sample_count: u64,
    /// Timestamp queries: ticks.
    pub result_timestamp: u64,
    /// Ticks per second of timestamp queries.
    pub result_timestamp_frequency: u64,
    /// Disjoint queries: whether timestamps are unreliable.
    pub result_disjoint: bool,
}

/// The outcome of a non-blocking query read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRead {
    /// The GPU has not produced the result yet.
    NotReady,
    /// The result is available.
    Ready(GpuQueryResult),
}

impl QueryRead {
    /// The result, if ready.
    pub fn ready(self) -> Option<GpuQueryResult> {
        match self {
            QueryRead::Ready(r) => Some(r),
            QueryRead::NotReady => None,
        }
    }
}
