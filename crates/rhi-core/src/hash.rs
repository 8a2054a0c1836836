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

//! Structural hashing used to key cached native objects.
//!
//! Hashes produced here are deterministic for the lifetime of a process, which is
//! all the pipeline cache requires: two field-wise equal descriptions always map
//! to the same key.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Mixes `value` into `seed`.
///
/// The combination is order dependent, so `hash_combine(a, b)` and
/// `hash_combine(b, a)` differ for `a != b`.
#[inline]
pub fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Hashes any [`Hash`] value with a fixed-key hasher.
pub fn structural_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hashes an `f32` by its bit pattern.
#[inline]
pub fn hash_f32<H: Hasher>(value: f32, state: &mut H) {
    value.to_bits().hash(state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_hash_is_deterministic() {
        let a = structural_hash(&("pipeline", 42u32));
        let b = structural_hash(&("pipeline", 42u32));
        assert_eq!(a, b);
        assert_ne!(a, structural_hash(&("pipeline", 43u32)));
    }

    #[test]
    fn test_hash_combine_is_order_dependent() {
        let a = structural_hash(&1u64);
        let b = structural_hash(&2u64);
        assert_ne!(hash_combine(a, b), hash_combine(b, a));
        assert_ne!(hash_combine(a, b), a);
    }
}
