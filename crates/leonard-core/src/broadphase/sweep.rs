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

//! One-dimensional sweep over interval endpoints.

use std::collections::HashSet;

/// An index pair with `.0 < .1`.
pub type IndexPair = (usize, usize);

/// Returns every pair of intervals that overlap, treating intervals as closed.
///
/// `intervals[i]` is `(lo, hi)` for item `i`; both must be finite and `lo <= hi`.
/// Sorting by `lo` and scanning forward while the next `lo` is still within
/// the current `hi` visits exactly the pairs the classic active-set sweep
/// would record.
pub fn overlapping_pairs(intervals: &[(f64, f64)]) -> HashSet<IndexPair> {
    let mut order: Vec<usize> = (0..intervals.len()).collect();
    order.sort_by(|&a, &b| intervals[a].0.total_cmp(&intervals[b].0));

    let mut pairs = HashSet::new();
    for (pos, &i) in order.iter().enumerate() {
        let hi = intervals[i].1;
        for &j in &order[pos + 1..] {
            if intervals[j].0 > hi {
                break;
            }
            pairs.insert((i.min(j), i.max(j)));
        }
    }
    pairs
}
