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

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use leonard_core::broadphase::{compute_collision_groups, merge_linked_groups};
use leonard_core::math::{Aabb, Vec3};
use leonard_core::object::ObjectId;
use std::collections::BTreeMap;
use std::hint::black_box;

/// Places `count` cubes of random size on a lattice. The larger ones reach
/// their neighbours, so groups of every size show up.
fn scattered_boxes(count: u64) -> BTreeMap<ObjectId, Aabb> {
    let side = ((count as f64).cbrt().ceil() as u64).max(1);
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..count)
        .map(|id| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let center = Vec3::new(
                (id % side) as f64 * 2.0,
                ((id / side) % side) as f64 * 2.0,
                (id / (side * side)) as f64 * 2.0,
            );
            let radius = 0.5 + (seed % 100) as f64 * 0.01;
            (ObjectId(id), Aabb::cube(center, radius))
        })
        .collect()
}

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("Broad Phase");

    for count in [100u64, 1_000, 10_000] {
        let boxes = scattered_boxes(count);
        group.bench_with_input(
            BenchmarkId::new("compute_collision_groups", count),
            &boxes,
            |b, boxes| {
                b.iter(|| black_box(compute_collision_groups(black_box(boxes))));
            },
        );
    }

    // Every tenth body jointed to its successor.
    let boxes = scattered_boxes(10_000);
    let links: Vec<(ObjectId, ObjectId)> = (0..10_000u64)
        .step_by(10)
        .map(|id| (ObjectId(id), ObjectId(id + 1)))
        .collect();
    if let Ok(groups) = compute_collision_groups(&boxes) {
        group.bench_function("merge_linked_groups (10000 boxes, 1000 links)", |b| {
            b.iter(|| black_box(merge_linked_groups(groups.clone(), black_box(&links))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_broad_phase);
criterion_main!(benches);
