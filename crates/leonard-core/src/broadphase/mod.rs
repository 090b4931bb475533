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

//! Sweep-and-prune broad phase.
//!
//! Each axis is swept independently to collect the pairs of boxes whose
//! intervals overlap on that axis. Two boxes overlap in 3D only if they
//! overlap on all three axes, so the three pair sets are intersected before
//! the surviving pairs are merged with a union-find. Every id that took part
//! in no pair ends up as its own singleton group.
//!
//! Collision groups can then be joined by explicit links, e.g. constraints,
//! with [`merge_linked_groups`]. Bodies tied together by a joint must be
//! stepped in the same package even when their boxes never overlap.

pub mod sweep;
pub mod union_find;

use crate::error::{LeonardError, Result};
use crate::math::Aabb;
use crate::object::ObjectId;
use std::collections::BTreeMap;
use union_find::UnionFind;

/// A set of objects whose boxes overlap directly or transitively.
///
/// Members are sorted ascending.
pub type CollisionGroup = Vec<ObjectId>;

/// Partitions the given boxes into connected collision groups.
///
/// The result covers every key of `aabbs` exactly once. Groups are ordered by
/// their smallest id. Fails if a box is non-finite or inverted.
pub fn compute_collision_groups(aabbs: &BTreeMap<ObjectId, Aabb>) -> Result<Vec<CollisionGroup>> {
    let ids: Vec<ObjectId> = aabbs.keys().copied().collect();
    let boxes: Vec<&Aabb> = aabbs.values().collect();

    if let Some((id, aabb)) = aabbs.iter().find(|(_, aabb)| !aabb.is_valid()) {
        return Err(LeonardError::validation(format!(
            "invalid AABB for {id}: {aabb:?}"
        )));
    }

    let per_axis: Vec<_> = (0..3)
        .map(|axis| {
            let intervals: Vec<(f64, f64)> = boxes.iter().map(|b| b.interval(axis)).collect();
            sweep::overlapping_pairs(&intervals)
        })
        .collect();

    let mut uf = UnionFind::new(ids.len());
    let mut merged = 0usize;
    for pair in &per_axis[0] {
        if per_axis[1].contains(pair) && per_axis[2].contains(pair) {
            uf.union(pair.0, pair.1);
            merged += 1;
        }
    }

    let groups: Vec<CollisionGroup> = uf
        .components()
        .into_iter()
        .map(|members| members.into_iter().map(|i| ids[i]).collect())
        .collect();

    log::trace!(
        "Broad phase: {} boxes, {} overlapping pairs, {} groups.",
        ids.len(),
        merged,
        groups.len()
    );
    Ok(groups)
}

/// Merges every pair of groups that a link connects.
///
/// `links` are id pairs, e.g. the two ends of each constraint: a chain of
/// three jointed bodies spread over three singleton groups comes out as one
/// group. Links naming an id that is in no group are ignored. The result
/// keeps the guarantees of [`compute_collision_groups`]: members sorted,
/// groups ordered by their smallest id, every input id exactly once.
pub fn merge_linked_groups(
    groups: Vec<CollisionGroup>,
    links: &[(ObjectId, ObjectId)],
) -> Vec<CollisionGroup> {
    if links.is_empty() {
        let mut groups = groups;
        for group in &mut groups {
            group.sort_unstable();
        }
        groups.sort_by_key(|g| g.first().copied());
        return groups;
    }

    let group_of: BTreeMap<ObjectId, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(g, members)| members.iter().map(move |id| (*id, g)))
        .collect();
    let mut uf = UnionFind::new(groups.len());
    let mut joined = 0usize;
    for (a, b) in links {
        if let (Some(&ga), Some(&gb)) = (group_of.get(a), group_of.get(b)) {
            if uf.find(ga) != uf.find(gb) {
                uf.union(ga, gb);
                joined += 1;
            }
        }
    }

    let mut merged: Vec<CollisionGroup> = uf
        .components()
        .into_iter()
        .map(|parts| {
            let mut members: CollisionGroup =
                parts.into_iter().flat_map(|g| groups[g].iter().copied()).collect();
            members.sort_unstable();
            members
        })
        .collect();
    merged.sort_by_key(|g| g.first().copied());

    log::trace!(
        "Linked groups: {} links joined {} groups, {} remain.",
        links.len(),
        joined,
        merged.len()
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use std::collections::BTreeSet;

    fn x_box(lo: f64, hi: f64) -> Aabb {
        Aabb::from_min_max(Vec3::new(lo, 0.0, 0.0), Vec3::new(hi, 1.0, 1.0))
    }

    fn groups_of(boxes: &[(u64, Aabb)]) -> Vec<CollisionGroup> {
        let map: BTreeMap<_, _> = boxes.iter().map(|(id, b)| (ObjectId(*id), *b)).collect();
        compute_collision_groups(&map).unwrap()
    }

    #[test]
    fn test_empty_input_gives_no_groups() {
        assert!(compute_collision_groups(&BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_single_object_is_singleton() {
        let groups = groups_of(&[(7, Aabb::cube(Vec3::new(3.0, -2.0, 9.0), 0.5))]);
        assert_eq!(groups, vec![vec![ObjectId(7)]]);
    }

    #[test]
    fn test_disjoint_on_x_gives_two_singletons() {
        let groups = groups_of(&[(1, x_box(4.0, 5.0)), (2, x_box(1.0, 2.0))]);
        assert_eq!(groups, vec![vec![ObjectId(1)], vec![ObjectId(2)]]);
    }

    #[test]
    fn test_nested_boxes_form_one_group() {
        let groups = groups_of(&[(1, x_box(2.0, 4.0)), (2, x_box(1.0, 5.0))]);
        assert_eq!(groups, vec![vec![ObjectId(1), ObjectId(2)]]);
    }

    #[test]
    fn test_transitive_overlap_merges_chain() {
        // A overlaps B, B overlaps C, A and C are apart.
        let groups = groups_of(&[
            (1, x_box(0.0, 2.0)),
            (2, x_box(1.5, 3.5)),
            (3, x_box(3.0, 5.0)),
        ]);
        assert_eq!(groups, vec![vec![ObjectId(1), ObjectId(2), ObjectId(3)]]);
    }

    #[test]
    fn test_overlap_on_two_axes_only_is_not_a_collision() {
        let a = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::from_min_max(Vec3::new(0.5, 0.5, 3.0), Vec3::new(1.5, 1.5, 4.0));
        assert_eq!(groups_of(&[(1, a), (2, b)]).len(), 2);
    }

    #[test]
    fn test_invalid_box_is_an_error() {
        let mut map = BTreeMap::new();
        map.insert(
            ObjectId(1),
            Aabb {
                min: Vec3::new(f64::NAN, 0.0, 0.0),
                max: Vec3::ONE,
            },
        );
        assert!(matches!(
            compute_collision_groups(&map),
            Err(LeonardError::Validation(_))
        ));
    }

    fn ids(raw: &[u64]) -> CollisionGroup {
        raw.iter().copied().map(ObjectId).collect()
    }

    #[test]
    fn test_link_merges_far_apart_groups() {
        let groups = groups_of(&[
            (1, x_box(0.0, 1.0)),
            (2, x_box(50.0, 51.0)),
            (3, x_box(100.0, 101.0)),
        ]);
        assert_eq!(groups.len(), 3);

        let merged = merge_linked_groups(groups, &[(ObjectId(3), ObjectId(1))]);

        assert_eq!(merged, vec![ids(&[1, 3]), ids(&[2])]);
    }

    #[test]
    fn test_links_chain_transitively_and_ignore_unknown_ids() {
        let groups = vec![ids(&[4]), ids(&[1, 2]), ids(&[7]), ids(&[9])];
        let links = [
            (ObjectId(2), ObjectId(7)),
            (ObjectId(7), ObjectId(9)),
            (ObjectId(4), ObjectId(40)),
            (ObjectId(1), ObjectId(9)),
        ];

        let merged = merge_linked_groups(groups, &links);

        assert_eq!(merged, vec![ids(&[1, 2, 7, 9]), ids(&[4])]);
    }

    #[test]
    fn test_no_links_only_orders_groups() {
        let merged = merge_linked_groups(vec![ids(&[5]), ids(&[3, 2])], &[]);
        assert_eq!(merged, vec![ids(&[2, 3]), ids(&[5])]);
    }

    #[test]
    fn test_groups_partition_the_input() {
        // A deterministic scatter of boxes of varying size on a small lattice.
        let mut boxes = Vec::new();
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for id in 0..200u64 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let c = Vec3::new(
                (seed % 23) as f64,
                ((seed >> 8) % 19) as f64,
                ((seed >> 16) % 17) as f64,
            );
            let r = 0.1 + ((seed >> 24) % 10) as f64 * 0.1;
            boxes.push((id, Aabb::cube(c, r)));
        }
        let groups = groups_of(&boxes);

        let mut seen = BTreeSet::new();
        for group in &groups {
            assert!(!group.is_empty());
            for id in group {
                assert!(seen.insert(*id), "{id} appears in two groups");
            }
        }
        let expected: BTreeSet<_> = boxes.iter().map(|(id, _)| ObjectId(*id)).collect();
        assert_eq!(seen, expected);

        // Overlapping boxes always share a group.
        let group_of: BTreeMap<ObjectId, usize> = groups
            .iter()
            .enumerate()
            .flat_map(|(g, members)| members.iter().map(move |id| (*id, g)))
            .collect();
        for (ia, a) in &boxes {
            for (ib, b) in &boxes {
                if a.intersects_aabb(b) {
                    assert_eq!(group_of[&ObjectId(*ia)], group_of[&ObjectId(*ib)]);
                }
            }
        }
    }
}
