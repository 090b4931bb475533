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

use leonard_core::object::{ObjectId, RigidBodyState};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

type States = Arc<BTreeMap<ObjectId, RigidBodyState>>;

/// Read-only view of the world as of the last committed tick.
///
/// The scheduler swaps in a new immutable map after every commit; readers
/// clone the `Arc` and never block the tick thread for longer than the swap.
#[derive(Debug, Clone, Default)]
pub struct StateView {
    states: Arc<RwLock<States>>,
    tick: Arc<AtomicU64>,
}

impl StateView {
    /// An empty view at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, states: BTreeMap<ObjectId, RigidBodyState>, tick: u64) {
        let mut slot = self.states.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(states);
        self.tick.store(tick, Ordering::Release);
    }

    /// The whole published map.
    pub fn snapshot(&self) -> States {
        Arc::clone(&self.states.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copies of the requested objects, or of every object for `None`.
    /// Unknown ids are left out of the result.
    pub fn get_object_states(
        &self,
        ids: Option<&[ObjectId]>,
    ) -> BTreeMap<ObjectId, RigidBodyState> {
        let states = self.snapshot();
        match ids {
            None => (*states).clone(),
            Some(ids) => ids
                .iter()
                .filter_map(|id| states.get(id).map(|s| (*id, *s)))
                .collect(),
        }
    }

    /// Returns `true` if `id` was live at the last commit.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.snapshot().contains_key(&id)
    }

    /// Number of objects at the last commit.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns `true` if the view holds no object.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tick counter at the last commit.
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ids_are_omitted() {
        let view = StateView::new();
        let mut states = BTreeMap::new();
        states.insert(ObjectId(1), RigidBodyState::default());
        view.publish(states, 3);

        let picked = view.get_object_states(Some(&[ObjectId(1), ObjectId(2)]));
        assert_eq!(picked.len(), 1);
        assert!(picked.contains_key(&ObjectId(1)));
        assert_eq!(view.tick(), 3);
    }

    #[test]
    fn test_clones_share_publications() {
        let view = StateView::new();
        let reader = view.clone();
        let mut states = BTreeMap::new();
        states.insert(ObjectId(5), RigidBodyState::default());
        view.publish(states, 1);
        assert!(reader.contains(ObjectId(5)));
        assert_eq!(reader.get_object_states(None).len(), 1);
    }
}
