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

use leonard_core::datastore::Datastore;
use leonard_core::error::{LeonardError, Result};
use leonard_core::object::{ObjectId, RigidBodyState};
use std::collections::HashMap;
use std::sync::RwLock;

/// A process-local datastore keeping one encoded record per object.
///
/// Records are stored as `bincode` bytes, so every read decodes a fresh copy
/// and callers can never alias stored state.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    records: RwLock<HashMap<ObjectId, Vec<u8>>>,
}

impl InMemoryDatastore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_error() -> LeonardError {
    LeonardError::Datastore("record lock poisoned".to_string())
}

impl Datastore for InMemoryDatastore {
    fn get(&self, id: ObjectId) -> Result<Option<RigidBodyState>> {
        let records = self.records.read().map_err(|_| lock_error())?;
        let Some(bytes) = records.get(&id) else {
            return Ok(None);
        };
        let (state, _) = bincode::serde::decode_from_slice::<RigidBodyState, _>(
            bytes,
            bincode::config::standard(),
        )
        .map_err(|e| LeonardError::Datastore(format!("failed to decode {id}: {e}")))?;
        Ok(Some(state))
    }

    fn put(&self, id: ObjectId, state: &RigidBodyState) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(state, bincode::config::standard())
            .map_err(|e| LeonardError::Datastore(format!("failed to encode {id}: {e}")))?;
        self.records
            .write()
            .map_err(|_| lock_error())?
            .insert(id, bytes);
        Ok(())
    }

    fn delete(&self, id: ObjectId) -> Result<()> {
        self.records.write().map_err(|_| lock_error())?.remove(&id);
        Ok(())
    }

    fn ids(&self) -> Result<Vec<ObjectId>> {
        let mut ids: Vec<ObjectId> = self
            .records
            .read()
            .map_err(|_| lock_error())?
            .keys()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leonard_core::math::Vec3;
    use leonard_core::object::CollisionShape;

    #[test]
    fn test_put_get_delete() {
        let store = InMemoryDatastore::new();
        let state = RigidBodyState {
            position: Vec3::new(1.0, -2.0, 3.5),
            shape: CollisionShape::Box {
                half_extents: Vec3::new(0.5, 1.0, 2.0),
            },
            ..Default::default()
        };

        store.put(ObjectId(3), &state).unwrap();
        assert_eq!(store.get(ObjectId(3)).unwrap(), Some(state));
        assert_eq!(store.ids().unwrap(), vec![ObjectId(3)]);

        store.delete(ObjectId(3)).unwrap();
        assert_eq!(store.get(ObjectId(3)).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_missing_key_succeeds() {
        let store = InMemoryDatastore::new();
        assert!(store.delete(ObjectId(42)).is_ok());
    }

    #[test]
    fn test_put_replaces_previous_record() {
        let store = InMemoryDatastore::new();
        store.put(ObjectId(1), &RigidBodyState::default()).unwrap();
        let moved = RigidBodyState {
            position: Vec3::X,
            ..Default::default()
        };
        store.put(ObjectId(1), &moved).unwrap();
        assert_eq!(store.get(ObjectId(1)).unwrap().unwrap().position, Vec3::X);
        assert_eq!(store.len(), 1);
    }
}
