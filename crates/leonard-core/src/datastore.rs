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

//! Contract for the authoritative object store that mirrors the world.

use crate::error::Result;
use crate::object::{ObjectId, RigidBodyState};

/// A key-value store of rigid body states.
///
/// The scheduler writes every live object after each committed tick and
/// deletes removed ones, so the store always trails the world by at most one
/// tick. It reads the store only on start-up, via
/// `Scheduler::restore_from_datastore`.
///
/// Implementations must be atomic per key. No multi-key transactions are
/// required, e.g. a crash between two `put` calls may leave one object a
/// tick behind the other.
pub trait Datastore: Send + Sync {
    /// Reads one object.
    fn get(&self, id: ObjectId) -> Result<Option<RigidBodyState>>;

    /// Inserts or replaces one object.
    fn put(&self, id: ObjectId, state: &RigidBodyState) -> Result<()>;

    /// Deletes one object. Deleting a missing key succeeds.
    fn delete(&self, id: ObjectId) -> Result<()>;

    /// Lists every stored id.
    fn ids(&self) -> Result<Vec<ObjectId>>;
}
