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

//! The submission and query façade handed to request handlers.

use crate::queue::CommandQueue;
use crate::view::StateView;
use leonard_core::command::Command;
use leonard_core::constraint::Constraint;
use leonard_core::error::{LeonardError, Result};
use leonard_core::event::{ContactEvent, EventBus};
use leonard_core::math::Vec3;
use leonard_core::object::{BodyOverride, ObjectId, RigidBodyState};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A cheap, cloneable entry point into a running scheduler.
///
/// Commands are validated and queued for the next tick; reads see the state
/// committed by the last tick.
#[derive(Debug, Clone)]
pub struct LeonardHandle {
    queue: Arc<CommandQueue>,
    view: StateView,
    contacts: Arc<EventBus<ContactEvent>>,
}

impl LeonardHandle {
    pub(crate) fn new(
        queue: Arc<CommandQueue>,
        view: StateView,
        contacts: Arc<EventBus<ContactEvent>>,
    ) -> Self {
        Self {
            queue,
            view,
            contacts,
        }
    }

    /// Queues any command.
    pub fn submit(&self, command: Command) -> Result<()> {
        self.queue.enqueue(command)
    }

    /// Queues a spawn. Fails with [`LeonardError::AlreadyExists`] if the id
    /// is live and no removal of it is pending, or if a spawn is already queued.
    pub fn spawn(
        &self,
        id: ObjectId,
        state: RigidBodyState,
        aabb_radius: Option<f64>,
    ) -> Result<()> {
        if self.view.contains(id) && !self.queue.has_pending_remove(id) {
            return Err(LeonardError::AlreadyExists(id));
        }
        self.submit(Command::Spawn {
            id,
            state,
            aabb_radius,
        })
    }

    /// Queues a removal.
    pub fn remove(&self, id: ObjectId) -> Result<()> {
        self.submit(Command::Remove { id })
    }

    /// Queues a partial state overwrite.
    pub fn override_body(&self, id: ObjectId, partial: BodyOverride) -> Result<()> {
        self.submit(Command::Override { id, partial })
    }

    /// Queues a one-shot world-space force and torque.
    pub fn apply_force(&self, id: ObjectId, force: Vec3, torque: Vec3) -> Result<()> {
        self.submit(Command::ApplyForce { id, force, torque })
    }

    /// Queues a one-shot force applied at an offset from the center of mass.
    pub fn apply_force_at_position(
        &self,
        id: ObjectId,
        force: Vec3,
        relative_position: Vec3,
    ) -> Result<()> {
        self.submit(Command::ApplyForceAtPosition {
            id,
            force,
            relative_position,
        })
    }

    /// Queues a one-shot force and torque in the body frame.
    pub fn apply_booster_force(&self, id: ObjectId, force: Vec3, torque: Vec3) -> Result<()> {
        self.submit(Command::ApplyBoosterForce { id, force, torque })
    }

    /// Queues a joint between two bodies. Both must be live when the
    /// command is applied.
    pub fn add_constraint(&self, constraint: Constraint) -> Result<()> {
        self.submit(Command::AddConstraint { constraint })
    }

    /// Queues the removal of the joint between `a` and `b`.
    pub fn remove_constraint(&self, a: ObjectId, b: ObjectId) -> Result<()> {
        self.submit(Command::RemoveConstraint { a, b })
    }

    /// States as of the last committed tick. `None` returns every object;
    /// unknown ids are left out.
    pub fn get_object_states(
        &self,
        ids: Option<&[ObjectId]>,
    ) -> BTreeMap<ObjectId, RigidBodyState> {
        self.view.get_object_states(ids)
    }

    /// Ids live at the last committed tick.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.view.snapshot().keys().copied().collect()
    }

    /// The last committed tick.
    pub fn tick(&self) -> u64 {
        self.view.tick()
    }

    /// Contact events not yet taken by any consumer.
    pub fn take_contacts(&self) -> Vec<ContactEvent> {
        self.contacts.drain()
    }

    /// A receiver of contact events for a consumer thread.
    pub fn contact_events(&self) -> flume::Receiver<ContactEvent> {
        self.contacts.subscribe()
    }

    /// Commands waiting for the next tick.
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }
}
