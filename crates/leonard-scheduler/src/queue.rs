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

//! The shared inbox of pending world mutations.

use leonard_core::command::Command;
use leonard_core::error::{LeonardError, Result};
use leonard_core::object::ObjectId;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A FIFO of validated commands, filled by any thread and drained once per tick.
///
/// Submission order is preserved globally, and therefore per object.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Mutex<Vec<Command>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Command>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates and appends a command.
    ///
    /// A `Spawn` is refused with [`LeonardError::AlreadyExists`] while another
    /// `Spawn` for the same id is pending and not cancelled by a later `Remove`.
    pub fn enqueue(&self, command: Command) -> Result<()> {
        command.validate()?;
        let mut pending = self.lock();
        if let Command::Spawn { id, .. } = &command {
            if spawn_pending(&pending, *id) {
                return Err(LeonardError::AlreadyExists(*id));
            }
        }
        log::trace!("enqueued {} for {}", command.kind(), command.id());
        pending.push(command);
        Ok(())
    }

    /// Takes every pending command in submission order.
    pub fn drain_all(&self) -> Vec<Command> {
        std::mem::take(&mut *self.lock())
    }

    /// Returns `true` if a `Remove` for `id` is waiting.
    pub fn has_pending_remove(&self, id: ObjectId) -> bool {
        self.lock()
            .iter()
            .any(|c| matches!(c, Command::Remove { id: r } if *r == id))
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether the last spawn-or-remove for `id` in the queue is a spawn.
fn spawn_pending(pending: &[Command], id: ObjectId) -> bool {
    pending
        .iter()
        .rev()
        .find_map(|c| match c {
            Command::Spawn { id: s, .. } if *s == id => Some(true),
            Command::Remove { id: r } if *r == id => Some(false),
            _ => None,
        })
        .unwrap_or(false)
}
