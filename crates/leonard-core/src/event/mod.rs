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

//! Events published by the scheduler after a tick is committed.

mod bus;

pub use self::bus::EventBus;

use crate::physics::ContactPair;

/// A contact resolved during a committed tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    /// The tick in which the contact happened.
    pub tick: u64,
    /// The contact itself.
    pub contact: ContactPair,
}
