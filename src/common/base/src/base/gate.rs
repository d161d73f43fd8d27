// Copyright 2021 Datafuse Labs
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

use std::collections::HashMap;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Condvar;
use parking_lot::Mutex;

struct Slot {
    held: bool,
    waiters: usize,
    // Waiters of this key only, so a release never wakes a thread waiting on another key.
    cond: Arc<Condvar>,
}

impl Slot {
    fn held() -> Slot {
        Slot {
            held: true,
            waiters: 0,
            cond: Arc::new(Condvar::new()),
        }
    }
}

/// A dynamic set of named exclusive locks.
///
/// At most one [`GateGuard`] exists for a key at any time, `acquire` blocks until the
/// current holder drops its guard. Keys need no registration, and the bookkeeping of a
/// key is dropped as soon as nobody holds or waits for it.
pub struct Gate<K> {
    name: String,
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Gate<K>
where K: Eq + Hash + Clone
{
    pub fn create(name: impl Into<String>) -> Gate<K> {
        Gate {
            name: name.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block the calling thread until `key` is free, then hold it until the guard drops.
    pub fn acquire(&self, key: &K) -> GateGuard<'_, K> {
        let mut slots = self.slots.lock();

        let cond = match slots.get_mut(key) {
            None => {
                slots.insert(key.clone(), Slot::held());
                return GateGuard::new(self, key.clone());
            }
            Some(slot) if !slot.held => {
                slot.held = true;
                return GateGuard::new(self, key.clone());
            }
            Some(slot) => {
                slot.waiters += 1;
                slot.cond.clone()
            }
        };

        loop {
            cond.wait(&mut slots);

            match slots.get_mut(key) {
                Some(slot) if !slot.held => {
                    slot.held = true;
                    slot.waiters -= 1;
                    break;
                }
                Some(_) => continue,
                // A slot with waiters is never removed, keep the gate consistent anyway.
                None => {
                    slots.insert(key.clone(), Slot::held());
                    break;
                }
            }
        }

        GateGuard::new(self, key.clone())
    }

    /// Hold `key` only if nobody else does.
    pub fn try_acquire(&self, key: &K) -> Option<GateGuard<'_, K>> {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            None => {
                slots.insert(key.clone(), Slot::held());
                Some(GateGuard::new(self, key.clone()))
            }
            Some(slot) if !slot.held => {
                slot.held = true;
                Some(GateGuard::new(self, key.clone()))
            }
            Some(_) => None,
        }
    }

    pub fn is_held(&self, key: &K) -> bool {
        let slots = self.slots.lock();
        slots.get(key).map(|slot| slot.held).unwrap_or(false)
    }

    /// Number of keys currently held or waited for.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &K) {
        let mut slots = self.slots.lock();
        let reclaim = match slots.get_mut(key) {
            None => false,
            Some(slot) if slot.waiters == 0 => true,
            Some(slot) => {
                slot.held = false;
                slot.cond.notify_one();
                false
            }
        };

        if reclaim {
            slots.remove(key);
        }
    }
}

impl<K> Debug for Gate<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("name", &self.name)
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

/// Holds one key of a [`Gate`], released on drop.
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct GateGuard<'a, K>
where K: Eq + Hash + Clone
{
    gate: &'a Gate<K>,
    key: K,
}

impl<'a, K> GateGuard<'a, K>
where K: Eq + Hash + Clone
{
    fn new(gate: &'a Gate<K>, key: K) -> Self {
        GateGuard { gate, key }
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<'a, K> Drop for GateGuard<'a, K>
where K: Eq + Hash + Clone
{
    fn drop(&mut self) {
        self.gate.release(&self.key);
    }
}
