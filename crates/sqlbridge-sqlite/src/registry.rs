//! Generational slot map behind opaque handles.
//!
//! A [`Handle`] packs a slot index in its low 32 bits and the slot's
//! generation in its high 32 bits. Removing an entry bumps the slot's
//! generation, so handles to a removed (or recycled) entry never resolve to
//! the new occupant. Generation 0 is never handed out, so a zero handle is
//! always invalid.

use std::fmt;

/// Opaque reference to a registry entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    fn new(slot: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(slot))
    }

    /// Reconstruct a handle from its raw representation.
    ///
    /// Any value is accepted; invalid ones simply fail to resolve.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot(self) -> usize {
        (self.0 & 0xffff_ffff) as u32 as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.slot(), self.generation())
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot map of live resources.
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store `value` and return its handle.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` slots are in use at once.
    pub fn insert(&mut self, value: T) -> Handle {
        let handle = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.value = Some(value);
            Handle::new(slot_index(index), slot.generation)
        } else {
            // Checked before the push so an oversized index leaves no slot behind.
            let handle = Handle::new(slot_index(self.slots.len()), 1);
            self.slots.push(Slot {
                generation: 1,
                value: Some(value),
            });
            handle
        };
        self.len += 1;
        handle
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.slot())
            .filter(|s| s.generation == handle.generation())
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.slot())
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.value.as_mut())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Take the entry out; the handle is dead afterwards.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let index = handle.slot();
        let slot = self
            .slots
            .get_mut(index)
            .filter(|s| s.generation == handle.generation())?;
        let value = slot.value.take()?;
        // Skip generation 0 on wrap-around.
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handles of every live entry, in slot order.
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.value.is_some())
            .map(|(i, s)| Handle::new(slot_index(i), s.generation))
            .collect()
    }

    /// Remove every entry matching `pred`, returning them.
    pub fn drain_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let doomed: Vec<Handle> = self
            .handles()
            .into_iter()
            .filter(|h| self.get(*h).is_some_and(&mut pred))
            .collect();
        doomed.into_iter().filter_map(|h| self.remove(h)).collect()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn slot_index(index: usize) -> u32 {
    assert!(u32::try_from(index).is_ok(), "registry slot index exceeds u32::MAX");
    index as u32
}
