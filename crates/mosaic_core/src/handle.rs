//! Type-safe generational handles
//!
//! Handles reference slots in a table without holding pointers into it.
//! Freeing a slot bumps its generation, so every handle issued for the old
//! occupant stops resolving. The kernel uses this for registry entries that
//! point into library memory and for tracked resources.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

const INDEX_BITS: u32 = 24;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const NULL_BITS: u32 = u32::MAX;

/// A handle to a slot holding a `T`
///
/// Packs a 24-bit slot index with an 8-bit generation.
#[repr(transparent)]
pub struct Handle<T> {
    bits: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Largest addressable slot index
    pub const MAX_INDEX: u32 = INDEX_MASK;

    #[inline]
    pub const fn new(index: u32, generation: u8) -> Self {
        debug_assert!(index <= INDEX_MASK);
        Self {
            bits: ((generation as u32) << INDEX_BITS) | (index & INDEX_MASK),
            _marker: PhantomData,
        }
    }

    /// A handle that never resolves
    #[inline]
    pub const fn null() -> Self {
        Self {
            bits: NULL_BITS,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.bits == NULL_BITS
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits & INDEX_MASK
    }

    #[inline]
    pub const fn generation(&self) -> u8 {
        (self.bits >> INDEX_BITS) as u8
    }
}

// Written by hand so `T` needs no bounds
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        if self.is_null() {
            write!(f, "{}#null", short)
        } else {
            write!(f, "{}#{}v{}", short, self.index(), self.generation())
        }
    }
}

struct Slot<T> {
    generation: u8,
    value: Option<T>,
}

/// Slot storage addressed by generational handles
///
/// Removed slots are reused, with a bumped generation, by later inserts. A
/// slot whose generation is exhausted is retired instead, so a handle never
/// resolves to a later occupant of its slot.
pub struct SlotMap<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value and return its handle
    ///
    /// # Panics
    /// When every addressable slot is in use.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Handle::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        assert!(index < Handle::<T>::MAX_INDEX, "slot map exhausted");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.len += 1;
        Handle::new(index, 0)
    }

    fn slot(&self, handle: Handle<T>) -> Option<&Slot<T>> {
        if handle.is_null() {
            return None;
        }
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.generation == handle.generation() && s.value.is_some())
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slot(handle)?;
        self.slots[handle.index() as usize].value.as_mut()
    }

    /// Remove a value. Stale handles return `None` and leave the map untouched.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        self.slot(handle)?;
        let slot = &mut self.slots[handle.index() as usize];
        let value = slot.value.take();
        self.len -= 1;

        // An exhausted slot stays empty for good
        if let Some(next) = slot.generation.checked_add(1) {
            slot.generation = next;
            self.free.push(handle.index());
        }
        value
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.slot(handle).is_some()
    }

    /// Iterate live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let value = slot.value.as_ref()?;
            Some((Handle::new(i as u32, slot.generation), value))
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
