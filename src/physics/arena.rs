//! Generational slot storage and the handles that address it.
//!
//! Every slot carries a generation that is bumped when its entity is
//! removed. A handle remembers the generation it was issued with, so a
//! handle kept past its entity's destruction stops resolving instead of
//! naming whatever later reuses the slot.

use std::marker::PhantomData;

/// A handle that can address an [`Arena`] slot.
pub(crate) trait ArenaKey: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn parts(self) -> (u32, u32);
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl $name {
            pub(crate) const fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// Slot index, used to address per-entity solver data.
            #[inline]
            pub fn index(self) -> usize {
                self.index as usize
            }

            #[inline]
            pub fn generation(self) -> u32 {
                self.generation
            }
        }

        impl ArenaKey for $name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self::new(index, generation)
            }

            #[inline]
            fn parts(self) -> (u32, u32) {
                (self.index, self.generation)
            }
        }
    };
}

define_handle!(
    /// Handle to a body in a [`World`](super::world::World).
    BodyId
);
define_handle!(
    /// Handle to a joint in a [`World`](super::world::World).
    JointId
);
define_handle!(
    /// Handle to a fixture in a [`World`](super::world::World).
    FixtureId
);
define_handle!(
    /// Handle to a contact in a [`World`](super::world::World).
    ContactId
);

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with a free list. Removed slots are reused last-in
/// first-out under a new generation.
#[derive(Debug, Clone)]
pub(crate) struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _key: PhantomData<fn() -> K>,
}

impl<K, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn insert(&mut self, value: T) -> K {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            K::from_parts(index, slot.generation)
        } else {
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            K::from_parts((self.slots.len() - 1) as u32, 0)
        }
    }

    pub fn remove(&mut self, key: K) -> Option<T> {
        let (index, generation) = key.parts();
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    #[inline]
    pub fn get(&self, key: K) -> Option<&T> {
        let (index, generation) = key.parts();
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let (index, generation) = key.parts();
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of slots, live or not. Every live index is below this.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let value = slot.value.as_ref()?;
            Some((K::from_parts(i as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            let value = slot.value.as_mut()?;
            Some((K::from_parts(i as u32, generation), value))
        })
    }

    /// Snapshot of the live handles.
    pub fn ids(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key).collect()
    }
}
