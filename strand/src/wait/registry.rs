//! Generational slab mapping wait keys to registered entries.
//!
//! Keys pack `generation << 32 | index`. A slot's generation is bumped every
//! time it is vacated, so an event carrying the key of a removed entry can
//! never be mistaken for whatever now occupies the slot.

use core::num::NonZeroUsize;

/// Key handed to the OS backend as event data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key(u64);

impl Key {
    fn new(index: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(index))
    }

    fn index(self) -> usize {
        (self.0 & u64::from(u32::MAX)) as usize
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) const fn raw(self) -> u64 {
        self.0
    }
}

enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Free { next: Option<u32>, generation: u32 },
}

/// Fixed-capacity slab with an intrusive free list.
pub(crate) struct Registry<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Registry<T> {
    /// Creates a registry with all `cap` slots free. `cap` is clamped to
    /// `u32::MAX`.
    pub(crate) fn with_capacity(cap: NonZeroUsize) -> Self {
        let capacity = u32::try_from(cap.get()).unwrap_or(u32::MAX);
        let slots = (0..capacity)
            .map(|i| Slot::Free {
                next: (i + 1 < capacity).then_some(i + 1),
                generation: 0,
            })
            .collect();
        Self {
            slots,
            free_head: Some(0),
            len: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Stores `value`, returning its key, or gives it back if every slot is taken.
    pub(crate) fn insert(&mut self, value: T) -> Result<Key, T> {
        let Some(head) = self.free_head else {
            return Err(value);
        };
        let slot = &mut self.slots[head as usize];
        let (next, generation) = match slot {
            Slot::Free { next, generation } => (*next, *generation),
            Slot::Occupied { .. } => unreachable!("free_head must point to a free slot"),
        };
        *slot = Slot::Occupied { value, generation };
        self.free_head = next;
        self.len += 1;
        Ok(Key::new(head, generation))
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.slots.get(key.index())? {
            Slot::Occupied { value, generation } if *generation == key.generation() => Some(value),
            _ => None,
        }
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Free { .. } => None,
        })
    }

    /// Vacates the slot for `key` if it is still current.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let index = key.index();
        match self.slots.get(index)? {
            Slot::Occupied { generation, .. } if *generation == key.generation() => {}
            _ => return None,
        }
        let vacated = Slot::Free {
            next: self.free_head,
            generation: key.generation().wrapping_add(1),
        };
        let Slot::Occupied { value, .. } = core::mem::replace(&mut self.slots[index], vacated) else {
            unreachable!("slot checked occupied above");
        };
        // Index fits in u32: capacity is clamped at construction.
        self.free_head = Some(index as u32);
        self.len -= 1;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(cap: usize) -> Registry<&'static str> {
        Registry::with_capacity(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn fills_to_capacity() {
        let mut r = registry(2);
        let a = r.insert("a").unwrap();
        let b = r.insert("b").unwrap();
        assert_eq!(r.insert("c"), Err("c"));
        assert_eq!(r.get(a), Some(&"a"));
        assert_eq!(r.get(b), Some(&"b"));
        assert_eq!(r.len(), 2);
        assert_eq!(r.capacity(), 2);
    }

    #[test]
    fn stale_key_misses_after_reuse() {
        let mut r = registry(1);
        let old = r.insert("old").unwrap();
        assert_eq!(r.remove(old), Some("old"));
        let new = r.insert("new").unwrap();
        assert_ne!(old, new);
        assert_eq!(r.get(old), None);
        assert_eq!(r.remove(old), None);
        assert_eq!(r.get(new), Some(&"new"));
    }

    #[test]
    fn raw_round_trip_preserves_key() {
        let mut r = registry(4);
        let _ = r.insert("x").unwrap();
        let k = r.insert("y").unwrap();
        assert_eq!(r.get(Key::from_raw(k.raw())), Some(&"y"));
        assert_eq!(r.get(Key::from_raw(u64::MAX)), None);
    }
}
