//! Chunked fixed-size object pool.
//!
//! An [`Arena<T>`] hands out stable addresses for values of one type. Storage is
//! grown in chunks of roughly [`CHUNK_BYTES`] and a chunk goes back to the
//! system allocator as soon as its last slot is freed. All operations take one
//! arena-wide lock, so an arena can be a `static` shared by every thread.

use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use crate::sync::Mutex;
use crate::trace::trace;

/// Target size of one chunk's storage.
pub const CHUNK_BYTES: usize = 8192;

/// Lower bound on slots per chunk, for element types too large for
/// [`CHUNK_BYTES`] to hold many of.
pub const MIN_SLOTS_PER_CHUNK: usize = 32;

/// Slot storage for one chunk. The memory is owned through a raw pointer
/// because slot addresses escape to callers.
struct Chunk<T> {
    base: NonNull<MaybeUninit<T>>,
    cap: usize,
    in_use: Box<[bool]>,
    free: Vec<usize>,
    live: usize,
}

// SAFETY: a chunk owns its slots; moving it between threads moves the `T`s.
unsafe impl<T: Send> Send for Chunk<T> {}

impl<T> Chunk<T> {
    fn new(cap: usize) -> Self {
        let storage = Box::<[T]>::new_uninit_slice(cap);
        let base = Box::into_raw(storage).cast::<MaybeUninit<T>>();
        Self {
            // SAFETY: `Box::into_raw` never returns null.
            base: unsafe { NonNull::new_unchecked(base) },
            cap,
            in_use: vec![false; cap].into_boxed_slice(),
            free: (0..cap).rev().collect(),
            live: 0,
        }
    }

    fn has_room(&self) -> bool {
        self.live < self.cap
    }

    fn slot_of(&self, ptr: NonNull<T>) -> Option<usize> {
        let start = self.base.as_ptr().addr();
        let end = start + self.cap * size_of::<T>();
        let addr = ptr.as_ptr().addr();
        if addr < start || addr >= end {
            return None;
        }
        debug_assert_eq!((addr - start) % size_of::<T>(), 0, "misaligned slot pointer");
        Some((addr - start) / size_of::<T>())
    }

    fn claim(&mut self, value: T) -> NonNull<T> {
        let Some(idx) = self.free.pop() else {
            unreachable!("claim on a full chunk");
        };
        self.in_use[idx] = true;
        self.live += 1;
        // SAFETY: idx < cap, so the slot lies inside this chunk's allocation.
        let slot = unsafe { self.base.add(idx) };
        unsafe { slot.as_ptr().write(MaybeUninit::new(value)) };
        slot.cast()
    }

    /// Moves the value out of `idx` and marks the slot free.
    ///
    /// # Safety
    /// `idx` must hold a live value.
    unsafe fn release(&mut self, idx: usize) -> T {
        debug_assert!(self.in_use[idx], "double free of pool slot {idx}");
        self.in_use[idx] = false;
        self.live -= 1;
        self.free.push(idx);
        // SAFETY: caller guarantees the slot is initialized; it is now marked
        // free so it is read exactly once.
        unsafe { self.base.add(idx).as_ptr().read().assume_init() }
    }
}

impl<T> Drop for Chunk<T> {
    fn drop(&mut self) {
        // Live values (if any) are leaked, never dropped twice.
        let slice = ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.cap);
        // SAFETY: `base`/`cap` came from `Box::into_raw` in `Chunk::new`.
        drop(unsafe { Box::from_raw(slice) });
    }
}

/// A pool of fixed-size slots for values of type `T`.
pub struct Arena<T> {
    chunks: Mutex<Vec<Chunk<T>>>,
}

impl<T> Arena<T> {
    /// Creates an empty arena. No memory is reserved until the first `alloc`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
        }
    }

    /// Number of slots each chunk holds for this element type.
    #[must_use]
    pub const fn slots_per_chunk() -> usize {
        let size = if size_of::<T>() == 0 { 1 } else { size_of::<T>() };
        let slots = CHUNK_BYTES / size;
        if slots < MIN_SLOTS_PER_CHUNK {
            MIN_SLOTS_PER_CHUNK
        } else {
            slots
        }
    }

    /// Moves `value` into a free slot and returns its address.
    ///
    /// The address stays valid until passed to [`free`](Self::free).
    pub fn alloc(&self, value: T) -> NonNull<T> {
        const {
            assert!(size_of::<T>() != 0, "zero-sized types cannot be pooled");
        }
        let mut chunks = self.chunks.lock();
        // Prefer the newest chunk with room; older chunks drain and get released.
        let idx = match chunks.iter().rposition(Chunk::has_room) {
            Some(idx) => idx,
            None => {
                chunks.push(Chunk::new(Self::slots_per_chunk()));
                trace!(
                    chunks = chunks.len(),
                    slots = Self::slots_per_chunk(),
                    "arena chunk created"
                );
                chunks.len() - 1
            }
        };
        chunks[idx].claim(value)
    }

    /// Drops the value at `ptr` and returns its slot to the pool.
    ///
    /// The value is destroyed after the arena lock is released, so its
    /// destructor may itself free other values from this arena.
    ///
    /// # Safety
    /// `ptr` must have come from [`alloc`](Self::alloc) on this arena and must
    /// not have been freed since. No reference derived from it may be used
    /// afterwards.
    pub unsafe fn free(&self, ptr: NonNull<T>) {
        let value = {
            let mut chunks = self.chunks.lock();
            let found = chunks
                .iter()
                .enumerate()
                .find_map(|(pos, chunk)| chunk.slot_of(ptr).map(|slot| (pos, slot)));
            let Some((pos, slot)) = found else {
                debug_assert!(false, "freed pointer {ptr:p} is not owned by this arena");
                return;
            };
            // SAFETY: caller guarantees `ptr` is live and from this arena.
            let value = unsafe { chunks[pos].release(slot) };
            if chunks[pos].live == 0 {
                chunks.remove(pos);
                trace!(chunks = chunks.len(), "arena chunk released");
            }
            value
        };
        drop(value);
    }

    /// Number of chunks currently held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.chunks.lock().iter().map(|c| c.live).sum()
    }

    /// Whether the arena holds no chunks, and so no live values.
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Arena<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.chunks.get_mut().is_empty(),
                "arena dropped with live values"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn slots_per_chunk_respects_floor() {
        assert_eq!(Arena::<u64>::slots_per_chunk(), CHUNK_BYTES / 8);
        assert_eq!(Arena::<[u8; 1024]>::slots_per_chunk(), MIN_SLOTS_PER_CHUNK);
    }

    #[test]
    fn chunks_grow_and_release() {
        let arena = Arena::<u64>::new();
        assert_eq!(arena.chunk_count(), 0);

        let per_chunk = Arena::<u64>::slots_per_chunk();
        let ptrs: Vec<_> = (0..=per_chunk as u64).map(|i| arena.alloc(i)).collect();
        assert_eq!(arena.chunk_count(), 2);
        assert_eq!(arena.len(), per_chunk + 1);

        for (i, p) in ptrs.iter().enumerate() {
            assert_eq!(unsafe { *p.as_ref() }, i as u64);
        }

        // Freeing the lone value in the second chunk releases that chunk.
        unsafe { arena.free(ptrs[per_chunk]) };
        assert_eq!(arena.chunk_count(), 1);

        for p in &ptrs[..per_chunk] {
            unsafe { arena.free(*p) };
        }
        assert_eq!(arena.chunk_count(), 0);
        assert!(arena.is_empty());
    }

    #[test]
    fn freed_slot_is_reused() {
        let arena = Arena::<u32>::new();
        let keep = arena.alloc(1);
        let a = arena.alloc(2);
        unsafe { arena.free(a) };
        let b = arena.alloc(3);
        assert_eq!(a, b);
        assert_eq!(arena.chunk_count(), 1);
        unsafe {
            arena.free(b);
            arena.free(keep);
        }
    }

    #[test]
    fn free_runs_destructor() {
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let arena = Arena::new();
        let p = arena.alloc(Counted(Arc::clone(&drops)));
        assert_eq!(drops.load(Ordering::Relaxed), 0);
        unsafe { arena.free(p) };
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    struct Link {
        next: Option<NonNull<Link>>,
    }

    // SAFETY: test-only; links are only touched by the freeing thread.
    unsafe impl Send for Link {}

    static LINKS: Arena<Link> = Arena::new();

    impl Drop for Link {
        fn drop(&mut self) {
            if let Some(next) = self.next.take() {
                unsafe { LINKS.free(next) };
            }
        }
    }

    #[test]
    fn destructor_may_free_from_same_arena() {
        let tail = LINKS.alloc(Link { next: None });
        let mid = LINKS.alloc(Link { next: Some(tail) });
        let head = LINKS.alloc(Link { next: Some(mid) });
        unsafe { LINKS.free(head) };
        assert!(LINKS.is_empty());
    }

    #[test]
    fn concurrent_alloc_free() {
        let arena = Arc::new(Arena::<[u64; 4]>::new());
        let workers: Vec<_> = (0..4u64)
            .map(|t| {
                let arena = Arc::clone(&arena);
                std::thread::spawn(move || {
                    for round in 0..200u64 {
                        let held: Vec<_> = (0..16).map(|i| arena.alloc([t, round, i, 0])).collect();
                        for (i, p) in held.into_iter().enumerate() {
                            assert_eq!(unsafe { p.as_ref()[2] }, i as u64);
                            unsafe { arena.free(p) };
                        }
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert!(arena.is_empty());
    }
}
