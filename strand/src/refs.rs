//! Counted handles: shared ownership with non-owning observers.
//!
//! A [`Strong`] keeps its referent alive; a [`Weak`] only observes it and can be
//! upgraded while some `Strong` still exists. Both point at a counting block
//! allocated from a process-wide [`Arena`], guarded by its own mutex, which
//! holds the two counts and the type-erased pointer back to the object.
//!
//! The object is destroyed when the strong count reaches zero. The counting
//! block outlives it until the last weak handle goes too.

use core::any::TypeId;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

use crate::pool::Arena;
use crate::sync::Mutex;

/// Types that can be owned through counted handles.
///
/// Opt-in: implement it (usually with an empty body) for any type that should
/// be shareable through [`Strong`]/[`Weak`].
pub trait RefCounted: Send + Sync + 'static {
    /// Moves `self` into a new counting block and returns the first handle.
    fn into_strong(self) -> Strong<Self>
    where
        Self: Sized,
    {
        Strong::new(self)
    }
}

struct ErasedObject {
    ptr: NonNull<()>,
    drop_fn: unsafe fn(NonNull<()>),
    type_id: TypeId,
}

// SAFETY: only built from `RefCounted` objects, which are `Send + Sync`.
unsafe impl Send for ErasedObject {}

struct Counts {
    strong: usize,
    weak: usize,
    /// `None` once the object has been destroyed.
    object: Option<ErasedObject>,
}

struct CountingBlock {
    counts: Mutex<Counts>,
}

static BLOCKS: Arena<CountingBlock> = Arena::new();

unsafe fn drop_boxed<T>(ptr: NonNull<()>) {
    // SAFETY: `ptr` came from `Box::leak` of a `Box<T>` in `Strong::new`.
    drop(unsafe { Box::from_raw(ptr.cast::<T>().as_ptr()) });
}

/// Owning counted handle.
pub struct Strong<T: ?Sized> {
    block: NonNull<CountingBlock>,
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

/// Non-owning counted handle.
pub struct Weak<T: ?Sized> {
    block: NonNull<CountingBlock>,
    ptr: NonNull<T>,
    _observes: PhantomData<T>,
}

// SAFETY: the referent is shared between threads through these handles and
// all count updates happen under the block mutex.
unsafe impl<T: ?Sized + Send + Sync> Send for Strong<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Strong<T> {}
unsafe impl<T: ?Sized + Send + Sync> Send for Weak<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Weak<T> {}

impl<T: RefCounted> Strong<T> {
    /// Allocates a counting block for `value` with strong count 1.
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        let block = BLOCKS.alloc(CountingBlock {
            counts: Mutex::new(Counts {
                strong: 1,
                weak: 0,
                object: Some(ErasedObject {
                    ptr: ptr.cast(),
                    drop_fn: drop_boxed::<T>,
                    type_id: TypeId::of::<T>(),
                }),
            }),
        });
        Self {
            block,
            ptr,
            _owns: PhantomData,
        }
    }
}

impl<T: ?Sized> Strong<T> {
    fn counts(&self) -> &Mutex<Counts> {
        // SAFETY: a live handle keeps its block allocated.
        unsafe { &self.block.as_ref().counts }
    }

    /// Creates a weak handle to the same object.
    pub fn downgrade(this: &Self) -> Weak<T> {
        this.counts().lock().weak += 1;
        Weak {
            block: this.block,
            ptr: this.ptr,
            _observes: PhantomData,
        }
    }

    /// Number of strong handles to the object.
    pub fn strong_count(this: &Self) -> usize {
        this.counts().lock().strong
    }

    /// Number of weak handles to the object.
    pub fn weak_count(this: &Self) -> usize {
        this.counts().lock().weak
    }

    /// Whether both handles share one counting block.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.block == b.block
    }

    /// Converts to a handle for a view of the same object, such as a trait
    /// object or a field. Counts are transferred, not changed.
    pub fn map<U: ?Sized>(this: Self, f: impl for<'a> FnOnce(&'a T) -> &'a U) -> Strong<U> {
        let ptr = NonNull::from(f(&*this));
        let block = this.block;
        core::mem::forget(this);
        Strong {
            block,
            ptr,
            _owns: PhantomData,
        }
    }

    /// Returns a new handle typed as the object's concrete type, or `None` if
    /// the object is not a `U`.
    pub fn downcast<U: RefCounted>(this: &Self) -> Option<Strong<U>> {
        let mut counts = this.counts().lock();
        let object = counts.object.as_ref()?;
        if object.type_id != TypeId::of::<U>() {
            return None;
        }
        let ptr = object.ptr.cast::<U>();
        counts.strong += 1;
        Some(Strong {
            block: this.block,
            ptr,
            _owns: PhantomData,
        })
    }
}

impl<T: ?Sized> Clone for Strong<T> {
    fn clone(&self) -> Self {
        self.counts().lock().strong += 1;
        Self {
            block: self.block,
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.block != source.block {
            *self = source.clone();
        }
    }
}

impl<T: ?Sized> Deref for Strong<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: strong count > 0 keeps the object alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized> Drop for Strong<T> {
    fn drop(&mut self) {
        let (object, free_block) = {
            let mut counts = self.counts().lock();
            counts.strong -= 1;
            if counts.strong > 0 {
                return;
            }
            (counts.object.take(), counts.weak == 0)
        };
        if free_block {
            // SAFETY: no handles remain and the guard is released.
            unsafe { BLOCKS.free(self.block) };
        }
        if let Some(object) = object {
            // SAFETY: taken exactly once, when the last strong handle went.
            unsafe { (object.drop_fn)(object.ptr) };
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: ?Sized> Weak<T> {
    fn counts(&self) -> &Mutex<Counts> {
        // SAFETY: a live handle keeps its block allocated.
        unsafe { &self.block.as_ref().counts }
    }

    /// Returns a strong handle if the object is still alive.
    pub fn upgrade(&self) -> Option<Strong<T>> {
        let mut counts = self.counts().lock();
        if counts.strong == 0 {
            return None;
        }
        counts.strong += 1;
        Some(Strong {
            block: self.block,
            ptr: self.ptr,
            _owns: PhantomData,
        })
    }

    /// Number of strong handles; zero once the object is gone.
    pub fn strong_count(&self) -> usize {
        self.counts().lock().strong
    }

    /// Number of weak handles, this one included.
    pub fn weak_count(&self) -> usize {
        self.counts().lock().weak
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        self.counts().lock().weak += 1;
        Self {
            block: self.block,
            ptr: self.ptr,
            _observes: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        let free_block = {
            let mut counts = self.counts().lock();
            counts.weak -= 1;
            counts.weak == 0 && counts.strong == 0 && counts.object.is_none()
        };
        if free_block {
            // SAFETY: no handles remain and the object is already gone.
            unsafe { BLOCKS.free(self.block) };
        }
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}
