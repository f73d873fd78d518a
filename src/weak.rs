//! `Weak<T>`: the non-owning observer.

use crate::control::Header;
use crate::owner::{Owned, OwnerId};
use crate::shared::Shared;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

/// Observes the control block of a [`Shared`] without keeping the object
/// alive. The stored pointer is frozen at creation and only reachable
/// again through [`upgrade`](Weak::upgrade).
pub struct Weak<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    block: Option<NonNull<Header>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for Weak<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Weak<T> {}

impl<T: ?Sized> Weak<T> {
    /// An observer of nothing; always expired.
    pub const fn new() -> Self {
        Self {
            ptr: None,
            block: None,
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_shared(owner: &Shared<T>) -> Self {
        if let Some(block) = owner.block {
            unsafe { Header::add_weak(block) };
        }
        Self {
            ptr: owner.ptr,
            block: owner.block,
            _marker: PhantomData,
        }
    }

    /// A new owner of the observed object, or `None` once it has been
    /// destroyed. Never races with the destruction: either the count was
    /// still positive and is now one higher, or the upgrade fails.
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let block = self.block?;
        if unsafe { Header::try_lock(block) } {
            Some(unsafe { Shared::from_parts(self.ptr, Some(block)) })
        } else {
            None
        }
    }

    /// Whether the observed object is gone. The answer may be stale by the
    /// time it is read; use [`upgrade`](Weak::upgrade) to act on it.
    #[inline]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    #[inline]
    pub fn use_count(&self) -> usize {
        self.block.map_or(0, |block| unsafe { Header::strong_count(block) })
    }

    #[inline]
    pub fn weak_count(&self) -> usize {
        self.block.map_or(0, |block| unsafe { Header::weak_count(block) })
    }

    #[inline]
    pub fn owner_id(&self) -> OwnerId {
        OwnerId::of(self.block)
    }

    pub fn owner_before<P: Owned + ?Sized>(&self, other: &P) -> bool {
        self.owner_id() < other.owner_id()
    }

    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<T> Weak<T> {
    /// The frozen pointer. Null for an empty observer; possibly dangling
    /// once expired.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr().cast_const())
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            unsafe { Header::add_weak(block) };
        }
        Self {
            ptr: self.ptr,
            block: self.block,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            unsafe { Header::release_weak(block) };
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(owner: &Shared<T>) -> Self {
        Self::from_shared(owner)
    }
}
