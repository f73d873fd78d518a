//! `Shared<T>`: the owning handle.
//!
//! A handle is a pair of a raw element pointer and an optional control-block
//! reference. The pointer is what `Deref` follows; the block is what keeps
//! it alive. The two usually agree, but aliasing handles point anywhere the
//! caller vouches for while sharing the block of another handle.
//!
//! Invariant: a handle without a block has no pointer. A handle with a block
//! may still have a null pointer (a null adopted with a custom deleter, or a
//! null alias).

use crate::adapter::{Deleter, DropBox, InlineBlock, PtrBlock};
use crate::allocator::{infallible, AllocError, Allocator, Global};
use crate::array::ForOverwrite;
use crate::control::Header;
use crate::owner::{Owned, OwnerId};
use crate::weak::Weak;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// An atomically reference-counted owning handle.
///
/// Functions on `Shared` are associated functions (`Shared::use_count(&s)`)
/// rather than methods, so they never shadow methods of `T` reached through
/// `Deref`.
///
/// Equality, ordering and hashing compare the stored pointer address, not
/// the pointee. Use [`ByOwner`](crate::ByOwner) to key by control block.
pub struct Shared<T: ?Sized> {
    pub(crate) ptr: Option<NonNull<T>>,
    pub(crate) block: Option<NonNull<Header>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for Shared<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Shared<T> {}

impl<T: ?Sized> Shared<T> {
    /// A handle that owns nothing and points nowhere.
    pub const fn empty() -> Self {
        Self {
            ptr: None,
            block: None,
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// If `block` is present the caller transfers one strong unit on it to
    /// the new handle, and `ptr` must stay valid while the block's object is
    /// alive. If `block` is absent, `ptr` must be `None`.
    #[inline]
    pub(crate) unsafe fn from_parts(ptr: Option<NonNull<T>>, block: Option<NonNull<Header>>) -> Self {
        debug_assert!(block.is_some() || ptr.is_none());
        Self {
            ptr,
            block,
            _marker: PhantomData,
        }
    }

    /// Dissolve the handle without returning its strong unit.
    #[inline]
    pub(crate) fn into_parts(this: Self) -> (Option<NonNull<T>>, Option<NonNull<Header>>) {
        let this = ManuallyDrop::new(this);
        (this.ptr, this.block)
    }

    /// Take one more strong unit on this handle's block.
    #[inline]
    pub(crate) fn share_block(this: &Self) -> Option<NonNull<Header>> {
        if let Some(block) = this.block {
            unsafe { Header::add_strong(block) };
        }
        this.block
    }

    /// Take ownership of a boxed value.
    pub fn from_box(value: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }

    /// Adopt a pointer obtained from `Box::into_raw`.
    ///
    /// A null pointer still gets a control block; `use_count` is then 1.
    ///
    /// # Safety
    /// `ptr` must be null or come from `Box::<T>::into_raw`, and must not be
    /// owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self::from_raw_with(ptr, DropBox)
    }

    /// Adopt `ptr`, to be released by `deleter` when the last owner goes
    /// away. The deleter runs even if `ptr` is null.
    ///
    /// # Safety
    /// `ptr` must be null or valid for reads for as long as any owner is
    /// alive, and must not be written through other paths while owners
    /// exist. `deleter` must be fit to release it.
    pub unsafe fn from_raw_with<D>(ptr: *mut T, deleter: D) -> Self
    where
        D: Deleter<T> + Send + Sync + 'static,
    {
        Self::from_raw_in(ptr, deleter, Global)
    }

    /// Like [`from_raw_with`](Self::from_raw_with), allocating the control
    /// block from `alloc`.
    ///
    /// # Safety
    /// See [`from_raw_with`](Self::from_raw_with).
    pub unsafe fn from_raw_in<D, A>(ptr: *mut T, deleter: D, alloc: A) -> Self
    where
        D: Deleter<T> + Send + Sync + 'static,
        A: Allocator + Send + Sync + 'static,
    {
        infallible(Self::try_from_raw_in(ptr, deleter, alloc))
    }

    /// Fallible adoption. If the control block cannot be allocated, the
    /// deleter has been run on `ptr` by the time the error is returned.
    ///
    /// # Safety
    /// See [`from_raw_with`](Self::from_raw_with).
    pub unsafe fn try_from_raw_in<D, A>(ptr: *mut T, deleter: D, alloc: A) -> Result<Self, AllocError>
    where
        D: Deleter<T> + Send + Sync + 'static,
        A: Allocator + Send + Sync + 'static,
    {
        let block = PtrBlock::create(ptr, deleter, alloc)?;
        Ok(Self::from_parts(NonNull::new(ptr), Some(block)))
    }

    /// The pointee, or `None` for a null handle.
    #[inline]
    pub fn get(this: &Self) -> Option<&T> {
        // Safety: a non-null pointer is kept alive by the block we hold.
        this.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    #[inline]
    pub fn as_non_null(this: &Self) -> Option<NonNull<T>> {
        this.ptr
    }

    #[inline]
    pub fn is_null(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// Number of owners sharing this handle's block; 0 for an empty handle.
    #[inline]
    pub fn use_count(this: &Self) -> usize {
        this.block.map_or(0, |block| unsafe { Header::strong_count(block) })
    }

    /// Number of `Weak` observers of this handle's block.
    #[inline]
    pub fn weak_count(this: &Self) -> usize {
        this.block.map_or(0, |block| unsafe { Header::weak_count(block) })
    }

    /// Mutable access when this handle is the only reference of any kind to
    /// its block and points at the managed object itself.
    ///
    /// Aliasing and projected handles always get `None`.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        let (ptr, block) = (this.ptr?, this.block?);
        unsafe {
            if ptr.as_ptr().cast::<()>().cast_const() != Header::object(block) {
                return None;
            }
            if !Header::is_unique(block) {
                return None;
            }
            Some(&mut *ptr.as_ptr())
        }
    }

    /// A new observer of this handle's block.
    pub fn downgrade(this: &Self) -> Weak<T> {
        Weak::from_shared(this)
    }

    /// Identity of the control block, independent of the stored pointer.
    #[inline]
    pub fn owner_id(this: &Self) -> OwnerId {
        OwnerId::of(this.block)
    }

    /// Strict weak order by control block: aliases of the same object are
    /// equivalent, whatever they point at.
    pub fn owner_before<P: Owned + ?Sized>(this: &Self, other: &P) -> bool {
        Self::owner_id(this) < other.owner_id()
    }

    #[inline]
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(this, other)
    }

    /// Release ownership, leaving the handle empty.
    pub fn reset(this: &mut Self) {
        *this = Self::empty();
    }

    /// Replace the managed object with `value`.
    pub fn reset_box(this: &mut Self, value: Box<T>) {
        *this = Self::from_box(value);
    }

    /// Replace the managed object with an adopted pointer.
    ///
    /// # Safety
    /// See [`from_raw_with`](Self::from_raw_with).
    pub unsafe fn reset_with<D>(this: &mut Self, ptr: *mut T, deleter: D)
    where
        D: Deleter<T> + Send + Sync + 'static,
    {
        *this = Self::from_raw_with(ptr, deleter);
    }

    /// Fallible [`reset_with`](Self::reset_with) with a caller-chosen
    /// allocator. On error the handle is unchanged and `ptr` has already been
    /// released by `deleter`.
    ///
    /// # Safety
    /// See [`from_raw_with`](Self::from_raw_with).
    pub unsafe fn try_reset_in<D, A>(this: &mut Self, ptr: *mut T, deleter: D, alloc: A) -> Result<(), AllocError>
    where
        D: Deleter<T> + Send + Sync + 'static,
        A: Allocator + Send + Sync + 'static,
    {
        *this = Self::try_from_raw_in(ptr, deleter, alloc)?;
        Ok(())
    }

    /// A handle sharing this one's block but pointing at `ptr`.
    ///
    /// Aliasing an empty handle gives an empty handle.
    ///
    /// # Safety
    /// `ptr` must be null or valid for reads for as long as the block's object
    /// is alive, typically because it points into that object.
    ///
    /// If `U` is `Send + Sync` the result can cross threads, and whichever
    /// thread releases the last owner destroys the object. The object must
    /// then be `Send`, and `Sync` if other owners may use it concurrently,
    /// whatever `T` is.
    pub unsafe fn alias<U: ?Sized>(this: &Self, ptr: *const U) -> Shared<U> {
        if this.block.is_none() {
            return Shared::empty();
        }
        Shared::from_parts(NonNull::new(ptr.cast_mut()), Self::share_block(this))
    }

    /// Like [`alias`](Self::alias), moving this handle's strong unit into the
    /// result instead of taking a new one.
    ///
    /// # Safety
    /// See [`alias`](Self::alias), including its thread-safety condition.
    pub unsafe fn alias_owned<U: ?Sized>(this: Self, ptr: *const U) -> Shared<U> {
        match Self::into_parts(this) {
            (_, None) => Shared::empty(),
            (_, block) => Shared::from_parts(NonNull::new(ptr.cast_mut()), block),
        }
    }

    fn addr(&self) -> *const () {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr().cast::<()>().cast_const())
    }
}

impl<T> Shared<T> {
    /// Allocate a control block with `value` stored inside it.
    pub fn new(value: T) -> Self {
        Self::new_in(value, Global)
    }

    pub fn new_in<A>(value: T, alloc: A) -> Self
    where
        A: Allocator + Send + Sync + 'static,
    {
        infallible(Self::try_new_in(value, alloc))
    }

    /// Fallible [`new_in`](Self::new_in). On error `value` has been dropped.
    pub fn try_new_in<A>(value: T, alloc: A) -> Result<Self, AllocError>
    where
        A: Allocator + Send + Sync + 'static,
    {
        let (block, ptr) = InlineBlock::create(value, alloc)?;
        Ok(unsafe { Self::from_parts(Some(ptr), Some(block)) })
    }

    /// Allocate a control block whose object is only initialized as far as
    /// [`ForOverwrite`] says.
    pub fn new_for_overwrite() -> Self
    where
        T: ForOverwrite,
    {
        Self::new_for_overwrite_in(Global)
    }

    pub fn new_for_overwrite_in<A>(alloc: A) -> Self
    where
        T: ForOverwrite,
        A: Allocator + Send + Sync + 'static,
    {
        infallible(Self::try_new_for_overwrite_in(alloc))
    }

    pub fn try_new_for_overwrite_in<A>(alloc: A) -> Result<Self, AllocError>
    where
        T: ForOverwrite,
        A: Allocator + Send + Sync + 'static,
    {
        let (block, ptr) = InlineBlock::create_with(alloc, |slot| unsafe {
            T::init_for_overwrite(slot.as_ptr())
        })?;
        Ok(unsafe { Self::from_parts(Some(ptr), Some(block)) })
    }

    /// The stored pointer; null for a null handle.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.map_or(ptr::null(), |p| p.as_ptr().cast_const())
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        let block = Self::share_block(self);
        unsafe { Self::from_parts(self.ptr, block) }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(block) = self.block {
            unsafe { Header::release_strong(block) };
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    /// If the handle is null.
    #[inline]
    #[track_caller]
    fn deref(&self) -> &T {
        match Self::get(self) {
            Some(value) => value,
            None => null_deref(),
        }
    }
}

#[cold]
#[track_caller]
fn null_deref() -> ! {
    panic!("dereferenced a null Shared")
}

impl<T: ?Sized> AsRef<T> for Shared<T> {
    #[track_caller]
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::get(self) {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("(null)"),
        }
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::get(self) {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("(null)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    #[inline]
    fn eq(&self, other: &Shared<U>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized, U: ?Sized> PartialOrd<Shared<U>> for Shared<T> {
    fn partial_cmp(&self, other: &Shared<U>) -> Option<Ordering> {
        Some(self.addr().cmp(&other.addr()))
    }
}

impl<T: ?Sized> Ord for Shared<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: ?Sized> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state)
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
