//! Control block header: the counts and the erased operation table.
//!
//! Every concrete block (see `adapter`) is `#[repr(C)]` with a `Header` as
//! its first field, so a `NonNull<Header>` is the uniform, type-erased
//! reference that `Shared` and `Weak` hold. The header never learns the
//! concrete type; it reaches it only through `BlockOps`.
//!
//! Counting protocol
//! - `strong` counts `Shared` handles.
//! - `weak` counts `Weak` handles plus one implicit unit held collectively
//!   by the strong handles until the managed object has been destroyed.
//! - strong 1 -> 0 runs `destroy`, then releases the implicit weak unit.
//! - weak 1 -> 0 runs `deallocate`. Since the implicit unit is only released
//!   after `destroy`, deallocation always follows destruction.
//!
//! These two transitions are the only synchronization points; both are
//! observed through `AtomicCount::put` (release decrement, acquire fence).

use crate::counts::AtomicCount;
use crate::debug_once::DebugOnce;
use std::any::TypeId;
use std::ptr::NonNull;

/// Operations fixed when a block is created.
pub(crate) struct BlockOps {
    /// Destroy the managed object (or run the deleter). Called exactly once.
    pub(crate) destroy: unsafe fn(NonNull<Header>),
    /// Drop the remaining block state and free the block. Called exactly once.
    pub(crate) deallocate: unsafe fn(NonNull<Header>),
    /// Return the stored deleter if its type matches.
    pub(crate) deleter: unsafe fn(NonNull<Header>, TypeId) -> Option<NonNull<()>>,
    /// Address of the managed object (first element for arrays).
    pub(crate) object: unsafe fn(NonNull<Header>) -> *const (),
}

#[repr(C)]
pub(crate) struct Header {
    strong: AtomicCount,
    weak: AtomicCount,
    ops: &'static BlockOps,
    destroyed: DebugOnce,
}

/// Releases the implicit weak unit once `destroy` returns or unwinds.
struct ReleaseImplicitWeak(NonNull<Header>);

impl Drop for ReleaseImplicitWeak {
    fn drop(&mut self) {
        unsafe { Header::release_weak(self.0) }
    }
}

impl Header {
    /// A fresh header: one strong unit for the creating handle, one implicit
    /// weak unit for "not yet destroyed".
    pub(crate) const fn new(ops: &'static BlockOps) -> Self {
        Self {
            strong: AtomicCount::new(1),
            weak: AtomicCount::new(1),
            ops,
            destroyed: DebugOnce::new(),
        }
    }

    /// # Safety
    /// The caller must hold a strong unit on `this`.
    #[inline]
    pub(crate) unsafe fn add_strong(this: NonNull<Self>) {
        this.as_ref().strong.get();
    }

    /// Return a strong unit; destroys the object on the last one.
    ///
    /// # Safety
    /// The caller must own the strong unit being returned.
    #[inline]
    pub(crate) unsafe fn release_strong(this: NonNull<Self>) {
        if this.as_ref().strong.put() {
            Self::destroy(this);
        }
    }

    #[cold]
    unsafe fn destroy(this: NonNull<Self>) {
        let header = this.as_ref();
        header.destroyed.fire("destroy");
        let destroy = header.ops.destroy;
        let _weak = ReleaseImplicitWeak(this);
        destroy(this);
    }

    /// # Safety
    /// The caller must hold a strong or weak unit on `this`.
    #[inline]
    pub(crate) unsafe fn add_weak(this: NonNull<Self>) {
        this.as_ref().weak.get();
    }

    /// Return a weak unit; frees the block on the last one.
    ///
    /// # Safety
    /// The caller must own the weak unit being returned. `this` must not be
    /// used afterwards.
    #[inline]
    pub(crate) unsafe fn release_weak(this: NonNull<Self>) {
        if this.as_ref().weak.put() {
            Self::deallocate(this);
        }
    }

    #[cold]
    unsafe fn deallocate(this: NonNull<Self>) {
        debug_assert_eq!(this.as_ref().strong.load(), 0);
        debug_assert!(this.as_ref().destroyed.has_fired());
        let deallocate = this.as_ref().ops.deallocate;
        log::trace!("control block {:p} deallocated", this);
        deallocate(this);
    }

    /// Mint a strong unit if the object has not been destroyed yet.
    ///
    /// # Safety
    /// The caller must hold a weak unit on `this`.
    #[inline]
    pub(crate) unsafe fn try_lock(this: NonNull<Self>) -> bool {
        this.as_ref().strong.try_get()
    }

    /// # Safety
    /// The caller must hold a strong or weak unit on `this`.
    #[inline]
    pub(crate) unsafe fn strong_count(this: NonNull<Self>) -> usize {
        this.as_ref().strong.load()
    }

    /// Weak handles only; the implicit unit is not reported.
    ///
    /// # Safety
    /// The caller must hold a strong or weak unit on `this`.
    #[inline]
    pub(crate) unsafe fn weak_count(this: NonNull<Self>) -> usize {
        let header = this.as_ref();
        let weak = header.weak.load();
        if header.strong.load() > 0 {
            weak.saturating_sub(1)
        } else {
            weak
        }
    }

    /// True when the caller's strong unit is the only reference of any kind.
    ///
    /// # Safety
    /// The caller must hold a strong unit on `this`.
    #[inline]
    pub(crate) unsafe fn is_unique(this: NonNull<Self>) -> bool {
        let header = this.as_ref();
        // Weak first: a Weak that upgraded and was then dropped released its
        // unit with release ordering, so the upgrade is visible below.
        header.weak.load() == 1 && header.strong.load() == 1
    }

    /// Address of the object the block manages, regardless of which pointer
    /// a handle stores.
    ///
    /// # Safety
    /// The caller must hold a strong or weak unit on `this`.
    #[inline]
    pub(crate) unsafe fn object(this: NonNull<Self>) -> *const () {
        let object = this.as_ref().ops.object;
        object(this)
    }

    /// # Safety
    /// The caller must hold a strong unit on `this` for as long as the
    /// returned pointer is used.
    #[inline]
    pub(crate) unsafe fn deleter(this: NonNull<Self>, id: TypeId) -> Option<NonNull<()>> {
        let lookup = this.as_ref().ops.deleter;
        lookup(this, id)
    }
}

/// Stable identity of a block, used for ownership ordering. Empty handles
/// map to zero.
#[inline]
pub(crate) fn owner_key(block: Option<NonNull<Header>>) -> usize {
    block.map_or(0, |b| b.as_ptr() as usize)
}
