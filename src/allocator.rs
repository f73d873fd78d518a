//! Allocator interface used for control blocks.
//!
//! `std::alloc::Allocator` is unstable, so blocks are allocated through this
//! small trait instead. An allocator instance is moved into the block it
//! allocated and moved back out to free it: every instance sees exactly one
//! `allocate` and at most one matching `deallocate`.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;

/// The allocator could not satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("memory allocation of {} bytes (align {}) failed", .layout.size(), .layout.align())]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// The layout of the request that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// Unwrap the result of an allocating constructor, diverting failures to
/// `std::alloc::handle_alloc_error`.
#[inline]
pub(crate) fn infallible<R>(res: Result<R, AllocError>) -> R {
    match res {
        Ok(value) => value,
        Err(err) => std::alloc::handle_alloc_error(err.layout()),
    }
}

/// A source of memory for control blocks.
///
/// # Safety
/// - `allocate` must return memory valid for reads and writes of
///   `layout.size()` bytes, aligned to `layout.align()`, that stays valid
///   until passed to `deallocate` (or forever, for allocators that never
///   reclaim).
/// - `deallocate` may be a no-op (monotonic or arena allocators).
pub unsafe trait Allocator {
    /// Allocate a block for `layout`. Control blocks never request a
    /// zero-sized layout.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Release a block previously returned by `allocate`.
    ///
    /// # Safety
    /// `ptr` must come from `allocate` on this allocator (or a clone of it)
    /// with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global heap, via `std::alloc`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);
        // Safety: control blocks always have a non-zero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

unsafe impl<A> Allocator for &A
where
    A: Allocator + ?Sized,
{
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}

unsafe impl<A> Allocator for Arc<A>
where
    A: Allocator + ?Sized,
{
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}
