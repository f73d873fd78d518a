//! Concrete control blocks.
//!
//! Three layouts share the `Header` prefix:
//! - `PtrBlock<T, D, A>`: adopts a caller-supplied pointer and binds its
//!   deleter and allocator into one allocation.
//! - `InlineBlock<T, A>`: combined allocation; the object lives inside the
//!   block.
//! - `SliceBlock<T, A>`: combined allocation for a runtime-length array; the
//!   element count is stored in the block and the elements trail it.
//!
//! Each layout installs its own `BlockOps`, so the handles never see the
//! deleter or allocator types.

use crate::allocator::{AllocError, Allocator};
use crate::control::{BlockOps, Header};
use crate::shared::Shared;
use std::alloc::Layout;
use std::any::TypeId;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ptr::{self, addr_of_mut, NonNull};

/// Releases an adopted pointer when its last owner goes away.
///
/// Implemented for every `FnMut(*mut T)` closure and function pointer, and
/// by [`DropBox`].
pub trait Deleter<T: ?Sized> {
    /// # Safety
    /// Called at most once per adoption, with the adopted pointer (which may
    /// be null).
    unsafe fn delete(&mut self, ptr: *mut T);
}

impl<T, F> Deleter<T> for F
where
    T: ?Sized,
    F: FnMut(*mut T),
{
    #[inline]
    unsafe fn delete(&mut self, ptr: *mut T) {
        self(ptr)
    }
}

/// The default deleter: the pointer came from `Box::into_raw`. Null pointers
/// are ignored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DropBox;

impl<T: ?Sized> Deleter<T> for DropBox {
    #[inline]
    unsafe fn delete(&mut self, ptr: *mut T) {
        if !ptr.is_null() {
            drop(Box::from_raw(ptr));
        }
    }
}

/// Retrieve the deleter stored in `owner`'s control block, if it has type
/// exactly `D`.
///
/// Blocks created by the allocating factories have no deleter.
pub fn get_deleter<D, T>(owner: &Shared<T>) -> Option<&D>
where
    D: 'static,
    T: ?Sized,
{
    let block = owner.block?;
    // Safety: `owner` holds a strong unit, and the deleter is only dropped on
    // deallocation, which cannot happen while the borrow of `owner` lives.
    unsafe {
        Header::deleter(block, TypeId::of::<D>()).map(|deleter| deleter.cast::<D>().as_ref())
    }
}

#[repr(C)]
pub(crate) struct PtrBlock<T: ?Sized, D, A> {
    header: Header,
    ptr: *mut T,
    deleter: D,
    alloc: ManuallyDrop<A>,
}

impl<T, D, A> PtrBlock<T, D, A>
where
    T: ?Sized,
    D: Deleter<T> + 'static,
    A: Allocator,
{
    const OPS: &'static BlockOps = &BlockOps {
        destroy: Self::destroy,
        deallocate: Self::deallocate,
        deleter: Self::deleter,
        object: Self::object,
    };

    /// Allocate a block adopting `ptr`.
    ///
    /// On allocation failure the deleter has already been run on `ptr` when
    /// the error is returned.
    ///
    /// # Safety
    /// `deleter` must be fit to release `ptr`.
    pub(crate) unsafe fn create(
        ptr: *mut T,
        mut deleter: D,
        alloc: A,
    ) -> Result<NonNull<Header>, AllocError> {
        let layout = Layout::new::<Self>();
        let mem = match alloc.allocate(layout) {
            Ok(mem) => mem,
            Err(err) => {
                log::warn!("{err}; releasing the adopted pointer");
                deleter.delete(ptr);
                return Err(err);
            }
        };
        let block = mem.cast::<Self>();
        block.as_ptr().write(Self {
            header: Header::new(Self::OPS),
            ptr,
            deleter,
            alloc: ManuallyDrop::new(alloc),
        });
        Ok(block.cast())
    }

    unsafe fn destroy(header: NonNull<Header>) {
        let block = header.cast::<Self>().as_ptr();
        let ptr = (*block).ptr;
        (*block).deleter.delete(ptr);
    }

    unsafe fn deallocate(header: NonNull<Header>) {
        let block = header.cast::<Self>().as_ptr();
        let alloc = ManuallyDrop::take(&mut (*block).alloc);
        ptr::drop_in_place(addr_of_mut!((*block).deleter));
        alloc.deallocate(header.cast(), Layout::new::<Self>());
    }

    unsafe fn object(header: NonNull<Header>) -> *const () {
        (*header.cast::<Self>().as_ptr()).ptr.cast::<()>()
    }

    unsafe fn deleter(header: NonNull<Header>, id: TypeId) -> Option<NonNull<()>> {
        if id != TypeId::of::<D>() {
            return None;
        }
        let block = header.cast::<Self>().as_ptr();
        NonNull::new(addr_of_mut!((*block).deleter).cast::<()>())
    }
}

#[repr(C)]
pub(crate) struct InlineBlock<T, A> {
    header: Header,
    alloc: ManuallyDrop<A>,
    value: ManuallyDrop<T>,
}

impl<T, A> InlineBlock<T, A>
where
    A: Allocator,
{
    const OPS: &'static BlockOps = &BlockOps {
        destroy: Self::destroy,
        deallocate: Self::deallocate,
        deleter: no_deleter,
        object: Self::object,
    };

    /// Allocate a block and move `value` into it. On failure `value` is
    /// dropped before the error is returned.
    pub(crate) fn create(value: T, alloc: A) -> Result<(NonNull<Header>, NonNull<T>), AllocError> {
        Self::create_with(alloc, |slot| unsafe { slot.as_ptr().write(value) })
    }

    /// Allocate a block and let `init` construct the object in place.
    ///
    /// `init` must leave a valid `T` behind when it returns. If it panics,
    /// the block is freed and nothing is dropped.
    pub(crate) fn create_with<F>(alloc: A, init: F) -> Result<(NonNull<Header>, NonNull<T>), AllocError>
    where
        F: FnOnce(NonNull<T>),
    {
        let layout = Layout::new::<Self>();
        let block = allocate_block(&alloc, layout)?.cast::<Self>();
        unsafe {
            let raw = block.as_ptr();
            addr_of_mut!((*raw).header).write(Header::new(Self::OPS));
            addr_of_mut!((*raw).alloc).write(ManuallyDrop::new(alloc));
            let value = NonNull::new_unchecked(addr_of_mut!((*raw).value).cast::<T>());
            let unwind = FreeOnUnwind {
                alloc: NonNull::new_unchecked(addr_of_mut!((*raw).alloc)),
                mem: block.cast(),
                layout,
            };
            init(value);
            mem::forget(unwind);
            Ok((block.cast(), value))
        }
    }

    unsafe fn destroy(header: NonNull<Header>) {
        let block = header.cast::<Self>().as_ptr();
        ManuallyDrop::drop(&mut (*block).value);
    }

    unsafe fn object(header: NonNull<Header>) -> *const () {
        addr_of_mut!((*header.cast::<Self>().as_ptr()).value).cast::<()>()
    }

    unsafe fn deallocate(header: NonNull<Header>) {
        let block = header.cast::<Self>().as_ptr();
        let alloc = ManuallyDrop::take(&mut (*block).alloc);
        alloc.deallocate(header.cast(), Layout::new::<Self>());
    }
}

#[repr(C)]
struct SliceHead<A> {
    header: Header,
    alloc: ManuallyDrop<A>,
    len: usize,
}

pub(crate) struct SliceBlock<T, A> {
    _marker: PhantomData<(fn() -> T, fn() -> A)>,
}

impl<T, A> SliceBlock<T, A>
where
    A: Allocator,
{
    const OPS: &'static BlockOps = &BlockOps {
        destroy: Self::destroy,
        deallocate: Self::deallocate,
        deleter: no_deleter,
        object: Self::object,
    };

    /// Block layout for `len` elements and the offset of element 0.
    fn layout(len: usize) -> (Layout, usize) {
        let elems = Layout::array::<T>(len).unwrap_or_else(|_| capacity_overflow());
        let (layout, offset) = Layout::new::<SliceHead<A>>()
            .extend(elems)
            .unwrap_or_else(|_| capacity_overflow());
        (layout.pad_to_align(), offset)
    }

    /// Allocate a block for `len` elements and construct them in index
    /// order, each in place by `init(index, slot)`.
    ///
    /// If `init` panics, the elements built so far are dropped in reverse
    /// order and the block is freed before the panic continues.
    pub(crate) fn create<F>(
        len: usize,
        alloc: A,
        mut init: F,
    ) -> Result<(NonNull<Header>, NonNull<[T]>), AllocError>
    where
        F: FnMut(usize, NonNull<T>),
    {
        let (layout, offset) = Self::layout(len);
        let mem = allocate_block(&alloc, layout)?;
        let head = mem.cast::<SliceHead<A>>();
        unsafe {
            head.as_ptr().write(SliceHead {
                header: Header::new(Self::OPS),
                alloc: ManuallyDrop::new(alloc),
                len,
            });
            let elems = NonNull::new_unchecked(mem.as_ptr().add(offset).cast::<T>());
            let mut partial = PartialSlice {
                head,
                elems,
                built: 0,
                layout,
            };
            while partial.built < len {
                init(partial.built, NonNull::new_unchecked(elems.as_ptr().add(partial.built)));
                partial.built += 1;
            }
            mem::forget(partial);
            Ok((head.cast(), NonNull::slice_from_raw_parts(elems, len)))
        }
    }

    unsafe fn elements(header: NonNull<Header>) -> (*mut T, usize) {
        let len = (*header.cast::<SliceHead<A>>().as_ptr()).len;
        let (_, offset) = Self::layout(len);
        (header.as_ptr().cast::<u8>().add(offset).cast::<T>(), len)
    }

    unsafe fn object(header: NonNull<Header>) -> *const () {
        Self::elements(header).0.cast::<()>()
    }

    unsafe fn destroy(header: NonNull<Header>) {
        let (elems, len) = Self::elements(header);
        drop_reverse(elems, len);
    }

    unsafe fn deallocate(header: NonNull<Header>) {
        let head = header.cast::<SliceHead<A>>().as_ptr();
        let (layout, _) = Self::layout((*head).len);
        let alloc = ManuallyDrop::take(&mut (*head).alloc);
        alloc.deallocate(header.cast(), layout);
    }
}

/// Cleanup for a slice block whose construction unwound.
struct PartialSlice<T, A: Allocator> {
    head: NonNull<SliceHead<A>>,
    elems: NonNull<T>,
    built: usize,
    layout: Layout,
}

impl<T, A: Allocator> Drop for PartialSlice<T, A> {
    fn drop(&mut self) {
        log::debug!(
            "array element constructor panicked after {} elements; releasing them",
            self.built
        );
        unsafe {
            drop_reverse(self.elems.as_ptr(), self.built);
            let alloc = ManuallyDrop::take(&mut (*self.head.as_ptr()).alloc);
            alloc.deallocate(self.head.cast(), self.layout);
        }
    }
}

/// Frees an inline block whose in-place constructor unwound.
struct FreeOnUnwind<A: Allocator> {
    alloc: NonNull<ManuallyDrop<A>>,
    mem: NonNull<u8>,
    layout: Layout,
}

impl<A: Allocator> Drop for FreeOnUnwind<A> {
    fn drop(&mut self) {
        log::debug!("in-place constructor panicked; releasing its block");
        unsafe {
            let alloc = ManuallyDrop::take(&mut *self.alloc.as_ptr());
            alloc.deallocate(self.mem, self.layout);
        }
    }
}

/// Drop `len` elements starting at `elems`, highest index first.
unsafe fn drop_reverse<T>(elems: *mut T, len: usize) {
    for i in (0..len).rev() {
        ptr::drop_in_place(elems.add(i));
    }
}

fn allocate_block<A: Allocator>(alloc: &A, layout: Layout) -> Result<NonNull<u8>, AllocError> {
    alloc.allocate(layout).map_err(|err| {
        log::warn!("{err}; control block not created");
        err
    })
}

unsafe fn no_deleter(_: NonNull<Header>, _: TypeId) -> Option<NonNull<()>> {
    None
}

#[cold]
fn capacity_overflow() -> ! {
    panic!("capacity overflow")
}
