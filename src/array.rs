//! Array owners: `Shared<[T]>` and `Shared<[T; N]>`.
//!
//! Array factories allocate one block holding the element count and the
//! elements. Elements are constructed from index 0 upward and destroyed from
//! the last index down. If an element constructor panics, the elements built
//! so far are destroyed (again last first) and the block is freed.

use crate::adapter::SliceBlock;
use crate::allocator::{infallible, AllocError, Allocator, Global};
use crate::shared::Shared;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

/// Types that can be placed in storage without full initialization.
///
/// `MaybeUninit<T>` leaves the bytes alone. A user type can implement this
/// to set only the fields that need a value, such as the ones with a `Drop`
/// impl, and leave buffers to be written later.
///
/// # Safety
/// After `init_for_overwrite` returns, `*slot` must be a valid `Self`.
pub unsafe trait ForOverwrite {
    /// # Safety
    /// `slot` is valid for writes and properly aligned.
    unsafe fn init_for_overwrite(slot: *mut Self);
}

unsafe impl<T> ForOverwrite for MaybeUninit<T> {
    #[inline]
    unsafe fn init_for_overwrite(_: *mut Self) {}
}

/// Elements initialized before a panicking element are leaked.
unsafe impl<T: ForOverwrite, const N: usize> ForOverwrite for [T; N] {
    unsafe fn init_for_overwrite(slot: *mut Self) {
        let first = slot.cast::<T>();
        for i in 0..N {
            T::init_for_overwrite(first.add(i));
        }
    }
}

impl<T> Shared<[T]> {
    fn try_build_in<A, F>(len: usize, alloc: A, init: F) -> Result<Self, AllocError>
    where
        A: Allocator + Send + Sync + 'static,
        F: FnMut(usize, NonNull<T>),
    {
        let (block, elems) = SliceBlock::<T, A>::create(len, alloc, init)?;
        Ok(unsafe { Self::from_parts(Some(elems), Some(block)) })
    }

    /// `len` elements, element `i` produced by `f(i)`.
    pub fn new_slice_with<F>(len: usize, f: F) -> Self
    where
        F: FnMut(usize) -> T,
    {
        Self::new_slice_with_in(len, Global, f)
    }

    pub fn new_slice_with_in<A, F>(len: usize, alloc: A, f: F) -> Self
    where
        A: Allocator + Send + Sync + 'static,
        F: FnMut(usize) -> T,
    {
        infallible(Self::try_new_slice_with_in(len, alloc, f))
    }

    pub fn try_new_slice_with_in<A, F>(len: usize, alloc: A, mut f: F) -> Result<Self, AllocError>
    where
        A: Allocator + Send + Sync + 'static,
        F: FnMut(usize) -> T,
    {
        Self::try_build_in(len, alloc, |i, slot| unsafe { slot.as_ptr().write(f(i)) })
    }

    /// `len` value-initialized elements.
    pub fn new_slice_default(len: usize) -> Self
    where
        T: Default,
    {
        Self::new_slice_with(len, |_| T::default())
    }

    pub fn new_slice_default_in<A>(len: usize, alloc: A) -> Self
    where
        T: Default,
        A: Allocator + Send + Sync + 'static,
    {
        Self::new_slice_with_in(len, alloc, |_| T::default())
    }

    pub fn try_new_slice_default_in<A>(len: usize, alloc: A) -> Result<Self, AllocError>
    where
        T: Default,
        A: Allocator + Send + Sync + 'static,
    {
        Self::try_new_slice_with_in(len, alloc, |_| T::default())
    }

    /// `len` clones of `value`.
    pub fn new_slice_filled(len: usize, value: &T) -> Self
    where
        T: Clone,
    {
        Self::new_slice_with(len, |_| value.clone())
    }

    pub fn new_slice_filled_in<A>(len: usize, value: &T, alloc: A) -> Self
    where
        T: Clone,
        A: Allocator + Send + Sync + 'static,
    {
        Self::new_slice_with_in(len, alloc, |_| value.clone())
    }

    pub fn try_new_slice_filled_in<A>(len: usize, value: &T, alloc: A) -> Result<Self, AllocError>
    where
        T: Clone,
        A: Allocator + Send + Sync + 'static,
    {
        Self::try_new_slice_with_in(len, alloc, |_| value.clone())
    }

    pub fn new_slice_for_overwrite(len: usize) -> Self
    where
        T: ForOverwrite,
    {
        Self::new_slice_for_overwrite_in(len, Global)
    }

    pub fn new_slice_for_overwrite_in<A>(len: usize, alloc: A) -> Self
    where
        T: ForOverwrite,
        A: Allocator + Send + Sync + 'static,
    {
        infallible(Self::try_new_slice_for_overwrite_in(len, alloc))
    }

    pub fn try_new_slice_for_overwrite_in<A>(len: usize, alloc: A) -> Result<Self, AllocError>
    where
        T: ForOverwrite,
        A: Allocator + Send + Sync + 'static,
    {
        Self::try_build_in(len, alloc, |_, slot| unsafe { T::init_for_overwrite(slot.as_ptr()) })
    }

    /// Address of element `index`, computed without a bounds check.
    ///
    /// # Safety
    /// The handle must be non-null and `index` at most its length.
    pub unsafe fn element_ptr(this: &Self, index: usize) -> *const T {
        match this.ptr {
            Some(elems) => elems.as_ptr().cast::<T>().add(index).cast_const(),
            None => ptr::null(),
        }
    }
}

impl<T, const N: usize> Shared<[T; N]> {
    fn try_build_in<A, F>(alloc: A, init: F) -> Result<Self, AllocError>
    where
        A: Allocator + Send + Sync + 'static,
        F: FnMut(usize, NonNull<T>),
    {
        let (block, elems) = SliceBlock::<T, A>::create(N, alloc, init)?;
        Ok(unsafe { Self::from_parts(Some(elems.cast::<[T; N]>()), Some(block)) })
    }

    pub fn new_array_with<F>(f: F) -> Self
    where
        F: FnMut(usize) -> T,
    {
        Self::new_array_with_in(Global, f)
    }

    pub fn new_array_with_in<A, F>(alloc: A, f: F) -> Self
    where
        A: Allocator + Send + Sync + 'static,
        F: FnMut(usize) -> T,
    {
        infallible(Self::try_new_array_with_in(alloc, f))
    }

    pub fn try_new_array_with_in<A, F>(alloc: A, mut f: F) -> Result<Self, AllocError>
    where
        A: Allocator + Send + Sync + 'static,
        F: FnMut(usize) -> T,
    {
        Self::try_build_in(alloc, |i, slot| unsafe { slot.as_ptr().write(f(i)) })
    }

    pub fn new_array_default() -> Self
    where
        T: Default,
    {
        Self::new_array_with(|_| T::default())
    }

    pub fn new_array_default_in<A>(alloc: A) -> Self
    where
        T: Default,
        A: Allocator + Send + Sync + 'static,
    {
        Self::new_array_with_in(alloc, |_| T::default())
    }

    pub fn try_new_array_default_in<A>(alloc: A) -> Result<Self, AllocError>
    where
        T: Default,
        A: Allocator + Send + Sync + 'static,
    {
        Self::try_new_array_with_in(alloc, |_| T::default())
    }

    pub fn new_array_filled(value: &T) -> Self
    where
        T: Clone,
    {
        Self::new_array_with(|_| value.clone())
    }

    pub fn new_array_filled_in<A>(value: &T, alloc: A) -> Self
    where
        T: Clone,
        A: Allocator + Send + Sync + 'static,
    {
        Self::new_array_with_in(alloc, |_| value.clone())
    }

    pub fn try_new_array_filled_in<A>(value: &T, alloc: A) -> Result<Self, AllocError>
    where
        T: Clone,
        A: Allocator + Send + Sync + 'static,
    {
        Self::try_new_array_with_in(alloc, |_| value.clone())
    }

    pub fn new_array_for_overwrite() -> Self
    where
        T: ForOverwrite,
    {
        Self::new_array_for_overwrite_in(Global)
    }

    pub fn new_array_for_overwrite_in<A>(alloc: A) -> Self
    where
        T: ForOverwrite,
        A: Allocator + Send + Sync + 'static,
    {
        infallible(Self::try_new_array_for_overwrite_in(alloc))
    }

    pub fn try_new_array_for_overwrite_in<A>(alloc: A) -> Result<Self, AllocError>
    where
        T: ForOverwrite,
        A: Allocator + Send + Sync + 'static,
    {
        Self::try_build_in(alloc, |_, slot| unsafe { T::init_for_overwrite(slot.as_ptr()) })
    }

    /// Forget the length in the type.
    pub fn into_slice(this: Self) -> Shared<[T]> {
        let (ptr, block) = Self::into_parts(this);
        let ptr = ptr.map(|elems| NonNull::slice_from_raw_parts(elems.cast::<T>(), N));
        unsafe { Shared::from_parts(ptr, block) }
    }
}

// The block was built for `MaybeUninit<T>` storage and keeps destroying it
// as such after the conversion, so `T`'s destructor would never run. `Copy`
// restricts these to types that have none.
impl<T: Copy> Shared<MaybeUninit<T>> {
    /// Treat overwritten storage as a value.
    ///
    /// Only for `Copy` types: the block still destroys a `MaybeUninit<T>`,
    /// which never runs `T`'s destructor.
    ///
    /// ```
    /// use shared_owner::Shared;
    /// use std::mem::MaybeUninit;
    ///
    /// let mut slot = Shared::<MaybeUninit<u64>>::new_for_overwrite();
    /// Shared::get_mut(&mut slot).unwrap().write(9);
    /// let value = unsafe { Shared::<MaybeUninit<u64>>::assume_init(slot) };
    /// assert_eq!(*value, 9);
    /// ```
    ///
    /// A type with a destructor is rejected:
    ///
    /// ```compile_fail
    /// use shared_owner::Shared;
    /// use std::mem::MaybeUninit;
    ///
    /// let mut slot = Shared::<MaybeUninit<String>>::new_for_overwrite();
    /// Shared::get_mut(&mut slot).unwrap().write(String::from("leaked"));
    /// let value = unsafe { Shared::<MaybeUninit<String>>::assume_init(slot) };
    /// ```
    ///
    /// # Safety
    /// The value must have been fully initialized through this or another
    /// owner.
    pub unsafe fn assume_init(this: Self) -> Shared<T> {
        let (ptr, block) = Self::into_parts(this);
        Shared::from_parts(ptr.map(NonNull::cast), block)
    }
}

impl<T: Copy> Shared<[MaybeUninit<T>]> {
    /// Treat overwritten elements as values. `Copy` only, for the same
    /// reason as the single-value form.
    ///
    /// # Safety
    /// Every element must have been initialized.
    pub unsafe fn assume_init(this: Self) -> Shared<[T]> {
        let (ptr, block) = Self::into_parts(this);
        let ptr = ptr.map(|elems| NonNull::slice_from_raw_parts(elems.cast::<T>(), elems.len()));
        Shared::from_parts(ptr, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Logged<'a> {
        id: usize,
        log: &'a Mutex<Vec<usize>>,
    }

    impl Drop for Logged<'_> {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(self.id);
        }
    }

    #[test]
    fn destroys_highest_index_first() {
        let log = Mutex::new(Vec::new());
        let arr = Shared::<[Logged<'_>]>::new_slice_with(4, |id| Logged { id, log: &log });
        assert_eq!(arr.len(), 4);
        assert_eq!(arr[2].id, 2);
        drop(arr);
        assert_eq!(*log.lock().unwrap(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn panicking_constructor_unwinds_built_elements() {
        let log = Mutex::new(Vec::new());
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Shared::<[Logged<'_>]>::new_slice_with(5, |id| {
                if id == 3 {
                    panic!("element 3");
                }
                Logged { id, log: &log }
            })
        }));
        assert!(res.is_err());
        assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn empty_slice_still_has_a_block() {
        let arr = Shared::<[String]>::new_slice_default(0);
        assert!(arr.is_empty());
        assert!(!Shared::is_null(&arr));
        assert_eq!(Shared::use_count(&arr), 1);
    }

    #[test]
    fn fixed_array_into_slice() {
        let arr = Shared::<[u16; 3]>::new_array_filled(&9);
        let alias = arr.clone();
        let slice = Shared::into_slice(arr);
        assert_eq!(&*slice, &[9, 9, 9]);
        assert_eq!(Shared::use_count(&alias), 2);
        assert_eq!(unsafe { *Shared::element_ptr(&slice, 1) }, 9);
    }

    #[test]
    fn uninit_then_assume_init() {
        let mut buf = Shared::<[MaybeUninit<u32>]>::new_slice_for_overwrite(3);
        for (i, slot) in Shared::get_mut(&mut buf).unwrap().iter_mut().enumerate() {
            slot.write(i as u32 * 10);
        }
        let buf = unsafe { Shared::<[MaybeUninit<u32>]>::assume_init(buf) };
        assert_eq!(&*buf, &[0, 10, 20]);
    }
}
