//! Conversions between handle types that share one control block.
//!
//! Every conversion has a borrowing form, which takes a new strong unit, and
//! an `_owned` form, which moves the caller's unit into the result.
//!
//! - `cast_unchecked`: reinterpret the pointer (unsafe, never fails).
//! - `project`: point at something reachable from the object (safe).
//! - `as_cell` / `from_cell`: add or drop interior mutability.
//! - `downcast`: checked conversion from a type-erased pointee through
//!   [`AsAny`]. The only conversion that can fail; failure yields an empty
//!   handle.

use crate::shared::Shared;
use std::any::Any;
use std::cell::UnsafeCell;
use std::ptr::NonNull;

/// Runtime type inspection for `downcast`.
///
/// Implemented for every sized `'static` type and for `dyn Any` (with and
/// without `Send`/`Sync`). Use it as a supertrait to make a trait object
/// downcastable:
///
/// ```
/// use shared_owner::{AsAny, Shared};
///
/// trait Shape: AsAny {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// let shape: Shared<dyn Shape> = Shared::from_box(Box::new(Square(2.0)));
/// let square = Shared::downcast::<Square>(&shape);
/// assert_eq!(square.0, 2.0);
/// assert!(Shared::is_null(&Shared::downcast::<u8>(&shape)));
/// ```
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl AsAny for dyn Any {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl AsAny for dyn Any + Send {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl AsAny for dyn Any + Send + Sync {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: ?Sized> Shared<T> {
    /// Reinterpret the pointer as `*const U`.
    ///
    /// # Safety
    /// The pointee must be valid as a `U` for as long as the object lives.
    /// If `U` is `Send + Sync` the object may be destroyed on another
    /// thread, so it must be safe to send there.
    pub unsafe fn cast_unchecked<U>(this: &Self) -> Shared<U> {
        Shared::from_parts(this.ptr.map(NonNull::cast), Self::share_block(this))
    }

    /// # Safety
    /// See [`cast_unchecked`](Self::cast_unchecked).
    pub unsafe fn cast_unchecked_owned<U>(this: Self) -> Shared<U> {
        let (ptr, block) = Self::into_parts(this);
        Shared::from_parts(ptr.map(NonNull::cast), block)
    }

    /// A handle to something reachable from the pointee, such as a field or
    /// `self` as a trait object, that keeps the whole object alive.
    ///
    /// A null handle stays null and keeps its block.
    ///
    /// The result may be sent to other threads whenever `U` is
    /// `Send + Sync`, and the last handle to go destroys the whole object
    /// there. So the source pointee must be `Send + Sync` as well:
    ///
    /// ```compile_fail
    /// use shared_owner::Shared;
    /// use std::rc::Rc;
    ///
    /// struct Local {
    ///     id: u32,
    ///     _not_send: Rc<()>,
    /// }
    ///
    /// let owner = Shared::new(Local { id: 1, _not_send: Rc::new(()) });
    /// let id = Shared::project_owned(owner, |local| &local.id);
    /// ```
    ///
    /// The same projection of a thread-safe owner compiles:
    ///
    /// ```
    /// use shared_owner::Shared;
    /// use std::sync::Arc;
    ///
    /// struct Remote {
    ///     id: u32,
    ///     _shared: Arc<()>,
    /// }
    ///
    /// let owner = Shared::new(Remote { id: 1, _shared: Arc::new(()) });
    /// let id = Shared::project_owned(owner, |remote| &remote.id);
    /// std::thread::spawn(move || assert_eq!(*id, 1)).join().unwrap();
    /// ```
    pub fn project<U, F>(this: &Self, projection: F) -> Shared<U>
    where
        T: Send + Sync + 'static,
        U: ?Sized + 'static,
        F: FnOnce(&T) -> &U,
    {
        let ptr = Self::get(this).map(|value| NonNull::from(projection(value)));
        unsafe { Shared::from_parts(ptr, Self::share_block(this)) }
    }

    pub fn project_owned<U, F>(this: Self, projection: F) -> Shared<U>
    where
        T: Send + Sync + 'static,
        U: ?Sized + 'static,
        F: FnOnce(&T) -> &U,
    {
        let ptr = Self::get(&this).map(|value| NonNull::from(projection(value)));
        let (_, block) = Self::into_parts(this);
        unsafe { Shared::from_parts(ptr, block) }
    }

    /// The same object as `U` if its dynamic type is `U`, else an empty
    /// handle. The source is untouched either way.
    pub fn downcast<U: Any>(this: &Self) -> Shared<U>
    where
        T: AsAny,
    {
        match Self::get(this).and_then(|value| AsAny::as_any(value).downcast_ref::<U>()) {
            Some(target) => {
                let ptr = NonNull::from(target);
                unsafe { Shared::from_parts(Some(ptr), Self::share_block(this)) }
            }
            None => Shared::empty(),
        }
    }

    /// Consuming [`downcast`](Self::downcast). On a mismatch the source's
    /// strong unit is released and an empty handle comes back.
    pub fn downcast_owned<U: Any>(this: Self) -> Shared<U>
    where
        T: AsAny,
    {
        let ptr = Self::get(&this)
            .and_then(|value| AsAny::as_any(value).downcast_ref::<U>())
            .map(NonNull::from);
        match ptr {
            Some(ptr) => {
                let (_, block) = Self::into_parts(this);
                unsafe { Shared::from_parts(Some(ptr), block) }
            }
            None => Shared::empty(),
        }
    }
}

impl<T> Shared<T> {
    /// View the object through an `UnsafeCell`. Writing through it is up to
    /// the caller to synchronize with every other owner.
    pub fn as_cell(this: &Self) -> Shared<UnsafeCell<T>> {
        unsafe { Shared::from_parts(this.ptr.map(NonNull::cast), Self::share_block(this)) }
    }

    pub fn as_cell_owned(this: Self) -> Shared<UnsafeCell<T>> {
        let (ptr, block) = Self::into_parts(this);
        unsafe { Shared::from_parts(ptr.map(NonNull::cast), block) }
    }
}

impl<T> Shared<UnsafeCell<T>> {
    /// Drop the `UnsafeCell` view again.
    pub fn from_cell(this: &Self) -> Shared<T> {
        unsafe { Shared::from_parts(this.ptr.map(NonNull::cast), Self::share_block(this)) }
    }

    pub fn from_cell_owned(this: Self) -> Shared<T> {
        let (ptr, block) = Self::into_parts(this);
        unsafe { Shared::from_parts(ptr.map(NonNull::cast), block) }
    }
}

#[cfg(feature = "unsize")]
unsafe impl<T, U: ?Sized> unsize::CoerciblePtr<U> for Shared<T> {
    type Pointee = T;
    type Output = Shared<U>;

    fn as_sized_ptr(&mut self) -> *mut T {
        self.ptr.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn replace_ptr(self, ptr: *mut U) -> Shared<U> {
        let (_, block) = Self::into_parts(self);
        Shared::from_parts(NonNull::new(ptr), block)
    }
}

#[cfg(feature = "unsize")]
impl<T> Shared<T> {
    /// Convert with an unsizing coercion, e.g. from `T` to `dyn Trait` or
    /// from `[T; N]` to `[T]`.
    pub fn unsize<U: ?Sized, F>(this: Self, with: unsize::Coercion<T, U, F>) -> Shared<U>
    where
        F: FnOnce(*const T) -> *const U,
    {
        use unsize::CoerceUnsize;
        CoerceUnsize::unsize(this, with)
    }
}
