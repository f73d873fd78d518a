//! Objects that can hand out owners of themselves.
//!
//! A type opts in by embedding a [`WeakThis<Self>`] and implementing
//! [`SharedFromThis`]. The `*_with_this` factories build the owner first and
//! then link the embedded observer to it, so from then on
//! `shared_from_this` can mint owners from nothing but `&self`.
//!
//! ```
//! use shared_owner::{Shared, SharedFromThis, WeakThis};
//!
//! struct Node {
//!     name: String,
//!     this: WeakThis<Node>,
//! }
//!
//! impl SharedFromThis for Node {
//!     fn weak_this(&self) -> &WeakThis<Self> {
//!         &self.this
//!     }
//! }
//!
//! let node = Shared::new_with_this(Node { name: "root".into(), this: WeakThis::new() });
//! let again = node.shared_from_this();
//! assert_eq!(again.name, "root");
//! assert_eq!(Shared::use_count(&node), 2);
//! ```

use crate::allocator::{infallible, AllocError, Allocator, Global};
use crate::control::Header;
use crate::shared::Shared;
use crate::weak::Weak;
use std::fmt;
use std::sync::OnceLock;

/// The observer a [`SharedFromThis`] type embeds. Set once, by the first
/// owner linked to the object.
pub struct WeakThis<T: ?Sized> {
    weak: OnceLock<Weak<T>>,
}

impl<T: ?Sized> WeakThis<T> {
    pub const fn new() -> Self {
        Self {
            weak: OnceLock::new(),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.weak.get().is_some()
    }

    fn link(&self, weak: Weak<T>) -> bool {
        self.weak.set(weak).is_ok()
    }
}

impl<T: ?Sized> Default for WeakThis<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A copied object is a different object: the clone starts unlinked.
impl<T: ?Sized> Clone for WeakThis<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for WeakThis<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakThis")
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Access to the embedded [`WeakThis`].
///
/// # Linking
///
/// Only [`Shared::new_with_this`], [`Shared::new_with_this_in`],
/// [`Shared::try_new_with_this_in`], [`Shared::from_box_with_this`] and an
/// explicit [`Shared::link_this`] link the object to its owner. The plain
/// constructors (`Shared::new`, `from_box`, `from_raw*`, the array
/// factories) cannot tell that a type implements this trait, so they leave
/// it unlinked and `shared_from_this` panics:
///
/// ```
/// use shared_owner::{Shared, SharedFromThis, WeakThis};
///
/// #[derive(Default)]
/// struct Job {
///     this: WeakThis<Job>,
/// }
///
/// impl SharedFromThis for Job {
///     fn weak_this(&self) -> &WeakThis<Self> {
///         &self.this
///     }
/// }
///
/// let plain = Shared::new(Job::default());
/// assert!(plain.try_shared_from_this().is_none());
///
/// // Linking after the fact works while the object has no other link.
/// assert!(Shared::link_this(&plain));
/// assert_eq!(Shared::use_count(&plain.shared_from_this()), 2);
/// ```
pub trait SharedFromThis {
    fn weak_this(&self) -> &WeakThis<Self>;

    /// A new owner of `self`.
    ///
    /// # Panics
    /// If `self` was not built by a `*_with_this` factory (or linked with
    /// [`Shared::link_this`]), or its last owner is already gone.
    #[track_caller]
    fn shared_from_this(&self) -> Shared<Self> {
        match self.try_shared_from_this() {
            Some(owner) => owner,
            None => {
                log::error!(
                    "shared_from_this on a {} without a live owner",
                    std::any::type_name::<Self>()
                );
                panic!("shared_from_this called on an object that has no owner")
            }
        }
    }

    fn try_shared_from_this(&self) -> Option<Shared<Self>> {
        self.weak_this().weak.get()?.upgrade()
    }

    /// The embedded observer, or an empty one if never linked.
    fn weak_from_this(&self) -> Weak<Self> {
        self.weak_this().weak.get().cloned().unwrap_or_default()
    }
}

impl<T: SharedFromThis> Shared<T> {
    pub fn new_with_this(value: T) -> Self {
        Self::new_with_this_in(value, Global)
    }

    pub fn new_with_this_in<A>(value: T, alloc: A) -> Self
    where
        A: Allocator + Send + Sync + 'static,
    {
        infallible(Self::try_new_with_this_in(value, alloc))
    }

    pub fn try_new_with_this_in<A>(value: T, alloc: A) -> Result<Self, AllocError>
    where
        A: Allocator + Send + Sync + 'static,
    {
        let this = Self::try_new_in(value, alloc)?;
        Self::link_this(&this);
        Ok(this)
    }
}

impl<T: ?Sized + SharedFromThis> Shared<T> {
    pub fn from_box_with_this(value: Box<T>) -> Self {
        let this = Self::from_box(value);
        Self::link_this(&this);
        this
    }

    /// Point the object's embedded observer at this handle's block.
    ///
    /// Returns false, changing nothing, when the object is already linked
    /// or when this handle does not point at the managed object itself.
    pub fn link_this(this: &Self) -> bool {
        let (Some(ptr), Some(block)) = (this.ptr, this.block) else {
            return false;
        };
        if ptr.as_ptr().cast::<()>().cast_const() != unsafe { Header::object(block) } {
            return false;
        }
        let value = unsafe { ptr.as_ref() };
        let weak_this = value.weak_this();
        if weak_this.is_linked() {
            return false;
        }
        weak_this.link(Self::downgrade(this))
    }
}
