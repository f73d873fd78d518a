//! Ownership order.
//!
//! Handles compare by pointer address through `PartialEq`/`Ord`. Ownership
//! order instead compares the control block, so two aliases of one object are
//! equivalent even when they point at different fields, and a `Weak` keeps
//! its place after the object is gone.

use crate::control::{owner_key, Header};
use crate::shared::Shared;
use crate::weak::Weak;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::NonNull;

/// Identity of a control block. All empty handles share one id, ordered
/// before every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(usize);

impl OwnerId {
    pub(crate) fn of(block: Option<NonNull<Header>>) -> Self {
        Self(owner_key(block))
    }

    /// True for the id of an empty handle.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Anything that refers to a control block.
pub trait Owned {
    fn owner_id(&self) -> OwnerId;
}

impl<T: ?Sized> Owned for Shared<T> {
    fn owner_id(&self) -> OwnerId {
        Shared::owner_id(self)
    }
}

impl<T: ?Sized> Owned for Weak<T> {
    fn owner_id(&self) -> OwnerId {
        Weak::owner_id(self)
    }
}

impl<P: Owned + ?Sized> Owned for &P {
    fn owner_id(&self) -> OwnerId {
        (**self).owner_id()
    }
}

/// `a` precedes `b` in ownership order. Neither preceding the other means
/// they share a block (or are both empty).
pub fn owner_before<A, B>(a: &A, b: &B) -> bool
where
    A: Owned + ?Sized,
    B: Owned + ?Sized,
{
    a.owner_id() < b.owner_id()
}

/// Keys a `Shared` or `Weak` by its control block in ordered and hashed
/// containers.
///
/// ```
/// use shared_owner::{ByOwner, Shared};
/// use std::collections::BTreeSet;
///
/// let pair = Shared::new((1, 2));
/// let second = unsafe { Shared::alias(&pair, &pair.1 as *const i32) };
///
/// let mut set = BTreeSet::new();
/// set.insert(ByOwner(pair.clone()));
/// assert!(!set.insert(ByOwner(second)));
/// assert_eq!(ByOwner(Shared::downgrade(&pair)), ByOwner(pair));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ByOwner<P>(pub P);

impl<P> ByOwner<P> {
    pub fn into_inner(self) -> P {
        self.0
    }
}

impl<P> Deref for ByOwner<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.0
    }
}

impl<P: Owned, Q: Owned> PartialEq<ByOwner<Q>> for ByOwner<P> {
    fn eq(&self, other: &ByOwner<Q>) -> bool {
        self.0.owner_id() == other.0.owner_id()
    }
}

impl<P: Owned> Eq for ByOwner<P> {}

impl<P: Owned, Q: Owned> PartialOrd<ByOwner<Q>> for ByOwner<P> {
    fn partial_cmp(&self, other: &ByOwner<Q>) -> Option<Ordering> {
        Some(self.0.owner_id().cmp(&other.0.owner_id()))
    }
}

impl<P: Owned> Ord for ByOwner<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.owner_id().cmp(&other.0.owner_id())
    }
}

impl<P: Owned> Hash for ByOwner<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.owner_id().hash(state)
    }
}
