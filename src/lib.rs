//! shared-owner: atomically reference-counted `Shared<T>` owners and
//! `Weak<T>` observers with custom deleters, custom allocators, aliasing
//! and ownership ordering.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one uniform handle type over arbitrary ownership strategies
//!   (boxed values, adopted raw pointers with a deleter, values stored in
//!   the control block, arrays) without the handle knowing which one.
//! - Layers:
//!   - AtomicCount: a single counter with `get`/`put`/`try_get`; `put`
//!     reports the transition to zero.
//!   - Header: the type-erased control block prefix. Strong and weak
//!     counts plus a static `BlockOps` table (destroy, deallocate, deleter
//!     lookup, object address).
//!   - Blocks (`adapter`): `#[repr(C)]` structs starting with a `Header`.
//!     `PtrBlock` adopts a pointer with a deleter, `InlineBlock` stores the
//!     value, `SliceBlock` stores a length and the elements.
//!   - Shared / Weak: a raw element pointer plus an optional `NonNull` to the
//!     header. Everything else (casts, arrays, self-reference) is built on
//!     these two.
//!
//! Constraints
//! - Thread-safe: counts are atomic; handles are `Send`/`Sync` when the
//!   pointee is `Send + Sync`. Deleters and allocators must be
//!   `Send + Sync + 'static` since the last release can happen anywhere.
//! - The block erases the type of the object it destroys, so a handle's
//!   auto traits only speak for its pointee. Safe conversions that change
//!   the pointee type (`project`) require a `Send + Sync` source; the
//!   unsafe ones (`alias`, `cast_unchecked`) put that on the caller.
//! - One allocation per control block. The allocator instance lives in the
//!   block and is moved out to free it.
//! - Destroy runs exactly once, on strong 1 -> 0. Deallocate runs exactly
//!   once, on weak 1 -> 0. The strong side holds one implicit weak unit
//!   until destroy has finished, so deallocate can never come first.
//!
//! Why this split?
//! - Localize unsafe: pointer arithmetic and layout live in `adapter`;
//!   counting lives in `control`; handles only move units around.
//! - Type erasure through a static ops table keeps the handle two words
//!   (three for unsized pointees) regardless of deleter or allocator.
//! - Aliasing falls out of keeping the pointer and the block separate.
//!
//! Atomic orderings
//! - Increments are relaxed: a new unit is only ever minted from an
//!   existing one.
//! - Decrements are release; the thread that reaches zero issues an acquire
//!   fence before destroying or deallocating.
//! - `Weak::upgrade` is a compare-and-increment that never resurrects a
//!   strong count that has reached zero.
//!
//! Overflow semantics
//! - A count above `isize::MAX` aborts the process, as `std::sync::Arc`
//!   does.
//!
//! Ownership order
//! - `PartialEq`/`Ord`/`Hash` on `Shared` compare the stored pointer.
//!   `owner_before`, `OwnerId` and `ByOwner` compare the control block, so
//!   aliases of one object are equivalent and a `Weak` keeps its position
//!   after the object is gone.
//!
//! Failure model
//! - Allocation failure is an `AllocError` from the `try_*` constructors
//!   and `handle_alloc_error` from the rest. An adopted pointer is
//!   released by its deleter before the error is reported.
//! - Dereferencing a null owner and `shared_from_this` without an owner
//!   panic.
//! - `downcast` reports a type mismatch as an empty owner.
//!
//! Notes and non-goals
//! - No cycle detection; break cycles with `Weak`.
//! - Logging goes through the `log` facade; the crate never installs a
//!   logger.
//! - With the `unsize` feature, `Shared<T>` coerces to `Shared<dyn Trait>`
//!   and `Shared<[T; N]>` to `Shared<[T]>` through the `unsize` crate.

mod adapter;
mod allocator;
mod array;
mod cast;
mod control;
mod control_proptest;
mod counts;
mod debug_once;
mod owner;
mod shared;
mod this;
mod weak;

// Public surface
pub use adapter::{get_deleter, Deleter, DropBox};
pub use allocator::{AllocError, Allocator, Global};
pub use array::ForOverwrite;
pub use cast::AsAny;
pub use owner::{owner_before, ByOwner, Owned, OwnerId};
pub use shared::Shared;
pub use this::{SharedFromThis, WeakThis};
pub use weak::Weak;
