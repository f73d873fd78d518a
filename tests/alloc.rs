// Allocator-aware construction.
//
// - One control-block allocation and one deallocation per block, through
//   the allocator the block was built with.
// - Allocation failure: adopted pointers are released by their deleter,
//   factory values are dropped, and try_reset_in leaves the handle alone.
// - A monotonic pool allocator that never reclaims works as a backing store.
mod common;

use common::{init_logger, Counting, DropCounter, Failing, Pool};
use shared_owner::{AllocError, ForOverwrite, Shared};
use std::mem::MaybeUninit;
use std::ptr::addr_of_mut;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Test: adoption with a caller allocator.
// Verifies: the allocator sees exactly one allocate/deallocate pair and the
// deleter frees the adopted object.
#[test]
fn adopt_with_allocator_counts_one_pair() {
    init_logger();
    let alloc = Counting::default();
    let drops = Arc::new(AtomicUsize::new(0));
    let raw = Box::into_raw(Box::new(DropCounter(drops.clone())));
    let sp = unsafe {
        Shared::from_raw_in(raw, |p: *mut DropCounter| drop(Box::from_raw(p)), alloc.clone())
    };
    let sp2 = sp.clone();
    assert_eq!(alloc.0.allocs(), 1);
    drop(sp);
    drop(sp2);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(alloc.0.frees(), 1);
}

// Test: adoption fails to allocate.
// Verifies: the error carries the layout and the deleter has already run.
#[test]
fn failed_adoption_runs_deleter() {
    init_logger();
    let deleted = Arc::new(AtomicUsize::new(0));
    let seen = deleted.clone();
    let raw = Box::into_raw(Box::new(5u64));
    let res = unsafe {
        Shared::try_from_raw_in(
            raw,
            move |p: *mut u64| {
                drop(Box::from_raw(p));
                seen.fetch_add(1, Ordering::SeqCst);
            },
            Failing,
        )
    };
    let err: AllocError = res.err().expect("allocation must fail");
    assert!(err.layout().size() > 0);
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
}

// Test: factory construction fails to allocate.
#[test]
fn failed_factory_drops_value() {
    let drops = Arc::new(AtomicUsize::new(0));
    let res = Shared::try_new_in(DropCounter(drops.clone()), Failing);
    assert!(res.is_err());
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    assert!(Shared::<[u8]>::try_new_slice_default_in(16, Failing).is_err());
}

// Test: a failed reset keeps the current object.
#[test]
fn failed_reset_keeps_current_object() {
    let mut sp = Shared::new(String::from("kept"));
    let raw = Box::into_raw(Box::new(String::from("new")));
    let res = unsafe {
        Shared::try_reset_in(&mut sp, raw, |p: *mut String| drop(Box::from_raw(p)), Failing)
    };
    assert!(res.is_err());
    assert_eq!(*sp, "kept");
    assert_eq!(Shared::use_count(&sp), 1);
}

// Test: value, array and overwrite factories through a counting allocator.
// Verifies: each block is one allocation, freed once, with the expected
// contents.
#[test]
fn allocating_factories() {
    let alloc = Counting::default();
    {
        let sp0a = Shared::new_in(0, alloc.clone());
        let sp0a2 = Shared::new_in(42, alloc.clone());
        assert_eq!((*sp0a, *sp0a2), (0, 42));

        let sp0b = Shared::<[i32]>::new_slice_default_in(2, alloc.clone());
        assert_eq!(&*sp0b, &[0, 0]);

        let sp0c = Shared::<[i32; 2]>::new_array_default_in(alloc.clone());
        assert_eq!(*sp0c, [0, 0]);

        let p4 = Shared::<[i32]>::new_slice_filled_in(4, &42, alloc.clone());
        assert_eq!(&*p4, &[42; 4]);

        let p5 = Shared::<[i32; 4]>::new_array_filled_in(&42, alloc.clone());
        assert_eq!(*p5, [42; 4]);

        let mut sp1 = Shared::<MaybeUninit<i32>>::new_for_overwrite_in(alloc.clone());
        Shared::get_mut(&mut sp1).unwrap().write(2);
        let sp1 = unsafe { Shared::<MaybeUninit<i32>>::assume_init(sp1) };
        assert_eq!(*sp1, 2);

        assert_eq!(alloc.0.allocs(), 7);
        assert_eq!(alloc.0.frees(), 0);
    }
    assert_eq!(alloc.0.frees(), 7);
}

struct NonTriv {
    init: i32,
    #[allow(dead_code)]
    uninit: MaybeUninit<i32>,
}

unsafe impl ForOverwrite for NonTriv {
    unsafe fn init_for_overwrite(slot: *mut Self) {
        addr_of_mut!((*slot).init).write(0xbb);
    }
}

// Test: overwrite construction of a type with one defaulted field.
// Verifies: the defaulted field is set for single objects, fixed arrays and
// runtime-length arrays.
#[test]
fn for_overwrite_sets_defaulted_fields() {
    let alloc = Counting::default();
    let a = Shared::<NonTriv>::new_for_overwrite_in(alloc.clone());
    assert_eq!(a.init, 0xbb);

    let b = Shared::<[NonTriv; 2]>::new_array_for_overwrite_in(alloc.clone());
    assert_eq!(b[1].init, 0xbb);

    let c = Shared::<[NonTriv]>::new_slice_for_overwrite_in(2, alloc.clone());
    assert_eq!(c[1].init, 0xbb);

    let d = Shared::<[NonTriv; 3]>::new_for_overwrite();
    assert_eq!(d[2].init, 0xbb);
}

// Test: monotonic pool allocator.
// Verifies: blocks come out of the pool, handles behave normally, and
// releasing them does not try to give memory back.
#[test]
fn pool_allocator_backs_blocks() {
    let pool = Pool::new(4096);
    {
        let a = Shared::new_in(String::from("pooled"), pool.clone());
        let b = Shared::<[u64]>::new_slice_with_in(8, pool.clone(), |i| i as u64 * 3);
        let w = Shared::downgrade(&a);
        assert!(pool.used() > 0);
        assert_eq!(*a, "pooled");
        assert_eq!(b[7], 21);
        drop(a);
        assert!(w.expired());
    }
    assert!(pool.used() > 0);
}

// Test: a pool that runs dry reports an allocation error.
#[test]
fn exhausted_pool_fails() {
    let pool = Pool::new(64);
    let res = Shared::<[u64]>::try_new_slice_default_in(64, pool.clone());
    let err = res.err().expect("pool is too small");
    assert!(err.layout().size() > 64);
    assert_eq!(pool.used(), 0);
}
