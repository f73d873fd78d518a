// Array owners.
//
// - Runtime-length and fixed-length arrays live in one block with their
//   elements; indexing goes through the slice.
// - Elements are destroyed last first, once, when the last owner goes.
// - A panicking element constructor destroys what was built and frees the
//   block.
mod common;

use common::{init_logger, Counting};
use shared_owner::Shared;
use std::mem::MaybeUninit;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

struct Tagged {
    tag: usize,
    log: Arc<Mutex<Vec<usize>>>,
}

impl Drop for Tagged {
    fn drop(&mut self) {
        self.log.lock().unwrap().push(self.tag);
    }
}

// Test: a 48-element fixed array, shared between owners.
#[test]
fn fixed_array_indexing() {
    let a = Shared::<[i32; 48]>::new_array_with(|i| i as i32 * 2);
    let b = a.clone();
    assert_eq!(a.len(), 48);
    assert_eq!(b[47], 94);
    assert_eq!(Shared::use_count(&a), 2);

    let s = Shared::into_slice(b);
    assert_eq!(s.len(), 48);
    assert_eq!(s[10], 20);
    assert_eq!(unsafe { *Shared::element_ptr(&s, 3) }, 6);
    assert_eq!(Shared::use_count(&a), 2);
}

// Test: default and filled runtime-length arrays.
#[test]
fn default_and_filled() {
    let zeros = Shared::<[u64]>::new_slice_default(5);
    assert_eq!(&*zeros, &[0; 5]);

    let names = Shared::<[String]>::new_slice_filled(3, &String::from("n"));
    assert!(names.iter().all(|n| n == "n"));

    let grid = Shared::<[[u8; 4]; 2]>::new_array_filled(&[7; 4]);
    assert_eq!(grid[1], [7; 4]);

    let empty = Shared::<[String]>::new_slice_default(0);
    assert!(empty.is_empty());
    assert!(!Shared::is_null(&empty));
}

// Test: overwrite construction then bulk initialization.
#[test]
fn for_overwrite_then_assume_init() {
    let mut buf = Shared::<[MaybeUninit<u32>]>::new_slice_for_overwrite(4);
    let slots = Shared::get_mut(&mut buf).expect("unique");
    for (i, slot) in slots.iter_mut().enumerate() {
        slot.write(i as u32 + 1);
    }
    let buf = unsafe { Shared::<[MaybeUninit<u32>]>::assume_init(buf) };
    assert_eq!(&*buf, &[1, 2, 3, 4]);
}

// Test: destruction order across owners.
// Verifies: nothing is dropped until the last owner goes, then every
// element once, last index first.
#[test]
fn drops_last_first_with_last_owner() {
    init_logger();
    let log = Arc::new(Mutex::new(Vec::new()));
    let alloc = Counting::default();
    let a = Shared::<[Tagged]>::new_slice_with_in(4, alloc.clone(), |tag| Tagged {
        tag,
        log: log.clone(),
    });
    let w = Shared::downgrade(&a);
    let b = a.clone();
    drop(a);
    assert!(log.lock().unwrap().is_empty());
    drop(b);
    assert_eq!(*log.lock().unwrap(), vec![3, 2, 1, 0]);
    assert!(w.expired());
    assert_eq!(alloc.0.frees(), 0);
    drop(w);
    assert_eq!(alloc.0.frees(), 1);
}

// Test: element constructor panics halfway.
// Verifies: the built prefix is dropped in reverse and the block is freed.
#[test]
fn panic_during_construction_cleans_up() {
    init_logger();
    let log = Arc::new(Mutex::new(Vec::new()));
    let alloc = Counting::default();
    let res = catch_unwind(AssertUnwindSafe(|| {
        Shared::<[Tagged; 5]>::new_array_with_in(alloc.clone(), |tag| {
            if tag == 3 {
                panic!("element 3");
            }
            Tagged {
                tag,
                log: log.clone(),
            }
        })
    }));
    assert!(res.is_err());
    assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
    assert_eq!(alloc.0.allocs(), 1);
    assert_eq!(alloc.0.frees(), 1);
}
