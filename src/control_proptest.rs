#![cfg(test)]

// Property tests for the control block counting protocol, kept inside the
// crate so they can watch the header counts and the block lifecycle
// directly.

use crate::allocator::{AllocError, Allocator, Global};
use crate::control::Header;
use crate::shared::Shared;
use crate::weak::Weak;
use proptest::prelude::*;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Tally {
    allocs: AtomicUsize,
    frees: AtomicUsize,
    drops: AtomicUsize,
}

#[derive(Clone)]
struct Tracking(Arc<Tally>);

unsafe impl Allocator for Tracking {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.0.allocs.fetch_add(1, Ordering::SeqCst);
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.0.frees.fetch_add(1, Ordering::SeqCst);
        Global.deallocate(ptr, layout)
    }
}

struct Payload(Arc<Tally>);

impl Drop for Payload {
    fn drop(&mut self) {
        self.0.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
enum Op {
    CloneStrong(usize),
    DropStrong(usize),
    Downgrade(usize),
    CloneWeak(usize),
    DropWeak(usize),
    Upgrade(usize),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        any::<usize>().prop_map(Op::CloneStrong),
        any::<usize>().prop_map(Op::DropStrong),
        any::<usize>().prop_map(Op::Downgrade),
        any::<usize>().prop_map(Op::CloneWeak),
        any::<usize>().prop_map(Op::DropWeak),
        any::<usize>().prop_map(Op::Upgrade),
    ];
    proptest::collection::vec(op, 1..80)
}

fn pick<T>(v: &[T], i: usize) -> Option<usize> {
    if v.is_empty() {
        None
    } else {
        Some(i % v.len())
    }
}

// Property: the header counts always equal the number of live handles,
// the payload is dropped exactly when the last owner goes, and the block is
// freed exactly once, when the last handle of either kind goes.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_counts_follow_handles(ops in arb_ops()) {
        let tally = Arc::new(Tally::default());
        let first = Shared::new_in(Payload(tally.clone()), Tracking(tally.clone()));
        let block = first.block.unwrap();
        let mut strong = vec![first];
        let mut weak: Vec<Weak<Payload>> = Vec::new();

        for op in ops {
            match op {
                Op::CloneStrong(i) => {
                    if let Some(i) = pick(&strong, i) {
                        let s = strong[i].clone();
                        strong.push(s);
                    }
                }
                Op::DropStrong(i) => {
                    if let Some(i) = pick(&strong, i) {
                        strong.swap_remove(i);
                    }
                }
                Op::Downgrade(i) => {
                    if let Some(i) = pick(&strong, i) {
                        weak.push(Shared::downgrade(&strong[i]));
                    }
                }
                Op::CloneWeak(i) => {
                    if let Some(i) = pick(&weak, i) {
                        let w = weak[i].clone();
                        weak.push(w);
                    }
                }
                Op::DropWeak(i) => {
                    if let Some(i) = pick(&weak, i) {
                        weak.swap_remove(i);
                    }
                }
                Op::Upgrade(i) => {
                    if let Some(i) = pick(&weak, i) {
                        match weak[i].upgrade() {
                            Some(s) => {
                                prop_assert!(!strong.is_empty());
                                strong.push(s);
                            }
                            None => prop_assert!(strong.is_empty()),
                        }
                    }
                }
            }

            let alive = !strong.is_empty();
            prop_assert_eq!(tally.drops.load(Ordering::SeqCst), usize::from(!alive));
            if alive || !weak.is_empty() {
                prop_assert_eq!(tally.frees.load(Ordering::SeqCst), 0);
                let (s, w) = unsafe { (Header::strong_count(block), Header::weak_count(block)) };
                prop_assert_eq!(s, strong.len());
                prop_assert_eq!(w, weak.len());
            } else {
                prop_assert_eq!(tally.frees.load(Ordering::SeqCst), 1);
            }
            for w in &weak {
                prop_assert_eq!(w.expired(), !alive);
            }
            // Once the last owner is gone nothing can bring one back.
            if !alive {
                break;
            }
        }

        drop(strong);
        drop(weak);
        prop_assert_eq!(tally.allocs.load(Ordering::SeqCst), 1);
        prop_assert_eq!(tally.frees.load(Ordering::SeqCst), 1);
        prop_assert_eq!(tally.drops.load(Ordering::SeqCst), 1);
    }
}
