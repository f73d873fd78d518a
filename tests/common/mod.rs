// Shared helpers for the integration tests: logger setup and allocators
// that count, fail, or hand out memory from a fixed pool.
#![allow(dead_code)]

use shared_owner::{AllocError, Allocator, Global};
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Default)]
pub struct Counts {
    pub allocs: AtomicUsize,
    pub frees: AtomicUsize,
}

impl Counts {
    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }
}

/// Forwards to `Global` and counts calls.
#[derive(Clone, Debug, Default)]
pub struct Counting(pub Arc<Counts>);

unsafe impl Allocator for Counting {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.0.allocs.fetch_add(1, Ordering::SeqCst);
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.0.frees.fetch_add(1, Ordering::SeqCst);
        Global.deallocate(ptr, layout)
    }
}

/// Refuses every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct Failing;

unsafe impl Allocator for Failing {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Err(AllocError::new(layout))
    }

    unsafe fn deallocate(&self, _: NonNull<u8>, _: Layout) {
        unreachable!("nothing was ever allocated")
    }
}

/// Monotonic bump allocator over one fixed buffer; `deallocate` is a no-op.
pub struct Pool {
    buf: NonNull<u8>,
    cap: usize,
    next: AtomicUsize,
}

unsafe impl Send for Pool {}
unsafe impl Sync for Pool {}

const POOL_ALIGN: usize = 64;

impl Pool {
    pub fn new(cap: usize) -> Arc<Self> {
        let layout = Layout::from_size_align(cap, POOL_ALIGN).unwrap();
        let buf = NonNull::new(unsafe { std::alloc::alloc(layout) }).unwrap();
        Arc::new(Self {
            buf,
            cap,
            next: AtomicUsize::new(0),
        })
    }

    pub fn used(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.cap, POOL_ALIGN).unwrap();
        unsafe { std::alloc::dealloc(self.buf.as_ptr(), layout) }
    }
}

unsafe impl Allocator for Pool {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        assert!(layout.align() <= POOL_ALIGN);
        let mut cur = self.next.load(Ordering::Relaxed);
        loop {
            let start = (cur + layout.align() - 1) & !(layout.align() - 1);
            let end = start + layout.size();
            if end > self.cap {
                return Err(AllocError::new(layout));
            }
            match self
                .next
                .compare_exchange(cur, end, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Ok(unsafe { NonNull::new_unchecked(self.buf.as_ptr().add(start)) }),
                Err(seen) => cur = seen,
            }
        }
    }

    unsafe fn deallocate(&self, _: NonNull<u8>, _: Layout) {}
}

/// Increments a shared counter when dropped.
#[derive(Debug)]
pub struct DropCounter(pub Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
