mod concurrent_tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 跟踪存活实例数量的值，用于检测泄漏和重复释放
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) value: u64,
    live: Arc<AtomicUsize>,
}

impl Tracked {
    pub(crate) fn new(value: u64, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Tracked {
            value,
            live: Arc::clone(live),
        }
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        Tracked::new(self.value, &self.live)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        let previous = self.live.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "Tracked value dropped twice");
    }
}

pub(crate) fn live_counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub(crate) fn live(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
