#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering, fence};
#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering, fence};

/// Hint issued inside retry loops.
///
/// Under loom this yields to the model scheduler, otherwise a bounded spin
/// would be explored forever.
///
/// 重试循环中使用的提示。
/// 在 loom 下会让出给模型调度器。
#[cfg(feature = "loom")]
#[inline]
pub(crate) fn spin_loop() {
    loom::thread::yield_now();
}

#[cfg(not(feature = "loom"))]
#[inline(always)]
pub(crate) fn spin_loop() {
    std::hint::spin_loop();
}
