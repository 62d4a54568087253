use crate::state::Reclaimer;
use crate::sync::{Ordering, fence};

impl Reclaimer {
    /// Begin a protected operation.
    ///
    /// Returns a `Guard` that keeps the operation open for its lifetime.
    /// While any guard is alive, no object retired from now on (or during the
    /// previous generation) is destroyed, so shared pointers loaded under the
    /// guard stay dereferenceable until it is dropped.
    ///
    /// Guards may be nested and may overlap freely across threads; each one
    /// counts as one in-flight operation.
    ///
    /// 开始一个受保护的操作。
    ///
    /// 返回一个 `Guard`，在其生命周期内保持操作处于进行中。
    /// 只要有任何守卫存活，从现在起退休的对象（以及上一代中的对象）都不会被销毁。
    #[inline]
    pub fn enter(&self) -> Guard<'_> {
        self.active.fetch_add(1, Ordering::Relaxed);
        // Orders the increment before every load this operation performs.
        // Pairs with the fence a rotating thread issues before re-checking
        // the counter.
        fence(Ordering::SeqCst);

        Guard { reclaimer: self }
    }
}

/// A guard that keeps one protected operation open.
///
/// `Guard` is obtained by calling `Reclaimer::enter()`. Dropping it ends the
/// operation; if it was the last one in flight, the dropping thread may
/// perform a rotation and destroy the oldest generation of retired objects.
///
/// 保持一个受保护操作处于进行中的守卫。
/// 通过 `Reclaimer::enter()` 获得。drop 时结束该操作；
/// 若它是最后一个进行中的操作，drop 它的线程可能执行一次轮换。
#[must_use]
pub struct Guard<'a> {
    reclaimer: &'a Reclaimer,
}

impl Drop for Guard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.reclaimer.exit();
    }
}

impl std::fmt::Debug for Guard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}
