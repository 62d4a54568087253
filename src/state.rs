use crate::garbage::RetiredStack;
use crate::sync::{AtomicBool, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use tracing::debug;

/// Two-generation quiescence reclaimer.
///
/// Every protected operation brackets itself with [`enter`](Reclaimer::enter)
/// and the drop of the returned [`Guard`](crate::Guard). Objects unlinked from
/// a shared structure are handed to [`retire`](Reclaimer::retire) and parked
/// in the *current* generation. Whenever the count of in-flight operations
/// drops to zero, one thread rotates: the current generation becomes the
/// *previous* one and the former previous generation is destroyed.
///
/// An object therefore survives at least one full quiescent period after its
/// retirement, which is enough for every operation that could have seen it to
/// have finished. No per-thread registration is required.
///
/// The reclaimer knows nothing about the layout of what it frees; it only
/// stores type-erased destructors.
///
/// 两代静默回收器。
///
/// 每个受保护的操作都以 `enter` 开始，以 `Guard` 的 drop 结束。
/// 从共享结构中摘除的对象交给 `retire`，放入"当前"代。
/// 每当进行中的操作数降为零时，由一个线程执行轮换：
/// 当前代成为"上一代"，原来的上一代被销毁。
pub struct Reclaimer {
    /// Number of protected operations in flight.
    /// 进行中的受保护操作数量。
    pub(crate) active: CachePadded<AtomicUsize>,
    /// Set while one thread is performing a rotation.
    /// 某个线程正在执行轮换时被置位。
    pub(crate) rotating: AtomicBool,
    /// Retired objects not yet destroyed, across both generations.
    pub(crate) pending: AtomicUsize,
    /// Objects retired since the last rotation.
    /// 自上次轮换以来退休的对象。
    pub(crate) current: RetiredStack,
    /// Objects retired before the last rotation; destroyed by the next one.
    /// 上次轮换之前退休的对象；由下一次轮换销毁。
    pub(crate) previous: RetiredStack,
}

impl Reclaimer {
    /// Create an idle reclaimer with both generations empty.
    /// 创建一个两代均为空的空闲回收器。
    pub fn new() -> Self {
        Self {
            active: CachePadded::new(AtomicUsize::new(0)),
            rotating: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            current: RetiredStack::new(),
            previous: RetiredStack::new(),
        }
    }

    /// Number of protected operations currently in flight.
    ///
    /// Only a snapshot; it may be stale by the time it is returned.
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Number of retired objects that have not been destroyed yet.
    ///
    /// Only a snapshot; it may be stale by the time it is returned.
    ///
    /// 尚未销毁的已退休对象数量（仅为快照）。
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("active", &self.active())
            .field("pending", &self.pending())
            .field("rotating", &self.rotating.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for Reclaimer {
    /// Destroy both generations.
    ///
    /// `&mut self` guarantees no operation is in flight, so every retired
    /// object is unreachable.
    ///
    /// 销毁两代。`&mut self` 保证没有进行中的操作。
    fn drop(&mut self) {
        let freed = self.previous.take().destroy() + self.current.take().destroy();
        if freed > 0 {
            debug!(freed, "reclaimer dropped with retired objects outstanding");
        }
    }
}
