use crate::builder::RcuBuilder;
use crate::state::Reclaimer;
use crate::sync::{AtomicPtr, AtomicUsize, Ordering, fence};
use std::boxed::Box;
use std::marker::PhantomData;
use std::ptr;

/// A published version of the cell's value.
///
/// The count starts at 1 for the reference owned by the cell (and, once
/// superseded, by the retirement list). Each reader adds one while it copies.
struct Snapshot<T> {
    refs: AtomicUsize,
    value: T,
}

impl<T> Snapshot<T> {
    fn into_owned_ptr(value: T) -> *mut Self {
        Box::into_raw(Box::new(Snapshot {
            refs: AtomicUsize::new(1),
            value,
        }))
    }

    /// # Safety
    /// `ptr` must be live, and the caller must already hold a reference or be
    /// inside a protected operation that observed `ptr` as published.
    #[inline]
    unsafe fn acquire(ptr: *mut Self) {
        unsafe {
            (*ptr).refs.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop one reference, destroying the snapshot if it was the last.
    ///
    /// # Safety
    /// The caller must own one reference to `ptr` and give it up.
    #[inline]
    unsafe fn release(ptr: *mut Self) {
        if unsafe { (*ptr).refs.fetch_sub(1, Ordering::Release) } == 1 {
            // Synchronizes with every other release of this snapshot.
            fence(Ordering::Acquire);
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}

/// Destructor handed to the reclaimer for superseded snapshots: it gives up
/// the cell's reference instead of freeing unconditionally.
unsafe fn release_retired<T>(ptr: *mut ()) {
    unsafe { Snapshot::release(ptr as *mut Snapshot<T>) }
}

/// A snapshot reference held by a reader; released on drop, even on unwind.
struct Pinned<T> {
    ptr: *mut Snapshot<T>,
}

impl<T> Pinned<T> {
    #[inline]
    fn value(&self) -> &T {
        // SAFETY: the reference we hold keeps the snapshot alive.
        unsafe { &(*self.ptr).value }
    }
}

impl<T> Drop for Pinned<T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: `Pinned` owns exactly one reference.
        unsafe { Snapshot::release(self.ptr) }
    }
}

/// A single-slot read-copy-update cell.
///
/// Readers get their own copy of the currently published value (made by the
/// cell's *copier*), and writers publish whole new values. A superseded
/// snapshot is retired to the embedded [`Reclaimer`]; when its generation is
/// destroyed it merely drops the cell's reference, so a reader still copying
/// it keeps it alive until that reader is done.
///
/// A snapshot is thus freed only once both hold:
/// - no reader can still be about to take a reference (quiescence), and
/// - every reader that took one has released it (reference count).
///
/// **Typical Usage**:
/// ```
/// use lockfree_epoch::Rcu;
///
/// let config = Rcu::from_value(vec![1, 2, 3]);
///
/// // Readers get private copies.
/// let mut mine = config.read().unwrap();
/// mine.push(4);
///
/// // Writers publish whole values.
/// config.update(mine);
/// assert_eq!(config.read(), Some(vec![1, 2, 3, 4]));
/// ```
///
/// 单槽读-复制-更新单元。
///
/// 读者获得当前发布值的私有副本（由单元的复制函数生成），写者发布完整的新值。
/// 被替换的快照退休给内嵌的回收器；当其所在代被销毁时，
/// 它只是释放单元持有的引用，因此仍在复制它的读者会使其保持存活。
pub struct Rcu<T, C = fn(&T) -> T> {
    ptr: AtomicPtr<Snapshot<T>>,
    copier: C,
    reclaimer: Reclaimer,
    _marker: PhantomData<Box<Snapshot<T>>>,
}

// SAFETY: readers on many threads share `&T` while copying and snapshots are
// destroyed on whichever thread releases last.
unsafe impl<T: Send + Sync, C: Send> Send for Rcu<T, C> {}
unsafe impl<T: Send + Sync, C: Sync> Sync for Rcu<T, C> {}

impl<T: Clone> Rcu<T> {
    /// Create an empty cell whose readers receive clones.
    /// 创建一个空单元，读者获得克隆。
    pub fn new() -> Self {
        Self::with_copier(T::clone)
    }

    /// Create a cell with `value` already published; readers receive clones.
    /// 创建一个已发布 `value` 的单元，读者获得克隆。
    pub fn from_value(value: T) -> Self {
        Self::with_value(T::clone, value)
    }
}

impl<T: Clone> Default for Rcu<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> Rcu<T, C>
where
    C: Fn(&T) -> T,
{
    /// Create an empty cell that hands readers `copier(&published)`.
    pub fn with_copier(copier: C) -> Self {
        Self::from_raw_parts(copier, ptr::null_mut())
    }

    /// Create a cell with `value` already published, skipping a first `update`.
    ///
    /// 创建一个已发布 `value` 的单元，省去第一次 `update`。
    pub fn with_value(copier: C, value: T) -> Self {
        Self::from_raw_parts(copier, Snapshot::into_owned_ptr(value))
    }

    /// Create a builder for configuring the cell.
    ///
    /// # Example
    /// ```
    /// use lockfree_epoch::Rcu;
    ///
    /// let cell = Rcu::builder(|v: &Vec<u8>| v.clone())
    ///     .value(vec![7; 4])
    ///     .build();
    /// assert_eq!(cell.read(), Some(vec![7; 4]));
    /// ```
    #[inline]
    pub fn builder(copier: C) -> RcuBuilder<T, C> {
        RcuBuilder::new(copier)
    }

    fn from_raw_parts(copier: C, ptr: *mut Snapshot<T>) -> Self {
        Self {
            ptr: AtomicPtr::new(ptr),
            copier,
            reclaimer: Reclaimer::new(),
            _marker: PhantomData,
        }
    }

    /// Take a reference to the published snapshot, if any.
    ///
    /// The protected operation only spans the load and the increment; the
    /// returned reference keeps the snapshot alive afterwards.
    fn pin(&self) -> Option<Pinned<T>> {
        let _guard = self.reclaimer.enter();
        let ptr = self.ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        // SAFETY: `ptr` was published when loaded and the guard keeps it
        // from being destroyed before we own a reference.
        unsafe { Snapshot::acquire(ptr) };
        Some(Pinned { ptr })
    }

    /// Return a private copy of the published value, or `None` if nothing has
    /// been published yet.
    ///
    /// A read racing an `update` sees either the old or the new value, never
    /// a mix.
    ///
    /// 返回已发布值的私有副本；若尚未发布任何值则返回 `None`。
    pub fn read(&self) -> Option<T> {
        self.read_with(&self.copier)
    }

    /// Run `f` against the published value without copying it.
    ///
    /// The snapshot is held by reference count only, so `f` does not delay
    /// reclamation of other snapshots.
    ///
    /// 在不复制的情况下对已发布值运行 `f`。
    pub fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let pinned = self.pin()?;
        Some(f(pinned.value()))
    }

    /// Publish `value`, superseding whatever was published before.
    ///
    /// The displaced snapshot is retired, not freed: it lives on until no
    /// reader can reach it and every reader copying it has finished.
    ///
    /// 发布 `value`，替换之前发布的内容。
    /// 被替换的快照是退休而不是立即释放。
    pub fn update(&self, value: T) {
        let new = Snapshot::into_owned_ptr(value);
        let old = self.ptr.swap(new, Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: `old` is unreachable from the cell now, and its
            // destructor only gives up the reference the cell owned.
            unsafe {
                self.reclaimer
                    .retire_raw(old as *mut (), release_retired::<T>);
            }
        }
    }

    /// Atomically replace the published value with `f(current)`.
    ///
    /// `f` receives the published value (or `None`) and may run several
    /// times if other writers get in first; only the result computed from
    /// the value actually replaced is published. Unlike `read` followed by
    /// `update`, no concurrent update is ever lost.
    ///
    /// 以 `f(current)` 原子地替换已发布的值。
    /// 若其他写者先行提交，`f` 可能运行多次；不会丢失任何并发更新。
    pub fn update_with<F>(&self, mut f: F)
    where
        F: FnMut(Option<&T>) -> T,
    {
        let _guard = self.reclaimer.enter();
        let mut current = self.ptr.load(Ordering::Acquire);
        loop {
            // SAFETY: `current` was published when loaded and the guard keeps
            // it allocated, so its address cannot be reused while we compare.
            let value = f(unsafe { current.as_ref() }.map(|s| &s.value));
            let new = Snapshot::into_owned_ptr(value);

            match self
                .ptr
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => {
                    // SAFETY: `new` was never published.
                    unsafe { drop(Box::from_raw(new)) };
                    current = actual;
                }
            }
        }

        if !current.is_null() {
            // SAFETY: as in `update`.
            unsafe {
                self.reclaimer
                    .retire_raw(current as *mut (), release_retired::<T>);
            }
        }
    }

    /// Whether a value has been published.
    #[inline]
    pub fn has_value(&self) -> bool {
        !self.ptr.load(Ordering::Relaxed).is_null()
    }

    /// Offer the embedded reclaimer a rotation opportunity.
    ///
    /// Write-only workloads never end a protected operation on their own;
    /// calling this lets superseded snapshots drain.
    #[inline]
    pub fn collect(&self) {
        self.reclaimer.collect();
    }

    /// Superseded snapshots that have not been released by the reclaimer yet.
    #[inline]
    pub fn pending_reclamation(&self) -> usize {
        self.reclaimer.pending()
    }
}

impl<T, C> std::fmt::Debug for Rcu<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rcu")
            .field("ptr", &self.ptr.load(Ordering::Relaxed))
            .field("reclaimer", &self.reclaimer)
            .finish_non_exhaustive()
    }
}

impl<T, C> Drop for Rcu<T, C> {
    /// Give up the cell's reference to the published snapshot. Superseded
    /// snapshots are released when the reclaimer drops right after.
    ///
    /// At drop time no other thread can access the cell, so the published
    /// snapshot is not pinned by anyone.
    ///
    /// 释放单元对已发布快照的引用。被替换的快照随后由回收器释放。
    fn drop(&mut self) {
        let ptr = self.ptr.load(Ordering::Relaxed);
        if !ptr.is_null() {
            unsafe { Snapshot::release(ptr) };
        }
    }
}
