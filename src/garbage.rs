use crate::state::Reclaimer;
use crate::sync::{AtomicPtr, Ordering, fence};
use std::boxed::Box;
use std::{mem, ptr};
use tracing::trace;

/// An object that has been retired (removed from shared view) but not yet deleted.
/// It stores the raw pointer and a destructor function to safely drop the concrete type.
///
/// 一个已被退休（从共享视图中移除）但尚未删除的对象。
/// 它存储原始指针和析构函数，以安全地 drop 具体类型。
struct RetiredObject {
    /// The raw pointer to the data.
    /// 数据的原始指针。
    ptr: *mut (),
    /// Function pointer to the type-specific destructor.
    /// 类型特定析构函数的函数指针。
    dtor: unsafe fn(*mut ()),
}

/// Generic destructor for retired objects.
/// Converts the raw pointer back to Box<T> and drops it.
///
/// 已退休对象的通用析构函数。
/// 将原始指针转换回 Box<T> 并将其 drop。
#[inline(always)]
pub(crate) unsafe fn drop_value<T>(ptr: *mut ()) {
    let ptr = ptr as *mut T;
    unsafe {
        drop(Box::from_raw(ptr));
    }
}

impl RetiredObject {
    #[inline(always)]
    fn new<T>(value: Box<T>) -> Self {
        RetiredObject {
            ptr: Box::into_raw(value) as *mut (),
            dtor: drop_value::<T>,
        }
    }

    /// # Safety
    /// `dtor(ptr)` must be sound to call exactly once, from any thread,
    /// at any point until the owning reclaimer is dropped.
    #[inline(always)]
    unsafe fn from_raw(ptr: *mut (), dtor: unsafe fn(*mut ())) -> Self {
        RetiredObject { ptr, dtor }
    }
}

impl Drop for RetiredObject {
    /// Executes the type-erased destructor.
    /// 执行类型擦除的析构函数。
    #[inline(always)]
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                (self.dtor)(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
    }
}

struct RetiredNode {
    object: RetiredObject,
    next: *mut RetiredNode,
}

/// LIFO stack of retired objects.
///
/// Any thread may push concurrently; the whole chain is only ever removed at
/// once, by a single atomic swap, which hands exclusive ownership to the
/// caller as a [`RetiredList`].
///
/// 已退休对象的后进先出栈。
/// 任何线程都可以并发 push；整条链只会通过一次原子交换整体取走。
pub(crate) struct RetiredStack {
    head: AtomicPtr<RetiredNode>,
}

impl RetiredStack {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Lock-free insertion at the head.
    fn push(&self, object: RetiredObject) {
        let node = Box::into_raw(Box::new(RetiredNode {
            object,
            next: ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `node` is not shared until the CAS below succeeds.
            unsafe {
                (*node).next = head;
            }
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Detach the whole chain, leaving the stack empty.
    /// 取走整条链，使栈为空。
    pub(crate) fn take(&self) -> RetiredList {
        RetiredList {
            head: self.head.swap(ptr::null_mut(), Ordering::Acquire),
        }
    }

    /// Install `list` as the stack's contents and return what was there.
    fn replace(&self, list: RetiredList) -> RetiredList {
        RetiredList {
            head: self.head.swap(list.into_raw(), Ordering::AcqRel),
        }
    }
}

/// An exclusively owned chain of retired objects.
///
/// Dropping it destroys every object in the chain.
pub(crate) struct RetiredList {
    head: *mut RetiredNode,
}

impl RetiredList {
    fn into_raw(self) -> *mut RetiredNode {
        let head = self.head;
        mem::forget(self);
        head
    }

    /// Destroy every object in the chain and return how many there were.
    /// 销毁链中的所有对象并返回其数量。
    pub(crate) fn destroy(mut self) -> usize {
        let mut node = mem::replace(&mut self.head, ptr::null_mut());
        let mut freed = 0;
        while !node.is_null() {
            // SAFETY: the chain is exclusively owned; each node was created
            // by `Box::into_raw` in `RetiredStack::push` and is visited once.
            let RetiredNode { object, next } = *unsafe { Box::from_raw(node) };
            node = next;
            drop(object);
            freed += 1;
        }
        freed
    }
}

impl Drop for RetiredList {
    fn drop(&mut self) {
        if !self.head.is_null() {
            let list = RetiredList {
                head: mem::replace(&mut self.head, ptr::null_mut()),
            };
            list.destroy();
        }
    }
}

impl Reclaimer {
    /// Retire (defer deletion) of a value.
    ///
    /// The value is parked in the current generation and destroyed by the
    /// second rotation that follows, i.e. once every protected operation that
    /// was in flight when it was retired has finished.
    ///
    /// The caller must already have made the value unreachable for operations
    /// that start from now on.
    ///
    /// 退休（延迟删除）一个值。
    ///
    /// 该值被放入当前代，并在随后的第二次轮换中销毁，
    /// 即在退休时所有进行中的受保护操作都已结束之后。
    #[inline]
    pub fn retire<T: Send + 'static>(&self, value: Box<T>) {
        self.push_retired(RetiredObject::new(value));
    }

    /// Retire a raw object together with the function that destroys it.
    ///
    /// # Safety
    /// `ptr` must be unreachable for operations that start after this call,
    /// and `dtor(ptr)` must be sound to run exactly once, on any thread, at
    /// any point before this reclaimer is dropped.
    #[inline]
    pub(crate) unsafe fn retire_raw(&self, ptr: *mut (), dtor: unsafe fn(*mut ())) {
        self.push_retired(unsafe { RetiredObject::from_raw(ptr, dtor) });
    }

    #[inline]
    fn push_retired(&self, object: RetiredObject) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.current.push(object);
    }

    /// Offer a rotation opportunity without touching any shared structure.
    ///
    /// Rotations only happen when a protected operation ends. Workloads that
    /// retire without ever running a protected operation can call this to
    /// let retired objects drain. Each call that finds no other operation in
    /// flight advances the generations by at least one step.
    ///
    /// 在不接触任何共享结构的情况下提供一次轮换机会。
    #[inline]
    pub fn collect(&self) {
        drop(self.enter());
    }

    /// End a protected operation, rotating if it was the last one in flight.
    #[inline]
    pub(crate) fn exit(&self) {
        let previous = self.active.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "BUG: protected operation exited twice");

        if previous == 1 {
            self.try_rotate();
        }
    }

    /// Rotate the generations unless another thread holds the rotation flag
    /// or an operation is still in flight.
    fn try_rotate(&self) {
        // Releases our decrement to a thread that hands the flag back after
        // an abandoned rotation.
        while !self.rotating.swap(true, Ordering::AcqRel) {
            // Pairs with the fence in `enter`, and acquires the previous
            // rotator's release of the flag along with every release decrement.
            fence(Ordering::SeqCst);

            // Our own decrement may be stale by now. Only a zero observed while
            // holding the flag proves that nothing entered before the current
            // generation was taken.
            if self.active.load(Ordering::Acquire) == 0 {
                self.rotate();
                return;
            }

            // The operation that made us back off may already have exited and
            // found the flag taken. The handover reads its swap, so a zero here
            // means nobody else will rotate for it.
            self.rotating.swap(false, Ordering::AcqRel);
            if self.active.load(Ordering::Acquire) != 0 {
                trace!("rotation abandoned, operations in flight");
                return;
            }
        }
    }

    /// Rotate the generations. Runs with the rotation flag held and no
    /// operation in flight.
    fn rotate(&self) {
        let retired = self.current.take();
        let expired = self.previous.replace(retired);
        let freed = expired.destroy();
        if freed > 0 {
            self.pending.fetch_sub(freed, Ordering::Relaxed);
        }

        self.rotating.store(false, Ordering::Release);

        if freed > 0 {
            trace!(freed, "rotated retirement generations");
        }
    }
}
