use crate::garbage::drop_value;
use crate::state::Reclaimer;
use crate::sync::{AtomicPtr, Ordering, spin_loop};
use crossbeam_utils::CachePadded;
use std::boxed::Box;
use std::marker::PhantomData;
use std::ptr;
use tracing::debug;

struct Node<T> {
    /// Owned payload; null for the sentinel and once claimed by a dequeuer.
    value: AtomicPtr<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Node {
            value: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn new(value: T) -> *mut Self {
        Box::into_raw(Box::new(Node {
            value: AtomicPtr::new(Box::into_raw(Box::new(value))),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

impl<T> Drop for Node<T> {
    /// Drops the payload if nobody claimed it. Never touches `next`.
    fn drop(&mut self) {
        let value = self.value.load(Ordering::Relaxed);
        if !value.is_null() {
            unsafe {
                drop(Box::from_raw(value));
            }
        }
    }
}

/// An unbounded lock-free multi-producer multi-consumer FIFO queue.
///
/// The queue is a singly linked list that always starts with a sentinel node.
/// Producers link new nodes after the tail; consumers *claim* the payload of
/// the node after the head by atomically exchanging it with null, so exactly
/// one consumer wins each value. The winner then advances the head and hands
/// the old head to the embedded [`Reclaimer`], which destroys it once no
/// concurrent operation can still be reading its next-link.
///
/// **Typical Usage**:
/// ```
/// use lockfree_epoch::Queue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(Queue::new());
///
/// let producer = {
///     let queue = Arc::clone(&queue);
///     thread::spawn(move || {
///         for i in 0..100 {
///             queue.enqueue(i);
///         }
///     })
/// };
/// producer.join().unwrap();
///
/// let drained: Vec<i32> = std::iter::from_fn(|| queue.dequeue()).collect();
/// assert_eq!(drained, (0..100).collect::<Vec<_>>());
/// ```
///
/// 无界无锁多生产者多消费者 FIFO 队列。
///
/// 队列是一个始终以哨兵节点开头的单链表。
/// 生产者在尾部之后链接新节点；消费者通过将头部之后节点的负载原子地交换为 null
/// 来"认领"它，因此每个值恰好只有一个消费者胜出。
/// 胜者随后推进头部，并将旧头部交给内嵌的回收器。
pub struct Queue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    reclaimer: Reclaimer,
    _marker: PhantomData<Box<Node<T>>>,
}

// SAFETY: values only move between threads by ownership transfer; the queue
// never hands out references to them.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Create an empty queue holding only its sentinel.
    /// 创建一个只含哨兵节点的空队列。
    pub fn new() -> Self {
        let sentinel = Node::sentinel();
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            reclaimer: Reclaimer::new(),
            _marker: PhantomData,
        }
    }

    /// Append `value` at the back of the queue.
    ///
    /// Producers race to link their node after the node they observe as the
    /// tail. A producer that loses simply re-reads the tail; it does not help
    /// swing a lagging tail forward, because the winner always publishes it
    /// right after linking.
    ///
    /// 将 `value` 追加到队列尾部。
    pub fn enqueue(&self, value: T) {
        let node = Node::new(value);

        // The observed tail may already have been dequeued past and retired;
        // the guard keeps it allocated while we read its next-link.
        let _guard = self.reclaimer.enter();
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: `tail` was reachable when loaded and we are inside a
            // protected operation, so it has not been destroyed.
            let next = unsafe { &(*tail).next };
            if next
                .compare_exchange(ptr::null_mut(), node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                self.tail.store(node, Ordering::Release);
                return;
            }
            spin_loop();
        }
    }

    /// Remove the value at the front of the queue.
    ///
    /// Returns `None` when the queue is empty; that is not an error and leaves
    /// the queue fully usable.
    ///
    /// 移除队首的值。队列为空时返回 `None`。
    pub fn dequeue(&self) -> Option<T> {
        let _guard = self.reclaimer.enter();
        loop {
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: protected operation; see `enqueue`.
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if next.is_null() {
                return None;
            }

            // SAFETY: `next` is linked after a live node, so it is live too.
            let value = unsafe { (*next).value.swap(ptr::null_mut(), Ordering::AcqRel) };
            if value.is_null() {
                // Another consumer claimed `next` and has yet to advance the head.
                spin_loop();
                continue;
            }

            // We are the unique claimer of `next`, hence the only thread
            // allowed to move the head past `head`.
            self.head.store(next, Ordering::Release);
            // SAFETY: `head` is no longer reachable from the queue. Consumers
            // that loaded it earlier are inside protected operations, so the
            // reclaimer outlasts their reads.
            unsafe {
                self.reclaimer
                    .retire_raw(head as *mut (), drop_value::<Node<T>>);
            }

            // SAFETY: the claim transferred ownership of the boxed payload.
            return Some(*unsafe { Box::from_raw(value) });
        }
    }

    /// Whether the queue looked empty at the moment of the check.
    ///
    /// Concurrent producers and consumers may change the answer immediately.
    pub fn is_empty(&self) -> bool {
        let _guard = self.reclaimer.enter();
        let head = self.head.load(Ordering::Acquire);
        // SAFETY: protected operation.
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    /// Offer the embedded reclaimer a rotation opportunity.
    /// 为内嵌的回收器提供一次轮换机会。
    #[inline]
    pub fn collect(&self) {
        self.reclaimer.collect();
    }

    /// Dequeued nodes that have not been destroyed yet.
    #[inline]
    pub fn pending_reclamation(&self) -> usize {
        self.reclaimer.pending()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Extend<T> for Queue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.enqueue(value);
        }
    }
}

impl<T> FromIterator<T> for Queue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Queue::new();
        queue.extend(iter);
        queue
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("reclaimer", &self.reclaimer)
            .finish()
    }
}

impl<T> Drop for Queue<T> {
    /// Walk the spine from the head and free every node with any payload it
    /// still owns. Retired nodes are freed afterwards by the reclaimer.
    ///
    /// At drop time no other thread can access the queue.
    ///
    /// 从头部遍历链表并释放所有节点及其仍拥有的负载。
    /// 已退休的节点随后由回收器释放。
    fn drop(&mut self) {
        let mut node = self.head.load(Ordering::Relaxed);
        let mut remaining = 0usize;
        while !node.is_null() {
            // SAFETY: exclusive access; every spine node came from
            // `Box::into_raw` and is visited once.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next.load(Ordering::Relaxed);
            if !boxed.value.load(Ordering::Relaxed).is_null() {
                remaining += 1;
            }
            drop(boxed);
        }
        if remaining > 0 {
            debug!(remaining, "queue dropped with values still enqueued");
        }
    }
}
