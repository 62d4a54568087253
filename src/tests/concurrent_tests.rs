/// 并发测试模块
/// 测试多生产者多消费者队列、RCU 并发读写和回收器并发退休
use super::{Tracked, live, live_counter};
use crate::{Queue, Rcu, Reclaimer};
use antidote::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// 测试1: 单生产者单消费者跨线程保持顺序
#[test]
fn test_spsc_preserves_order() {
    const N: u64 = 50_000;
    let queue = Arc::new(Queue::new());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..N {
                queue.enqueue(i);
            }
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut expected = 0;
            while expected < N {
                if let Some(value) = queue.dequeue() {
                    assert_eq!(value, expected);
                    expected += 1;
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();
    assert_eq!(queue.dequeue(), None);
}

/// 测试2: 多生产者多消费者无丢失无重复
#[test]
fn test_mpmc_no_loss_no_duplication() {
    const PRODUCERS: u64 = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: u64 = 10_000;
    const TOTAL: usize = (PRODUCERS * PER_PRODUCER) as usize;

    let queue = Arc::new(Queue::new());
    let received = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::with_capacity(TOTAL)));

    let mut handles = vec![];

    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.enqueue(p * PER_PRODUCER + i);
            }
        }));
    }

    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&queue);
        let received = Arc::clone(&received);
        let seen = Arc::clone(&seen);
        handles.push(thread::spawn(move || {
            let mut local = vec![];
            while received.load(Ordering::Relaxed) < TOTAL {
                if let Some(value) = queue.dequeue() {
                    received.fetch_add(1, Ordering::Relaxed);
                    local.push(value);
                }
            }
            seen.lock().extend(local);
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen = std::mem::take(&mut *seen.lock());
    assert_eq!(seen.len(), TOTAL);
    seen.sort_unstable();
    let expected: Vec<u64> = (0..PRODUCERS * PER_PRODUCER).collect();
    assert_eq!(seen, expected);
    assert!(queue.is_empty());
}

/// 测试3: 多生产者单消费者时每个生产者内部保持顺序
#[test]
fn test_mpsc_per_producer_order() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 10_000;

    let queue = Arc::new(Queue::new());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.enqueue((p, i));
                }
            })
        })
        .collect();

    let mut next = [0usize; PRODUCERS];
    let mut received = 0;
    while received < PRODUCERS * PER_PRODUCER {
        if let Some((p, i)) = queue.dequeue() {
            assert_eq!(i, next[p], "producer {p} delivered out of order");
            next[p] += 1;
            received += 1;
        }
    }

    for producer in producers {
        producer.join().unwrap();
    }
    assert!(next.iter().all(|&n| n == PER_PRODUCER));
}

/// 测试4: 并发出队空队列不会出错
#[test]
fn test_concurrent_dequeue_on_empty_queue() {
    let queue: Arc<Queue<u32>> = Arc::new(Queue::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    assert_eq!(queue.dequeue(), None);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    queue.enqueue(7);
    assert_eq!(queue.dequeue(), Some(7));
}

/// 测试5: 并发压力下的负载全部被恰好释放一次
#[test]
fn test_mpmc_tracked_payloads_freed_exactly_once() {
    const PER_PRODUCER: u64 = 5_000;
    let counter = live_counter();
    let queue = Arc::new(Queue::new());
    let done = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..3)
        .map(|p| {
            let queue = Arc::clone(&queue);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.enqueue(Tracked::new(p * PER_PRODUCER + i, &counter));
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut values = HashSet::new();
                loop {
                    // 先读标志再出队：标志为真时所有入队都已完成
                    let finished = done.load(Ordering::Acquire);
                    match queue.dequeue() {
                        Some(tracked) => assert!(values.insert(tracked.value)),
                        None if finished => break,
                        None => thread::yield_now(),
                    }
                }
                values
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    done.store(true, Ordering::Release);

    let mut all = HashSet::new();
    for consumer in consumers {
        for value in consumer.join().unwrap() {
            assert!(all.insert(value), "value {value} dequeued twice");
        }
    }

    assert_eq!(all.len(), 3 * PER_PRODUCER as usize);
    drop(queue);
    assert_eq!(live(&counter), 0);
}

/// 测试6: 26 个线程各自原子递增自己的槽位
#[test]
fn test_rcu_concurrent_slot_increments() {
    const THREADS: usize = 26;
    const ITERATIONS: usize = 10_000;

    let cell = Arc::new(Rcu::from_value([0usize; THREADS]));

    let handles: Vec<_> = (0..THREADS)
        .map(|slot| {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    cell.update_with(|current| {
                        let mut next = current.copied().unwrap_or([0; THREADS]);
                        next[slot] += 1;
                        next
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let counts = cell.read().unwrap();
    assert!(counts.iter().all(|&c| c == ITERATIONS));
    assert_eq!(counts.iter().sum::<usize>(), THREADS * ITERATIONS);
}

/// 测试7: 读者只会看到完整发布的版本，且版本单调不减
#[test]
fn test_rcu_readers_see_consistent_snapshots() {
    const VERSIONS: u64 = 2_000;
    let cell = Arc::new(Rcu::from_value(vec![0u64; 64]));

    let writer = {
        let cell = Arc::clone(&cell);
        thread::spawn(move || {
            for version in 1..=VERSIONS {
                cell.update(vec![version; 64]);
            }
        })
    };

    let readers: Vec<_> = (0..6)
        .map(|_| {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                let mut last = 0;
                while last < VERSIONS {
                    let snapshot = cell.read().unwrap();
                    let version = snapshot[0];
                    assert!(snapshot.iter().all(|&v| v == version), "torn snapshot");
                    assert!(version >= last, "went back from {last} to {version}");
                    last = version;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

/// 测试8: 混合读写后不泄漏也不重复释放
#[test]
fn test_rcu_mixed_traffic_no_leak() {
    let counter = live_counter();
    {
        let cell = Arc::new(Rcu::from_value(Tracked::new(0, &counter)));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cell = Arc::clone(&cell);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for i in 0..2_000 {
                        if (t + i) % 3 == 0 {
                            cell.update(Tracked::new(i as u64, &counter));
                        } else {
                            let copy = cell.read().unwrap();
                            assert!(copy.value < 2_000);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // 发布的值仍然存活
        assert!(live(&counter) >= 1);
    }
    assert_eq!(live(&counter), 0);
}

/// 测试9: 多线程通过同一个回收器退休对象
#[test]
fn test_reclaimer_concurrent_retire() {
    let counter = live_counter();
    let reclaimer = Arc::new(Reclaimer::new());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let reclaimer = Arc::clone(&reclaimer);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for i in 0..1_000 {
                    let _guard = reclaimer.enter();
                    reclaimer.retire(Box::new(Tracked::new(t * 1_000 + i, &counter)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // 所有线程已退出，两次静默期足以清空
    reclaimer.collect();
    reclaimer.collect();
    assert_eq!(reclaimer.pending(), 0);
    assert_eq!(live(&counter), 0);
}

/// 测试10: 同时结束的重叠操作仍会推进一代
#[test]
fn test_overlapping_collects_advance_generation() {
    for _ in 0..500 {
        let reclaimer = Arc::new(Reclaimer::new());
        reclaimer.retire(Box::new(0u64));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let reclaimer = Arc::clone(&reclaimer);
                thread::spawn(move || reclaimer.collect())
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // 退休之后至少发生过一次轮换，再一次即可释放
        reclaimer.collect();
        assert_eq!(reclaimer.pending(), 0);
    }
}
