//! Lock-free shared-state primitives built on quiescence-based reclamation.
//!
//! This crate provides:
//! - [`Queue`]: an unbounded multi-producer multi-consumer FIFO queue.
//! - [`Rcu`]: a single-slot read-copy-update cell that hands every reader a
//!   private copy of the published value.
//! - [`Reclaimer`]: the deferred-reclamation scheme both of them embed.
//!
//! No operation takes a lock or blocks. Memory unlinked from a structure is
//! retired to that structure's reclaimer and destroyed only after every
//! operation that could still see it has finished.
//!
//! # Reclamation
//!
//! The reclaimer counts protected operations in flight and keeps two
//! generations of retired objects. When the count reaches zero, the thread
//! that observed it rotates the generations: the previous generation is
//! destroyed and the current one takes its place. Retired objects therefore
//! wait through at most two quiescent periods, with no per-thread registration
//! and no epoch counters.
//!
//! ```
//! use lockfree_epoch::Reclaimer;
//!
//! let reclaimer = Reclaimer::new();
//! reclaimer.retire(Box::new(42));
//! assert_eq!(reclaimer.pending(), 1);
//!
//! // Two quiescent periods later the value is gone.
//! reclaimer.collect();
//! reclaimer.collect();
//! assert_eq!(reclaimer.pending(), 0);
//! ```
//!
//! 基于静默期回收的无锁共享状态原语。
//!
//! 本 crate 提供：
//! - `Queue`：无界多生产者多消费者 FIFO 队列。
//! - `Rcu`：单槽读-复制-更新单元，每个读者获得已发布值的私有副本。
//! - `Reclaimer`：两者内嵌的延迟回收机制。

mod builder;
mod garbage;
mod guard;
mod queue;
mod rcu;
mod state;
mod sync;

pub use builder::RcuBuilder;
pub use guard::Guard;
pub use queue::Queue;
pub use rcu::Rcu;
pub use state::Reclaimer;

#[cfg(all(test, not(feature = "loom")))]
mod tests;
