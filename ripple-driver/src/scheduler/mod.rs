use crate::common::Named;
use futures::future::LocalBoxFuture;
use ripple_timer::Ticker;
use std::ffi::c_int;
use std::fmt::Debug;
use std::hash::Hash;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

pub use runtime::TokioScheduler;

mod runtime;

/// A unit of cooperative execution.
pub type Task = LocalBoxFuture<'static, ()>;

/// Invoked every time a watched descriptor or signal fires.
pub type Ready = Rc<dyn Fn()>;

/// A single-threaded cooperative scheduler the driver translates into.
///
/// Every subscription (`after`, `ticker`, `watch_*`) issues a token; a token can
/// be cancelled exactly once, cancelling it again or cancelling a token that
/// already finished on its own is a no-op.
pub trait Scheduler: Debug + Named {
    /// Opaque identity of a live subscription.
    type Token: Clone + Eq + Hash + Debug + 'static;

    /// Spawn a task.
    fn spawn(&self, task: Task);

    /// Suspend the calling task for `dur`.
    fn sleep(&self, dur: Duration) -> Task;

    /// Call `f` once after `delay`.
    ///
    /// # Errors
    /// if the timer can not be armed.
    fn after(&self, delay: Duration, f: Box<dyn FnOnce()>) -> std::io::Result<Self::Token>;

    /// Create a periodic tick source, cancelling the token stops it.
    ///
    /// # Errors
    /// if the ticker can not be created.
    fn ticker(&self, interval: Duration) -> std::io::Result<(Self::Token, Ticker)>;

    /// Call `on_ready` every time `fd` is readable.
    ///
    /// # Errors
    /// if the descriptor can not be watched.
    fn watch_readable(&self, fd: RawFd, on_ready: Ready) -> std::io::Result<Self::Token>;

    /// Call `on_ready` every time `fd` is writable.
    ///
    /// # Errors
    /// if the descriptor can not be watched.
    fn watch_writable(&self, fd: RawFd, on_ready: Ready) -> std::io::Result<Self::Token>;

    /// Call `on_signal` every time `signal` arrives.
    ///
    /// # Errors
    /// if the signal can not be intercepted.
    fn watch_signal(&self, signal: c_int, on_signal: Ready) -> std::io::Result<Self::Token>;

    /// Cancel a subscription.
    fn cancel(&self, token: &Self::Token);

    /// Returns `true` if no task is runnable and no subscription is live.
    fn is_quiescent(&self) -> bool;

    /// Drive the scheduler until it is quiescent.
    ///
    /// # Errors
    /// if the scheduler can not be driven.
    fn drive(&self) -> std::io::Result<()>;

    /// Give the current process image its own scheduler state after a fork.
    ///
    /// Subscriptions issued before the fork are abandoned, not torn down.
    ///
    /// # Errors
    /// if the fresh state can not be created.
    fn forked(&self) -> std::io::Result<()>;
}
