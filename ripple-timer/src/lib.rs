#![deny(
    // The following are allowed by default lints according to
    // https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
    anonymous_parameters,
    bare_trait_objects,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    single_use_lifetimes,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications,
    unused_results,
    clippy::all,
    clippy::pedantic,
)]
#![allow(
    // Some explicitly allowed Clippy lints, must have clear reason to allow
    clippy::implicit_return, // actually omitting the return keyword is idiomatic Rust code
    clippy::module_name_repetitions, // repeation of module name in a struct name is not big deal
    clippy::multiple_crate_versions, // multi-version dependency crates is not able to fix
    clippy::missing_errors_doc,
)]

//! Timer primitives shared by the ripple scheduler.
//!
//! Both primitives must be created inside a tokio runtime context, and both are
//! stopped through a [`StopHandle`] that can live apart from the waiting side.

use std::cell::Cell;
use std::io::{Error, ErrorKind};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, Interval, MissedTickBehavior};

#[derive(Debug, Default)]
struct Stop {
    stopped: Cell<bool>,
    notify: Notify,
}

/// The stopping side of a [`Ticker`] or [`OneShot`].
#[derive(Debug, Clone)]
pub struct StopHandle(Rc<Stop>);

impl StopHandle {
    /// Stop the timer. Waiters are woken immediately; stopping twice is a no-op.
    pub fn stop(&self) {
        if !self.0.stopped.replace(true) {
            self.0.notify.notify_waiters();
        }
    }

    /// Returns `true` once `stop` was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.stopped.get()
    }
}

/// A periodic tick source.
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
    stop: Rc<Stop>,
}

impl Ticker {
    /// Create a ticker whose first tick lands one full `period` from now.
    ///
    /// # Errors
    /// if `period` is zero.
    pub fn new(period: Duration) -> std::io::Result<(Self, StopHandle)> {
        if period.is_zero() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "ticker period must be greater than zero",
            ));
        }
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stop = Rc::new(Stop::default());
        Ok((
            Ticker {
                interval,
                stop: Rc::clone(&stop),
            },
            StopHandle(stop),
        ))
    }

    /// Wait for the next tick, `None` once the ticker has been stopped.
    pub async fn recv(&mut self) -> Option<Instant> {
        if self.is_stopped() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.stop.notify.notified() => None,
            instant = self.interval.tick() => {
                // a tick racing the stop is swallowed
                if self.stop.stopped.get() {
                    None
                } else {
                    Some(instant)
                }
            }
        }
    }

    /// Returns `true` once the ticker has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.stopped.get()
    }

    /// The tick period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

/// A timer that elapses once.
#[derive(Debug)]
pub struct OneShot {
    delay: Duration,
    stop: Rc<Stop>,
}

impl OneShot {
    /// Create a one-shot timer, the delay starts counting on the first `wait`.
    #[must_use]
    pub fn new(delay: Duration) -> (Self, StopHandle) {
        let stop = Rc::new(Stop::default());
        (
            OneShot {
                delay,
                stop: Rc::clone(&stop),
            },
            StopHandle(stop),
        )
    }

    /// Returns `true` if the delay elapsed, `false` if the timer was stopped first.
    pub async fn wait(self) -> bool {
        if self.stop.stopped.get() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.stop.notify.notified() => false,
            () = tokio::time::sleep(self.delay) => !self.stop.stopped.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticker_waits_a_full_period_first() {
        let start = Instant::now();
        let (mut ticker, _stop) = Ticker::new(Duration::from_millis(10)).unwrap();
        let first = ticker.recv().await.unwrap();
        assert!(first.duration_since(start) >= Duration::from_millis(10));
        let second = ticker.recv().await.unwrap();
        assert!(second > first);
        assert_eq!(Duration::from_millis(10), ticker.period());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_wakes_a_waiting_ticker() {
        let (mut ticker, stop) = Ticker::new(Duration::from_millis(10)).unwrap();
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            stop.stop();
        };
        let counter = async {
            let mut ticks = 0;
            while ticker.recv().await.is_some() {
                ticks += 1;
            }
            ticks
        };
        let (ticks, ()) = tokio::join!(counter, stopper);
        assert_eq!(2, ticks);
        assert!(stop.is_stopped());
        assert!(ticker.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_rejected() {
        let error = Ticker::new(Duration::ZERO).unwrap_err();
        assert_eq!(ErrorKind::InvalidInput, error.kind());
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot() {
        let (once, stop) = OneShot::new(Duration::from_millis(5));
        assert!(once.wait().await);
        assert!(!stop.is_stopped());

        let (once, stop) = OneShot::new(Duration::from_secs(60));
        stop.stop();
        stop.stop();
        assert!(!once.wait().await);
    }
}
