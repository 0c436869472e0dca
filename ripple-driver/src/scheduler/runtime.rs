use super::{Ready, Scheduler, Task};
use crate::common::Named;
use ripple_timer::{OneShot, StopHandle, Ticker};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::ffi::c_int;
use std::future::Future;
use std::io::{Error, ErrorKind};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::runtime::{Builder, Runtime};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, LocalSet};

#[derive(Debug)]
struct Core {
    runtime: Runtime,
    local: LocalSet,
}

impl Core {
    fn new() -> std::io::Result<Self> {
        Ok(Core {
            runtime: Builder::new_current_thread().enable_all().build()?,
            local: LocalSet::new(),
        })
    }
}

#[derive(Debug)]
enum Subscription {
    Watch(JoinHandle<()>),
    Timer(StopHandle),
}

#[derive(Debug, Default)]
struct Shared {
    subscriptions: RefCell<HashMap<String, Subscription>>,
    inflight: Cell<usize>,
    idle: Notify,
}

impl Shared {
    fn subscribe(&self, token: String, subscription: Subscription) {
        _ = self.subscriptions.borrow_mut().insert(token, subscription);
    }

    fn unsubscribe(&self, token: &str) -> Option<Subscription> {
        let subscription = self.subscriptions.borrow_mut().remove(token)?;
        self.idle.notify_one();
        Some(subscription)
    }

    fn is_quiescent(&self) -> bool {
        self.inflight.get() == 0 && self.subscriptions.borrow().is_empty()
    }
}

struct Inflight(Rc<Shared>);

impl Inflight {
    fn enter(shared: &Rc<Shared>) -> Self {
        shared.inflight.set(shared.inflight.get() + 1);
        Inflight(Rc::clone(shared))
    }
}

impl Drop for Inflight {
    fn drop(&mut self) {
        self.0.inflight.set(self.0.inflight.get().saturating_sub(1));
        self.0.idle.notify_one();
    }
}

fn token(kind: &str) -> String {
    format!("{kind}-{}", uuid::Uuid::new_v4())
}

fn busy() -> Error {
    Error::new(
        ErrorKind::WouldBlock,
        "the scheduler is being driven or replaced",
    )
}

/// Every watch registers its own duplicate of the host descriptor, so a
/// watch being torn down late can never deregister a newer one.
fn duplicate(fd: RawFd) -> std::io::Result<OwnedFd> {
    // SAFETY: F_DUPFD_CLOEXEC only reads `fd` and fails cleanly on a bad one.
    let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(Error::last_os_error());
    }
    // SAFETY: `dup` was just opened and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}

/// Level-triggered readiness on top of tokio's edge-triggered registration.
async fn poll_ready(
    registered: AsyncFd<OwnedFd>,
    readable: bool,
    on_ready: Ready,
) -> std::io::Result<()> {
    let events = if readable {
        libc::POLLIN
    } else {
        libc::POLLOUT
    };
    loop {
        let mut guard = if readable {
            registered.readable().await?
        } else {
            registered.writable().await?
        };
        on_ready();
        // the dispatched handler runs before readiness is looked at again
        tokio::task::yield_now().await;
        if !still_ready(registered.as_raw_fd(), events) {
            guard.clear_ready();
        }
    }
}

fn still_ready(fd: RawFd, events: libc::c_short) -> bool {
    let mut pollfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    // SAFETY: a single valid pollfd and a zero timeout.
    let ready = unsafe { libc::poll(&mut pollfd, 1, 0) };
    ready > 0
        && pollfd.revents & libc::POLLNVAL == 0
        && pollfd.revents & (events | libc::POLLHUP | libc::POLLERR) != 0
}

/// A [`Scheduler`] backed by a current-thread tokio runtime and a `LocalSet`.
///
/// Tokens are strings shaped like `read-<uuid>`.
#[derive(Debug)]
pub struct TokioScheduler {
    name: String,
    core: RefCell<Core>,
    shared: Rc<Shared>,
}

impl TokioScheduler {
    /// Create a scheduler with its own runtime.
    ///
    /// # Errors
    /// if the runtime can not be built.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        Ok(TokioScheduler {
            name: name.into(),
            core: RefCell::new(Core::new()?),
            shared: Rc::new(Shared::default()),
        })
    }

    fn core(&self) -> std::io::Result<Ref<'_, Core>> {
        self.core.try_borrow().map_err(|_| busy())
    }

    /// Drive the scheduler until `future` completes.
    ///
    /// # Errors
    /// if the scheduler is being replaced.
    pub fn run_until<F: Future>(&self, future: F) -> std::io::Result<F::Output> {
        let core = self.core()?;
        Ok(core.runtime.block_on(core.local.run_until(future)))
    }

    /// Drive the scheduler for `dur`, quiescent or not.
    ///
    /// # Errors
    /// see `run_until`.
    pub fn run_for(&self, dur: Duration) -> std::io::Result<()> {
        self.run_until(async move { tokio::time::sleep(dur).await })
    }

    /// The number of live subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.shared.subscriptions.borrow().len()
    }

    fn watch(
        &self,
        kind: &str,
        fd: RawFd,
        readable: bool,
        on_ready: Ready,
    ) -> std::io::Result<String> {
        let core = self.core()?;
        let _enter = core.runtime.enter();
        let interest = if readable {
            Interest::READABLE
        } else {
            Interest::WRITABLE
        };
        let registered = AsyncFd::try_with_interest(duplicate(fd)?, interest)?;
        let token = token(kind);
        let name = token.clone();
        let shared = Rc::clone(&self.shared);
        let task = core.local.spawn_local(async move {
            if let Err(e) = poll_ready(registered, readable, on_ready).await {
                crate::error!("{name} stopped watching fd {fd}: {e}");
            }
            _ = shared.unsubscribe(&name);
        });
        self.shared.subscribe(token.clone(), Subscription::Watch(task));
        Ok(token)
    }
}

impl Named for TokioScheduler {
    fn get_name(&self) -> &str {
        &self.name
    }
}

impl Scheduler for TokioScheduler {
    type Token = String;

    fn spawn(&self, task: Task) {
        let inflight = Inflight::enter(&self.shared);
        match self.core() {
            Ok(core) => {
                _ = core.local.spawn_local(async move {
                    let _inflight = inflight;
                    task.await;
                });
            }
            Err(e) => {
                crate::error!("{} can not spawn: {e}", self.name);
            }
        }
    }

    fn sleep(&self, dur: Duration) -> Task {
        Box::pin(async move { tokio::time::sleep(dur).await })
    }

    fn after(&self, delay: Duration, f: Box<dyn FnOnce()>) -> std::io::Result<String> {
        let core = self.core()?;
        let _enter = core.runtime.enter();
        let (once, stop) = OneShot::new(delay);
        let token = token("after");
        let name = token.clone();
        let shared = Rc::clone(&self.shared);
        _ = core.local.spawn_local(async move {
            if once.wait().await {
                f();
            }
            _ = shared.unsubscribe(&name);
        });
        self.shared
            .subscribe(token.clone(), Subscription::Timer(stop));
        Ok(token)
    }

    fn ticker(&self, interval: Duration) -> std::io::Result<(String, Ticker)> {
        let core = self.core()?;
        let _enter = core.runtime.enter();
        let (ticker, stop) = Ticker::new(interval)?;
        let token = token("ticker");
        self.shared
            .subscribe(token.clone(), Subscription::Timer(stop));
        Ok((token, ticker))
    }

    fn watch_readable(&self, fd: RawFd, on_ready: Ready) -> std::io::Result<String> {
        self.watch("read", fd, true, on_ready)
    }

    fn watch_writable(&self, fd: RawFd, on_ready: Ready) -> std::io::Result<String> {
        self.watch("write", fd, false, on_ready)
    }

    fn watch_signal(&self, signum: c_int, on_signal: Ready) -> std::io::Result<String> {
        let core = self.core()?;
        let _enter = core.runtime.enter();
        let mut stream = signal(SignalKind::from_raw(signum))?;
        let token = token("signal");
        let name = token.clone();
        let shared = Rc::clone(&self.shared);
        let task = core.local.spawn_local(async move {
            while stream.recv().await.is_some() {
                on_signal();
            }
            _ = shared.unsubscribe(&name);
        });
        self.shared
            .subscribe(token.clone(), Subscription::Watch(task));
        Ok(token)
    }

    fn cancel(&self, token: &String) {
        match self.shared.unsubscribe(token) {
            Some(Subscription::Watch(task)) => task.abort(),
            Some(Subscription::Timer(stop)) => stop.stop(),
            None => {}
        }
    }

    fn is_quiescent(&self) -> bool {
        self.shared.is_quiescent()
    }

    fn drive(&self) -> std::io::Result<()> {
        let shared = Rc::clone(&self.shared);
        self.run_until(async move {
            while !shared.is_quiescent() {
                shared.idle.notified().await;
            }
        })
    }

    fn forked(&self) -> std::io::Result<()> {
        let mut core = self.core.try_borrow_mut().map_err(|_| busy())?;
        let stale = std::mem::replace(&mut *core, Core::new()?);
        // the parent still owns the stale epoll instance and signal pipe, so
        // nothing registered there may be deregistered from here
        std::mem::forget(stale);
        let abandoned = self.shared.subscriptions.take();
        self.shared.inflight.set(0);
        crate::warn!(
            "{} abandoned {} subscriptions after fork",
            self.name,
            abandoned.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn counter() -> (Rc<Cell<usize>>, Ready) {
        let count = Rc::new(Cell::new(0));
        let inner = Rc::clone(&count);
        (count, Rc::new(move || inner.set(inner.get() + 1)))
    }

    #[test]
    fn drive_until_quiescent() -> std::io::Result<()> {
        let scheduler = Rc::new(TokioScheduler::new("test_drive")?);
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        let sleep = scheduler.sleep(Duration::from_millis(10));
        scheduler.spawn(Box::pin(async move {
            sleep.await;
            flag.set(true);
        }));
        assert!(!scheduler.is_quiescent());
        scheduler.drive()?;
        assert!(done.get());
        assert!(scheduler.is_quiescent());
        Ok(())
    }

    #[test]
    fn after_and_cancel() -> std::io::Result<()> {
        let scheduler = TokioScheduler::new("test_after")?;
        let (fired, on_fire) = counter();
        let (cancelled, on_cancelled) = counter();
        _ = scheduler.after(Duration::from_millis(5), Box::new(move || on_fire()))?;
        let token = scheduler.after(Duration::from_millis(5), Box::new(move || on_cancelled()))?;
        assert!(token.starts_with("after-"));
        scheduler.cancel(&token);
        scheduler.cancel(&token);
        scheduler.drive()?;
        assert_eq!(1, fired.get());
        assert_eq!(0, cancelled.get());
        assert_eq!(0, scheduler.subscriptions());
        Ok(())
    }

    #[test]
    fn watches_on_one_descriptor() -> std::io::Result<()> {
        let scheduler = TokioScheduler::new("test_watch")?;
        let (reader, mut writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        let fd = reader.as_raw_fd();
        let (first, on_first) = counter();
        let (second, on_second) = counter();
        let (writable, on_writable) = counter();
        let tokens = [
            scheduler.watch_readable(fd, on_first)?,
            scheduler.watch_readable(fd, on_second)?,
            scheduler.watch_writable(fd, on_writable)?,
        ];
        writer.write_all(b"ping")?;
        scheduler.run_for(Duration::from_millis(30))?;
        assert!(first.get() >= 1);
        assert!(second.get() >= 1);
        assert!(writable.get() >= 1);
        for token in &tokens {
            scheduler.cancel(token);
        }
        assert!(scheduler.is_quiescent());
        scheduler.drive()
    }

    #[test]
    fn ticker_stops_on_cancel() -> std::io::Result<()> {
        let scheduler = TokioScheduler::new("test_ticker")?;
        let (token, mut ticker) = scheduler.ticker(Duration::from_millis(5))?;
        let (ticks, on_tick) = counter();
        scheduler.spawn(Box::pin(async move {
            while ticker.recv().await.is_some() {
                on_tick();
            }
        }));
        scheduler.run_for(Duration::from_millis(30))?;
        assert!(ticks.get() >= 2);
        scheduler.cancel(&token);
        scheduler.drive()?;
        let stopped_at = ticks.get();
        scheduler.run_for(Duration::from_millis(15))?;
        assert_eq!(stopped_at, ticks.get());
        Ok(())
    }

    #[test]
    fn forked_starts_fresh() -> std::io::Result<()> {
        let scheduler = TokioScheduler::new("test_forked")?;
        let (stale, on_stale) = counter();
        _ = scheduler.after(Duration::from_millis(1), Box::new(move || on_stale()))?;
        _ = scheduler.ticker(Duration::from_millis(1))?;
        assert_eq!(2, scheduler.subscriptions());
        scheduler.forked()?;
        assert!(scheduler.is_quiescent());
        let (fresh, on_fresh) = counter();
        _ = scheduler.after(Duration::from_millis(1), Box::new(move || on_fresh()))?;
        scheduler.drive()?;
        assert_eq!(0, stale.get());
        assert_eq!(1, fresh.get());
        Ok(())
    }
}
