use crate::callback::{Callback, Handler, Methods, Resolver};
use crate::common::{Blocker, Named};
use crate::config::Config;
use crate::constants::DriverState;
use crate::dispatch::Dispatcher;
use crate::event::{Args, Event, Fired, Handle, Key, Target};
use crate::process::{Generation, ProcessIdentity};
use crate::registry::{Registration, Table};
use crate::scheduler::{Ready, Scheduler, Task, TokioScheduler};
use crate::{signal, timer};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::ffi::c_int;
use std::fmt::{Debug, Formatter};
use std::io::{Error, ErrorKind};
use std::rc::Rc;
use std::time::Duration;

pub use current::current;

mod current;


/// The callback-registration interface a host drives its I/O through.
pub trait EventLoop: Named + Debug {
    /// Register interest, `args` is handed back to every firing.
    ///
    /// # Errors
    /// if the callback can not be resolved, the interest is not supported,
    /// or the scheduler refuses it.
    fn add(&self, event: Event, callback: Callback, args: Vec<Rc<dyn Any>>)
        -> std::io::Result<Handle>;

    /// Remove interest. Removing what is not registered is a no-op.
    fn del(&self, key: Key);

    /// Stop and forget every timer.
    fn clear_all_timers(&self);

    /// The number of timers occupying a handle.
    fn timer_count(&self) -> usize;

    /// Cancel everything and restore overridden signal dispositions.
    fn destroy(&self);

    /// `destroy`, then give `SIGINT` its default disposition back.
    fn stop(&self);

    /// Service the scheduler forever.
    fn run(&self) -> !;
}

struct Inner<S: Scheduler> {
    name: String,
    scheduler: Rc<S>,
    dispatcher: Dispatcher<S>,
    table: RefCell<Table<S::Token>>,
    resolver: RefCell<Resolver>,
    state: Cell<DriverState>,
    generation: Generation,
    intercepted: RefCell<BTreeSet<c_int>>,
    idle_backoff: Duration,
    blocker: Rc<dyn Blocker>,
    process: Rc<dyn ProcessIdentity>,
}

impl<S: Scheduler> Drop for Inner<S> {
    fn drop(&mut self) {
        for token in self.table.get_mut().drain_all() {
            self.scheduler.cancel(&token);
        }
    }
}

/// An [`EventLoop`] whose every dispatch runs as a task on a [`Scheduler`].
///
/// Cloning is cheap and yields a handle to the same driver, which lets
/// callbacks capture the driver they are registered on.
pub struct Driver<S: Scheduler = TokioScheduler>(Rc<Inner<S>>);

impl<S: Scheduler> Clone for Driver<S> {
    fn clone(&self) -> Self {
        Driver(Rc::clone(&self.0))
    }
}

impl<S: Scheduler> Debug for Driver<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.0.name)
            .field("scheduler", &self.0.scheduler.get_name())
            .field("state", &self.0.state.get())
            .field("generation", &self.0.generation.get())
            .field("registrations", &self.0.table.borrow().len())
            .finish()
    }
}

impl Driver<TokioScheduler> {
    /// Create a driver on its own tokio scheduler.
    ///
    /// # Errors
    /// if the scheduler can not be created.
    pub fn new(config: Config) -> std::io::Result<Self> {
        let scheduler = TokioScheduler::new(config.get_name())?;
        Ok(Self::with_scheduler(config, scheduler))
    }
}

impl<S: Scheduler + 'static> Driver<S> {
    #[allow(missing_docs)]
    #[must_use]
    pub fn with_scheduler(config: Config, scheduler: S) -> Self {
        let scheduler = Rc::new(scheduler);
        let dispatcher = Dispatcher::new(
            Rc::clone(&scheduler),
            config.get_supervisor(),
            config.get_fatal_grace(),
        );
        let inner = Inner {
            name: config.get_name().to_owned(),
            scheduler,
            dispatcher,
            table: RefCell::new(Table::default()),
            resolver: RefCell::new(Resolver::default()),
            state: Cell::new(DriverState::Idle),
            generation: Generation::default(),
            intercepted: RefCell::new(BTreeSet::new()),
            idle_backoff: config.get_idle_backoff(),
            blocker: config.get_blocker(),
            process: config.get_process(),
        };
        // the creating process is generation zero
        _ = inner.generation.observe(inner.process.as_ref());
        Driver(Rc::new(inner))
    }

    /// Make `handler` resolvable as `Callback::Named(name)`.
    pub fn register_function(&self, name: impl Into<String>, handler: Handler) {
        self.0.resolver.borrow_mut().register_function(name, handler);
    }

    /// Make the methods of `receiver` resolvable as `Callback::Named("name::method")`.
    pub fn register_type(&self, name: impl Into<String>, receiver: Rc<dyn Methods>) {
        self.0.resolver.borrow_mut().register_type(name, receiver);
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.0.state.get()
    }

    /// How many forks were noticed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.0.generation.get()
    }

    /// The number of registrations, of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.table.borrow().len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.table.borrow().is_empty()
    }

    /// The scheduler token `handle` currently aliases.
    #[must_use]
    pub fn token_of(&self, handle: Handle) -> Option<S::Token> {
        self.0.table.borrow().token_of(handle)
    }

    /// The handle aliasing `token`.
    #[must_use]
    pub fn handle_of(&self, token: &S::Token) -> Option<Handle> {
        self.0.table.borrow().handle_of(token)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn scheduler(&self) -> &S {
        &self.0.scheduler
    }

    /// Suspend the calling callback for `dur` without holding up other dispatches.
    #[must_use]
    pub fn sleep(&self, dur: Duration) -> Task {
        self.0.scheduler.sleep(dur)
    }

    /// Perform `steps` drive steps.
    ///
    /// Each step redistributes after a fork, drives the scheduler until it is
    /// quiescent, then backs off. Returns only once all steps are done.
    ///
    /// # Errors
    /// if the scheduler can not be driven or redistributed.
    pub fn run_bounded(&self, steps: u64) -> std::io::Result<()> {
        if self.0.state.replace(DriverState::Running) != DriverState::Running {
            crate::info!("{} running on {}", self.0.name, self.0.scheduler.get_name());
        }
        current::install(Rc::new(self.clone()));
        for _ in 0..steps {
            self.drive_step()?;
            self.0.blocker.block(self.0.idle_backoff);
        }
        Ok(())
    }

    fn drive_step(&self) -> std::io::Result<()> {
        if self.0.generation.observe(self.0.process.as_ref()) {
            self.redistribute()?;
        }
        self.0.scheduler.drive()
    }

    /// Move every live registration onto the scheduler state of this process.
    fn redistribute(&self) -> std::io::Result<()> {
        crate::warn!(
            "{} forked into pid {}, generation {}",
            self.0.name,
            self.0.process.pid(),
            self.0.generation.get()
        );
        self.0.scheduler.forked()?;
        let live = self.0.table.borrow().live();
        for (handle, registration) in live {
            if matches!(registration.event, Event::TimerOnce(_)) && registration.fired.get() {
                continue;
            }
            let armed = self.arm(
                handle,
                registration.event,
                &registration.handler,
                &registration.args,
                &registration.fired,
            );
            match armed {
                Ok(token) => {
                    _ = self.0.table.borrow_mut().rebind(handle, token);
                }
                Err(e) => {
                    crate::error!("{} dropped {handle} after fork: {e}", self.0.name);
                    _ = self.0.table.borrow_mut().remove(handle);
                }
            }
        }
        Ok(())
    }

    fn arm(
        &self,
        handle: Handle,
        event: Event,
        handler: &Handler,
        args: &Args,
        fired: &Rc<Cell<bool>>,
    ) -> std::io::Result<S::Token> {
        let scheduler = self.0.scheduler.as_ref();
        match event {
            Event::Read(fd) => {
                scheduler.watch_readable(fd, self.on_ready(handler, args, Target::Fd(fd)))
            }
            Event::Write(fd) => {
                scheduler.watch_writable(fd, self.on_ready(handler, args, Target::Fd(fd)))
            }
            Event::Signal(signum) => {
                scheduler.watch_signal(signum, self.on_ready(handler, args, Target::Signal(signum)))
            }
            Event::Except(fd) => Err(Error::new(
                ErrorKind::Unsupported,
                format!("except interest on fd {fd} is not supported"),
            )),
            Event::Timer(interval) => timer::repeat(
                scheduler,
                &self.0.dispatcher,
                handle,
                interval,
                handler.clone(),
                Rc::clone(args),
            ),
            Event::TimerOnce(delay) => timer::once(
                scheduler,
                &self.0.dispatcher,
                handle,
                delay,
                handler.clone(),
                Rc::clone(args),
                Rc::clone(fired),
            ),
        }
    }

    fn on_ready(&self, handler: &Handler, args: &Args, target: Target) -> Ready {
        let dispatcher = self.0.dispatcher.clone();
        let handler = handler.clone();
        let args = Rc::clone(args);
        Rc::new(move || dispatcher.dispatch(&handler, Fired::new(target, Rc::clone(&args))))
    }

    fn release(&self, signum: c_int) {
        if let Err(e) = signal::release(signum) {
            crate::warn!("{} can not restore signal {signum}: {e}", self.0.name);
        }
    }

    fn cancel_all(&self, tokens: &[S::Token]) {
        for token in tokens {
            self.0.scheduler.cancel(token);
        }
    }
}

impl<S: Scheduler> Named for Driver<S> {
    fn get_name(&self) -> &str {
        &self.0.name
    }
}

impl<S: Scheduler + 'static> EventLoop for Driver<S> {
    fn add(
        &self,
        event: Event,
        callback: Callback,
        args: Vec<Rc<dyn Any>>,
    ) -> std::io::Result<Handle> {
        let handler = self.0.resolver.borrow().resolve(callback)?;
        let args: Args = Rc::from(args);
        let fired = Rc::new(Cell::new(false));
        let handle = self.0.table.borrow_mut().allocate();
        let token = self.arm(handle, event, &handler, &args, &fired)?;
        if let Event::Signal(signum) = event {
            if !self.0.intercepted.borrow().contains(&signum) {
                if let Err(e) = signal::hook(signum) {
                    self.0.scheduler.cancel(&token);
                    return Err(e);
                }
                _ = self.0.intercepted.borrow_mut().insert(signum);
            }
        }
        self.0.table.borrow_mut().insert(
            handle,
            Registration {
                event,
                token,
                handler,
                args,
                fired,
            },
        );
        crate::debug!("{} added {} interest as {handle}", self.0.name, event.kind());
        Ok(handle)
    }

    fn del(&self, key: Key) {
        let tokens = self.0.table.borrow_mut().unregister(key);
        self.cancel_all(&tokens);
        if let Key::Signal(signum) = key {
            if self.0.intercepted.borrow_mut().remove(&signum) {
                self.release(signum);
            }
        }
        if !tokens.is_empty() {
            crate::debug!("{} removed {key:?}, {} cancelled", self.0.name, tokens.len());
        }
    }

    fn clear_all_timers(&self) {
        let tokens = self.0.table.borrow_mut().clear_timers();
        self.cancel_all(&tokens);
    }

    fn timer_count(&self) -> usize {
        self.0.table.borrow().timer_count()
    }

    fn destroy(&self) {
        let tokens = self.0.table.borrow_mut().drain_all();
        self.cancel_all(&tokens);
        let intercepted = std::mem::take(&mut *self.0.intercepted.borrow_mut());
        for signum in intercepted {
            self.release(signum);
        }
        current::uninstall(&self.0.name);
        if self.0.state.replace(DriverState::Stopped) != DriverState::Stopped {
            crate::info!("{} destroyed, {} cancelled", self.0.name, tokens.len());
        }
    }

    fn stop(&self) {
        self.destroy();
        if let Err(e) = signal::restore_default(libc::SIGINT) {
            crate::warn!("{} can not restore SIGINT: {e}", self.0.name);
        }
    }

    fn run(&self) -> ! {
        loop {
            if let Err(e) = self.run_bounded(u64::MAX) {
                crate::error!("{} drive step failed: {e}", self.0.name);
                self.0.blocker.block(self.0.idle_backoff);
            }
        }
    }
}
