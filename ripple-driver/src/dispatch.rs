use crate::callback::Handler;
use crate::event::Fired;
use crate::scheduler::Scheduler;
use futures::FutureExt;
use std::any::Any;
use std::fmt::Debug;
use std::io::{Error, ErrorKind};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Receives dispatch errors, which are fatal to the whole process.
pub trait Supervisor: Debug {
    /// Stop everything, giving in-flight work `grace` to settle.
    fn stop_all(&self, error: Error, grace: Duration);
}

/// Exits the process with a fixed code once the grace period is over.
#[derive(Debug)]
pub struct ProcessSupervisor {
    exit_code: i32,
    stopping: AtomicBool,
}

impl ProcessSupervisor {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(exit_code: i32) -> Self {
        ProcessSupervisor {
            exit_code,
            stopping: AtomicBool::new(false),
        }
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

impl Supervisor for ProcessSupervisor {
    fn stop_all(&self, error: Error, grace: Duration) {
        if self
            .stopping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            crate::warn!("already stopping, ignored: {error}");
            return;
        }
        crate::error!(
            "stopping all in {}ms with exit code {}: {error}",
            grace.as_millis(),
            self.exit_code
        );
        let exit_code = self.exit_code;
        let spawned = std::thread::Builder::new()
            .name(String::from("ripple-fatal-stop"))
            .spawn(move || {
                std::thread::sleep(grace);
                std::process::exit(exit_code);
            });
        if let Err(e) = spawned {
            crate::error!("fatal stop thread failed to start: {e}");
            std::process::exit(exit_code);
        }
    }
}

/// Turns every firing into its own task and watches it fail.
#[derive(Debug)]
pub(crate) struct Dispatcher<S: Scheduler> {
    scheduler: Rc<S>,
    supervisor: Rc<dyn Supervisor>,
    grace: Duration,
}

impl<S: Scheduler> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Dispatcher {
            scheduler: Rc::clone(&self.scheduler),
            supervisor: Rc::clone(&self.supervisor),
            grace: self.grace,
        }
    }
}

impl<S: Scheduler> Dispatcher<S> {
    pub(crate) fn new(scheduler: Rc<S>, supervisor: Rc<dyn Supervisor>, grace: Duration) -> Self {
        Dispatcher {
            scheduler,
            supervisor,
            grace,
        }
    }

    pub(crate) fn dispatch(&self, handler: &Handler, fired: Fired) {
        let handler = handler.clone();
        let supervisor = Rc::clone(&self.supervisor);
        let grace = self.grace;
        self.scheduler.spawn(Box::pin(async move {
            let target = fired.target();
            let call = async move { handler.call(fired).await };
            let error = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(payload) => Error::new(ErrorKind::Other, panic_message(payload.as_ref())),
            };
            crate::error!("callback for {target} failed: {error}");
            supervisor.stop_all(error, grace);
        }));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("callback panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("callback panicked: {message}")
    } else {
        String::from("callback panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!("callback panicked: boom", panic_message(payload.as_ref()));
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!("callback panicked: bang", panic_message(payload.as_ref()));
        let payload: Box<dyn Any + Send> = Box::new(1);
        assert_eq!("callback panicked", panic_message(payload.as_ref()));
    }

    #[test]
    fn process_supervisor_is_quiet_until_asked() {
        let supervisor = ProcessSupervisor::new(crate::constants::FATAL_EXIT_CODE);
        assert!(!supervisor.is_stopping());
    }
}
