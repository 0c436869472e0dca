use crate::common::{Blocker, SleepBlocker};
use crate::constants::{DEFAULT_FATAL_GRACE, DEFAULT_IDLE_BACKOFF, FATAL_EXIT_CODE};
use crate::dispatch::{ProcessSupervisor, Supervisor};
use crate::process::{OsProcess, ProcessIdentity};
use std::rc::Rc;
use std::time::Duration;
use uuid::Uuid;

/// How a [`Driver`](crate::Driver) is built.
#[derive(Debug, Clone)]
pub struct Config {
    name: String,
    idle_backoff: Duration,
    fatal_grace: Duration,
    fatal_exit_code: i32,
    blocker: Rc<dyn Blocker>,
    supervisor: Option<Rc<dyn Supervisor>>,
    process: Rc<dyn ProcessIdentity>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: format!("ripple-driver-{}", Uuid::new_v4()),
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            fatal_grace: DEFAULT_FATAL_GRACE,
            fatal_exit_code: FATAL_EXIT_CODE,
            blocker: Rc::new(SleepBlocker::default()),
            supervisor: None,
            process: Rc::new(OsProcess::default()),
        }
    }
}

impl Config {
    #[allow(missing_docs)]
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// The pause between two drive steps.
    pub fn set_idle_backoff(&mut self, idle_backoff: Duration) -> &mut Self {
        self.idle_backoff = idle_backoff;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn get_idle_backoff(&self) -> Duration {
        self.idle_backoff
    }

    /// Handed to the supervisor on a fatal stop.
    pub fn set_fatal_grace(&mut self, fatal_grace: Duration) -> &mut Self {
        self.fatal_grace = fatal_grace;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn get_fatal_grace(&self) -> Duration {
        self.fatal_grace
    }

    /// Only used by the default supervisor.
    pub fn set_fatal_exit_code(&mut self, fatal_exit_code: i32) -> &mut Self {
        self.fatal_exit_code = fatal_exit_code;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn get_fatal_exit_code(&self) -> i32 {
        self.fatal_exit_code
    }

    #[allow(missing_docs)]
    pub fn set_blocker(&mut self, blocker: impl Blocker + 'static) -> &mut Self {
        self.blocker = Rc::new(blocker);
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn get_blocker(&self) -> Rc<dyn Blocker> {
        Rc::clone(&self.blocker)
    }

    #[allow(missing_docs)]
    pub fn set_supervisor(&mut self, supervisor: Rc<dyn Supervisor>) -> &mut Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// The configured supervisor, or a [`ProcessSupervisor`] exiting with the fatal exit code.
    #[must_use]
    pub fn get_supervisor(&self) -> Rc<dyn Supervisor> {
        self.supervisor.as_ref().map_or_else(
            || Rc::new(ProcessSupervisor::new(self.fatal_exit_code)) as Rc<dyn Supervisor>,
            Rc::clone,
        )
    }

    #[allow(missing_docs)]
    pub fn set_process(&mut self, process: impl ProcessIdentity + 'static) -> &mut Self {
        self.process = Rc::new(process);
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn get_process(&self) -> Rc<dyn ProcessIdentity> {
        Rc::clone(&self.process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SLEEP_BLOCKER_NAME;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.get_name().starts_with("ripple-driver-"));
        assert_eq!(Duration::from_secs(1), config.get_idle_backoff());
        assert_eq!(Duration::from_millis(100), config.get_fatal_grace());
        assert_eq!(250, config.get_fatal_exit_code());
        assert_eq!(SLEEP_BLOCKER_NAME, config.get_blocker().get_name());
        assert_eq!(std::process::id(), config.get_process().pid());
        assert_ne!(Config::default().get_name(), config.get_name());
    }

    #[test]
    fn setters_chain() {
        let mut config = Config::default();
        _ = config
            .set_name("worker")
            .set_idle_backoff(Duration::from_millis(5))
            .set_fatal_grace(Duration::ZERO)
            .set_fatal_exit_code(3);
        assert_eq!("worker", config.get_name());
        assert_eq!(Duration::from_millis(5), config.get_idle_backoff());
        assert_eq!(Duration::ZERO, config.get_fatal_grace());
        assert_eq!(3, config.get_fatal_exit_code());
    }
}
