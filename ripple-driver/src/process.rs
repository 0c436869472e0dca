use std::cell::Cell;
use std::fmt::Debug;

/// The process-identity query the driver uses to notice forks.
pub trait ProcessIdentity: Debug {
    /// The id of the current process.
    fn pid(&self) -> u32;

    /// Returns `true` if the platform can fork, only then is the pid watched.
    fn supports_process_control(&self) -> bool;
}

#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct OsProcess {}

impl ProcessIdentity for OsProcess {
    fn pid(&self) -> u32 {
        std::process::id()
    }

    fn supports_process_control(&self) -> bool {
        cfg!(unix)
    }
}

/// Environment generation, bumped every time the observed pid changes.
#[derive(Debug, Default)]
pub(crate) struct Generation {
    pid: Cell<Option<u32>>,
    count: Cell<u64>,
}

impl Generation {
    /// Record the current pid, returns `true` on a transition.
    ///
    /// The first observation only records.
    pub(crate) fn observe(&self, process: &dyn ProcessIdentity) -> bool {
        if !process.supports_process_control() {
            return false;
        }
        let pid = process.pid();
        match self.pid.replace(Some(pid)) {
            Some(last) if last != pid => {
                self.count.set(self.count.get() + 1);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn get(&self) -> u64 {
        self.count.get()
    }
}
