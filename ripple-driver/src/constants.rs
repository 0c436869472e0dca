use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

/// Enums used to describe driver state
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum DriverState {
    ///The driver is created but has never run.
    #[default]
    Idle,
    ///The driver is installed as the host's event loop.
    Running,
    ///The driver has been destroyed.
    Stopped,
}

impl Display for DriverState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Pause between two drive steps once the scheduler is quiescent.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Time in-flight work gets to settle before a fatal stop exits the process.
pub const DEFAULT_FATAL_GRACE: Duration = Duration::from_millis(100);

/// Exit code used when a dispatched callback fails.
pub const FATAL_EXIT_CODE: i32 = 250;
