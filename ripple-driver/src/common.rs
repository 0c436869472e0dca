use std::fmt::Debug;
use std::time::Duration;

/// Give the object a name.
pub trait Named {
    /// Get the name of this object.
    fn get_name(&self) -> &str;
}

/// The idle backoff step taken between two drive steps.
pub trait Blocker: Debug + Named {
    /// Block current thread for a while.
    fn block(&self, dur: Duration);
}

#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct SleepBlocker {}

/// const `SLEEP_BLOCKER_NAME`.
pub const SLEEP_BLOCKER_NAME: &str = "SleepBlocker";

impl Named for SleepBlocker {
    fn get_name(&self) -> &str {
        SLEEP_BLOCKER_NAME
    }
}

impl Blocker for SleepBlocker {
    fn block(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}
