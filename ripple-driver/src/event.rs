use std::any::Any;
use std::ffi::c_int;
use std::fmt::{Display, Formatter};
use std::io::{Error, ErrorKind};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

/// The payload handed back to a callback on every firing.
pub type Args = Rc<[Rc<dyn Any>]>;

/// Stable identity returned by `add`.
///
/// Handles are allocated monotonically and never reused by the same driver.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Handle(pub(crate) u64);

impl Handle {
    /// The integer value of this handle.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<Handle> for u64 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interest expressed through `add`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    /// The descriptor becomes readable.
    Read(RawFd),
    /// The descriptor becomes writable.
    Write(RawFd),
    /// Out-of-band data on the descriptor, never supported.
    Except(RawFd),
    /// The signal arrives.
    Signal(c_int),
    /// Fire every interval.
    Timer(Duration),
    /// Fire once after the delay.
    TimerOnce(Duration),
}

impl Event {
    /// The kind of this interest.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Event::Read(_) => Kind::Read,
            Event::Write(_) => Kind::Write,
            Event::Except(_) => Kind::Except,
            Event::Signal(_) => Kind::Signal,
            Event::Timer(_) => Kind::Timer,
            Event::TimerOnce(_) => Kind::TimerOnce,
        }
    }

    /// Returns `true` for both timer variants.
    #[must_use]
    pub fn is_timer(&self) -> bool {
        matches!(self, Event::Timer(_) | Event::TimerOnce(_))
    }
}

/// Interest kinds, valued like the host's event flags.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Kind {
    #[allow(missing_docs)]
    Read = 1,
    #[allow(missing_docs)]
    Write = 2,
    #[allow(missing_docs)]
    Except = 3,
    #[allow(missing_docs)]
    Signal = 4,
    #[allow(missing_docs)]
    Timer = 8,
    #[allow(missing_docs)]
    TimerOnce = 16,
}

impl TryFrom<u32> for Kind {
    type Error = Error;

    fn try_from(flag: u32) -> std::io::Result<Self> {
        match flag {
            1 => Ok(Kind::Read),
            2 => Ok(Kind::Write),
            3 => Ok(Kind::Except),
            4 => Ok(Kind::Signal),
            8 => Ok(Kind::Timer),
            16 => Ok(Kind::TimerOnce),
            _ => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unknown event flag {flag}"),
            )),
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Kind::Read => "read",
            Kind::Write => "write",
            Kind::Except => "except",
            Kind::Signal => "signal",
            Kind::Timer => "timer",
            Kind::TimerOnce => "timer-once",
        };
        f.write_str(name)
    }
}

/// What `del` removes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Key {
    /// Every read interest on the descriptor.
    Read(RawFd),
    /// Every write interest on the descriptor.
    Write(RawFd),
    /// Every interest in the signal.
    Signal(c_int),
    /// One timer, repeating or not.
    Timer(Handle),
}

/// What a fired registration was about.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Target {
    /// A descriptor became ready.
    Fd(RawFd),
    /// A signal arrived.
    Signal(c_int),
    /// A timer elapsed.
    Timer(Handle),
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Fd(fd) => write!(f, "fd {fd}"),
            Target::Signal(signal) => write!(f, "signal {signal}"),
            Target::Timer(handle) => write!(f, "timer {handle}"),
        }
    }
}

/// The single argument every callback receives.
#[derive(Clone)]
pub struct Fired {
    target: Target,
    args: Args,
}

impl Fired {
    pub(crate) fn new(target: Target, args: Args) -> Self {
        Fired { target, args }
    }

    /// The descriptor, signal or timer that fired.
    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    /// The payload given to `add`.
    #[must_use]
    pub fn args(&self) -> &[Rc<dyn Any>] {
        &self.args
    }

    /// The `index`th payload value, if present and of type `T`.
    #[must_use]
    pub fn arg<T: Any>(&self, index: usize) -> Option<&T> {
        self.args.get(index).and_then(|arg| arg.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for Fired {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fired")
            .field("target", &self.target)
            .field("args", &self.args.len())
            .finish()
    }
}
