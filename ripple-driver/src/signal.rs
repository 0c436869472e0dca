use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::collections::BTreeMap;
use std::ffi::c_int;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Watchers of one signal, across every driver of the process.
#[derive(Debug, Default)]
struct Hook {
    watchers: usize,
    /// The scheduler's handler, set aside while the default disposition is in place.
    parked: Option<SigAction>,
}

static HOOKS: Mutex<BTreeMap<c_int, Hook>> = Mutex::new(BTreeMap::new());

fn hooks() -> MutexGuard<'static, BTreeMap<c_int, Hook>> {
    HOOKS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Re-install the default disposition of `signum`, returning the replaced one.
pub(crate) fn restore_default(signum: c_int) -> std::io::Result<SigAction> {
    let signal = Signal::try_from(signum)?;
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: SIG_DFL runs no code of ours.
    Ok(unsafe { sigaction(signal, &default) }?)
}

/// Count one more watcher of `signum`.
///
/// The scheduler installs its handler only once per process, so a handler
/// parked by [`release`] is put back here.
pub(crate) fn hook(signum: c_int) -> std::io::Result<()> {
    let signal = Signal::try_from(signum)?;
    let mut hooks = hooks();
    let hook = hooks.entry(signum).or_default();
    if let Some(parked) = hook.parked.take() {
        // SAFETY: `parked` is the handler the scheduler installed for `signal`.
        _ = unsafe { sigaction(signal, &parked) }?;
    }
    hook.watchers += 1;
    Ok(())
}

/// Drop one watcher of `signum`; the last one gives the default disposition back.
pub(crate) fn release(signum: c_int) -> std::io::Result<()> {
    let mut hooks = hooks();
    let Some(hook) = hooks.get_mut(&signum) else {
        return Ok(());
    };
    hook.watchers = hook.watchers.saturating_sub(1);
    if hook.watchers > 0 || hook.parked.is_some() {
        return Ok(());
    }
    let previous = restore_default(signum)?;
    if !matches!(previous.handler(), SigHandler::SigDfl | SigHandler::SigIgn) {
        hook.parked = Some(previous);
    }
    Ok(())
}

/// The raw disposition of `signum`, for asserting on it.
#[cfg(test)]
pub(crate) fn disposition(signum: c_int) -> libc::sighandler_t {
    // SAFETY: all-zero is a valid `sigaction` and a null action only queries.
    let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: as above.
    assert_eq!(0, unsafe {
        libc::sigaction(signum, std::ptr::null(), &mut current)
    });
    current.sa_sigaction
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    extern "C" fn noop(_: c_int) {}

    #[test]
    fn restore_ignored_signal() -> std::io::Result<()> {
        // SAFETY: SIG_IGN runs no code of ours.
        _ = unsafe { nix::sys::signal::signal(Signal::SIGUSR2, SigHandler::SigIgn) }?;
        let previous = restore_default(libc::SIGUSR2)?;
        assert_eq!(SigHandler::SigIgn, previous.handler());
        assert_eq!(libc::SIG_DFL, disposition(libc::SIGUSR2));
        Ok(())
    }

    #[test]
    fn unknown_signal() {
        let error = restore_default(0).unwrap_err();
        assert_eq!(ErrorKind::InvalidInput, error.kind());
        assert_eq!(ErrorKind::InvalidInput, hook(0).unwrap_err().kind());
        assert!(release(0).is_ok());
    }

    #[test]
    fn last_release_parks_and_hook_reinstalls() -> std::io::Result<()> {
        let installed = noop as libc::sighandler_t;
        // SAFETY: `noop` does nothing at all.
        _ = unsafe { nix::sys::signal::signal(Signal::SIGURG, SigHandler::Handler(noop)) }?;
        hook(libc::SIGURG)?;
        hook(libc::SIGURG)?;

        release(libc::SIGURG)?;
        assert_eq!(installed, disposition(libc::SIGURG));
        release(libc::SIGURG)?;
        assert_eq!(libc::SIG_DFL, disposition(libc::SIGURG));
        release(libc::SIGURG)?;
        assert_eq!(libc::SIG_DFL, disposition(libc::SIGURG));

        hook(libc::SIGURG)?;
        assert_eq!(installed, disposition(libc::SIGURG));
        release(libc::SIGURG)?;
        assert_eq!(libc::SIG_DFL, disposition(libc::SIGURG));
        Ok(())
    }
}
