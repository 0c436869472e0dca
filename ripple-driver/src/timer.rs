use crate::callback::Handler;
use crate::dispatch::Dispatcher;
use crate::event::{Args, Fired, Handle, Target};
use crate::scheduler::Scheduler;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Arm a one-shot timer, `fired` is raised right before dispatch.
pub(crate) fn once<S: Scheduler + 'static>(
    scheduler: &S,
    dispatcher: &Dispatcher<S>,
    handle: Handle,
    delay: Duration,
    handler: Handler,
    args: Args,
    fired: Rc<Cell<bool>>,
) -> std::io::Result<S::Token> {
    let dispatcher = dispatcher.clone();
    scheduler.after(
        delay,
        Box::new(move || {
            fired.set(true);
            dispatcher.dispatch(&handler, Fired::new(Target::Timer(handle), args));
        }),
    )
}

/// Arm a repeating timer.
///
/// A supervising task waits for each tick and spawns one dispatch per tick;
/// it exits as soon as the ticker is stopped through the returned token.
pub(crate) fn repeat<S: Scheduler + 'static>(
    scheduler: &S,
    dispatcher: &Dispatcher<S>,
    handle: Handle,
    interval: Duration,
    handler: Handler,
    args: Args,
) -> std::io::Result<S::Token> {
    let (token, mut ticker) = scheduler.ticker(interval)?;
    let dispatcher = dispatcher.clone();
    scheduler.spawn(Box::pin(async move {
        while ticker.recv().await.is_some() {
            dispatcher.dispatch(
                &handler,
                Fired::new(Target::Timer(handle), Rc::clone(&args)),
            );
        }
        crate::debug!("timer {handle} stopped");
    }));
    Ok(token)
}
