use super::EventLoop;
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static EVENT_LOOP: RefCell<Option<Rc<dyn EventLoop>>> = RefCell::new(None);
}

/// The event loop installed on this thread by the last `run`, if it was not destroyed since.
#[must_use]
pub fn current() -> Option<Rc<dyn EventLoop>> {
    EVENT_LOOP.with(|slot| slot.borrow().clone())
}

pub(crate) fn install(event_loop: Rc<dyn EventLoop>) {
    let previous = EVENT_LOOP.with(|slot| slot.borrow_mut().replace(event_loop));
    if let Some(previous) = previous {
        crate::debug!("event loop {} replaced", previous.get_name());
    }
}

/// Empty the slot if it holds the event loop called `name`.
pub(crate) fn uninstall(name: &str) {
    let removed = EVENT_LOOP.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot
            .as_ref()
            .is_some_and(|installed| installed.get_name() == name)
        {
            slot.take()
        } else {
            None
        }
    });
    // dropped outside the borrow, the loop may hold the last driver handle
    drop(removed);
}
