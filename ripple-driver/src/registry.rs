use crate::callback::Handler;
use crate::event::{Args, Event, Handle, Key};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::c_int;
use std::hash::Hash;
use std::os::fd::RawFd;
use std::rc::Rc;

/// One stored interest.
#[derive(Debug, Clone)]
pub(crate) struct Registration<T> {
    pub(crate) event: Event,
    pub(crate) token: T,
    pub(crate) handler: Handler,
    pub(crate) args: Args,
    /// Set once a one-shot timer went off, it stays inert afterwards.
    pub(crate) fired: Rc<Cell<bool>>,
}

/// Handles on one side, scheduler tokens on the other.
#[derive(Debug)]
pub(crate) struct Table<T> {
    next: u64,
    entries: BTreeMap<Handle, Registration<T>>,
    aliases: HashMap<T, Handle>,
    reads: HashMap<RawFd, Vec<Handle>>,
    writes: HashMap<RawFd, Vec<Handle>>,
    signals: HashMap<c_int, Vec<Handle>>,
    timers: BTreeSet<Handle>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Table {
            next: 0,
            entries: BTreeMap::new(),
            aliases: HashMap::new(),
            reads: HashMap::new(),
            writes: HashMap::new(),
            signals: HashMap::new(),
            timers: BTreeSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Table<T> {
    /// Reserve the next handle, handles are never handed out twice.
    pub(crate) fn allocate(&mut self) -> Handle {
        self.next += 1;
        Handle(self.next)
    }

    pub(crate) fn insert(&mut self, handle: Handle, registration: Registration<T>) {
        _ = self.aliases.insert(registration.token.clone(), handle);
        match registration.event {
            Event::Read(fd) => self.reads.entry(fd).or_default().push(handle),
            Event::Write(fd) => self.writes.entry(fd).or_default().push(handle),
            Event::Signal(signal) => self.signals.entry(signal).or_default().push(handle),
            Event::Timer(_) | Event::TimerOnce(_) => {
                _ = self.timers.insert(handle);
            }
            Event::Except(_) => {}
        }
        _ = self.entries.insert(handle, registration);
    }

    /// Forget everything `key` names and hand back the tokens to cancel.
    ///
    /// Unknown keys are a no-op.
    pub(crate) fn unregister(&mut self, key: Key) -> Vec<T> {
        let handles = match key {
            Key::Read(fd) => self.reads.remove(&fd).unwrap_or_default(),
            Key::Write(fd) => self.writes.remove(&fd).unwrap_or_default(),
            Key::Signal(signal) => self.signals.remove(&signal).unwrap_or_default(),
            Key::Timer(handle) => {
                if self.timers.remove(&handle) {
                    vec![handle]
                } else {
                    Vec::new()
                }
            }
        };
        handles
            .into_iter()
            .filter_map(|handle| self.forget(handle))
            .collect()
    }

    /// Forget a single registration wherever it is indexed.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        let event = self.entries.get(&handle)?.event;
        match event {
            Event::Read(fd) => detach(&mut self.reads, fd, handle),
            Event::Write(fd) => detach(&mut self.writes, fd, handle),
            Event::Signal(signal) => detach(&mut self.signals, signal, handle),
            Event::Timer(_) | Event::TimerOnce(_) => {
                _ = self.timers.remove(&handle);
            }
            Event::Except(_) => {}
        }
        self.forget(handle)
    }

    pub(crate) fn clear_timers(&mut self) -> Vec<T> {
        std::mem::take(&mut self.timers)
            .into_iter()
            .filter_map(|handle| self.forget(handle))
            .collect()
    }

    /// Empty the table, handles keep counting up.
    pub(crate) fn drain_all(&mut self) -> Vec<T> {
        self.aliases.clear();
        self.reads.clear();
        self.writes.clear();
        self.signals.clear();
        self.timers.clear();
        std::mem::take(&mut self.entries)
            .into_values()
            .map(|registration| registration.token)
            .collect()
    }

    /// Point `handle` at a new token, returns the old one.
    pub(crate) fn rebind(&mut self, handle: Handle, token: T) -> Option<T> {
        let registration = self.entries.get_mut(&handle)?;
        let old = std::mem::replace(&mut registration.token, token.clone());
        _ = self.aliases.remove(&old);
        _ = self.aliases.insert(token, handle);
        Some(old)
    }

    pub(crate) fn handle_of(&self, token: &T) -> Option<Handle> {
        self.aliases.get(token).copied()
    }

    pub(crate) fn token_of(&self, handle: Handle) -> Option<T> {
        self.entries
            .get(&handle)
            .map(|registration| registration.token.clone())
    }

    pub(crate) fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every registration, in handle order.
    pub(crate) fn live(&self) -> Vec<(Handle, Registration<T>)> {
        self.entries
            .iter()
            .map(|(handle, registration)| (*handle, registration.clone()))
            .collect()
    }

    fn forget(&mut self, handle: Handle) -> Option<T> {
        let registration = self.entries.remove(&handle)?;
        _ = self.aliases.remove(&registration.token);
        Some(registration.token)
    }
}

fn detach<K: Eq + Hash>(index: &mut HashMap<K, Vec<Handle>>, key: K, handle: Handle) {
    if let Some(handles) = index.get_mut(&key) {
        handles.retain(|h| *h != handle);
        if handles.is_empty() {
            _ = index.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registration(event: Event, token: &str) -> Registration<String> {
        Registration {
            event,
            token: token.to_owned(),
            handler: Handler::sync(|_| Ok(())),
            args: Rc::from(Vec::new()),
            fired: Rc::new(Cell::new(false)),
        }
    }

    fn register(table: &mut Table<String>, event: Event, token: &str) -> Handle {
        let handle = table.allocate();
        table.insert(handle, registration(event, token));
        handle
    }

    #[test]
    fn handles_are_never_reused() {
        let mut table = Table::default();
        let first = register(&mut table, Event::TimerOnce(Duration::ZERO), "a");
        assert_eq!(1, first.get());
        assert_eq!(vec![String::from("a")], table.unregister(Key::Timer(first)));
        let second = register(&mut table, Event::TimerOnce(Duration::ZERO), "b");
        assert!(second > first);
        _ = table.drain_all();
        let third = register(&mut table, Event::TimerOnce(Duration::ZERO), "c");
        assert!(third > second);
    }

    #[test]
    fn reads_have_set_semantics() {
        let mut table = Table::default();
        let h1 = register(&mut table, Event::Read(5), "r1");
        let h2 = register(&mut table, Event::Read(5), "r2");
        let w = register(&mut table, Event::Write(5), "w");
        assert_ne!(h1, h2);
        let mut tokens = table.unregister(Key::Read(5));
        tokens.sort();
        assert_eq!(vec![String::from("r1"), String::from("r2")], tokens);
        assert!(table.unregister(Key::Read(5)).is_empty());
        assert_eq!(Some(w), table.handle_of(&String::from("w")));
        assert_eq!(None, table.handle_of(&String::from("r1")));
        assert_eq!(1, table.len());
    }

    #[test]
    fn unknown_keys_are_no_ops() {
        let mut table: Table<String> = Table::default();
        assert!(table.unregister(Key::Read(1)).is_empty());
        assert!(table.unregister(Key::Signal(10)).is_empty());
        assert!(table.unregister(Key::Timer(Handle(9))).is_empty());
        assert_eq!(None, table.remove(Handle(9)));
        assert!(table.is_empty());
    }

    #[test]
    fn timers_are_counted_apart() {
        let mut table = Table::default();
        _ = register(&mut table, Event::Read(3), "r");
        _ = register(&mut table, Event::Signal(10), "s");
        let once = register(&mut table, Event::TimerOnce(Duration::from_millis(10)), "t1");
        _ = register(&mut table, Event::Timer(Duration::from_millis(10)), "t2");
        assert_eq!(2, table.timer_count());
        // a read key can not reach a timer
        assert!(table.unregister(Key::Timer(Handle(1))).is_empty());
        assert_eq!(vec![String::from("t1")], table.unregister(Key::Timer(once)));
        assert_eq!(1, table.timer_count());
        assert_eq!(vec![String::from("t2")], table.clear_timers());
        assert_eq!(0, table.timer_count());
        assert_eq!(2, table.len());
    }

    #[test]
    fn rebind_and_remove() {
        let mut table = Table::default();
        let read = register(&mut table, Event::Read(4), "old");
        _ = register(&mut table, Event::Read(4), "other");
        assert_eq!(Some(String::from("old")), table.rebind(read, String::from("new")));
        assert_eq!(Some(read), table.handle_of(&String::from("new")));
        assert_eq!(None, table.handle_of(&String::from("old")));
        assert_eq!(Some(String::from("new")), table.token_of(read));

        assert_eq!(Some(String::from("new")), table.remove(read));
        assert_eq!(vec![String::from("other")], table.unregister(Key::Read(4)));
        assert_eq!(None, table.rebind(read, String::from("again")));
    }

    #[test]
    fn drain_all_empties_every_index() {
        let mut table = Table::default();
        _ = register(&mut table, Event::Read(3), "r");
        _ = register(&mut table, Event::Write(3), "w");
        _ = register(&mut table, Event::Signal(10), "s");
        _ = register(&mut table, Event::Timer(Duration::from_millis(1)), "t");
        let live: Vec<Handle> = table.live().into_iter().map(|(h, _)| h).collect();
        assert_eq!(vec![Handle(1), Handle(2), Handle(3), Handle(4)], live);
        assert_eq!(4, table.drain_all().len());
        assert!(table.is_empty());
        assert_eq!(0, table.timer_count());
        assert!(table.drain_all().is_empty());
        assert!(table.unregister(Key::Signal(10)).is_empty());
    }
}
