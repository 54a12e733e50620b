//! Single-threaded publish/subscribe signals
//!
//! Outputs and damage trackers announce lifecycle events through [`Signal`]s.
//! A subscriber receives a [`ListenerId`] handle and must hand it back to
//! [`Signal::remove`] when it goes away.
//!
//! Emission tolerates listeners that remove themselves, or other listeners,
//! while the signal is being emitted. This happens when an output's `destroy`
//! signal tears down a damage tracker that is itself subscribed to it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Handle for a listener registered on a [`Signal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Rc<dyn Fn(&T)>;

/// An event source that listeners can subscribe to
pub struct Signal<T> {
    listeners: RefCell<Vec<(ListenerId, Listener<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Registers a listener, returning the handle used to remove it
    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Removes a listener
    ///
    /// Returns `false` if the listener was already removed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        match listeners.iter().position(|(lid, _)| *lid == id) {
            Some(pos) => {
                listeners.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Calls every listener registered at the time of the call
    ///
    /// Listeners removed by an earlier listener during this emission are
    /// skipped; listeners added during this emission are not called.
    pub fn emit(&self, data: &T) {
        let ids: Vec<ListenerId> = self.listeners.borrow().iter().map(|(id, _)| *id).collect();
        for id in ids {
            let listener = self
                .listeners
                .borrow()
                .iter()
                .find(|(lid, _)| *lid == id)
                .map(|(_, l)| Rc::clone(l));
            if let Some(listener) = listener {
                listener(data);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listener_count() == 0
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let signal = Signal::<u32>::new();
        let total = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let total = Rc::clone(&total);
            signal.add(move |v| total.set(total.get() + *v));
        }
        signal.emit(&2);

        assert_eq!(total.get(), 6);
    }

    #[test]
    fn test_remove_twice_reports_false() {
        let signal = Signal::<()>::new();
        let id = signal.add(|_| {});

        assert!(signal.remove(id));
        assert!(!signal.remove(id));
        assert!(signal.is_empty());
    }

    #[test]
    fn test_listener_removed_during_emit_is_skipped() {
        let signal = Rc::new(Signal::<()>::new());
        let calls = Rc::new(Cell::new(0));
        let victim = Rc::new(Cell::new(None));

        {
            let signal_ref = Rc::downgrade(&signal);
            let victim = Rc::clone(&victim);
            signal.add(move |_| {
                if let (Some(signal), Some(id)) = (signal_ref.upgrade(), victim.get()) {
                    signal.remove(id);
                }
            });
        }
        {
            let calls = Rc::clone(&calls);
            victim.set(Some(signal.add(move |_| calls.set(calls.get() + 1))));
        }

        signal.emit(&());
        assert_eq!(calls.get(), 0);
        assert_eq!(signal.listener_count(), 1);
    }

    #[test]
    fn test_listener_added_during_emit_waits_for_next_emit() {
        let signal = Rc::new(Signal::<()>::new());
        let calls = Rc::new(Cell::new(0));

        {
            let signal_ref = Rc::downgrade(&signal);
            let calls = Rc::clone(&calls);
            let added = Cell::new(false);
            signal.add(move |_| {
                if added.replace(true) {
                    return;
                }
                if let Some(signal) = signal_ref.upgrade() {
                    let calls = Rc::clone(&calls);
                    signal.add(move |_| calls.set(calls.get() + 1));
                }
            });
        }

        signal.emit(&());
        assert_eq!(calls.get(), 0);
        signal.emit(&());
        assert_eq!(calls.get(), 1);
    }
}
