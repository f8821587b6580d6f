//! Change notification: a listener registry plus a list that reports its edits.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Rc<dyn Fn(&E)>;

/// Single-threaded event bus. Listeners may subscribe or unsubscribe from
/// inside a callback; changes apply from the next emit.
pub struct EventBus<E> {
    listeners: RefCell<Vec<(ListenerId, Listener<E>)>>,
    next_id: Cell<u64>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

/// Structural edits reported by [`ObservableList`]. Indices refer to the list
/// after the edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEvent {
    ItemAdded(usize),
    ItemRemoved(usize),
    ItemUpdated(usize),
    /// Items were reordered.
    Sorted,
    /// Contents replaced wholesale.
    Reset,
}

/// Which scalar model property changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Filename,
    Image,
    Render,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    PropertyChanged(Property),
    /// Edit to the channel list itself.
    ChannelsChanged(ListEvent),
    /// Edit to the filter list of one channel's pipeline.
    PipelineChanged { channel: usize, change: ListEvent },
    IoTaskStarted { pending: usize },
    IoTaskFinished { pending: usize, ok: bool },
}

/// A `Vec` that announces every mutation on its own bus.
pub struct ObservableList<T> {
    items: Vec<T>,
    events: EventBus<ListEvent>,
}

impl<T> Default for ObservableList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            events: EventBus::new(),
        }
    }
}

impl<T> ObservableList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &EventBus<ListEvent> {
        &self.events
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mutate one item in place. Returns false if `index` is out of range.
    pub fn update(&mut self, index: usize, f: impl FnOnce(&mut T)) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        f(item);
        self.events.emit(&ListEvent::ItemUpdated(index));
        true
    }

    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
        self.events.emit(&ListEvent::Reset);
    }
}
