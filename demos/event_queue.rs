//! A queue of events of unrelated types, delivered to listeners stored side by
//! side as [`ErasedFunction`]s.
//!
//! Listeners are registered per event type. Each event type `E` has listeners
//! of signature `fn(E)`; they are erased when registered and cast back when an
//! event of type `E` is dispatched. Queued events are erased the same way: each
//! one becomes a delivery callable owning the event until it is dispatched.

use std::{cell::Cell, rc::Rc};

use erased_fn::{ErasedFunction, Function, TypeIdentity, cast::function_cast};
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

type ListenerId = u32;

struct Listener {
    id: ListenerId,
    function: ErasedFunction,
}

/// Hands one queued event to the listeners of its type.
type Delivery = fn(&[Listener]);

struct PendingEvent {
    event: TypeIdentity,
    deliver: Function<Delivery>,
}

#[derive(Default)]
struct EventQueue {
    listeners: HashMap<TypeIdentity, Vec<Listener>, FxBuildHasher>,
    pending: Vec<PendingEvent>,
    next_id: ListenerId,
}

impl EventQueue {
    fn add_listener<E: Clone + 'static>(&mut self, listener: Function<fn(E)>) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(TypeIdentity::of::<E>())
            .or_default()
            .push(Listener {
                id,
                function: listener.into(),
            });
        id
    }

    fn remove_listener<E: 'static>(&mut self, id: ListenerId) -> bool {
        let Some(listeners) = self.listeners.get_mut(&TypeIdentity::of::<E>()) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    fn count_listeners<E: 'static>(&self) -> usize {
        self.listeners
            .get(&TypeIdentity::of::<E>())
            .map_or(0, Vec::len)
    }

    fn enqueue<E: Clone + 'static>(&mut self, event: E) {
        self.pending.push(PendingEvent {
            event: TypeIdentity::of::<E>(),
            deliver: Function::from_unique(move |listeners: &[Listener]| {
                deliver(listeners, &event);
            }),
        });
    }

    fn dispatch(&mut self) {
        for pending in std::mem::take(&mut self.pending) {
            let listeners = self
                .listeners
                .get(&pending.event)
                .map_or(&[][..], Vec::as_slice);
            tracing::info!(event = %pending.event, listeners = listeners.len(), "dispatching");
            pending.deliver.call((listeners,));
        }
    }
}

fn deliver<E: Clone + 'static>(listeners: &[Listener], event: &E) {
    for listener in listeners {
        match function_cast::<fn(E)>(&listener.function) {
            Ok(function) => function.call((event.clone(),)),
            Err(error) => tracing::error!(listener = listener.id, %error, "skipping listener"),
        }
    }
}

#[derive(Clone)]
struct Foo(&'static str);

#[derive(Clone, Copy)]
struct Bar {
    x: i32,
    y: i32,
}

#[derive(Clone)]
struct SetValue(Rc<Cell<i32>>);

fn main() {
    tracing::subscriber::set_global_default(tracing_subscriber::fmt().finish())
        .expect("no other subscriber is installed");

    let mut queue = EventQueue::default();

    queue.add_listener(Function::<fn(Foo)>::from_fn(|Foo(text): Foo| {
        println!("Foo called: {text}");
    }));
    let bar = queue.add_listener(Function::<fn(Bar)>::from_fn(|bar: Bar| {
        println!("Bar called: {}, {}", bar.x, bar.y);
    }));
    queue.add_listener(Function::<fn(SetValue)>::from_fn(|SetValue(value): SetValue| {
        value.set(7);
        println!("Setting value to 7");
    }));

    // Nothing is queued yet.
    queue.dispatch();

    queue.enqueue(Foo("this goes to the listener"));
    queue.enqueue(Bar { x: 2, y: 3 });
    let value = Rc::new(Cell::new(5));
    queue.enqueue(SetValue(Rc::clone(&value)));
    assert_eq!(value.get(), 5);

    queue.dispatch();
    println!("Value is now {} after dispatch.", value.get());
    assert_eq!(value.get(), 7);

    // Listeners can own state that cannot be copied.
    let prefix = String::from("owned prefix");
    queue.add_listener(Function::<fn(Foo)>::from_unique(move |Foo(text): Foo| {
        println!("{prefix}: {text}");
    }));
    assert_eq!(queue.count_listeners::<Foo>(), 2);

    assert!(queue.remove_listener::<Bar>(bar));
    assert!(!queue.remove_listener::<Bar>(bar));
    queue.enqueue(Bar { x: 0, y: 0 });
    queue.enqueue(Foo("delivered twice"));
    queue.dispatch();
}
