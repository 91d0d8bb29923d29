//! Integration tests for the erased-fn-internals crate.
//!
//! ## Object Storage Tests
//! - `test_object_ownership_transitions`: Every storage kind replacing every
//!   other one, with the previous object released each time
//! - `test_exclusive_clone_and_drop_counts`: Exactly one clone per copy and
//!   exactly one drop per live object
//! - `test_shared_handles`: `Rc`, `Arc` and `triomphe::Arc` kept alive by the
//!   last copy of the storage
//!
//! ## Callable Tests
//! - `test_stateful_callable_copies_are_independent`: Copies of a stateful
//!   callable do not share state
//! - `test_method_bound_to_shared_receiver`: A method trampoline invoked with a
//!   shared receiver that outlives its original handle
//! - `test_method_bound_to_borrowed_receiver`: A mutating method invoked
//!   through a borrowed receiver
//! - `test_unique_callable`: Non-copyable callables can be called and moved,
//!   but copying fails without side effects
//! - `test_borrowed_arguments`: Arguments passed by reference are written
//!   through by copies of the callable
//!
//! ## Consistency Tests
//! - `test_identity_consistency`: Identities are stable across generic
//!   contexts and distinguish calling conventions
//! - `test_auto_traits`: Type-erased storage is neither `Send` nor `Sync`

use std::{cell::Cell, ptr::NonNull, rc::Rc, sync::Arc};

use erased_fn_internals::{
    RawFunction, RawObject, TypeIdentity,
    error::Error,
    object::Ownership,
    signature::{ArgsOf, Callable, Method, MethodSignature, OutputOf, Signature},
    trampoline,
};

/// Tracks clones and drops of [`Tracked`] values.
#[derive(Clone, Default)]
struct Counters {
    clones: Rc<Cell<usize>>,
    drops: Rc<Cell<usize>>,
}

impl Counters {
    fn clones(&self) -> usize {
        self.clones.get()
    }

    fn drops(&self) -> usize {
        self.drops.get()
    }
}

struct Tracked {
    counters: Counters,
    value: i32,
}

impl Tracked {
    fn new(counters: &Counters, value: i32) -> Self {
        Self {
            counters: counters.clone(),
            value,
        }
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        self.counters.clones.set(self.counters.clones.get() + 1);
        Self {
            counters: self.counters.clone(),
            value: self.value,
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counters.drops.set(self.counters.drops.get() + 1);
    }
}

fn owned<S: Signature, F: Callable<S> + Clone>(callable: F) -> RawFunction {
    let mut object = RawObject::new();
    object.store_owned(callable).unwrap();
    // SAFETY:
    // 1. The identity of `S` names the arguments and result of `S`.
    // 2. The object holds a live `F`.
    unsafe {
        RawFunction::from_parts(
            TypeIdentity::of::<S>(),
            Some(trampoline::callable::<S, F>()),
            object,
        )
    }
}

fn unique<S: Signature, F: Callable<S>>(callable: F) -> RawFunction {
    let mut object = RawObject::new();
    object.store_owned_unique(callable).unwrap();
    // SAFETY:
    // 1. The identity of `S` names the arguments and result of `S`.
    // 2. The object holds a live `F`.
    unsafe {
        RawFunction::from_parts(
            TypeIdentity::of::<S>(),
            Some(trampoline::callable::<S, F>()),
            object,
        )
    }
}

fn method<M: MethodSignature, F: Method<M>>(_: F, object: RawObject) -> RawFunction {
    assert_eq!(std::mem::size_of::<F>(), 0);
    // SAFETY: `F` is zero-sized and a value of it was passed in.
    let trampoline = unsafe { trampoline::method::<M, F>() };
    // SAFETY:
    // 1. The identity of `M::Bound` names its arguments and result, which
    //    are the ones of the method trampoline.
    // 2. Guaranteed by the callers of this helper, which bind a live
    //    receiver of the right type.
    unsafe {
        RawFunction::from_parts(
            TypeIdentity::of::<M::Bound>(),
            Some(trampoline),
            object,
        )
    }
}

fn call<'a, S: Signature>(
    function: &RawFunction,
    args: ArgsOf<'a, S>,
) -> Result<OutputOf<S>, Error> {
    assert_eq!(function.identity(), TypeIdentity::of::<S>());
    // SAFETY: The identity was checked to be `S`.
    unsafe { function.invoke::<S>(args) }
}

#[test]
fn test_object_ownership_transitions() {
    let counters = Counters::default();
    let borrowed = 5_u8;
    let shared = Rc::new(Tracked::new(&counters, 1));

    let mut object = RawObject::new();
    assert_eq!(object.ownership(), Ownership::Empty);

    object.store_owned(Tracked::new(&counters, 2)).unwrap();
    assert_eq!(object.ownership(), Ownership::Exclusive);
    assert_eq!(counters.drops(), 0);

    object.store_borrowed(NonNull::from(&borrowed));
    assert_eq!(object.ownership(), Ownership::Borrowed);
    assert_eq!(counters.drops(), 1);

    object.store_shared(Rc::clone(&shared));
    assert_eq!(object.ownership(), Ownership::Shared);
    assert_eq!(Rc::strong_count(&shared), 2);

    object.store_owned_unique(Tracked::new(&counters, 3)).unwrap();
    assert_eq!(object.ownership(), Ownership::Exclusive);
    assert_eq!(Rc::strong_count(&shared), 1);

    object.reset();
    assert_eq!(object.ownership(), Ownership::Empty);
    assert_eq!(counters.drops(), 2);
    assert_eq!(counters.clones(), 0);
    assert_eq!(borrowed, 5);
}

#[test]
fn test_exclusive_clone_and_drop_counts() {
    let counters = Counters::default();
    let mut object = RawObject::new();
    object.store_owned(Tracked::new(&counters, 7)).unwrap();

    let copy = object.try_clone().unwrap();
    assert_eq!(counters.clones(), 1);
    assert_eq!(counters.drops(), 0);
    // SAFETY: The copy holds a live `Tracked`.
    assert_eq!(unsafe { &*copy.as_ptr().cast::<Tracked>() }.value, 7);

    let mut target = RawObject::new();
    target.store_owned(Tracked::new(&counters, 8)).unwrap();
    target.try_clone_from(&copy).unwrap();
    assert_eq!(counters.clones(), 2);
    assert_eq!(counters.drops(), 1);

    let mut moved = RawObject::new();
    let address = target.as_ptr();
    moved.move_from(&mut target);
    assert_eq!(moved.as_ptr(), address);
    assert_eq!(counters.clones(), 2);

    drop(object);
    drop(copy);
    drop(target);
    drop(moved);
    assert_eq!(counters.drops(), 4);
}

#[test]
fn test_shared_handles() {
    let rc = Rc::new(String::from("rc"));
    let arc = Arc::new(String::from("arc"));
    let triomphe = triomphe::Arc::new(String::from("triomphe"));

    let mut a = RawObject::new();
    a.store_shared(Rc::clone(&rc));
    let mut b = RawObject::new();
    b.store_shared(Arc::clone(&arc));
    let mut c = RawObject::new();
    c.store_shared(triomphe.clone());

    let copies = [a.try_clone().unwrap(), b.try_clone().unwrap(), c.try_clone().unwrap()];
    assert_eq!(Rc::strong_count(&rc), 3);
    assert_eq!(Arc::strong_count(&arc), 3);
    assert_eq!(copies[2].as_ptr(), c.as_ptr());
    assert_eq!(a.stored_type_id(), Some(std::any::TypeId::of::<String>()));

    drop(rc);
    drop(arc);
    drop(triomphe);
    drop((a, b, c));

    // SAFETY: The last copies keep the targets alive.
    unsafe {
        assert_eq!(*copies[0].as_ptr().cast::<String>(), "rc");
    }
    // SAFETY: As above.
    unsafe {
        assert_eq!(*copies[1].as_ptr().cast::<String>(), "arc");
    }
    // SAFETY: As above.
    unsafe {
        assert_eq!(*copies[2].as_ptr().cast::<String>(), "triomphe");
    }
}

#[test]
fn test_stateful_callable_copies_are_independent() {
    let counter = Cell::new(0);
    let function = owned::<fn() -> i32, _>(move || {
        counter.set(counter.get() + 1);
        counter.get()
    });
    let copy = function.try_clone().unwrap();

    for _ in 0..3 {
        call::<fn() -> i32>(&function, ()).unwrap();
    }
    for _ in 0..2 {
        call::<fn() -> i32>(&copy, ()).unwrap();
    }
    assert_eq!(call::<fn() -> i32>(&function, ()), Ok(4));
    assert_eq!(call::<fn() -> i32>(&copy, ()), Ok(3));
}

struct Object {
    id: i32,
}

impl Object {
    fn sum(&self, a: i32, b: i32) -> i32 {
        self.id + a + b
    }
}

struct Accumulator {
    total: i64,
}

impl Accumulator {
    fn add(&mut self, value: i64) -> i64 {
        self.total += value;
        self.total
    }
}

#[test]
fn test_method_bound_to_shared_receiver() {
    let object = Rc::new(Object { id: 10 });
    let mut storage = RawObject::new();
    storage.store_shared(Rc::clone(&object));
    let function = method::<fn(&Object, i32, i32) -> i32, _>(Object::sum, storage);
    drop(object);

    assert_eq!(function.identity(), TypeIdentity::of::<fn(i32, i32) -> i32>());
    assert_eq!(call::<fn(i32, i32) -> i32>(&function, (3, 4)), Ok(17));

    let copy = function.try_clone().unwrap();
    drop(function);
    assert_eq!(call::<fn(i32, i32) -> i32>(&copy, (0, 0)), Ok(10));
}

#[test]
fn test_method_bound_to_borrowed_receiver() {
    let mut accumulator = Accumulator { total: 0 };
    let mut storage = RawObject::new();
    storage.store_borrowed(NonNull::from(&mut accumulator));
    let function = method::<fn(&mut Accumulator, i64) -> i64, _>(Accumulator::add, storage);

    assert_eq!(call::<fn(i64) -> i64>(&function, (2,)), Ok(2));
    assert_eq!(call::<fn(i64) -> i64>(&function, (3,)), Ok(5));
    drop(function);
    assert_eq!(accumulator.total, 5);
}

#[test]
fn test_unique_callable() {
    struct Token(i32);

    let token = Token(40);
    let mut function = unique::<fn(i32) -> i32, _>(move |value: i32| token.0 + value);
    assert_eq!(call::<fn(i32) -> i32>(&function, (2,)), Ok(42));

    let Err(error) = function.try_clone() else {
        panic!("copying a non-copyable callable succeeded");
    };
    assert!(matches!(error, Error::NonCopyableObject { .. }));

    let mut target = RawFunction::typed(TypeIdentity::of::<fn(i32) -> i32>());
    assert!(target.try_clone_from(&function).is_err());
    assert!(!target.is_bound());

    target.move_from(&mut function).unwrap();
    assert!(!function.is_bound());
    assert_eq!(call::<fn(i32) -> i32>(&target, (1,)), Ok(41));
}

#[test]
fn test_borrowed_arguments() {
    type Toggle = fn(&mut bool, bool) -> i32;

    let calls = Cell::new(0);
    let function = owned::<Toggle, _>(move |flag: &mut bool, value: bool| {
        calls.set(calls.get() + 1);
        *flag = value;
        calls.get()
    });
    let copy = function.try_clone().unwrap();

    let mut flag = false;
    assert_eq!(call::<Toggle>(&function, (&mut flag, true)), Ok(1));
    assert!(flag);
    assert_eq!(call::<Toggle>(&copy, (&mut flag, false)), Ok(1));
    assert!(!flag);
    assert_eq!(call::<Toggle>(&function, (&mut flag, true)), Ok(2));
    assert!(flag);

    let mut storage = RawObject::new();
    let prefix = Rc::new(String::from("erased-"));
    storage.store_shared(Rc::clone(&prefix));
    let starts_with = method::<fn(&String, &str) -> bool, _>(
        |prefix: &String, text: &str| text.starts_with(prefix.as_str()),
        storage,
    );
    assert_eq!(starts_with.identity(), TypeIdentity::of::<fn(&str) -> bool>());
    let text = String::from("erased-fn");
    assert_eq!(call::<fn(&str) -> bool>(&starts_with, (text.as_str(),)), Ok(true));
    assert_eq!(call::<fn(&str) -> bool>(&starts_with, ("fn",)), Ok(false));
}

#[test]
fn test_identity_consistency() {
    fn identity_of<T: 'static>(_: &T) -> TypeIdentity {
        TypeIdentity::of::<T>()
    }

    let function = owned::<fn(i32) -> i32, _>(|value: i32| value);
    assert_eq!(function.identity(), TypeIdentity::of::<fn(i32) -> i32>());
    assert_ne!(function.identity(), TypeIdentity::of::<fn(i64) -> i32>());
    assert_eq!(identity_of(&5_u32), TypeIdentity::of::<u32>());

    let mut untyped = RawFunction::new();
    assert!(untyped.identity().is_untyped());
    untyped.try_clone_from(&function).unwrap();
    assert_eq!(untyped.identity(), function.identity());
    untyped.clear();
    assert_eq!(untyped.identity(), function.identity());
}

#[test]
fn test_auto_traits() {
    static_assertions::assert_not_impl_any!(RawObject: Send, Sync);
    static_assertions::assert_not_impl_any!(RawFunction: Send, Sync);
    static_assertions::assert_impl_all!(TypeIdentity: Send, Sync, Copy);
}
