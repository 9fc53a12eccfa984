use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::float::Float;
use crate::index::IndexManager;

use super::Tape;

// Active tape per tape type. A null entry means the tape is currently
// lent out to a `with_active_tape` call.
thread_local! {
    static ACTIVE_TAPES: RefCell<HashMap<TypeId, *mut ()>> = RefCell::new(HashMap::new());
}

fn replace_active(key: TypeId, ptr: Option<*mut ()>) -> Option<*mut ()> {
    ACTIVE_TAPES.with(|tapes| {
        let mut tapes = tapes.borrow_mut();
        match ptr {
            Some(ptr) => tapes.insert(key, ptr),
            None => tapes.remove(&key),
        }
    })
}

/// Access the active tape of type `Tape<F, I>` for the current thread.
///
/// Panics if no tape of that type is active, or if it is already borrowed
/// by an enclosing call.
pub fn with_active_tape<F: Float, I: IndexManager, R>(
    f: impl FnOnce(&mut Tape<F, I>) -> R,
) -> R {
    let key = TypeId::of::<Tape<F, I>>();
    let ptr = match replace_active(key, Some(std::ptr::null_mut())) {
        Some(ptr) if !ptr.is_null() => ptr,
        Some(_) => panic!("active tape is already borrowed on this thread"),
        None => {
            replace_active(key, None);
            panic!("no active tape on this thread; create a TapeGuard first")
        }
    };

    // Puts the pointer back even if `f` panics.
    struct Lend(TypeId, *mut ());
    impl Drop for Lend {
        fn drop(&mut self) {
            replace_active(self.0, Some(self.1));
        }
    }
    let _lend = Lend(key, ptr);

    // SAFETY: the pointer was registered by a live `TapeGuard`, which holds
    // the tape's unique borrow for its whole lifetime. The map entry is null
    // while the reference below exists, so no second reference can be made.
    let tape = unsafe { &mut *(ptr as *mut Tape<F, I>) };
    f(tape)
}

/// RAII guard that makes a tape the thread-local active tape of its type
/// and restores the previous one on drop.
pub struct TapeGuard<'a, F: Float, I: IndexManager> {
    prev: Option<*mut ()>,
    _tape: PhantomData<&'a mut Tape<F, I>>,
}

impl<'a, F: Float, I: IndexManager> TapeGuard<'a, F, I> {
    /// Activate `tape` for the current thread until the guard is dropped.
    pub fn new(tape: &'a mut Tape<F, I>) -> Self {
        let ptr = tape as *mut Tape<F, I> as *mut ();
        let prev = replace_active(TypeId::of::<Tape<F, I>>(), Some(ptr));
        log::debug!("activated thread-local tape");
        TapeGuard {
            prev,
            _tape: PhantomData,
        }
    }
}

impl<'a, F: Float, I: IndexManager> Drop for TapeGuard<'a, F, I> {
    fn drop(&mut self) {
        replace_active(TypeId::of::<Tape<F, I>>(), self.prev);
    }
}
