#![forbid(unsafe_code)]

use crate::record::Record;
use crate::value::Key;
use std::fmt;

/// Incremental reduction callbacks.
///
/// `remove` must be the exact inverse of `add`: toggling a filter on and off again has to leave
/// every reduction where it started, without recomputing from scratch.
pub trait Reducer<V> {
    fn initial(&self) -> V;
    fn add(&self, acc: &mut V, record: &Record);
    fn remove(&self, acc: &mut V, record: &Record);
}

impl<V, R: Reducer<V> + ?Sized> Reducer<V> for Box<R> {
    fn initial(&self) -> V {
        (**self).initial()
    }

    fn add(&self, acc: &mut V, record: &Record) {
        (**self).add(acc, record)
    }

    fn remove(&self, acc: &mut V, record: &Record) {
        (**self).remove(acc, record)
    }
}

/// Adapts three closures into a [`Reducer`].
pub struct FnReducer<I, A, R> {
    initial: I,
    add: A,
    remove: R,
}

impl<I, A, R> FnReducer<I, A, R> {
    pub fn new(initial: I, add: A, remove: R) -> Self {
        Self {
            initial,
            add,
            remove,
        }
    }
}

impl<V, I, A, R> Reducer<V> for FnReducer<I, A, R>
where
    I: Fn() -> V,
    A: Fn(&mut V, &Record),
    R: Fn(&mut V, &Record),
{
    fn initial(&self) -> V {
        (self.initial)()
    }

    fn add(&self, acc: &mut V, record: &Record) {
        (self.add)(acc, record)
    }

    fn remove(&self, acc: &mut V, record: &Record) {
        (self.remove)(acc, record)
    }
}

impl<I, A, R> fmt::Debug for FnReducer<I, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReducer").finish_non_exhaustive()
    }
}

/// Counts visible records.
#[derive(Clone, Copy, Debug, Default)]
pub struct CountReducer;

impl Reducer<i64> for CountReducer {
    fn initial(&self) -> i64 {
        0
    }

    fn add(&self, acc: &mut i64, _record: &Record) {
        *acc += 1;
    }

    fn remove(&self, acc: &mut i64, _record: &Record) {
        *acc -= 1;
    }
}

/// One key's reduction within a keyed group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupEntry<V> {
    pub key: Key,
    pub value: V,
}
