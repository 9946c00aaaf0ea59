// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Combinators built on top of [`Promise`]: `All`, `Any`, `Race`,
//! `AllSettled`, `Repeat`, and `Deadline`.
//!
//! All of these are constructed in async mode (§4.2) and complete via the
//! input promises' `finalize` hooks rather than their own `then` chains,
//! the same "Group" bookkeeping pattern the source used: a shared
//! countdown, a result buffer, and the outer promise's settle handles.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::executor::Executor;
use crate::promise::Promise;
use crate::value::DynValue;

/// `All(ps)`: fulfills when every input fulfills (or the input is empty),
/// with the concatenation of every `result()` in input order. Rejects as
/// soon as any input rejects, with that promise's `result()`.
pub fn all<E: Executor>(executor: E, ps: Vec<Promise<E>>) -> Promise<E> {
    let n = ps.len();
    Promise::new_async(executor, move |settler| {
        if n == 0 {
            settler.resolve(Vec::new());
            return;
        }
        let remaining = Rc::new(Cell::new(n));
        let results = Rc::new(RefCell::new(vec![Vec::new(); n]));
        let done = Rc::new(Cell::new(false));
        for (i, p) in ps.into_iter().enumerate() {
            let settler = settler.clone();
            let remaining = remaining.clone();
            let results = results.clone();
            let done = done.clone();
            p.finalize(move |settled| {
                if done.get() {
                    return;
                }
                if settled.is_fulfilled() {
                    results.borrow_mut()[i] = settled.result();
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        done.set(true);
                        let flat = results.borrow_mut().drain(..).flatten().collect();
                        settler.resolve(flat);
                    }
                } else {
                    done.set(true);
                    settler.reject(settled.result());
                }
            })
            .expect("freshly observed promise cannot have settled yet");
        }
    })
}

/// `Any(ps)`: fulfills with the first fulfilling promise's result. Rejects
/// (or, for empty input, rejects immediately per the table in §4.2) only
/// once every input has rejected, with the concatenation of every
/// rejection in input order.
pub fn any<E: Executor>(executor: E, ps: Vec<Promise<E>>) -> Promise<E> {
    let n = ps.len();
    Promise::new_async(executor, move |settler| {
        if n == 0 {
            settler.reject(Vec::new());
            return;
        }
        let remaining = Rc::new(Cell::new(n));
        let errors = Rc::new(RefCell::new(vec![Vec::new(); n]));
        let done = Rc::new(Cell::new(false));
        for (i, p) in ps.into_iter().enumerate() {
            let settler = settler.clone();
            let remaining = remaining.clone();
            let errors = errors.clone();
            let done = done.clone();
            p.finalize(move |settled| {
                if done.get() {
                    return;
                }
                if settled.is_fulfilled() {
                    done.set(true);
                    settler.resolve(settled.result());
                } else {
                    errors.borrow_mut()[i] = settled.result();
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        done.set(true);
                        let flat = errors.borrow_mut().drain(..).flatten().collect();
                        settler.reject(flat);
                    }
                }
            })
            .expect("freshly observed promise cannot have settled yet");
        }
    })
}

/// `Race(ps)`: settles with the first promise to settle, fulfilled or
/// rejected, ties broken by input order. Never settles on empty input.
pub fn race<E: Executor>(executor: E, ps: Vec<Promise<E>>) -> Promise<E> {
    Promise::new_async(executor, move |settler| {
        let done = Rc::new(Cell::new(false));
        for p in ps {
            let settler = settler.clone();
            let done = done.clone();
            p.finalize(move |settled| {
                if done.replace(true) {
                    return;
                }
                if settled.is_fulfilled() {
                    settler.resolve(settled.result());
                } else {
                    settler.reject(settled.result());
                }
            })
            .expect("freshly observed promise cannot have settled yet");
        }
    })
}

/// `AllSettled(ps)`: fulfills once every input has settled (or the input
/// is empty), with a vector of the settled promise handles, one per
/// input, in order. Never rejects.
pub fn all_settled<E: Executor>(executor: E, ps: Vec<Promise<E>>) -> Promise<E> {
    let n = ps.len();
    Promise::new_async(executor, move |settler| {
        if n == 0 {
            settler.resolve(Vec::new());
            return;
        }
        let remaining = Rc::new(Cell::new(n));
        let handles: Rc<RefCell<Vec<Option<Promise<E>>>>> = Rc::new(RefCell::new(vec![None; n]));
        for (i, p) in ps.into_iter().enumerate() {
            let settler = settler.clone();
            let remaining = remaining.clone();
            let handles = handles.clone();
            p.finalize(move |settled| {
                handles.borrow_mut()[i] = Some(settled);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let out = handles
                        .borrow_mut()
                        .drain(..)
                        .map(|h| {
                            let h = h.expect("every slot filled once remaining reaches 0");
                            DynValue::Other(Rc::new(h) as Rc<dyn Any>)
                        })
                        .collect();
                    settler.resolve(out);
                }
            })
            .expect("freshly observed promise cannot have settled yet");
        }
    })
}

/// `Repeat(executor, task, initial_args)`: invokes `task(args)`, adopts
/// the returned promise `Q`. When `Q` rejects, the rejection propagates.
/// When `Q` fulfills, inspects `Q.result()[0]`: a `true` boolean or
/// nonzero integer continues the loop with the remaining result elements;
/// anything else resolves the outer promise with `Q.result()` unchanged.
///
/// Each iteration is a freshly posted executor task (never a direct Rust
/// call stacked on the previous iteration), so an arbitrarily long loop
/// uses O(1) native stack.
pub fn repeat<E, T>(executor: E, task: T, initial_args: Vec<DynValue>) -> Promise<E>
where
    E: Executor,
    T: Fn(Vec<DynValue>) -> Promise<E> + 'static,
{
    let task = Rc::new(task);
    Promise::new_async(executor.clone(), move |settler| {
        repeat_step(executor, task, initial_args, settler);
    })
}

fn repeat_step<E, T>(
    executor: E,
    task: Rc<T>,
    args: Vec<DynValue>,
    settler: crate::promise::Settler<E>,
) where
    E: Executor,
    T: Fn(Vec<DynValue>) -> Promise<E> + 'static,
{
    let q = (task)(args);
    let next_executor = executor.clone();
    let next_task = task.clone();
    let next_settler = settler.clone();
    q.finalize(move |settled| {
        if settled.is_rejected() {
            next_settler.reject(settled.result());
            return;
        }
        let mut result = settled.result();
        let continues = match result.first() {
            Some(DynValue::Bool(b)) => *b,
            Some(DynValue::Int(i)) => *i != 0,
            Some(DynValue::UInt(i)) => *i != 0,
            _ => false,
        };
        if continues {
            result.remove(0);
            let executor2 = next_executor.clone();
            let task2 = next_task.clone();
            let settler2 = next_settler.clone();
            next_executor.post(Box::new(move || {
                repeat_step(executor2, task2, result, settler2);
            }));
        } else {
            next_settler.resolve(result);
        }
    })
    .expect("freshly observed promise cannot have settled yet");
}

/// `Deadline(p, timer)`: races `p` against an already-armed `timer`
/// promise (expected to reject with a timed-out error code after some
/// duration), and invokes `cancel_timer` exactly once the race settles.
///
/// Per §9 open question 2, the cleanup hook attaches to the outer race
/// promise, not the inner timer: the source attaches to the inner, which
/// can fire the cleanup before the race has observed the timer's result.
pub fn deadline<E: Executor>(
    executor: E,
    p: Promise<E>,
    timer: Promise<E>,
    cancel_timer: impl FnOnce() + 'static,
) -> Promise<E> {
    let raced = race(executor, vec![p, timer]);
    let cancel_timer = RefCell::new(Some(cancel_timer));
    raced
        .finalize(move |_settled| {
            if let Some(cancel) = cancel_timer.borrow_mut().take() {
                cancel();
            }
        })
        .expect("freshly constructed race promise cannot have settled yet");
    raced
}
