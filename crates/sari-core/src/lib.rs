// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # sari-core
//!
//! The promise state machine and its combinator library: a generic
//! deferred-result primitive supporting chaining, typed error dispatch,
//! finalization hooks, and the combinators `All`, `Any`, `Race`,
//! `AllSettled`, `Repeat` and `Deadline`, all scheduled cooperatively on a
//! single-threaded [`Executor`].
//!
//! This crate knows nothing about the reactor that drives it — `post` is
//! the entire contract — so it carries no I/O, no timers, and no sockets.
//! `sari-reactor` supplies the concrete executor and the async-mode
//! reactor-operation wrappers built on top of these promises.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod combinators;
pub mod error;
pub mod executor;
pub mod promise;
pub mod value;
pub mod variadic;

pub use error::{CoreError, Thrown};
pub use executor::Executor;
pub use promise::{Mode, Promise, Settler};
pub use value::{DynValue, Extract, ErrorCode, ErrorCodeKind, FailKey, FromDynValue};

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A trivial in-process executor for tests: `post` just appends to a
    /// queue that `drain` runs to completion. This is the test-only stand-in
    /// for `sari-reactor`'s tokio-backed executor.
    #[derive(Clone, Default)]
    struct TestExecutor {
        queue: Rc<RefCell<std::collections::VecDeque<Box<dyn FnOnce()>>>>,
    }

    impl TestExecutor {
        fn drain(&self) {
            loop {
                let task = self.queue.borrow_mut().pop_front();
                match task {
                    Some(t) => t(),
                    None => break,
                }
            }
        }
    }

    impl Executor for TestExecutor {
        fn post(&self, task: Box<dyn FnOnce()>) {
            self.queue.borrow_mut().push_back(task);
        }
    }

    #[test]
    fn resolve_then_identity_fulfills() {
        let exec = TestExecutor::default();
        let p = Promise::resolved(exec.clone(), vec![DynValue::Int(5)]);
        let out = Rc::new(RefCell::new(None));
        let out2 = out.clone();
        p.then::<(i64,), _>(move |v: i64| {
            *out2.borrow_mut() = Some(v);
        })
        .unwrap();
        exec.drain();
        assert!(p.is_fulfilled());
        assert_eq!(*out.borrow(), Some(5));
    }

    #[test]
    fn reject_fail_settles_rejected_with_empty_result() {
        let exec = TestExecutor::default();
        let p = Promise::rejected(exec.clone(), vec![DynValue::Int(7)]);
        p.fail::<(i64,), _>(|_code: i64| {}).unwrap();
        exec.drain();
        assert!(p.is_rejected());
        assert!(p.result().is_empty());
    }

    #[test]
    fn chained_then_runs_in_registration_order_and_sums() {
        let exec = TestExecutor::default();
        let p = Promise::resolved(exec.clone(), vec![DynValue::Int(2), DynValue::Int(3)]);
        p.then::<(i64, i64), _>(|x: i64, y: i64| x + y).unwrap();
        let out = Rc::new(RefCell::new(None));
        let out2 = out.clone();
        // second `then` must be registered before the first tick drains,
        // to exercise registration-order dispatch rather than settle-order.
        p.then::<(i64,), _>(move |s: i64| {
            *out2.borrow_mut() = Some(s);
        })
        .unwrap();
        exec.drain();
        assert_eq!(*out.borrow(), Some(5));
    }

    #[test]
    fn typed_fail_dispatch_falls_back_to_any() {
        let exec = TestExecutor::default();
        let p = Promise::rejected(exec.clone(), Vec::new());
        let hit = Rc::new(RefCell::new(false));
        let hit2 = hit.clone();
        p.fail::<(), _>(move || {
            *hit2.borrow_mut() = true;
        })
        .unwrap();
        exec.drain();
        assert!(*hit.borrow());
        assert!(p.is_rejected());
    }

    #[test]
    fn all_empty_fulfills_with_empty_result() {
        let exec = TestExecutor::default();
        let p = combinators::all(exec.clone(), Vec::new());
        exec.drain();
        assert!(p.is_fulfilled());
        assert!(p.result().is_empty());
    }

    #[test]
    fn all_sums_in_order() {
        let exec = TestExecutor::default();
        let p1 = Promise::resolved(exec.clone(), vec![DynValue::Int(10)]);
        let p2 = Promise::resolved(exec.clone(), vec![DynValue::Int(20)]);
        let all = combinators::all(exec.clone(), vec![p1, p2]);
        all.then::<(i64, i64), _>(|a: i64, b: i64| a + b).unwrap();
        let out = Rc::new(RefCell::new(None));
        let out2 = out.clone();
        all.then::<(i64,), _>(move |s: i64| *out2.borrow_mut() = Some(s))
            .unwrap();
        exec.drain();
        assert_eq!(*out.borrow(), Some(30));
    }

    #[test]
    fn any_fulfills_from_first_success() {
        let exec = TestExecutor::default();
        let p1 = Promise::rejected(exec.clone(), vec![DynValue::Int(1)]);
        let p2 = Promise::resolved(exec.clone(), vec![DynValue::Int(2)]);
        let any = combinators::any(exec.clone(), vec![p1, p2]);
        exec.drain();
        assert!(any.is_fulfilled());
        assert_eq!(any.result_at(0).map(|v| matches!(v, DynValue::Int(2))), Some(true));
    }

    #[test]
    fn any_empty_rejects() {
        let exec = TestExecutor::default();
        let any = combinators::any(exec.clone(), Vec::new());
        exec.drain();
        assert!(any.is_rejected());
    }

    #[test]
    fn all_settled_fulfills_once_every_input_settles() {
        let exec = TestExecutor::default();
        let p1 = Promise::resolved(exec.clone(), vec![DynValue::Int(1)]);
        let p2 = Promise::rejected(exec.clone(), vec![DynValue::Int(2)]);
        let settled = combinators::all_settled(exec.clone(), vec![p1, p2]);
        exec.drain();
        assert!(settled.is_fulfilled());
        assert_eq!(settled.result().len(), 2);
    }

    #[test]
    fn repeat_counts_down_tail_safely() {
        let exec = TestExecutor::default();
        let exec2 = exec.clone();
        let task = move |args: Vec<DynValue>| {
            let i = match args.first() {
                Some(DynValue::Int(i)) => *i,
                _ => 0,
            };
            if i < 10 {
                Promise::resolved(exec2.clone(), vec![DynValue::Bool(true), DynValue::Int(i + 1)])
            } else {
                Promise::resolved(exec2.clone(), vec![DynValue::Bool(false), DynValue::Int(i)])
            }
        };
        let p = combinators::repeat(exec.clone(), task, vec![DynValue::Int(0)]);
        exec.drain();
        assert!(p.is_fulfilled());
        assert_eq!(p.result_at(0).map(|v| matches!(v, DynValue::Int(10))), Some(true));
    }

    #[test]
    fn race_first_settler_wins() {
        let exec = TestExecutor::default();
        let p1 = Promise::rejected(exec.clone(), vec![DynValue::Int(1)]);
        let p2 = Promise::resolved(exec.clone(), vec![DynValue::Int(2)]);
        let raced = combinators::race(exec.clone(), vec![p1, p2]);
        exec.drain();
        // p1 is constructed (and thus posted) first, so it settles first.
        assert!(raced.is_rejected());
        assert_eq!(raced.result_at(0).map(|v| matches!(v, DynValue::Int(1))), Some(true));
    }

    #[test]
    fn adopted_chain_flattens() {
        let exec = TestExecutor::default();
        let inner_exec = exec.clone();
        let p = Promise::resolved(exec.clone(), vec![DynValue::Int(1)]);
        p.then::<(i64,), _>(move |v: i64| Promise::resolved(inner_exec.clone(), vec![DynValue::Int(v + 1)]))
            .unwrap();
        let out = Rc::new(RefCell::new(None));
        let out2 = out.clone();
        p.then::<(i64,), _>(move |v: i64| *out2.borrow_mut() = Some(v))
            .unwrap();
        exec.drain();
        assert_eq!(*out.borrow(), Some(2));
    }

    #[test]
    fn handler_registration_after_settle_errors() {
        let exec = TestExecutor::default();
        let p = Promise::resolved(exec.clone(), vec![DynValue::Int(1)]);
        exec.drain();
        assert!(p.then::<(i64,), _>(|_: i64| {}).is_err());
    }
}
