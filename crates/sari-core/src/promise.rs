// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The promise state machine: construction, resolution/rejection,
//! chaining, typed fail dispatch and finalization.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::trace;

use crate::error::{CoreError, Thrown};
use crate::executor::Executor;
use crate::value::{DynValue, FailKey};
use crate::variadic::{FailHandler, FailOutcome, HandlerResult, ThenHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Pending,
    Fulfilled,
    Rejected,
}

/// Whether `resolve`/`reject` effects are posted through the executor
/// (`Default`) or applied synchronously on the calling thread (`Async`).
/// See §4.1.1: async mode exists so reactor-completion wrappers can settle
/// immediately when the reactor signals completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Default,
    Async,
}

type ThenSlot<E> = Box<dyn FnOnce(Vec<DynValue>) -> HandlerResult<E>>;
type FailSlot = Box<dyn FnOnce(Vec<DynValue>) -> FailOutcome>;
type FinalizeSlot<E> = Box<dyn FnOnce(Promise<E>)>;

pub(crate) struct Inner<E: Executor> {
    state: State,
    result: Vec<DynValue>,
    resolve_queue: VecDeque<ThenSlot<E>>,
    fail_table: HashMap<FailKey, FailSlot>,
    finalize_queue: Vec<FinalizeSlot<E>>,
}

impl<E: Executor> Inner<E> {
    fn new() -> Self {
        Self {
            state: State::Pending,
            result: Vec::new(),
            resolve_queue: VecDeque::new(),
            fail_table: HashMap::new(),
            finalize_queue: Vec::new(),
        }
    }
}

/// A deferred result: the single central entity of this crate.
///
/// Cloning a `Promise` clones a handle (an `Rc`), not the underlying state;
/// all clones observe the same state machine.
pub struct Promise<E: Executor> {
    inner: Rc<RefCell<Inner<E>>>,
    executor: E,
}

impl<E: Executor> Clone for Promise<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            executor: self.executor.clone(),
        }
    }
}

/// The pair of callables handed to a promise's initiator.
pub struct Settler<E: Executor> {
    inner: Rc<RefCell<Inner<E>>>,
    executor: E,
    mode: Mode,
}

impl<E: Executor> Clone for Settler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            executor: self.executor.clone(),
            mode: self.mode,
        }
    }
}

impl<E: Executor> Settler<E> {
    pub fn resolve(&self, vals: Vec<DynValue>) {
        Promise::apply(self.inner.clone(), self.executor.clone(), self.mode, Effect::Resolve(vals));
    }

    pub fn reject(&self, vals: Vec<DynValue>) {
        Promise::apply(self.inner.clone(), self.executor.clone(), self.mode, Effect::Reject(vals));
    }
}

enum Effect {
    Resolve(Vec<DynValue>),
    Reject(Vec<DynValue>),
}

impl<E: Executor> Promise<E> {
    /// Construct a promise from an initiator in default mode: calls from
    /// inside `init` to the settler are posted on the executor.
    pub fn new<F>(executor: E, init: F) -> Self
    where
        F: FnOnce(Settler<E>),
    {
        Self::construct(executor, init, Mode::Default)
    }

    /// Construct a promise from an initiator in async mode: the settler's
    /// effects apply synchronously on the calling thread. Reserved for
    /// wrappers around reactor-native completions.
    pub fn new_async<F>(executor: E, init: F) -> Self
    where
        F: FnOnce(Settler<E>),
    {
        Self::construct(executor, init, Mode::Async)
    }

    fn construct<F>(executor: E, init: F, mode: Mode) -> Self
    where
        F: FnOnce(Settler<E>),
    {
        let inner = Rc::new(RefCell::new(Inner::new()));
        let settler = Settler {
            inner: inner.clone(),
            executor: executor.clone(),
            mode,
        };
        // Rust has no implicit "the initiator threw"; an initiator that can
        // fail synchronously is expected to call `settler.reject(...)`
        // itself rather than unwind. See DESIGN.md for this deviation from
        // the source's catch-around-the-initiator behavior.
        init(settler);
        Promise { inner, executor }
    }

    /// An already-armed promise that fulfills on the next tick.
    pub fn resolved(executor: E, vals: Vec<DynValue>) -> Self {
        Promise::new(executor, move |settler| settler.resolve(vals))
    }

    /// An already-armed promise that rejects on the next tick.
    pub fn rejected(executor: E, vals: Vec<DynValue>) -> Self {
        Promise::new(executor, move |settler| settler.reject(vals))
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn state_is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, State::Pending)
    }

    pub fn is_pending(&self) -> bool {
        self.state_is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self.inner.borrow().state, State::Fulfilled)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.borrow().state, State::Rejected)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The full result vector. Empty while Pending.
    pub fn result(&self) -> Vec<DynValue> {
        self.inner.borrow().result.clone()
    }

    /// A single result slot by index.
    pub fn result_at(&self, i: usize) -> Option<DynValue> {
        self.inner.borrow().result.get(i).cloned()
    }

    /// Register a then-handler. Errors if the promise has already settled.
    pub fn then<Args, H>(&self, handler: H) -> Result<(), CoreError>
    where
        H: ThenHandler<Args, E> + 'static,
        E: 'static,
    {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.state, State::Pending) {
            return Err(CoreError::AlreadySettled);
        }
        inner
            .resolve_queue
            .push_back(Box::new(move |args| handler.call(args)));
        Ok(())
    }

    /// Register a fail-handler, keyed by the static shape of its single
    /// parameter (or the catch-all if it takes none). Errors if the
    /// promise has already settled.
    pub fn fail<Args, H>(&self, handler: H) -> Result<(), CoreError>
    where
        H: FailHandler<Args, E> + 'static,
        E: 'static,
    {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.state, State::Pending) {
            return Err(CoreError::AlreadySettled);
        }
        let key = H::fail_key();
        inner
            .fail_table
            .insert(key, Box::new(move |args| handler.call(args)));
        Ok(())
    }

    /// Register a finalize-handler, invoked exactly once with the settled
    /// promise. Errors if the promise has already settled.
    pub fn finalize<F>(&self, handler: F) -> Result<(), CoreError>
    where
        F: FnOnce(Promise<E>) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.state, State::Pending) {
            return Err(CoreError::AlreadySettled);
        }
        inner.finalize_queue.push(Box::new(handler));
        Ok(())
    }

    fn apply(inner: Rc<RefCell<Inner<E>>>, executor: E, mode: Mode, effect: Effect) {
        match mode {
            Mode::Async => Self::run_effect(inner, executor, effect),
            Mode::Default => {
                executor.post(Box::new(move || Self::run_effect(inner, executor.clone(), effect)));
            }
        }
    }

    fn run_effect(inner: Rc<RefCell<Inner<E>>>, executor: E, effect: Effect) {
        match effect {
            Effect::Resolve(vals) => Self::run_resolve(inner, executor, vals),
            Effect::Reject(vals) => Self::run_reject(inner, executor, vals),
        }
    }

    /// §4.1.2: the resolution algorithm.
    fn run_resolve(inner: Rc<RefCell<Inner<E>>>, executor: E, vals: Vec<DynValue>) {
        let handler = {
            let mut state = inner.borrow_mut();
            if !matches!(state.state, State::Pending) {
                return;
            }
            match state.resolve_queue.pop_front() {
                None => {
                    state.state = State::Fulfilled;
                    state.result = vals;
                    drop(state);
                    Self::run_finalizers(inner, executor);
                    return;
                }
                Some(h) => h,
            }
        };

        match handler(vals) {
            HandlerResult::Settled(new_vals) => {
                let queue_empty = inner.borrow().resolve_queue.is_empty();
                if queue_empty {
                    let mut state = inner.borrow_mut();
                    if matches!(state.state, State::Pending) {
                        state.state = State::Fulfilled;
                        state.result = new_vals;
                    }
                    drop(state);
                    Self::run_finalizers(inner, executor);
                } else {
                    let wrapped = Promise::resolved(executor.clone(), new_vals);
                    Self::adopt(inner, executor, wrapped);
                }
            }
            HandlerResult::Adopt(q) => Self::adopt(inner, executor, q),
            HandlerResult::Thrown(Thrown::Typed(v)) => Self::run_reject(inner, executor, vec![v]),
            HandlerResult::Thrown(Thrown::Untyped) => Self::run_reject(inner, executor, vec![]),
        }
    }

    /// §4.1.3: the rejection algorithm.
    fn run_reject(inner: Rc<RefCell<Inner<E>>>, executor: E, vals: Vec<DynValue>) {
        let dispatch = {
            let mut state = inner.borrow_mut();
            if !matches!(state.state, State::Pending) {
                return;
            }
            state.resolve_queue.clear();

            let specific_key = vals.first().map(|v| v.fail_key());
            if let Some(key) = specific_key {
                if let Some(h) = state.fail_table.remove(&key) {
                    Some((h, vals))
                } else if let Some(h) = state.fail_table.remove(&FailKey::Any) {
                    Some((h, Vec::new()))
                } else {
                    None
                }
            } else if let Some(h) = state.fail_table.remove(&FailKey::Any) {
                Some((h, Vec::new()))
            } else {
                None
            }
        };

        let Some((handler, args)) = dispatch else {
            let mut state = inner.borrow_mut();
            state.state = State::Rejected;
            state.result = vals;
            drop(state);
            Self::run_finalizers(inner, executor);
            return;
        };

        let result = match handler(args) {
            FailOutcome::Normal => Vec::new(),
            FailOutcome::Thrown(Thrown::Typed(v)) => vec![v],
            FailOutcome::Thrown(Thrown::Untyped) => Vec::new(),
        };
        let mut state = inner.borrow_mut();
        state.state = State::Rejected;
        state.result = result;
        drop(state);
        Self::run_finalizers(inner, executor);
    }

    fn run_finalizers(inner: Rc<RefCell<Inner<E>>>, executor: E) {
        let handlers = std::mem::take(&mut inner.borrow_mut().finalize_queue);
        let settled = Promise {
            inner: inner.clone(),
            executor,
        };
        for h in handlers {
            h(settled.clone());
        }
    }

    /// §4.1.5: nested promise adoption. `q` must be Pending at the time of
    /// adoption (a violation is a fatal internal error, matching the
    /// specification's stated assertion).
    fn adopt(inner: Rc<RefCell<Inner<E>>>, executor: E, q: Promise<E>) {
        assert!(
            q.is_pending(),
            "sari-core: adopted promise was not Pending at the time of adoption"
        );
        trace!("adopting nested promise");
        let outer_inner = inner;
        let outer_exec = executor;
        q.finalize(move |settled| {
            let vals = settled.result();
            let fulfilled = settled.is_fulfilled();
            let inner2 = outer_inner.clone();
            let exec2 = outer_exec.clone();
            // Ordering guarantee (§5): the outer continuation runs in a new
            // executor task, never inline from the adopted promise's own
            // finalize dispatch.
            outer_exec.post(Box::new(move || {
                if fulfilled {
                    Promise::run_resolve(inner2, exec2, vals);
                } else {
                    Promise::run_reject(inner2, exec2, vals);
                }
            }));
        })
        .expect("freshly constructed adopted promise cannot have settled yet");
    }
}
