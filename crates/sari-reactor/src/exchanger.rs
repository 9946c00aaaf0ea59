// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The Exchanger: a producer/consumer rendezvous built on promises (§4.3).
//!
//! The source holds pending wait entries in an intrusive doubly-linked
//! list for O(1) removal and destructor-triggered cancellation. In safe
//! Rust, this crate instead uses the same lazy-flagged-removal idiom the
//! teacher's own event loop already uses for cancelled timers
//! (`EventLoop::clear_timer`/`tick`'s `CancelTimer` handling): a
//! cancelled entry is marked and skipped over the next time its waitlist
//! is popped, rather than spliced out of a linked list immediately.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use sari_core::{DynValue, ErrorCode, Promise, Settler};

use crate::executor::Reactor;

struct WaitEntry {
    cancelled: Cell<bool>,
    matched: Cell<bool>,
    settler: Settler<Reactor>,
    vals: RefCell<Option<Vec<DynValue>>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Consumer,
    Producer,
}

struct ExchangerInner {
    consumers: VecDeque<Rc<WaitEntry>>,
    producers: VecDeque<Rc<WaitEntry>>,
}

impl Drop for ExchangerInner {
    fn drop(&mut self) {
        for entry in self.consumers.drain(..).chain(self.producers.drain(..)) {
            if !entry.cancelled.get() && !entry.matched.get() {
                entry.settler.reject(vec![DynValue::from(ErrorCode::canceled())]);
            }
        }
    }
}

/// A producer/consumer rendezvous point. Cloning shares the same waitlists;
/// the last clone to drop rejects every entry still pending.
#[derive(Clone)]
pub struct Exchanger {
    inner: Rc<RefCell<ExchangerInner>>,
    reactor: Reactor,
}

/// A cancellable ticket representing one pending side of a rendezvous.
#[derive(Clone)]
pub struct Transaction {
    entry: Rc<WaitEntry>,
}

impl Transaction {
    /// Detaches this entry so a future rendezvous can no longer match it.
    /// A no-op if the transaction already matched or was already
    /// cancelled.
    pub fn cancel(&self) {
        self.entry.cancelled.set(true);
    }

    /// Whether this side is still waiting (not yet matched, not
    /// cancelled).
    pub fn is_pending(&self) -> bool {
        !self.entry.cancelled.get() && !self.entry.matched.get()
    }
}

impl Exchanger {
    pub fn new(reactor: Reactor) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ExchangerInner {
                consumers: VecDeque::new(),
                producers: VecDeque::new(),
            })),
            reactor,
        }
    }

    /// The consumer side of a rendezvous: offers `vals` and waits for a
    /// producer.
    pub fn async_consume(&self, vals: Vec<DynValue>) -> (Promise<Reactor>, Transaction) {
        self.exchange(Side::Consumer, vals)
    }

    /// The producer side of a rendezvous: offers `vals` and waits for a
    /// consumer.
    pub fn async_produce(&self, vals: Vec<DynValue>) -> (Promise<Reactor>, Transaction) {
        self.exchange(Side::Producer, vals)
    }

    fn exchange(&self, side: Side, vals: Vec<DynValue>) -> (Promise<Reactor>, Transaction) {
        if let Some(counterpart) = self.pop_counterpart(side) {
            counterpart.matched.set(true);
            let their_vals = counterpart.vals.borrow_mut().take().unwrap_or_default();
            counterpart.settler.resolve(vals);

            let promise = Promise::new_async(self.reactor, move |settler| {
                settler.resolve(their_vals);
            });
            let already_matched = Rc::new(WaitEntry {
                cancelled: Cell::new(true),
                matched: Cell::new(true),
                settler: counterpart.settler.clone(),
                vals: RefCell::new(None),
            });
            return (promise, Transaction { entry: already_matched });
        }

        let settler_slot: Rc<RefCell<Option<Settler<Reactor>>>> = Rc::new(RefCell::new(None));
        let settler_slot_init = settler_slot.clone();
        let promise = Promise::new_async(self.reactor, move |settler| {
            *settler_slot_init.borrow_mut() = Some(settler);
        });
        let settler = settler_slot
            .borrow_mut()
            .take()
            .expect("async-mode initiator runs synchronously during construction");

        let entry = Rc::new(WaitEntry {
            cancelled: Cell::new(false),
            matched: Cell::new(false),
            settler,
            vals: RefCell::new(Some(vals)),
        });
        self.push_waiting(side, entry.clone());
        (promise, Transaction { entry })
    }

    fn pop_counterpart(&self, side: Side) -> Option<Rc<WaitEntry>> {
        let mut inner = self.inner.borrow_mut();
        let list = match side {
            Side::Consumer => &mut inner.producers,
            Side::Producer => &mut inner.consumers,
        };
        loop {
            match list.pop_front() {
                None => return None,
                Some(entry) if entry.cancelled.get() => continue,
                Some(entry) => return Some(entry),
            }
        }
    }

    fn push_waiting(&self, side: Side, entry: Rc<WaitEntry>) {
        let mut inner = self.inner.borrow_mut();
        match side {
            Side::Consumer => inner.consumers.push_back(entry),
            Side::Producer => inner.producers.push_back(entry),
        }
    }
}
