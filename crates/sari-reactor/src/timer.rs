// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Timer promises: the concrete reactor primitive `Deadline` races
//! against.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use sari_core::{DynValue, ErrorCode, Promise};
use tokio::task::JoinHandle;

use crate::executor::Reactor;

/// Arms a timer that rejects with [`ErrorCode::timed_out`] after
/// `duration`, returning the timer promise and a cancellation callback
/// that aborts the underlying tokio sleep task. `sari_core::combinators::deadline`
/// calls the cancellation callback once the race it's wrapped in settles.
pub fn timeout(reactor: Reactor, duration: Duration) -> (Promise<Reactor>, Box<dyn FnOnce()>) {
    let handle_slot: Rc<RefCell<Option<JoinHandle<()>>>> = Rc::new(RefCell::new(None));
    let handle_for_init = handle_slot.clone();

    let promise = Promise::new_async(reactor, move |settler| {
        let settler = settler.clone();
        let jh = tokio::task::spawn_local(async move {
            tokio::time::sleep(duration).await;
            settler.reject(vec![DynValue::from(ErrorCode::timed_out())]);
        });
        *handle_for_init.borrow_mut() = Some(jh);
    });

    let cancel = move || {
        if let Some(jh) = handle_slot.borrow_mut().take() {
            jh.abort();
        }
    };

    (promise, Box::new(cancel))
}

/// A promise that fulfills (with no result) after `duration`. The building
/// block for "wait" reactor operations that don't carry a timed-out
/// rejection semantic.
pub fn delay(reactor: Reactor, duration: Duration) -> Promise<Reactor> {
    Promise::new_async(reactor, move |settler| {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(duration).await;
            settler.resolve(Vec::new());
        });
    })
}
