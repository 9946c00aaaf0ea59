// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the promise core.

use thiserror::Error;

/// Errors raised by the promise core itself (as opposed to application
/// rejection payloads, which travel as [`crate::value::DynValue`]).
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    /// The variadic call adapter could not extract an argument at the
    /// expected type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// A handler expected more arguments than the result/rejection vector
    /// carried.
    #[error("arity mismatch: handler requires an argument at index {index}, got {got} value(s)")]
    ArityMismatch { index: usize, got: usize },

    /// `then`/`fail`/`finalize` was called on an already-settled promise.
    #[error("cannot register a handler on a promise that has already settled")]
    AlreadySettled,

    /// A then-handler returned a promise that was not Pending at the time
    /// of adoption. The specification treats this as a fatal internal
    /// error (§4.1.5).
    #[error("adopted promise was not Pending at the time of adoption")]
    AdoptionNotPending,

    /// A generic, message-carrying application error (the "exception-like
    /// value" of §7).
    #[error("{0}")]
    Generic(String),
}

impl CoreError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }
}

/// What a handler threw, carried back into the resolution/rejection
/// algorithms (§4.1.2 step 3, §4.1.3 step 4): either a typed value (routed
/// through `fail_table` dispatch) or an untyped throw (routed to the `Any`
/// catch-all only).
#[derive(Debug, Clone)]
pub enum Thrown {
    Typed(crate::value::DynValue),
    Untyped,
}

impl Thrown {
    pub fn type_mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        Thrown::Typed(crate::value::DynValue::Error(std::rc::Rc::new(
            CoreError::TypeMismatch {
                expected,
                found: found.into(),
            },
        )))
    }

    pub fn from_core_error(e: CoreError) -> Self {
        Thrown::Typed(crate::value::DynValue::Error(std::rc::Rc::new(e)))
    }
}

impl From<CoreError> for Thrown {
    fn from(e: CoreError) -> Self {
        Thrown::from_core_error(e)
    }
}
