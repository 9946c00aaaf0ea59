// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The variadic call adapter.
//!
//! Wraps a plain Rust closure `f(A, B, ...) -> R` so the promise core can
//! invoke it from a flat `Vec<DynValue>`: arity is enforced, each argument
//! is extracted by the closure's static parameter type, and the result is
//! classified into "settled with value(s)", "adopt this nested promise",
//! or "the handler threw". This plays the role the original's
//! `AnyFunctionWrapper` template played over `std::any`, but as a family
//! of trait impls over small fixed-arity tuples instead of runtime
//! reflection.

use crate::error::{CoreError, Thrown};
use crate::executor::Executor;
use crate::promise::Promise;
use crate::value::{DynValue, FailKey, FromDynValue};

/// What invoking a `then`-handler produced.
pub enum HandlerResult<E: Executor> {
    /// The handler returned plain value(s); forward them.
    Settled(Vec<DynValue>),
    /// The handler returned a promise; the caller adopts it (§4.1.5).
    Adopt(Promise<E>),
    /// The handler threw.
    Thrown(Thrown),
}

/// What invoking a `fail`-handler produced. Per §9 open question 4, a
/// fail-handler's return value (besides a throw) is always discarded.
pub enum FailOutcome {
    Normal,
    Thrown(Thrown),
}

/// A then-handler, adapted from a flat argument vector.
pub trait ThenHandler<Args, E: Executor> {
    fn call(self, args: Vec<DynValue>) -> HandlerResult<E>;
}

/// A fail-handler, adapted from a flat argument vector. `Args` also
/// determines the [`FailKey`] the handler registers under.
pub trait FailHandler<Args, E: Executor> {
    fn call(self, args: Vec<DynValue>) -> FailOutcome;
    fn fail_key() -> FailKey;
}

/// The outcome of converting a then-handler's return value: either a set
/// of values to forward, or a nested promise to adopt.
pub enum SettledOrAdopt<E: Executor> {
    Settled(Vec<DynValue>),
    Adopt(Promise<E>),
}

/// Converts a concrete, infallible return type into [`SettledOrAdopt`].
/// Implemented only for a closed, finite set of concrete types (never a
/// blanket `impl<T>`), so that the separate `Result<T, Thrown>` impl of
/// [`IntoThenOutcome`] below never overlaps with this one.
pub trait IntoThenOutcomeValue<E: Executor> {
    fn into_settled(self) -> SettledOrAdopt<E>;
}

impl<E: Executor> IntoThenOutcomeValue<E> for () {
    fn into_settled(self) -> SettledOrAdopt<E> {
        SettledOrAdopt::Settled(Vec::new())
    }
}

macro_rules! impl_outcome_value_from_dyn {
    ($ty:ty) => {
        impl<E: Executor> IntoThenOutcomeValue<E> for $ty {
            fn into_settled(self) -> SettledOrAdopt<E> {
                SettledOrAdopt::Settled(vec![DynValue::from(self)])
            }
        }
    };
}

impl_outcome_value_from_dyn!(bool);
impl_outcome_value_from_dyn!(i64);
impl_outcome_value_from_dyn!(u64);
impl_outcome_value_from_dyn!(f64);
impl_outcome_value_from_dyn!(String);
impl_outcome_value_from_dyn!(Vec<u8>);
impl_outcome_value_from_dyn!(DynValue);

impl<E: Executor, A, B> IntoThenOutcomeValue<E> for (A, B)
where
    A: Into<DynValue>,
    B: Into<DynValue>,
{
    fn into_settled(self) -> SettledOrAdopt<E> {
        SettledOrAdopt::Settled(vec![self.0.into(), self.1.into()])
    }
}

impl<E: Executor> IntoThenOutcomeValue<E> for Promise<E> {
    fn into_settled(self) -> SettledOrAdopt<E> {
        SettledOrAdopt::Adopt(self)
    }
}

/// The full then-handler return classification, including the fallible
/// `Result<T, Thrown>` shape that models a handler "throwing".
pub trait IntoThenOutcome<E: Executor> {
    fn into_outcome(self) -> HandlerResult<E>;
}

impl<E: Executor, T: IntoThenOutcomeValue<E>> IntoThenOutcome<E> for T {
    fn into_outcome(self) -> HandlerResult<E> {
        match self.into_settled() {
            SettledOrAdopt::Settled(v) => HandlerResult::Settled(v),
            SettledOrAdopt::Adopt(p) => HandlerResult::Adopt(p),
        }
    }
}

impl<E: Executor, T: IntoThenOutcomeValue<E>> IntoThenOutcome<E> for Result<T, Thrown> {
    fn into_outcome(self) -> HandlerResult<E> {
        match self {
            Ok(v) => v.into_outcome(),
            Err(t) => HandlerResult::Thrown(t),
        }
    }
}

fn arity_error(index: usize, got: usize) -> Thrown {
    Thrown::from_core_error(CoreError::ArityMismatch { index, got })
}

// --- ThenHandler: arities 0..=3 ---

impl<E, F, R> ThenHandler<(), E> for F
where
    E: Executor,
    F: FnOnce() -> R,
    R: IntoThenOutcome<E>,
{
    fn call(self, _args: Vec<DynValue>) -> HandlerResult<E> {
        (self)().into_outcome()
    }
}

impl<E, F, A, R> ThenHandler<(A,), E> for F
where
    E: Executor,
    F: FnOnce(A) -> R,
    A: FromDynValue,
    R: IntoThenOutcome<E>,
{
    fn call(self, mut args: Vec<DynValue>) -> HandlerResult<E> {
        if args.is_empty() {
            return HandlerResult::Thrown(arity_error(0, 0));
        }
        let a = match A::from_dyn_value(args.remove(0)) {
            Ok(v) => v,
            Err(e) => return HandlerResult::Thrown(e.into()),
        };
        (self)(a).into_outcome()
    }
}

impl<E, F, A, B, R> ThenHandler<(A, B), E> for F
where
    E: Executor,
    F: FnOnce(A, B) -> R,
    A: FromDynValue,
    B: FromDynValue,
    R: IntoThenOutcome<E>,
{
    fn call(self, mut args: Vec<DynValue>) -> HandlerResult<E> {
        if args.len() < 2 {
            return HandlerResult::Thrown(arity_error(args.len(), args.len()));
        }
        let b = match B::from_dyn_value(args.remove(1)) {
            Ok(v) => v,
            Err(e) => return HandlerResult::Thrown(e.into()),
        };
        let a = match A::from_dyn_value(args.remove(0)) {
            Ok(v) => v,
            Err(e) => return HandlerResult::Thrown(e.into()),
        };
        (self)(a, b).into_outcome()
    }
}

impl<E, F, A, B, C, R> ThenHandler<(A, B, C), E> for F
where
    E: Executor,
    F: FnOnce(A, B, C) -> R,
    A: FromDynValue,
    B: FromDynValue,
    C: FromDynValue,
    R: IntoThenOutcome<E>,
{
    fn call(self, mut args: Vec<DynValue>) -> HandlerResult<E> {
        if args.len() < 3 {
            return HandlerResult::Thrown(arity_error(args.len(), args.len()));
        }
        let c = match C::from_dyn_value(args.remove(2)) {
            Ok(v) => v,
            Err(e) => return HandlerResult::Thrown(e.into()),
        };
        let b = match B::from_dyn_value(args.remove(1)) {
            Ok(v) => v,
            Err(e) => return HandlerResult::Thrown(e.into()),
        };
        let a = match A::from_dyn_value(args.remove(0)) {
            Ok(v) => v,
            Err(e) => return HandlerResult::Thrown(e.into()),
        };
        (self)(a, b, c).into_outcome()
    }
}

// --- FailHandler: the catch-all (arity 0) and the typed (arity 1) shapes ---

impl<E, F> FailHandler<(), E> for F
where
    E: Executor,
    F: FnOnce(),
{
    fn call(self, _args: Vec<DynValue>) -> FailOutcome {
        (self)();
        FailOutcome::Normal
    }

    fn fail_key() -> FailKey {
        FailKey::Any
    }
}

/// Marker wrapping a fallible catch-all fail-handler, so the infallible
/// `FnOnce()` and fallible `FnOnce() -> Result<(), Thrown>` shapes don't
/// collide: `Args` is `((),)` here instead of `()`.
impl<E, F> FailHandler<((),), E> for F
where
    E: Executor,
    F: FnOnce() -> Result<(), Thrown>,
{
    fn call(self, _args: Vec<DynValue>) -> FailOutcome {
        match (self)() {
            Ok(()) => FailOutcome::Normal,
            Err(t) => FailOutcome::Thrown(t),
        }
    }

    fn fail_key() -> FailKey {
        FailKey::Any
    }
}

impl<E, F, A> FailHandler<(A,), E> for F
where
    E: Executor,
    F: FnOnce(A),
    A: FromDynValue,
{
    fn call(self, mut args: Vec<DynValue>) -> FailOutcome {
        if args.is_empty() {
            return FailOutcome::Thrown(arity_error(0, 0));
        }
        match A::from_dyn_value(args.remove(0)) {
            Ok(v) => {
                (self)(v);
                FailOutcome::Normal
            }
            Err(e) => FailOutcome::Thrown(e.into()),
        }
    }

    fn fail_key() -> FailKey {
        A::fail_key()
    }
}

impl<E, F, A> FailHandler<(A, ()), E> for F
where
    E: Executor,
    F: FnOnce(A) -> Result<(), Thrown>,
    A: FromDynValue,
{
    fn call(self, mut args: Vec<DynValue>) -> FailOutcome {
        if args.is_empty() {
            return FailOutcome::Thrown(arity_error(0, 0));
        }
        match A::from_dyn_value(args.remove(0)) {
            Ok(v) => match (self)(v) {
                Ok(()) => FailOutcome::Normal,
                Err(t) => FailOutcome::Thrown(t),
            },
            Err(e) => FailOutcome::Thrown(e.into()),
        }
    }

    fn fail_key() -> FailKey {
        A::fail_key()
    }
}
