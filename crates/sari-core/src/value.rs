// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The dynamic value carrier and the typed-dispatch key derived from it.
//!
//! Handler signatures inside the promise core are uniform: every resolved
//! or rejected value travels as an ordered `Vec<DynValue>`. This is the
//! statically-typed stand-in for the type-erased `std::any` payload the
//! original library passed around; rather than runtime reflection over an
//! open set of types, [`DynValue`] is a closed tagged sum of the value
//! shapes this crate's handlers actually produce, plus an `Other` escape
//! hatch for application-defined payloads that still need typed `fail`
//! routing.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::error::CoreError;

/// A single value of statically-unknown type flowing through a promise's
/// result or rejection slot.
#[derive(Clone)]
pub enum DynValue {
    /// No payload.
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// A platform error code, e.g. one surfaced by a reactor operation.
    Code(Rc<ErrorCode>),
    /// A caught error, e.g. one produced by a throwing handler.
    Error(Rc<CoreError>),
    /// An application-defined payload that doesn't fit the above shapes.
    Other(Rc<dyn Any>),
}

impl fmt::Debug for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynValue::Unit => write!(f, "Unit"),
            DynValue::Bool(b) => write!(f, "Bool({b})"),
            DynValue::Int(i) => write!(f, "Int({i})"),
            DynValue::UInt(i) => write!(f, "UInt({i})"),
            DynValue::Float(v) => write!(f, "Float({v})"),
            DynValue::Str(s) => write!(f, "Str({s:?})"),
            DynValue::Bytes(b) => write!(f, "Bytes[{}]", b.len()),
            DynValue::Code(c) => write!(f, "Code({c:?})"),
            DynValue::Error(e) => write!(f, "Error({e})"),
            DynValue::Other(_) => write!(f, "Other(..)"),
        }
    }
}

/// The taxonomy of platform/reactor error codes, per §7 of the rejection
/// value taxonomy: "platform error code ... carries category + numeric
/// code + message". `TimedOut` is the canonical deadline rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCodeKind {
    TimedOut,
    Io(std::io::ErrorKind),
    Canceled,
    Custom(&'static str),
}

#[derive(Debug, Clone)]
pub struct ErrorCode {
    pub kind: ErrorCodeKind,
    pub message: String,
}

impl ErrorCode {
    pub fn new(kind: ErrorCodeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self::new(ErrorCodeKind::TimedOut, "operation timed out")
    }

    pub fn canceled() -> Self {
        Self::new(ErrorCodeKind::Canceled, "operation canceled")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorCode {}

/// The key a `fail` handler is registered under: either the static shape of
/// its single parameter, or [`FailKey::Any`] for a no-arg catch-all.
///
/// This mirrors the original's `std::type_index(typeid(...))` dispatch
/// table, replacing runtime reflection with this crate's closed value
/// taxonomy (plus `TypeId` for the `Other` escape hatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailKey {
    Any,
    Bool,
    Int,
    UInt,
    Float,
    Str,
    Bytes,
    Code,
    Error,
    Other(TypeId),
}

impl DynValue {
    /// The `FailKey` this value would be dispatched under.
    pub fn fail_key(&self) -> FailKey {
        match self {
            DynValue::Unit => FailKey::Any,
            DynValue::Bool(_) => FailKey::Bool,
            DynValue::Int(_) => FailKey::Int,
            DynValue::UInt(_) => FailKey::UInt,
            DynValue::Float(_) => FailKey::Float,
            DynValue::Str(_) => FailKey::Str,
            DynValue::Bytes(_) => FailKey::Bytes,
            DynValue::Code(_) => FailKey::Code,
            DynValue::Error(_) => FailKey::Error,
            DynValue::Other(v) => FailKey::Other((**v).type_id()),
        }
    }
}

macro_rules! impl_into_dyn_value {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for DynValue {
            fn from(v: $ty) -> Self {
                DynValue::$variant(v)
            }
        }
    };
}

impl_into_dyn_value!(bool, Bool);
impl_into_dyn_value!(i64, Int);
impl_into_dyn_value!(u64, UInt);
impl_into_dyn_value!(f64, Float);
impl_into_dyn_value!(String, Str);
impl_into_dyn_value!(Vec<u8>, Bytes);

impl From<()> for DynValue {
    fn from(_: ()) -> Self {
        DynValue::Unit
    }
}

impl From<&str> for DynValue {
    fn from(v: &str) -> Self {
        DynValue::Str(v.to_owned())
    }
}

impl From<Rc<ErrorCode>> for DynValue {
    fn from(v: Rc<ErrorCode>) -> Self {
        DynValue::Code(v)
    }
}

impl From<ErrorCode> for DynValue {
    fn from(v: ErrorCode) -> Self {
        DynValue::Code(Rc::new(v))
    }
}

/// A typed payload wrapper used to round-trip application-defined types
/// through the `Other` escape hatch without widening [`DynValue`]'s closed
/// variant set.
pub struct Extract<T>(pub Rc<T>);

impl<T: Any> From<Extract<T>> for DynValue {
    fn from(v: Extract<T>) -> Self {
        DynValue::Other(v.0 as Rc<dyn Any>)
    }
}

/// Extracts a typed argument from a [`DynValue`] by the wrapped function's
/// static parameter type, the Rust analogue of the variadic call adapter's
/// "extract each argument by the static parameter type" step.
pub trait FromDynValue: Sized {
    fn from_dyn_value(v: DynValue) -> Result<Self, CoreError>;
    fn fail_key() -> FailKey;
}

macro_rules! impl_from_dyn_value {
    ($ty:ty, $variant:ident, $key:ident) => {
        impl FromDynValue for $ty {
            fn from_dyn_value(v: DynValue) -> Result<Self, CoreError> {
                match v {
                    DynValue::$variant(x) => Ok(x),
                    other => Err(CoreError::TypeMismatch {
                        expected: stringify!($ty),
                        found: format!("{other:?}"),
                    }),
                }
            }
            fn fail_key() -> FailKey {
                FailKey::$key
            }
        }
    };
}

impl_from_dyn_value!(bool, Bool, Bool);
impl_from_dyn_value!(i64, Int, Int);
impl_from_dyn_value!(u64, UInt, UInt);
impl_from_dyn_value!(f64, Float, Float);
impl_from_dyn_value!(String, Str, Str);
impl_from_dyn_value!(Vec<u8>, Bytes, Bytes);

impl FromDynValue for Rc<ErrorCode> {
    fn from_dyn_value(v: DynValue) -> Result<Self, CoreError> {
        match v {
            DynValue::Code(c) => Ok(c),
            other => Err(CoreError::TypeMismatch {
                expected: "ErrorCode",
                found: format!("{other:?}"),
            }),
        }
    }
    fn fail_key() -> FailKey {
        FailKey::Code
    }
}

impl FromDynValue for Rc<CoreError> {
    fn from_dyn_value(v: DynValue) -> Result<Self, CoreError> {
        match v {
            DynValue::Error(e) => Ok(e),
            other => Err(CoreError::TypeMismatch {
                expected: "CoreError",
                found: format!("{other:?}"),
            }),
        }
    }
    fn fail_key() -> FailKey {
        FailKey::Error
    }
}

impl FromDynValue for DynValue {
    fn from_dyn_value(v: DynValue) -> Result<Self, CoreError> {
        Ok(v)
    }
    fn fail_key() -> FailKey {
        // A handler generic over DynValue itself can't be keyed by shape;
        // such handlers should register as the `Any` catch-all.
        FailKey::Any
    }
}

impl<T: Any + 'static> FromDynValue for Extract<T> {
    fn from_dyn_value(v: DynValue) -> Result<Self, CoreError> {
        match v {
            DynValue::Other(rc) => Rc::downcast::<T>(rc)
                .map(Extract)
                .map_err(|_| CoreError::TypeMismatch {
                    expected: "Other(..)",
                    found: "Other(<mismatched type>)".to_string(),
                }),
            other => Err(CoreError::TypeMismatch {
                expected: "Other(..)",
                found: format!("{other:?}"),
            }),
        }
    }
    fn fail_key() -> FailKey {
        FailKey::Other(TypeId::of::<T>())
    }
}
