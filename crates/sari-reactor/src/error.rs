// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the reactor-operation wrappers.

use thiserror::Error;

/// Errors raised directly by reactor wrapper code (as opposed to rejection
/// values, which travel through the promise as [`sari_core::DynValue`]).
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("name resolution failed for '{host}': {reason}")]
    Resolution { host: String, reason: String },

    #[error("no candidate endpoints left to try")]
    NoEndpoints,

    #[error("operation canceled")]
    Canceled,
}

/// Result type for reactor wrapper setup, as distinct from promise
/// rejection values.
pub type Result<T> = std::result::Result<T, ReactorError>;
