// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Operation results.
//!
//! Every operation reports through its return value.  The `Ok` side carries a [`Status`], which
//! distinguishes real work from a no-op and from the two retry-later signals.  The `Err` side
//! carries an [`Error`].  Both convert to a numeric code compatible with the native platform's
//! result codes, see [`result_code`].

use crate::imp;
use std::fmt::Formatter;

/// Numeric result codes.
///
/// Negative values are failures.
pub mod result_code {
    pub const SUCCESS: i32 = 0;
    pub const NO_OP: i32 = 1;
    pub const TIMEOUT: i32 = 0x0000_0102;
    pub const NOT_READY: i32 = 0x213D_0001;
    pub const INCOMPLETE: i32 = 0x213D_0002;
    pub const TOO_MANY_OBJECTS: i32 = 0xA13D_0001_u32 as i32;
    pub const UNEXPECTED: i32 = 0x8000_FFFF_u32 as i32;
    pub const NOT_IMPLEMENTED: i32 = 0x8000_4001_u32 as i32;
    pub const FAIL: i32 = 0x8000_4005_u32 as i32;
    pub const INVALID_ARGUMENT: i32 = 0x8007_0057_u32 as i32;
    pub const OUT_OF_MEMORY: i32 = 0x8007_000E_u32 as i32;
    pub const OUT_OF_BOUNDS: i32 = 0x8000_000B_u32 as i32;
    pub const DEVICE_REMOVED: i32 = 0x887A_0005_u32 as i32;
    pub const WAIT_TIMEOUT: i32 = 0x887A_0027_u32 as i32;
}

pub fn succeeded(code: i32) -> bool {
    code >= 0
}

pub fn failed(code: i32) -> bool {
    code < 0
}

/// Display string for a result code.
pub fn result_string(code: i32) -> &'static str {
    use result_code::*;
    match code {
        SUCCESS => "OK",
        NO_OP => "False",
        TIMEOUT => "Timeout",
        NOT_READY => "Not ready",
        INCOMPLETE => "Incomplete",
        TOO_MANY_OBJECTS => "Too many objects",
        UNEXPECTED => "Unexpected",
        NOT_IMPLEMENTED => "Not implemented",
        FAIL => "Fail",
        INVALID_ARGUMENT => "Invalid argument",
        OUT_OF_MEMORY => "Out of memory",
        OUT_OF_BOUNDS => "Out of bounds",
        DEVICE_REMOVED => "Device removed",
        WAIT_TIMEOUT => "Wait timeout",
        _ => "Unknown",
    }
}

/// Non-failure outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum Status {
    /// The operation did its work.
    Success,
    /// Nothing to do, e.g. a zero-length copy or rebinding the same range.
    NoOp,
    /// The caller asked not to wait and the GPU has not caught up yet.
    NotReady,
    /// A bounded wait elapsed before the GPU caught up.
    Timeout,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Success => result_code::SUCCESS,
            Status::NoOp => result_code::NO_OP,
            Status::NotReady => result_code::NOT_READY,
            Status::Timeout => result_code::TIMEOUT,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// `NotReady` or `Timeout`: GPU work is still in flight.
    pub fn is_pending(self) -> bool {
        matches!(self, Status::NotReady | Status::Timeout)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(result_string(self.code()))
    }
}

/// Failure of the native backend, carried verbatim.
#[derive(Debug)]
pub struct NativeError(pub(crate) imp::Error);

impl NativeError {
    pub fn code(&self) -> i32 {
        self.0.code()
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}
impl std::error::Error for NativeError {}

impl From<imp::Error> for NativeError {
    fn from(value: imp::Error) -> Self {
        NativeError(value)
    }
}

/// Failure of an operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A developer-contract violation, detected before any GPU-visible side effect.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The descriptor heap is exhausted for this command list.
    #[error("Too many objects")]
    TooManyObjects,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Unexpected: {0}")]
    Unexpected(&'static str),
    #[error("Not implemented")]
    NotImplemented,
    #[error("File error: {0}")]
    File(String),
    #[error(transparent)]
    Native(#[from] NativeError),
}

impl Error {
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => result_code::INVALID_ARGUMENT,
            Error::TooManyObjects => result_code::TOO_MANY_OBJECTS,
            Error::OutOfBounds => result_code::OUT_OF_BOUNDS,
            Error::Unexpected(_) => result_code::UNEXPECTED,
            Error::NotImplemented => result_code::NOT_IMPLEMENTED,
            Error::File(_) => result_code::FAIL,
            Error::Native(native) => native.code(),
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl From<imp::Error> for Error {
    fn from(value: imp::Error) -> Self {
        Error::Native(NativeError(value))
    }
}

/// Logs a contract violation and produces the matching error.
pub(crate) fn invalid_argument(check: &'static str) -> Error {
    logwise::error_sync!("Invalid argument: {check}", check = check);
    Error::InvalidArgument(check)
}

/// Returns [`Error::InvalidArgument`] unless `condition` holds.
macro_rules! ensure_arg {
    ($condition:expr, $check:literal) => {
        if !($condition) {
            return Err($crate::status::invalid_argument($check));
        }
    };
}
pub(crate) use ensure_arg;
