// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::status::result_code;
use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// The queue thread is gone.
    DeviceRemoved,
    OutOfMemory { size: usize },
    UnknownKernel(String),
    InvalidBytecode,
    SpawnQueue(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn code(&self) -> i32 {
        match self {
            Error::DeviceRemoved => result_code::DEVICE_REMOVED,
            Error::OutOfMemory { .. } => result_code::OUT_OF_MEMORY,
            Error::UnknownKernel(_) | Error::InvalidBytecode => result_code::INVALID_ARGUMENT,
            Error::SpawnQueue(_) => result_code::FAIL,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DeviceRemoved => write!(f, "Device removed"),
            Error::OutOfMemory { size } => write!(f, "Out of memory allocating {} bytes", size),
            Error::UnknownKernel(name) => write!(f, "No kernel named {:?}", name),
            Error::InvalidBytecode => write!(f, "Bytecode was not produced by the kernel library"),
            Error::SpawnQueue(e) => write!(f, "Can't spawn queue thread: {}", e),
        }
    }
}
