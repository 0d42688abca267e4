// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::soft::{Error, KernelLibrary};

#[derive(Debug)]
pub(crate) struct EntryPoint {
    pub(super) kernels: KernelLibrary,
}

impl EntryPoint {
    pub(crate) async fn new() -> Result<Self, Error> {
        Ok(EntryPoint { kernels: KernelLibrary::default() })
    }

    pub(crate) fn kernels(&self) -> &KernelLibrary {
        &self.kernels
    }
}
