// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Compute kernels run by the software queue.
//!
//! Shader compilation happens outside this crate.  In the software backend a "compiled
//! shader" is a Rust closure registered in a [`KernelLibrary`]; the bytecode handed to the
//! device names the closure.  The queue thread invokes the kernel once per dispatched thread,
//! with the views bound at dispatch time.

use crate::format::{self, Format};
use crate::imp::soft::descriptor::{ElementLayout, View, ViewKind};
use crate::imp::soft::{Error, Resource};
use std::collections::HashMap;
use std::sync::Arc;

const BYTECODE_MAGIC: &[u8; 8] = b"SOFTKRNL";

/// A compute shader body.
///
/// Implemented for every `Fn(&KernelContext, [u32; 3])`.  The second argument is the
/// dispatch thread id: group id times thread-group size plus the id within the group.
pub trait Kernel: Send + Sync + 'static {
    fn run(&self, context: &KernelContext<'_>, thread_id: [u32; 3]);
}

impl<F> Kernel for F
where
    F: Fn(&KernelContext<'_>, [u32; 3]) + Send + Sync + 'static,
{
    fn run(&self, context: &KernelContext<'_>, thread_id: [u32; 3]) {
        self(context, thread_id)
    }
}

/// Kernels known to an entry point and every device it creates.
#[derive(Clone, Default)]
pub(crate) struct KernelLibrary {
    kernels: Arc<wasm_safe_mutex::Mutex<HashMap<String, Arc<dyn Kernel>>>>,
}

impl std::fmt::Debug for KernelLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelLibrary").field("kernels", &self.kernels.lock_sync().len()).finish()
    }
}

impl KernelLibrary {
    /// Registers `kernel` under `name`, replacing any previous kernel of that name, and
    /// returns the bytecode that refers to it.
    pub(crate) fn register(&self, name: &str, kernel: Arc<dyn Kernel>) -> Vec<u8> {
        self.kernels.lock_sync().insert(name.to_string(), kernel);
        let mut bytecode = BYTECODE_MAGIC.to_vec();
        bytecode.extend_from_slice(name.as_bytes());
        bytecode
    }

    pub(crate) fn lookup(&self, bytecode: &[u8]) -> Result<Arc<dyn Kernel>, Error> {
        let name = bytecode
            .strip_prefix(BYTECODE_MAGIC.as_slice())
            .and_then(|name| std::str::from_utf8(name).ok())
            .ok_or(Error::InvalidBytecode)?;
        self.kernels
            .lock_sync()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownKernel(name.to_string()))
    }
}

/// Views visible to a running kernel.
pub struct KernelContext<'a> {
    pub(crate) constants: &'a [View],
    pub(crate) read_only: &'a [View],
    pub(crate) read_write: &'a [View],
    pub(crate) group_count: [u32; 3],
    pub(crate) group_size: [u32; 3],
}

impl<'a> KernelContext<'a> {
    /// Constant buffer bound to `slot`.
    pub fn constant(&self, slot: u32) -> BufferView<'a> {
        BufferView::new(self.constants.get(slot as usize))
    }

    /// Read-only buffer bound to `slot`.
    pub fn read(&self, slot: u32) -> BufferView<'a> {
        BufferView::new(self.read_only.get(slot as usize))
    }

    /// Read-write buffer bound to `slot`.
    pub fn read_write(&self, slot: u32) -> BufferView<'a> {
        BufferView::new(self.read_write.get(slot as usize))
    }

    pub fn group_count(&self) -> [u32; 3] {
        self.group_count
    }

    pub fn group_size(&self) -> [u32; 3] {
        self.group_size
    }
}

/// A bound buffer as a kernel sees it.
///
/// Typed views address elements and convert through the element format.  Structured,
/// byte-address and constant views address 32-bit words.  Null views read zero and drop
/// writes, and so does out-of-range access.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    resource: Option<&'a Resource>,
    layout: ElementLayout,
    byte_offset: usize,
    byte_len: usize,
    writable: bool,
}

impl<'a> BufferView<'a> {
    fn new(view: Option<&'a View>) -> Self {
        match view {
            Some(view) => BufferView {
                resource: view.resource.as_ref(),
                layout: view.layout,
                byte_offset: view.byte_offset,
                byte_len: view.byte_len,
                writable: view.kind == ViewKind::UnorderedAccess,
            },
            None => BufferView { resource: None, layout: ElementLayout::Raw, byte_offset: 0, byte_len: 0, writable: false },
        }
    }

    pub fn is_null(&self) -> bool {
        self.resource.is_none()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Number of addressable units: elements for typed views, words otherwise.
    pub fn len(&self) -> usize {
        self.byte_len / self.unit()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unit(&self) -> usize {
        match self.layout {
            ElementLayout::Typed(format) => format.element_size().max(1),
            ElementLayout::Structured { .. } | ElementLayout::Raw => 4,
        }
    }

    fn typed_format(&self) -> Option<Format> {
        match self.layout {
            ElementLayout::Typed(format) => Some(format),
            _ => None,
        }
    }

    fn unit_offset(&self, index: usize) -> Option<usize> {
        let unit = self.unit();
        let relative = index.checked_mul(unit)?;
        if relative.checked_add(unit)? > self.byte_len {
            return None;
        }
        Some(self.byte_offset + relative)
    }

    /// All components of element `index`.  Non-typed views return the word in component 0.
    pub fn load_element(&self, index: usize) -> [u32; 4] {
        let (Some(resource), Some(offset)) = (self.resource, self.unit_offset(index)) else {
            return [0; 4];
        };
        match self.typed_format() {
            Some(format) => {
                //safety: the queue only runs kernels on resources the CPU isn't touching
                let element = unsafe { resource.bytes(offset, self.unit()) };
                format::unpack_element(format, element)
            }
            None => {
                //safety: as above
                let word = unsafe { resource.load_u32(offset) }.unwrap_or(0);
                [word, 0, 0, 0]
            }
        }
    }

    pub fn store_element(&self, index: usize, components: [u32; 4]) {
        if !self.writable {
            return;
        }
        let (Some(resource), Some(offset)) = (self.resource, self.unit_offset(index)) else {
            return;
        };
        match self.typed_format() {
            Some(format) => {
                //safety: the queue only runs kernels on resources the CPU isn't touching
                let element = unsafe { resource.bytes_mut(offset, self.unit()) };
                format::pack_element(format, components, element);
            }
            //safety: as above
            None => unsafe { resource.store_u32(offset, components[0]) },
        }
    }

    /// First component of element `index`, or word `index`, as raw bits.
    pub fn load_u32(&self, index: usize) -> u32 {
        self.load_element(index)[0]
    }

    pub fn store_u32(&self, index: usize, value: u32) {
        match self.typed_format() {
            Some(_) => {
                let mut components = self.load_element(index);
                components[0] = value;
                self.store_element(index, components);
            }
            None => self.store_element(index, [value, 0, 0, 0]),
        }
    }

    /// First component of element `index` converted to float, or word `index` reinterpreted.
    pub fn load_f32(&self, index: usize) -> f32 {
        let bits = self.load_u32(index);
        match self.typed_format() {
            Some(format) => format::decode_float(format, bits),
            None => f32::from_bits(bits),
        }
    }

    pub fn store_f32(&self, index: usize, value: f32) {
        let bits = match self.typed_format() {
            Some(format) => format::encode_float(format, value),
            None => value.to_bits(),
        };
        self.store_u32(index, bits);
    }
}
