// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Binding machinery: buffer usage flags, state tracking, descriptors and the binding cache. */

pub mod bind_style;
pub mod buffer_access;
pub mod descriptor_heap;
pub mod resource_tracking;
pub mod visible_to;

pub use bind_style::{BindClass, BindSlot};
pub use buffer_access::{BufferMapping, CRepr, MapResult, MapType};
pub use visible_to::{BufferFlags, BufferStrategy};
