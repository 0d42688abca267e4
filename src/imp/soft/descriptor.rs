// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Views and the native descriptor heaps that hold them.

use crate::format::Format;
use crate::imp::soft::Resource;
use std::sync::Arc;

/// Which kind of binding a view serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ViewKind {
    Constant,
    ShaderResource,
    UnorderedAccess,
}

/// How elements of a view are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementLayout {
    Typed(Format),
    Structured { stride: u32 },
    /// 32-bit words, addressed by byte offset.
    Raw,
}

impl ElementLayout {
    pub(crate) fn stride(self) -> usize {
        match self {
            ElementLayout::Typed(format) => format.element_size(),
            ElementLayout::Structured { stride } => stride as usize,
            ElementLayout::Raw => 4,
        }
    }
}

/// Shader-resource or unordered-access view over a buffer, described in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferViewDesc {
    pub(crate) layout: ElementLayout,
    pub(crate) first_element: usize,
    pub(crate) num_elements: usize,
}

/// A descriptor.  A `None` resource is a null view.
#[derive(Debug, Clone)]
pub(crate) struct View {
    pub(crate) kind: ViewKind,
    pub(crate) resource: Option<Resource>,
    pub(crate) layout: ElementLayout,
    pub(crate) byte_offset: usize,
    pub(crate) byte_len: usize,
}

impl View {
    pub(crate) fn null(kind: ViewKind) -> Self {
        View { kind, resource: None, layout: ElementLayout::Raw, byte_offset: 0, byte_len: 0 }
    }

    pub(crate) fn constant(resource: Resource, byte_offset: usize, byte_len: usize) -> Self {
        View { kind: ViewKind::Constant, resource: Some(resource), layout: ElementLayout::Raw, byte_offset, byte_len }
    }

    pub(crate) fn buffer(kind: ViewKind, resource: Resource, desc: BufferViewDesc) -> Self {
        let stride = desc.layout.stride();
        View {
            kind,
            resource: Some(resource),
            layout: desc.layout,
            byte_offset: desc.first_element * stride,
            byte_len: desc.num_elements * stride,
        }
    }

    /// Whether both views cover the same bytes the same way.
    pub(crate) fn same_target(&self, other: &View) -> bool {
        self.resource == other.resource
            && self.layout == other.layout
            && self.byte_offset == other.byte_offset
            && self.byte_len == other.byte_len
    }
}

/// Native descriptor heap.
///
/// The recording thread writes descriptors, the queue thread reads them while executing.
/// Callers never rewrite a descriptor an in-flight command list still references.
#[derive(Clone)]
pub(crate) struct DescriptorHeap {
    shader_visible: bool,
    capacity: u32,
    views: Arc<wasm_safe_mutex::Mutex<Vec<Option<View>>>>,
}

impl std::fmt::Debug for DescriptorHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("shader_visible", &self.shader_visible)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl DescriptorHeap {
    pub(crate) fn new(capacity: u32, shader_visible: bool) -> Self {
        DescriptorHeap { shader_visible, capacity, views: Arc::new(wasm_safe_mutex::Mutex::new(Vec::new())) }
    }

    pub(crate) fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    pub(crate) fn write(&self, index: u32, view: View) {
        assert!(index < self.capacity, "descriptor index out of heap");
        let mut views = self.views.lock_sync();
        let index = index as usize;
        if views.len() <= index {
            views.resize(index + 1, None);
        }
        views[index] = Some(view);
    }

    pub(crate) fn read(&self, index: u32) -> Option<View> {
        self.views.lock_sync().get(index as usize).cloned().flatten()
    }
}
